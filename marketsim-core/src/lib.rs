//! # Market Simulation Core
//!
//! Deterministic daily economy for a world of nations, provinces and pops.
//!
//! Every day pops buy their needs, producers hire and sell, governments tax
//! and spend, and prices move toward clearing. The whole pass is a function
//! of the world state, the economy defines and a few collaborator traits, so
//! two runs from the same start produce the same checksum.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ Collaborators│────▶│ daily_update │◀────│ EconomyDefines│
//! │ (triggers,   │     │ (one day)    │     │ (constants)   │
//! │  investment) │     └──────┬───────┘     └───────────────┘
//! └──────────────┘            │
//!                     ┌───────▼──────┐     ┌──────────────┐
//!                     │  WorldState  │────▶│  DayReport   │
//!                     │ (mutated)    │     │  + events    │
//!                     └──────────────┘     └──────────────┘
//! ```
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`WorldState`] | Nations, provinces, pops, factories, markets and projects |
//! | [`EconomyDefines`] | Every tunable constant of the economy |
//! | [`daily_update`] | One economy day, in place |
//! | [`presimulate`] | Warm-up days with construction disabled |
//! | [`Collaborators`] | Trigger, investment and event hooks supplied by the host |
//! | [`DayReport`] | Per-nation incomes, bankruptcies and phase timings |
//! | [`EconomyMetrics`] | Accumulated performance of the daily pass |

pub mod bounded;
pub mod config;
pub mod defines;
pub mod definitions;
pub mod demographics;
pub mod error;
pub mod external;
pub mod ids;
pub mod math;
pub mod metrics;
pub mod profiling;
pub mod report;
pub mod shard;
pub mod simd;
pub mod state;
pub mod step;
pub mod systems;
pub mod table;
pub mod testing;

pub use config::SimConfig;
pub use defines::EconomyDefines;
pub use error::{ConfigError, WorldError};
pub use external::{
    BudgetPolicy, Collaborators, EconomyEvent, EventLog, EventSink, InvestmentAdvisor, KeepBudget, NoTriggers,
    ProfitAdvisor, TriggerEvaluator,
};
pub use metrics::EconomyMetrics;
pub use report::{DayReport, NationDayReport};
pub use state::{Date, WorldState};
pub use step::{advance_day, daily_update, presimulate};
pub use systems::{initialize, regenerate_unsaved_values, update_factory_employment, update_rgo_employment};
