//! Economy systems, one module per concern of the daily pass.

pub mod artisans;
pub mod budget;
pub mod construction;
pub mod distribution;
pub mod employment;
pub mod factories;
pub mod fiscal;
pub mod init;
pub mod investment;
pub mod ledger;
pub mod market;
pub mod needs;
pub mod prices;
pub mod rgo;

pub use employment::{update_factory_employment, update_rgo_employment};
pub use init::initialize;
pub use ledger::regenerate_unsaved_values;
