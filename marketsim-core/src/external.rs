//! Narrow interfaces to the collaborators the economy does not own.
//!
//! The daily pass asks a [`TriggerEvaluator`] whether conditional factory
//! bonuses apply, reports notable outcomes to an [`EventSink`], lets a
//! [`BudgetPolicy`] adjust sliders between presimulated days, and asks an
//! [`InvestmentAdvisor`] which factory types private capital should build.
//!
//! The default implementations are enough to run the economy standalone.

use crate::definitions::ProvinceBuildingKind;
use crate::ids::{FactoryTypeId, NationId, StateId, TriggerId, UnitTypeId};
use crate::state::{Date, WorldState};
use serde::{Deserialize, Serialize};

/// Evaluates an opaque trigger for a state and its owner.
pub trait TriggerEvaluator: Send + Sync {
    fn evaluate(&self, world: &WorldState, trigger: TriggerId, state: StateId, owner: NationId)
        -> bool;
}

/// Trigger evaluator for worlds without scripted conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTriggers;

impl TriggerEvaluator for NoTriggers {
    fn evaluate(&self, _: &WorldState, _: TriggerId, _: StateId, _: NationId) -> bool {
        false
    }
}

/// Scope of a debtor-default notification sent to great powers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultSeverity {
    /// Debt under the small-debt limit.
    Small,
    Large,
    /// Defaulted again while still under a previous bankruptcy.
    Repeat,
}

/// Outcomes reported by the economy.
///
/// Tagged for JSONL output:
/// ```json
/// {"type":"bankruptcy","date":120,"nation":3}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EconomyEvent {
    Bankruptcy {
        date: Date,
        nation: NationId,
    },
    /// Sent to each great power other than the defaulting nation.
    DebtorDefault {
        date: Date,
        recipient: NationId,
        debtor: NationId,
        severity: DefaultSeverity,
    },
    WarSubsidiesCancelled {
        date: Date,
        payer: NationId,
        recipient: NationId,
    },
    ReparationsShortfall {
        date: Date,
        payer: NationId,
        recipient: NationId,
        owed: f32,
        paid: f32,
    },
    UnitCompleted {
        date: Date,
        nation: NationId,
        unit_type: UnitTypeId,
    },
    ProvinceBuildingCompleted {
        date: Date,
        nation: NationId,
        kind: ProvinceBuildingKind,
    },
    FactoryCompleted {
        date: Date,
        nation: NationId,
        state: StateId,
        factory_type: FactoryTypeId,
        upgrade: bool,
    },
}

/// Fire-and-forget notification target.
pub trait EventSink {
    fn post(&mut self, event: EconomyEvent);
}

/// Collects every posted event in order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub events: Vec<EconomyEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<EconomyEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for EventLog {
    fn post(&mut self, event: EconomyEvent) {
        log::debug!("economy event: {:?}", event);
        self.events.push(event);
    }
}

/// Adjusts budget sliders between presimulated days.
pub trait BudgetPolicy {
    fn update_budget(&mut self, world: &mut WorldState);
}

/// Leaves every slider where it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepBudget;

impl BudgetPolicy for KeepBudget {
    fn update_budget(&mut self, _world: &mut WorldState) {}
}

/// Chooses the factory types private investment should found.
pub trait InvestmentAdvisor: Send + Sync {
    fn desired_factory_types(&self, world: &WorldState, nation: NationId) -> Vec<FactoryTypeId>;
}

/// Picks active factory types whose output sells for more than its inputs cost.
///
/// Types are returned best margin first, ties broken by id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfitAdvisor;

impl InvestmentAdvisor for ProfitAdvisor {
    fn desired_factory_types(&self, world: &WorldState, nation: NationId) -> Vec<FactoryTypeId> {
        let n = &world.nations[nation];
        let price = |c| n.effective_prices.get(c).copied().unwrap_or(0.0);

        let mut candidates: Vec<(FactoryTypeId, f32)> = world
            .definitions
            .factory_types
            .iter()
            .filter(|(id, ft)| ft.is_available_from_start || n.active_buildings.get_or_default(*id))
            .filter_map(|(id, ft)| {
                let output = ft.output_amount * price(ft.output);
                let input = ft.inputs.value_at(price);
                let margin = output - input;
                (margin > 0.0).then_some((id, margin / output.max(0.001)))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        candidates.into_iter().map(|(id, _)| id).collect()
    }
}

/// Bundle of collaborators consumed by [`crate::step::daily_update`].
pub struct Collaborators<'a> {
    pub triggers: &'a dyn TriggerEvaluator,
    pub advisor: &'a dyn InvestmentAdvisor,
    pub events: &'a mut dyn EventSink,
}

impl<'a> Collaborators<'a> {
    pub fn new(
        triggers: &'a dyn TriggerEvaluator,
        advisor: &'a dyn InvestmentAdvisor,
        events: &'a mut dyn EventSink,
    ) -> Self {
        Self {
            triggers,
            advisor,
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_collects_in_order() {
        let mut log = EventLog::new();
        log.post(EconomyEvent::Bankruptcy {
            date: Date(1),
            nation: NationId(0),
        });
        log.post(EconomyEvent::Bankruptcy {
            date: Date(2),
            nation: NationId(1),
        });
        assert_eq!(log.len(), 2);
        let drained = log.drain();
        assert!(log.is_empty());
        assert!(matches!(drained[1], EconomyEvent::Bankruptcy { nation: NationId(1), .. }));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = EconomyEvent::Bankruptcy {
            date: Date(120),
            nation: NationId(3),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"bankruptcy","date":120,"nation":3}"#);
    }
}
