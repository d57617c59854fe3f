//! Two runs from the same start must agree bit for bit.

use marketsim_core::external::BudgetPolicy;
use marketsim_core::testing::WorldBuilder;
use marketsim_core::{
    advance_day, initialize, presimulate, Collaborators, EconomyDefines, EconomyMetrics, EventLog, KeepBudget,
    NoTriggers, ProfitAdvisor, WorldState,
};

fn scenario() -> WorldState {
    WorldBuilder::new()
        .seed(7)
        .with_goods(&["grain", "iron", "steel", "cloth"])
        .with_price("steel", 4.0)
        .with_price("cloth", 3.0)
        .with_factory_type("steelworks", "steel", 1.0, &[("iron", 2.0)])
        .with_factory_type("textile", "cloth", 1.0, &[("grain", 2.0)])
        .with_nation("A")
        .with_nation("B")
        .with_nation("C")
        .with_state(0, &[0, 1])
        .with_state(1, &[2])
        .with_state(2, &[3, 4])
        .with_rgo(0, "grain", 15.0)
        .with_rgo(1, "iron", 10.0)
        .with_rgo(2, "grain", 8.0)
        .with_rgo(3, "iron", 6.0)
        .with_rgo(4, "grain", 6.0)
        .with_pops_in(0, &[("farmers", 60_000.0), ("capitalists", 1_500.0)])
        .with_pops_in(1, &[("laborers", 30_000.0), ("craftsmen", 25_000.0), ("clerks", 2_000.0)])
        .with_pops_in(2, &[("farmers", 40_000.0), ("artisans", 6_000.0), ("soldiers", 3_000.0)])
        .with_pops_in(3, &[("laborers", 20_000.0), ("craftsmen", 10_000.0), ("aristocrats", 800.0)])
        .with_pops_in(4, &[("farmers", 25_000.0), ("bureaucrats", 1_000.0), ("clergy", 900.0)])
        .with_factory(1, "steelworks", 1)
        .with_factory(3, "textile", 1)
        .build()
}

/// Presimulate a short warm-up, then run a month with construction on.
fn run(defines: &EconomyDefines) -> (WorldState, usize) {
    let mut world = scenario();
    initialize(&mut world, defines);
    let mut log = EventLog::new();
    let mut metrics = EconomyMetrics::default();
    {
        let mut collab = Collaborators::new(&NoTriggers, &ProfitAdvisor, &mut log);
        let mut policy = KeepBudget;
        presimulate(&mut world, defines, &mut collab, &mut policy as &mut dyn BudgetPolicy);
        for _ in 0..30 {
            advance_day(&mut world, defines, &mut collab, &mut metrics);
        }
    }
    (world, log.len())
}

#[test]
fn test_identical_runs_agree() {
    let defines = EconomyDefines {
        presimulation_days: 20,
        ..Default::default()
    };
    let (a, events_a) = run(&defines);
    let (b, events_b) = run(&defines);

    assert_eq!(a.checksum(), b.checksum());
    assert_eq!(events_a, events_b);
    let json_a = serde_json::to_string(&a).expect("serialize");
    let json_b = serde_json::to_string(&b).expect("serialize");
    assert_eq!(json_a, json_b);
}

#[test]
fn test_snapshot_round_trip_keeps_checksum() {
    let defines = EconomyDefines {
        presimulation_days: 5,
        ..Default::default()
    };
    let (world, _) = run(&defines);
    let json = serde_json::to_string(&world).expect("serialize");
    let mut restored: WorldState = serde_json::from_str(&json).expect("deserialize");
    restored.refresh_derived();
    assert_eq!(restored.checksum(), world.checksum());
    assert!(restored.validate().is_ok());
}
