//! End-to-end scenarios through the public entry points.

use marketsim_core::ids::*;
use marketsim_core::math::pseudo_exp_for_negative;
use marketsim_core::shard::DayContext;
use marketsim_core::state::{Purchased, StateBuildingConstruction, WorldState};
use marketsim_core::systems::fiscal::collect_tariffs;
use marketsim_core::testing::WorldBuilder;
use marketsim_core::{
    daily_update, initialize, update_factory_employment, update_rgo_employment, Collaborators, EconomyDefines,
    EconomyEvent, EventLog, NoTriggers, ProfitAdvisor,
};

fn run_days(world: &mut WorldState, defines: &EconomyDefines, days: u32, initiate: bool) -> EventLog {
    let mut log = EventLog::new();
    let mut collab = Collaborators::new(&NoTriggers, &ProfitAdvisor, &mut log);
    for _ in 0..days {
        world.refresh_derived();
        update_rgo_employment(world, defines);
        update_factory_employment(world, defines);
        daily_update(world, defines, &mut collab, initiate);
    }
    log
}

fn trading_world() -> WorldState {
    WorldBuilder::new()
        .with_goods(&["grain", "iron", "cloth"])
        .with_price("cloth", 3.0)
        .with_factory_type("textile", "cloth", 1.0, &[("grain", 2.0)])
        .with_nation("A")
        .with_nation("B")
        .with_state(0, &[0, 1])
        .with_state(1, &[2, 3])
        .with_rgo(0, "grain", 20.0)
        .with_rgo(1, "iron", 10.0)
        .with_rgo(2, "grain", 10.0)
        .with_rgo(3, "iron", 5.0)
        .with_pops_in(0, &[("farmers", 80_000.0), ("aristocrats", 2_000.0)])
        .with_pops_in(1, &[("laborers", 40_000.0), ("craftsmen", 30_000.0), ("capitalists", 1_000.0)])
        .with_pops_in(2, &[("farmers", 50_000.0), ("clerks", 5_000.0)])
        .with_pops_in(3, &[("laborers", 20_000.0), ("bureaucrats", 3_000.0), ("soldiers", 4_000.0)])
        .with_factory(1, "textile", 1)
        .build()
}

#[test]
fn test_market_invariants_hold_for_two_months() {
    let defines = EconomyDefines::default();
    let mut world = trading_world();
    initialize(&mut world, &defines);
    run_days(&mut world, &defines, 60, false);

    for commodity in world.commodities.values() {
        assert!((0.001..=100_000.0).contains(&commodity.current_price));
        assert!(commodity.global_market_pool >= 0.0);
    }
    for (_, nation) in world.nations.iter() {
        for c in world.goods() {
            assert!((0.0..=1.0).contains(&nation.demand_satisfaction[c]));
            assert!(nation.domestic_market_pool[c] >= 0.0);
            assert!(nation.stockpiles[c] >= 0.0);
        }
    }
    for factory in world.factories.values() {
        assert!(factory.actual_production >= 0.0);
        assert!(factory.primary_employment >= 0.0 && factory.secondary_employment >= 0.0);
    }
    for pop in world.pops.values() {
        assert!(pop.savings >= 0.0);
    }
}

#[test]
fn test_rgo_employment_within_labor_pool() {
    let defines = EconomyDefines::default();
    let mut world = trading_world();
    initialize(&mut world, &defines);
    run_days(&mut world, &defines, 10, false);
    world.refresh_derived();

    for (p, province) in world.provinces.iter() {
        let employed: f32 = province.rgo_employment_per_good.values().sum();
        let labor = world.demographics.province.get(p).map_or(0.0, |d| {
            world.definitions.rgo_workers.iter().map(|&pt| d.of(pt)).sum::<f32>()
        });
        assert!(employed <= labor + 1e-2, "province {p}: {employed} employed of {labor}");
    }
}

#[test]
fn test_empty_nation_is_left_untouched() {
    let defines = EconomyDefines::default();
    let mut world = WorldBuilder::new()
        .with_goods(&["grain"])
        .with_price("grain", 1.5)
        .with_nation("A")
        .with_treasury(0, 100.0)
        .with_nation_config(0, |n| n.central_province_count = 1)
        .with_state(0, &[0])
        .build();
    run_days(&mut world, &defines, 5, true);

    let nation = &world.nations[NationId(0)];
    assert_eq!(nation.treasury(), 100.0);
    assert_eq!(nation.domestic_market_pool[CommodityId(1)], 0.0);
    assert_eq!(world.commodities[CommodityId(1)].current_price, 1.5);
    assert_eq!(world.commodities[CommodityId(1)].global_market_pool, 0.0);
}

#[test]
fn test_bankruptcy_through_daily_update() {
    let defines = EconomyDefines::default();
    let mut world = WorldBuilder::new()
        .with_goods(&["grain"])
        .with_nation("A")
        .with_nation("B")
        .with_treasury(0, -1000.0)
        .with_nation_config(0, |n| {
            n.is_debt_spending = true;
            // max loan 500
            n.total_poor_income = 500.0;
        })
        .with_world_config(|w| w.great_powers = vec![NationId(0), NationId(1)])
        .build();

    let log = run_days(&mut world, &defines, 1, true);
    let nation = &world.nations[NationId(0)];
    assert_eq!(nation.treasury(), 0.0);
    assert!(!nation.is_debt_spending);
    assert!(nation.bankrupt_until.is_some());
    assert!(log
        .events
        .iter()
        .any(|e| matches!(e, EconomyEvent::Bankruptcy { nation: NationId(0), .. })));
}

#[test]
fn test_tariff_collection_on_imports() {
    let defines = EconomyDefines::default();
    let world = WorldBuilder::new()
        .with_goods(&["grain"])
        .with_price("grain", 2.0)
        .with_nation("A")
        .with_nation_config(0, |n| {
            n.tariff_efficiency = 0.75;
            n.budget.tariffs.set(10);
        })
        .build();
    let ctx = DayContext::new(&world, &defines, true, pseudo_exp_for_negative);
    let mut nation = world.nations[NationId(0)].clone();
    nation.imports[CommodityId(1)] = 100.0;

    let collected = collect_tariffs(&mut nation, &ctx);
    // 100 × 2.0 × 0.1 × 0.75
    assert!((collected - 15.0).abs() < 1e-4);
    assert!((nation.treasury() - 15.0).abs() < 1e-4);
}

#[test]
fn test_funded_factory_project_completes_once() {
    let defines = EconomyDefines::default();
    let mut world = WorldBuilder::new()
        .with_goods(&["steel", "cement", "cloth"])
        .with_factory_type("textile", "cloth", 1.0, &[("steel", 2.0), ("cement", 4.0)])
        .with_nation("A")
        .with_state(0, &[0])
        .with_pops_in(0, &[("craftsmen", 10_000.0)])
        .build();
    // Construction costs equal the inputs; admin cost factor is 1 at full efficiency
    world.constructions.state_buildings.push(StateBuildingConstruction {
        nation: NationId(0),
        state: StateId(0),
        factory_type: FactoryTypeId(0),
        is_pop_project: false,
        is_upgrade: false,
        purchased: Purchased(vec![2.0, 4.0]),
    });

    let log = run_days(&mut world, &defines, 1, false);
    assert!(world.constructions.state_buildings.is_empty());
    assert_eq!(world.factories.len(), 1);
    assert_eq!(world.factories[FactoryId(0)].level, 1);
    let completed = log
        .events
        .iter()
        .filter(|e| matches!(e, EconomyEvent::FactoryCompleted { .. }))
        .count();
    assert_eq!(completed, 1);

    run_days(&mut world, &defines, 1, false);
    assert_eq!(world.factories.len(), 1);
}
