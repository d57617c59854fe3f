//! Private investment: turning capitalist savings into pop projects.
//!
//! Runs once a day when building is enabled. A nation whose accumulated
//! private investment exceeds the cost of today's private construction
//! queues, per non-colonial state (most populous first):
//!
//! ```text
//! expand   the factory with the best full_profit / level among those at
//!          ≥ 90% scale and ≥ 90% primary employment
//! found    one advisor-picked type, if the state is idle, has a free slot
//!          and investment × 0.1 covers everything queued so far
//! railroad one per nation, in the province of the most industrial state
//! ```
//!
//! The pot is emptied afterwards whether or not anything was started.

use crate::defines::EconomyDefines;
use crate::definitions::ProvinceBuildingKind;
use crate::external::InvestmentAdvisor;
use crate::ids::*;
use crate::state::{ProvinceBuildingConstruction, Purchased, StateBuildingConstruction, WorldState};
use crate::systems::construction::state_is_coastal;
use crate::systems::factories::factories_in_state;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::instrument;

/// Deterministic pick from `len` options for nation `n` in state `s`.
fn pick_index(seed: u64, n: NationId, s: StateId, len: usize) -> usize {
    let key = ((n.0 as u64) << 6) ^ s.0 as u64;
    let mut rng = StdRng::seed_from_u64(seed ^ key.rotate_left(32));
    rng.gen_range(0..len)
}

/// Today's private construction bill at world prices.
pub fn private_construction_cost(world: &WorldState, n: NationId) -> f32 {
    let nation = &world.nations[n];
    world
        .goods()
        .map(|c| nation.private_construction_demand[c] * world.commodities[c].current_price)
        .sum()
}

/// Non-colonial states of `n`, most populous first, ties by id.
pub fn investment_states(world: &WorldState, n: NationId) -> Vec<StateId> {
    let mut states: Vec<StateId> = investment_states_by_id(world, n).collect();
    let population = |s: StateId| world.demographics.state.get(s).map_or(0.0, |d| d.total);
    states.sort_by(|&a, &b| population(b).total_cmp(&population(a)).then(a.cmp(&b)));
    states
}

/// Whether private capital may lay rails in `p` for nation `n`.
fn can_build_railroad(world: &WorldState, p: ProvinceId, n: NationId) -> bool {
    let province = &world.provinces[p];
    let kind = ProvinceBuildingKind::Railroad;
    province.owner == Some(n)
        && province.controller == Some(n)
        && province.can_build_railroad
        && province.building_level(kind) < world.nations[n].max_building_level[kind.index()]
        && !world
            .constructions
            .province_buildings
            .iter()
            .any(|c| c.province == p && c.kind == kind)
}

/// Province with the most factory levels around it, first wins ties.
///
/// Each province is scored twice: once with the running level count of its
/// state at the time it is reached, and once with the state's total, so
/// rails spread across the provinces of an industrial state.
pub fn railroad_target(world: &WorldState, n: NationId) -> Option<ProvinceId> {
    let mut scored: Vec<(ProvinceId, u32)> = Vec::new();
    for s in investment_states_by_id(world, n) {
        let provinces: Vec<ProvinceId> = world
            .provinces
            .iter()
            .filter(|(p, province)| province.state == s && can_build_railroad(world, *p, n))
            .map(|(p, _)| p)
            .collect();
        let mut levels = 0u32;
        for &p in &provinces {
            levels += world
                .factories
                .values()
                .filter(|f| f.location == p)
                .map(|f| f.level as u32)
                .sum::<u32>();
            scored.push((p, levels));
        }
        scored.extend(provinces.iter().map(|&p| (p, levels)));
    }

    let (&first, rest) = scored.split_first()?;
    let best = rest.iter().fold(first, |best, &e| if e.1 > best.1 { e } else { best });
    Some(best.0)
}

fn investment_states_by_id(world: &WorldState, n: NationId) -> impl Iterator<Item = StateId> + '_ {
    world
        .states
        .iter()
        .filter(move |(_, s)| s.owner == n && !world.provinces[s.capital].is_colonial)
        .map(|(id, _)| id)
}

/// Best factory to expand in `s`, scored by full profit per level.
fn upgrade_target(world: &WorldState, s: StateId, defines: &EconomyDefines) -> Option<FactoryTypeId> {
    let threshold = defines.investment_expand_threshold;
    let in_progress = |ft: FactoryTypeId| {
        world
            .constructions
            .state_buildings
            .iter()
            .any(|c| c.state == s && c.factory_type == ft)
    };
    let mut best: Option<(FactoryTypeId, f32)> = None;
    for (_, factory) in factories_in_state(world, s) {
        if factory.production_scale < threshold
            || factory.primary_employment < threshold
            || factory.level == u8::MAX
            || in_progress(factory.building_type)
        {
            continue;
        }
        let profit = factory.full_profit / factory.level as f32;
        if profit > best.map_or(0.0, |(_, p)| p) {
            best = Some((factory.building_type, profit));
        }
    }
    best.map(|(ft, _)| ft)
}

/// Queue privately funded projects for every nation with capital to spare,
/// then empty every nation's investment pot. Returns projects started.
#[instrument(skip_all, name = "private_investment")]
pub fn invest_private_capital(
    world: &mut WorldState,
    advisor: &dyn InvestmentAdvisor,
    defines: &EconomyDefines,
) -> usize {
    let mut started = 0;
    for n in world.nations.ids().collect::<Vec<_>>() {
        let total_cost = private_construction_cost(world, n);
        let nation = &world.nations[n];
        let rules = nation.rules;
        if nation.private_investment <= total_cost || !nation.is_civilized || !rules.allows_investment() {
            continue;
        }

        let states = investment_states(world, n);
        let desired = if !states.is_empty() && rules.pop_build_factory {
            advisor.desired_factory_types(world, n)
        } else {
            Vec::new()
        };
        let pfw = world.definitions.roles.primary_factory_worker;
        let mut cost_added = 0.0;

        for s in states {
            let demographics = world.demographics.state.get(s);
            let workers = demographics.map_or(0.0, |d| d.of(pfw));
            let employed = demographics.map_or(0.0, |d| d.employed(pfw));
            if workers > 0.0 && employed >= workers {
                continue;
            }

            let factory_count = factories_in_state(world, s).count();
            if rules.pop_expand_factory {
                if let Some(ft) = upgrade_target(world, s, defines) {
                    world.constructions.state_buildings.push(StateBuildingConstruction {
                        nation: n,
                        state: s,
                        factory_type: ft,
                        is_pop_project: true,
                        is_upgrade: true,
                        purchased: Purchased::default(),
                    });
                    started += 1;
                }
            }

            if world.constructions.state_buildings.iter().any(|c| c.state == s) {
                continue;
            }
            let investment = world.nations[n].private_investment;
            if investment * defines.investment_state_share < total_cost + cost_added {
                continue;
            }
            if factory_count >= defines.factories_per_state as usize || !rules.pop_build_factory || desired.is_empty() {
                continue;
            }

            let selected = desired[pick_index(world.rng_seed, n, s, desired.len())];
            let ft = &world.definitions.factory_types[selected];
            if ft.is_coastal && !state_is_coastal(world, s) {
                continue;
            }
            if factories_in_state(world, s).any(|(_, f)| f.building_type == selected) {
                continue;
            }

            let nation = &world.nations[n];
            cost_added += ft.construction_costs.value_at(|c| nation.effective_prices[c]);
            world.constructions.state_buildings.push(StateBuildingConstruction {
                nation: n,
                state: s,
                factory_type: selected,
                is_pop_project: true,
                is_upgrade: false,
                purchased: Purchased::default(),
            });
            log::debug!("{n}: private capital founds {selected} in {s}");
            started += 1;
        }

        if rules.pop_build_factory {
            if let Some(p) = railroad_target(world, n) {
                world.constructions.province_buildings.push(ProvinceBuildingConstruction {
                    nation: n,
                    province: p,
                    kind: ProvinceBuildingKind::Railroad,
                    is_pop_project: true,
                    purchased: Purchased::default(),
                });
                started += 1;
            }
        }
    }

    for nation in world.nations.values_mut() {
        nation.private_investment = 0.0;
    }
    started
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ProfitAdvisor;
    use crate::testing::WorldBuilder;

    struct Fixed(Vec<FactoryTypeId>);
    impl InvestmentAdvisor for Fixed {
        fn desired_factory_types(&self, _: &WorldState, _: NationId) -> Vec<FactoryTypeId> {
            self.0.clone()
        }
    }

    fn world() -> WorldState {
        WorldBuilder::new()
            .with_goods(&["grain", "cloth", "steel"])
            .with_factory_type("textile", "cloth", 1.0, &[("grain", 1.0)])
            .with_factory_type_config("textile", |ft| {
                ft.construction_costs = crate::definitions::CommoditySet::new([(CommodityId(3), 10.0)]);
            })
            .with_nation("A")
            .with_state(0, &[0, 1])
            .with_state(0, &[2])
            .with_pops_in(0, &[("craftsmen", 1000.0)])
            .with_pops_in(2, &[("craftsmen", 5000.0)])
            .with_nation_config(0, |n| n.private_investment = 1000.0)
            .build()
    }

    #[test]
    fn test_states_ordered_by_population() {
        let world = world();
        assert_eq!(investment_states(&world, NationId(0)), vec![StateId(1), StateId(0)]);
    }

    #[test]
    fn test_new_factory_and_railroad_queued() {
        let defines = EconomyDefines::default();
        let mut world = world();
        let started = invest_private_capital(&mut world, &Fixed(vec![FactoryTypeId(0)]), &defines);
        // One textile per state plus one railroad
        assert_eq!(started, 3);
        let states: Vec<StateId> = world.constructions.state_buildings.iter().map(|c| c.state).collect();
        assert_eq!(states, vec![StateId(1), StateId(0)]);
        assert!(world.constructions.state_buildings.iter().all(|c| c.is_pop_project && !c.is_upgrade));
        assert_eq!(world.constructions.province_buildings.len(), 1);
        assert_eq!(world.nations[NationId(0)].private_investment, 0.0);
    }

    #[test]
    fn test_state_share_limits_new_projects() {
        let defines = EconomyDefines::default();
        // 10% of 50 covers the first 10-steel project only
        let mut world = world();
        world.nations[NationId(0)].private_investment = 50.0;
        invest_private_capital(&mut world, &Fixed(vec![FactoryTypeId(0)]), &defines);
        assert_eq!(world.constructions.state_buildings.len(), 1);
    }

    #[test]
    fn test_uncivilized_nation_does_not_invest() {
        let defines = EconomyDefines::default();
        let mut world = world();
        world.nations[NationId(0)].is_civilized = false;
        assert_eq!(invest_private_capital(&mut world, &ProfitAdvisor, &defines), 0);
        assert_eq!(world.nations[NationId(0)].private_investment, 0.0);
    }

    #[test]
    fn test_busy_factory_is_expanded() {
        let defines = EconomyDefines::default();
        let mut world = world();
        world.factories.push(crate::state::Factory::new(FactoryTypeId(0), ProvinceId(2), 2));
        world.refresh_derived();
        {
            let factory = &mut world.factories[FactoryId(0)];
            factory.primary_employment = 0.95;
            factory.full_profit = 50.0;
        }
        invest_private_capital(&mut world, &Fixed(vec![]), &defines);
        let upgrade = &world.constructions.state_buildings[0];
        assert!(upgrade.is_upgrade);
        assert_eq!(upgrade.state, StateId(1));
        assert_eq!(world.constructions.state_buildings.len(), 1);
    }

    #[test]
    fn test_railroad_goes_to_industrial_state() {
        let mut world = world();
        world.factories.push(crate::state::Factory::new(FactoryTypeId(0), ProvinceId(2), 3));
        world.refresh_derived();
        assert_eq!(railroad_target(&world, NationId(0)), Some(ProvinceId(2)));

        world.provinces[ProvinceId(2)].building_levels = [6; 3];
        assert_eq!(railroad_target(&world, NationId(0)), Some(ProvinceId(0)));
    }

    #[test]
    fn test_pick_is_deterministic() {
        let a = pick_index(7, NationId(1), StateId(2), 5);
        assert_eq!(a, pick_index(7, NationId(1), StateId(2), 5));
        assert!(a < 5);
    }
}
