//! The daily market: sphere pooling, tariffs, effective prices, purchases
//! and the end-of-day move of unsold goods into the world pool.
//!
//! ```text
//! gpm = tariff_efficiency × tariff/100 + blockaded/ports + 1
//!
//! gpm >= 1  (prefer domestic)   domestic → sphere leader → stockpile → world
//! gpm <  1  (prefer global)     world → domestic → sphere leader → stockpile
//!
//! satisfaction ← old × delay + (supply / demand) × (1 - delay),  capped at 1
//! world_pool   ← world_pool × decay + Σ domestic leftovers
//! ```

use crate::defines::EconomyDefines;
use crate::ids::*;
use crate::state::{Nation, WorldState};
use crate::table::Table;
use rayon::prelude::*;
use tracing::instrument;

// ============================================================================
// Spheres
// ============================================================================

/// Share of a member's domestic supply pooled with its sphere leader.
///
/// Civilised members start from a rank-dependent base and move toward 1 with
/// the leader's share of foreign investment in them.
pub fn sphere_leader_share_factor(
    world: &WorldState,
    leader: NationId,
    member: NationId,
    defines: &EconomyDefines,
) -> f32 {
    let m = &world.nations[member];
    if !m.is_civilized {
        return defines.sphere_share_unciv;
    }
    let base = if m.rank <= defines.colonial_rank {
        defines.sphere_share_second_rank
    } else {
        defines.sphere_share_civ
    };

    let (from_leader, total) = world
        .relationships
        .iter()
        .filter(|r| r.target == member)
        .fold((0.0f32, 0.0f32), |(leader_sum, total), r| {
            let from_leader = if r.source == leader { r.foreign_investment } else { 0.0 };
            (leader_sum + from_leader, total + r.foreign_investment)
        });
    let fraction = if total > 0.0001 { from_leader / total } else { 0.0 };
    base + (1.0 - base) * fraction
}

/// Leaders add their members' shared supply to their own pool, in rank order.
#[instrument(skip_all, name = "sphere_absorb")]
pub fn absorb_sphere_member_production(world: &mut WorldState, defines: &EconomyDefines) {
    for leader in world.nations_by_rank() {
        let members: Vec<NationId> = world
            .nations
            .iter()
            .filter(|(_, n)| n.in_sphere_of == Some(leader))
            .map(|(id, _)| id)
            .collect();
        for member in members {
            if member == leader {
                continue;
            }
            let share = sphere_leader_share_factor(world, leader, member, defines);
            let (l, m) = world.nations.pair_mut(leader, member);
            for (pool, theirs) in l.domestic_market_pool.values_mut().zip(m.domestic_market_pool.values()) {
                *pool += share * theirs;
            }
        }
    }
}

/// Members keep the part of their pool the leader did not take.
#[instrument(skip_all, name = "sphere_give")]
pub fn give_sphere_leader_production(world: &mut WorldState, defines: &EconomyDefines) {
    for n in world.nations_by_rank() {
        let Some(leader) = world.nations[n].in_sphere_of else {
            continue;
        };
        if leader == n {
            continue;
        }
        let share = sphere_leader_share_factor(world, leader, n, defines);
        for pool in world.nations[n].domestic_market_pool.values_mut() {
            *pool *= 1.0 - share;
        }
    }
}

// ============================================================================
// Tariffs
// ============================================================================

#[inline]
pub fn effective_tariff_rate(nation: &Nation) -> f32 {
    nation.tariff_efficiency * nation.budget.tariffs.fraction()
}

/// Price multiplier on goods bought from the world pool.
pub fn global_market_price_multiplier(nation: &Nation) -> f32 {
    let blockade = if nation.central_ports > 0 {
        nation.central_blockaded as f32 / nation.central_ports as f32
    } else {
        0.0
    };
    effective_tariff_rate(nation) + blockade + 1.0
}

// ============================================================================
// Effective prices
// ============================================================================

/// Blend of world price and tariff-inflated price by how much of
/// yesterday's demand each pool could cover (pure function).
pub fn blended_price(
    base_price: f32,
    gpm: f32,
    domestic_supply: f32,
    global_supply: f32,
    last_demand: f32,
) -> f32 {
    let total_supply = domestic_supply + global_supply;
    if gpm >= 1.0 {
        if last_demand <= domestic_supply {
            base_price
        } else if last_demand <= total_supply {
            let domestic = domestic_supply / last_demand;
            base_price * domestic + base_price * (1.0 - domestic) * gpm
        } else if total_supply > 0.0 {
            let domestic = domestic_supply / total_supply;
            base_price * domestic + base_price * (1.0 - domestic) * gpm
        } else {
            base_price * gpm
        }
    } else if last_demand <= global_supply {
        base_price
    } else if last_demand <= total_supply {
        let global = global_supply / last_demand;
        base_price * global * gpm + base_price * (1.0 - global)
    } else if total_supply > 0.0 {
        let global = global_supply / total_supply;
        base_price * global * gpm + base_price * (1.0 - global)
    } else {
        base_price
    }
}

/// Supply a nation can reach without the world market.
#[inline]
fn domestic_supply(world: &WorldState, nation: &Nation, c: CommodityId) -> f32 {
    let sphere = nation
        .in_sphere_of
        .map_or(0.0, |sl| world.nations[sl].domestic_market_pool[c]);
    let stockpile = if nation.drawing_on_stockpiles[c] {
        nation.stockpiles[c]
    } else {
        0.0
    };
    nation.domestic_market_pool[c] + sphere + stockpile
}

/// Recompute every nation's effective prices from the pools as they stand
/// before purchasing, using yesterday's demand.
#[instrument(skip_all, name = "effective_prices")]
pub fn populate_effective_prices(world: &mut WorldState) {
    // PHASE 1 + 2: Compute each nation's column from shared pools (parallel)
    let columns: Vec<Table<CommodityId, f32>> = {
        let _span = tracing::info_span!("effective_prices_compute", count = world.nations.len()).entered();
        let world_ref: &WorldState = world;
        world_ref
            .nations
            .as_slice()
            .par_iter()
            .map(|nation| {
                let gpm = global_market_price_multiplier(nation);
                world_ref
                    .commodities
                    .iter()
                    .map(|(c, commodity)| {
                        let price = blended_price(
                            commodity.current_price,
                            gpm,
                            domestic_supply(world_ref, nation, c),
                            commodity.global_market_pool,
                            nation.real_demand[c],
                        );
                        debug_assert!(price.is_finite());
                        price
                    })
                    .collect()
            })
            .collect()
    };

    // PHASE 3: Write back (sequential)
    for (nation, column) in world.nations.values_mut().zip(columns) {
        nation.effective_prices = column;
    }
}

// ============================================================================
// Purchases
// ============================================================================

#[inline]
fn take(pool: &mut f32, wanted: f32) -> f32 {
    let left = (wanted - *pool).max(0.0);
    *pool = (*pool - wanted).max(0.0);
    left
}

/// Settle every nation's demand against the pools, richest rank first.
///
/// Updates smoothed and direct satisfaction and records imports.
#[instrument(skip_all, name = "purchases")]
pub fn execute_purchases(world: &mut WorldState, defines: &EconomyDefines) {
    let delay = defines.alice_sat_delay_factor;
    let goods: Vec<CommodityId> = world.goods().collect();

    for n in world.nations_by_rank() {
        let gpm = global_market_price_multiplier(&world.nations[n]);
        let leader = world.nations[n].in_sphere_of.filter(|&sl| sl != n);

        for &c in &goods {
            let nation = &world.nations[n];
            let dom_pool = nation.domestic_market_pool[c];
            let sl_pool = leader.map_or(0.0, |sl| world.nations[sl].domestic_market_pool[c]);
            let drawing = nation.drawing_on_stockpiles[c];
            let sp_pool = if drawing { nation.stockpiles[c] } else { 0.0 };
            let wm_pool = world.commodities[c].global_market_pool;

            let total_supply = dom_pool + sl_pool + sp_pool + wm_pool;
            let demand = nation.real_demand[c];
            let new_sat = if demand > 0.0001 { total_supply / demand } else { total_supply };
            let old_sat = nation.demand_satisfaction[c];
            let adj_sat = old_sat * delay + new_sat * (1.0 - delay);

            let nation = &mut world.nations[n];
            nation.demand_satisfaction[c] = adj_sat.min(1.0);
            nation.direct_demand_satisfaction[c] = new_sat.min(1.0);

            let mut rd = demand;
            if gpm >= 1.0 {
                rd = take(&mut nation.domestic_market_pool[c], rd);
                if let Some(sl) = leader {
                    rd = take(&mut world.nations[sl].domestic_market_pool[c], rd);
                }
                let nation = &mut world.nations[n];
                if drawing {
                    rd = take(&mut nation.stockpiles[c], rd);
                }
                nation.imports[c] = wm_pool.min(rd);
                world.commodities[c].global_market_pool = (wm_pool - rd).max(0.0);
            } else {
                nation.imports[c] = wm_pool.min(rd);
                rd = take(&mut world.commodities[c].global_market_pool, rd);
                let nation = &mut world.nations[n];
                rd = take(&mut nation.domestic_market_pool[c], rd);
                if let Some(sl) = leader {
                    rd = take(&mut world.nations[sl].domestic_market_pool[c], rd);
                }
                if drawing {
                    take(&mut world.nations[n].stockpiles[c], rd);
                }
            }
        }
    }
}

/// Decay the world pool and add every nation's unsold domestic supply.
#[instrument(skip_all, name = "pool_move")]
pub fn move_domestic_supply_to_global(world: &mut WorldState, defines: &EconomyDefines) {
    for c in world.commodities.ids() {
        let leftover: f32 = world
            .nations
            .values_mut()
            .map(|nation| std::mem::take(&mut nation.domestic_market_pool[c]))
            .sum();
        let commodity = &mut world.commodities[c];
        commodity.global_market_pool = commodity.global_market_pool * defines.global_pool_decay + leftover;
    }
}

/// Imports of every good valued at world prices.
pub fn nation_total_imports(world: &WorldState, n: NationId) -> f32 {
    let nation = &world.nations[n];
    world
        .goods()
        .map(|c| nation.imports[c] * world.commodities[c].current_price)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded::tariff;
    use crate::state::Relationship;
    use crate::testing::WorldBuilder;
    use proptest::prelude::*;

    fn two_nations() -> WorldState {
        WorldBuilder::new()
            .with_goods(&["grain"])
            .with_price("grain", 2.0)
            .with_nation("Leader")
            .with_nation("Member")
            .with_state(0, &[0])
            .with_state(1, &[1])
            .build()
    }

    #[test]
    fn test_share_factor_by_rank_and_investment() {
        let defines = EconomyDefines::default();
        let mut world = two_nations();
        // Rank 2 is within the colonial rank: second-rank base
        assert_eq!(sphere_leader_share_factor(&world, NationId(0), NationId(1), &defines), 0.25);

        world.relationships = vec![
            Relationship {
                source: NationId(0),
                target: NationId(1),
                war_subsidies: false,
                reparations: false,
                foreign_investment: 30.0,
            },
            Relationship {
                source: NationId(1),
                target: NationId(1),
                war_subsidies: false,
                reparations: false,
                foreign_investment: 10.0,
            },
        ];
        // 0.25 + 0.75 × 0.75
        let share = sphere_leader_share_factor(&world, NationId(0), NationId(1), &defines);
        assert!((share - 0.8125).abs() < 1e-6);

        world.nations[NationId(1)].is_civilized = false;
        assert_eq!(sphere_leader_share_factor(&world, NationId(0), NationId(1), &defines), 0.75);
    }

    #[test]
    fn test_sphere_pooling() {
        let defines = EconomyDefines::default();
        let mut world = two_nations();
        let grain = CommodityId(1);
        world.nations[NationId(1)].in_sphere_of = Some(NationId(0));
        world.nations[NationId(0)].domestic_market_pool[grain] = 10.0;
        world.nations[NationId(1)].domestic_market_pool[grain] = 100.0;

        absorb_sphere_member_production(&mut world, &defines);
        give_sphere_leader_production(&mut world, &defines);
        assert_eq!(world.nations[NationId(0)].domestic_market_pool[grain], 35.0);
        assert_eq!(world.nations[NationId(1)].domestic_market_pool[grain], 75.0);
    }

    #[test]
    fn test_price_multiplier_includes_blockade() {
        let mut nation = Nation {
            tariff_efficiency: 0.5,
            central_ports: 4,
            central_blockaded: 1,
            ..Default::default()
        };
        nation.budget.tariffs = tariff(20);
        // 0.5 × 0.2 + 1/4 + 1
        assert!((global_market_price_multiplier(&nation) - 1.35).abs() < 1e-6);
        nation.central_ports = 0;
        assert!((global_market_price_multiplier(&nation) - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_blended_price_cases() {
        // Domestic covers everything
        assert_eq!(blended_price(2.0, 1.5, 10.0, 10.0, 5.0), 2.0);
        // Half from abroad: 2 × 0.5 + 2 × 0.5 × 1.5
        assert!((blended_price(2.0, 1.5, 5.0, 10.0, 10.0) - 2.5).abs() < 1e-6);
        // Nothing anywhere: full tariff price
        assert_eq!(blended_price(2.0, 1.5, 0.0, 0.0, 10.0), 3.0);
        // Export subsidy prefers the world market
        assert_eq!(blended_price(2.0, 0.5, 0.0, 0.0, 10.0), 2.0);
    }

    #[test]
    fn test_purchase_prefers_domestic() {
        let defines = EconomyDefines::default();
        let mut world = two_nations();
        let grain = CommodityId(1);
        world.commodities[grain].global_market_pool = 50.0;
        let nation = &mut world.nations[NationId(0)];
        nation.domestic_market_pool[grain] = 30.0;
        nation.real_demand[grain] = 40.0;

        execute_purchases(&mut world, &defines);
        let nation = &world.nations[NationId(0)];
        assert_eq!(nation.domestic_market_pool[grain], 0.0);
        assert_eq!(nation.imports[grain], 10.0);
        assert_eq!(world.commodities[grain].global_market_pool, 40.0);
        // 80 / 40 = 2, smoothed with 1 and capped
        assert_eq!(nation.demand_satisfaction[grain], 1.0);
        assert_eq!(nation.direct_demand_satisfaction[grain], 1.0);
    }

    #[test]
    fn test_shortage_lowers_satisfaction() {
        let defines = EconomyDefines::default();
        let mut world = two_nations();
        let grain = CommodityId(1);
        world.nations[NationId(0)].real_demand[grain] = 40.0;
        world.commodities[grain].global_market_pool = 10.0;

        execute_purchases(&mut world, &defines);
        let nation = &world.nations[NationId(0)];
        // 1 × 0.5 + 0.25 × 0.5
        assert!((nation.demand_satisfaction[grain] - 0.625).abs() < 1e-6);
        assert!((nation.direct_demand_satisfaction[grain] - 0.25).abs() < 1e-6);
        assert_eq!(world.commodities[grain].global_market_pool, 0.0);
    }

    #[test]
    fn test_pool_move_decays_world_pool() {
        let defines = EconomyDefines::default();
        let mut world = two_nations();
        let grain = CommodityId(1);
        world.commodities[grain].global_market_pool = 10.0;
        world.nations[NationId(0)].domestic_market_pool[grain] = 3.0;
        world.nations[NationId(1)].domestic_market_pool[grain] = 4.0;

        move_domestic_supply_to_global(&mut world, &defines);
        assert_eq!(world.commodities[grain].global_market_pool, 12.0);
        assert_eq!(world.nations[NationId(0)].domestic_market_pool[grain], 0.0);
    }

    proptest! {
        #[test]
        fn prop_purchases_keep_pools_and_satisfaction_in_range(
            dom in 0.0f32..1000.0,
            global in 0.0f32..1000.0,
            demand in 0.0f32..2000.0,
            old_sat in 0.0f32..=1.0,
            tariff_pct in -100i32..=100,
        ) {
            let defines = EconomyDefines::default();
            let mut world = two_nations();
            let grain = CommodityId(1);
            world.commodities[grain].global_market_pool = global;
            let nation = &mut world.nations[NationId(0)];
            nation.domestic_market_pool[grain] = dom;
            nation.real_demand[grain] = demand;
            nation.demand_satisfaction[grain] = old_sat;
            nation.budget.tariffs = tariff(tariff_pct);

            execute_purchases(&mut world, &defines);
            let nation = &world.nations[NationId(0)];
            prop_assert!(nation.domestic_market_pool[grain] >= 0.0);
            prop_assert!(world.commodities[grain].global_market_pool >= 0.0);
            prop_assert!((0.0..=1.0).contains(&nation.demand_satisfaction[grain]));
            prop_assert!((0.0..=1.0).contains(&nation.direct_demand_satisfaction[grain]));
        }
    }
}
