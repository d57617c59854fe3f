//! Paying employed pops: artisans, RGO workers and owners, factory workers
//! and capitalists.
//!
//! ```text
//! RGO:      owners' cut first, then wages-first from the remainder
//!           surplus → workers 20%, owners 80%  (when owners live in the state)
//! Factory:  wages-first, then surplus → primary 10%, secondary 20%, owners 70%
//!           no owners:   surplus split 50/50 between worker types
//!           no clerks:   all profit to primary workers
//!           underwater:  profit shared equally per worker
//! ```
//!
//! All payouts are multiplied by world inflation and credited to pop savings.
//! State transfers (administration, education, military, pensions,
//! unemployment, domestic investment) are computed for every pop at once by
//! the batched kernel in [`crate::simd::payouts`]; that pass overwrites
//! savings, so it runs before any employer pays out.

use crate::defines::EconomyDefines;
use crate::definitions::{IncomeType, PopRoles};
use crate::demographics::PopCounts;
use crate::ids::*;
use crate::shard::{DayContext, NationShard};
use crate::simd::payouts::{pop_payouts_batch, PayoutInput, PayoutOutput};
use crate::state::{Nation, Pop, WorldState};
use crate::systems::budget::{MinWages, TransferRates};
use tracing::instrument;

/// Per-capita factory profit shares for one state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FactoryProfitSplit {
    pub per_primary_worker: f32,
    pub per_secondary_worker: f32,
    pub per_owner: f32,
}

/// Tiered split of a state's factory profit (pure function).
pub fn distribute_factory_profit(
    demo: &PopCounts,
    roles: &PopRoles,
    min_wage: f32,
    total_profit: f32,
    defines: &EconomyDefines,
) -> FactoryProfitSplit {
    let pfw = roles.primary_factory_worker;
    let sfw = roles.secondary_factory_worker;
    let min_to_primary = min_wage * demo.employed(pfw);
    let min_to_secondary = min_wage * demo.employed(sfw);
    let num_primary = demo.of(pfw);
    let num_secondary = demo.of(sfw);
    let num_owners = demo.of(roles.capitalists);

    let per = |amount: f32, count: f32| if count > 0.0 { amount / count } else { 0.0 };
    let wages = min_to_primary + min_to_secondary;
    let surplus = total_profit - wages;

    if wages <= total_profit && num_owners > 0.0 {
        FactoryProfitSplit {
            per_primary_worker: per(min_to_primary + surplus * defines.factory_surplus_primary_share, num_primary),
            per_secondary_worker: per(
                min_to_secondary + surplus * defines.factory_surplus_secondary_share,
                num_secondary,
            ),
            per_owner: surplus * defines.factory_surplus_owner_share / num_owners,
        }
    } else if wages <= total_profit && num_secondary > 0.0 {
        FactoryProfitSplit {
            per_primary_worker: per(min_to_primary + surplus * 0.5, num_primary),
            per_secondary_worker: per(min_to_secondary + surplus * 0.5, num_secondary),
            per_owner: 0.0,
        }
    } else if wages <= total_profit {
        FactoryProfitSplit {
            per_primary_worker: per(total_profit, num_primary),
            ..Default::default()
        }
    } else if num_primary + num_secondary > 0.0 {
        let shared = total_profit / (num_primary + num_secondary);
        FactoryProfitSplit {
            per_primary_worker: shared,
            per_secondary_worker: shared,
            per_owner: 0.0,
        }
    } else {
        FactoryProfitSplit::default()
    }
}

/// Worker wage bill and owners' take of one province's RGO profit (pure function).
///
/// Returns `(total_worker_wage, owner_profit)`.
pub fn split_rgo_profit(
    rgo_profit: f32,
    total_min_to_workers: f32,
    has_owners: bool,
    defines: &EconomyDefines,
) -> (f32, f32) {
    let mut owner_profit = 0.0;
    let mut remaining = rgo_profit;
    if has_owners {
        owner_profit += defines.rgo_owners_cut * rgo_profit;
        remaining = (1.0 - defines.rgo_owners_cut) * rgo_profit;
    }

    if total_min_to_workers <= remaining && has_owners {
        let surplus = remaining - total_min_to_workers;
        let worker_share = defines.rgo_worker_surplus_share;
        (
            total_min_to_workers + surplus * worker_share,
            owner_profit + surplus * (1.0 - worker_share),
        )
    } else {
        (remaining, owner_profit)
    }
}

// ============================================================================
// State transfers
// ============================================================================

/// Packed payout inputs for one pop owned by a nation paying `rates`.
pub fn transfer_input(
    pop: &Pop,
    nation: &Nation,
    rates: &TransferRates,
    world: &WorldState,
    defines: &EconomyDefines,
) -> PayoutInput {
    let pt = pop.pop_type;
    let pop_type = &world.definitions.pop_types[pt];
    let roles = &world.definitions.roles;
    let scaling = defines.alice_needs_scaling_factor;

    let not_state_paid = pop_type.life_needs_income == IncomeType::None;
    let pension_rate = if not_state_paid { rates.social * rates.pension } else { 0.0 };
    let unemployment_rate = if not_state_paid && pop_type.has_unemployment {
        rates.social * rates.unemployment
    } else {
        0.0
    };
    let investment_rate = if pt == roles.capitalists || pt == roles.aristocrats {
        rates.domestic_investment * defines.alice_domestic_investment_multiplier
    } else {
        0.0
    };

    PayoutInput {
        adj_size: pop.size / scaling,
        adj_unemployed: (pop.size - pop.employed()) / scaling,
        life_cost: nation.life_needs_costs.get_or_default(pt),
        everyday_cost: nation.everyday_needs_costs.get_or_default(pt),
        luxury_cost: nation.luxury_needs_costs.get_or_default(pt),
        life_rate: rates.for_income(pop_type.life_needs_income),
        everyday_rate: rates.for_income(pop_type.everyday_needs_income),
        luxury_rate: rates.for_income(pop_type.luxury_needs_income),
        pension_rate,
        unemployment_rate,
        investment_rate,
        inflation: world.inflation,
    }
}

/// Overwrite every pop's savings with today's state transfers.
///
/// Pops in unowned provinces receive nothing and end up with zero savings.
#[instrument(skip_all, name = "transfer_payouts")]
pub fn pay_transfer_recipients(world: &mut WorldState, defines: &EconomyDefines) {
    // PHASE 1: Extract
    let rates: Vec<TransferRates> = world
        .nations
        .values()
        .map(|nation| TransferRates::of(nation, nation.spending_level))
        .collect();
    let inputs: Vec<PayoutInput> = world
        .pops
        .values()
        .map(|pop| {
            let owner = world.provinces.get(pop.location).and_then(|p| p.owner);
            match owner {
                Some(n) => transfer_input(pop, &world.nations[n], &rates[n.index()], world, defines),
                None => PayoutInput::default(),
            }
        })
        .collect();

    // PHASE 2: Batch payouts (vectorized)
    let mut outputs = vec![PayoutOutput::default(); inputs.len()];
    {
        let _span = tracing::info_span!("payout_batch", count = inputs.len()).entered();
        pop_payouts_batch(&inputs, &mut outputs);
    }

    // PHASE 3: Write back (sequential)
    for (pop, output) in world.pops.values_mut().zip(&outputs) {
        pop.savings = output.savings;
    }
    log::trace!("paid state transfers to {} pops", outputs.len());
}

/// Share today's artisan profit equally among the nation's artisans.
pub fn pay_artisans(shard: &mut NationShard, ctx: &DayContext<'_>) {
    let artisans = ctx.definitions.roles.artisans;
    let num_artisans = ctx.demographics.nation.get(shard.id).map_or(0.0, |d| d.of(artisans));
    if num_artisans <= 0.0 {
        return;
    }
    let per_capita = shard.nation.artisan_profit / num_artisans;
    for slot in shard.provinces.iter_mut() {
        for (_, pop) in slot.pops.iter_mut().filter(|(_, p)| p.pop_type == artisans) {
            pop.savings += ctx.inflation * pop.size * per_capita;
            debug_assert!(pop.savings.is_finite());
        }
    }
}

/// Pay RGO workers, factory workers and owners state by state.
pub fn pay_state_workers(shard: &mut NationShard, ctx: &DayContext<'_>, wages: &MinWages) {
    let roles = &ctx.definitions.roles;
    let defines = ctx.defines;
    let scaling = defines.alice_needs_scaling_factor;
    let states = ctx.index.nation_states.get(shard.id).cloned().unwrap_or_default();

    for s in states {
        let Some(demo) = ctx.demographics.state.get(s) else {
            continue;
        };
        let provinces = ctx.index.state_provinces.get(s).map(Vec::as_slice).unwrap_or_default();
        let slots = shard.slots_of(provinces);

        let num_capitalists = demo.of(roles.capitalists);
        let num_aristocrats = demo.of(roles.aristocrats);
        let num_rgo_owners = num_capitalists + num_aristocrats;
        let has_owners = num_rgo_owners > 0.0;

        let mut total_profit = 0.0f32;
        let mut rgo_owner_profit = 0.0f32;

        for &i in &slots {
            let slot = &mut shard.provinces[i];
            total_profit += slot
                .factories
                .iter()
                .map(|(_, f)| f.full_profit.max(0.0))
                .sum::<f32>();

            let is_mine = ctx.commodities.get(slot.province.rgo).is_some_and(|c| c.is_mine);
            let min_wage = wages.rgo(is_mine) / scaling;
            let (total_min_to_workers, num_workers) = ctx
                .demographics
                .province
                .get(slot.id)
                .map_or((0.0, 0.0), |pd| {
                    ctx.definitions.rgo_workers.iter().fold((0.0, 0.0), |(wage, count), &wt| {
                        (wage + min_wage * pd.employed(wt), count + pd.of(wt))
                    })
                });

            let (worker_wage, owner_profit) =
                split_rgo_profit(slot.province.rgo_full_profit, total_min_to_workers, has_owners, defines);
            rgo_owner_profit += owner_profit;

            let per_worker = if num_workers > 0.0 { worker_wage / num_workers } else { 0.0 };
            for (_, pop) in slot.pops.iter_mut() {
                if ctx.definitions.pop_types[pop.pop_type].is_paid_rgo_worker {
                    pop.savings += ctx.inflation * pop.size * per_worker;
                }
            }
        }

        let per_rgo_owner = if has_owners { rgo_owner_profit / num_rgo_owners } else { 0.0 };
        let split = distribute_factory_profit(demo, roles, wages.factory / scaling, total_profit, defines);
        log::trace!(
            "state {}: factory profit {:.4}, rgo owners {:.4}, split {:?}",
            s.index(),
            total_profit,
            rgo_owner_profit,
            split
        );

        for &i in &slots {
            for (_, pop) in shard.provinces[i].pops.iter_mut() {
                let per_capita = if pop.pop_type == roles.primary_factory_worker {
                    split.per_primary_worker
                } else if pop.pop_type == roles.secondary_factory_worker {
                    split.per_secondary_worker
                } else if pop.pop_type == roles.capitalists {
                    split.per_owner + per_rgo_owner
                } else if pop.pop_type == roles.aristocrats {
                    per_rgo_owner
                } else {
                    continue;
                };
                pop.savings += ctx.inflation * pop.size * per_capita;
                debug_assert!(pop.savings.is_finite() && pop.savings >= 0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::pseudo_exp_for_negative;
    use crate::shard::split;
    use crate::testing::WorldBuilder;

    fn roles() -> PopRoles {
        PopRoles {
            primary_factory_worker: PopTypeId(0),
            secondary_factory_worker: PopTypeId(1),
            capitalists: PopTypeId(2),
            ..Default::default()
        }
    }

    fn counts(primary: (f32, f32), secondary: (f32, f32), owners: f32) -> PopCounts {
        PopCounts {
            total: primary.0 + secondary.0 + owners,
            by_type: vec![primary.0, secondary.0, owners],
            employed_by_type: vec![primary.1, secondary.1, 0.0],
        }
    }

    #[test]
    fn test_factory_profit_with_owners() {
        let defines = EconomyDefines::default();
        let demo = counts((100.0, 100.0), (10.0, 10.0), 5.0);
        // wages 0.1 × 110 = 11, surplus 89
        let split = distribute_factory_profit(&demo, &roles(), 0.1, 100.0, &defines);
        assert!((split.per_primary_worker - (10.0 + 8.9) / 100.0).abs() < 1e-6);
        assert!((split.per_secondary_worker - (1.0 + 17.8) / 10.0).abs() < 1e-6);
        assert!((split.per_owner - 62.3 / 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_factory_profit_without_owners() {
        let defines = EconomyDefines::default();
        let demo = counts((100.0, 100.0), (10.0, 10.0), 0.0);
        let split = distribute_factory_profit(&demo, &roles(), 0.1, 100.0, &defines);
        // surplus 89 halved
        assert!((split.per_primary_worker - (10.0 + 44.5) / 100.0).abs() < 1e-6);
        assert!((split.per_secondary_worker - (1.0 + 44.5) / 10.0).abs() < 1e-6);
        assert_eq!(split.per_owner, 0.0);

        let only_primary = counts((100.0, 100.0), (0.0, 0.0), 0.0);
        let split = distribute_factory_profit(&only_primary, &roles(), 0.1, 100.0, &defines);
        assert_eq!(split.per_primary_worker, 1.0);
    }

    #[test]
    fn test_factory_profit_below_wages_is_shared() {
        let defines = EconomyDefines::default();
        let demo = counts((90.0, 90.0), (10.0, 10.0), 5.0);
        let split = distribute_factory_profit(&demo, &roles(), 1.0, 50.0, &defines);
        assert_eq!(split.per_primary_worker, 0.5);
        assert_eq!(split.per_secondary_worker, 0.5);
        assert_eq!(split.per_owner, 0.0);

        let empty = counts((0.0, 0.0), (0.0, 0.0), 0.0);
        assert_eq!(
            distribute_factory_profit(&empty, &roles(), 1.0, 50.0, &defines),
            FactoryProfitSplit::default()
        );
    }

    #[test]
    fn test_rgo_split() {
        let defines = EconomyDefines::default();
        // Owners: cut 5, remaining 95, surplus 85 → workers 10 + 17, owners 5 + 68
        let (workers, owners) = split_rgo_profit(100.0, 10.0, true, &defines);
        assert!((workers - 27.0).abs() < 1e-4);
        assert!((owners - 73.0).abs() < 1e-4);
        assert!((workers + owners - 100.0).abs() < 1e-4);

        // No owners: workers take everything
        assert_eq!(split_rgo_profit(100.0, 10.0, false, &defines), (100.0, 0.0));
        // Profit below wages: workers take the remainder after the cut
        let (workers, owners) = split_rgo_profit(100.0, 200.0, true, &defines);
        assert!((workers - 95.0).abs() < 1e-4);
        assert!((owners - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_artisans_share_profit() {
        let defines = EconomyDefines::default();
        let mut world = WorldBuilder::new()
            .with_goods(&["grain"])
            .with_nation("A")
            .with_state(0, &[0, 1])
            .with_pops_in(0, &[("artisans", 300.0)])
            .with_pops_in(1, &[("artisans", 100.0)])
            .build();
        world.inflation = 2.0;
        let ctx_world = world.clone();
        let ctx = DayContext::new(&ctx_world, &defines, false, pseudo_exp_for_negative);
        let mut sharded = split(&mut world);
        let shard = &mut sharded.shards[0];
        shard.nation.artisan_profit = 40.0;

        pay_artisans(shard, &ctx);
        let savings: Vec<f32> = shard.pops().map(|(_, p)| p.savings).collect();
        // 2 × 300 × 0.1 and 2 × 100 × 0.1
        assert!((savings[0] - 60.0).abs() < 1e-4);
        assert!((savings[1] - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_state_pay_reaches_rgo_workers_and_owners() {
        let defines = EconomyDefines::default();
        let mut world = WorldBuilder::new()
            .with_goods(&["grain"])
            .with_nation("A")
            .with_state(0, &[0])
            .with_rgo(0, "grain", 1.0)
            .with_pops_in(0, &[("farmers", 1000.0), ("aristocrats", 10.0)])
            .build();
        world.provinces[ProvinceId(0)].rgo_full_profit = 100.0;
        let ctx_world = world.clone();
        let ctx = DayContext::new(&ctx_world, &defines, false, pseudo_exp_for_negative);
        let mut sharded = split(&mut world);
        let shard = &mut sharded.shards[0];

        pay_state_workers(shard, &ctx, &MinWages::default());
        let total: f32 = shard.pops().map(|(_, p)| p.savings).sum();
        // Zero minimum wage: workers get 20% of 95, owners 5 + 76
        assert!((total - 100.0).abs() < 1e-3);
        let aristocrats = shard
            .pops()
            .find(|(_, p)| p.pop_type == ctx.definitions.roles.aristocrats)
            .map(|(_, p)| p.savings)
            .unwrap_or_default();
        assert!((aristocrats - 81.0).abs() < 1e-3);
    }

    #[test]
    fn test_transfers_overwrite_savings() {
        let defines = EconomyDefines::default();
        let mut world = WorldBuilder::new()
            .with_goods(&["grain"])
            .with_nation("A")
            .with_state(0, &[0])
            .with_unowned_province(1)
            .with_pops_in(0, &[("bureaucrats", 200_000.0), ("clerks", 200_000.0)])
            .with_pops_in(1, &[("bureaucrats", 200_000.0)])
            .build();
        let bureaucrats = PopTypeId(7);
        let clerks = world.definitions.roles.secondary_factory_worker;
        {
            let nation = &mut world.nations[NationId(0)];
            nation.modifiers.pension_level = 0.1;
            nation.modifiers.unemployment_benefit = 0.5;
            for pt in [bureaucrats, clerks] {
                nation.life_needs_costs[pt] = 2.0;
                nation.everyday_needs_costs[pt] = 4.0;
            }
        }
        world.pops[PopId(1)].employment = 0.5;
        for pop in world.pops.values_mut() {
            pop.savings = 100.0;
        }

        pay_transfer_recipients(&mut world, &defines);
        // Administration at 80%: 0.64 × (2 + 4)
        assert!((world.pops[PopId(0)].savings - 3.84).abs() < 1e-4);
        // Pension 1 × 2 × 0.1, unemployment 0.5 × 0.5 × 2
        assert!((world.pops[PopId(1)].savings - 0.7).abs() < 1e-4);
        assert_eq!(world.pops[PopId(2)].savings, 0.0);
    }
}
