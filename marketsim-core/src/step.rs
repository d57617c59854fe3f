//! The daily economy pass and the drivers built on it.
//!
//! ```text
//! setup         slider bounds, army/navy/construction demand, trigger bonuses, daily resets,
//!               land ownership, subsistence, sphere pools, effective prices
//! consumption   per nation (parallel): needs costs, wages, artisan/factory/RGO
//!               input demand, pop consumption, national spending
//! purchases     clear demand against pools, leftover supply to world pool,
//!               state transfers to every pop (batched)
//! production    per nation (parallel): refunds, output, needs caps, wages and
//!               profits, private education, taxes, tariffs, weight drift
//! construction  fund projects from delivered goods
//! settlement    prices, diplomatic expenses, bankruptcy, inflation,
//!               completed projects, private investment, history
//! ```
//!
//! The parallel stages run on [`crate::shard`]s: each nation owns its rows for
//! the duration of the stage and results are merged back in nation-id order,
//! so a day is deterministic regardless of thread count.

use crate::defines::EconomyDefines;
use crate::external::{BudgetPolicy, Collaborators, TriggerEvaluator};
use crate::math::pseudo_exp_for_negative;
use crate::metrics::EconomyMetrics;
use crate::report::{CountingSink, DayReport, NationDayReport, PhaseTimings};
use crate::shard::{merge, split, DayContext, NationShard, ProvinceSlot};
use crate::state::WorldState;
use crate::systems::artisans::{
    adjust_artisan_balance, update_national_artisan_consumption, update_national_artisan_production,
};
use crate::systems::budget::{
    apply_refunds, bound_budget_settings, populate_army_consumption, populate_navy_consumption, update_national_spending, MinWages,
    SpendingPlan,
};
use crate::systems::construction::{
    advance_construction, emulate_construction_demand, populate_construction_consumption,
    populate_private_construction_consumption, prune_factories, resolve_constructions,
};
use crate::systems::distribution::{pay_artisans, pay_state_workers, pay_transfer_recipients};
use crate::systems::employment::{update_land_ownership, update_local_subsistence_factor};
use crate::systems::factories::{
    update_factory_triggered_modifiers, update_single_factory_consumption, update_single_factory_production,
    FactorySite,
};
use crate::systems::fiscal::{
    collect_tariffs, collect_taxes, pay_private_education, process_bankruptcies, settle_diplomatic_expenses,
    update_inflation,
};
use crate::systems::investment::invest_private_capital;
use crate::systems::ledger::record_history;
use crate::systems::market::{
    absorb_sphere_member_production, execute_purchases, give_sphere_leader_production,
    move_domestic_supply_to_global, populate_effective_prices,
};
use crate::systems::needs::{
    base_demand, cap_needs_by_satisfaction, invention_factor, populate_needs_costs, rebalance_needs_weights,
    update_pop_consumption,
};
use crate::systems::prices::{adjust_prices, update_money_prices};
use crate::systems::rgo::{update_province_rgo_consumption, update_province_rgo_production};
use rayon::prelude::*;
use std::time::Instant;
use tracing::instrument;

pub use crate::systems::employment::{update_factory_employment, update_rgo_employment};

// ============================================================================
// Setup
// ============================================================================

/// Zero the per-day nation accumulators and remember yesterday's treasury.
fn reset_daily_accumulators(world: &mut WorldState) {
    for nation in world.nations.values_mut() {
        nation.life_needs_costs.fill(0.0);
        nation.everyday_needs_costs.fill(0.0);
        nation.luxury_needs_costs.fill(0.0);
        nation.subsidies_spending = 0.0;
        nation.last_treasury = nation.treasury();
        nation.gdp = 0.0;
    }
    for commodity in world.commodities.values_mut() {
        commodity.demand_by_category = Default::default();
    }
}

/// Pull every slider back inside its nation's modifier window.
fn bound_all_budgets(world: &mut WorldState) {
    for nation in world.nations.values_mut() {
        bound_budget_settings(nation);
    }
}

fn setup_day(world: &mut WorldState, defines: &EconomyDefines, triggers: &dyn TriggerEvaluator) {
    world.refresh_derived();
    bound_all_budgets(world);

    populate_army_consumption(world);
    populate_navy_consumption(world);
    populate_construction_consumption(world, defines);
    populate_private_construction_consumption(world, defines);
    update_factory_triggered_modifiers(world, triggers);
    reset_daily_accumulators(world);

    update_land_ownership(world, defines);
    update_local_subsistence_factor(world, defines);

    absorb_sphere_member_production(world, defines);
    give_sphere_leader_production(world, defines);
    populate_effective_prices(world);
}

// ============================================================================
// Per-nation stages
// ============================================================================

#[inline]
fn mobilization_impact(shard: &NationShard) -> f32 {
    if shard.nation.is_mobilized {
        shard.nation.mobilization_impact
    } else {
        1.0
    }
}

/// Needs costs, input demand of every producer, pop consumption and the
/// nation's own purchases.
fn consume(shard: &mut NationShard, ctx: &DayContext<'_>) -> SpendingPlan {
    let n = shard.id;
    let defines = ctx.defines;
    let base = base_demand(&shard.nation, defines);
    let inventions = invention_factor(&shard.nation, defines);
    populate_needs_costs(&mut shard.nation, ctx, base, inventions);

    let mobilization = mobilization_impact(shard);
    let demo = ctx.demographics.nation.get(n);
    let wages = MinWages::of(&shard.nation, demo, ctx);

    shard.nation.real_demand.fill(0.0);
    shard.nation.intermediate_demand.fill(0.0);

    let num_artisans = demo.map_or(0.0, |d| d.of(ctx.definitions.roles.artisans));
    update_national_artisan_consumption(&mut shard.nation, &mut shard.demand, ctx, num_artisans, mobilization);

    let NationShard {
        nation,
        provinces,
        demand,
        ..
    } = &mut *shard;
    for slot in provinces.iter_mut() {
        let occupied = !slot.is_controlled_by(n);
        {
            let ProvinceSlot {
                province, factories, ..
            } = &mut *slot;
            let site = FactorySite {
                province,
                state_demo: ctx.demographics.state.get(province.state),
                mobilization_impact: mobilization,
                occupied,
            };
            for (_, factory) in factories.iter_mut() {
                update_single_factory_consumption(factory, nation, demand, &site, ctx, wages.factory);
            }
        }
        let is_mine = ctx.commodities.get(slot.province.rgo).is_some_and(|c| c.is_mine);
        update_province_rgo_consumption(slot, nation, ctx, wages.rgo(is_mine));
    }

    update_pop_consumption(shard, ctx, base, inventions);
    update_national_spending(&mut shard.nation, &mut shard.demand, n, ctx)
}

/// Refunds, output, wages and profits, taxes and tariffs.
fn produce(shard: &mut NationShard, plan: &SpendingPlan, ctx: &DayContext<'_>) -> NationDayReport {
    let n = shard.id;
    let mut report = NationDayReport {
        nation: n,
        spending_scale: plan.spending_scale,
        ..Default::default()
    };
    if ctx.index.owned_province_count(n) == 0 {
        return report;
    }

    report.refund = apply_refunds(&mut shard.nation, n, ctx);
    let wages = MinWages::of(&shard.nation, ctx.demographics.nation.get(n), ctx);

    update_national_artisan_production(&mut shard.nation, ctx);
    {
        let NationShard { nation, provinces, .. } = &mut *shard;
        for slot in provinces.iter_mut() {
            for (_, factory) in slot.factories.iter_mut() {
                update_single_factory_production(factory, nation, ctx, wages.factory);
            }
            update_province_rgo_production(slot, nation, ctx);
        }
    }
    cap_needs_by_satisfaction(shard, ctx);

    pay_artisans(shard, ctx);
    pay_state_workers(shard, ctx, &wages);
    pay_private_education(shard, ctx);

    report.tax_income = collect_taxes(shard, ctx);
    report.tariff_income = collect_tariffs(&mut shard.nation, ctx);

    rebalance_needs_weights(&mut shard.nation, ctx.commodities, ctx.defines);
    adjust_artisan_balance(&mut shard.nation, ctx);

    if !ctx.initiate_buildings {
        emulate_construction_demand(&mut shard.nation, &mut shard.demand, ctx);
    }
    report
}

// ============================================================================
// Entry points
// ============================================================================

/// Run one full economy day.
///
/// With `initiate_buildings` off no private investment is started and
/// stand-in construction demand is registered instead.
#[instrument(skip_all, name = "economy_day")]
pub fn daily_update(
    world: &mut WorldState,
    defines: &EconomyDefines,
    collaborators: &mut Collaborators<'_>,
    initiate_buildings: bool,
) -> DayReport {
    let mut timings = PhaseTimings::default();
    let mut events = CountingSink::new(&mut *collaborators.events);

    let start = Instant::now();
    setup_day(world, defines, collaborators.triggers);
    timings.setup = start.elapsed();

    // PHASE 1: Consumption per nation (parallel)
    let start = Instant::now();
    let plans: Vec<SpendingPlan> = {
        let mut sharded = split(world);
        let plans: Vec<SpendingPlan> = {
            let _span = tracing::info_span!("consumption", count = sharded.shards.len()).entered();
            let ctx = DayContext::new(world, defines, initiate_buildings, pseudo_exp_for_negative);
            sharded.shards.par_iter_mut().map(|shard| consume(shard, &ctx)).collect()
        };
        merge(world, sharded);
        plans
    };
    log::trace!(
        "{} nations planned spending, {} under budget",
        plans.len(),
        plans.iter().filter(|p| p.spending_scale < 1.0).count()
    );
    timings.consumption = start.elapsed();

    // PHASE 2: Market clearing (sequential)
    let start = Instant::now();
    execute_purchases(world, defines);
    move_domestic_supply_to_global(world, defines);
    pay_transfer_recipients(world, defines);
    timings.purchases = start.elapsed();

    // PHASE 3: Production and income per nation (parallel)
    let start = Instant::now();
    let mut nations: Vec<NationDayReport> = {
        let mut sharded = split(world);
        let reports = {
            let _span = tracing::info_span!("production", count = sharded.shards.len()).entered();
            let ctx = DayContext::new(world, defines, initiate_buildings, pseudo_exp_for_negative);
            sharded
                .shards
                .par_iter_mut()
                .zip(plans.par_iter())
                .map(|(shard, plan)| produce(shard, plan, &ctx))
                .collect()
        };
        merge(world, sharded);
        reports
    };
    timings.production = start.elapsed();

    // PHASE 4: Construction funding (sequential, nation-id order)
    let start = Instant::now();
    for report in nations.iter_mut() {
        if world.index.owned_province_count(report.nation) > 0 {
            report.construction_refund = advance_construction(world, report.nation, defines);
        }
    }
    timings.construction = start.elapsed();

    // PHASE 5: World settlement (sequential)
    let start = Instant::now();
    update_money_prices(world, defines);
    adjust_prices(world, defines);
    settle_diplomatic_expenses(world, defines, &mut events);
    let bankruptcies = process_bankruptcies(world, defines, &mut events);
    update_inflation(world, defines);
    let constructions_completed = resolve_constructions(world, defines, &mut events);
    let investments_started = if initiate_buildings {
        invest_private_capital(world, collaborators.advisor, defines)
    } else {
        0
    };
    record_history(world);
    timings.settlement = start.elapsed();

    log::debug!(
        "day {}: taxes {:.2}, tariffs {:.2}, {} bankrupt, {} completed, {} started",
        world.date.0,
        nations.iter().map(|r| r.tax_income).sum::<f32>(),
        nations.iter().map(|r| r.tariff_income).sum::<f32>(),
        bankruptcies.len(),
        constructions_completed,
        investments_started
    );

    DayReport {
        date: world.date,
        nations,
        bankruptcies,
        events_posted: events.posted,
        constructions_completed,
        investments_started,
        timings,
    }
}

/// Warm the economy up with construction disabled, letting `policy` adjust
/// budgets after every day.
#[instrument(skip_all, name = "presimulate")]
pub fn presimulate(
    world: &mut WorldState,
    defines: &EconomyDefines,
    collaborators: &mut Collaborators<'_>,
    policy: &mut dyn BudgetPolicy,
) -> EconomyMetrics {
    let mut metrics = EconomyMetrics::default();
    let wall = Instant::now();
    for _ in 0..defines.presimulation_days {
        world.refresh_derived();
        update_rgo_employment(world, defines);
        update_factory_employment(world, defines);
        let report = daily_update(world, defines, collaborators, false);
        metrics.record(&report.timings);
        policy.update_budget(world);
        bound_all_budgets(world);
    }
    metrics.wall_time = wall.elapsed();
    log::info!(
        "Presimulated {} days ({:.2} ms/day)",
        metrics.total_days,
        metrics.day_avg_ms()
    );
    metrics
}

/// One in-campaign day: employment, the daily pass with construction on,
/// monthly factory pruning, then the date advances.
pub fn advance_day(
    world: &mut WorldState,
    defines: &EconomyDefines,
    collaborators: &mut Collaborators<'_>,
    metrics: &mut EconomyMetrics,
) -> DayReport {
    world.refresh_derived();
    update_rgo_employment(world, defines);
    update_factory_employment(world, defines);
    let report = daily_update(world, defines, collaborators, true);
    metrics.record(&report.timings);

    if world.calendar_date().day == 1 {
        let pruned = prune_factories(world, defines);
        if pruned > 0 {
            log::debug!("pruned {pruned} factories");
        }
    }
    world.date = world.date.add_days(1);
    crate::profiling::frame_mark_daily();
    report
}
