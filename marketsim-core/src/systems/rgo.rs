//! Raw-goods production: effective size, efficiency, the desired-profit law
//! and the daily target-employment nudge.
//!
//! ```text
//! effective_size(c) = max(0, (max_size[c] × ownership + base) × (size mods + 1))
//! max_employment(c) = rgo_per_size_employment × effective_size(c)
//! efficiency(c)     = amount × main_bonus × (2 - saturation) × max(0.5, throughput)
//!                     × rgo_boost × max(0.5, 1 + output mods)
//! production(c)     = max_production(c) × employment(c) / max_employment(c)
//! ```
//!
//! Only the main good gets the fixed base size and efficiency bonus; every
//! other good grows with the owners' share of the land.

use crate::defines::EconomyDefines;
use crate::ids::{CommodityId, DenseId};
use crate::shard::{DayContext, ProvinceSlot};
use crate::state::{Commodity, Nation, Province};
use crate::systems::employment::adjusted_subsistence_score;
use crate::systems::ledger::register_domestic_supply;
use crate::systems::needs::split_subsistence;

/// Paid RGO workers and employed slaves of a province.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RgoWorkers {
    pub paid_workers: f32,
    pub slaves: f32,
    pub total: f32,
}

pub fn rgo_relevant_population(slot: &ProvinceSlot, ctx: &DayContext<'_>) -> RgoWorkers {
    let Some(demo) = ctx.demographics.province.get(slot.id) else {
        return RgoWorkers::default();
    };
    let paid_workers: f32 = ctx.definitions.rgo_workers.iter().map(|&pt| demo.of(pt)).sum();
    let slaves = demo.employed(ctx.definitions.roles.slaves);
    RgoWorkers {
        paid_workers,
        slaves,
        total: paid_workers + slaves,
    }
}

/// Land usable for subsistence farming.
#[inline]
pub fn subsistence_size(province: &Province, defines: &EconomyDefines) -> f32 {
    let ownership = province.landowners_share + province.capitalists_share;
    province.rgo_size * (1.0 - ownership) * defines.subsistence_size_factor
}

#[inline]
pub fn subsistence_max_pseudoemployment(province: &Province, defines: &EconomyDefines) -> f32 {
    defines.alice_rgo_per_size_employment
        * subsistence_size(province, defines)
        * defines.subsistence_pseudoemployment_margin
}

pub fn rgo_effective_size(
    province: &Province,
    nation: &Nation,
    c: CommodityId,
    commodity: &Commodity,
    defines: &EconomyDefines,
) -> f32 {
    let base = if province.rgo == c {
        defines.alice_base_rgo_employment_bonus / defines.alice_rgo_per_size_employment
    } else {
        0.0
    };
    let ownership = province.landowners_share + province.capitalists_share;
    let size = province.rgo_max_size_per_good.get_or_default(c) * ownership + base;

    let (pmod, nmod) = if commodity.is_mine {
        (province.modifiers.mine_rgo_size, nation.modifiers.mine_rgo_size)
    } else {
        (province.modifiers.farm_rgo_size, nation.modifiers.farm_rgo_size)
    };
    let bonus = pmod + nmod + nation.rgo_size.get_or_default(c) + 1.0;
    (size * bonus).max(0.0)
}

#[inline]
pub fn rgo_max_employment(
    province: &Province,
    nation: &Nation,
    c: CommodityId,
    commodity: &Commodity,
    defines: &EconomyDefines,
) -> f32 {
    defines.alice_rgo_per_size_employment * rgo_effective_size(province, nation, c, commodity, defines)
}

pub fn rgo_efficiency(
    province: &Province,
    nation: &Nation,
    c: CommodityId,
    commodity: &Commodity,
    defines: &EconomyDefines,
) -> f32 {
    let main = if province.rgo == c {
        defines.alice_base_rgo_efficiency_bonus
    } else {
        1.0
    };
    let (peff, neff) = if commodity.is_mine {
        (province.modifiers.mine_rgo_eff, nation.modifiers.mine_rgo_eff)
    } else {
        (province.modifiers.farm_rgo_eff, nation.modifiers.farm_rgo_eff)
    };
    let throughput =
        1.0 + province.modifiers.local_rgo_throughput + nation.modifiers.rgo_throughput + peff + neff;
    let saturation = province.rgo_employment_per_good.get_or_default(c)
        / (rgo_max_employment(province, nation, c, commodity, defines) + 1.0);
    let output = 1.0
        + province.modifiers.local_rgo_output
        + nation.modifiers.rgo_output
        + nation.rgo_goods_output.get_or_default(c);

    let result = commodity.rgo_amount
        * main
        * (2.0 - saturation)
        * throughput.max(0.5)
        * defines.alice_rgo_boost
        * output.max(0.5);
    debug_assert!(result.is_finite());
    result
}

/// Output at full employment.
#[inline]
pub fn rgo_full_production_quantity(
    province: &Province,
    nation: &Nation,
    c: CommodityId,
    commodity: &Commodity,
    defines: &EconomyDefines,
) -> f32 {
    rgo_effective_size(province, nation, c, commodity, defines)
        * rgo_efficiency(province, nation, c, commodity, defines)
}

/// Revenue a worker could expect from good `c`, discounted by how much of
/// the world's output actually sells.
pub fn rgo_expected_worker_norm_profit(
    province: &Province,
    nation: &Nation,
    c: CommodityId,
    commodity: &Commodity,
    defines: &EconomyDefines,
) -> f32 {
    let consumed_ratio = if commodity.money_rgo {
        1.0
    } else {
        ((commodity.total_consumption + 0.0001) / (commodity.total_production + 0.0001)).min(1.0)
    };
    consumed_ratio
        * rgo_efficiency(province, nation, c, commodity, defines)
        * commodity.current_price
        / defines.alice_rgo_per_size_employment
}

/// Profit per worker at which RGO employment stops growing.
///
/// Damped by the current employment ratio so a province never collapses
/// entirely into subsistence.
pub fn rgo_desired_worker_norm_profit(
    province: &Province,
    nation: &Nation,
    ctx: &DayContext<'_>,
    total_pop: f32,
    min_wage: f32,
    total_relevant_population: f32,
) -> f32 {
    let defines = ctx.defines;
    let roles = ctx.definitions.roles;
    let current_employment: f32 = province.rgo_employment_per_good.values().sum();

    let aristocrats = total_relevant_population / defines.rgo_workers_per_aristocrat / defines.alice_needs_scaling_factor;
    let aristocrats_cut = aristocrats
        * (nation.everyday_needs_costs.get_or_default(roles.aristocrats)
            + nation.life_needs_costs.get_or_default(roles.aristocrats));
    let aristocrat_burden = aristocrats_cut / (total_relevant_population + 1.0);

    let mut subsistence = adjusted_subsistence_score(province, total_pop);
    if subsistence == 0.0 {
        subsistence = province.subsistence_score;
    }
    let tiers = split_subsistence(subsistence, defines);
    let [life, everyday, luxury] = [
        tiers[0] * defines.subsistence_score_life,
        tiers[1] * defines.subsistence_score_everyday,
        tiers[2] * defines.subsistence_score_luxury,
    ];

    let is_mine = ctx.commodities.get(province.rgo).is_some_and(|c| c.is_mine);
    let worker = roles.rgo_worker(is_mine);
    let ln = nation.life_needs_costs.get_or_default(worker);
    let en = nation.everyday_needs_costs.get_or_default(worker);
    // Luxury subsistence is priced at life needs cost
    let subsistence_min_wage = life * ln + everyday * en + luxury * ln;

    let min_wage_burden = (min_wage + subsistence_min_wage) / defines.alice_needs_scaling_factor;
    let desired = aristocrat_burden + min_wage_burden / (1.0 - defines.rgo_owners_cut);
    let employment_ratio = current_employment / (total_relevant_population + 1.0);

    let result = desired * employment_ratio;
    debug_assert!(result.is_finite());
    result
}

/// Nudge target employment per good toward closing the profit gap, and set
/// today's production from current employment.
pub fn update_province_rgo_consumption(
    slot: &mut ProvinceSlot,
    nation: &Nation,
    ctx: &DayContext<'_>,
    min_wage: f32,
) {
    let defines = ctx.defines;
    let workers = rgo_relevant_population(slot, ctx);
    let total_pop = ctx.demographics.province.get(slot.id).map_or(0.0, |d| d.total);
    let desired = rgo_desired_worker_norm_profit(&slot.province, nation, ctx, total_pop, min_wage, workers.total);
    let province = &mut slot.province;

    for (c, commodity) in ctx.commodities.iter() {
        let max_production = rgo_full_production_quantity(province, nation, c, commodity, defines);
        if max_production < 0.001 {
            continue;
        }
        let pops_max = rgo_max_employment(province, nation, c, commodity, defines);
        let effective_size = rgo_effective_size(province, nation, c, commodity, defines);
        let current = province.rgo_employment_per_good[c];
        let expected = rgo_expected_worker_norm_profit(province, nation, c, commodity, defines);

        let positive = (expected + 1e-8) / (desired + 1e-8) - 1.0;
        let negative = (desired + 1e-8) / (expected + 1e-8) - 1.0;
        let step = if expected - desired > 0.0 {
            defines.rgo_target_employment_step
        } else {
            -defines.rgo_target_employment_step
        };
        let change = (positive - negative) / effective_size / max_production * pops_max
            / defines.rgo_target_change_divisor
            + step;
        debug_assert!((current + change).is_finite());

        province.rgo_target_employment_per_good[c] = (current + change).clamp(0.0, pops_max);
        province.rgo_actual_production_per_good[c] = max_production * current / pops_max;
    }
}

/// Book today's RGO output as domestic supply. Money goods are also minted
/// into the treasury.
pub fn update_province_rgo_production(slot: &mut ProvinceSlot, nation: &mut Nation, ctx: &DayContext<'_>) {
    let province = &mut slot.province;
    province.rgo_full_profit = 0.0;

    for (c, commodity) in ctx.commodities.iter() {
        let amount = province.rgo_actual_production_per_good[c];
        if amount <= 0.0 {
            province.rgo_profit_per_good[c] = 0.0;
            continue;
        }
        register_domestic_supply(nation, c, amount, commodity.current_price);

        let profit = amount * commodity.current_price;
        province.rgo_profit_per_good[c] = profit;
        province.rgo_full_profit += profit;

        if commodity.money_rgo {
            *nation.treasury_mut() += amount * ctx.defines.gold_to_cash_rate;
        }
    }
    log::trace!(
        "rgo {}: full profit {:.4}",
        slot.id.index(),
        province.rgo_full_profit
    );
}
