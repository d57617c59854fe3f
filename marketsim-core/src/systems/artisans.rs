//! Artisans: a nation-wide workforce that spreads itself over craftable
//! goods by a softmax of per-good scores.
//!
//! ```text
//! mult     = 1 / (sharpness × artisan everyday cost + 1)
//! share[c] = exp((score[c] - max) × mult) / (Σ exp((score - max) × mult) + exp((baseline/mult - max) × mult) + 0.001)
//! score[c] ← score[c] × decay + drift × profit[c] × (1 - share[c]) / output_amount[c]
//! ```
//!
//! `exp` is the deterministic approximation carried by the day context.

use crate::ids::CommodityId;
use crate::shard::DayContext;
use crate::state::Nation;
use crate::systems::ledger::{register_domestic_supply, register_intermediate_demand, DemandAccumulator, DemandReason};

/// Artisans may make `c` when it has an artisan recipe and is unlocked.
#[inline]
pub fn valid_artisan_good(nation: &Nation, ctx: &DayContext<'_>, c: CommodityId) -> bool {
    ctx.commodities[c].artisan_output_amount > 0.0 && ctx.is_available(nation, c)
}

#[inline]
fn artisan_input_multiplier(nation: &Nation, ctx: &DayContext<'_>) -> f32 {
    (ctx.defines.alice_inputs_base_factor_artisans + nation.modifiers.artisan_input)
        .max(ctx.defines.factory_multiplier_floor)
}

#[inline]
fn artisan_output_multiplier(nation: &Nation, ctx: &DayContext<'_>) -> f32 {
    (ctx.defines.alice_output_base_factor_artisans + nation.modifiers.artisan_output)
        .max(ctx.defines.factory_multiplier_floor)
}

#[inline]
fn artisan_throughput_multiplier(nation: &Nation, ctx: &DayContext<'_>) -> f32 {
    (1.0 + nation.modifiers.artisan_throughput).max(ctx.defines.factory_multiplier_floor)
}

/// Profit of one recipe run at world prices.
pub fn base_artisan_profit(nation: &Nation, ctx: &DayContext<'_>, c: CommodityId) -> f32 {
    let commodity = &ctx.commodities[c];
    let input_total = commodity.artisan_inputs.value_at(|i| ctx.price(i));
    let output_total = commodity.artisan_output_amount * commodity.current_price;
    output_total * artisan_output_multiplier(nation, ctx) - artisan_input_multiplier(nation, ctx) * input_total
}

/// Lowest satisfaction among the recipe's inputs.
#[inline]
pub fn artisan_scale_limit(nation: &Nation, ctx: &DayContext<'_>, c: CommodityId) -> f32 {
    ctx.commodities[c]
        .artisan_inputs
        .min_of(|i| nation.demand_satisfaction[i])
}

/// Softmax state for one nation and day.
#[derive(Debug, Clone, Copy)]
pub struct ArtisanSoftmax {
    pub multiplier: f32,
    pub max_score: f32,
    pub total_score: f32,
}

impl ArtisanSoftmax {
    pub fn of(nation: &Nation, ctx: &DayContext<'_>) -> Self {
        let defines = ctx.defines;
        let everyday = nation
            .everyday_needs_costs
            .get_or_default(ctx.definitions.roles.artisans);
        let multiplier = 1.0 / (defines.artisan_cost_sharpness * everyday + 1.0);
        let baseline = defines.artisan_baseline_score / multiplier;

        let max_score = ctx
            .goods()
            .map(|c| nation.artisan_distribution[c])
            .fold(f32::MIN, f32::max)
            .max(baseline);

        let total_score = ctx
            .goods()
            .map(|c| (ctx.exp)((nation.artisan_distribution[c] - max_score) * multiplier))
            .sum::<f32>()
            + (ctx.exp)((baseline - max_score) * multiplier);

        Self {
            multiplier,
            max_score,
            total_score,
        }
    }

    /// Share of artisans working on `c`.
    #[inline]
    pub fn share(&self, nation: &Nation, ctx: &DayContext<'_>, c: CommodityId) -> f32 {
        (ctx.exp)((nation.artisan_distribution[c] - self.max_score) * self.multiplier) / (self.total_score + 0.001)
    }
}

/// Register artisan input demand and plan today's output.
pub fn update_national_artisan_consumption(
    nation: &mut Nation,
    demand: &mut DemandAccumulator,
    ctx: &DayContext<'_>,
    num_artisans: f32,
    mobilization_impact: f32,
) {
    let softmax = ArtisanSoftmax::of(nation, ctx);
    let input_multiplier = artisan_input_multiplier(nation, ctx);
    let throughput = artisan_throughput_multiplier(nation, ctx);
    let output_multiplier = artisan_output_multiplier(nation, ctx);
    let mut total_profit = 0.0f32;

    for c in ctx.goods() {
        nation.artisan_actual_production[c] = 0.0;
        if !valid_artisan_good(nation, ctx, c) {
            continue;
        }
        let commodity = &ctx.commodities[c];
        let input_total = commodity
            .artisan_inputs
            .value_at(|i| nation.effective_prices[i]);
        let min_available = artisan_scale_limit(nation, ctx, c);
        let output_total = commodity.artisan_output_amount * commodity.current_price;

        let distribution = softmax.share(nation, ctx, c);
        let max_production_scale =
            num_artisans * distribution / ctx.defines.artisan_pop_per_scale * mobilization_impact.max(0.0);

        for (i, amount) in commodity.artisan_inputs.iter() {
            register_intermediate_demand(
                nation,
                demand,
                i,
                input_multiplier * throughput * max_production_scale * amount * (0.1 + 0.9 * min_available),
                DemandReason::Artisan,
                ctx.price(i),
            );
        }

        nation.artisan_actual_production[c] =
            commodity.artisan_output_amount * throughput * output_multiplier * max_production_scale * min_available;
        total_profit += ((output_total * output_multiplier - input_multiplier * input_total)
            * throughput
            * max_production_scale
            * min_available)
            .max(0.0);
    }

    nation.artisan_profit = total_profit;
}

/// Deliver planned artisan output, cut by input availability.
pub fn update_national_artisan_production(nation: &mut Nation, ctx: &DayContext<'_>) {
    for c in ctx.goods() {
        if !valid_artisan_good(nation, ctx, c) {
            continue;
        }
        let production = nation.artisan_actual_production[c];
        if production <= 0.0 {
            continue;
        }
        let amount = artisan_scale_limit(nation, ctx, c) * production;
        nation.artisan_actual_production[c] = amount;
        register_domestic_supply(nation, c, amount, ctx.price(c));
    }
}

/// Drift each good's score toward its profitability.
///
/// Goods without an artisan recipe keep a score of 0.
pub fn adjust_artisan_balance(nation: &mut Nation, ctx: &DayContext<'_>) {
    let defines = ctx.defines;
    let softmax = ArtisanSoftmax::of(nation, ctx);
    let invalid_profit =
        defines.artisan_invalid_score / softmax.multiplier / defines.artisan_drift * 10.0;

    let updates: Vec<(CommodityId, f32)> = ctx
        .goods()
        .map(|c| {
            let output = ctx.commodities[c].artisan_output_amount;
            let score = nation.artisan_distribution[c];
            if output <= 0.0 {
                return (c, score * defines.artisan_score_decay);
            }
            let profit = if valid_artisan_good(nation, ctx, c) {
                base_artisan_profit(nation, ctx, c)
            } else {
                invalid_profit
            };
            let last = softmax.share(nation, ctx, c);
            (
                c,
                score * defines.artisan_score_decay + defines.artisan_drift * profit * (1.0 - last) / output,
            )
        })
        .collect();

    for (c, score) in updates {
        nation.artisan_distribution[c] = score;
    }
}

/// Zero the score of every craftable good the nation can access.
pub fn initialize_artisan_distribution(nation: &mut Nation, ctx: &DayContext<'_>) {
    for c in ctx.goods() {
        if valid_artisan_good(nation, ctx, c) {
            nation.artisan_distribution[c] = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::CommoditySet;
    use crate::defines::EconomyDefines;
    use crate::ids::NationId;
    use crate::math::pseudo_exp_for_negative;
    use crate::state::WorldState;
    use crate::testing::WorldBuilder;

    fn craft_world() -> WorldState {
        WorldBuilder::new()
            .with_goods(&["wool", "cloth", "iron"])
            .with_price("wool", 1.0)
            .with_price("cloth", 4.0)
            .with_commodity_config("cloth", |c| {
                c.artisan_output_amount = 1.0;
                c.artisan_inputs = CommoditySet::new([(CommodityId(1), 2.0)]);
            })
            .with_nation("A")
            .with_state(0, &[0])
            .with_pops_in(0, &[("artisans", 20_000.0)])
            .build()
    }

    #[test]
    fn test_only_recipes_are_valid() {
        let world = craft_world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        let nation = &world.nations[NationId(0)];
        assert!(valid_artisan_good(nation, &ctx, CommodityId(2)));
        assert!(!valid_artisan_good(nation, &ctx, CommodityId(3)));
    }

    #[test]
    fn test_base_profit_at_world_prices() {
        let world = craft_world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        // 1 × 4.0 - 2 × 1.0 = 2
        let profit = base_artisan_profit(&world.nations[NationId(0)], &ctx, CommodityId(2));
        assert!((profit - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_shares_sum_below_one() {
        let world = craft_world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        let mut nation = world.nations[NationId(0)].clone();
        nation.artisan_distribution[CommodityId(2)] = 5.0;

        let softmax = ArtisanSoftmax::of(&nation, &ctx);
        let total: f32 = ctx.goods().map(|c| softmax.share(&nation, &ctx, c)).sum();
        // The baseline option keeps some artisans idle
        assert!(total < 1.0);
        assert!(total > 0.5);
    }

    #[test]
    fn test_consumption_then_production() {
        let world = craft_world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        let mut nation = world.nations[NationId(0)].clone();
        let mut demand = DemandAccumulator::new(world.commodity_count());
        let cloth = CommodityId(2);

        update_national_artisan_consumption(&mut nation, &mut demand, &ctx, 20_000.0, 1.0);
        assert!(nation.artisan_actual_production[cloth] > 0.0);
        assert!(nation.artisan_profit > 0.0);
        assert!(demand.get(CommodityId(1), DemandReason::Artisan) > 0.0);

        // Half the wool arrives: output halves
        let planned = nation.artisan_actual_production[cloth];
        nation.demand_satisfaction[CommodityId(1)] = 0.5;
        update_national_artisan_production(&mut nation, &ctx);
        assert!((nation.artisan_actual_production[cloth] - planned * 0.5).abs() < 1e-6);
        assert!((nation.domestic_market_pool[cloth] - planned * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mobilization_idles_artisans() {
        let world = craft_world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        let mut nation = world.nations[NationId(0)].clone();
        let mut demand = DemandAccumulator::new(world.commodity_count());
        update_national_artisan_consumption(&mut nation, &mut demand, &ctx, 20_000.0, -0.5);
        assert_eq!(nation.artisan_actual_production[CommodityId(2)], 0.0);
        assert_eq!(nation.artisan_profit, 0.0);
    }

    #[test]
    fn test_profitable_good_gains_score() {
        let world = craft_world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        let mut nation = world.nations[NationId(0)].clone();

        adjust_artisan_balance(&mut nation, &ctx);
        assert!(nation.artisan_distribution[CommodityId(2)] > 0.0);
        // No recipe: score stays put
        assert_eq!(nation.artisan_distribution[CommodityId(3)], 0.0);
    }
}
