//! Needs costs, needs weights and pop consumption.
//!
//! Each nation prices one unit of life, everyday and luxury needs for every
//! pop type, then pops spend their savings against those costs and register
//! the resulting demand.
//!
//! ```text
//! cost[pt] += base_need[pt][c] × effective_price[c] × base_demand
//!             × (invention_factor, everyday/luxury only) × (strata_mod + 1)
//!             × weight[c] × tier_scale
//!
//! weight[c] → (1/√price[c]) / Σ(1/√price) × count     at alice_need_drift_speed
//! ```

use crate::defines::EconomyDefines;
use crate::definitions::{PopType, Strata};
use crate::ids::{CommodityId, DenseId, PopTypeId};
use crate::shard::{DayContext, NationShard};
use crate::state::{Commodity, Nation};
use crate::systems::employment::adjusted_subsistence_score;
use crate::systems::ledger::{register_demand, DemandReason};
use crate::table::Table;

/// Needs tier of a pop type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeedsTier {
    Life,
    Everyday,
    Luxury,
}

impl NeedsTier {
    pub const ALL: [NeedsTier; 3] = [NeedsTier::Life, NeedsTier::Everyday, NeedsTier::Luxury];

    fn flagged(self, commodity: &Commodity) -> bool {
        match self {
            NeedsTier::Life => commodity.is_life_need,
            NeedsTier::Everyday => commodity.is_everyday_need,
            NeedsTier::Luxury => commodity.is_luxury_need,
        }
    }

    fn weights(self, nation: &mut Nation) -> &mut Table<CommodityId, f32> {
        match self {
            NeedsTier::Life => &mut nation.life_needs_weights,
            NeedsTier::Everyday => &mut nation.everyday_needs_weights,
            NeedsTier::Luxury => &mut nation.luxury_needs_weights,
        }
    }
}

/// Per-strata demand multipliers `modifier + 1` for each tier.
#[derive(Debug, Clone, Copy)]
pub struct NeedsMultipliers {
    pub life: [f32; 3],
    pub everyday: [f32; 3],
    pub luxury: [f32; 3],
}

impl NeedsMultipliers {
    pub fn of(nation: &Nation) -> Self {
        let m = &nation.modifiers;
        Self {
            life: m.life_needs.map(|v| v + 1.0),
            everyday: m.everyday_needs.map(|v| v + 1.0),
            luxury: m.luxury_needs.map(|v| v + 1.0),
        }
    }
}

/// `base_goods_demand + goods_demand modifier`
#[inline]
pub fn base_demand(nation: &Nation, defines: &EconomyDefines) -> f32 {
    defines.base_goods_demand + nation.modifiers.goods_demand
}

/// Growth of everyday/luxury demand with unlocked inventions.
#[inline]
pub fn invention_factor(nation: &Nation, defines: &EconomyDefines) -> f32 {
    nation.num_inventions as f32 * defines.invention_impact_on_demand + 1.0
}

/// Importance of a good inside its tier (pure function).
#[inline]
pub fn need_weight(price: f32) -> f32 {
    1.0 / price.max(0.001).sqrt()
}

/// Start every available need at weight 1.
pub fn initialize_needs_weights(nation: &mut Nation, commodities: &Table<CommodityId, Commodity>) {
    for (c, commodity) in commodities.iter().skip(1) {
        if !nation.has_access(commodity) {
            continue;
        }
        for tier in NeedsTier::ALL {
            if tier.flagged(commodity) {
                tier.weights(nation)[c] = 1.0;
            }
        }
    }
}

/// Drift each tier's weights toward the price-implied ideal.
///
/// The ideal weights of a tier average to 1, so the tier's total stays at
/// its good count.
pub fn rebalance_needs_weights(
    nation: &mut Nation,
    commodities: &Table<CommodityId, Commodity>,
    defines: &EconomyDefines,
) {
    let drift = defines.alice_need_drift_speed;
    for tier in NeedsTier::ALL {
        let members: Vec<(CommodityId, f32)> = commodities
            .iter()
            .skip(1)
            .filter(|(_, commodity)| tier.flagged(commodity) && nation.has_access(commodity))
            .map(|(c, commodity)| (c, need_weight(commodity.current_price)))
            .collect();
        let total: f32 = members.iter().map(|(_, w)| w).sum();
        let count = members.len() as f32;
        if total <= 0.0 {
            continue;
        }

        let weights = tier.weights(nation);
        for (c, weight) in members {
            let ideal = weight / total * count;
            let w = &mut weights[c];
            *w = ideal * drift + *w * (1.0 - drift);
            debug_assert!(w.is_finite() && *w <= count + 0.01);
        }
    }
}

#[inline]
fn strata_of(pt: &PopType) -> usize {
    match pt.strata {
        Strata::Poor => 0,
        Strata::Middle => 1,
        Strata::Rich => 2,
    }
}

/// Accumulate the per-pop-type needs costs from effective prices.
///
/// Costs must have been cleared for the day.
pub fn populate_needs_costs(nation: &mut Nation, ctx: &DayContext<'_>, base_demand: f32, invention_factor: f32) {
    let defines = ctx.defines;
    let mul = NeedsMultipliers::of(nation);

    for c in ctx.goods() {
        if !ctx.is_available(nation, c) {
            continue;
        }
        let price = nation.effective_prices[c];
        let ln_weight = nation.life_needs_weights[c];
        let en_weight = nation.everyday_needs_weights[c];
        let lx_weight = nation.luxury_needs_weights[c];

        for (pt, pop_type) in ctx.definitions.pop_types.iter() {
            let s = strata_of(pop_type);
            nation.life_needs_costs[pt] += pop_type.life_needs.get_or_default(c)
                * price
                * base_demand
                * mul.life[s]
                * ln_weight
                * defines.alice_lf_needs_scale;
            nation.everyday_needs_costs[pt] += pop_type.everyday_needs.get_or_default(c)
                * price
                * base_demand
                * invention_factor
                * mul.everyday[s]
                * en_weight
                * defines.alice_ev_needs_scale;
            nation.luxury_needs_costs[pt] += pop_type.luxury_needs.get_or_default(c)
                * price
                * base_demand
                * invention_factor
                * mul.luxury[s]
                * lx_weight
                * defines.alice_lx_needs_scale;
        }
    }
}

/// Subsistence satisfaction split into tiers, each in `[0, 1]`.
///
/// The score fills life needs first, then everyday, then luxury.
pub fn split_subsistence(score: f32, defines: &EconomyDefines) -> [f32; 3] {
    let mut rest = score;
    let life = rest.clamp(0.0, defines.subsistence_score_life);
    rest -= life;
    let everyday = rest.clamp(0.0, defines.subsistence_score_everyday);
    rest -= everyday;
    let luxury = rest.clamp(0.0, defines.subsistence_score_luxury);
    [
        life / defines.subsistence_score_life,
        everyday / defines.subsistence_score_everyday,
        luxury / defines.subsistence_score_luxury,
    ]
}

/// Share of the remaining budget that can cover `cost`.
#[inline]
fn covered(budget: f32, cost: f32, to_satisfy: f32) -> f32 {
    if budget >= cost {
        to_satisfy
    } else if cost > 0.0 {
        (budget / cost).max(0.0)
    } else {
        0.0
    }
}

/// Pops spend savings on needs; register the resulting pop demand.
///
/// Capitalists and aristocrats divert part of what is left after life needs
/// into private investment when the nation allows it.
pub fn update_pop_consumption(
    shard: &mut NationShard,
    ctx: &DayContext<'_>,
    base_demand: f32,
    invention_factor: f32,
) {
    let defines = ctx.defines;
    let roles = ctx.definitions.roles;
    let pop_types = ctx.definitions.pop_types.len();
    let scaling = defines.alice_needs_scaling_factor;
    let nation = &mut shard.nation;
    let allows_investment = nation.is_civilized && nation.rules.allows_investment();

    let mut ln_demand = vec![0.0f32; pop_types];
    let mut en_demand = vec![0.0f32; pop_types];
    let mut lx_demand = vec![0.0f32; pop_types];

    for slot in shard.provinces.iter_mut() {
        let total_pop = ctx.demographics.province.get(slot.id).map_or(0.0, |d| d.total);
        let [sub_life, sub_everyday, sub_luxury] =
            split_subsistence(adjusted_subsistence_score(&slot.province, total_pop), defines);

        for (_, pop) in slot.pops.iter_mut() {
            let t = pop.pop_type;
            let size = pop.size;
            let mut budget = pop.savings;

            let ln_to = (1.0 - sub_life).max(0.0);
            let en_to = (1.0 - sub_everyday).max(0.0);
            let lx_to = (1.0 - sub_luxury).max(0.0);

            let ln_cost = ln_to * nation.life_needs_costs[t] * size / scaling;
            let en_cost = en_to * nation.everyday_needs_costs[t] * size / scaling;
            let lx_cost = lx_to * nation.luxury_needs_costs[t] * size / scaling;

            let mut life_frac = covered(budget, ln_cost, ln_to);
            budget = (budget - ln_cost).max(0.0);

            if allows_investment {
                let share = if t == roles.capitalists {
                    defines.alice_invest_capitalist
                } else if t == roles.aristocrats {
                    defines.alice_invest_aristocrat
                } else {
                    0.0
                };
                nation.private_investment += budget * share;
                budget -= budget * share;
            }

            let mut everyday_frac = covered(budget, en_cost, en_to);
            budget -= en_cost;
            let mut luxury_frac = covered(budget, lx_cost, lx_to);
            budget -= lx_cost;

            // Leftover money induces extra demand in every tier
            if budget > 0.0 {
                life_frac += budget * defines.alice_needs_lf_spend / ln_cost.max(0.001);
                everyday_frac += budget * defines.alice_needs_ev_spend / en_cost.max(0.001);
                luxury_frac += budget * defines.alice_needs_lx_spend / lx_cost.max(0.001);
            }
            debug_assert!(life_frac.is_finite() && everyday_frac.is_finite() && luxury_frac.is_finite());

            // Old satisfaction minus today's subsistence is the bought part
            let demand_life = ((pop.life_needs - sub_life).clamp(0.0, 1.0) * 0.9 + life_frac * 0.1).clamp(0.0, 1.0);
            let demand_everyday =
                ((pop.everyday_needs - sub_everyday).clamp(0.0, 1.0) * 0.9 + everyday_frac * 0.1).clamp(0.0, 1.0);
            let demand_luxury =
                ((pop.luxury_needs - sub_luxury).clamp(0.0, 1.0) * 0.9 + luxury_frac * 0.1).clamp(0.0, 1.0);

            pop.life_needs = (pop.life_needs * 0.99 + (life_frac + sub_life) * 0.01).clamp(0.0, 1.0);
            pop.everyday_needs = (pop.everyday_needs * 0.99 + (everyday_frac + sub_everyday) * 0.01).clamp(0.0, 1.0);
            pop.luxury_needs = (pop.luxury_needs * 0.99 + (luxury_frac + sub_luxury) * 0.01).clamp(0.0, 1.0);

            ln_demand[t.index()] += demand_life * size / scaling;
            en_demand[t.index()] += demand_everyday * size / scaling;
            lx_demand[t.index()] += demand_luxury * size / scaling;
        }
    }

    let mul = NeedsMultipliers::of(nation);
    for c in ctx.goods() {
        if !ctx.is_available(nation, c) {
            continue;
        }
        let ln_weight = nation.life_needs_weights[c];
        let en_weight = nation.everyday_needs_weights[c];
        let lx_weight = nation.luxury_needs_weights[c];

        for (pt, pop_type) in ctx.definitions.pop_types.iter() {
            let s = strata_of(pop_type);
            let i = pt.index();
            let life = pop_type.life_needs.get_or_default(c)
                * ln_demand[i]
                * base_demand
                * mul.life[s]
                * ln_weight
                * defines.alice_lf_needs_scale;
            let everyday = pop_type.everyday_needs.get_or_default(c)
                * en_demand[i]
                * base_demand
                * invention_factor
                * mul.everyday[s]
                * en_weight
                * defines.alice_ev_needs_scale;
            let luxury = pop_type.luxury_needs.get_or_default(c)
                * lx_demand[i]
                * base_demand
                * invention_factor
                * mul.luxury[s]
                * lx_weight
                * defines.alice_lx_needs_scale;

            register_demand(nation, &mut shard.demand, c, life, DemandReason::Pop);
            register_demand(nation, &mut shard.demand, c, everyday, DemandReason::Pop);
            register_demand(nation, &mut shard.demand, c, luxury, DemandReason::Pop);
        }
    }
}

/// Share of each tier's goods a pop type could actually get, by satisfaction.
///
/// `1.0` when the type needs nothing in that tier.
pub fn needs_satisfaction_caps(
    nation: &Nation,
    ctx: &DayContext<'_>,
    pt: PopTypeId,
) -> [f32; 3] {
    let pop_type = &ctx.definitions.pop_types[pt];
    let mut totals = [0.0f32; 3];
    let mut satisfied = [0.0f32; 3];

    for c in ctx.goods() {
        if !ctx.is_available(nation, c) {
            continue;
        }
        let sat = nation.demand_satisfaction[c];
        let weighted = [
            pop_type.life_needs.get_or_default(c) * nation.life_needs_weights[c],
            pop_type.everyday_needs.get_or_default(c) * nation.everyday_needs_weights[c],
            pop_type.luxury_needs.get_or_default(c) * nation.luxury_needs_weights[c],
        ];
        for tier in 0..3 {
            totals[tier] += weighted[tier];
            satisfied[tier] += weighted[tier] * sat;
        }
    }

    [0, 1, 2].map(|tier| {
        if totals[tier] > 0.0 {
            satisfied[tier] / totals[tier]
        } else {
            1.0
        }
    })
}

/// Cap each pop's bought satisfaction by what the market could deliver.
///
/// Subsistence is exempt: `x = min(x - sub, cap) + sub`.
pub fn cap_needs_by_satisfaction(shard: &mut NationShard, ctx: &DayContext<'_>) {
    let caps: Vec<[f32; 3]> = ctx
        .definitions
        .pop_types
        .ids()
        .map(|pt| needs_satisfaction_caps(&shard.nation, ctx, pt))
        .collect();

    for slot in shard.provinces.iter_mut() {
        let total_pop = ctx.demographics.province.get(slot.id).map_or(0.0, |d| d.total);
        let [sub_life, sub_everyday, sub_luxury] =
            split_subsistence(adjusted_subsistence_score(&slot.province, total_pop), ctx.defines);
        for (_, pop) in slot.pops.iter_mut() {
            let [ln_max, en_max, lx_max] = caps[pop.pop_type.index()];
            pop.life_needs = (pop.life_needs - sub_life).min(ln_max) + sub_life;
            pop.everyday_needs = (pop.everyday_needs - sub_everyday).min(en_max) + sub_everyday;
            pop.luxury_needs = (pop.luxury_needs - sub_luxury).min(lx_max) + sub_luxury;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NationId;
    use crate::math::pseudo_exp_for_negative;
    use crate::testing::WorldBuilder;

    fn world() -> crate::state::WorldState {
        WorldBuilder::new()
            .with_goods(&["grain", "wine"])
            .with_price("grain", 1.0)
            .with_price("wine", 4.0)
            .with_nation("A")
            .with_state(0, &[0])
            .with_pops_in(0, &[("farmers", 10_000.0)])
            .build()
    }

    #[test]
    fn test_need_weight() {
        assert_eq!(need_weight(4.0), 0.5);
        // Floor at 0.001 keeps the weight finite
        assert!(need_weight(0.0).is_finite());
    }

    #[test]
    fn test_rebalance_drifts_toward_cheaper_goods() {
        let world = world();
        let defines = EconomyDefines {
            alice_need_drift_speed: 1.0,
            ..Default::default()
        };
        let mut nation = world.nations[NationId(0)].clone();
        initialize_needs_weights(&mut nation, &world.commodities);
        rebalance_needs_weights(&mut nation, &world.commodities, &defines);

        // weights 1/√1 = 1 and 1/√4 = 0.5, total 1.5, count 2
        // ideal(grain) = 1/1.5*2 = 1.333, ideal(wine) = 0.5/1.5*2 = 0.667
        let grain = nation.everyday_needs_weights[CommodityId(1)];
        let wine = nation.everyday_needs_weights[CommodityId(2)];
        assert!((grain - 4.0 / 3.0).abs() < 1e-5);
        assert!((wine - 2.0 / 3.0).abs() < 1e-5);
        // Tier total stays at its good count
        assert!((grain + wine - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_needs_costs_use_effective_prices() {
        let world = world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        let mut nation = world.nations[NationId(0)].clone();
        initialize_needs_weights(&mut nation, &world.commodities);

        populate_needs_costs(&mut nation, &ctx, 1.0, 1.0);
        let farmers = world.definitions.roles.farmers;
        // Life needs: 1 grain at price 1
        assert!((nation.life_needs_costs[farmers] - 1.0).abs() < 1e-6);
        // Everyday: 0.5 grain × 1 + 0.5 wine × 4 = 2.5
        assert!((nation.everyday_needs_costs[farmers] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_split_subsistence_fills_life_first() {
        let defines = EconomyDefines::default();
        assert_eq!(split_subsistence(15.0, &defines), [0.5, 0.0, 0.0]);
        assert_eq!(split_subsistence(45.0, &defines), [1.0, 0.5, 0.0]);
        assert_eq!(split_subsistence(-3.0, &defines), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_satisfaction_caps_default_to_one() {
        let world = world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        let nation = world.nations[NationId(0)].clone();
        // Weights are still 0, so every tier total is 0
        let caps = needs_satisfaction_caps(&nation, &ctx, world.definitions.roles.farmers);
        assert_eq!(caps, [1.0, 1.0, 1.0]);
    }
}
