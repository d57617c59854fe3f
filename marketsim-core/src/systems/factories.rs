//! Factory production: multipliers, the scale-update law, input demand and
//! subsidies.
//!
//! All per-level figures assume one level filled with workers; the scale law
//! then decides how many levels actually run.
//!
//! ```text
//! production/level = output_amount × (0.75 + 0.25 × min_e) × throughput × output × min_input
//! spend/level      = min_wage × workers_per_level / scaling
//!                    + input × throughput × input_cost × min_input
//!                    + input × maintenance × e_input_cost × min_e × min_input
//! desired profit   = spend × (margin + secondary × level / clerk_divisor)
//! ```

use crate::definitions::FactoryType;
use crate::defines::EconomyDefines;
use crate::demographics::PopCounts;
use crate::external::TriggerEvaluator;
use crate::ids::*;
use crate::shard::DayContext;
use crate::state::{Commodity, Factory, Nation, Province, WorldState};
use crate::systems::budget::can_take_loans;
use crate::systems::employment::factory_max_employment;
use crate::systems::ledger::{register_domestic_supply, register_intermediate_demand, DemandAccumulator, DemandReason};
use tracing::instrument;

// ============================================================================
// Inputs
// ============================================================================

/// Cost of one unit-run of inputs at the nation's effective prices.
#[inline]
pub fn factory_input_total_cost(nation: &Nation, factory_type: &FactoryType) -> f32 {
    factory_type.inputs.value_at(|c| nation.effective_prices.get_or_default(c))
}

#[inline]
pub fn factory_min_input_available(nation: &Nation, factory_type: &FactoryType) -> f32 {
    factory_type.inputs.min_of(|c| nation.demand_satisfaction.get_or_default(c))
}

#[inline]
pub fn factory_e_input_total_cost(nation: &Nation, factory_type: &FactoryType) -> f32 {
    factory_type.efficiency_inputs.value_at(|c| nation.effective_prices.get_or_default(c))
}

#[inline]
pub fn factory_min_e_input_available(nation: &Nation, factory_type: &FactoryType) -> f32 {
    factory_type.efficiency_inputs.min_of(|c| nation.demand_satisfaction.get_or_default(c))
}

// ============================================================================
// Multipliers
// ============================================================================

/// Input multiplier, discounted for small factories and penalized by
/// capitalist presence in the state.
pub fn factory_input_multiplier(
    factory: &Factory,
    nation: &Nation,
    province: &Province,
    state_demo: Option<&PopCounts>,
    capitalists: PopTypeId,
    defines: &EconomyDefines,
) -> f32 {
    let total_workers = factory_max_employment(factory, defines);
    let small_bound = defines.alice_factory_per_level_employment * defines.factory_small_size_levels;
    let small_size_effect = if total_workers < small_bound {
        0.5 + total_workers / small_bound * 0.5
    } else {
        1.0
    };

    let owner_fraction = state_demo.map_or(0.0, |demo| {
        let total = demo.total.max(0.01);
        (demo.of(capitalists) / total).min(defines.factory_owner_fraction_cap)
    });

    small_size_effect
        * factory.triggered_modifiers
        * (defines.alice_inputs_base_factor
            + province.modifiers.local_factory_input
            + nation.modifiers.factory_input
            - owner_fraction * defines.factory_owner_input_penalty)
            .max(defines.factory_multiplier_floor)
}

#[inline]
pub fn factory_throughput_multiplier(factory_type: &FactoryType, nation: &Nation, province: &Province) -> f32 {
    nation.factory_goods_throughput.get_or_default(factory_type.output)
        + province.modifiers.local_factory_throughput
        + nation.modifiers.factory_throughput
        + 1.0
}

/// Output multiplier; clerks add to it.
#[inline]
pub fn factory_output_multiplier(
    factory: &Factory,
    factory_type: &FactoryType,
    nation: &Nation,
    province: &Province,
    defines: &EconomyDefines,
) -> f32 {
    nation.factory_goods_output.get_or_default(factory_type.output)
        + province.modifiers.local_factory_output
        + nation.modifiers.factory_output
        + factory.secondary_employment * (1.0 - defines.craftsmen_fraction) * defines.factory_clerk_output_bonus
        + 1.0
}

/// Levels the current workforce can run.
#[inline]
pub fn factory_max_production_scale(
    factory: &Factory,
    mobilization_impact: f32,
    occupied: bool,
    defines: &EconomyDefines,
) -> f32 {
    let occupation = if occupied { defines.occupied_factory_scale } else { 1.0 };
    factory.primary_employment * factory.level as f32 * occupation * mobilization_impact.max(0.0)
}

#[inline]
pub fn factory_desired_raw_profit(factory: &Factory, spendings: f32, defines: &EconomyDefines) -> f32 {
    spendings
        * (defines.factory_desired_profit_margin
            + factory.secondary_employment * factory.level as f32 / defines.factory_desired_profit_clerk_divisor)
}

/// Move the production scale toward the desired profit and return the
/// effective scale in levels.
///
/// Step size is capped by the factory's share of its good's world market.
/// Subsidized factories ramp up regardless of profit.
pub fn update_factory_scale(
    factory: &mut Factory,
    factory_type: &FactoryType,
    output: &Commodity,
    max_production_scale: f32,
    raw_profit: f32,
    desired_raw_profit: f32,
    defines: &EconomyDefines,
) -> f32 {
    let level = factory.level as f32;
    let several_workers_scale = defines.factory_scale_step_workers / factory_max_employment(factory, defines);

    let relative_production = factory_type.output_amount
        / (output.total_production + output.total_real_demand + defines.factory_market_size_offset);
    let relative_modifier = (1.0 / (relative_production + 0.01)) / defines.factory_speed_clamp_divisor;

    if factory.subsidized {
        let scale = (factory.production_scale + several_workers_scale * level * defines.factory_subsidy_ramp).min(1.0);
        factory.production_scale = scale;
        return (scale * level).min(max_production_scale);
    }

    let over = raw_profit / (desired_raw_profit + 0.0001) - 1.0;
    let under = desired_raw_profit / (raw_profit + 0.0001) - 1.0;
    let direction = if raw_profit - desired_raw_profit > 0.0 { 1.0 } else { -1.0 };
    let speed = (defines.production_scale_delta * (over - under) + several_workers_scale * direction)
        .clamp(-relative_modifier, relative_modifier);

    let scale = (factory.production_scale + speed).clamp(0.0, 1.0);
    factory.production_scale = scale;
    (scale * level).min(max_production_scale)
}

// ============================================================================
// Daily consumption and production
// ============================================================================

/// Per-day environment of one factory.
pub struct FactorySite<'a> {
    pub province: &'a Province,
    pub state_demo: Option<&'a PopCounts>,
    pub mobilization_impact: f32,
    pub occupied: bool,
}

/// Compute the factory's profit, update its scale and register input demand.
pub fn update_single_factory_consumption(
    factory: &mut Factory,
    nation: &mut Nation,
    demand: &mut DemandAccumulator,
    site: &FactorySite<'_>,
    ctx: &DayContext<'_>,
    min_wage: f32,
) {
    let defines = ctx.defines;
    let Some(factory_type) = ctx.definitions.factory_types.get(factory.building_type) else {
        return;
    };
    let max_production_scale = factory_max_production_scale(factory, site.mobilization_impact, site.occupied, defines);

    let input_total = factory_input_total_cost(nation, factory_type);
    let min_input = factory_min_input_available(nation, factory_type);
    let e_input_total = factory_e_input_total_cost(nation, factory_type);
    let min_e_input = factory_min_e_input_available(nation, factory_type);

    let input_multiplier = factory_input_multiplier(
        factory,
        nation,
        site.province,
        site.state_demo,
        ctx.definitions.roles.capitalists,
        defines,
    );
    let mfactor = nation.modifiers.factory_maintenance + 1.0;
    let throughput = factory_throughput_multiplier(factory_type, nation, site.province);
    let output_multiplier = factory_output_multiplier(factory, factory_type, nation, site.province, defines);

    let total_production = factory_type.output_amount
        * (0.75 + 0.25 * min_e_input)
        * throughput
        * output_multiplier
        * min_input;
    let profit = total_production * ctx.price(factory_type.output);
    let spendings = min_wage * defines.factory_workers_per_level_scaled()
        + input_multiplier * throughput * input_total * min_input
        + input_multiplier * mfactor * e_input_total * min_e_input * min_input;

    let desired_profit = factory_desired_raw_profit(factory, spendings, defines);
    let max_pure_profit = profit - spendings;
    factory.unprofitable = !(max_pure_profit > 0.0);

    let effective_scale = update_factory_scale(
        factory,
        factory_type,
        &ctx.commodities[factory_type.output],
        max_production_scale,
        profit,
        desired_profit,
        defines,
    );

    let input_scale = input_multiplier * throughput * effective_scale * (0.1 + 0.9 * min_input);
    for (c, amount) in factory_type.inputs.iter() {
        register_intermediate_demand(nation, demand, c, input_scale * amount, DemandReason::Factory, ctx.price(c));
    }
    for (c, amount) in factory_type.efficiency_inputs.iter() {
        register_intermediate_demand(
            nation,
            demand,
            c,
            mfactor * input_scale * amount * (0.1 + 0.9 * min_e_input),
            DemandReason::Factory,
            ctx.price(c),
        );
    }

    factory.actual_production = total_production * effective_scale;
    factory.full_profit = max_pure_profit * effective_scale;
}

/// Book the factory's output. A subsidized factory that cannot cover its
/// wage bill is topped up from the treasury, or loses its subsidy.
pub fn update_single_factory_production(
    factory: &mut Factory,
    nation: &mut Nation,
    ctx: &DayContext<'_>,
    min_wage: f32,
) {
    let production = factory.actual_production;
    if production <= 0.0 {
        return;
    }
    let Some(factory_type) = ctx.definitions.factory_types.get(factory.building_type) else {
        return;
    };
    register_domestic_supply(nation, factory_type.output, production, ctx.price(factory_type.output));

    if !factory.subsidized {
        return;
    }
    let money_made = factory.full_profit;
    let min_wages = min_wage
        * factory.level as f32
        * factory.primary_employment
        * ctx.defines.factory_workers_per_level_scaled();
    if money_made >= min_wages {
        return;
    }
    let diff = min_wages - money_made;
    if nation.treasury() > diff || can_take_loans(nation, ctx.date) {
        factory.full_profit = min_wages;
        *nation.treasury_mut() -= diff;
        nation.subsidies_spending += diff;
    } else {
        factory.full_profit = money_made.max(0.0);
        factory.subsidized = false;
        log::debug!("factory of type {} lost its subsidy", factory.building_type);
    }
}

// ============================================================================
// Triggered bonuses
// ============================================================================

/// `1 - Σ amount` over the factory type's bonuses whose trigger holds for the
/// factory's state and owner (pure function of the evaluator).
pub fn factory_triggered_modifier(
    world: &WorldState,
    factory: &Factory,
    triggers: &dyn TriggerEvaluator,
) -> f32 {
    let Some(factory_type) = world.definitions.factory_types.get(factory.building_type) else {
        return 1.0;
    };
    let Some(province) = world.provinces.get(factory.location) else {
        return 1.0;
    };
    let Some(owner) = province.owner else {
        return 1.0;
    };
    factory_type
        .bonuses
        .iter()
        .filter(|bonus| triggers.evaluate(world, bonus.trigger, province.state, owner))
        .fold(1.0, |sum, bonus| sum - bonus.amount)
}

#[instrument(skip_all, name = "factory_triggers")]
pub fn update_factory_triggered_modifiers(world: &mut WorldState, triggers: &dyn TriggerEvaluator) {
    let sums: Vec<f32> = world
        .factories
        .values()
        .map(|factory| factory_triggered_modifier(world, factory, triggers))
        .collect();
    for (factory, sum) in world.factories.values_mut().zip(sums) {
        factory.triggered_modifiers = sum;
    }
}

/// Factories in provinces of `s` held by the state's owner.
///
/// Scans the factory table directly so factories founded earlier in the
/// same day are seen before the index is rebuilt.
pub fn factories_in_state(world: &WorldState, s: StateId) -> impl Iterator<Item = (FactoryId, &Factory)> {
    let owner = world.states[s].owner;
    world.factories.iter().filter(move |(_, f)| {
        let province = &world.provinces[f.location];
        province.state == s && province.owner == Some(owner)
    })
}

/// Whether the state has a factory of type `ft`, built or under construction.
pub fn state_contains_factory(world: &WorldState, s: StateId, ft: FactoryTypeId) -> bool {
    factories_in_state(world, s).any(|(_, f)| f.building_type == ft)
        || world
            .constructions
            .state_buildings
            .iter()
            .any(|c| c.state == s && c.factory_type == ft)
}

/// Factories counted against the state's slot limit: existing ones plus new
/// (non-upgrade) projects.
pub fn state_factory_count(world: &WorldState, s: StateId) -> usize {
    let projects = world
        .constructions
        .state_buildings
        .iter()
        .filter(|c| c.state == s && !c.is_upgrade)
        .count();
    factories_in_state(world, s).count() + projects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::FactoryBonus;
    use crate::math::pseudo_exp_for_negative;
    use crate::testing::WorldBuilder;

    fn textile_world() -> WorldState {
        WorldBuilder::new()
            .with_goods(&["grain", "cloth"])
            .with_price("grain", 1.0)
            .with_price("cloth", 3.0)
            .with_factory_type("textile", "cloth", 1.0, &[("grain", 2.0)])
            .with_nation("A")
            .with_state(0, &[0])
            .with_pops_in(0, &[("craftsmen", 50_000.0)])
            .with_factory(0, "textile", 1)
            .build()
    }

    fn site(province: &Province) -> FactorySite<'_> {
        FactorySite {
            province,
            state_demo: None,
            mobilization_impact: 1.0,
            occupied: false,
        }
    }

    #[test]
    fn test_small_factory_gets_input_discount() {
        let world = textile_world();
        let defines = EconomyDefines::default();
        let factory = &world.factories[FactoryId(0)];
        let nation = &world.nations[NationId(0)];
        let province = &world.provinces[ProvinceId(0)];
        // 10000 workers of a 50000 bound: 0.5 + 0.2 × 0.5 = 0.6
        let m = factory_input_multiplier(factory, nation, province, None, PopTypeId(0), &defines);
        assert!((m - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_break_even_factory_is_profitable() {
        let world = textile_world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        let mut factory = world.factories[FactoryId(0)].clone();
        factory.primary_employment = 1.0;
        let mut nation = world.nations[NationId(0)].clone();
        let mut demand = DemandAccumulator::new(world.commodity_count());
        let province = world.provinces[ProvinceId(0)].clone();

        update_single_factory_consumption(&mut factory, &mut nation, &mut demand, &site(&province), &ctx, 0.0);
        assert!(!factory.unprofitable);
        assert!(factory.actual_production > 0.0);
        assert!(nation.intermediate_demand[CommodityId(1)] > 0.0);
        assert!(demand.get(CommodityId(1), DemandReason::Factory) > 0.0);
    }

    #[test]
    fn test_occupied_factory_runs_at_reduced_scale() {
        let world = textile_world();
        let defines = EconomyDefines::default();
        let mut factory = world.factories[FactoryId(0)].clone();
        factory.primary_employment = 1.0;
        assert_eq!(factory_max_production_scale(&factory, 1.0, false, &defines), 1.0);
        assert!((factory_max_production_scale(&factory, 1.0, true, &defines) - 0.1).abs() < 1e-6);
        assert_eq!(factory_max_production_scale(&factory, -1.0, false, &defines), 0.0);
    }

    #[test]
    fn test_subsidized_factory_ramps_up() {
        let world = textile_world();
        let defines = EconomyDefines::default();
        let mut factory = world.factories[FactoryId(0)].clone();
        factory.production_scale = 0.0;
        factory.subsidized = true;
        let ft = &world.definitions.factory_types[FactoryTypeId(0)];
        // 10 / 10000 × 1 × 10 = 0.01 per day
        let scale = update_factory_scale(&mut factory, ft, &world.commodities[CommodityId(2)], 1.0, 0.0, 5.0, &defines);
        assert!((factory.production_scale - 0.01).abs() < 1e-6);
        assert!((scale - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_subsidy_dropped_without_funds() {
        let world = textile_world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        let mut factory = world.factories[FactoryId(0)].clone();
        factory.subsidized = true;
        factory.primary_employment = 1.0;
        factory.actual_production = 1.0;
        factory.full_profit = -1.0;
        let mut nation = world.nations[NationId(0)].clone();

        update_single_factory_production(&mut factory, &mut nation, &ctx, 10.0);
        assert!(!factory.subsidized);
        assert_eq!(factory.full_profit, 0.0);
        assert_eq!(nation.domestic_market_pool[CommodityId(2)], 1.0);
    }

    #[test]
    fn test_subsidy_paid_from_treasury() {
        let world = textile_world();
        let defines = EconomyDefines::default();
        let ctx = DayContext::new(&world, &defines, false, pseudo_exp_for_negative);
        let mut factory = world.factories[FactoryId(0)].clone();
        factory.subsidized = true;
        factory.primary_employment = 1.0;
        factory.actual_production = 1.0;
        let mut nation = world.nations[NationId(0)].clone();
        *nation.treasury_mut() = 100.0;

        // min wages = 10 × 1 × 1 × 10000 / 200000 = 0.5
        update_single_factory_production(&mut factory, &mut nation, &ctx, 10.0);
        assert!((factory.full_profit - 0.5).abs() < 1e-6);
        assert!((nation.treasury() - 99.5).abs() < 1e-4);
        assert!((nation.subsidies_spending - 0.5).abs() < 1e-6);
    }

    struct Always;
    impl TriggerEvaluator for Always {
        fn evaluate(&self, _: &WorldState, _: TriggerId, _: StateId, _: NationId) -> bool {
            true
        }
    }

    #[test]
    fn test_triggered_bonuses_reduce_inputs() {
        let mut world = WorldBuilder::new()
            .with_goods(&["grain", "cloth"])
            .with_factory_type("textile", "cloth", 1.0, &[("grain", 1.0)])
            .with_factory_type_config("textile", |ft| {
                ft.bonuses = vec![
                    FactoryBonus { trigger: TriggerId(0), amount: 0.25 },
                    FactoryBonus { trigger: TriggerId(1), amount: 0.1 },
                ];
            })
            .with_nation("A")
            .with_state(0, &[0])
            .with_factory(0, "textile", 1)
            .build();
        update_factory_triggered_modifiers(&mut world, &Always);
        assert!((world.factories[FactoryId(0)].triggered_modifiers - 0.65).abs() < 1e-6);

        update_factory_triggered_modifiers(&mut world, &crate::external::NoTriggers);
        assert_eq!(world.factories[FactoryId(0)].triggered_modifiers, 1.0);
    }
}
