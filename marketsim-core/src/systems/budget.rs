//! National budget: loans, slider bounds, minimum wages, the daily spending
//! plan and refunds for goods the market could not deliver.
//!
//! ```text
//! total  = military upkeep + construction + stockpile refill + overseas penalty
//!          + transfers (admin², education², military², social × admin_eff, investment²)
//! scale  = 1                      if total <= budget, or the nation may borrow
//!        = budget / total         otherwise
//! refund = Σ unmet share × scale × price    (army, navy, stockpiles, overseas)
//! ```

use crate::definitions::{IncomeType, PopType};
use crate::defines::EconomyDefines;
use crate::demographics::PopCounts;
use crate::ids::*;
use crate::shard::DayContext;
use crate::state::{Date, Nation, WorldState};
use crate::systems::ledger::{register_demand, DemandAccumulator, DemandReason};
use crate::table::Table;
use tracing::instrument;

// ============================================================================
// Loans
// ============================================================================

/// Player nations with debt spending on may borrow unless still bankrupt.
#[inline]
pub fn can_take_loans(nation: &Nation, today: Date) -> bool {
    nation.is_player_controlled
        && nation.is_debt_spending
        && !nation.bankrupt_until.is_some_and(|until| until > today)
}

/// Daily interest on a negative treasury. Zero while in credit.
pub fn interest_payment(nation: &Nation, defines: &EconomyDefines) -> f32 {
    let debt = nation.treasury();
    if debt >= 0.0 {
        return 0.0;
    }
    -debt * ((nation.modifiers.loan_interest + 1.0) * defines.loan_base_interest).max(0.01) / 30.0
}

/// Debt ceiling: pop income scaled by the loan modifier.
#[inline]
pub fn max_loan(nation: &Nation) -> f32 {
    (nation.total_income() * (nation.modifiers.max_loan_modifier + 1.0)).max(0.0)
}

// ============================================================================
// Slider bounds
// ============================================================================

/// Modifier window in percent. A non-positive upper bound means "no cap"
/// unless `uncapped_max` is false.
fn modifier_window(min: f32, max: f32, uncapped_max: bool) -> (i32, i32) {
    let lo = (100.0 * min) as i32;
    let mut hi = (100.0 * max) as i32;
    if uncapped_max && hi <= 0 {
        hi = 100;
    }
    (lo, hi.max(lo))
}

/// Clamp tariffs, taxes and policy spending into the windows allowed by the
/// nation's modifiers.
pub fn bound_budget_settings(nation: &mut Nation) {
    let m = &nation.modifiers;
    let budget = &mut nation.budget;

    let (lo, hi) = modifier_window(m.min_tariff, m.max_tariff, false);
    budget.tariffs.clamp_to(lo, hi);

    let (lo, hi) = modifier_window(m.min_tax, m.max_tax, true);
    for tax in [&mut budget.poor_tax, &mut budget.middle_tax, &mut budget.rich_tax] {
        tax.clamp_to(lo, hi);
    }

    let (lo, hi) = modifier_window(m.min_military_spending, m.max_military_spending, true);
    budget.military.clamp_to(lo, hi);

    let (lo, hi) = modifier_window(m.min_social_spending, m.max_social_spending, true);
    budget.social.clamp_to(lo, hi);

    let (lo, hi) = modifier_window(m.min_domestic_investment, m.max_domestic_investment, true);
    budget.domestic_investment.clamp_to(lo, hi);
}

// ============================================================================
// Minimum wages
// ============================================================================

/// Per-nation minimum wages, in money per needs-scaling unit of workers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MinWages {
    pub factory: f32,
    pub artisan: f32,
    pub farmer: f32,
    pub laborer: f32,
}

impl MinWages {
    /// Requires the nation's needs costs for today.
    pub fn of(nation: &Nation, demo: Option<&PopCounts>, ctx: &DayContext<'_>) -> Self {
        let roles = &ctx.definitions.roles;
        let factor = nation.modifiers.minimum_wage;
        let margin = ctx.defines.minimum_wage_margin;
        let basket = |pt: PopTypeId| {
            nation.life_needs_costs.get_or_default(pt) + nation.everyday_needs_costs.get_or_default(pt)
        };

        let pfw = roles.primary_factory_worker;
        let crisis = demo.map_or(1.0, |d| {
            let total = d.of(pfw);
            if total > 0.0 {
                d.employed(pfw) / total
            } else {
                1.0
            }
        });

        Self {
            factory: factor * basket(pfw) * margin * crisis * crisis * crisis,
            artisan: nation.life_needs_costs.get_or_default(roles.artisans)
                + 0.5 * nation.everyday_needs_costs.get_or_default(roles.artisans),
            farmer: factor * basket(roles.farmers) * margin,
            laborer: factor * basket(roles.laborers) * margin,
        }
    }

    #[inline]
    pub fn rgo(&self, is_mine: bool) -> f32 {
        if is_mine {
            self.laborer
        } else {
            self.farmer
        }
    }
}

// ============================================================================
// Military upkeep
// ============================================================================

fn populate_unit_consumption(world: &mut WorldState, naval: bool) {
    let commodities = world.commodity_count();
    let mut demand: Table<NationId, Table<CommodityId, f32>> =
        Table::filled(world.nations.len(), Table::filled(commodities, 0.0));

    for unit in &world.units {
        let Some(unit_type) = world.definitions.unit_types.get(unit.unit_type) else {
            continue;
        };
        if unit_type.is_naval != naval {
            continue;
        }
        let Some(owner) = world.nations.get(unit.nation) else {
            continue;
        };
        let supply_mod = (owner.modifiers.supply_consumption + 1.0).max(0.01);
        let stat = owner
            .unit_supply_consumption
            .get(unit.unit_type)
            .copied()
            .unwrap_or(1.0);
        for (c, amount) in unit_type.supply_cost.iter() {
            demand[unit.nation][c] += amount * stat * supply_mod;
        }
    }

    for (nation, column) in world.nations.values_mut().zip(demand.into_rows()) {
        if naval {
            nation.navy_demand = column;
        } else {
            nation.army_demand = column;
        }
    }
}

/// Supply upkeep of every regiment, per owner.
#[instrument(skip_all, name = "army_consumption")]
pub fn populate_army_consumption(world: &mut WorldState) {
    populate_unit_consumption(world, false);
}

/// Supply upkeep of every ship, per owner.
#[instrument(skip_all, name = "navy_consumption")]
pub fn populate_navy_consumption(world: &mut WorldState) {
    populate_unit_consumption(world, true);
}

// ============================================================================
// Spending plan
// ============================================================================

/// Transfer rates per spending line, each already squared where the slider
/// is superlinear.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferRates {
    pub administration: f32,
    pub social: f32,
    pub education: f32,
    pub military: f32,
    pub pension: f32,
    pub unemployment: f32,
    pub domestic_investment: f32,
}

impl TransferRates {
    /// Rates at the given spending scale (1 when planning the budget).
    pub fn of(nation: &Nation, scale: f32) -> Self {
        let b = &nation.budget;
        let squared = |v: f32| v * v;
        Self {
            administration: scale * squared(b.administrative.fraction()),
            social: scale * nation.administrative_efficiency * b.social.fraction(),
            education: scale * squared(b.education.fraction()),
            military: scale * squared(b.military.fraction()),
            pension: nation.modifiers.pension_level,
            unemployment: nation.modifiers.unemployment_benefit,
            domestic_investment: scale * squared(b.domestic_investment.fraction()),
        }
    }

    /// Rate paid for a needs tier funded by `income`. `None` tiers are not
    /// state funded.
    #[inline]
    pub fn for_income(&self, income: IncomeType) -> f32 {
        match income {
            IncomeType::Administration => self.administration,
            IncomeType::Education => self.education,
            IncomeType::Military => self.military,
            IncomeType::None => 0.0,
        }
    }
}

/// Daily transfers owed to `adj_pop` (pop size over the needs scale) of type
/// `pt`, with `adj_employed` of them in work.
pub fn pop_type_transfers(
    nation: &Nation,
    pt: PopTypeId,
    pop_type: &PopType,
    rates: &TransferRates,
    adj_pop: f32,
    adj_employed: f32,
) -> f32 {
    let ln = nation.life_needs_costs.get_or_default(pt);
    let en = nation.everyday_needs_costs.get_or_default(pt);
    let lx = nation.luxury_needs_costs.get_or_default(pt);

    let mut total = match pop_type.life_needs_income {
        IncomeType::None => {
            let mut social = rates.social * adj_pop * rates.pension * ln;
            if pop_type.has_unemployment {
                social += rates.social * (adj_pop - adj_employed) * rates.unemployment * ln;
            }
            social
        }
        income => rates.for_income(income) * adj_pop * ln,
    };
    total += rates.for_income(pop_type.everyday_needs_income) * adj_pop * en;
    total += rates.for_income(pop_type.luxury_needs_income) * adj_pop * lx;
    total
}

/// Overseas provinces times the per-province penalty.
#[inline]
pub fn overseas_factor(nation: &Nation, owned_provinces: usize, defines: &EconomyDefines) -> f32 {
    defines.province_overseas_penalty * (owned_provinces as f32 - nation.central_province_count as f32)
}

/// Whether `c` is an overseas-penalty good the nation can use.
#[inline]
fn is_overseas_good(nation: &Nation, ctx: &DayContext<'_>, c: CommodityId) -> bool {
    ctx.commodities[c].overseas_penalty && ctx.is_available(nation, c)
}

#[inline]
fn stockpile_gap(nation: &Nation, c: CommodityId) -> f32 {
    if nation.drawing_on_stockpiles[c] {
        return 0.0;
    }
    (nation.stockpile_targets[c] - nation.stockpiles[c]).max(0.0)
}

/// Desired daily spend at full sliders. Also records the military part in
/// `maximum_military_costs`.
pub fn full_spending_cost(nation: &mut Nation, n: NationId, ctx: &DayContext<'_>) -> f32 {
    let defines = ctx.defines;
    let b = nation.budget;
    let price = |c: CommodityId| nation.effective_prices[c];

    let mut military = 0.0f32;
    for c in ctx.goods() {
        military += nation.army_demand[c] * b.land.fraction() * price(c);
    }
    for c in ctx.goods() {
        military += nation.navy_demand[c] * b.naval.fraction() * price(c);
    }
    debug_assert!(military.is_finite() && military >= 0.0);

    let mut total = military;
    for c in ctx.goods() {
        total += nation.construction_demand[c] * b.construction.fraction() * price(c);
    }
    for c in ctx.goods() {
        total += stockpile_gap(nation, c) * price(c);
    }

    let overseas = overseas_factor(nation, ctx.index.owned_province_count(n), defines);
    if overseas > 0.0 {
        for c in ctx.goods() {
            if is_overseas_good(nation, ctx, c) {
                total += overseas * price(c) * b.overseas.fraction();
            }
        }
    }

    let Some(demo) = ctx.demographics.nation.get(n) else {
        nation.maximum_military_costs = military;
        return total;
    };
    let roles = &ctx.definitions.roles;
    let rates = TransferRates::of(nation, 1.0);
    let scaling = defines.alice_needs_scaling_factor;

    total += defines.alice_domestic_investment_multiplier
        * rates.domestic_investment
        * (demo.of(roles.capitalists) * nation.luxury_needs_costs.get_or_default(roles.capitalists)
            + demo.of(roles.aristocrats) * nation.luxury_needs_costs.get_or_default(roles.aristocrats))
        / scaling;

    for (pt, pop_type) in ctx.definitions.pop_types.iter() {
        let adj_pop = demo.of(pt) / scaling;
        if adj_pop <= 0.0 {
            continue;
        }
        total += pop_type_transfers(nation, pt, pop_type, &rates, adj_pop, demo.employed(pt) / scaling);
    }
    debug_assert!(total.is_finite() && total >= 0.0);

    nation.maximum_military_costs = military;
    total
}

/// Cost of today's private construction demand at effective prices.
pub fn full_private_investment_cost(nation: &Nation) -> f32 {
    nation
        .private_construction_demand
        .iter()
        .skip(1)
        .map(|(c, amount)| amount * nation.effective_prices[c])
        .sum()
}

/// Register government and private purchase demand at the given scales.
pub fn update_national_consumption(
    nation: &mut Nation,
    demand: &mut DemandAccumulator,
    n: NationId,
    ctx: &DayContext<'_>,
    spending_scale: f32,
    private_investment_scale: f32,
) {
    let b = nation.budget;
    for c in ctx.goods() {
        let amount = nation.army_demand[c] * b.land.fraction() * spending_scale;
        register_demand(nation, demand, c, amount, DemandReason::Nation);
    }
    for c in ctx.goods() {
        let amount = nation.navy_demand[c] * b.naval.fraction() * spending_scale;
        register_demand(nation, demand, c, amount, DemandReason::Nation);
    }
    for c in ctx.goods() {
        let amount = nation.construction_demand[c] * b.construction.fraction() * spending_scale;
        register_demand(nation, demand, c, amount, DemandReason::Construction);
    }
    for c in ctx.goods() {
        let amount = nation.private_construction_demand[c] * private_investment_scale;
        register_demand(nation, demand, c, amount, DemandReason::Construction);
    }
    for c in ctx.goods() {
        let gap = stockpile_gap(nation, c);
        if gap > 0.0 {
            register_demand(nation, demand, c, gap * spending_scale, DemandReason::Stockpile);
        }
    }
    let overseas = overseas_factor(nation, ctx.index.owned_province_count(n), ctx.defines);
    if overseas > 0.0 {
        for c in ctx.goods() {
            if is_overseas_good(nation, ctx, c) {
                let amount = overseas * spending_scale * b.overseas.fraction();
                register_demand(nation, demand, c, amount, DemandReason::OverseasPenalty);
            }
        }
    }
}

/// Outcome of a nation's daily spending decision.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpendingPlan {
    pub total: f32,
    pub budget: f32,
    pub spending_scale: f32,
    pub private_investment_scale: f32,
    pub interest: f32,
}

#[inline]
fn scale_to_budget(total: f32, budget: f32) -> f32 {
    if total < 0.001 || total <= budget {
        1.0
    } else {
        budget / total
    }
}

/// Decide how much of the desired spend the nation can afford, pay for it
/// up front and register the resulting demand.
pub fn update_national_spending(
    nation: &mut Nation,
    demand: &mut DemandAccumulator,
    n: NationId,
    ctx: &DayContext<'_>,
) -> SpendingPlan {
    let total = full_spending_cost(nation, n, ctx);

    let mut interest = 0.0;
    let (budget, spending_scale) = if nation.is_player_controlled {
        interest = interest_payment(nation, ctx.defines);
        *nation.treasury_mut() -= interest;
        if can_take_loans(nation, ctx.date) {
            (total, 1.0)
        } else {
            let budget = nation.treasury().max(0.0);
            (budget, scale_to_budget(total, budget))
        }
    } else {
        let budget = nation.treasury().max(0.0);
        (budget, scale_to_budget(total, budget))
    };
    debug_assert!(spending_scale >= 0.0 && spending_scale.is_finite());

    *nation.treasury_mut() -= budget.min(total * spending_scale);
    nation.spending_level = spending_scale;

    let pi_total = full_private_investment_cost(nation);
    let pi_budget = nation.private_investment;
    let pi_scale = if pi_total <= pi_budget { 1.0 } else { pi_budget / pi_total };
    nation.private_investment_effective_fraction = pi_scale;
    nation.private_investment = (pi_budget - pi_total).max(0.0);

    update_national_consumption(nation, demand, n, ctx, spending_scale, pi_scale);

    log::trace!(
        "{} spends {:.2} of {:.2} (scale {:.3})",
        nation.name,
        budget.min(total * spending_scale),
        total,
        spending_scale
    );

    SpendingPlan {
        total,
        budget,
        spending_scale,
        private_investment_scale: pi_scale,
        interest,
    }
}

// ============================================================================
// Refunds
// ============================================================================

/// Satisfaction-weighted share of a demand column, and the unmet cost.
fn delivered_share(
    nation: &Nation,
    column: &Table<CommodityId, f32>,
    ctx: &DayContext<'_>,
    scale: f32,
) -> (f32, f32) {
    let mut refund = 0.0f32;
    let mut total = 0.0f32;
    let mut delivered = 0.0f32;
    for c in ctx.goods() {
        let sat = nation.demand_satisfaction[c];
        let amount = column[c];
        refund += amount * (1.0 - sat) * scale * ctx.price(c);
        total += amount;
        delivered += amount * sat;
    }
    let share = if total > 0.0 { delivered / total } else { delivered };
    (share, refund)
}

/// Credit back money paid for goods the market did not deliver, fill
/// stockpiles with what was delivered and set the effective spending levels.
///
/// Returns the refunded amount.
pub fn apply_refunds(nation: &mut Nation, n: NationId, ctx: &DayContext<'_>) -> f32 {
    let scale = nation.spending_level;
    let b = nation.budget;
    let mut refund = 0.0f32;

    let (share, unmet) = delivered_share(nation, &nation.navy_demand, ctx, scale * b.naval.fraction());
    refund += unmet;
    nation.effective_naval_spending = scale * share * b.naval.fraction();

    let (share, unmet) = delivered_share(nation, &nation.army_demand, ctx, scale * b.land.fraction());
    refund += unmet;
    nation.effective_land_spending = scale * share * b.land.fraction();

    // Construction is not refunded: projects only take what was delivered.
    let (share, _) = delivered_share(nation, &nation.construction_demand, ctx, 0.0);
    nation.effective_construction_spending = scale * share * b.construction.fraction();

    for c in ctx.goods() {
        let gap = stockpile_gap(nation, c);
        if gap > 0.0 {
            let sat = nation.direct_demand_satisfaction[c];
            nation.stockpiles[c] += gap * scale * sat;
            refund += gap * (1.0 - sat) * scale * ctx.price(c);
        }
    }

    let overseas = overseas_factor(nation, ctx.index.owned_province_count(n), ctx.defines);
    if overseas > 0.0 {
        let mut worst = 1.0f32;
        for c in ctx.goods() {
            if is_overseas_good(nation, ctx, c) {
                let sat = nation.demand_satisfaction[c];
                worst = worst.min(sat);
                refund += overseas * (1.0 - sat) * scale * ctx.price(c);
            }
        }
        nation.overseas_penalty = b.overseas.fraction() * worst;
    } else {
        nation.overseas_penalty = 1.0;
    }

    debug_assert!(refund.is_finite() && refund >= 0.0);
    *nation.treasury_mut() += refund;
    refund
}

// ============================================================================
// Estimators
// ============================================================================

pub fn estimate_stockpile_filling_spending(world: &WorldState, n: NationId) -> f32 {
    let nation = &world.nations[n];
    world
        .goods()
        .map(|c| stockpile_gap(nation, c) * world.commodities[c].current_price * nation.demand_satisfaction[c])
        .sum()
}

pub fn estimate_overseas_penalty_spending(world: &WorldState, defines: &EconomyDefines, n: NationId) -> f32 {
    let nation = &world.nations[n];
    let overseas = overseas_factor(nation, world.index.owned_province_count(n), defines);
    if overseas <= 0.0 {
        return 0.0;
    }
    world
        .goods()
        .filter(|&c| world.commodities[c].overseas_penalty && world.is_available(n, c))
        .map(|c| overseas * world.commodities[c].current_price * nation.demand_satisfaction[c])
        .sum()
}
