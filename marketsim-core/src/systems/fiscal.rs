//! Taxes, tariffs, private education, diplomatic payments, bankruptcy,
//! inflation and the budget-screen estimators.
//!
//! ```text
//! tax(strata)   = Σ savings(strata) × tax_efficiency × rate(strata)
//! tariffs       = Σ price × effective_tariff_rate × imports
//! war subsidies = recipient.maximum_military_costs × warsubsidies_percent
//! reparations   = payer tax base × tax_efficiency × reparations_tax_hit
//! inflation     ← 0.9 × inflation + 0.1 × target_money / total_income
//! ```

use crate::definitions::{IncomeType, Strata};
use crate::defines::EconomyDefines;
use crate::external::{DefaultSeverity, EconomyEvent, EventSink};
use crate::ids::*;
use crate::shard::{DayContext, NationShard};
use crate::state::{Nation, WorldState};
use crate::systems::budget::max_loan;
use crate::systems::market::{effective_tariff_rate, nation_total_imports};
use crate::systems::rgo::rgo_full_production_quantity;
use tracing::instrument;

// ============================================================================
// Per-nation collection (runs inside the shard phase)
// ============================================================================

/// Move a share of savings in staffed, controlled provinces to clergy and
/// bureaucrats.
pub fn pay_private_education(shard: &mut NationShard, ctx: &DayContext<'_>) {
    let defines = ctx.defines;
    let pop_types = &ctx.definitions.pop_types;
    let spend = defines.private_education_share;
    let mut education = 0.0f32;
    let mut administration = 0.0f32;

    for slot in shard.provinces.iter_mut() {
        if !slot.is_controlled_by(shard.id) {
            continue;
        }
        let (mut educators, mut managers) = (0.0f32, 0.0f32);
        for (_, pop) in &slot.pops {
            match pop_types[pop.pop_type].life_needs_income {
                IncomeType::Administration => managers += pop.size,
                IncomeType::Education => educators += pop.size,
                _ => {}
            }
        }

        let mut collected = 0.0f32;
        if educators + managers > 0.0 {
            for (_, pop) in slot.pops.iter_mut() {
                collected += pop.savings * spend;
                pop.savings *= 1.0 - spend;
            }
        }

        let education_ratio = if managers == 0.0 {
            1.0
        } else {
            defines.private_education_clergy_ratio
        };
        for (_, pop) in slot.pops.iter_mut() {
            match pop_types[pop.pop_type].life_needs_income {
                IncomeType::Administration => {
                    let paid = collected * (1.0 - education_ratio) * pop.size / managers;
                    pop.savings += paid;
                    administration += paid;
                }
                IncomeType::Education => {
                    let paid = collected * education_ratio * pop.size / educators;
                    pop.savings += paid;
                    education += paid;
                }
                _ => {}
            }
        }
    }

    shard.nation.private_investment_education = education;
    shard.nation.private_investment_administration = administration;
}

#[inline]
fn tax_rate(nation: &Nation, strata: Strata) -> f32 {
    let rate = match strata {
        Strata::Poor => nation.budget.poor_tax,
        Strata::Middle => nation.budget.middle_tax,
        Strata::Rich => nation.budget.rich_tax,
    };
    nation.tax_efficiency * rate.fraction()
}

/// Tax pop savings by strata in controlled provinces.
///
/// Records the untaxed bases as the strata incomes and returns the amount
/// credited to the treasury.
pub fn collect_taxes(shard: &mut NationShard, ctx: &DayContext<'_>) -> f32 {
    let pop_types = &ctx.definitions.pop_types;
    let rates = [
        tax_rate(&shard.nation, Strata::Poor),
        tax_rate(&shard.nation, Strata::Middle),
        tax_rate(&shard.nation, Strata::Rich),
    ];
    debug_assert!(rates.iter().all(|r| *r <= 1.0));

    let mut base = [0.0f32; 3];
    for slot in shard.provinces.iter_mut() {
        if !slot.is_controlled_by(shard.id) {
            continue;
        }
        for (_, pop) in slot.pops.iter_mut() {
            let i = pop_types[pop.pop_type].strata.index();
            base[i] += pop.savings;
            pop.savings *= 1.0 - rates[i];
        }
    }

    let nation = &mut shard.nation;
    nation.total_poor_income = base[0];
    nation.total_middle_income = base[1];
    nation.total_rich_income = base[2];
    let collected: f32 = base.iter().zip(rates).map(|(b, r)| b * r).sum();
    debug_assert!(collected.is_finite() && collected >= 0.0);
    *nation.treasury_mut() += collected;
    collected
}

/// Tariffs on today's imports at world prices. Returns the amount collected.
pub fn collect_tariffs(nation: &mut Nation, ctx: &DayContext<'_>) -> f32 {
    let rate = effective_tariff_rate(nation);
    let collected: f32 = ctx.goods().map(|c| ctx.price(c) * rate * nation.imports[c]).sum();
    debug_assert!(collected.is_finite());
    *nation.treasury_mut() += collected;
    collected
}

// ============================================================================
// Diplomatic expenses
// ============================================================================

#[inline]
fn pays_reparations(nation: &Nation, world: &WorldState) -> bool {
    nation.reparations_until.is_some_and(|until| world.date < until)
}

fn reparations_payout(nation: &Nation, defines: &EconomyDefines) -> f32 {
    nation.total_income() * nation.tax_efficiency * defines.reparations_tax_hit
}

/// Pay war subsidies and reparations, payer by payer.
///
/// Subsidies the payer cannot afford are cancelled. Reparations are capped
/// at the payer's treasury.
#[instrument(skip_all, name = "diplomatic_expenses")]
pub fn settle_diplomatic_expenses(world: &mut WorldState, defines: &EconomyDefines, events: &mut dyn EventSink) {
    let date = world.date;
    let mut order: Vec<usize> = (0..world.relationships.len()).collect();
    order.sort_by_key(|&i| world.relationships[i].source);

    for i in order {
        let rel = world.relationships[i].clone();
        if rel.source == rel.target {
            continue;
        }

        if rel.war_subsidies {
            let amount = world.nations[rel.target].maximum_military_costs * defines.warsubsidies_percent;
            let (payer, recipient) = world.nations.pair_mut(rel.source, rel.target);
            if amount <= payer.treasury() {
                *payer.treasury_mut() -= amount;
                *recipient.treasury_mut() += amount;
            } else {
                world.relationships[i].war_subsidies = false;
                log::debug!("war subsidies {} -> {} cancelled", rel.source, rel.target);
                events.post(EconomyEvent::WarSubsidiesCancelled {
                    date,
                    payer: rel.source,
                    recipient: rel.target,
                });
            }
        }

        if rel.reparations && pays_reparations(&world.nations[rel.source], world) {
            let owed = reparations_payout(&world.nations[rel.source], defines);
            let (payer, recipient) = world.nations.pair_mut(rel.source, rel.target);
            let paid = payer.treasury().max(0.0).min(owed);
            *payer.treasury_mut() -= paid;
            *recipient.treasury_mut() += paid;
            if paid < owed {
                events.post(EconomyEvent::ReparationsShortfall {
                    date,
                    payer: rel.source,
                    recipient: rel.target,
                    owed,
                    paid,
                });
            }
        }
    }
}

// ============================================================================
// Bankruptcy
// ============================================================================

/// Wipe a nation's debt and put it under bankruptcy.
///
/// Every other great power is told, scoped by debt size and whether the
/// nation is a repeat defaulter.
pub fn go_bankrupt(world: &mut WorldState, n: NationId, defines: &EconomyDefines, events: &mut dyn EventSink) {
    let date = world.date;
    let nation = &world.nations[n];
    let severity = if nation.bankrupt_until.is_some_and(|until| date < until) {
        DefaultSeverity::Repeat
    } else if nation.treasury() >= -defines.small_debt_limit {
        DefaultSeverity::Small
    } else {
        DefaultSeverity::Large
    };

    for &gp in &world.great_powers {
        if gp != n {
            events.post(EconomyEvent::DebtorDefault {
                date,
                recipient: gp,
                debtor: n,
                severity,
            });
        }
    }

    let nation = &mut world.nations[n];
    log::info!("{} goes bankrupt with debt {:.2}", nation.name, -nation.treasury());
    *nation.treasury_mut() = 0.0;
    nation.is_debt_spending = false;
    nation.bankrupt_until = Some(date.add_days(defines.bankruptcy_duration_years * 365));
    nation.bad_debtor_until = Some(date.add_days(defines.bankruptcy_external_loan_years * 365));
    events.post(EconomyEvent::Bankruptcy { date, nation: n });
}

/// Bankrupt every nation whose debt exceeds what it may borrow.
#[instrument(skip_all, name = "bankruptcy")]
pub fn process_bankruptcies(
    world: &mut WorldState,
    defines: &EconomyDefines,
    events: &mut dyn EventSink,
) -> Vec<NationId> {
    let bankrupt: Vec<NationId> = world
        .nations
        .iter()
        .filter(|(_, nation)| nation.treasury() < 0.0 && nation.treasury() < -max_loan(nation))
        .map(|(n, _)| n)
        .collect();
    for &n in &bankrupt {
        go_bankrupt(world, n, defines, events);
    }
    bankrupt
}

// ============================================================================
// Inflation
// ============================================================================

/// Cost of the reference basket per needs-scaling unit of population (pure function).
pub fn primary_commodity_basket(world: &WorldState, defines: &EconomyDefines) -> f32 {
    let types = world.definitions.pop_types.len();
    if types == 0 {
        return 0.0;
    }
    let total: f32 = world
        .commodities
        .iter()
        .map(|(c, commodity)| {
            world
                .definitions
                .pop_types
                .values()
                .map(|pt| {
                    defines.inflation_basket_weight
                        * commodity.cost
                        * (pt.life_needs.get_or_default(c) + pt.everyday_needs.get_or_default(c))
                })
                .sum::<f32>()
        })
        .sum();
    total / types as f32
}

/// Drift inflation toward the level where pop income buys the basket.
#[instrument(skip_all, name = "inflation")]
pub fn update_inflation(world: &mut WorldState, defines: &EconomyDefines) {
    let basket = primary_commodity_basket(world, defines);
    let total_pop: f32 = world.demographics.nation.values().map(|d| d.total).sum();
    let total_money: f32 = world.nations.values().map(Nation::total_income).sum();
    let target_money = total_pop * basket / defines.alice_needs_scaling_factor;

    if total_money > 0.001 {
        let s = defines.inflation_smoothing;
        world.inflation = world.inflation * (1.0 - s) + s * target_money / total_money;
        log::trace!("inflation {:.5} (target money {:.2}, income {:.2})", world.inflation, target_money, total_money);
    }
}

// ============================================================================
// Estimators
// ============================================================================

/// Tomorrow's tax income if incomes stay where they are.
pub fn estimate_daily_income(world: &WorldState, n: NationId) -> f32 {
    let nation = &world.nations[n];
    let b = nation.budget;
    (nation.total_poor_income * b.poor_tax.fraction()
        + nation.total_middle_income * b.middle_tax.fraction()
        + nation.total_rich_income * b.rich_tax.fraction())
        * nation.tax_efficiency
}

pub fn estimate_tax_income_by_strata(world: &WorldState, n: NationId, strata: Strata) -> f32 {
    let nation = &world.nations[n];
    let income = match strata {
        Strata::Poor => nation.total_poor_income,
        Strata::Middle => nation.total_middle_income,
        Strata::Rich => nation.total_rich_income,
    };
    income * nation.tax_efficiency
}

/// Pre-tax income of one pop, recovered from its taxed savings.
pub fn pop_income(world: &WorldState, p: PopId) -> f32 {
    let pop = &world.pops[p];
    if pop.savings <= 0.0 {
        return 0.0;
    }
    let Some(owner) = world.provinces[pop.location].owner else {
        return pop.savings;
    };
    let strata = world.definitions.pop_types[pop.pop_type].strata;
    pop.savings / (1.0 - tax_rate(&world.nations[owner], strata)).max(0.0001)
}

pub fn estimate_gold_income(world: &WorldState, defines: &EconomyDefines, n: NationId) -> f32 {
    let nation = &world.nations[n];
    let provinces = world.index.nation_provinces.get(n).map(Vec::as_slice).unwrap_or_default();
    let amount: f32 = provinces
        .iter()
        .map(|&p| {
            world
                .commodities
                .iter()
                .filter(|(_, commodity)| commodity.money_rgo)
                .map(|(c, commodity)| rgo_full_production_quantity(&world.provinces[p], nation, c, commodity, defines))
                .sum::<f32>()
        })
        .sum();
    amount * defines.gold_to_cash_rate
}

pub fn estimate_tariff_income(world: &WorldState, n: NationId) -> f32 {
    world.nations[n].tariff_efficiency * nation_total_imports(world, n)
}

/// Pensions and unemployment benefits at the nation's modifier levels.
pub fn estimate_social_spending(world: &WorldState, defines: &EconomyDefines, n: NationId) -> f32 {
    let nation = &world.nations[n];
    let Some(demo) = world.demographics.nation.get(n) else {
        return 0.0;
    };
    let pension = nation.modifiers.pension_level;
    let unemployment = nation.modifiers.unemployment_benefit;

    world
        .definitions
        .pop_types
        .iter()
        .map(|(pt, pop_type)| {
            let adj_pop = demo.of(pt) / defines.alice_needs_scaling_factor;
            if adj_pop <= 0.0 || pop_type.life_needs_income != IncomeType::None {
                return 0.0;
            }
            let costs = nation.life_needs_costs.get_or_default(pt);
            let mut total = adj_pop * pension * costs;
            if pop_type.has_unemployment {
                let employed = demo.employed(pt) / defines.alice_needs_scaling_factor;
                total += (adj_pop - employed) * unemployment * costs;
            }
            total
        })
        .sum()
}

/// Full-rate payouts to pop types whose needs tiers are paid as `income`.
pub fn estimate_pop_payouts_by_income_type(
    world: &WorldState,
    defines: &EconomyDefines,
    n: NationId,
    income: IncomeType,
) -> f32 {
    let nation = &world.nations[n];
    let Some(demo) = world.demographics.nation.get(n) else {
        return 0.0;
    };
    world
        .definitions
        .pop_types
        .iter()
        .map(|(pt, pop_type)| {
            let adj_pop = demo.of(pt) / defines.alice_needs_scaling_factor;
            if adj_pop <= 0.0 {
                return 0.0;
            }
            let mut total = 0.0;
            if pop_type.life_needs_income == income {
                total += adj_pop * nation.life_needs_costs.get_or_default(pt);
            }
            if pop_type.everyday_needs_income == income {
                total += adj_pop * nation.everyday_needs_costs.get_or_default(pt);
            }
            if pop_type.luxury_needs_income == income {
                total += adj_pop * nation.luxury_needs_costs.get_or_default(pt);
            }
            total
        })
        .sum()
}

pub fn estimate_subsidy_spending(world: &WorldState, n: NationId) -> f32 {
    world.nations[n].subsidies_spending
}

/// Daily war subsidies this nation would pay at its own military costs.
pub fn estimate_war_subsidies(world: &WorldState, defines: &EconomyDefines, n: NationId) -> f32 {
    world.nations[n].maximum_military_costs * defines.warsubsidies_percent
}

pub fn estimate_war_subsidies_income(world: &WorldState, defines: &EconomyDefines, n: NationId) -> f32 {
    world
        .relationships
        .iter()
        .filter(|r| r.target == n && r.war_subsidies)
        .map(|r| world.nations[r.target].maximum_military_costs * defines.warsubsidies_percent)
        .sum()
}

pub fn estimate_war_subsidies_spending(world: &WorldState, defines: &EconomyDefines, n: NationId) -> f32 {
    world
        .relationships
        .iter()
        .filter(|r| r.source == n && r.war_subsidies)
        .map(|r| world.nations[r.target].maximum_military_costs * defines.warsubsidies_percent)
        .sum()
}

pub fn estimate_reparations_income(world: &WorldState, defines: &EconomyDefines, n: NationId) -> f32 {
    let tax_eff = world.nations[n].tax_efficiency;
    world
        .relationships
        .iter()
        .filter(|r| r.target == n && r.reparations && pays_reparations(&world.nations[r.source], world))
        .map(|r| world.nations[r.source].total_income() * tax_eff * defines.reparations_tax_hit)
        .sum()
}

pub fn estimate_reparations_spending(world: &WorldState, defines: &EconomyDefines, n: NationId) -> f32 {
    let nation = &world.nations[n];
    if !pays_reparations(nation, world) {
        return 0.0;
    }
    let count = world
        .relationships
        .iter()
        .filter(|r| r.source == n && r.reparations)
        .count();
    count as f32 * reparations_payout(nation, defines)
}

/// Net daily flow from war subsidies and reparations.
pub fn estimate_diplomatic_balance(world: &WorldState, defines: &EconomyDefines, n: NationId) -> f32 {
    let subsidies =
        estimate_war_subsidies_income(world, defines, n) - estimate_war_subsidies_spending(world, defines, n);
    let reparations =
        estimate_reparations_income(world, defines, n) - estimate_reparations_spending(world, defines, n);
    subsidies + reparations
}

/// Domestic investment owed to capitalists and aristocrats at full rate.
pub fn estimate_domestic_investment(world: &WorldState, defines: &EconomyDefines, n: NationId) -> f32 {
    let nation = &world.nations[n];
    let Some(demo) = world.demographics.nation.get(n) else {
        return 0.0;
    };
    let roles = &world.definitions.roles;
    let all_needs = |pt: PopTypeId| {
        nation.life_needs_costs.get_or_default(pt)
            + nation.everyday_needs_costs.get_or_default(pt)
            + nation.luxury_needs_costs.get_or_default(pt)
    };
    let scaling = defines.alice_needs_scaling_factor;
    defines.alice_domestic_investment_multiplier
        * (demo.of(roles.capitalists) / scaling * all_needs(roles.capitalists)
            + demo.of(roles.aristocrats) / scaling * all_needs(roles.aristocrats))
}

fn estimate_military_upkeep(world: &WorldState, n: NationId, naval: bool) -> f32 {
    let nation = &world.nations[n];
    let demand = if naval { &nation.navy_demand } else { &nation.army_demand };
    world
        .goods()
        .map(|c| demand[c] * nation.effective_prices[c] * nation.demand_satisfaction[c])
        .sum()
}

pub fn estimate_land_spending(world: &WorldState, n: NationId) -> f32 {
    estimate_military_upkeep(world, n, false)
}

pub fn estimate_naval_spending(world: &WorldState, n: NationId) -> f32 {
    estimate_military_upkeep(world, n, true)
}
