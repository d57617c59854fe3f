//! Daily price movement.
//!
//! ```text
//! supply   = last production + world_pool / 12
//! balance  = demand - supply
//! slope    = √|balance| + 20
//! over     = clamp((demand + ε) / (supply + ε) - 1, 0, slope)
//! under    = clamp((supply + ε) / (demand + ε) - 1, 0, slope)
//! Δprice   = 0.05 × (over - under) × (price < 1 ? price : √price)
//! ```
//!
//! Money goods are not traded against demand: their price is pegged to the
//! cost of a reference laborer basket.

use crate::defines::EconomyDefines;
use crate::ids::*;
use crate::state::{Nation, WorldState};
use rayon::prelude::*;
use tracing::instrument;

/// Today's market totals for one commodity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketTotals {
    pub real_demand: f32,
    pub consumption: f32,
    pub production: f32,
}

impl MarketTotals {
    pub fn of(nations: &[Nation], c: CommodityId) -> Self {
        nations.iter().fold(Self::default(), |acc, n| Self {
            real_demand: acc.real_demand + n.real_demand[c],
            consumption: acc.consumption + n.real_demand[c] * n.demand_satisfaction[c],
            production: acc.production + n.domestic_market_pool[c],
        })
    }
}

/// One day's price step (pure function).
pub fn next_price(current_price: f32, supply: f32, demand: f32, defines: &EconomyDefines) -> f32 {
    let balance = demand - supply;
    let max_slope = balance.abs().sqrt() + defines.price_slope_base;
    let oversupply = ((supply + 0.001) / (demand + 0.001) - 1.0).clamp(0.0, max_slope);
    let overdemand = ((demand + 0.001) / (supply + 0.001) - 1.0).clamp(0.0, max_slope);

    let mut speed = defines.price_adjust_speed * (overdemand - oversupply);
    if current_price < 1.0 {
        speed *= current_price;
    } else {
        speed *= current_price.sqrt();
    }
    defines.clamp_price(current_price + speed)
}

/// Cost of a laborer's life, half everyday and a tenth of luxury needs at
/// today's prices.
pub fn laborer_basket_cost(world: &WorldState, defines: &EconomyDefines) -> f32 {
    let laborers = &world.definitions.pop_types[world.definitions.roles.laborers];
    let base = defines.base_goods_demand;
    world
        .goods()
        .filter(|&c| world.commodities[c].is_available_from_start)
        .map(|c| {
            let price = world.commodities[c].current_price;
            let life = laborers.life_needs.get_or_default(c) * defines.alice_lf_needs_scale;
            let everyday = 0.5 * laborers.everyday_needs.get_or_default(c) * defines.alice_ev_needs_scale;
            let luxury = 0.1 * laborers.luxury_needs.get_or_default(c) * defines.alice_lx_needs_scale;
            (life + everyday + luxury) * base * price
        })
        .sum()
}

/// Peg money goods to the laborer basket.
#[instrument(skip_all, name = "money_price")]
pub fn update_money_prices(world: &mut WorldState, defines: &EconomyDefines) {
    if !world.commodities.values().any(|c| c.money_rgo) {
        return;
    }
    let price = defines.clamp_price(laborer_basket_cost(world, defines) * defines.money_rgo_price_factor);
    for commodity in world.commodities.values_mut().filter(|c| c.money_rgo) {
        commodity.current_price = price;
    }
}

/// Move every traded price toward clearing and record world totals.
#[instrument(skip_all, name = "price_adjustment")]
pub fn adjust_prices(world: &mut WorldState, defines: &EconomyDefines) {
    // PHASE 1: Extract
    let nations = world.nations.as_slice();

    // PHASE 2: Sum demand and supply per commodity (parallel)
    let updates: Vec<Option<(MarketTotals, f32)>> = {
        let _span = tracing::info_span!("price_totals", count = world.commodities.len()).entered();
        world
            .commodities
            .as_slice()
            .par_iter()
            .enumerate()
            .map(|(i, commodity)| {
                if commodity.money_rgo {
                    return None;
                }
                let totals = MarketTotals::of(nations, CommodityId::from_index(i));
                let supply = commodity.total_production + commodity.global_market_pool / defines.global_pool_supply_divisor;
                let price = next_price(commodity.current_price, supply, totals.real_demand, defines);
                Some((totals, price))
            })
            .collect()
    };

    // PHASE 3: Aggregate results (sequential)
    for (commodity, update) in world.commodities.values_mut().zip(updates) {
        let Some((totals, price)) = update else {
            continue;
        };
        commodity.total_real_demand = totals.real_demand;
        commodity.total_consumption = totals.consumption;
        commodity.total_production = totals.production;
        commodity.current_price = price;
    }
}
