//! Commodity ledger: demand/supply registration and rolling history.
//!
//! Every engine books demand and supply through the functions here, so the
//! nation's real-demand column, the commodity's per-reason breakdown and the
//! nation's GDP stay consistent.
//!
//! ```text
//! register_demand               real_demand += a; category[reason] += a
//! register_intermediate_demand  ... and intermediate_demand += a
//!                               gdp -= a × price × satisfaction
//! register_domestic_supply      domestic_pool += a; gdp += a × price
//! ```
//!
//! Category totals are accumulated per nation in a [`DemandAccumulator`] while
//! nations run in parallel, then reduced into the commodity table in
//! nation-id order by [`DemandAccumulator::merge_into`].

use crate::ids::{CommodityId, DenseId, FactoryTypeId};
use crate::state::{
    Commodity, Date, Nation, WorldState, DEMAND_CATEGORIES, GDP_HISTORY_LENGTH,
    PRICE_HISTORY_LENGTH,
};
use crate::table::Table;
use tracing::instrument;

/// Why a commodity was demanded. The discriminant is the category slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemandReason {
    Pop,
    Factory,
    Rgo,
    Artisan,
    Construction,
    Nation,
    Stockpile,
    OverseasPenalty,
}

impl DemandReason {
    pub const ALL: [DemandReason; DEMAND_CATEGORIES] = [
        DemandReason::Pop,
        DemandReason::Factory,
        DemandReason::Rgo,
        DemandReason::Artisan,
        DemandReason::Construction,
        DemandReason::Nation,
        DemandReason::Stockpile,
        DemandReason::OverseasPenalty,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-nation staging area for the commodity demand breakdown.
#[derive(Debug, Clone, Default)]
pub struct DemandAccumulator {
    by_commodity: Vec<[f32; DEMAND_CATEGORIES]>,
}

impl DemandAccumulator {
    pub fn new(commodities: usize) -> Self {
        Self {
            by_commodity: vec![[0.0; DEMAND_CATEGORIES]; commodities],
        }
    }

    #[inline]
    pub fn add(&mut self, c: CommodityId, reason: DemandReason, amount: f32) {
        if let Some(slots) = self.by_commodity.get_mut(c.index()) {
            slots[reason.index()] += amount;
        }
    }

    pub fn get(&self, c: CommodityId, reason: DemandReason) -> f32 {
        self.by_commodity
            .get(c.index())
            .map_or(0.0, |slots| slots[reason.index()])
    }

    /// Add this nation's breakdown into the world totals.
    pub fn merge_into(&self, commodities: &mut Table<CommodityId, Commodity>) {
        for (commodity, slots) in commodities.values_mut().zip(&self.by_commodity) {
            for (total, amount) in commodity.demand_by_category.iter_mut().zip(slots) {
                *total += amount;
            }
        }
    }
}

// ============================================================================
// Registration
// ============================================================================

#[inline]
pub fn register_demand(
    nation: &mut Nation,
    demand: &mut DemandAccumulator,
    c: CommodityId,
    amount: f32,
    reason: DemandReason,
) {
    debug_assert!(amount >= 0.0 && amount.is_finite(), "bad demand {amount} for {c}");
    nation.real_demand[c] += amount;
    demand.add(c, reason, amount);
}

/// Demand for goods that are consumed by production. `price` is the
/// commodity's current world price.
#[inline]
pub fn register_intermediate_demand(
    nation: &mut Nation,
    demand: &mut DemandAccumulator,
    c: CommodityId,
    amount: f32,
    reason: DemandReason,
    price: f32,
) {
    register_demand(nation, demand, c, amount, reason);
    nation.intermediate_demand[c] += amount;
    nation.gdp -= amount * price * nation.demand_satisfaction[c];
}

#[inline]
pub fn register_construction_demand(nation: &mut Nation, c: CommodityId, amount: f32) {
    debug_assert!(amount >= 0.0 && amount.is_finite());
    nation.construction_demand[c] += amount;
}

#[inline]
pub fn register_domestic_supply(nation: &mut Nation, c: CommodityId, amount: f32, price: f32) {
    debug_assert!(amount >= 0.0 && amount.is_finite(), "bad supply {amount} for {c}");
    nation.domestic_market_pool[c] += amount;
    nation.gdp += amount * price;
}

// ============================================================================
// History
// ============================================================================

/// Price history slot for `date`; one slot covers 16 days.
#[inline]
pub fn most_recent_price_record_index(date: Date) -> usize {
    (date.0 >> 4) as usize % PRICE_HISTORY_LENGTH
}

#[inline]
pub fn previous_price_record_index(date: Date) -> usize {
    ((date.0 >> 4) as usize + PRICE_HISTORY_LENGTH - 1) % PRICE_HISTORY_LENGTH
}

/// GDP history slot: one per quarter.
pub fn most_recent_gdp_record_index(world: &WorldState) -> usize {
    let ymd = world.calendar_date();
    (ymd.year * 4 + ymd.month as i32 / 3).rem_euclid(GDP_HISTORY_LENGTH as i32) as usize
}

pub fn previous_gdp_record_index(world: &WorldState) -> usize {
    let ymd = world.calendar_date();
    (ymd.year * 4 + ymd.month as i32 / 3 + GDP_HISTORY_LENGTH as i32 - 1)
        .rem_euclid(GDP_HISTORY_LENGTH as i32) as usize
}

/// Write today's prices and GDP into their history slots.
pub fn record_history(world: &mut WorldState) {
    let slot = most_recent_price_record_index(world.date);
    for commodity in world.commodities.values_mut() {
        commodity.price_record[slot] = commodity.current_price;
    }
    let gdp_slot = most_recent_gdp_record_index(world);
    for nation in world.nations.values_mut() {
        nation.gdp_record[gdp_slot] = nation.gdp;
    }
}

/// Value of one "ideal pound": the needs basket of a primary factory worker.
pub fn ideal_pound_conversion_rate(world: &WorldState, nation: &Nation) -> f32 {
    let pfw = world.definitions.roles.primary_factory_worker;
    nation.life_needs_costs.get_or_default(pfw)
        + 0.1 * nation.everyday_needs_costs.get_or_default(pfw)
}

/// GDP measured in ideal pounds. Zero when the basket is free.
pub fn gdp_adjusted(world: &WorldState, nation: &Nation) -> f32 {
    let ideal_pound = ideal_pound_conversion_rate(world, nation);
    if ideal_pound > 0.0 {
        nation.gdp / ideal_pound
    } else {
        0.0
    }
}

// ============================================================================
// Derived values
// ============================================================================

/// Rebuild every cached value that is not persisted.
///
/// Safe to call repeatedly: flags are only ever raised, the rest is recomputed.
#[instrument(skip_all, name = "regenerate_unsaved_values")]
pub fn regenerate_unsaved_values(world: &mut WorldState) {
    let commodities = world.commodities.len();
    let pop_types = world.definitions.pop_types.len();
    let slaves = world.definitions.roles.slaves;

    world.definitions.rgo_workers = world
        .definitions
        .pop_types
        .iter()
        .filter(|(_, pt)| pt.is_paid_rgo_worker)
        .map(|(id, _)| id)
        .collect();

    for c in (1..commodities).map(CommodityId::from_index) {
        for (pt_id, pt) in world.definitions.pop_types.iter() {
            if pt_id == slaves {
                continue;
            }
            let commodity = &mut world.commodities[c];
            if pt.life_needs.get_or_default(c) > 0.0 {
                commodity.is_life_need = true;
            }
            if pt.everyday_needs.get_or_default(c) > 0.0 {
                commodity.is_everyday_need = true;
            }
            if pt.luxury_needs.get_or_default(c) > 0.0 {
                commodity.is_luxury_need = true;
            }
        }
    }

    for nation in world.nations.values_mut() {
        nation.resize_columns(commodities, pop_types);
    }
    for province in world.provinces.values_mut() {
        province.resize_columns(commodities);
    }

    for commodity in world.commodities.values_mut() {
        commodity.key_factory = None;
        commodity.producer_payout_fraction = if commodity.total_production > 0.0001 {
            (commodity.total_consumption / commodity.total_production).min(1.0)
        } else {
            1.0
        };
    }
    for (ft, factory_type) in world.definitions.factory_types.iter() {
        if !factory_type.output.is_money() {
            if let Some(commodity) = world.commodities.get_mut(factory_type.output) {
                commodity.key_factory = Some(ft);
            }
        }
    }
    log::debug!(
        "Regenerated derived values: {} rgo worker types, {} key factories",
        world.definitions.rgo_workers.len(),
        world
            .commodities
            .values()
            .filter(|c| c.key_factory.is_some())
            .count()
    );

    world.refresh_derived();
}

/// Key factory of `c`, if any factory type produces it.
pub fn key_factory(world: &WorldState, c: CommodityId) -> Option<FactoryTypeId> {
    world.commodities.get(c).and_then(|commodity| commodity.key_factory)
}
