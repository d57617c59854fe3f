//! Static definitions consumed by the economy: pop types, factory types,
//! unit types and province buildings.
//!
//! Definitions are loaded once and never mutated by the daily pass, apart
//! from the derived `rgo_workers` list rebuilt by
//! [`crate::systems::ledger::regenerate_unsaved_values`].

use crate::ids::{CommodityId, FactoryTypeId, PopTypeId, TriggerId, UnitTypeId};
use crate::table::Table;
use serde::{Deserialize, Serialize};

/// Wealth class of a pop type. Taxes and needs modifiers are per strata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Strata {
    #[default]
    Poor,
    Middle,
    Rich,
}

impl Strata {
    pub const ALL: [Strata; 3] = [Strata::Poor, Strata::Middle, Strata::Rich];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Which government budget line pays for a tier of a pop type's needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IncomeType {
    /// Not paid by the state; eligible for pensions and unemployment.
    #[default]
    None,
    Administration,
    Education,
    Military,
}

/// Short list of `(commodity, amount)` pairs: inputs, build costs, supply costs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommoditySet(pub Vec<(CommodityId, f32)>);

impl CommoditySet {
    pub fn new(entries: impl IntoIterator<Item = (CommodityId, f32)>) -> Self {
        Self(entries.into_iter().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (CommodityId, f32)> + '_ {
        self.0.iter().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total value at the given prices.
    pub fn value_at(&self, price: impl Fn(CommodityId) -> f32) -> f32 {
        self.iter().map(|(c, amount)| amount * price(c)).sum()
    }

    /// Smallest value of `f` over the set's commodities, starting from 1.
    pub fn min_of(&self, f: impl Fn(CommodityId) -> f32) -> f32 {
        self.iter().fold(1.0f32, |least, (c, _)| least.min(f(c)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopType {
    pub name: String,
    pub strata: Strata,
    /// Per-commodity base amounts, one slot per commodity.
    pub life_needs: Table<CommodityId, f32>,
    pub everyday_needs: Table<CommodityId, f32>,
    pub luxury_needs: Table<CommodityId, f32>,
    pub life_needs_income: IncomeType,
    pub everyday_needs_income: IncomeType,
    pub luxury_needs_income: IncomeType,
    pub has_unemployment: bool,
    pub is_paid_rgo_worker: bool,
}

/// Pop types the engines address by role.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PopRoles {
    pub farmers: PopTypeId,
    pub laborers: PopTypeId,
    pub slaves: PopTypeId,
    pub artisans: PopTypeId,
    pub capitalists: PopTypeId,
    pub aristocrats: PopTypeId,
    pub primary_factory_worker: PopTypeId,
    pub secondary_factory_worker: PopTypeId,
}

impl PopRoles {
    /// Paid RGO worker type for a mine or a farm.
    #[inline]
    pub fn rgo_worker(&self, is_mine: bool) -> PopTypeId {
        if is_mine {
            self.laborers
        } else {
            self.farmers
        }
    }
}

/// Conditional input discount on a factory type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactoryBonus {
    pub trigger: TriggerId,
    pub amount: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactoryType {
    pub name: String,
    pub output: CommodityId,
    pub output_amount: f32,
    pub inputs: CommoditySet,
    pub efficiency_inputs: CommoditySet,
    pub construction_costs: CommoditySet,
    /// Days.
    pub construction_time: u32,
    pub is_coastal: bool,
    pub is_available_from_start: bool,
    pub bonuses: Vec<FactoryBonus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitType {
    pub name: String,
    pub build_cost: CommoditySet,
    pub build_time: u32,
    pub supply_cost: CommoditySet,
    pub is_naval: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvinceBuildingKind {
    Railroad,
    Fort,
    NavalBase,
}

impl ProvinceBuildingKind {
    pub const ALL: [ProvinceBuildingKind; 3] = [
        ProvinceBuildingKind::Railroad,
        ProvinceBuildingKind::Fort,
        ProvinceBuildingKind::NavalBase,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvinceBuildingType {
    pub cost: CommoditySet,
    pub time: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Definitions {
    pub pop_types: Table<PopTypeId, PopType>,
    pub roles: PopRoles,
    pub factory_types: Table<FactoryTypeId, FactoryType>,
    pub unit_types: Table<UnitTypeId, UnitType>,
    /// Unit pair used to emulate military construction demand.
    pub infantry: UnitTypeId,
    pub artillery: UnitTypeId,
    pub province_buildings: [ProvinceBuildingType; 3],
    /// Pop types flagged as paid RGO workers. Derived.
    #[serde(default)]
    pub rgo_workers: Vec<PopTypeId>,
}

impl Definitions {
    #[inline]
    pub fn province_building(&self, kind: ProvinceBuildingKind) -> &ProvinceBuildingType {
        &self.province_buildings[kind.index()]
    }
}
