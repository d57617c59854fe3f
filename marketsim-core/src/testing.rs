//! Small-world builder for tests and the synthetic CLI scenario.
//!
//! ```text
//! WorldBuilder::new()
//!     .with_goods(&["grain", "iron"])
//!     .with_nation("A")
//!     .with_state(0, &[0, 1])          // nation 0 owns provinces 0 and 1
//!     .with_pops_in(0, &[("farmers", 1000.0)])
//!     .build()
//! ```
//!
//! Every world gets the standard pop types below; names are looked up with
//! [`WorldBuilder::with_pops_in`]. Unknown names are logged and skipped.

use crate::definitions::{
    CommoditySet, FactoryType, IncomeType, PopRoles, PopType, Strata, UnitType,
};
use crate::ids::*;
use crate::state::{
    Commodity, Date, Factory, Nation, Pop, Province, State, WorldState,
};
use crate::table::Table;

/// `(name, strata, life income, paid rgo worker, unemployment)`
const STANDARD_POP_TYPES: &[(&str, Strata, IncomeType, bool, bool)] = &[
    ("farmers", Strata::Poor, IncomeType::None, true, false),
    ("laborers", Strata::Poor, IncomeType::None, true, false),
    ("slaves", Strata::Poor, IncomeType::None, false, false),
    ("craftsmen", Strata::Poor, IncomeType::None, false, true),
    ("soldiers", Strata::Poor, IncomeType::Military, false, false),
    ("artisans", Strata::Middle, IncomeType::None, false, false),
    ("clerks", Strata::Middle, IncomeType::None, false, true),
    ("bureaucrats", Strata::Middle, IncomeType::Administration, false, false),
    ("clergy", Strata::Middle, IncomeType::Education, false, false),
    ("capitalists", Strata::Rich, IncomeType::None, false, false),
    ("aristocrats", Strata::Rich, IncomeType::None, false, false),
];

/// Base needs per pop of the standard types, before strata scaling.
const LIFE_NEED: f32 = 1.0;
const EVERYDAY_NEED: f32 = 0.5;
const LUXURY_NEED: f32 = 0.25;

pub struct WorldBuilder {
    world: WorldState,
}

impl WorldBuilder {
    pub fn new() -> Self {
        let mut world = WorldState {
            start_year: 1836,
            inflation: 1.0,
            ..Default::default()
        };
        world.commodities.push(Commodity {
            name: "money".to_string(),
            is_available_from_start: false,
            ..Default::default()
        });
        for &(name, strata, income, paid_rgo, unemployment) in STANDARD_POP_TYPES {
            world.definitions.pop_types.push(PopType {
                name: name.to_string(),
                strata,
                life_needs_income: income,
                everyday_needs_income: income,
                luxury_needs_income: income,
                has_unemployment: unemployment,
                is_paid_rgo_worker: paid_rgo,
                ..Default::default()
            });
        }
        let role = |name: &str| {
            STANDARD_POP_TYPES
                .iter()
                .position(|(n, ..)| *n == name)
                .map(PopTypeId::from_index)
                .unwrap_or_default()
        };
        world.definitions.roles = PopRoles {
            farmers: role("farmers"),
            laborers: role("laborers"),
            slaves: role("slaves"),
            artisans: role("artisans"),
            capitalists: role("capitalists"),
            aristocrats: role("aristocrats"),
            primary_factory_worker: role("craftsmen"),
            secondary_factory_worker: role("clerks"),
        };
        Self { world }
    }

    pub fn date(mut self, day: u32) -> Self {
        self.world.date = Date(day);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.world.rng_seed = seed;
        self
    }

    /// Add tradeable goods with base cost 1. Goods ids start at 1.
    pub fn with_goods(mut self, names: &[&str]) -> Self {
        for name in names {
            self.world.commodities.push(Commodity {
                name: name.to_string(),
                ..Default::default()
            });
        }
        self
    }

    /// Set a good's base cost and current price.
    pub fn with_price(mut self, good: &str, price: f32) -> Self {
        if let Some(c) = self.good(good) {
            let commodity = &mut self.world.commodities[c];
            commodity.cost = price;
            commodity.current_price = price;
            commodity.price_record = [price; crate::state::PRICE_HISTORY_LENGTH];
        }
        self
    }

    pub fn with_commodity_config(mut self, good: &str, f: impl FnOnce(&mut Commodity)) -> Self {
        if let Some(c) = self.good(good) {
            f(&mut self.world.commodities[c]);
        }
        self
    }

    /// A civilised, AI-controlled nation ranked after the existing ones.
    pub fn with_nation(mut self, name: &str) -> Self {
        let rank = self.world.nations.len() as u16 + 1;
        self.world.nations.push(Nation {
            name: name.to_string(),
            is_civilized: true,
            rank,
            administrative_efficiency: 1.0,
            tax_efficiency: 1.0,
            tariff_efficiency: 1.0,
            max_building_level: [6; 3],
            spending_level: 1.0,
            private_investment_effective_fraction: 1.0,
            rules: crate::state::IssueRules {
                pop_build_factory: true,
                pop_expand_factory: true,
                destroy_factory: false,
            },
            ..Default::default()
        });
        self
    }

    pub fn with_nation_config(mut self, nation: usize, f: impl FnOnce(&mut Nation)) -> Self {
        match self.world.nations.get_mut(NationId::from_index(nation)) {
            Some(n) => f(n),
            None => log::warn!("builder: no nation {nation}"),
        }
        self
    }

    pub fn with_treasury(self, nation: usize, amount: f32) -> Self {
        self.with_nation_config(nation, |n| {
            n.stockpiles.resize(1, 0.0);
            n.stockpiles[CommodityId::MONEY] = amount;
        })
    }

    /// A state owned by `nation` made of the given provinces.
    ///
    /// Provinces are created on first mention, owned and controlled by `nation`.
    pub fn with_state(mut self, nation: usize, provinces: &[usize]) -> Self {
        let owner = NationId::from_index(nation);
        let Some(&first) = provinces.first() else {
            return self;
        };
        let state = self.world.states.push(State {
            owner,
            capital: ProvinceId::from_index(first),
        });
        for &p in provinces {
            self.ensure_province(p);
            let province = &mut self.world.provinces[ProvinceId::from_index(p)];
            province.owner = Some(owner);
            province.controller = Some(owner);
            province.state = state;
        }
        self
    }

    /// An unowned province in a fresh ownerless state slot.
    pub fn with_unowned_province(mut self, index: usize) -> Self {
        self.ensure_province(index);
        self
    }

    pub fn with_province_config(mut self, province: usize, f: impl FnOnce(&mut Province)) -> Self {
        self.ensure_province(province);
        f(&mut self.world.provinces[ProvinceId::from_index(province)]);
        self
    }

    /// Fix a province's RGO so initialization leaves it alone.
    pub fn with_rgo(mut self, province: usize, good: &str, size: f32) -> Self {
        let Some(c) = self.good(good) else {
            return self;
        };
        let commodities = self.world.commodities.len();
        self.ensure_province(province);
        let p = &mut self.world.provinces[ProvinceId::from_index(province)];
        p.resize_columns(commodities);
        p.rgo = c;
        p.rgo_size = size;
        p.rgo_was_set = true;
        p.rgo_max_size_per_good[c] = size;
        self
    }

    pub fn with_pops_in(mut self, province: usize, pops: &[(&str, f32)]) -> Self {
        self.ensure_province(province);
        for &(name, size) in pops {
            match self.pop_type(name) {
                Some(pt) => {
                    self.world
                        .pops
                        .push(Pop::new(pt, ProvinceId::from_index(province), size));
                }
                None => log::warn!("builder: unknown pop type {name}"),
            }
        }
        self
    }

    /// A factory type producing `output` from `inputs`, available from the start.
    pub fn with_factory_type(
        mut self,
        name: &str,
        output: &str,
        output_amount: f32,
        inputs: &[(&str, f32)],
    ) -> Self {
        let Some(out) = self.good(output) else {
            log::warn!("builder: unknown good {output}");
            return self;
        };
        let inputs = self.commodity_set(inputs);
        self.world.definitions.factory_types.push(FactoryType {
            name: name.to_string(),
            output: out,
            output_amount,
            construction_costs: inputs.clone(),
            inputs,
            construction_time: 365,
            is_available_from_start: true,
            ..Default::default()
        });
        self
    }

    pub fn with_factory_type_config(mut self, name: &str, f: impl FnOnce(&mut FactoryType)) -> Self {
        match self.factory_type(name) {
            Some(ft) => f(&mut self.world.definitions.factory_types[ft]),
            None => log::warn!("builder: unknown factory type {name}"),
        }
        self
    }

    pub fn with_factory(mut self, province: usize, factory_type: &str, level: u8) -> Self {
        match self.factory_type(factory_type) {
            Some(ft) => {
                self.world
                    .factories
                    .push(Factory::new(ft, ProvinceId::from_index(province), level));
            }
            None => log::warn!("builder: unknown factory type {factory_type}"),
        }
        self
    }

    /// Land or naval unit type. The first two land types become the
    /// infantry/artillery pair used for emulated construction demand.
    pub fn with_unit_type(
        mut self,
        name: &str,
        build_cost: &[(&str, f32)],
        build_time: u32,
        is_naval: bool,
    ) -> Self {
        let cost = self.commodity_set(build_cost);
        let land_before = self
            .world
            .definitions
            .unit_types
            .values()
            .filter(|u| !u.is_naval)
            .count();
        let id = self.world.definitions.unit_types.push(UnitType {
            name: name.to_string(),
            supply_cost: cost.clone(),
            build_cost: cost,
            build_time,
            is_naval,
        });
        if !is_naval {
            match land_before {
                0 => {
                    self.world.definitions.infantry = id;
                    self.world.definitions.artillery = id;
                }
                1 => self.world.definitions.artillery = id,
                _ => {}
            }
        }
        self
    }

    pub fn with_world_config(mut self, f: impl FnOnce(&mut WorldState)) -> Self {
        f(&mut self.world);
        self
    }

    pub fn build(mut self) -> WorldState {
        let commodities = self.world.commodities.len();
        let pop_types = self.world.definitions.pop_types.len();

        for pt in self.world.definitions.pop_types.values_mut() {
            let scale = match pt.strata {
                Strata::Poor => 1.0,
                Strata::Middle => 2.0,
                Strata::Rich => 4.0,
            };
            let mut life = Table::filled(commodities, 0.0);
            if commodities > 1 {
                life[CommodityId(1)] = LIFE_NEED * scale;
            }
            let everyday = (0..commodities)
                .map(|i| if i == 0 { 0.0 } else { EVERYDAY_NEED * scale })
                .collect();
            let luxury = (0..commodities)
                .map(|i| if i == 0 { 0.0 } else { LUXURY_NEED * scale })
                .collect();
            if pt.life_needs.len() != commodities {
                pt.life_needs = life;
            }
            if pt.everyday_needs.len() != commodities {
                pt.everyday_needs = everyday;
            }
            if pt.luxury_needs.len() != commodities {
                pt.luxury_needs = luxury;
            }
        }

        let prices: Vec<f32> = self
            .world
            .commodities
            .values()
            .map(|c| c.current_price)
            .collect();
        for (id, nation) in self.world.nations.iter_mut() {
            let treasury = nation.stockpiles.get_or_default(CommodityId::MONEY);
            nation.resize_columns(commodities, pop_types);
            nation.stockpiles[CommodityId::MONEY] = treasury;
            for (slot, price) in nation.effective_prices.values_mut().zip(&prices) {
                if *slot == 0.0 {
                    *slot = *price;
                }
            }
            nation.central_province_count = self
                .world
                .provinces
                .values()
                .filter(|p| p.owner == Some(id))
                .count() as u32;
            if nation.capital.is_none() {
                nation.capital = self
                    .world
                    .provinces
                    .iter()
                    .find(|(_, p)| p.owner == Some(id))
                    .map(|(p, _)| p);
            }
        }
        let first_good = if commodities > 1 {
            CommodityId(1)
        } else {
            CommodityId::MONEY
        };
        for province in self.world.provinces.values_mut() {
            province.resize_columns(commodities);
            if !province.rgo_was_set && province.rgo.is_money() {
                province.rgo = first_good;
            }
        }

        crate::systems::ledger::regenerate_unsaved_values(&mut self.world);
        self.world
    }

    fn ensure_province(&mut self, index: usize) {
        while self.world.provinces.len() <= index {
            let n = self.world.provinces.len();
            self.world.provinces.push(Province {
                name: format!("province {n}"),
                life_rating: 30.0,
                area: 1.0,
                is_coastal: true,
                can_build_railroad: true,
                ..Default::default()
            });
        }
    }

    fn good(&self, name: &str) -> Option<CommodityId> {
        self.world
            .commodities
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(id, _)| id)
    }

    fn pop_type(&self, name: &str) -> Option<PopTypeId> {
        self.world
            .definitions
            .pop_types
            .iter()
            .find(|(_, pt)| pt.name == name)
            .map(|(id, _)| id)
    }

    fn factory_type(&self, name: &str) -> Option<FactoryTypeId> {
        self.world
            .definitions
            .factory_types
            .iter()
            .find(|(_, ft)| ft.name == name)
            .map(|(id, _)| id)
    }

    fn commodity_set(&self, entries: &[(&str, f32)]) -> CommoditySet {
        CommoditySet::new(
            entries
                .iter()
                .filter_map(|&(name, amount)| self.good(name).map(|c| (c, amount))),
        )
    }
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_methods() {
        let world = WorldBuilder::default()
            .with_goods(&["grain", "iron"])
            .with_nation("A")
            .with_nation("B")
            .with_state(0, &[0, 1])
            .with_state(1, &[2])
            .with_unowned_province(3)
            .with_pops_in(0, &[("farmers", 1000.0), ("nobody", 5.0)])
            .with_treasury(1, 250.0)
            .build();

        assert_eq!(world.commodities.len(), 3);
        assert!(world.commodities[CommodityId::MONEY].name == "money");
        assert_eq!(world.provinces.len(), 4);
        assert_eq!(world.provinces[ProvinceId(2)].owner, Some(NationId(1)));
        assert!(world.provinces[ProvinceId(3)].owner.is_none());
        // Unknown pop type is skipped
        assert_eq!(world.pops.len(), 1);
        assert_eq!(world.nations[NationId(1)].treasury(), 250.0);
        assert_eq!(world.nations[NationId(1)].rank, 2);
        assert_eq!(world.nations[NationId(0)].central_province_count, 2);
        assert!(world.validate().is_ok());
    }

    #[test]
    fn test_roles_point_at_standard_types() {
        let world = WorldBuilder::new().with_goods(&["grain"]).build();
        let roles = world.definitions.roles;
        assert_eq!(world.definitions.pop_types[roles.farmers].name, "farmers");
        assert_eq!(world.definitions.pop_types[roles.primary_factory_worker].name, "craftsmen");
        assert_eq!(world.definitions.rgo_workers, vec![roles.farmers, roles.laborers]);
    }

    #[test]
    fn test_first_two_land_units_become_emulation_pair() {
        let world = WorldBuilder::new()
            .with_goods(&["guns"])
            .with_unit_type("infantry", &[("guns", 2.0)], 30, false)
            .with_unit_type("frigate", &[("guns", 5.0)], 60, true)
            .with_unit_type("artillery", &[("guns", 4.0)], 40, false)
            .build();
        assert_eq!(world.definitions.infantry, UnitTypeId(0));
        assert_eq!(world.definitions.artillery, UnitTypeId(2));
    }
}
