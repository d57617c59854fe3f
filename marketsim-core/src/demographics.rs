//! Derived membership lists and population sums.
//!
//! Neither structure is persisted. Both are rebuilt from the entity tables by
//! [`crate::state::WorldState::refresh_derived`] at the start of every pass,
//! so foreign keys in the tables stay the single source of truth.

use crate::ids::*;
use crate::state::WorldState;
use crate::table::Table;

/// Who-contains-whom lists, in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct WorldIndex {
    /// Owned provinces per nation.
    pub nation_provinces: Table<NationId, Vec<ProvinceId>>,
    pub nation_states: Table<NationId, Vec<StateId>>,
    /// Provinces of a state that are held by the state's owner.
    pub state_provinces: Table<StateId, Vec<ProvinceId>>,
    pub province_pops: Table<ProvinceId, Vec<PopId>>,
    pub province_factories: Table<ProvinceId, Vec<FactoryId>>,
    pub state_factories: Table<StateId, Vec<FactoryId>>,
}

impl WorldIndex {
    pub fn build(world: &WorldState) -> Self {
        let mut index = Self {
            nation_provinces: Table::filled(world.nations.len(), Vec::new()),
            nation_states: Table::filled(world.nations.len(), Vec::new()),
            state_provinces: Table::filled(world.states.len(), Vec::new()),
            province_pops: Table::filled(world.provinces.len(), Vec::new()),
            province_factories: Table::filled(world.provinces.len(), Vec::new()),
            state_factories: Table::filled(world.states.len(), Vec::new()),
        };

        for (p, province) in world.provinces.iter() {
            let Some(owner) = province.owner else {
                continue;
            };
            index.nation_provinces[owner].push(p);
            if world.states[province.state].owner == owner {
                index.state_provinces[province.state].push(p);
            }
        }
        for (s, state) in world.states.iter() {
            index.nation_states[state.owner].push(s);
        }
        for (id, pop) in world.pops.iter() {
            index.province_pops[pop.location].push(id);
        }
        for (id, factory) in world.factories.iter() {
            index.province_factories[factory.location].push(id);
            let state = world.provinces[factory.location].state;
            index.state_factories[state].push(id);
        }
        index
    }

    #[inline]
    pub fn owned_province_count(&self, n: NationId) -> usize {
        self.nation_provinces.get(n).map_or(0, Vec::len)
    }
}

/// Pop size and employment per pop type for one region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopCounts {
    pub total: f32,
    pub by_type: Vec<f32>,
    pub employed_by_type: Vec<f32>,
}

impl PopCounts {
    fn with_types(pop_types: usize) -> Self {
        Self {
            total: 0.0,
            by_type: vec![0.0; pop_types],
            employed_by_type: vec![0.0; pop_types],
        }
    }

    fn add(&mut self, pop_type: PopTypeId, size: f32, employed: f32) {
        self.total += size;
        self.by_type[pop_type.index()] += size;
        self.employed_by_type[pop_type.index()] += employed;
    }

    #[inline]
    pub fn of(&self, pop_type: PopTypeId) -> f32 {
        self.by_type.get(pop_type.index()).copied().unwrap_or(0.0)
    }

    #[inline]
    pub fn employed(&self, pop_type: PopTypeId) -> f32 {
        self.employed_by_type
            .get(pop_type.index())
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Demographics {
    pub province: Table<ProvinceId, PopCounts>,
    pub state: Table<StateId, PopCounts>,
    pub nation: Table<NationId, PopCounts>,
}

impl Demographics {
    /// Sum pops into their province, and into the state and nation of an owned province.
    pub fn build(world: &WorldState) -> Self {
        let types = world.definitions.pop_types.len();
        let mut demo = Self {
            province: Table::filled(world.provinces.len(), PopCounts::with_types(types)),
            state: Table::filled(world.states.len(), PopCounts::with_types(types)),
            nation: Table::filled(world.nations.len(), PopCounts::with_types(types)),
        };

        for pop in world.pops.values() {
            let employed = pop.employed();
            let province = &world.provinces[pop.location];
            demo.province[pop.location].add(pop.pop_type, pop.size, employed);
            if let Some(owner) = province.owner {
                demo.nation[owner].add(pop.pop_type, pop.size, employed);
                if world.states[province.state].owner == owner {
                    demo.state[province.state].add(pop.pop_type, pop.size, employed);
                }
            }
        }
        demo
    }
}
