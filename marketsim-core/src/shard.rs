//! Per-nation ownership split for the parallel phases of the daily pass.
//!
//! Before a parallel phase the nation, province, pop and factory tables are
//! moved out of the [`WorldState`] into one [`NationShard`] per nation. A shard
//! owns its nation row and every owned province together with the pops and
//! factories located there, so a rayon task can mutate it without locks.
//! Everything else (commodities, definitions, demographics) is shared
//! read-only through a [`DayContext`].
//!
//! ```text
//!   WorldState ──split──▶ [NationShard; N] + Leftovers ──par_iter_mut──▶ merge ──▶ WorldState
//!                                  │                                       │
//!                          owned provinces                    rows restored by id,
//!                          pops, factories                    demand reduced in id order
//! ```
//!
//! Provinces without an owner (and their pops and factories) sit in
//! [`Leftovers`] untouched until the merge.

use crate::defines::EconomyDefines;
use crate::definitions::Definitions;
use crate::demographics::{Demographics, WorldIndex};
use crate::ids::*;
use crate::math::ExpFn;
use crate::state::{Commodity, Date, Factory, Nation, Pop, Province, State, WorldState};
use crate::systems::ledger::DemandAccumulator;
use crate::table::{from_pairs, Table};
use rustc_hash::FxHashMap;

/// Read-only inputs shared by every shard task.
pub struct DayContext<'a> {
    pub defines: &'a EconomyDefines,
    pub definitions: &'a Definitions,
    pub commodities: &'a Table<CommodityId, Commodity>,
    pub states: &'a Table<StateId, State>,
    pub index: &'a WorldIndex,
    pub demographics: &'a Demographics,
    pub date: Date,
    pub inflation: f32,
    pub initiate_buildings: bool,
    /// Exponential used by the artisan softmax.
    pub exp: ExpFn,
}

impl<'a> DayContext<'a> {
    pub fn new(
        world: &'a WorldState,
        defines: &'a EconomyDefines,
        initiate_buildings: bool,
        exp: ExpFn,
    ) -> Self {
        Self {
            defines,
            definitions: &world.definitions,
            commodities: &world.commodities,
            states: &world.states,
            index: &world.index,
            demographics: &world.demographics,
            date: world.date,
            inflation: world.inflation,
            initiate_buildings,
            exp,
        }
    }

    /// Commodity ids excluding money.
    pub fn goods(&self) -> impl Iterator<Item = CommodityId> {
        (1..self.commodities.len()).map(CommodityId::from_index)
    }

    #[inline]
    pub fn price(&self, c: CommodityId) -> f32 {
        self.commodities[c].current_price
    }

    #[inline]
    pub fn is_available(&self, nation: &Nation, c: CommodityId) -> bool {
        nation.has_access(&self.commodities[c])
    }
}

/// An owned province with the pops and factories located in it.
#[derive(Debug, Clone)]
pub struct ProvinceSlot {
    pub id: ProvinceId,
    pub province: Province,
    pub pops: Vec<(PopId, Pop)>,
    pub factories: Vec<(FactoryId, Factory)>,
}

impl ProvinceSlot {
    #[inline]
    pub fn is_controlled_by(&self, n: NationId) -> bool {
        self.province.controller == Some(n)
    }
}

#[derive(Debug, Clone)]
pub struct NationShard {
    pub id: NationId,
    pub nation: Nation,
    /// Owned provinces in ascending id order.
    pub provinces: Vec<ProvinceSlot>,
    pub demand: DemandAccumulator,
    slot_of: FxHashMap<ProvinceId, usize>,
}

impl NationShard {
    pub fn new(id: NationId, nation: Nation, provinces: Vec<ProvinceSlot>, commodities: usize) -> Self {
        let slot_of = provinces
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.id, i))
            .collect();
        Self {
            id,
            nation,
            provinces,
            demand: DemandAccumulator::new(commodities),
            slot_of,
        }
    }

    #[inline]
    pub fn slot_index(&self, p: ProvinceId) -> Option<usize> {
        self.slot_of.get(&p).copied()
    }

    /// Slot indices of the given provinces that this shard owns.
    pub fn slots_of(&self, provinces: &[ProvinceId]) -> Vec<usize> {
        provinces.iter().filter_map(|p| self.slot_index(*p)).collect()
    }

    pub fn pops(&self) -> impl Iterator<Item = &(PopId, Pop)> {
        self.provinces.iter().flat_map(|slot| slot.pops.iter())
    }

    pub fn factories(&self) -> impl Iterator<Item = &(FactoryId, Factory)> {
        self.provinces.iter().flat_map(|slot| slot.factories.iter())
    }
}

/// Rows that belong to no nation.
#[derive(Debug, Clone, Default)]
pub struct Leftovers {
    provinces: Vec<(ProvinceId, Province)>,
    pops: Vec<(PopId, Pop)>,
    factories: Vec<(FactoryId, Factory)>,
}

/// The world's entity tables, owned by nation.
#[derive(Debug, Clone, Default)]
pub struct ShardedWorld {
    pub shards: Vec<NationShard>,
    leftovers: Leftovers,
}

impl ShardedWorld {
    pub fn shard(&self, n: NationId) -> Option<&NationShard> {
        self.shards.get(n.index())
    }

    pub fn shard_mut(&mut self, n: NationId) -> Option<&mut NationShard> {
        self.shards.get_mut(n.index())
    }
}

fn take_rows<I: DenseId, T>(table: &mut Table<I, T>) -> Vec<Option<T>> {
    std::mem::take(table)
        .into_rows()
        .into_iter()
        .map(Some)
        .collect()
}

fn take_listed<I: DenseId, T>(rows: &mut [Option<T>], ids: &[I]) -> Vec<(I, T)> {
    ids.iter()
        .filter_map(|&id| rows.get_mut(id.index()).and_then(Option::take).map(|row| (id, row)))
        .collect()
}

fn remaining<I: DenseId, T>(rows: Vec<Option<T>>) -> Vec<(I, T)> {
    rows.into_iter()
        .enumerate()
        .filter_map(|(i, row)| row.map(|row| (I::from_index(i), row)))
        .collect()
}

/// Move the entity tables out of `world` into per-nation shards.
///
/// `world.index` must be current (see [`WorldState::refresh_derived`]).
pub fn split(world: &mut WorldState) -> ShardedWorld {
    let commodities = world.commodities.len();
    let nations = std::mem::take(&mut world.nations).into_rows();
    let mut provinces = take_rows(&mut world.provinces);
    let mut pops = take_rows(&mut world.pops);
    let mut factories = take_rows(&mut world.factories);

    let shards = nations
        .into_iter()
        .enumerate()
        .map(|(i, nation)| {
            let id = NationId::from_index(i);
            let owned = world
                .index
                .nation_provinces
                .get(id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let slots = owned
                .iter()
                .filter_map(|&p| {
                    let province = provinces.get_mut(p.index()).and_then(Option::take)?;
                    let pop_ids = world.index.province_pops.get(p).map(Vec::as_slice).unwrap_or_default();
                    let factory_ids = world
                        .index
                        .province_factories
                        .get(p)
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    Some(ProvinceSlot {
                        id: p,
                        province,
                        pops: take_listed(&mut pops, pop_ids),
                        factories: take_listed(&mut factories, factory_ids),
                    })
                })
                .collect();
            NationShard::new(id, nation, slots, commodities)
        })
        .collect();

    ShardedWorld {
        shards,
        leftovers: Leftovers {
            provinces: remaining(provinces),
            pops: remaining(pops),
            factories: remaining(factories),
        },
    }
}

/// Restore the entity tables and reduce each shard's demand breakdown into
/// the commodity table in nation-id order.
pub fn merge(world: &mut WorldState, sharded: ShardedWorld) {
    let ShardedWorld { shards, leftovers } = sharded;
    let Leftovers {
        provinces: mut province_rows,
        pops: mut pop_rows,
        factories: mut factory_rows,
    } = leftovers;

    let mut nation_rows = Vec::with_capacity(shards.len());
    for shard in shards {
        shard.demand.merge_into(&mut world.commodities);
        for slot in shard.provinces {
            province_rows.push((slot.id, slot.province));
            pop_rows.extend(slot.pops);
            factory_rows.extend(slot.factories);
        }
        nation_rows.push((shard.id, shard.nation));
    }

    world.nations = from_pairs(nation_rows);
    world.provinces = from_pairs(province_rows);
    world.pops = from_pairs(pop_rows);
    world.factories = from_pairs(factory_rows);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::ledger::DemandReason;
    use crate::testing::WorldBuilder;

    fn two_nation_world() -> WorldState {
        WorldBuilder::new()
            .with_goods(&["grain", "cloth"])
            .with_factory_type("textile", "cloth", 1.0, &[("grain", 1.0)])
            .with_nation("A")
            .with_nation("B")
            .with_state(0, &[0, 1])
            .with_state(1, &[2])
            .with_unowned_province(3)
            .with_pops_in(0, &[("farmers", 100.0)])
            .with_pops_in(2, &[("craftsmen", 50.0)])
            .with_pops_in(3, &[("farmers", 10.0)])
            .with_factory(2, "textile", 1)
            .build()
    }

    #[test]
    fn test_split_assigns_owned_rows() {
        let mut world = two_nation_world();
        let sharded = split(&mut world);

        assert!(world.nations.is_empty());
        assert_eq!(sharded.shards.len(), 2);
        let a = &sharded.shards[0];
        assert_eq!(a.provinces.len(), 2);
        assert_eq!(a.pops().count(), 1);
        let b = &sharded.shards[1];
        assert_eq!(b.factories().count(), 1);
        assert_eq!(b.slot_index(ProvinceId(2)), Some(0));
        assert_eq!(b.slot_index(ProvinceId(0)), None);
    }

    #[test]
    fn test_merge_restores_tables_unchanged() {
        let mut world = two_nation_world();
        let before = serde_json::to_string(&world).unwrap();
        let sharded = split(&mut world);
        merge(&mut world, sharded);
        let after = serde_json::to_string(&world).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_merge_reduces_demand_breakdown() {
        let mut world = two_nation_world();
        let grain = CommodityId(1);
        let mut sharded = split(&mut world);
        for shard in sharded.shards.iter_mut() {
            shard.demand.add(grain, DemandReason::Factory, 2.0);
        }
        merge(&mut world, sharded);
        assert_eq!(
            world.commodities[grain].demand_by_category[DemandReason::Factory.index()],
            4.0
        );
    }
}
