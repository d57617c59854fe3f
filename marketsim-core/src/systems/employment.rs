//! Labor allocation: land ownership, subsistence, RGO and factory employment.
//!
//! RGO labor is allocated per province, best expected worker profit first,
//! blended toward each good's target at `rgo_employment_speed`. Whatever is
//! left falls into subsistence. Factory labor is allocated per state in
//! priority buckets and blended at `factory_employment_speed`.
//!
//! ```text
//! rgo:     new[c] = min(cur[c] × (1 - speed) + min(target[c], left) × speed, left)
//!          left -= new[c];  new[c] = clamp(new[c], 0, max[c])
//!          subsistence = min(max_pseudoemployment, left)
//!
//! factory: scale = pool ≥ share ? 1 : pool / share       (per bucket)
//!          emp = emp × (1 - speed) + scale × production_scale × speed
//! ```

use crate::defines::EconomyDefines;
use crate::ids::*;
use crate::state::{Factory, Nation, Province, WorldState};
use crate::systems::rgo::{
    rgo_expected_worker_norm_profit, rgo_max_employment, subsistence_max_pseudoemployment,
};
use rayon::prelude::*;
use tracing::instrument;

// ============================================================================
// Land and subsistence
// ============================================================================

/// Split each owned province's land between landowners, capitalists and the
/// farming population of its state.
#[instrument(skip_all, name = "land_ownership")]
pub fn update_land_ownership(world: &mut WorldState, defines: &EconomyDefines) {
    let roles = world.definitions.roles;
    let states = &world.demographics.state;
    let weight = defines.land_ownership_owner_weight;

    world.provinces.as_mut_slice().par_iter_mut().for_each(|province| {
        let demo = province.owner.and_then(|_| states.get(province.state));
        let Some(demo) = demo else {
            province.landowners_share = 0.0;
            province.capitalists_share = 0.0;
            return;
        };
        let aristocracy = demo.of(roles.aristocrats) * weight + demo.of(roles.slaves);
        let capitalists = demo.of(roles.capitalists) * weight;
        let population = demo.of(roles.farmers) + demo.of(roles.laborers);
        let total = aristocracy + capitalists + population + 1.0;
        province.landowners_share = aristocracy / total;
        province.capitalists_share = capitalists / total;
    });
}

/// Refresh the subsistence score from life rating and how crowded
/// subsistence already is.
///
/// ```text
/// saturation = employment / (offset + max_pseudoemployment)
/// quality    = max((life_rating - base) / base, 0) + 0.01
/// score      = (subsistence_factor × quality + score_life) / (saturation + 1)
/// ```
#[instrument(skip_all, name = "subsistence_factor")]
pub fn update_local_subsistence_factor(world: &mut WorldState, defines: &EconomyDefines) {
    world.provinces.as_mut_slice().par_iter_mut().for_each(|province| {
        let max_subsistence = subsistence_max_pseudoemployment(province, defines);
        let saturation =
            province.subsistence_employment / (defines.subsistence_saturation_offset + max_subsistence);
        let saturation_score = 1.0 / (saturation + 1.0);

        let base = defines.subsistence_life_rating_base;
        let quality = ((province.life_rating - base) / base).max(0.0) + 0.01;
        let score = defines.subsistence_factor * quality + defines.subsistence_score_life;
        province.subsistence_score = score * saturation_score;
    });
}

/// Subsistence score weighted by the share of the province living off it.
#[inline]
pub fn adjusted_subsistence_score(province: &Province, total_pop: f32) -> f32 {
    province.subsistence_score * province.subsistence_employment / (total_pop + 1.0)
}

// ============================================================================
// RGO employment
// ============================================================================

/// Employment fractions written back to the pops of one province.
struct RgoEmploymentResult {
    province: ProvinceId,
    slave_fraction: f32,
    free_fraction: f32,
}

/// Allocate one province's labor across its goods (pure function over the
/// province row).
fn allocate_province_rgo(
    id: ProvinceId,
    province: &mut Province,
    nation: &Nation,
    worker_pool: f32,
    slave_pool: f32,
    world: &AllocationInputs<'_>,
) -> RgoEmploymentResult {
    let defines = world.defines;
    let speed = defines.rgo_employment_speed;
    let current_employment =
        province.rgo_employment_per_good.values().sum::<f32>() + province.subsistence_employment;

    let mut ranked: Vec<(CommodityId, f32, f32)> = Vec::new();
    for (c, commodity) in world.commodities.iter() {
        let max = rgo_max_employment(province, nation, c, commodity, defines);
        if max > 0.0 {
            let profit = rgo_expected_worker_norm_profit(province, nation, c, commodity, defines);
            ranked.push((c, profit, max));
        } else {
            province.rgo_employment_per_good[c] = 0.0;
        }
    }
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut left = worker_pool + slave_pool;
    let mut max_total = 0.0f32;
    let mut employed = 0.0f32;
    for &(c, _, max) in &ranked {
        max_total += max;
        let target = province.rgo_target_employment_per_good[c].min(left);
        let current = province.rgo_employment_per_good[c];
        let next = (current * (1.0 - speed) + target * speed).min(left);
        left -= next;
        let next = next.clamp(0.0, max);
        employed += next;
        province.rgo_employment_per_good[c] = next;
    }

    let subsistence = subsistence_max_pseudoemployment(province, defines).min(left).max(0.0);
    employed += subsistence;
    province.subsistence_employment = subsistence;
    province.rgo_employment = if max_total > 1.0 {
        employed / (max_total + 1.0)
    } else {
        1.0
    };

    let slave_fraction = if slave_pool > current_employment {
        current_employment / slave_pool
    } else {
        1.0
    };
    let free_fraction = if worker_pool > current_employment - slave_pool {
        (current_employment - slave_pool) / worker_pool.max(0.01)
    } else {
        1.0
    }
    .max(0.0);

    RgoEmploymentResult {
        province: id,
        slave_fraction,
        free_fraction,
    }
}

struct AllocationInputs<'a> {
    defines: &'a EconomyDefines,
    commodities: &'a crate::table::Table<CommodityId, crate::state::Commodity>,
}

/// Reallocate RGO labor in every province.
///
/// Demographics must be current.
#[instrument(skip_all, name = "rgo_employment")]
pub fn update_rgo_employment(world: &mut WorldState, defines: &EconomyDefines) {
    let unowned = Nation::default();
    let roles = world.definitions.roles;
    let rgo_workers = &world.definitions.rgo_workers;
    let demographics = &world.demographics.province;
    let nations = &world.nations;
    let inputs = AllocationInputs {
        defines,
        commodities: &world.commodities,
    };

    // PHASE 1: Extract labor pools per province
    let pools: Vec<(f32, f32)> = world
        .provinces
        .ids()
        .map(|p| {
            demographics.get(p).map_or((0.0, 0.0), |demo| {
                let workers = rgo_workers.iter().map(|&pt| demo.of(pt)).sum();
                (workers, demo.of(roles.slaves))
            })
        })
        .collect();

    // PHASE 2: Allocate labor in parallel
    let results: Vec<RgoEmploymentResult> = {
        let _span = tracing::info_span!("provinces_parallel", count = pools.len()).entered();
        world
            .provinces
            .as_mut_slice()
            .par_iter_mut()
            .zip(pools.par_iter())
            .enumerate()
            .map(|(i, (province, &(workers, slaves)))| {
                let nation = province.owner.and_then(|n| nations.get(n)).unwrap_or(&unowned);
                allocate_province_rgo(ProvinceId::from_index(i), province, nation, workers, slaves, &inputs)
            })
            .collect()
    };

    // PHASE 3: Apply pop employment (sequential)
    for pop in world.pops.values_mut() {
        let Some(result) = results.get(pop.location.index()) else {
            continue;
        };
        debug_assert_eq!(result.province, pop.location);
        if pop.pop_type == roles.slaves {
            pop.employment = result.slave_fraction;
        } else if world
            .definitions
            .pop_types
            .get(pop.pop_type)
            .is_some_and(|pt| pt.is_paid_rgo_worker)
        {
            pop.employment = result.free_fraction;
        }
    }
    log::trace!("RGO employment updated for {} provinces", results.len());
}

// ============================================================================
// Factory employment
// ============================================================================

#[inline]
pub fn factory_max_employment(factory: &Factory, defines: &EconomyDefines) -> f32 {
    defines.alice_factory_per_level_employment * factory.level as f32
}

/// Primary workers currently employed by the factory.
#[inline]
pub fn factory_primary_employment(factory: &Factory, defines: &EconomyDefines) -> f32 {
    factory_max_employment(factory, defines) * defines.craftsmen_fraction * factory.primary_employment
}

#[inline]
pub fn factory_secondary_employment(factory: &Factory, defines: &EconomyDefines) -> f32 {
    factory_max_employment(factory, defines) * (1.0 - defines.craftsmen_fraction) * factory.secondary_employment
}

/// Sort key: profitable first, higher priority first, then id.
fn bucket_key(factory: &Factory) -> (bool, std::cmp::Reverse<u8>) {
    (!factory.is_profitable(), std::cmp::Reverse(factory.priority))
}

struct StateEmployment {
    factories: Vec<(FactoryId, f32, f32)>,
    provinces: Vec<ProvinceId>,
    primary: f32,
    secondary: f32,
}

/// Divide one state's factory workers among its factories (pure function).
fn allocate_state_factories(
    mut ordered: Vec<(FactoryId, &Factory)>,
    primary_pool: f32,
    secondary_pool: f32,
    defines: &EconomyDefines,
) -> (Vec<(FactoryId, f32, f32)>, f32, f32) {
    ordered.sort_by_key(|(id, f)| (bucket_key(f), *id));
    let speed = defines.factory_employment_speed;
    let cf = defines.craftsmen_fraction;

    let mut primary_left = primary_pool;
    let mut secondary_left = secondary_pool;
    let mut updates = Vec::with_capacity(ordered.len());

    for bucket in ordered.chunk_by(|a, b| bucket_key(a.1) == bucket_key(b.1)) {
        let workforce: f32 = bucket
            .iter()
            .map(|(_, f)| factory_max_employment(f, defines) * f.production_scale)
            .sum();

        let primary_share = cf * workforce;
        let primary_scale = if primary_left >= primary_share {
            1.0
        } else {
            primary_left / primary_share
        };
        primary_left = (primary_left - primary_share).max(0.0);

        let secondary_share = (1.0 - cf) * workforce;
        let secondary_scale = if secondary_left >= secondary_share {
            1.0
        } else {
            secondary_left / secondary_share
        };
        secondary_left = (secondary_left - secondary_share).max(0.0);

        for (id, f) in bucket {
            let primary =
                f.primary_employment * (1.0 - speed) + primary_scale * f.production_scale * speed;
            let secondary =
                f.secondary_employment * (1.0 - speed) + secondary_scale * f.production_scale * speed;
            updates.push((*id, primary, secondary));
        }
    }

    let primary = 1.0 - if primary_pool > 0.0 { primary_left / primary_pool } else { 0.0 };
    let secondary = 1.0 - if secondary_pool > 0.0 { secondary_left / secondary_pool } else { 0.0 };
    (updates, primary, secondary)
}

/// Reallocate factory workers in every state.
///
/// Demographics and the world index must be current.
#[instrument(skip_all, name = "factory_employment")]
pub fn update_factory_employment(world: &mut WorldState, defines: &EconomyDefines) {
    let roles = world.definitions.roles;

    // PHASE 1: Extract each state's factories and worker pools
    let inputs: Vec<(StateId, Vec<(FactoryId, &Factory)>, f32, f32)> = world
        .states
        .ids()
        .map(|s| {
            let provinces = world.index.state_provinces.get(s).map(Vec::as_slice).unwrap_or_default();
            let factories = provinces
                .iter()
                .flat_map(|&p| world.index.province_factories[p].iter())
                .map(|&f| (f, &world.factories[f]))
                .collect();
            let demo = &world.demographics.state[s];
            (s, factories, demo.of(roles.primary_factory_worker), demo.of(roles.secondary_factory_worker))
        })
        .collect();

    // PHASE 2: Allocate per state in parallel
    let results: Vec<StateEmployment> = {
        let _span = tracing::info_span!("states_parallel", count = inputs.len()).entered();
        inputs
            .into_par_iter()
            .map(|(s, factories, primary_pool, secondary_pool)| {
                let (factories, primary, secondary) =
                    allocate_state_factories(factories, primary_pool, secondary_pool, defines);
                StateEmployment {
                    factories,
                    provinces: world.index.state_provinces[s].clone(),
                    primary,
                    secondary,
                }
            })
            .collect()
    };

    // PHASE 3: Aggregate results (sequential)
    for state in results {
        for (id, primary, secondary) in state.factories {
            let factory = &mut world.factories[id];
            factory.primary_employment = primary;
            factory.secondary_employment = secondary;
        }
        for p in state.provinces {
            for &pop_id in &world.index.province_pops[p] {
                let pop = &mut world.pops[pop_id];
                if pop.pop_type == roles.primary_factory_worker {
                    pop.employment = state.primary;
                } else if pop.pop_type == roles.secondary_factory_worker {
                    pop.employment = state.secondary;
                }
            }
        }
    }
}
