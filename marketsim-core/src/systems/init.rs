//! One-time economy bootstrap for a freshly loaded world.
//!
//! ```text
//! price            = cost (whole history too)
//! savings[pt]      = Σ cost × (life + ½ everyday) × (2 × strata + 1)
//! pop savings      = savings[pt] × size / needs_scaling
//! rgo land         = min(1.5 × ⌈workers / per_size⌉, ⌈2000 / per_size × area⌉)
//! rgo share[c]     ∝ (climate[c] + terrain[c])² × continent[c]
//! treasury         = 2 × full spending cost
//! ```
//!
//! The RGO shares are learned from which goods the map's provinces already
//! produce in each climate, terrain and continent.

use crate::defines::EconomyDefines;
use crate::ids::*;
use crate::math::pseudo_exp_for_negative;
use crate::shard::DayContext;
use crate::state::{Nation, WorldState};
use crate::systems::artisans::initialize_artisan_distribution;
use crate::systems::budget::{full_spending_cost, populate_army_consumption, populate_navy_consumption};
use crate::systems::construction::populate_construction_consumption;
use crate::systems::employment::{update_factory_employment, update_rgo_employment};
use crate::systems::ledger::regenerate_unsaved_values;
use crate::systems::market::populate_effective_prices;
use crate::systems::needs::initialize_needs_weights;
use rustc_hash::FxHashMap;
use tracing::instrument;

/// Normalized good frequencies per climate, terrain or continent bucket.
#[derive(Debug, Default)]
pub struct GoodsDistribution {
    buckets: FxHashMap<u16, Vec<f32>>,
}

impl GoodsDistribution {
    fn count(&mut self, bucket: u16, c: CommodityId, commodities: usize) {
        self.buckets.entry(bucket).or_insert_with(|| vec![0.0; commodities])[c.index()] += 1.0;
    }

    fn normalize(&mut self) {
        for shares in self.buckets.values_mut() {
            let total: f32 = shares.iter().sum();
            if total > 0.0 {
                shares.iter_mut().for_each(|s| *s /= total);
            }
        }
    }

    #[inline]
    pub fn share(&self, bucket: u16, c: CommodityId) -> f32 {
        self.buckets
            .get(&bucket)
            .and_then(|shares| shares.get(c.index()))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Good frequencies learned from the provinces' current RGOs.
pub fn learn_goods_distribution(world: &WorldState) -> [GoodsDistribution; 3] {
    let commodities = world.commodities.len();
    let mut climate = GoodsDistribution::default();
    let mut terrain = GoodsDistribution::default();
    let mut continent = GoodsDistribution::default();
    for province in world.provinces.values() {
        if world.commodities[province.rgo].money_rgo {
            continue;
        }
        climate.count(province.climate, province.rgo, commodities);
        terrain.count(province.terrain, province.rgo, commodities);
        continent.count(province.continent, province.rgo, commodities);
    }
    climate.normalize();
    terrain.normalize();
    continent.normalize();
    [climate, terrain, continent]
}

/// Run `f` on every nation with the rest of the world readable through a
/// [`DayContext`].
fn with_detached_nations(
    world: &mut WorldState,
    defines: &EconomyDefines,
    mut f: impl FnMut(NationId, &mut Nation, &DayContext<'_>),
) {
    let mut nations = std::mem::take(&mut world.nations);
    {
        let ctx = DayContext::new(world, defines, false, pseudo_exp_for_negative);
        for (n, nation) in nations.iter_mut() {
            f(n, nation, &ctx);
        }
    }
    world.nations = nations;
}

/// Seed savings and needs of every pop.
fn initialize_pops(world: &mut WorldState, defines: &EconomyDefines) {
    let savings_per_type: Vec<f32> = world
        .definitions
        .pop_types
        .values()
        .map(|pt| {
            let basket: f32 = world
                .commodities
                .iter()
                .filter(|(_, commodity)| commodity.is_available_from_start)
                .map(|(c, commodity)| {
                    commodity.cost * pt.life_needs.get_or_default(c)
                        + 0.5 * commodity.cost * pt.everyday_needs.get_or_default(c)
                })
                .sum();
            basket * (pt.strata.index() * 2 + 1) as f32
        })
        .collect();

    for pop in world.pops.values_mut() {
        pop.life_needs = 1.0;
        pop.everyday_needs = 0.1;
        pop.luxury_needs = 0.0;
        let savings = savings_per_type.get(pop.pop_type.index()).copied().unwrap_or(0.0);
        pop.savings = savings * pop.size / defines.alice_needs_scaling_factor;
    }
}

/// Size every unset province's RGO land and split it between goods.
fn initialize_rgo_sizes(world: &mut WorldState, defines: &EconomyDefines) {
    let [climate, terrain, continent] = learn_goods_distribution(world);
    let per_size = defines.alice_rgo_per_size_employment;
    let slaves = world.definitions.roles.slaves;
    let rgo_workers = world.definitions.rgo_workers.clone();

    for (p, province) in world.provinces.iter_mut() {
        if province.rgo_was_set {
            continue;
        }
        province.rgo_employment_per_good.fill(0.0);
        province.rgo_target_employment_per_good.fill(0.0);

        let max_size = (2000.0 / per_size * province.area).ceil();
        let workers = world.demographics.province.get(p).map_or(0.0, |d| {
            d.of(slaves)
                + rgo_workers
                    .iter()
                    .filter(|&&pt| pt != slaves)
                    .map(|&pt| d.of(pt))
                    .sum::<f32>()
        });
        let size = ((workers / per_size).ceil() * 1.5).min(max_size);
        debug_assert!(size.is_finite());
        province.rgo_size = size;

        let score = |c: CommodityId, with_continent: bool| {
            let local = climate.share(province.climate, c) + terrain.share(province.terrain, c);
            if with_continent {
                local * local * continent.share(province.continent, c)
            } else {
                local * local
            }
        };
        let goods = || world.commodities.ids();
        let mut shares: Vec<f32> = goods().map(|c| score(c, true)).collect();
        let mut total: f32 = shares.iter().sum();
        if total == 0.0 {
            shares = goods().map(|c| score(c, false)).collect();
            total = shares.iter().sum();
        }
        if total == 0.0 {
            shares = world
                .commodities
                .iter()
                .map(|(c, commodity)| {
                    let eligible = !c.is_money() && !commodity.money_rgo && commodity.is_available_from_start;
                    if eligible {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect();
            total = shares.iter().sum();
        }

        for (slot, share) in province.rgo_max_size_per_good.values_mut().zip(&shares) {
            if total > 0.0 {
                *slot += size * share / total;
            }
        }
    }
}

/// Bootstrap prices, savings, RGO land, budgets, employment and treasuries.
#[instrument(skip_all, name = "initialize")]
pub fn initialize(world: &mut WorldState, defines: &EconomyDefines) {
    regenerate_unsaved_values(world);

    with_detached_nations(world, defines, |_, nation, ctx| initialize_artisan_distribution(nation, ctx));

    for commodity in world.commodities.values_mut() {
        commodity.current_price = commodity.cost;
        commodity.total_consumption = 0.0;
        commodity.total_production = 0.0;
        commodity.total_real_demand = 0.0;
        commodity.demand_by_category = Default::default();
        commodity.price_record.fill(commodity.cost);
    }

    initialize_pops(world, defines);
    for factory in world.factories.values_mut() {
        factory.production_scale = 1.0;
    }
    initialize_rgo_sizes(world, defines);

    for nation in world.nations.values_mut() {
        initialize_needs_weights(nation, &world.commodities);
        let b = &mut nation.budget;
        b.administrative.set(80);
        b.military.set(60);
        b.education.set(100);
        b.social.set(100);
        b.land.set(100);
        b.naval.set(100);
        b.construction.set(100);
        b.overseas.set(100);
        b.poor_tax.set(75);
        b.middle_tax.set(75);
        b.rich_tax.set(75);
        nation.spending_level = 1.0;
        nation.demand_satisfaction.fill(1.0);
        nation.direct_demand_satisfaction.fill(0.0);
    }

    world.refresh_derived();
    update_rgo_employment(world, defines);
    update_factory_employment(world, defines);
    populate_army_consumption(world);
    populate_navy_consumption(world);
    populate_construction_consumption(world, defines);
    populate_effective_prices(world);

    with_detached_nations(world, defines, |n, nation, ctx| {
        let treasury = 2.0 * full_spending_cost(nation, n, ctx);
        *nation.treasury_mut() = treasury;
    });

    log::info!(
        "Economy initialized: {} nations, {} provinces, {} pops",
        world.nations.len(),
        world.provinces.len(),
        world.pops.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WorldBuilder;

    #[test]
    fn test_prices_reset_to_cost() {
        let defines = EconomyDefines::default();
        let mut world = WorldBuilder::new()
            .with_goods(&["grain", "iron"])
            .with_price("iron", 7.0)
            // a drifted market price over a base cost of 3
            .with_commodity_config("iron", |c| c.cost = 3.0)
            .build();
        assert_eq!(world.commodities[CommodityId(2)].current_price, 7.0);
        initialize(&mut world, &defines);
        let iron = &world.commodities[CommodityId(2)];
        assert_eq!(iron.current_price, 3.0);
        assert!(iron.price_record.iter().all(|&p| p == 3.0));
    }

    #[test]
    fn test_pop_savings_follow_strata() {
        let defines = EconomyDefines::default();
        let mut world = WorldBuilder::new()
            .with_goods(&["grain"])
            .with_nation("A")
            .with_state(0, &[0])
            .with_pops_in(0, &[("farmers", 200_000.0), ("capitalists", 200_000.0)])
            .build();
        initialize(&mut world, &defines);
        let farmers = &world.pops[PopId(0)];
        let capitalists = &world.pops[PopId(1)];
        // farmers: (life 1 + ½ × 0.5) × 1; capitalists: (4 + ½ × 2) × 5
        assert!((farmers.savings - 1.25).abs() < 1e-4);
        assert!((capitalists.savings - 25.0).abs() < 1e-4);
        assert_eq!(farmers.everyday_needs, 0.1);
        assert_eq!(capitalists.luxury_needs, 0.0);
    }

    #[test]
    fn test_rgo_land_sized_from_workers() {
        let defines = EconomyDefines::default();
        let mut world = WorldBuilder::new()
            .with_goods(&["grain", "iron"])
            .with_nation("A")
            .with_state(0, &[0, 1])
            .with_pops_in(0, &[("farmers", 100_000.0)])
            .with_province_config(0, |p| p.area = 1000.0)
            .with_province_config(1, |p| {
                p.rgo = CommodityId(2);
                p.rgo_was_set = true;
            })
            .build();
        initialize(&mut world, &defines);
        let province = &world.provinces[ProvinceId(0)];
        // ⌈100000 / 40000⌉ × 1.5, under the land cap of 50
        assert_eq!(province.rgo_size, 4.5);
        // Both provinces share bucket 0; province 1 grows iron, province 0 grain
        let grain = province.rgo_max_size_per_good[CommodityId(1)];
        let iron = province.rgo_max_size_per_good[CommodityId(2)];
        assert!((grain + iron - 4.5).abs() < 1e-4);
        assert!((grain - iron).abs() < 1e-4);
        // Provinces with a scenario RGO are left alone
        assert_eq!(world.provinces[ProvinceId(1)].rgo_max_size_per_good[CommodityId(2)], 0.0);
    }

    #[test]
    fn test_treasury_seeded_and_satisfaction_full() {
        let defines = EconomyDefines::default();
        let mut world = WorldBuilder::new()
            .with_goods(&["grain"])
            .with_nation("A")
            .with_state(0, &[0])
            .with_pops_in(0, &[("soldiers", 10_000.0), ("clerks", 5_000.0)])
            .build();
        // A stockpile to fill gives the nation something to spend on
        world.nations[NationId(0)].stockpile_targets[CommodityId(1)] = 10.0;
        initialize(&mut world, &defines);
        let nation = &world.nations[NationId(0)];
        // 2 × (gap 10 at price 1), plus any transfers
        assert!(nation.treasury() >= 20.0 - 1e-3);
        assert_eq!(nation.demand_satisfaction[CommodityId(1)], 1.0);
        assert_eq!(nation.budget.military.get(), 60);
    }
}
