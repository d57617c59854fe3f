//! Synthetic starting world for the command-line driver.
//!
//! Every nation gets two states of two provinces: a farming state with a
//! textile mill and a mining state with a steelworks. Pop sizes and RGO
//! land vary with the seed so runs with different seeds diverge.

use marketsim_core::ids::*;
use marketsim_core::state::{Unit, WorldState};
use marketsim_core::testing::WorldBuilder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const GOODS: &[&str] = &["grain", "cotton", "iron", "coal", "steel", "cloth", "gold"];
const REGIMENTS_PER_NATION: usize = 3;

/// Build a world of `nations` nations from `seed`.
pub fn synthetic_world(nations: usize, seed: u64) -> WorldState {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut builder = WorldBuilder::new()
        .seed(seed)
        .with_goods(GOODS)
        .with_price("steel", 4.0)
        .with_price("cloth", 3.0)
        .with_price("coal", 1.5)
        .with_commodity_config("gold", |c| {
            c.money_rgo = true;
            c.is_mine = true;
        })
        .with_commodity_config("iron", |c| c.is_mine = true)
        .with_commodity_config("coal", |c| c.is_mine = true)
        .with_factory_type("steelworks", "steel", 1.0, &[("iron", 2.0), ("coal", 1.0)])
        .with_factory_type("textile_mill", "cloth", 1.0, &[("cotton", 2.0)])
        .with_unit_type("infantry", &[("steel", 2.0), ("cloth", 1.0)], 30, false)
        .with_unit_type("artillery", &[("steel", 4.0)], 60, false);

    for n in 0..nations {
        let base = n * 4;
        let farm = [base, base + 1];
        let mine = [base + 2, base + 3];
        let scale = rng.gen_range(0.6f32..1.4);

        builder = builder
            .with_nation(&format!("N{n:02}"))
            .with_treasury(n, 1_000.0 * scale)
            .with_state(n, &farm)
            .with_state(n, &mine)
            .with_rgo(farm[0], "grain", rng.gen_range(10.0f32..25.0))
            .with_rgo(farm[1], "cotton", rng.gen_range(6.0f32..15.0))
            .with_rgo(mine[0], "iron", rng.gen_range(6.0f32..12.0))
            .with_rgo(mine[1], if n % 3 == 0 { "gold" } else { "coal" }, rng.gen_range(4.0f32..10.0))
            .with_pops_in(
                farm[0],
                &[
                    ("farmers", 60_000.0 * scale),
                    ("aristocrats", 1_500.0 * scale),
                    ("clergy", 800.0 * scale),
                ],
            )
            .with_pops_in(
                farm[1],
                &[
                    ("farmers", 30_000.0 * scale),
                    ("craftsmen", 20_000.0 * scale),
                    ("artisans", 6_000.0 * scale),
                    ("clerks", 2_000.0 * scale),
                ],
            )
            .with_pops_in(
                mine[0],
                &[
                    ("laborers", 35_000.0 * scale),
                    ("craftsmen", 15_000.0 * scale),
                    ("capitalists", 1_000.0 * scale),
                    ("bureaucrats", 1_200.0 * scale),
                ],
            )
            .with_pops_in(
                mine[1],
                &[("laborers", 25_000.0 * scale), ("soldiers", 5_000.0 * scale)],
            )
            .with_factory(farm[1], "textile_mill", 1)
            .with_factory(mine[0], "steelworks", 1);
    }

    builder
        .with_world_config(|w| {
            w.great_powers = w.nations.ids().take(8).collect();
            for n in w.nations.ids() {
                for i in 0..REGIMENTS_PER_NATION {
                    w.units.push(Unit {
                        nation: n,
                        unit_type: UnitTypeId::from_index(i % 2),
                    });
                }
            }
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_is_valid() {
        let mut world = synthetic_world(3, 1);
        world.refresh_derived();
        assert_eq!(world.nations.len(), 3);
        assert_eq!(world.provinces.len(), 12);
        assert_eq!(world.factories.len(), 6);
        assert!(world.validate().is_ok());
    }

    #[test]
    fn test_same_seed_same_world() {
        assert_eq!(synthetic_world(2, 9).checksum(), synthetic_world(2, 9).checksum());
    }
}
