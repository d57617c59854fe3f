//! Construction projects: daily demand, funding, completion and pruning.
//!
//! A project buys its cost list a little each day. The national treasury
//! funds state projects through `construction_demand`; pop projects are
//! funded by private investment through `private_construction_demand`.
//!
//! ```text
//! admin cost factor   acf = 2 - administrative_efficiency
//! build time          time = curve(date) × base days
//! curve(date)         floor + slope / (√(day × 0.01 + 2) + shift)
//!                     shift = -(start - floor) / derivative
//!                     slope = (start - floor) × shift
//! daily demand        base × acf / time     while purchased < base × acf
//! daily purchase      min(funded demand, base / time)
//! ```
//!
//! Factory projects additionally scale by the nation's factory cost modifier
//! (`fm = factory_cost + 1`, times `max(0.1, factory_owner_cost)` for pop
//! projects). Upgrades demand at half their build time but purchase at a
//! tenth of it.

use crate::defines::EconomyDefines;
use crate::definitions::{CommoditySet, FactoryType};
use crate::external::{EconomyEvent, EventSink};
use crate::ids::*;
use crate::shard::DayContext;
use crate::state::{Date, Factory, Nation, Purchased, StateBuildingConstruction, Unit, WorldState};
use crate::systems::employment::factory_max_employment;
use crate::systems::factories::{factories_in_state, state_contains_factory, state_factory_count};
use crate::systems::ledger::{register_construction_demand, register_demand, DemandAccumulator, DemandReason};
use crate::table::Table;
use tracing::instrument;

// ============================================================================
// Time curves
// ============================================================================

/// Build-time multiplier falling from `start` toward `floor` as the
/// campaign ages (pure function).
pub fn construction_time_curve(date: Date, start: f32, floor: f32, derivative: f32) -> f32 {
    let diff = start - floor;
    let shift = -diff / derivative;
    let slope = diff * shift;
    let t = (date.0 as f32 * 0.01 + 2.0).sqrt();
    floor + slope / (t + shift)
}

/// Multiplier for units and province buildings.
pub fn non_factory_construction_time_modifier(date: Date, defines: &EconomyDefines) -> f32 {
    construction_time_curve(
        date,
        defines.construction_time_start,
        defines.construction_time_floor,
        defines.construction_time_slope,
    )
}

/// Multiplier for factory projects; starts below 1 so the first factories
/// come up quickly.
pub fn factory_construction_time_modifier(date: Date, defines: &EconomyDefines) -> f32 {
    construction_time_curve(
        date,
        defines.factory_construction_time_start,
        defines.factory_construction_time_floor,
        defines.factory_construction_time_slope,
    )
}

#[inline]
pub fn admin_cost_factor(nation: &Nation) -> f32 {
    2.0 - nation.administrative_efficiency
}

#[inline]
pub fn factory_cost_modifier(nation: &Nation) -> f32 {
    nation.modifiers.factory_cost + 1.0
}

/// Factory cost modifier for privately funded projects.
#[inline]
pub fn private_factory_cost_modifier(nation: &Nation) -> f32 {
    factory_cost_modifier(nation) * nation.modifiers.factory_owner_cost.max(0.1)
}

#[inline]
fn build_days(days: u32) -> f32 {
    days.max(1) as f32
}

// ============================================================================
// Project terms
// ============================================================================

/// Multipliers applied to every entry of a project's base cost list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectTerms {
    /// Total that must be bought before the project completes.
    pub required: f32,
    /// Amount demanded per day while unfinished.
    pub daily_demand: f32,
    /// Most that may be bought in one day.
    pub daily_purchase: f32,
}

impl ProjectTerms {
    /// Same time for demand and purchase, `scale` on every term.
    fn uniform(scale: f32, acf: f32, time: f32) -> Self {
        Self {
            required: scale * acf,
            daily_demand: scale * acf / time,
            daily_purchase: scale / time,
        }
    }

    /// Cost slots still short of their requirement.
    pub fn outstanding<'a>(
        &'a self,
        costs: &'a CommoditySet,
        purchased: &'a Purchased,
    ) -> impl Iterator<Item = (usize, CommodityId, f32)> + 'a {
        costs
            .iter()
            .enumerate()
            .filter(move |&(i, (_, base))| purchased.get(i) < base * self.required)
            .map(|(i, (c, base))| (i, c, base))
    }

    pub fn is_finished(&self, costs: &CommoditySet, purchased: &Purchased) -> bool {
        self.outstanding(costs, purchased).next().is_none()
    }

    /// Share of the requirement bought so far.
    pub fn progress(&self, costs: &CommoditySet, purchased: &Purchased) -> f32 {
        let total: f32 = costs.iter().map(|(_, base)| base * self.required).sum();
        let bought: f32 = purchased.0.iter().sum();
        if total > 0.0 {
            bought / total
        } else {
            0.0
        }
    }

    /// Move today's purchases from `source` into `purchased`.
    fn advance(&self, costs: &CommoditySet, purchased: &mut Purchased, source: &mut Table<CommodityId, f32>) {
        for (i, (c, base)) in costs.iter().enumerate() {
            if purchased.get(i) >= base * self.required {
                continue;
            }
            let available = &mut source[c];
            let delta = available.min(base * self.daily_purchase).max(0.0);
            purchased.add(i, delta);
            *available -= delta;
        }
    }
}

/// Terms for a regiment or ship.
pub fn unit_terms(days: u32, nation: &Nation, non_factory_modifier: f32) -> ProjectTerms {
    let time = non_factory_modifier * build_days(days);
    ProjectTerms::uniform(1.0, admin_cost_factor(nation), time)
}

/// Terms for a railroad, fort or naval base.
pub fn province_building_terms(
    days: u32,
    nation: &Nation,
    is_pop_project: bool,
    non_factory_modifier: f32,
) -> ProjectTerms {
    let time = non_factory_modifier * build_days(days);
    let acf = if is_pop_project { 1.0 } else { admin_cost_factor(nation) };
    ProjectTerms::uniform(1.0, acf, time)
}

/// Terms for founding or expanding a factory.
pub fn state_building_terms(
    factory_type: &FactoryType,
    nation: &Nation,
    is_pop_project: bool,
    is_upgrade: bool,
    factory_modifier: f32,
) -> ProjectTerms {
    let base_time = factory_modifier * build_days(factory_type.construction_time);
    let purchase_time = base_time * if is_upgrade { 0.1 } else { 1.0 };
    if is_pop_project {
        return ProjectTerms::uniform(private_factory_cost_modifier(nation), 1.0, purchase_time);
    }
    let fm = factory_cost_modifier(nation);
    let acf = admin_cost_factor(nation);
    let demand_time = base_time * if is_upgrade { 0.5 } else { 1.0 };
    ProjectTerms {
        required: fm * acf,
        daily_demand: fm * acf / demand_time,
        daily_purchase: fm / purchase_time,
    }
}

// ============================================================================
// Daily demand
// ============================================================================

/// Rebuild every nation's `construction_demand` from its state-funded
/// projects.
#[instrument(skip_all, name = "construction_demand")]
pub fn populate_construction_consumption(world: &mut WorldState, defines: &EconomyDefines) {
    let nf = non_factory_construction_time_modifier(world.date, defines);
    let ff = factory_construction_time_modifier(world.date, defines);
    let WorldState {
        nations,
        provinces,
        pops,
        constructions,
        definitions,
        ..
    } = world;

    for nation in nations.values_mut() {
        nation.construction_demand.fill(0.0);
    }

    let book = |nation: &mut Nation, costs: &CommoditySet, purchased: &Purchased, terms: ProjectTerms| {
        for (_, c, base) in terms.outstanding(costs, purchased) {
            register_construction_demand(nation, c, base * terms.daily_demand);
        }
    };

    for project in &constructions.land {
        let province = &provinces[pops[project.pop].location];
        let Some(owner) = province.owner.filter(|&o| province.controller == Some(o)) else {
            continue;
        };
        let unit = &definitions.unit_types[project.unit_type];
        let terms = unit_terms(unit.build_time, &nations[owner], nf);
        book(&mut nations[owner], &unit.build_cost, &project.purchased, terms);
    }

    // Only the head of each province's shipyard queue is worked on.
    let mut shipyards_seen: Vec<ProvinceId> = Vec::new();
    for project in &constructions.naval {
        if shipyards_seen.contains(&project.province) {
            continue;
        }
        shipyards_seen.push(project.province);
        let province = &provinces[project.province];
        let Some(owner) = province.owner.filter(|&o| province.controller == Some(o)) else {
            continue;
        };
        let unit = &definitions.unit_types[project.unit_type];
        let terms = unit_terms(unit.build_time, &nations[owner], nf);
        book(&mut nations[owner], &unit.build_cost, &project.purchased, terms);
    }

    for project in constructions.province_buildings.iter().filter(|p| !p.is_pop_project) {
        let province = &provinces[project.province];
        if province.owner != province.controller {
            continue;
        }
        let building = definitions.province_building(project.kind);
        let terms = province_building_terms(building.time, &nations[project.nation], false, nf);
        book(&mut nations[project.nation], &building.cost, &project.purchased, terms);
    }

    for project in constructions.state_buildings.iter().filter(|p| !p.is_pop_project) {
        let ft = &definitions.factory_types[project.factory_type];
        let terms = state_building_terms(ft, &nations[project.nation], false, project.is_upgrade, ff);
        book(&mut nations[project.nation], &ft.construction_costs, &project.purchased, terms);
    }
}

/// Rebuild every nation's `private_construction_demand` from pop projects.
#[instrument(skip_all, name = "private_construction_demand")]
pub fn populate_private_construction_consumption(world: &mut WorldState, defines: &EconomyDefines) {
    let nf = non_factory_construction_time_modifier(world.date, defines);
    let ff = factory_construction_time_modifier(world.date, defines);
    let WorldState {
        nations,
        provinces,
        constructions,
        definitions,
        ..
    } = world;

    for nation in nations.values_mut() {
        nation.private_construction_demand.fill(0.0);
    }

    for project in constructions.province_buildings.iter().filter(|p| p.is_pop_project) {
        let province = &provinces[project.province];
        if province.owner != province.controller {
            continue;
        }
        let building = definitions.province_building(project.kind);
        let nation = &mut nations[project.nation];
        let terms = province_building_terms(building.time, nation, true, nf);
        for (_, c, base) in terms.outstanding(&building.cost, &project.purchased) {
            nation.private_construction_demand[c] += base * terms.daily_demand;
        }
    }

    for project in constructions.state_buildings.iter().filter(|p| p.is_pop_project) {
        let ft = &definitions.factory_types[project.factory_type];
        let nation = &mut nations[project.nation];
        let terms = state_building_terms(ft, nation, true, project.is_upgrade, ff);
        for (_, c, base) in terms.outstanding(&ft.construction_costs, &project.purchased) {
            nation.private_construction_demand[c] += base * terms.daily_demand;
        }
    }
}

/// Cost at effective prices of today's state-funded construction, scaled by
/// how much of it the market can supply.
pub fn estimate_construction_spending(world: &WorldState, n: NationId, defines: &EconomyDefines) -> f32 {
    let nation = &world.nations[n];
    let nf = non_factory_construction_time_modifier(world.date, defines);
    let ff = factory_construction_time_modifier(world.date, defines);
    let definitions = &world.definitions;
    let cost = |costs: &CommoditySet, purchased: &Purchased, terms: ProjectTerms| -> f32 {
        terms
            .outstanding(costs, purchased)
            .map(|(_, c, base)| {
                nation.effective_prices[c] * nation.demand_satisfaction[c] * base * terms.daily_purchase
            })
            .sum()
    };

    let mut total = 0.0;
    for project in world.constructions.land.iter().filter(|p| p.nation == n) {
        if world.provinces[world.pops[project.pop].location].controller != Some(n) {
            continue;
        }
        let unit = &definitions.unit_types[project.unit_type];
        total += cost(&unit.build_cost, &project.purchased, unit_terms(unit.build_time, nation, nf));
    }

    let mut shipyards_seen: Vec<ProvinceId> = Vec::new();
    for project in &world.constructions.naval {
        if shipyards_seen.contains(&project.province) {
            continue;
        }
        shipyards_seen.push(project.province);
        let province = &world.provinces[project.province];
        if province.owner != Some(n) || province.controller != Some(n) {
            continue;
        }
        let unit = &definitions.unit_types[project.unit_type];
        total += cost(&unit.build_cost, &project.purchased, unit_terms(unit.build_time, nation, nf));
    }

    for project in world.constructions.province_buildings.iter() {
        if project.nation != n || project.is_pop_project || world.provinces[project.province].controller != Some(n) {
            continue;
        }
        let building = definitions.province_building(project.kind);
        let terms = province_building_terms(building.time, nation, false, nf);
        total += cost(&building.cost, &project.purchased, terms);
    }

    for project in world.constructions.state_buildings.iter() {
        if project.nation != n || project.is_pop_project {
            continue;
        }
        let ft = &definitions.factory_types[project.factory_type];
        let terms = state_building_terms(ft, nation, false, project.is_upgrade, ff);
        total += cost(&ft.construction_costs, &project.purchased, terms);
    }
    total
}

// ============================================================================
// Funding
// ============================================================================

/// Settle today's construction purchases for nation `n` and move the goods
/// into its projects. Returns the refund paid back for construction goods
/// the market could not supply.
pub fn advance_construction(world: &mut WorldState, n: NationId, defines: &EconomyDefines) -> f32 {
    let nf = non_factory_construction_time_modifier(world.date, defines);
    let ff = factory_construction_time_modifier(world.date, defines);
    let WorldState {
        nations,
        provinces,
        commodities,
        constructions,
        definitions,
        index,
        ..
    } = world;
    let nation = &mut nations[n];

    let c_spending = nation.spending_level * nation.budget.construction.fraction();
    let p_spending = nation.private_investment_effective_fraction;
    let mut refund = 0.0;
    for (i, commodity) in commodities.iter().skip(1) {
        let satisfaction = nation.demand_satisfaction[i];
        refund += nation.construction_demand[i] * c_spending * (1.0 - satisfaction) * commodity.current_price;
        nation.construction_demand[i] *= c_spending * satisfaction;
        nation.private_construction_demand[i] *= p_spending * satisfaction;
    }
    debug_assert!(refund >= 0.0);
    *nation.treasury_mut() += refund;

    let held: Vec<ProvinceId> = index
        .nation_provinces
        .get(n)
        .map(|ps| ps.iter().copied().filter(|&p| provinces[p].controller == Some(n)).collect())
        .unwrap_or_default();

    for &p in &held {
        // One regiment per province, raised from the first pop with an order.
        let pops_here = index.province_pops.get(p).map(Vec::as_slice).unwrap_or(&[]);
        let regiment = pops_here
            .iter()
            .find_map(|&pop| constructions.land.iter().position(|c| c.pop == pop));
        if let Some(project) = regiment.map(|i| &mut constructions.land[i]) {
            let unit = &definitions.unit_types[project.unit_type];
            unit_terms(unit.build_time, nation, nf).advance(
                &unit.build_cost,
                &mut project.purchased,
                &mut nation.construction_demand,
            );
        }
        if let Some(project) = constructions.naval.iter_mut().find(|c| c.province == p) {
            let unit = &definitions.unit_types[project.unit_type];
            unit_terms(unit.build_time, nation, nf).advance(
                &unit.build_cost,
                &mut project.purchased,
                &mut nation.construction_demand,
            );
        }
    }

    for project in constructions.province_buildings.iter_mut().filter(|c| c.nation == n) {
        let province = &provinces[project.province];
        if province.owner != province.controller {
            continue;
        }
        let building = definitions.province_building(project.kind);
        let terms = province_building_terms(building.time, nation, project.is_pop_project, nf);
        let source = if project.is_pop_project {
            &mut nation.private_construction_demand
        } else {
            &mut nation.construction_demand
        };
        terms.advance(&building.cost, &mut project.purchased, source);
    }

    for project in constructions.state_buildings.iter_mut().filter(|c| c.nation == n) {
        let ft = &definitions.factory_types[project.factory_type];
        let terms = state_building_terms(ft, nation, project.is_pop_project, project.is_upgrade, ff);
        let source = if project.is_pop_project {
            &mut nation.private_construction_demand
        } else {
            &mut nation.construction_demand
        };
        terms.advance(&ft.construction_costs, &mut project.purchased, source);
    }

    log::trace!("{n}: construction refund {refund:.3}");
    refund
}

// ============================================================================
// Completion
// ============================================================================

/// Turn every fully purchased project into its unit, building level or
/// factory, and delete the project. Returns the number completed.
#[instrument(skip_all, name = "resolve_constructions")]
pub fn resolve_constructions(world: &mut WorldState, defines: &EconomyDefines, events: &mut dyn EventSink) -> usize {
    let date = world.date;
    let nf = non_factory_construction_time_modifier(date, defines);
    let ff = factory_construction_time_modifier(date, defines);
    let mut completed = 0;

    for i in (0..world.constructions.land.len()).rev() {
        let project = &world.constructions.land[i];
        let unit = &world.definitions.unit_types[project.unit_type];
        let terms = unit_terms(unit.build_time, &world.nations[project.nation], nf);
        if !terms.is_finished(&unit.build_cost, &project.purchased) {
            continue;
        }
        let project = world.constructions.land.remove(i);
        world.units.push(Unit {
            nation: project.nation,
            unit_type: project.unit_type,
        });
        events.post(EconomyEvent::UnitCompleted {
            date,
            nation: project.nation,
            unit_type: project.unit_type,
        });
        completed += 1;
    }

    let mut shipyards_seen: Vec<ProvinceId> = Vec::new();
    let mut launched: Vec<usize> = Vec::new();
    for (i, project) in world.constructions.naval.iter().enumerate() {
        if shipyards_seen.contains(&project.province) {
            continue;
        }
        shipyards_seen.push(project.province);
        let unit = &world.definitions.unit_types[project.unit_type];
        let terms = unit_terms(unit.build_time, &world.nations[project.nation], nf);
        if terms.is_finished(&unit.build_cost, &project.purchased) {
            launched.push(i);
        }
    }
    for &i in launched.iter().rev() {
        let project = world.constructions.naval.remove(i);
        world.units.push(Unit {
            nation: project.nation,
            unit_type: project.unit_type,
        });
        events.post(EconomyEvent::UnitCompleted {
            date,
            nation: project.nation,
            unit_type: project.unit_type,
        });
        completed += 1;
    }

    for i in (0..world.constructions.province_buildings.len()).rev() {
        let project = &world.constructions.province_buildings[i];
        let building = world.definitions.province_building(project.kind);
        let terms = province_building_terms(building.time, &world.nations[project.nation], project.is_pop_project, nf);
        if !terms.is_finished(&building.cost, &project.purchased) {
            continue;
        }
        let project = world.constructions.province_buildings.remove(i);
        let province = &mut world.provinces[project.province];
        let max_level = province
            .owner
            .map_or(0, |o| world.nations[o].max_building_level[project.kind.index()]);
        let level = &mut province.building_levels[project.kind.index()];
        // Finished projects are deleted even when the level cap was reached meanwhile.
        if *level < max_level {
            *level += 1;
            events.post(EconomyEvent::ProvinceBuildingCompleted {
                date,
                nation: project.nation,
                kind: project.kind,
            });
        }
        completed += 1;
    }

    let mut factories_changed = false;
    for i in (0..world.constructions.state_buildings.len()).rev() {
        let project = &world.constructions.state_buildings[i];
        let ft = &world.definitions.factory_types[project.factory_type];
        let terms = state_building_terms(
            ft,
            &world.nations[project.nation],
            project.is_pop_project,
            project.is_upgrade,
            ff,
        );
        if !terms.is_finished(&ft.construction_costs, &project.purchased) {
            continue;
        }
        let project = world.constructions.state_buildings.remove(i);
        add_factory_level_to_state(world, project.state, project.factory_type, project.is_upgrade);
        events.post(EconomyEvent::FactoryCompleted {
            date,
            nation: project.nation,
            state: project.state,
            factory_type: project.factory_type,
            upgrade: project.is_upgrade,
        });
        factories_changed = true;
        completed += 1;
    }

    if factories_changed {
        world.refresh_derived();
    }
    if completed > 0 {
        log::debug!("{completed} construction projects completed");
    }
    completed
}

/// Level a factory gains from one completed expansion (pure function).
///
/// ```text
/// level' = min(255, level + 1 + √level / 2)
/// ```
pub fn upgraded_factory_level(level: u8) -> u8 {
    let next = level as f32 + 1.0 + (level as f32).sqrt() / 2.0;
    next.min(u8::MAX as f32) as u8
}

/// Expand the state's factory of type `ft`, or found a level-1 one in the
/// state capital when there is none to expand.
pub fn add_factory_level_to_state(world: &mut WorldState, s: StateId, ft: FactoryTypeId, is_upgrade: bool) {
    if is_upgrade {
        let existing = factories_in_state(world, s)
            .find(|(_, f)| f.building_type == ft)
            .map(|(id, _)| id);
        if let Some(id) = existing {
            let factory = &mut world.factories[id];
            factory.level = upgraded_factory_level(factory.level);
            return;
        }
    }
    let capital = world.states[s].capital;
    world.factories.push(Factory::new(ft, capital, 1));
}

/// Whether some province of `s` is coastal.
pub fn state_is_coastal(world: &WorldState, s: StateId) -> bool {
    world.provinces.values().any(|p| p.state == s && p.is_coastal)
}

/// Found a factory of type `ft` in `s` immediately if the state has a free
/// slot and no factory or project of that type. Returns whether one was
/// added.
pub fn try_add_factory_to_state(world: &mut WorldState, s: StateId, ft: FactoryTypeId, defines: &EconomyDefines) -> bool {
    if world.definitions.factory_types[ft].is_coastal && !state_is_coastal(world, s) {
        return false;
    }
    if state_contains_factory(world, s, ft) {
        return false;
    }
    if state_factory_count(world, s) >= defines.factories_per_state as usize {
        return false;
    }
    add_factory_level_to_state(world, s, ft, false);
    world.refresh_derived();
    true
}

/// Close one chronically unprofitable, nearly empty factory per crowded
/// state, together with the first pending project of its type there.
/// Returns the number of factories closed.
#[instrument(skip_all, name = "prune_factories")]
pub fn prune_factories(world: &mut WorldState, defines: &EconomyDefines) -> usize {
    let mut pruned = 0;
    for s in world.states.ids().collect::<Vec<_>>() {
        let owner = &world.nations[world.states[s].owner];
        if owner.is_player_controlled && owner.rules.destroy_factory {
            continue;
        }

        let mut count = 0u32;
        let mut candidate: Option<(FactoryId, u8)> = None;
        for (id, factory) in factories_in_state(world, s) {
            count += 1;
            let nearly_empty = defines.prune_worker_threshold / factory_max_employment(factory, defines);
            if factory.production_scale < nearly_empty
                && factory.unprofitable
                && candidate.map_or(true, |(_, level)| factory.level < level)
            {
                candidate = Some((id, factory.level));
            }
        }

        let Some((id, _)) = candidate else {
            continue;
        };
        if count + defines.prune_slot_margin < defines.factories_per_state {
            continue;
        }

        let (closed, _moved) = world.factories.swap_remove(id);
        let pending = world
            .constructions
            .state_buildings
            .iter()
            .position(|c| c.state == s && c.factory_type == closed.building_type);
        if let Some(i) = pending {
            world.constructions.state_buildings.remove(i);
        }
        log::debug!("pruned factory {id} (type {}) in {s}", closed.building_type);
        pruned += 1;
    }
    if pruned > 0 {
        world.refresh_derived();
    }
    pruned
}

// ============================================================================
// Emulated demand
// ============================================================================

/// Stand-in construction demand while real construction is disabled, so
/// military goods and factory inputs have buyers from the first day.
///
/// ```text
/// base    = rich + middle + poor × 0.00001
/// pairs   = base × military_share / (daily infantry + artillery cost + 1)
/// sets    = base × factory_share / (daily cost of one of each factory + 1)
/// ```
pub fn emulate_construction_demand(nation: &mut Nation, demand: &mut DemandAccumulator, ctx: &DayContext) {
    let defines = ctx.defines;
    let definitions = ctx.definitions;
    let base_income = nation.total_rich_income + nation.total_middle_income + nation.total_poor_income * 0.00001;

    // Worlds without land units only emulate factory demand.
    let units = definitions
        .unit_types
        .get(definitions.infantry)
        .zip(definitions.unit_types.get(definitions.artillery));
    if let Some((infantry, artillery)) = units {
        let infantry_days = build_days(infantry.build_time);
        let artillery_days = build_days(artillery.build_time);

        // Artillery costs are summed over as many slots as infantry has.
        let daily_cost: f32 = infantry
            .build_cost
            .iter()
            .map(|(c, amount)| amount / infantry_days * ctx.price(c))
            .chain(
                artillery
                    .build_cost
                    .iter()
                    .take(infantry.build_cost.len())
                    .map(|(c, amount)| amount / artillery_days * ctx.price(c)),
            )
            .sum();
        let pairs = base_income * defines.emulated_military_share / (daily_cost + 1.0);
        for (unit, days) in [(infantry, infantry_days), (artillery, artillery_days)] {
            for (c, amount) in unit.build_cost.iter() {
                register_demand(nation, demand, c, amount / days * pairs, DemandReason::Construction);
            }
        }
    }

    let starting_types = || definitions.factory_types.values().filter(|ft| ft.is_available_from_start);
    let set_cost: f32 = starting_types()
        .map(|ft| {
            let days = build_days(ft.construction_time);
            ft.construction_costs.value_at(|c| ctx.price(c)) / days
        })
        .sum();
    let sets = base_income * defines.emulated_factory_share / (set_cost + 1.0);
    for ft in starting_types() {
        let days = build_days(ft.construction_time);
        for (c, amount) in ft.construction_costs.iter() {
            register_demand(nation, demand, c, amount / days * sets, DemandReason::Construction);
        }
    }
}

/// Progress of a factory project toward completion, in [0, 1].
pub fn factory_construction_progress(
    world: &WorldState,
    project: &StateBuildingConstruction,
    defines: &EconomyDefines,
) -> f32 {
    let ft = &world.definitions.factory_types[project.factory_type];
    let ff = factory_construction_time_modifier(world.date, defines);
    let terms = state_building_terms(
        ft,
        &world.nations[project.nation],
        project.is_pop_project,
        project.is_upgrade,
        ff,
    );
    terms.progress(&ft.construction_costs, &project.purchased)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::EventLog;
    use crate::definitions::ProvinceBuildingKind;
    use crate::state::{LandUnitConstruction, NavalUnitConstruction, ProvinceBuildingConstruction};
    use crate::testing::WorldBuilder;

    fn steel_world() -> WorldState {
        WorldBuilder::new()
            .with_goods(&["steel", "cement", "cloth"])
            .with_factory_type("textile", "cloth", 1.0, &[("steel", 2.0), ("cement", 4.0)])
            .with_factory_type_config("textile", |ft| ft.construction_time = 100)
            .with_unit_type("infantry", &[("steel", 2.0)], 30, false)
            .with_unit_type("artillery", &[("steel", 3.0), ("cement", 1.0)], 60, false)
            .with_nation("A")
            .with_state(0, &[0, 1])
            .with_pops_in(0, &[("soldiers", 3000.0)])
            .build()
    }

    fn state_project(purchased: Vec<f32>, is_pop_project: bool) -> StateBuildingConstruction {
        StateBuildingConstruction {
            nation: NationId(0),
            state: StateId(0),
            factory_type: FactoryTypeId(0),
            is_pop_project,
            is_upgrade: false,
            purchased: Purchased(purchased),
        }
    }

    #[test]
    fn test_curves_start_slow_and_settle() {
        let defines = EconomyDefines::default();
        // day 0: t = √2, shift = 7.5, slope = 11.25
        let day0 = non_factory_construction_time_modifier(Date(0), &defines);
        assert!((day0 - (0.5 + 11.25 / (2.0f32.sqrt() + 7.5))).abs() < 1e-5);
        let late = non_factory_construction_time_modifier(Date(1_000_000), &defines);
        assert!(late < day0 && late > 0.5);

        // factory: shift = 15, slope = 2.25
        let f0 = factory_construction_time_modifier(Date(0), &defines);
        assert!((f0 - (0.75 + 2.25 / (2.0f32.sqrt() + 15.0))).abs() < 1e-5);
    }

    #[test]
    fn test_upgraded_factory_level() {
        // 1 + 1 + 0.5
        assert_eq!(upgraded_factory_level(1), 2);
        // 4 + 1 + 1
        assert_eq!(upgraded_factory_level(4), 6);
        assert_eq!(upgraded_factory_level(255), 255);
    }

    #[test]
    fn test_state_project_demand_scales_with_admin_factor() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        world.nations[NationId(0)].administrative_efficiency = 0.5;
        world.constructions.state_buildings.push(state_project(vec![], false));

        populate_construction_consumption(&mut world, &defines);
        let ff = factory_construction_time_modifier(world.date, &defines);
        // steel: 2 × fm 1 × acf 1.5 / (ff × 100)
        let expected = 2.0 * 1.5 / (ff * 100.0);
        let steel = world.nations[NationId(0)].construction_demand[CommodityId(1)];
        assert!((steel - expected).abs() < 1e-6);
        assert_eq!(world.nations[NationId(0)].private_construction_demand[CommodityId(1)], 0.0);
    }

    #[test]
    fn test_finished_slots_stop_demanding() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        // steel done (2 × acf 1), cement still short
        world.constructions.state_buildings.push(state_project(vec![2.0, 1.0], false));
        populate_construction_consumption(&mut world, &defines);
        let nation = &world.nations[NationId(0)];
        assert_eq!(nation.construction_demand[CommodityId(1)], 0.0);
        assert!(nation.construction_demand[CommodityId(2)] > 0.0);
    }

    #[test]
    fn test_pop_projects_use_private_demand() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        world.nations[NationId(0)].modifiers.factory_owner_cost = 0.5;
        world.constructions.state_buildings.push(state_project(vec![], true));

        populate_private_construction_consumption(&mut world, &defines);
        let ff = factory_construction_time_modifier(world.date, &defines);
        // fm = 1 × max(0.1, 0.5)
        let expected = 2.0 * 0.5 / (ff * 100.0);
        let nation = &world.nations[NationId(0)];
        assert!((nation.private_construction_demand[CommodityId(1)] - expected).abs() < 1e-6);
        assert_eq!(nation.construction_demand[CommodityId(1)], 0.0);
    }

    #[test]
    fn test_occupied_land_unit_not_demanded() {
        let defines = EconomyDefines::default();
        let mut world = WorldBuilder::new()
            .with_goods(&["steel"])
            .with_unit_type("infantry", &[("steel", 2.0)], 30, false)
            .with_nation("A")
            .with_nation("B")
            .with_state(0, &[0])
            .with_pops_in(0, &[("soldiers", 3000.0)])
            .with_province_config(0, |p| p.controller = Some(NationId(1)))
            .build();
        world.constructions.land.push(LandUnitConstruction {
            nation: NationId(0),
            pop: PopId(0),
            unit_type: UnitTypeId(0),
            purchased: Purchased::default(),
        });
        populate_construction_consumption(&mut world, &defines);
        assert_eq!(world.nations[NationId(0)].construction_demand[CommodityId(1)], 0.0);
        assert_eq!(world.nations[NationId(1)].construction_demand[CommodityId(1)], 0.0);
    }

    #[test]
    fn test_advance_refunds_unsatisfied_share() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        let steel = CommodityId(1);
        {
            let nation = &mut world.nations[NationId(0)];
            nation.budget.construction.set(50);
            nation.construction_demand[steel] = 10.0;
            nation.demand_satisfaction[steel] = 0.6;
        }
        world.commodities[steel].current_price = 2.0;

        let refund = advance_construction(&mut world, NationId(0), &defines);
        // 10 × 0.5 × 0.4 × 2
        assert!((refund - 4.0).abs() < 1e-5);
        let nation = &world.nations[NationId(0)];
        assert!((nation.treasury() - 4.0).abs() < 1e-5);
        // 10 × 0.5 × 0.6 left to spend on projects
        assert!((nation.construction_demand[steel] - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_advance_caps_daily_purchase() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        let steel = CommodityId(1);
        {
            let nation = &mut world.nations[NationId(0)];
            nation.budget.construction.set(100);
            nation.construction_demand[steel] = 1000.0;
            nation.demand_satisfaction[steel] = 1.0;
        }
        world.constructions.land.push(LandUnitConstruction {
            nation: NationId(0),
            pop: PopId(0),
            unit_type: UnitTypeId(0),
            purchased: Purchased::default(),
        });

        advance_construction(&mut world, NationId(0), &defines);
        let nf = non_factory_construction_time_modifier(world.date, &defines);
        let bought = world.constructions.land[0].purchased.get(0);
        // 2 steel over nf × 30 days
        assert!((bought - 2.0 / (nf * 30.0)).abs() < 1e-6);
        assert!((world.nations[NationId(0)].construction_demand[steel] - (1000.0 - bought)).abs() < 1e-3);
    }

    #[test]
    fn test_advance_limited_by_funded_demand() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        let steel = CommodityId(1);
        {
            let nation = &mut world.nations[NationId(0)];
            nation.budget.construction.set(100);
            nation.construction_demand[steel] = 0.001;
            nation.demand_satisfaction[steel] = 1.0;
        }
        world.constructions.land.push(LandUnitConstruction {
            nation: NationId(0),
            pop: PopId(0),
            unit_type: UnitTypeId(0),
            purchased: Purchased::default(),
        });
        advance_construction(&mut world, NationId(0), &defines);
        assert!((world.constructions.land[0].purchased.get(0) - 0.001).abs() < 1e-7);
        assert_eq!(world.nations[NationId(0)].construction_demand[steel], 0.0);
    }

    #[test]
    fn test_completed_factory_project_founds_factory_once() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        // Both inputs bought in full: 2 and 4 × acf 1
        world.constructions.state_buildings.push(state_project(vec![2.0, 4.0], false));
        let mut events = EventLog::new();

        assert_eq!(resolve_constructions(&mut world, &defines, &mut events), 1);
        assert!(world.constructions.state_buildings.is_empty());
        assert_eq!(world.factories.len(), 1);
        let factory = &world.factories[FactoryId(0)];
        assert_eq!(factory.level, 1);
        assert_eq!(factory.location, ProvinceId(0));
        assert_eq!(events.len(), 1);

        assert_eq!(resolve_constructions(&mut world, &defines, &mut events), 0);
        assert_eq!(world.factories.len(), 1);
    }

    #[test]
    fn test_unfinished_project_survives() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        world.nations[NationId(0)].administrative_efficiency = 0.5;
        // acf 1.5 requires 3 steel and 6 cement
        world.constructions.state_buildings.push(state_project(vec![2.0, 4.0], false));
        let mut events = EventLog::new();
        assert_eq!(resolve_constructions(&mut world, &defines, &mut events), 0);
        assert_eq!(world.constructions.state_buildings.len(), 1);
        assert!(world.factories.is_empty());
    }

    #[test]
    fn test_upgrade_project_expands_existing_factory() {
        let defines = EconomyDefines::default();
        let mut world = WorldBuilder::new()
            .with_goods(&["steel", "cement", "cloth"])
            .with_factory_type("textile", "cloth", 1.0, &[("steel", 2.0), ("cement", 4.0)])
            .with_nation("A")
            .with_state(0, &[0, 1])
            .with_factory(1, "textile", 4)
            .build();
        let mut project = state_project(vec![2.0, 4.0], true);
        project.is_upgrade = true;
        world.constructions.state_buildings.push(project);

        let mut events = EventLog::new();
        resolve_constructions(&mut world, &defines, &mut events);
        assert_eq!(world.factories.len(), 1);
        assert_eq!(world.factories[FactoryId(0)].level, 6);
    }

    #[test]
    fn test_units_and_buildings_complete() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        world.constructions.land.push(LandUnitConstruction {
            nation: NationId(0),
            pop: PopId(0),
            unit_type: UnitTypeId(0),
            purchased: Purchased(vec![2.0]),
        });
        world.constructions.naval.push(NavalUnitConstruction {
            nation: NationId(0),
            province: ProvinceId(1),
            unit_type: UnitTypeId(1),
            purchased: Purchased(vec![3.0, 1.0]),
        });
        // Queued behind the first ship and not looked at yet
        world.constructions.naval.push(NavalUnitConstruction {
            nation: NationId(0),
            province: ProvinceId(1),
            unit_type: UnitTypeId(1),
            purchased: Purchased(vec![3.0, 1.0]),
        });
        world.constructions.province_buildings.push(ProvinceBuildingConstruction {
            nation: NationId(0),
            province: ProvinceId(0),
            kind: ProvinceBuildingKind::Railroad,
            is_pop_project: true,
            purchased: Purchased::default(),
        });

        let mut events = EventLog::new();
        // The railroad has an empty cost list, so it is already paid for
        assert_eq!(resolve_constructions(&mut world, &defines, &mut events), 3);
        assert_eq!(world.units.len(), 2);
        assert_eq!(world.constructions.naval.len(), 1);
        assert_eq!(world.provinces[ProvinceId(0)].building_level(ProvinceBuildingKind::Railroad), 1);
    }

    #[test]
    fn test_building_capped_at_max_level() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        world.nations[NationId(0)].max_building_level = [1; 3];
        world.provinces[ProvinceId(0)].building_levels = [1; 3];
        world.constructions.province_buildings.push(ProvinceBuildingConstruction {
            nation: NationId(0),
            province: ProvinceId(0),
            kind: ProvinceBuildingKind::Fort,
            is_pop_project: false,
            purchased: Purchased::default(),
        });
        let mut events = EventLog::new();
        resolve_constructions(&mut world, &defines, &mut events);
        assert!(world.constructions.province_buildings.is_empty());
        assert_eq!(world.provinces[ProvinceId(0)].building_level(ProvinceBuildingKind::Fort), 1);
        assert!(events.is_empty());
    }

    #[test]
    fn test_try_add_respects_existing_type() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        assert!(try_add_factory_to_state(&mut world, StateId(0), FactoryTypeId(0), &defines));
        assert!(!try_add_factory_to_state(&mut world, StateId(0), FactoryTypeId(0), &defines));
        assert_eq!(world.factories.len(), 1);
    }

    #[test]
    fn test_try_add_requires_coast_for_coastal_type() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        world.definitions.factory_types[FactoryTypeId(0)].is_coastal = true;
        for province in world.provinces.values_mut() {
            province.is_coastal = false;
        }
        assert!(!try_add_factory_to_state(&mut world, StateId(0), FactoryTypeId(0), &defines));
    }

    #[test]
    fn test_prune_closes_smallest_idle_factory() {
        let defines = EconomyDefines {
            factories_per_state: 6,
            ..Default::default()
        };
        let mut world = WorldBuilder::new()
            .with_goods(&["grain", "cloth"])
            .with_factory_type("textile", "cloth", 1.0, &[("grain", 1.0)])
            .with_factory_type("mill", "grain", 1.0, &[])
            .with_nation("A")
            .with_state(0, &[0])
            .with_factory(0, "textile", 3)
            .with_factory(0, "mill", 2)
            .build();
        for factory in world.factories.values_mut() {
            factory.unprofitable = true;
            factory.production_scale = 0.0;
        }
        world.constructions.state_buildings.push(StateBuildingConstruction {
            factory_type: FactoryTypeId(1),
            ..state_project(vec![], false)
        });

        // 2 factories + margin 4 reaches the limit of 6
        assert_eq!(prune_factories(&mut world, &defines), 1);
        assert_eq!(world.factories.len(), 1);
        assert_eq!(world.factories[FactoryId(0)].building_type, FactoryTypeId(0));
        assert!(world.constructions.state_buildings.is_empty());
    }

    #[test]
    fn test_prune_leaves_uncrowded_states() {
        let defines = EconomyDefines::default();
        let mut world = steel_world();
        add_factory_level_to_state(&mut world, StateId(0), FactoryTypeId(0), false);
        world.factories[FactoryId(0)].unprofitable = true;
        world.factories[FactoryId(0)].production_scale = 0.0;
        // 1 + 4 < 8 slots
        assert_eq!(prune_factories(&mut world, &defines), 0);
        assert_eq!(world.factories.len(), 1);
    }

    #[test]
    fn test_emulated_demand_follows_income() {
        let defines = EconomyDefines::default();
        let world = steel_world();
        let ctx = DayContext::new(&world, &defines, false, f32::exp);
        let mut nation = world.nations[NationId(0)].clone();
        nation.total_rich_income = 1000.0;
        let mut demand = DemandAccumulator::new(world.commodity_count());

        emulate_construction_demand(&mut nation, &mut demand, &ctx);
        // daily pair cost: infantry 2/30, artillery only its first slot 3/60
        let pairs = 100.0 / (2.0 / 30.0 + 3.0 / 60.0 + 1.0);
        // factory set: (2 + 4) / 100
        let sets = 100.0 / (0.06 + 1.0);
        let steel = CommodityId(1);
        let expected = pairs * (2.0 / 30.0 + 3.0 / 60.0) + sets * 2.0 / 100.0;
        assert!((nation.real_demand[steel] - expected).abs() < 1e-3);
        assert!((demand.get(steel, DemandReason::Construction) - expected).abs() < 1e-3);
    }

    #[test]
    fn test_emulated_demand_without_unit_types() {
        let defines = EconomyDefines::default();
        let world = WorldBuilder::new()
            .with_goods(&["steel"])
            .with_factory_type("steelworks", "steel", 1.0, &[("steel", 2.0)])
            .with_factory_type_config("steelworks", |ft| ft.construction_time = 100)
            .with_nation("A")
            .with_state(0, &[0])
            .build();
        assert!(world.definitions.unit_types.is_empty());
        let ctx = DayContext::new(&world, &defines, false, f32::exp);
        let mut nation = world.nations[NationId(0)].clone();
        nation.total_rich_income = 1000.0;
        let mut demand = DemandAccumulator::new(world.commodity_count());

        emulate_construction_demand(&mut nation, &mut demand, &ctx);
        // factory half only: 100 / (2/100 + 1) sets of 2/100 steel each
        let sets = 100.0 / (0.02 + 1.0);
        let steel = CommodityId(1);
        assert!((nation.real_demand[steel] - sets * 0.02).abs() < 1e-3);
    }

    #[test]
    fn test_progress_counts_purchases() {
        let defines = EconomyDefines::default();
        let world = steel_world();
        let project = state_project(vec![1.0, 2.0], false);
        let progress = factory_construction_progress(&world, &project, &defines);
        assert!((progress - 0.5).abs() < 1e-6);
    }
}
