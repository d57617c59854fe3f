//! Immutable tuning constants for the daily economy.
//!
//! One [`EconomyDefines`] is built at startup and passed by shared reference
//! into every entry point. Fields carry `#[serde(default)]`, so a JSON file
//! only needs to name the values it overrides.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyDefines {
    // --- Needs ---
    /// Pop size that consumes one unit of the needs table.
    pub alice_needs_scaling_factor: f32,
    /// Daily drift of need weights toward their price-derived ideal.
    pub alice_need_drift_speed: f32,
    pub base_goods_demand: f32,
    pub alice_lf_needs_scale: f32,
    pub alice_ev_needs_scale: f32,
    pub alice_lx_needs_scale: f32,
    /// Weight of yesterday's satisfaction in the smoothed satisfaction.
    pub alice_sat_delay_factor: f32,
    pub invention_impact_on_demand: f32,
    /// Share of leftover budget spent on extra life needs.
    pub alice_needs_lf_spend: f32,
    pub alice_needs_ev_spend: f32,
    pub alice_needs_lx_spend: f32,

    // --- Employment ---
    pub alice_rgo_per_size_employment: f32,
    pub alice_factory_per_level_employment: f32,
    /// Blend rate of RGO employment toward its target.
    pub rgo_employment_speed: f32,
    /// Blend rate of factory employment toward its target.
    pub factory_employment_speed: f32,
    /// Weight of one aristocrat or capitalist against one farmer in land ownership.
    pub land_ownership_owner_weight: f32,
    /// Subsistence land per unit of non-owned RGO size.
    pub subsistence_size_factor: f32,
    pub subsistence_pseudoemployment_margin: f32,
    /// Added to the subsistence capacity before computing saturation.
    pub subsistence_saturation_offset: f32,
    /// Life rating above which subsistence quality starts to grow.
    pub subsistence_life_rating_base: f32,

    // --- Production ---
    pub alice_rgo_boost: f32,
    pub alice_base_rgo_employment_bonus: f32,
    pub alice_base_rgo_efficiency_bonus: f32,
    pub rgo_owners_cut: f32,
    /// Fixed step added to the RGO target employment in the profit direction.
    pub rgo_target_employment_step: f32,
    pub alice_inputs_base_factor: f32,
    pub alice_output_base_factor: f32,
    pub alice_inputs_base_factor_artisans: f32,
    pub alice_output_base_factor_artisans: f32,
    pub production_scale_delta: f32,
    pub occupied_factory_scale: f32,
    pub subsistence_factor: f32,
    pub subsistence_score_life: f32,
    pub subsistence_score_everyday: f32,
    pub subsistence_score_luxury: f32,
    /// Workers per aristocrat assumed by the RGO desired-profit law.
    pub rgo_workers_per_aristocrat: f32,
    /// Divisor of the continuous term in the RGO target-employment law.
    pub rgo_target_change_divisor: f32,
    /// Worker share of RGO surplus above minimum wage when owners exist.
    pub rgo_worker_surplus_share: f32,
    /// Factories below this many levels of workforce get an input discount.
    pub factory_small_size_levels: f32,
    pub factory_owner_fraction_cap: f32,
    /// Input multiplier penalty per unit of capitalist population share.
    pub factory_owner_input_penalty: f32,
    /// Floor of the modifier part of factory, artisan and RGO multipliers.
    pub factory_multiplier_floor: f32,
    pub factory_clerk_output_bonus: f32,
    /// Workers whose worth of scale a factory moves by the sign of its profit gap.
    pub factory_scale_step_workers: f32,
    /// Added to world production and demand when sizing a factory's market share.
    pub factory_market_size_offset: f32,
    pub factory_speed_clamp_divisor: f32,
    pub factory_desired_profit_margin: f32,
    /// Secondary employment × level per extra unit of desired margin.
    pub factory_desired_profit_clerk_divisor: f32,
    /// Daily scale ramp of a subsidized factory, in several-worker steps per level.
    pub factory_subsidy_ramp: f32,
    pub factory_surplus_primary_share: f32,
    pub factory_surplus_secondary_share: f32,
    pub factory_surplus_owner_share: f32,
    /// Minimum wage as a multiple of life plus everyday needs.
    pub minimum_wage_margin: f32,

    // --- Artisans ---
    /// Score of the implicit "produce nothing" option.
    pub artisan_baseline_score: f32,
    pub artisan_drift: f32,
    /// Score given to goods artisans cannot make.
    pub artisan_invalid_score: f32,
    pub artisan_score_decay: f32,
    /// Artisan population producing one unit of artisan scale.
    pub artisan_pop_per_scale: f32,
    /// Softmax sharpness per unit of artisan everyday needs cost.
    pub artisan_cost_sharpness: f32,

    // --- Budget ---
    pub alice_domestic_investment_multiplier: f32,
    pub alice_invest_capitalist: f32,
    pub alice_invest_aristocrat: f32,
    pub province_overseas_penalty: f32,
    pub gold_to_cash_rate: f32,
    pub loan_base_interest: f32,
    pub bankruptcy_duration_years: u32,
    pub bankruptcy_external_loan_years: u32,
    pub small_debt_limit: f32,
    pub warsubsidies_percent: f32,
    pub reparations_tax_hit: f32,
    /// Share of province savings paid to clergy and bureaucrats.
    pub private_education_share: f32,
    /// Share of the education transfer going to clergy.
    pub private_education_clergy_ratio: f32,
    /// Share of life plus everyday needs paid by the dominant tax rates in the inflation basket.
    pub inflation_basket_weight: f32,

    // --- Sphere ---
    pub sphere_share_unciv: f32,
    pub sphere_share_civ: f32,
    pub sphere_share_second_rank: f32,
    pub colonial_rank: u16,

    // --- Factories and construction ---
    pub factories_per_state: u32,
    pub craftsmen_fraction: f32,
    pub construction_time_start: f32,
    pub construction_time_floor: f32,
    pub construction_time_slope: f32,
    pub factory_construction_time_start: f32,
    pub factory_construction_time_floor: f32,
    pub factory_construction_time_slope: f32,
    /// Share of the tax base emulated as military spending during presimulation.
    pub emulated_military_share: f32,
    pub emulated_factory_share: f32,
    /// Scale and primary employment a factory needs before private capital expands it.
    pub investment_expand_threshold: f32,
    /// Share of private investment a state may absorb per new project.
    pub investment_state_share: f32,
    /// Workers below which an unprofitable factory may be pruned.
    pub prune_worker_threshold: f32,
    /// Factory slots left free before pruning starts.
    pub prune_slot_margin: u32,

    // --- Prices ---
    pub price_adjust_speed: f32,
    pub price_min: f32,
    pub price_max: f32,
    pub price_slope_base: f32,
    pub global_pool_decay: f32,
    pub global_pool_supply_divisor: f32,
    pub money_rgo_price_factor: f32,
    pub inflation_smoothing: f32,

    // --- Driver ---
    pub presimulation_days: u32,
}

impl Default for EconomyDefines {
    fn default() -> Self {
        Self {
            alice_needs_scaling_factor: 200_000.0,
            alice_need_drift_speed: 0.001,
            base_goods_demand: 0.6,
            alice_lf_needs_scale: 1.0,
            alice_ev_needs_scale: 1.0,
            alice_lx_needs_scale: 1.0,
            alice_sat_delay_factor: 0.5,
            invention_impact_on_demand: 0.005,
            alice_needs_lf_spend: 0.05,
            alice_needs_ev_spend: 0.1,
            alice_needs_lx_spend: 0.2,

            alice_rgo_per_size_employment: 40_000.0,
            alice_factory_per_level_employment: 10_000.0,
            rgo_employment_speed: 0.20,
            factory_employment_speed: 0.001,
            land_ownership_owner_weight: 200.0,
            subsistence_size_factor: 2.0,
            subsistence_pseudoemployment_margin: 1.1,
            subsistence_saturation_offset: 4.0,
            subsistence_life_rating_base: 10.0,

            alice_rgo_boost: 1.0,
            alice_base_rgo_employment_bonus: 20_000.0,
            alice_base_rgo_efficiency_bonus: 2.0,
            rgo_owners_cut: 0.05,
            rgo_target_employment_step: 20.0,
            alice_inputs_base_factor: 1.0,
            alice_output_base_factor: 1.0,
            alice_inputs_base_factor_artisans: 1.0,
            alice_output_base_factor_artisans: 1.0,
            production_scale_delta: 0.001,
            occupied_factory_scale: 0.1,
            subsistence_factor: 15.0,
            subsistence_score_life: 30.0,
            subsistence_score_everyday: 30.0,
            subsistence_score_luxury: 30.0,
            rgo_workers_per_aristocrat: 10_000.0,
            rgo_target_change_divisor: 100.0,
            rgo_worker_surplus_share: 0.2,
            factory_small_size_levels: 5.0,
            factory_owner_fraction_cap: 0.05,
            factory_owner_input_penalty: 2.5,
            factory_multiplier_floor: 0.1,
            factory_clerk_output_bonus: 1.5,
            factory_scale_step_workers: 10.0,
            factory_market_size_offset: 10.0,
            factory_speed_clamp_divisor: 1000.0,
            factory_desired_profit_margin: 1.2,
            factory_desired_profit_clerk_divisor: 150.0,
            factory_subsidy_ramp: 10.0,
            factory_surplus_primary_share: 0.1,
            factory_surplus_secondary_share: 0.2,
            factory_surplus_owner_share: 0.7,
            minimum_wage_margin: 1.1,

            artisan_baseline_score: 5.0,
            artisan_drift: 0.0001,
            artisan_invalid_score: -256.0,
            artisan_score_decay: 0.8,
            artisan_pop_per_scale: 10_000.0,
            artisan_cost_sharpness: 1.0e-6,

            alice_domestic_investment_multiplier: 50.0,
            alice_invest_capitalist: 0.1,
            alice_invest_aristocrat: 0.05,
            province_overseas_penalty: 0.25,
            gold_to_cash_rate: 0.5,
            loan_base_interest: 0.02,
            bankruptcy_duration_years: 5,
            bankruptcy_external_loan_years: 10,
            small_debt_limit: 20_000.0,
            warsubsidies_percent: 0.01,
            reparations_tax_hit: 0.1,
            private_education_share: 0.05,
            private_education_clergy_ratio: 0.8,
            inflation_basket_weight: 2.0,

            sphere_share_unciv: 0.75,
            sphere_share_civ: 0.5,
            sphere_share_second_rank: 0.25,
            colonial_rank: 16,

            factories_per_state: 8,
            craftsmen_fraction: 0.8,
            construction_time_start: 2.0,
            construction_time_floor: 0.5,
            construction_time_slope: -0.2,
            factory_construction_time_start: 0.9,
            factory_construction_time_floor: 0.75,
            factory_construction_time_slope: -0.01,
            emulated_military_share: 0.1,
            emulated_factory_share: 0.1,
            investment_expand_threshold: 0.9,
            investment_state_share: 0.1,
            prune_worker_threshold: 10.0,
            prune_slot_margin: 4,

            price_adjust_speed: 0.05,
            price_min: 0.001,
            price_max: 100_000.0,
            price_slope_base: 20.0,
            global_pool_decay: 0.5,
            global_pool_supply_divisor: 12.0,
            money_rgo_price_factor: 0.3,
            inflation_smoothing: 0.1,

            presimulation_days: 365,
        }
    }
}

impl EconomyDefines {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let defines = Self::from_json_str(&text)?;
        log::debug!("Loaded economy defines from {}", path.display());
        Ok(defines)
    }

    /// Clamp a price into the legal range.
    #[inline]
    pub fn clamp_price(&self, price: f32) -> f32 {
        price.clamp(self.price_min, self.price_max)
    }

    /// Workers per filled factory level divided by the needs scale.
    #[inline]
    pub fn factory_workers_per_level_scaled(&self) -> f32 {
        self.alice_factory_per_level_employment / self.alice_needs_scaling_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_override() {
        let defines =
            EconomyDefines::from_json_str(r#"{"rgo_owners_cut": 0.1, "factories_per_state": 4}"#)
                .unwrap();
        assert_eq!(defines.rgo_owners_cut, 0.1);
        assert_eq!(defines.factories_per_state, 4);
        // Untouched values keep their defaults
        assert_eq!(defines.alice_needs_scaling_factor, 200_000.0);
    }

    #[test]
    fn test_employment_speeds_stay_asymmetric() {
        let defines = EconomyDefines::default();
        assert!(defines.rgo_employment_speed > defines.factory_employment_speed);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = EconomyDefines::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"price_adjust_speed": 0.1}}"#).unwrap();
        let defines = EconomyDefines::load(file.path()).unwrap();
        assert_eq!(defines.price_adjust_speed, 0.1);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = EconomyDefines::load("/nonexistent/defines.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_clamp_price() {
        let defines = EconomyDefines::default();
        assert_eq!(defines.clamp_price(0.0), 0.001);
        assert_eq!(defines.clamp_price(f32::MAX), 100_000.0);
        assert_eq!(defines.clamp_price(2.5), 2.5);
    }
}
