use crate::report::PhaseTimings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Accumulated timing of the daily pass.
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct EconomyMetrics {
    pub total_days: u64,
    pub total_time: Duration,
    pub setup_time: Duration,
    pub consumption_time: Duration, // needs, employment-driven demand, spending
    pub purchase_time: Duration,    // market clearing and pool moves
    pub production_time: Duration,
    pub settlement_time: Duration, // prices, diplomacy, bankruptcy, inflation
    pub construction_time: Duration,
    /// Wall clock time from first day to last
    pub wall_time: Duration,
}

impl EconomyMetrics {
    pub fn record(&mut self, timings: &PhaseTimings) {
        self.total_days += 1;
        self.total_time += timings.total();
        self.setup_time += timings.setup;
        self.consumption_time += timings.consumption;
        self.purchase_time += timings.purchases;
        self.production_time += timings.production;
        self.settlement_time += timings.settlement;
        self.construction_time += timings.construction;
    }

    pub fn day_avg_ms(&self) -> f64 {
        if self.total_days == 0 {
            0.0
        } else {
            self.total_time.as_secs_f64() * 1000.0 / self.total_days as f64
        }
    }

    pub fn years_per_second(&self) -> f64 {
        if self.total_time.as_secs_f64() == 0.0 {
            0.0
        } else {
            self.total_days as f64 / 365.0 / self.total_time.as_secs_f64()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics_average_zero() {
        assert_eq!(EconomyMetrics::default().day_avg_ms(), 0.0);
    }

    #[test]
    fn test_record_accumulates() {
        let mut metrics = EconomyMetrics::default();
        let timings = PhaseTimings {
            setup: Duration::from_millis(1),
            production: Duration::from_millis(3),
            ..Default::default()
        };
        metrics.record(&timings);
        metrics.record(&timings);
        assert_eq!(metrics.total_days, 2);
        assert_eq!(metrics.production_time, Duration::from_millis(6));
        assert!((metrics.day_avg_ms() - 4.0).abs() < 1e-9);
    }
}
