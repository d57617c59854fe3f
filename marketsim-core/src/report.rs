//! What one daily pass did, for drivers and tests.

use crate::external::{EconomyEvent, EventSink};
use crate::ids::NationId;
use crate::state::Date;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Money moved for one nation during a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NationDayReport {
    pub nation: NationId,
    pub tax_income: f32,
    pub tariff_income: f32,
    /// Refunded military, stockpile and overseas spending.
    pub refund: f32,
    /// Refunded construction spending.
    pub construction_refund: f32,
    /// Share of the desired spend the nation could afford.
    pub spending_scale: f32,
}

/// Wall time spent in each stage of a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub setup: Duration,
    pub consumption: Duration,
    pub purchases: Duration,
    pub production: Duration,
    pub settlement: Duration,
    pub construction: Duration,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.setup + self.consumption + self.purchases + self.production + self.settlement + self.construction
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayReport {
    pub date: Date,
    pub nations: Vec<NationDayReport>,
    pub bankruptcies: Vec<NationId>,
    pub events_posted: usize,
    pub constructions_completed: usize,
    pub investments_started: usize,
    pub timings: PhaseTimings,
}

impl DayReport {
    pub fn nation(&self, n: NationId) -> Option<&NationDayReport> {
        self.nations.iter().find(|r| r.nation == n)
    }

    pub fn total_tax_income(&self) -> f32 {
        self.nations.iter().map(|r| r.tax_income).sum()
    }

    pub fn total_tariff_income(&self) -> f32 {
        self.nations.iter().map(|r| r.tariff_income).sum()
    }
}

/// Forwards events to another sink and counts them.
pub struct CountingSink<'a> {
    inner: &'a mut dyn EventSink,
    pub posted: usize,
}

impl<'a> CountingSink<'a> {
    pub fn new(inner: &'a mut dyn EventSink) -> Self {
        Self { inner, posted: 0 }
    }
}

impl EventSink for CountingSink<'_> {
    fn post(&mut self, event: EconomyEvent) {
        self.posted += 1;
        self.inner.post(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::EventLog;

    #[test]
    fn test_counting_sink_forwards() {
        let mut log = EventLog::new();
        {
            let mut sink = CountingSink::new(&mut log);
            sink.post(EconomyEvent::Bankruptcy {
                date: Date(3),
                nation: NationId(1),
            });
            assert_eq!(sink.posted, 1);
        }
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_report_totals() {
        let report = DayReport {
            nations: vec![
                NationDayReport {
                    nation: NationId(0),
                    tax_income: 2.0,
                    tariff_income: 0.5,
                    ..Default::default()
                },
                NationDayReport {
                    nation: NationId(1),
                    tax_income: 3.0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(report.total_tax_income(), 5.0);
        assert_eq!(report.total_tariff_income(), 0.5);
        assert_eq!(report.nation(NationId(1)).map(|r| r.tax_income), Some(3.0));
    }
}
