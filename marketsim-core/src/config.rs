use serde::{Deserialize, Serialize};

/// Driver-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Compute checksum every N days (0 = disabled).
    ///
    /// Recommended values:
    /// - `1`: Every day (safest)
    /// - `30`: Every month (balanced)
    /// - `365`: Every year (lowest overhead)
    pub checksum_frequency: u32,
    /// Days of construction-free warm-up run by `presimulate`.
    pub presimulation_days: u32,
    /// Days to simulate after warm-up.
    pub days: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            checksum_frequency: 30,
            presimulation_days: 365,
            days: 365,
        }
    }
}
