//! Batched numeric kernels for the daily pass.
//!
//! A kernel comes in two forms: a scalar golden function that defines the
//! result, and a `multiversion` batch function cloned per x86 tier below.
//! Both perform the same f32 operations in the same order, so the batch
//! output is bit-identical to the golden one on any CPU and a run's
//! checksum does not depend on the machine.
//!
//! ```text
//!   pops ──pack──▶ [PayoutInput] ──▶ pop_payouts_batch ──▶ [PayoutOutput]
//!                                      │ dispatch
//!                     avx2+fma │ avx2 │ sse4.1 │ generic
//!
//!   pop_payout_scalar ◀── proptest: equal bits ──▶ pop_payouts_batch
//! ```

pub mod payouts;

/// Dispatch tiers of the batch kernels, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimdLevel {
    Generic,
    Sse41,
    Avx2,
    Avx2Fma,
}

impl std::fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SimdLevel::Generic => "generic",
            SimdLevel::Sse41 => "sse4.1",
            SimdLevel::Avx2 => "avx2",
            SimdLevel::Avx2Fma => "avx2+fma",
        };
        f.write_str(name)
    }
}

/// CPU features relevant to the kernel tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimdFeatures {
    pub sse4_1: bool,
    pub avx2: bool,
    pub fma: bool,
}

impl SimdFeatures {
    #[cfg(target_arch = "x86_64")]
    pub fn detect() -> Self {
        Self {
            sse4_1: is_x86_feature_detected!("sse4.1"),
            avx2: is_x86_feature_detected!("avx2"),
            fma: is_x86_feature_detected!("fma"),
        }
    }

    /// Non-x86 targets always run the generic clone.
    #[cfg(not(target_arch = "x86_64"))]
    pub fn detect() -> Self {
        Self::default()
    }

    /// Highest tier these features unlock.
    pub fn level(&self) -> SimdLevel {
        match (self.avx2, self.fma, self.sse4_1) {
            (true, true, _) => SimdLevel::Avx2Fma,
            (true, false, _) => SimdLevel::Avx2,
            (false, _, true) => SimdLevel::Sse41,
            _ => SimdLevel::Generic,
        }
    }
}

/// Log the detected tier and the target the payout kernel picked.
pub fn log_simd_capabilities() {
    let features = SimdFeatures::detect();
    log::info!(
        "SIMD tier: {} (sse4.1={}, avx2={}, fma={})",
        features.level(),
        features.sse4_1,
        features.avx2,
        features.fma
    );
    let target = payouts::payouts_selected_target();
    let names: Vec<&str> = target.features().map(|f| f.name()).collect();
    log::debug!("payout kernel features: {:?}", names);
}
