//! Daily state transfers to pops, batched over a packed per-pop array.
//!
//! ```text
//! payout = inflation × (size × (ln × (life_rate + pension_rate)
//!                               + en × everyday_rate
//!                               + lx × (luxury_rate + investment_rate))
//!                       + unemployed × unemployment_rate × ln)
//! ```
//!
//! Sizes are already divided by the needs scaling factor. Every rate is
//! resolved per pop while building the input, so the kernel itself is
//! branch-free f32 arithmetic that LLVM can vectorize.

#![allow(unexpected_cfgs)]

use multiversion::multiversion;

/// Packed payout inputs for one pop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C, align(16))] // Align for SIMD loads
pub struct PayoutInput {
    pub adj_size: f32,
    pub adj_unemployed: f32,
    pub life_cost: f32,
    pub everyday_cost: f32,
    pub luxury_cost: f32,
    pub life_rate: f32,
    pub everyday_rate: f32,
    pub luxury_rate: f32,
    pub pension_rate: f32,
    pub unemployment_rate: f32,
    pub investment_rate: f32,
    pub inflation: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct PayoutOutput {
    pub savings: f32,
}

#[inline(always)]
fn payout(input: &PayoutInput) -> f32 {
    let life = input.life_cost * (input.life_rate + input.pension_rate);
    let everyday = input.everyday_cost * input.everyday_rate;
    let luxury = input.luxury_cost * (input.luxury_rate + input.investment_rate);
    let employed_part = input.adj_size * (life + everyday + luxury);
    let unemployed_part = input.adj_unemployed * input.unemployment_rate * input.life_cost;
    (input.inflation * (employed_part + unemployed_part)).max(0.0)
}

// ============================================================================
// Scalar Golden Implementation
// ============================================================================

/// Payout for a single pop - SCALAR GOLDEN.
#[inline]
pub fn pop_payout_scalar(input: &PayoutInput) -> PayoutOutput {
    PayoutOutput { savings: payout(input) }
}

/// Batch scalar calculation.
pub fn pop_payouts_scalar(inputs: &[PayoutInput], outputs: &mut [PayoutOutput]) {
    debug_assert_eq!(inputs.len(), outputs.len());
    for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
        *output = pop_payout_scalar(input);
    }
}

// ============================================================================
// SIMD Implementation
// ============================================================================

/// Batch payouts with runtime SIMD dispatch.
///
/// No fused multiply-add is emitted without fast-math, so the FMA target
/// still rounds exactly like the scalar path.
#[multiversion(targets("x86_64+avx2+fma", "x86_64+avx2", "x86_64+sse4.1",))]
pub fn pop_payouts_batch(inputs: &[PayoutInput], outputs: &mut [PayoutOutput]) {
    debug_assert_eq!(inputs.len(), outputs.len());
    for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
        output.savings = payout(input);
    }
}

/// Convenience function returning Vec.
pub fn pop_payouts(inputs: &[PayoutInput]) -> Vec<PayoutOutput> {
    let mut outputs = vec![PayoutOutput::default(); inputs.len()];
    pop_payouts_batch(inputs, &mut outputs);
    outputs
}

/// The target `pop_payouts_batch` dispatches to on this CPU.
#[multiversion(targets("x86_64+avx2+fma", "x86_64+avx2", "x86_64+sse4.1",))]
pub fn payouts_selected_target() -> multiversion::target::Target {
    multiversion::target::selected_target!()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn clerk(adj_size: f32) -> PayoutInput {
        PayoutInput {
            adj_size,
            life_cost: 2.0,
            everyday_cost: 4.0,
            luxury_cost: 8.0,
            life_rate: 0.64,
            everyday_rate: 0.64,
            inflation: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_administration_pays_funded_tiers() {
        // 10 × (2 × 0.64 + 4 × 0.64)
        let output = pop_payout_scalar(&clerk(10.0));
        assert!((output.savings - 38.4).abs() < 1e-4);
    }

    #[test]
    fn test_unemployment_only_on_idle_share() {
        let input = PayoutInput {
            adj_size: 10.0,
            adj_unemployed: 4.0,
            life_cost: 2.0,
            pension_rate: 0.1,
            unemployment_rate: 0.5,
            inflation: 2.0,
            ..Default::default()
        };
        // 2 × (10 × 2 × 0.1 + 4 × 0.5 × 2)
        let output = pop_payout_scalar(&input);
        assert!((output.savings - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_no_rates_pays_nothing() {
        let input = PayoutInput {
            adj_size: 100.0,
            life_cost: 3.0,
            inflation: 1.0,
            ..Default::default()
        };
        assert_eq!(pop_payout_scalar(&input).savings, 0.0);
    }

    #[test]
    fn test_batch_matches_scalar() {
        let inputs = vec![
            clerk(1.0),
            clerk(0.0),
            PayoutInput {
                adj_size: 3.5,
                luxury_cost: 12.0,
                investment_rate: 0.3,
                inflation: 0.9,
                ..Default::default()
            },
        ];
        let scalar: Vec<_> = inputs.iter().map(pop_payout_scalar).collect();
        let batch = pop_payouts(&inputs);
        assert_eq!(scalar, batch);
    }

    #[test]
    fn test_dispatch_target() {
        let target = payouts_selected_target();
        let features: Vec<&str> = target.features().map(|f| f.name()).collect();
        println!("payouts dispatched to: {:?}", features);
        println!("CPU supports: {}", crate::simd::SimdFeatures::detect().level());
    }
}
