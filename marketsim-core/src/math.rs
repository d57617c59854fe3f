//! Deterministic numeric helpers shared by the engines.

/// Signature of the exponential used by the artisan softmax.
pub type ExpFn = fn(f32) -> f32;

/// Cheap, platform-stable approximation of `exp(f)` for `f <= 0`.
///
/// # Formula
///
/// ```text
/// f < -128  =>  0
/// g = f / 128
/// g = 1 + g + g²/2 + g³/6      (third-order Taylor step)
/// result = g^128               (seven squarings)
/// ```
///
/// Output stays in `[0, 1]` for every input in `[-128, 0]`.
pub fn pseudo_exp_for_negative(f: f32) -> f32 {
    if f < -128.0 {
        return 0.0;
    }

    let g = f / 128.0;
    let mut r = 1.0 + g + g * g / 2.0 + g * g * g / 6.0;

    for _ in 0..7 {
        r *= r;
    }

    r
}

/// `1 - (1 - x)²`
#[inline]
pub fn convex(x: f32) -> f32 {
    1.0 - (1.0 - x) * (1.0 - x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pseudo_exp_at_zero_is_one() {
        assert_eq!(pseudo_exp_for_negative(0.0), 1.0);
    }

    #[test]
    fn test_pseudo_exp_cuts_off_below_domain() {
        assert_eq!(pseudo_exp_for_negative(-128.5), 0.0);
        assert_eq!(pseudo_exp_for_negative(-1.0e9), 0.0);
    }

    #[test]
    fn test_pseudo_exp_close_to_exp() {
        // Near zero the Taylor step is accurate to well under a percent
        for x in [-0.5f32, -1.0, -2.0, -5.0] {
            let approx = pseudo_exp_for_negative(x);
            let exact = x.exp();
            assert!((approx - exact).abs() / exact < 0.01, "x={x} approx={approx} exact={exact}");
        }
    }

    #[test]
    fn test_convex() {
        assert_eq!(convex(0.0), 0.0);
        assert_eq!(convex(1.0), 1.0);
        assert_eq!(convex(0.5), 0.75);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_pseudo_exp_in_unit_range(f in -200.0f32..=0.0) {
            let v = pseudo_exp_for_negative(f);
            prop_assert!(v.is_finite());
            prop_assert!((0.0..=1.0).contains(&v));
        }

        #[test]
        fn prop_pseudo_exp_monotone(a in -128.0f32..=0.0, b in -128.0f32..=0.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(pseudo_exp_for_negative(lo) <= pseudo_exp_for_negative(hi) + 1e-6);
        }
    }
}
