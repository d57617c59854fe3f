use serde::{Deserialize, Serialize};

/// A value clamped to an integer range.
/// Used for budget sliders: taxes and spending (0 to 100), tariffs (-100 to +100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundedInt {
    value: i32,
    min: i32,
    max: i32,
}

impl BoundedInt {
    pub const fn new(value: i32, min: i32, max: i32) -> Self {
        let value = if value < min {
            min
        } else if value > max {
            max
        } else {
            value
        };
        Self { value, min, max }
    }

    pub fn get(&self) -> i32 {
        self.value
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn add(&mut self, delta: i32) {
        self.value = self.value.saturating_add(delta).clamp(self.min, self.max);
    }

    pub fn set(&mut self, value: i32) {
        self.value = value.clamp(self.min, self.max);
    }

    /// Clamp into a narrower window inside the hard range.
    ///
    /// An inverted window (`hi < lo`) collapses to `lo`.
    pub fn clamp_to(&mut self, lo: i32, hi: i32) {
        let hi = hi.max(lo);
        self.set(self.value.clamp(lo, hi));
    }

    /// Position within the range, from 0.0 to 1.0.
    /// Returns 0 if max == min.
    pub fn ratio(&self) -> f32 {
        let range = self.max - self.min;
        if range == 0 {
            return 0.0;
        }
        (self.value - self.min) as f32 / range as f32
    }

    /// The value read as a percentage: `value / 100`.
    #[inline]
    pub fn fraction(&self) -> f32 {
        self.value as f32 / 100.0
    }
}

impl Default for BoundedInt {
    fn default() -> Self {
        percent(0)
    }
}

pub type Percent = BoundedInt;

/// A tax or spending slider, 0 to 100.
pub const fn percent(value: i32) -> BoundedInt {
    BoundedInt::new(value, 0, 100)
}

/// A tariff slider, -100 (subsidy) to +100.
pub const fn tariff(value: i32) -> BoundedInt {
    BoundedInt::new(value, -100, 100)
}
