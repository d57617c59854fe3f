//! Typed dense identifiers.
//!
//! Every entity kind lives in a [`crate::table::Table`] keyed by its own id
//! type, so a province index can never be used to look up a nation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dense, zero-based row identifier.
pub trait DenseId: Copy + Eq + Ord + fmt::Debug {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

macro_rules! dense_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Hash, Eq, PartialEq, Clone, Copy, Debug, Default, Serialize, Deserialize, PartialOrd, Ord,
        )]
        pub struct $name(pub u32);

        impl DenseId for $name {
            #[inline]
            fn from_index(index: usize) -> Self {
                debug_assert!(index <= u32::MAX as usize);
                Self(index as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

dense_id!(
    /// Commodity identifier. Id 0 is always the money commodity.
    CommodityId
);
dense_id!(NationId);
dense_id!(StateId);
dense_id!(ProvinceId);
dense_id!(FactoryId);
dense_id!(PopId);
dense_id!(PopTypeId);
dense_id!(FactoryTypeId);
dense_id!(
    /// Land or naval unit type.
    UnitTypeId
);
dense_id!(
    /// Opaque handle understood only by the external trigger evaluator.
    TriggerId
);

impl CommodityId {
    /// The treasury commodity. Nation stockpiles of it are the treasury and may go negative.
    pub const MONEY: CommodityId = CommodityId(0);

    #[inline]
    pub fn is_money(self) -> bool {
        self == Self::MONEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_id_round_trip_index() {
        let id = ProvinceId::from_index(42);
        assert_eq!(id, ProvinceId(42));
        assert_eq!(id.index(), 42);
    }

    #[test]
    fn test_money_is_commodity_zero() {
        assert!(CommodityId(0).is_money());
        assert!(!CommodityId(1).is_money());
    }

    #[test]
    fn test_display_names_kind() {
        assert_eq!(NationId(3).to_string(), "NationId#3");
    }
}
