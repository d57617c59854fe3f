//! Struct-of-rows tables keyed by dense typed ids.
//!
//! A [`Table`] is a `Vec<T>` whose index type is fixed at compile time. It is
//! used both for entity tables (`Table<NationId, Nation>`) and for dense
//! per-entity columns (`Table<CommodityId, f32>` on a nation row).

use crate::ids::DenseId;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table<I, T> {
    rows: Vec<T>,
    #[serde(skip)]
    _id: PhantomData<fn() -> I>,
}

impl<I, T> Default for Table<I, T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            _id: PhantomData,
        }
    }
}

impl<I: DenseId, T> Table<I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(rows: Vec<T>) -> Self {
        Self {
            rows,
            _id: PhantomData,
        }
    }

    /// A column of `len` copies of `value`.
    pub fn filled(len: usize, value: T) -> Self
    where
        T: Clone,
    {
        Self::from_vec(vec![value; len])
    }

    /// Append a row and return its id.
    pub fn push(&mut self, row: T) -> I {
        let id = I::from_index(self.rows.len());
        self.rows.push(row);
        id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn get(&self, id: I) -> Option<&T> {
        self.rows.get(id.index())
    }

    #[inline]
    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.rows.get_mut(id.index())
    }

    /// Value at `id`, or `T::default()` for an id past the end.
    ///
    /// Sparse modifier columns are allowed to be shorter than the commodity table.
    #[inline]
    pub fn get_or_default(&self, id: I) -> T
    where
        T: Copy + Default,
    {
        self.rows.get(id.index()).copied().unwrap_or_default()
    }

    pub fn ids(&self) -> impl Iterator<Item = I> + ExactSizeIterator {
        (0..self.rows.len()).map(I::from_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| (I::from_index(i), row))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.rows
            .iter_mut()
            .enumerate()
            .map(|(i, row)| (I::from_index(i), row))
    }

    pub fn values(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn values_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.rows.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.rows
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.rows
    }

    /// Remove a row by moving the last row into its slot.
    ///
    /// Returns the removed row and, if a row was moved, the id it used to have.
    /// Callers must rewrite foreign keys that pointed at the moved id.
    pub fn swap_remove(&mut self, id: I) -> (T, Option<I>) {
        let last = self.rows.len() - 1;
        let row = self.rows.swap_remove(id.index());
        let moved = (id.index() != last).then(|| I::from_index(last));
        (row, moved)
    }

    /// Resize a column, filling new slots with `value`.
    pub fn resize(&mut self, len: usize, value: T)
    where
        T: Clone,
    {
        self.rows.resize(len, value);
    }

    /// Set every slot to `value`.
    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        self.rows.fill(value);
    }

    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }

    /// Two distinct rows mutably at once.
    pub fn pair_mut(&mut self, a: I, b: I) -> (&mut T, &mut T) {
        assert_ne!(a, b, "pair_mut needs distinct ids");
        let (ai, bi) = (a.index(), b.index());
        if ai < bi {
            let (lo, hi) = self.rows.split_at_mut(bi);
            (&mut lo[ai], &mut hi[0])
        } else {
            let (lo, hi) = self.rows.split_at_mut(ai);
            (&mut hi[0], &mut lo[bi])
        }
    }
}

impl<I: DenseId, T> Index<I> for Table<I, T> {
    type Output = T;

    #[inline]
    fn index(&self, id: I) -> &T {
        &self.rows[id.index()]
    }
}

impl<I: DenseId, T> IndexMut<I> for Table<I, T> {
    #[inline]
    fn index_mut(&mut self, id: I) -> &mut T {
        &mut self.rows[id.index()]
    }
}

impl<I: DenseId, T> FromIterator<T> for Table<I, T> {
    fn from_iter<It: IntoIterator<Item = T>>(iter: It) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// Rebuild a dense table from `(id, row)` pairs that cover every id exactly once.
pub fn from_pairs<I: DenseId, T>(mut pairs: Vec<(I, T)>) -> Table<I, T> {
    pairs.sort_by_key(|(id, _)| *id);
    debug_assert!(pairs.iter().enumerate().all(|(i, (id, _))| id.index() == i));
    pairs.into_iter().map(|(_, row)| row).collect()
}
