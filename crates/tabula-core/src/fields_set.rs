//! Compact field masks.
//!
//! A [`FieldSet`] records a subset of a table's fields by position. Writes use it
//! to carry the columns that changed; the cascade uses it to carry the fields a
//! relation touches.

use crate::field::FieldId;

/// A bitset over field positions `0..len`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSet {
    len: usize,
    bits: Box<[u64]>,
}

impl FieldSet {
    /// An empty mask for `len` fields.
    #[must_use]
    pub fn empty(len: usize) -> Self {
        Self {
            len,
            bits: vec![0u64; len.div_ceil(64)].into_boxed_slice(),
        }
    }

    /// A full mask for `len` fields.
    #[must_use]
    pub fn all(len: usize) -> Self {
        let mut s = Self::empty(len);
        for idx in 0..len {
            s.insert(FieldId(idx));
        }
        s
    }

    /// Number of field positions covered.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.len
    }

    /// Add a field. Positions outside the mask are ignored.
    pub fn insert(&mut self, id: FieldId) {
        let idx = id.index();
        if idx >= self.len {
            return;
        }
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w |= 1u64 << (idx % 64);
        }
    }

    /// Remove a field.
    pub fn remove(&mut self, id: FieldId) {
        let idx = id.index();
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w &= !(1u64 << (idx % 64));
        }
    }

    /// True if the field is in the mask.
    #[must_use]
    pub fn contains(&self, id: FieldId) -> bool {
        let idx = id.index();
        idx < self.len
            && self
                .bits
                .get(idx / 64)
                .is_some_and(|w| (w & (1u64 << (idx % 64))) != 0)
    }

    /// Number of fields in the mask.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if no field is in the mask.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Fields in the mask, in position order.
    pub fn iter(&self) -> impl Iterator<Item = FieldId> + '_ {
        (0..self.len).map(FieldId).filter(|id| self.contains(*id))
    }
}

impl FromIterator<FieldId> for FieldSet {
    fn from_iter<T: IntoIterator<Item = FieldId>>(iter: T) -> Self {
        let ids: Vec<FieldId> = iter.into_iter().collect();
        let len = ids.iter().map(|id| id.index() + 1).max().unwrap_or(0);
        let mut s = Self::empty(len);
        for id in ids {
            s.insert(id);
        }
        s
    }
}
