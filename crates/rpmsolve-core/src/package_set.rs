//! Dense bitset over the package identifiers of one universe generation.

use std::fmt;

use crate::error::{ResolveError, Result};
use crate::package::PackageId;

const WORD_BITS: usize = 64;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PackageSet {
    generation: u64,
    len: usize,
    words: Vec<u64>,
}

impl PackageSet {
    /// All bits clear.
    pub fn empty(generation: u64, len: usize) -> Self {
        Self {
            generation,
            len,
            words: vec![0; len.div_ceil(WORD_BITS)],
        }
    }

    /// Every valid identifier set.
    pub fn full(generation: u64, len: usize) -> Self {
        let mut set = Self {
            generation,
            len,
            words: vec![u64::MAX; len.div_ceil(WORD_BITS)],
        };
        set.clear_tail();
        set
    }

    pub fn from_ids(generation: u64, len: usize, ids: impl IntoIterator<Item = PackageId>) -> Self {
        let mut set = Self::empty(generation, len);
        for id in ids {
            set.insert(id);
        }
        set
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Size of the identifier space, not the number of members.
    pub fn capacity(&self) -> usize {
        self.len
    }

    pub fn contains(&self, id: PackageId) -> bool {
        let i = id.index();
        i < self.len && self.words[i / WORD_BITS] & (1 << (i % WORD_BITS)) != 0
    }

    /// Identifiers outside the universe are ignored.
    pub fn insert(&mut self, id: PackageId) {
        let i = id.index();
        if i < self.len {
            self.words[i / WORD_BITS] |= 1 << (i % WORD_BITS);
        }
    }

    pub fn remove(&mut self, id: PackageId) {
        let i = id.index();
        if i < self.len {
            self.words[i / WORD_BITS] &= !(1 << (i % WORD_BITS));
        }
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn union(&self, other: &PackageSet) -> Result<PackageSet> {
        let mut out = self.clone();
        out.union_with(other)?;
        Ok(out)
    }

    pub fn intersect(&self, other: &PackageSet) -> Result<PackageSet> {
        let mut out = self.clone();
        out.intersect_with(other)?;
        Ok(out)
    }

    pub fn difference(&self, other: &PackageSet) -> Result<PackageSet> {
        let mut out = self.clone();
        out.difference_with(other)?;
        Ok(out)
    }

    /// Complement against the universe, never beyond its last identifier.
    pub fn complement(&self) -> PackageSet {
        let mut out = Self {
            generation: self.generation,
            len: self.len,
            words: self.words.iter().map(|w| !w).collect(),
        };
        out.clear_tail();
        out
    }

    pub fn union_with(&mut self, other: &PackageSet) -> Result<()> {
        self.check_generation(other)?;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
        Ok(())
    }

    pub fn intersect_with(&mut self, other: &PackageSet) -> Result<()> {
        self.check_generation(other)?;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= b;
        }
        Ok(())
    }

    pub fn difference_with(&mut self, other: &PackageSet) -> Result<()> {
        self.check_generation(other)?;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !b;
        }
        Ok(())
    }

    /// Ascending identifiers. The set is borrowed, so iterating again
    /// restarts from the lowest id.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: &self.words,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    pub fn to_vec(&self) -> Vec<PackageId> {
        self.iter().collect()
    }

    pub(crate) fn check_generation(&self, other: &PackageSet) -> Result<()> {
        if self.generation != other.generation || self.len != other.len {
            return Err(ResolveError::UniverseMismatch {
                expected: self.generation,
                found: other.generation,
            });
        }
        Ok(())
    }

    fn clear_tail(&mut self) {
        let used = self.len % WORD_BITS;
        if used != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << used) - 1;
            }
        }
    }
}

impl fmt::Debug for PackageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageSet")
            .field("generation", &self.generation)
            .field("ids", &self.iter().map(|id| id.0).collect::<Vec<_>>())
            .finish()
    }
}

pub struct Iter<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
}

impl Iterator for Iter<'_> {
    type Item = PackageId;

    fn next(&mut self) -> Option<PackageId> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(PackageId((self.word_index * WORD_BITS + bit) as u32));
            }
            self.word_index += 1;
            self.current = *self.words.get(self.word_index)?;
        }
    }
}

impl<'a> IntoIterator for &'a PackageSet {
    type Item = PackageId;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u32]) -> PackageSet {
        PackageSet::from_ids(1, 130, ids.iter().map(|&i| PackageId(i)))
    }

    #[test]
    fn test_empty_and_full() {
        assert!(PackageSet::empty(1, 130).is_empty());
        let full = PackageSet::full(1, 130);
        assert_eq!(full.len(), 130);
        assert!(full.contains(PackageId(129)));
        assert!(!full.contains(PackageId(130)));
    }

    #[test]
    fn test_insert_out_of_range_is_ignored() {
        let mut s = PackageSet::empty(1, 10);
        s.insert(PackageId(10));
        assert!(s.is_empty());
    }

    #[test]
    fn test_set_algebra_laws() {
        let a = set(&[1, 5, 64, 100]);
        let b = set(&[5, 6, 128]);

        assert_eq!(a.union(&b).unwrap().intersect(&a).unwrap(), a);
        assert!(a.difference(&a).unwrap().is_empty());
        assert_eq!(a.complement().complement(), a);
        assert_eq!(a.complement().len(), 130 - 4);
    }

    #[test]
    fn test_in_place_variants_mutate_receiver_only() {
        let mut a = set(&[1, 2, 3]);
        let b = set(&[3, 4]);
        a.intersect_with(&b).unwrap();
        assert_eq!(a.to_vec(), vec![PackageId(3)]);
        assert_eq!(b.to_vec(), vec![PackageId(3), PackageId(4)]);

        a.union_with(&b).unwrap();
        assert_eq!(a.len(), 2);
        a.difference_with(&b).unwrap();
        assert!(a.is_empty());
    }

    #[test]
    fn test_generation_mismatch() {
        let a = PackageSet::full(1, 4);
        let b = PackageSet::full(2, 4);
        assert!(matches!(
            a.union(&b),
            Err(ResolveError::UniverseMismatch { expected: 1, found: 2 })
        ));
        let mut c = a.clone();
        assert!(c.intersect_with(&b).is_err());
    }

    #[test]
    fn test_iteration_is_ascending_and_restartable() {
        let s = set(&[127, 0, 64, 63]);
        let first: Vec<_> = s.iter().map(|id| id.0).collect();
        assert_eq!(first, vec![0, 63, 64, 127]);
        let second: Vec<_> = s.iter().map(|id| id.0).collect();
        assert_eq!(first, second);
    }
}
