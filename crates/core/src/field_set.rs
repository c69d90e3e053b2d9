//! Compact sets of field ids.

use crate::row::FieldId;
use alloc::vec::Vec;

/// A bitset of field ids, used to report which fields changed.
#[derive(Clone, Debug, Default)]
pub struct FieldSet {
    words: Vec<u64>,
}

impl FieldSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Creates a set containing every id in `0..count`.
    pub fn all(count: usize) -> Self {
        let mut set = Self::new();
        for id in 0..count {
            set.insert(id);
        }
        set
    }

    /// Adds a field id. Returns true if it was not already present.
    pub fn insert(&mut self, id: FieldId) -> bool {
        let (word, bit) = (id / 64, id % 64);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << bit;
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    /// Returns true if the id is in the set.
    #[inline]
    pub fn contains(&self, id: FieldId) -> bool {
        self.words
            .get(id / 64)
            .map_or(false, |w| w & (1u64 << (id % 64)) != 0)
    }

    /// Adds every id from `other`.
    pub fn union_with(&mut self, other: &FieldSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (dst, src) in self.words.iter_mut().zip(other.words.iter()) {
            *dst |= *src;
        }
    }

    /// Returns the number of ids in the set.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns true if the set holds no ids.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Removes all ids.
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Iterates ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64).filter_map(move |bit| {
                if word & (1u64 << bit) != 0 {
                    Some(i * 64 + bit)
                } else {
                    None
                }
            })
        })
    }
}

impl FieldSet {
    fn significant(&self) -> &[u64] {
        let len = self.words.iter().rposition(|w| *w != 0).map_or(0, |i| i + 1);
        &self.words[..len]
    }
}

impl PartialEq for FieldSet {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for FieldSet {}

impl FromIterator<FieldId> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldId>>(iter: I) -> Self {
        let mut set = FieldSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_insert_contains() {
        let mut set = FieldSet::new();
        assert!(set.insert(3));
        assert!(!set.insert(3));
        assert!(set.insert(70));
        assert!(set.contains(3));
        assert!(set.contains(70));
        assert!(!set.contains(4));
        assert!(!set.contains(1000));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_iter_ordered() {
        let set: FieldSet = [65, 2, 0].into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 2, 65]);
    }

    #[test]
    fn test_union() {
        let mut a: FieldSet = [1].into_iter().collect();
        let b: FieldSet = [2, 128].into_iter().collect();
        a.union_with(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2, 128]);
    }

    #[test]
    fn test_all_and_clear() {
        let mut set = FieldSet::all(3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_equality_ignores_capacity() {
        let mut a: FieldSet = [1].into_iter().collect();
        let mut wide = FieldSet::new();
        wide.words.resize(4, 0);
        a.union_with(&wide);
        assert_eq!(a, [1].into_iter().collect::<FieldSet>());
        assert_ne!(a, FieldSet::new());
    }
}
