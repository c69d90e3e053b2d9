//! Key to row id interning.

use crate::row_store::RowStore;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::HashMap;
use strata_core::{RowId, Value};

/// Maps distinct keys to row ids, at most one live row per key.
#[derive(Clone, Debug)]
pub struct RowInterner<K> {
    index: HashMap<K, RowId>,
}

impl<K: Hash + Eq + Clone> RowInterner<K> {
    /// Creates an empty interner.
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
        }
    }

    /// Resolves a key to its row, allocating one on a miss.
    ///
    /// Returns `(row, true)` if the row was newly allocated.
    pub fn intern(&mut self, key: K, store: &mut RowStore) -> (RowId, bool) {
        if let Some(&row) = self.index.get(&key) {
            return (row, false);
        }
        let row = store.allocate();
        self.index.insert(key, row);
        (row, true)
    }

    /// Returns the row for a key, if interned.
    #[inline]
    pub fn lookup(&self, key: &K) -> Option<RowId> {
        self.index.get(key).copied()
    }

    /// Removes a key and frees its row. Returns `None` if the key is unknown.
    pub fn remove(&mut self, key: &K, store: &mut RowStore) -> Option<RowId> {
        let row = self.index.remove(key)?;
        // The mapping only ever holds live rows
        let _ = store.free(row);
        Some(row)
    }

    /// Removes a key without touching the row store.
    pub fn forget(&mut self, key: &K) -> Option<RowId> {
        self.index.remove(key)
    }

    /// Returns the number of interned keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if no key is interned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.index.clear();
    }
}

impl<K: Hash + Eq + Clone> Default for RowInterner<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Composite key: an ordered tuple of field values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TupleKey(Box<[Value]>);

impl TupleKey {
    /// Creates a key from its values, in key field order.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values.into_boxed_slice())
    }

    /// Returns the key values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for TupleKey {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// A key type usable by [`crate::IndexedTable`].
pub trait TableKey: Hash + Eq + Clone {
    /// Returns the values to store in the key fields, in key field order.
    fn key_values(&self) -> Vec<Value>;
}

impl TableKey for TupleKey {
    fn key_values(&self) -> Vec<Value> {
        self.0.to_vec()
    }
}

macro_rules! impl_table_key {
    ($($ty:ty),*) => {
        $(
            impl TableKey for $ty {
                fn key_values(&self) -> Vec<Value> {
                    alloc::vec![Value::from(self.clone())]
                }
            }
        )*
    };
}

impl_table_key!(bool, i8, i16, char, i32, i64, String, Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_intern_idempotent() {
        let mut store = RowStore::new();
        let mut interner: RowInterner<String> = RowInterner::new();
        let (a, new_a) = interner.intern("x".into(), &mut store);
        let (b, new_b) = interner.intern("x".into(), &mut store);
        assert!(new_a);
        assert!(!new_b);
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_frees_row() {
        let mut store = RowStore::new();
        let mut interner: RowInterner<i64> = RowInterner::new();
        let (row, _) = interner.intern(7, &mut store);
        assert_eq!(interner.remove(&7, &mut store), Some(row));
        assert_eq!(interner.remove(&7, &mut store), None);
        assert!(!store.is_live(row));
        assert_eq!(interner.lookup(&7), None);

        let (again, is_new) = interner.intern(8, &mut store);
        assert!(is_new);
        assert_eq!(again, row);
    }

    #[test]
    fn test_tuple_key() {
        let mut store = RowStore::new();
        let mut interner: RowInterner<TupleKey> = RowInterner::new();
        let k1 = TupleKey::new(vec![Value::from("AAPL"), Value::Int32(1)]);
        let k2 = TupleKey::new(vec![Value::from("AAPL"), Value::Int32(2)]);
        let (r1, _) = interner.intern(k1.clone(), &mut store);
        let (r2, _) = interner.intern(k2, &mut store);
        assert_ne!(r1, r2);
        assert_eq!(interner.lookup(&k1), Some(r1));
        assert_eq!(k1.key_values().len(), 2);
    }

    #[test]
    fn test_single_key_values() {
        assert_eq!(5i32.key_values(), vec![Value::Int32(5)]);
        assert_eq!(String::from("a").key_values(), vec![Value::from("a")]);
    }
}
