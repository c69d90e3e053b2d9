//! Change batches.
//!
//! A `ChangeSet` accumulates the row ids touched during one mutation cycle.
//! It applies the subsumption rules as rows are recorded, so the batch is
//! always in its reportable form:
//!
//! - a change to a row added in this batch is reported only as the add
//! - a change to a row removed in this batch is dropped
//! - removing a row added in this batch cancels both
//! - removing a changed row drops the change
//! - adding a row removed in this batch moves it back to added

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use strata_core::{FieldId, FieldSet, RowId};

/// Row ids added, changed and removed during one mutation cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    added: BTreeSet<RowId>,
    changed: BTreeMap<RowId, FieldSet>,
    removed: BTreeSet<RowId>,
}

impl ChangeSet {
    /// Creates a new empty change set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an added row.
    pub fn add_row(&mut self, row: RowId) {
        self.removed.remove(&row);
        self.changed.remove(&row);
        self.added.insert(row);
    }

    /// Records a change to one field of a row.
    pub fn change_field(&mut self, row: RowId, field: FieldId) {
        if self.added.contains(&row) || self.removed.contains(&row) {
            return;
        }
        self.changed.entry(row).or_default().insert(field);
    }

    /// Records a change to several fields of a row.
    pub fn change_fields(&mut self, row: RowId, fields: &FieldSet) {
        if fields.is_empty() || self.added.contains(&row) || self.removed.contains(&row) {
            return;
        }
        self.changed.entry(row).or_default().union_with(fields);
    }

    /// Records a removed row.
    pub fn remove_row(&mut self, row: RowId) {
        if self.added.remove(&row) {
            return;
        }
        self.changed.remove(&row);
        self.removed.insert(row);
    }

    /// Returns the added rows in ascending order.
    #[inline]
    pub fn added_rows(&self) -> &BTreeSet<RowId> {
        &self.added
    }

    /// Returns the changed rows with the fields changed on each.
    #[inline]
    pub fn changed_rows(&self) -> &BTreeMap<RowId, FieldSet> {
        &self.changed
    }

    /// Returns the union of all changed fields.
    pub fn changed_fields(&self) -> FieldSet {
        let mut all = FieldSet::new();
        for fields in self.changed.values() {
            all.union_with(fields);
        }
        all
    }

    /// Returns the removed rows in ascending order.
    #[inline]
    pub fn removed_rows(&self) -> &BTreeSet<RowId> {
        &self.removed
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Returns the total number of rows touched.
    #[inline]
    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }

    /// Clears all changes.
    pub fn clear(&mut self) {
        self.added.clear();
        self.changed.clear();
        self.removed.clear();
    }

    /// Takes the accumulated changes, leaving this set empty.
    pub fn take(&mut self) -> ChangeSet {
        core::mem::take(self)
    }

    pub(crate) fn added_vec(&self) -> Vec<RowId> {
        self.added.iter().copied().collect()
    }

    pub(crate) fn changed_vec(&self) -> Vec<RowId> {
        self.changed.keys().copied().collect()
    }

    pub(crate) fn removed_vec(&self) -> Vec<RowId> {
        self.removed.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn rows(set: &BTreeSet<RowId>) -> Vec<RowId> {
        set.iter().copied().collect()
    }

    #[test]
    fn test_change_set_new() {
        let cs = ChangeSet::new();
        assert!(cs.is_empty());
        assert_eq!(cs.len(), 0);
    }

    #[test]
    fn test_change_after_add_is_subsumed() {
        let mut cs = ChangeSet::new();
        cs.add_row(1);
        cs.change_field(1, 0);
        assert_eq!(rows(cs.added_rows()), vec![1]);
        assert!(cs.changed_rows().is_empty());
    }

    #[test]
    fn test_remove_drops_change() {
        let mut cs = ChangeSet::new();
        cs.change_field(4, 1);
        cs.remove_row(4);
        cs.change_field(4, 2);
        assert!(cs.changed_rows().is_empty());
        assert_eq!(rows(cs.removed_rows()), vec![4]);
    }

    #[test]
    fn test_add_then_remove_cancels() {
        let mut cs = ChangeSet::new();
        cs.add_row(2);
        cs.remove_row(2);
        assert!(cs.is_empty());
    }

    #[test]
    fn test_remove_then_add_moves_to_added() {
        let mut cs = ChangeSet::new();
        cs.remove_row(3);
        cs.add_row(3);
        assert_eq!(rows(cs.added_rows()), vec![3]);
        assert!(cs.removed_rows().is_empty());
    }

    #[test]
    fn test_changed_fields_union() {
        let mut cs = ChangeSet::new();
        cs.change_field(1, 0);
        cs.change_field(2, 3);
        let more: FieldSet = [1, 3].into_iter().collect();
        cs.change_fields(2, &more);
        assert_eq!(cs.changed_fields().iter().collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(
            cs.changed_rows()[&2].iter().collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_change_set_clear_and_take() {
        let mut cs = ChangeSet::new();
        cs.add_row(1);
        cs.remove_row(9);
        let taken = cs.take();
        assert!(cs.is_empty());
        assert_eq!(taken.len(), 2);

        let mut cs = taken;
        cs.clear();
        assert!(cs.is_empty());
    }
}
