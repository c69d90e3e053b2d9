//! Row id allocation for Strata tables.
//!
//! This module provides the `RowStore` struct, the sole authority on which
//! row ids of a table are live. Freed ids are reused in LIFO order: the most
//! recently freed id is the next one allocated.

use alloc::vec::Vec;
use strata_core::{Error, Result, RowId};
use strata_reactive::RowProvider;

/// Allocates and recycles row ids and tracks their liveness.
#[derive(Clone, Debug, Default)]
pub struct RowStore {
    /// Next never-allocated id.
    next_row: RowId,
    /// Reusable ids; the last element is allocated first.
    free_list: Vec<RowId>,
    /// Ids removed in the current cycle, not yet reusable.
    retired: Vec<RowId>,
    live: Vec<bool>,
    live_count: usize,
}

impl RowStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a row id that is not live and marks it live.
    ///
    /// Reuses the most recently freed id if any, otherwise the next
    /// sequential id.
    pub fn allocate(&mut self) -> RowId {
        let row = match self.free_list.pop() {
            Some(row) => row,
            None => {
                let row = self.next_row;
                self.next_row += 1;
                row
            }
        };
        self.mark_live(row);
        row
    }

    /// Frees a live row id, making it immediately reusable.
    pub fn free(&mut self, row: RowId) -> Result<()> {
        self.mark_dead(row)?;
        self.free_list.push(row);
        Ok(())
    }

    /// Marks a live row id dead without making it reusable until [`recycle`].
    ///
    /// [`recycle`]: RowStore::recycle
    pub fn retire(&mut self, row: RowId) -> Result<()> {
        self.mark_dead(row)?;
        self.retired.push(row);
        Ok(())
    }

    /// Returns the ids retired since the last [`recycle`](RowStore::recycle).
    #[inline]
    pub fn retired(&self) -> &[RowId] {
        &self.retired
    }

    /// Moves retired ids to the free list, last retired first reused.
    pub fn recycle(&mut self) {
        self.free_list.append(&mut self.retired);
    }

    /// Marks a specific id live. Returns false if it already was.
    ///
    /// Used where ids are assigned elsewhere, such as a client mirroring a
    /// server's table. Ids skipped over become free. Fails with `InvalidRow`
    /// for the one id past which nothing could be allocated.
    pub fn claim(&mut self, row: RowId) -> Result<bool> {
        if self.is_live(row) {
            return Ok(false);
        }
        if row >= self.next_row {
            let next = row.checked_add(1).ok_or_else(|| Error::invalid_row(row))?;
            // Lowest skipped id ends up last, so it is allocated first
            self.free_list.extend((self.next_row..row).rev());
            self.next_row = next;
        } else if let Some(idx) = self.free_list.iter().position(|r| *r == row) {
            self.free_list.remove(idx);
        } else if let Some(idx) = self.retired.iter().position(|r| *r == row) {
            self.retired.remove(idx);
        }
        self.mark_live(row);
        Ok(true)
    }

    /// Returns true if the row id is live.
    #[inline]
    pub fn is_live(&self, row: RowId) -> bool {
        self.live.get(row as usize).copied().unwrap_or(false)
    }

    /// Returns live row ids in ascending order.
    pub fn live_rows(&self) -> Vec<RowId> {
        self.live
            .iter()
            .enumerate()
            .filter(|(_, live)| **live)
            .map(|(row, _)| row as RowId)
            .collect()
    }

    /// Returns the number of live rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if no row is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Returns one past the highest id ever allocated.
    #[inline]
    pub fn high_water(&self) -> RowId {
        self.next_row
    }

    /// Frees every row and forgets all allocation history.
    pub fn clear(&mut self) {
        self.next_row = 0;
        self.free_list.clear();
        self.retired.clear();
        self.live.clear();
        self.live_count = 0;
    }

    fn mark_live(&mut self, row: RowId) {
        let idx = row as usize;
        if idx >= self.live.len() {
            self.live.resize(idx + 1, false);
        }
        self.live[idx] = true;
        self.live_count += 1;
    }

    fn mark_dead(&mut self, row: RowId) -> Result<()> {
        match self.live.get_mut(row as usize) {
            Some(live) if *live => {
                *live = false;
                self.live_count -= 1;
                Ok(())
            }
            _ => Err(Error::invalid_row(row)),
        }
    }
}

impl RowProvider for RowStore {
    fn live_rows(&self) -> Vec<RowId> {
        RowStore::live_rows(self)
    }

    fn row_count(&self) -> usize {
        self.len()
    }
}
