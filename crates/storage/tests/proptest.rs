//! Property-based tests for strata-storage using proptest.

use std::collections::{BTreeSet, HashSet};
use proptest::prelude::*;
use strata_core::schema::SchemaBuilder;
use strata_core::DataType;
use strata_reactive::{EventRecorder, OutputEvent};
use strata_storage::{IndexedTable, RowInterner, RowStore, Table};

proptest! {
    /// No two simultaneously live rows share an id.
    #[test]
    fn row_ids_unique_among_live(ops in prop::collection::vec(any::<Option<u8>>(), 1..300)) {
        let mut store = RowStore::new();
        let mut live: Vec<u32> = Vec::new();
        for op in ops {
            match op {
                Some(pick) if !live.is_empty() => {
                    let row = live.swap_remove(pick as usize % live.len());
                    store.free(row).unwrap();
                }
                _ => {
                    let row = store.allocate();
                    prop_assert!(!live.contains(&row), "Row {} allocated while live", row);
                    live.push(row);
                }
            }
        }
        let expected: BTreeSet<u32> = live.iter().copied().collect();
        let actual: BTreeSet<u32> = store.live_rows().into_iter().collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(store.len(), live.len());
    }

    /// A freed id is reused before any id above the high-water mark.
    #[test]
    fn freed_ids_reused_first(count in 1u32..100, frees in prop::collection::vec(any::<u32>(), 1..20)) {
        let mut store = RowStore::new();
        for _ in 0..count {
            store.allocate();
        }
        let mut freed = Vec::new();
        for f in frees {
            let row = f % count;
            if store.is_live(row) {
                store.free(row).unwrap();
                freed.push(row);
            }
        }
        let high = store.high_water();
        // LIFO: most recently freed first
        for expected in freed.iter().rev() {
            prop_assert_eq!(store.allocate(), *expected);
        }
        prop_assert_eq!(store.allocate(), high);
    }

    /// Interning the same key always resolves to the same row.
    #[test]
    fn intern_idempotent(keys in prop::collection::vec(0i64..50, 1..200)) {
        let mut store = RowStore::new();
        let mut interner = RowInterner::new();
        let mut first_rows = std::collections::HashMap::new();
        for key in keys {
            let (row, is_new) = interner.intern(key, &mut store);
            match first_rows.get(&key) {
                Some(&existing) => {
                    prop_assert!(!is_new);
                    prop_assert_eq!(existing, row);
                }
                None => {
                    prop_assert!(is_new);
                    first_rows.insert(key, row);
                }
            }
        }
        prop_assert_eq!(interner.len(), first_rows.len());
        let distinct: HashSet<u32> = first_rows.values().copied().collect();
        prop_assert_eq!(distinct.len(), first_rows.len());
    }

    /// Repeated upserts of one key within a cycle emit exactly one add.
    #[test]
    fn upsert_emits_one_add(values in prop::collection::vec(any::<i32>(), 1..20)) {
        let schema = SchemaBuilder::new("t")
            .add_field("key", DataType::Int64)
            .unwrap()
            .add_field("value", DataType::Int32)
            .unwrap()
            .build();
        let mut table: IndexedTable<i64> = IndexedTable::new(schema, &["key"]).unwrap();
        let recorder = EventRecorder::shared();
        table.output().attach_input(recorder.clone());
        recorder.borrow_mut().clear();

        for v in &values {
            table.upsert(42, |w| w.set(1, *v)).unwrap();
        }
        table.fire_changes();

        let events = recorder.borrow().events().to_vec();
        prop_assert_eq!(events.len(), 1);
        prop_assert!(matches!(&events[0], OutputEvent::Added(rows) if rows.len() == 1));
    }

    /// An input attached at any point, fired batches or not, ends up with
    /// exactly the table's live rows and never sees a row added twice.
    #[test]
    fn late_attach_sees_each_row_once(
        ops in prop::collection::vec(any::<Option<u8>>(), 1..150),
        attach_at in 0usize..150,
    ) {
        let schema = SchemaBuilder::new("t")
            .add_field("value", DataType::Int32)
            .unwrap()
            .build();
        let mut table = Table::new(schema);
        let recorder = EventRecorder::shared();
        let mut live: Vec<u32> = Vec::new();
        let attach_at = attach_at % ops.len();

        for (i, op) in ops.into_iter().enumerate() {
            if i == attach_at {
                table.output().attach_input(recorder.clone());
            }
            match op {
                Some(pick) if pick % 4 == 0 => table.fire_changes(),
                Some(pick) if !live.is_empty() => {
                    let row = live.swap_remove(pick as usize % live.len());
                    table.remove(row).unwrap();
                }
                _ => live.push(table.insert(|w| w.set(0, 1)).unwrap()),
            }
        }
        table.fire_changes();

        let mut seen = BTreeSet::new();
        for event in recorder.borrow().events() {
            match event {
                OutputEvent::Added(rows) => {
                    for row in rows {
                        prop_assert!(seen.insert(*row), "Row {} added while live", row);
                    }
                }
                OutputEvent::Removed(rows) => {
                    for row in rows {
                        prop_assert!(seen.remove(row), "Row {} removed while not live", row);
                    }
                }
                _ => {}
            }
        }
        let expected: BTreeSet<u32> = live.iter().copied().collect();
        prop_assert_eq!(&seen, &expected);
        prop_assert_eq!(recorder.borrow().live_rows(), table.output().live_rows());
    }
}
