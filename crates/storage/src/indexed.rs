//! Tables keyed by field values.

use crate::interner::{RowInterner, TableKey, TupleKey};
use crate::table::{RowWriter, Table};
use alloc::format;
use alloc::vec::Vec;
use strata_core::schema::{Schema, SchemaRef};
use strata_core::{Error, FieldId, Result, RowId, Value};
use strata_reactive::TransformOutput;

/// A table whose rows are identified by a key stored in one or more fields.
///
/// Upserting an existing key updates its row; it is never an add.
#[derive(Debug)]
pub struct IndexedTable<K> {
    table: Table,
    key_fields: Vec<FieldId>,
    interner: RowInterner<K>,
}

/// An indexed table keyed by a tuple of field values.
pub type IndexedStructTable = IndexedTable<TupleKey>;

impl<K: TableKey> IndexedTable<K> {
    /// Creates a table keyed by the named fields.
    pub fn new(schema: Schema, key_fields: &[&str]) -> Result<Self> {
        if key_fields.is_empty() {
            return Err(Error::invalid_schema("At least one key field is required"));
        }
        let mut ids = Vec::with_capacity(key_fields.len());
        for name in key_fields {
            let id = schema
                .field_id(name)
                .ok_or_else(|| Error::invalid_schema(format!("Key field not found: {}", name)))?;
            ids.push(id);
        }
        Ok(Self {
            table: Table::new(schema),
            key_fields: ids,
            interner: RowInterner::new(),
        })
    }

    /// Inserts or updates the row for `key`.
    ///
    /// A new row gets the key written into its key fields. Returns the row
    /// and true if it was added. Key fields cannot be written by `write`.
    pub fn upsert<F>(&mut self, key: K, write: F) -> Result<(RowId, bool)>
    where
        F: FnOnce(&mut RowWriter<'_>) -> Result<()>,
    {
        if let Some(row) = self.interner.lookup(&key) {
            self.table.update_locked(row, &self.key_fields, write)?;
            return Ok((row, false));
        }

        let values = key.key_values();
        if values.len() != self.key_fields.len() {
            return Err(Error::invalid_operation(format!(
                "Key has {} values, table has {} key fields",
                values.len(),
                self.key_fields.len()
            )));
        }

        let (row, _) = {
            let mut rows = self.table.rows_mut();
            self.interner.intern(key.clone(), &mut rows)
        };
        if let Err(err) = self.write_new(row, values, write) {
            self.interner.forget(&key);
            self.table.release(row);
            return Err(err);
        }
        self.table.record_added(row);
        Ok((row, true))
    }

    fn write_new<F>(&mut self, row: RowId, values: Vec<Value>, write: F) -> Result<()>
    where
        F: FnOnce(&mut RowWriter<'_>) -> Result<()>,
    {
        let schema = self.table.schema().clone();
        for (&field, value) in self.key_fields.iter().zip(values) {
            if let Some(target) = schema.field(field) {
                target.field_mut().set(row, value)?;
            }
        }
        self.table.write_row(row, &self.key_fields, write)
    }

    /// Removes the row for `key`. Returns `None` if the key is unknown.
    pub fn remove(&mut self, key: &K) -> Result<Option<RowId>> {
        let Some(row) = self.interner.forget(key) else {
            return Ok(None);
        };
        self.table.remove(row)?;
        Ok(Some(row))
    }

    /// Returns the row for `key`, if present.
    #[inline]
    pub fn lookup(&self, key: &K) -> Option<RowId> {
        self.interner.lookup(key)
    }

    /// Reads a value; rows that are not live read as absent.
    pub fn get(&self, row: RowId, field: FieldId) -> Result<Value> {
        self.table.get(row, field)
    }

    /// Reads a value by field name; rows that are not live read as absent.
    pub fn get_by_name(&self, row: RowId, name: &str) -> Result<Value> {
        self.table.get_by_name(row, name)
    }

    /// Returns true if the row is live.
    #[inline]
    pub fn is_live(&self, row: RowId) -> bool {
        self.table.is_live(row)
    }

    /// Returns the number of keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.interner.len()
    }

    /// Returns true if no key is present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }

    /// Returns the current schema.
    #[inline]
    pub fn schema(&self) -> &SchemaRef {
        self.table.schema()
    }

    /// Returns the ids of the key fields.
    #[inline]
    pub fn key_fields(&self) -> &[FieldId] {
        &self.key_fields
    }

    /// Delivers accumulated changes to attached inputs.
    pub fn fire_changes(&mut self) {
        self.table.fire_changes();
    }

    /// Returns a handle for attaching inputs.
    #[inline]
    pub fn output(&self) -> TransformOutput {
        self.table.output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec;
    use strata_core::schema::SchemaBuilder;
    use strata_core::DataType;
    use strata_reactive::{EventRecorder, OutputEvent};

    fn prices() -> IndexedTable<String> {
        let schema = SchemaBuilder::new("prices")
            .add_field("symbol", DataType::String)
            .unwrap()
            .add_field("price", DataType::Float64)
            .unwrap()
            .build();
        IndexedTable::new(schema, &["symbol"]).unwrap()
    }

    #[test]
    fn test_upsert_add_then_update() {
        let mut table = prices();
        let recorder = EventRecorder::shared();
        table.output().attach_input(recorder.clone());
        recorder.borrow_mut().clear();

        let (row, added) = table
            .upsert("AAPL".into(), |w| w.set_by_name("price", 1.0))
            .unwrap();
        assert!(added);
        // Same key in the same batch updates the same row
        let (again, added) = table
            .upsert("AAPL".into(), |w| w.set_by_name("price", 2.0))
            .unwrap();
        assert!(!added);
        assert_eq!(row, again);
        assert_eq!(table.get_by_name(row, "symbol").unwrap(), Value::from("AAPL"));
        assert_eq!(table.get_by_name(row, "price").unwrap(), Value::Float64(2.0));
        table.fire_changes();

        table
            .upsert("AAPL".into(), |w| w.set_by_name("price", 3.0))
            .unwrap();
        table.fire_changes();

        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Added(vec![row]),
                OutputEvent::Changed(vec![row], vec![1]),
            ]
        );
    }

    #[test]
    fn test_key_fields_locked() {
        let mut table = prices();
        let err = table
            .upsert("MSFT".into(), |w| w.set_by_name("symbol", "IBM"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
        assert!(table.is_empty());
        assert_eq!(table.lookup(&"MSFT".into()), None);
    }

    #[test]
    fn test_remove_by_key() {
        let mut table = prices();
        let (row, _) = table.upsert("A".into(), |_| Ok(())).unwrap();
        table.fire_changes();

        assert_eq!(table.remove(&"A".into()).unwrap(), Some(row));
        assert_eq!(table.remove(&"A".into()).unwrap(), None);
        assert!(!table.is_live(row));
        table.fire_changes();

        let (reused, added) = table.upsert("B".into(), |_| Ok(())).unwrap();
        assert!(added);
        assert_eq!(reused, row);
        assert_eq!(table.get(reused, 0).unwrap(), Value::from("B"));
    }

    #[test]
    fn test_struct_table() {
        let schema = SchemaBuilder::new("book")
            .add_field("venue", DataType::String)
            .unwrap()
            .add_field("level", DataType::Int32)
            .unwrap()
            .add_field("qty", DataType::Int64)
            .unwrap()
            .build();
        let mut table: IndexedStructTable =
            IndexedTable::new(schema, &["venue", "level"]).unwrap();

        let key = TupleKey::new(vec![Value::from("X"), Value::Int32(1)]);
        let (row, _) = table.upsert(key.clone(), |w| w.set(2, 10i64)).unwrap();
        assert_eq!(table.get(row, 1).unwrap(), Value::Int32(1));
        assert_eq!(table.lookup(&key), Some(row));

        let short = TupleKey::new(vec![Value::from("X")]);
        assert!(table.upsert(short, |_| Ok(())).is_err());

        let wrong_type = TupleKey::new(vec![Value::from("X"), Value::Int64(1)]);
        assert!(matches!(
            table.upsert(wrong_type, |_| Ok(())),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_key_field() {
        let schema = SchemaBuilder::new("t")
            .add_field("a", DataType::Int32)
            .unwrap()
            .build();
        assert!(IndexedTable::<i32>::new(schema, &["b"]).is_err());
    }
}
