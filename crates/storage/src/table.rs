//! Tables: a schema, its row store and the output that publishes changes.
//!
//! Mutations are accumulated into a [`ChangeSet`] and delivered to attached
//! inputs by [`Table::fire_changes`]. A removed row id is not reused before
//! the batch that removed it has been fired.

use crate::row_store::RowStore;
use alloc::format;
use alloc::rc::Rc;
use core::cell::RefCell;
use strata_core::schema::{Schema, SchemaRef};
use strata_core::{Error, FieldId, FieldSet, Result, RowId, Value};
use strata_reactive::{ChangeSet, OutputManager, TransformOutput};

/// Writes field values into one row during an insert or update.
pub struct RowWriter<'a> {
    schema: &'a Schema,
    row: RowId,
    locked: &'a [FieldId],
    written: FieldSet,
}

impl<'a> RowWriter<'a> {
    pub(crate) fn new(schema: &'a Schema, row: RowId, locked: &'a [FieldId]) -> Self {
        Self {
            schema,
            row,
            locked,
            written: FieldSet::new(),
        }
    }

    /// Returns the row being written.
    #[inline]
    pub fn row(&self) -> RowId {
        self.row
    }

    /// Writes a value by field id.
    pub fn set(&mut self, field: FieldId, value: impl Into<Value>) -> Result<()> {
        let target = self
            .schema
            .field(field)
            .ok_or_else(|| Error::field_not_found(format!("#{}", field)))?;
        if self.locked.contains(&field) {
            return Err(Error::invalid_operation(format!(
                "Key field {} cannot be written",
                target.name()
            )));
        }
        target.field_mut().set(self.row, value.into())?;
        self.written.insert(field);
        Ok(())
    }

    /// Writes a value by field name.
    pub fn set_by_name(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let field = self
            .schema
            .field_id(name)
            .ok_or_else(|| Error::field_not_found(name))?;
        self.set(field, value)
    }

    pub(crate) fn finish(self) -> FieldSet {
        self.written
    }
}

/// A table publishing its rows through a [`TransformOutput`].
pub struct Table {
    schema: SchemaRef,
    rows: Rc<RefCell<RowStore>>,
    changes: ChangeSet,
    output: OutputManager,
}

impl Table {
    /// Creates an empty table and publishes its schema.
    pub fn new(schema: Schema) -> Self {
        let schema = Rc::new(schema);
        let rows = Rc::new(RefCell::new(RowStore::new()));
        let output = OutputManager::with_schema(rows.clone(), schema.clone());
        Self {
            schema,
            rows,
            changes: ChangeSet::new(),
            output,
        }
    }

    /// Returns the current schema.
    #[inline]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns a handle for attaching inputs.
    #[inline]
    pub fn output(&self) -> TransformOutput {
        self.output.output()
    }

    /// Inserts a new row and records it as added.
    ///
    /// If `write` fails the row is released and nothing is recorded.
    pub fn insert<F>(&mut self, write: F) -> Result<RowId>
    where
        F: FnOnce(&mut RowWriter<'_>) -> Result<()>,
    {
        let row = self.rows.borrow_mut().allocate();
        if let Err(err) = self.write_row(row, &[], write) {
            self.release(row);
            return Err(err);
        }
        self.changes.add_row(row);
        Ok(row)
    }

    /// Updates a live row and records the fields written as changed.
    pub fn update<F>(&mut self, row: RowId, write: F) -> Result<FieldSet>
    where
        F: FnOnce(&mut RowWriter<'_>) -> Result<()>,
    {
        self.update_locked(row, &[], write)
    }

    /// Removes a live row and records it as removed.
    pub fn remove(&mut self, row: RowId) -> Result<()> {
        self.rows.borrow_mut().retire(row)?;
        self.changes.remove_row(row);
        Ok(())
    }

    /// Reads a value; rows that are not live read as absent.
    pub fn get(&self, row: RowId, field: FieldId) -> Result<Value> {
        let target = self
            .schema
            .field(field)
            .ok_or_else(|| Error::field_not_found(format!("#{}", field)))?;
        if !self.is_live(row) {
            return Ok(Value::absent(target.data_type()));
        }
        Ok(target.value(row))
    }

    /// Reads a value by field name; rows that are not live read as absent.
    pub fn get_by_name(&self, row: RowId, name: &str) -> Result<Value> {
        let field = self.schema.require(name)?.id();
        self.get(row, field)
    }

    /// Returns true if the row is live.
    #[inline]
    pub fn is_live(&self, row: RowId) -> bool {
        self.rows.borrow().is_live(row)
    }

    /// Returns the number of live rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.borrow().len()
    }

    /// Returns true if no row is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.borrow().is_empty()
    }

    /// Returns true if changes are waiting to be fired.
    #[inline]
    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Replaces the schema, keeping live rows.
    ///
    /// Values of fields whose name and type are unchanged are carried over.
    /// Inputs receive the new schema and every live row as added on the next
    /// `fire_changes`; pending changed and removed rows are not reported.
    pub fn replace_schema(&mut self, schema: Schema) {
        let live = self.rows.borrow().live_rows();
        for field in schema.fields() {
            let Some(old) = self.schema.field_by_name(field.name()) else {
                continue;
            };
            if old.data_type() != field.data_type() {
                continue;
            }
            let source = old.field();
            let mut target = field.field_mut();
            for &row in &live {
                // Same data type on both sides
                let _ = target.set(row, source.get(row));
            }
        }
        self.schema = Rc::new(schema);
        self.output.update_schema(Some(self.schema.clone()));
    }

    /// Delivers accumulated changes to attached inputs.
    ///
    /// Storage of rows removed in this batch is cleared and their ids become
    /// reusable afterwards.
    pub fn fire_changes(&mut self) {
        let changes = self.changes.take();
        self.output.fire(&changes);

        let mut rows = self.rows.borrow_mut();
        for &row in rows.retired() {
            for field in self.schema.fields() {
                field.field_mut().reset(row);
            }
        }
        rows.recycle();
    }

    pub(crate) fn rows_mut(&self) -> core::cell::RefMut<'_, RowStore> {
        self.rows.borrow_mut()
    }

    pub(crate) fn record_added(&mut self, row: RowId) {
        self.changes.add_row(row);
    }

    pub(crate) fn update_locked<F>(
        &mut self,
        row: RowId,
        locked: &[FieldId],
        write: F,
    ) -> Result<FieldSet>
    where
        F: FnOnce(&mut RowWriter<'_>) -> Result<()>,
    {
        if !self.is_live(row) {
            return Err(Error::invalid_row(row));
        }
        let (written, result) = {
            let mut writer = RowWriter::new(&self.schema, row, locked);
            let result = write(&mut writer);
            (writer.finish(), result)
        };
        // Fields written before a failure still changed
        self.changes.change_fields(row, &written);
        result.map(|_| written)
    }

    /// Writes into a row that is not yet reported.
    pub(crate) fn write_row<F>(&mut self, row: RowId, locked: &[FieldId], write: F) -> Result<()>
    where
        F: FnOnce(&mut RowWriter<'_>) -> Result<()>,
    {
        let mut writer = RowWriter::new(&self.schema, row, locked);
        write(&mut writer)
    }

    /// Clears and frees a row that was never reported.
    pub(crate) fn release(&mut self, row: RowId) {
        for field in self.schema.fields() {
            field.field_mut().reset(row);
        }
        let _ = self.rows.borrow_mut().free(row);
    }
}

impl core::fmt::Debug for Table {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Table")
            .field("schema", &self.schema.name())
            .field("rows", &self.len())
            .field("pending", &self.changes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use strata_core::schema::SchemaBuilder;
    use strata_core::DataType;
    use strata_reactive::{EventRecorder, OutputEvent};

    fn people() -> Table {
        Table::new(
            SchemaBuilder::new("people")
                .add_field("id", DataType::Int32)
                .unwrap()
                .add_field("name", DataType::String)
                .unwrap()
                .build(),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = people();
        let row = table
            .insert(|w| {
                w.set(0, 1)?;
                w.set_by_name("name", "a")
            })
            .unwrap();
        assert!(table.is_live(row));
        assert_eq!(table.get(row, 0).unwrap(), Value::Int32(1));
        assert_eq!(table.get_by_name(row, "name").unwrap(), Value::from("a"));
        assert!(table.get_by_name(row, "age").is_err());
    }

    #[test]
    fn test_insert_failure_releases_row() {
        let mut table = people();
        let err = table
            .insert(|w| {
                w.set(0, 1)?;
                w.set(1, 2i64)
            })
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert!(table.is_empty());
        assert!(!table.has_pending_changes());

        let row = table.insert(|_| Ok(())).unwrap();
        assert_eq!(row, 0);
        assert_eq!(table.get(row, 0).unwrap(), Value::Int32(0));
    }

    #[test]
    fn test_update_requires_live_row() {
        let mut table = people();
        assert_eq!(
            table.update(3, |w| w.set(0, 1)).unwrap_err(),
            Error::invalid_row(3)
        );
    }

    #[test]
    fn test_fire_changes_batches() {
        let mut table = people();
        let recorder = EventRecorder::shared();
        table.output().attach_input(recorder.clone());

        let a = table.insert(|w| w.set(0, 1)).unwrap();
        table.update(a, |w| w.set(1, "x")).unwrap();
        table.fire_changes();

        let b = table.insert(|w| w.set(0, 2)).unwrap();
        table.update(a, |w| w.set(1, "y")).unwrap();
        table.fire_changes();

        table.remove(a).unwrap();
        table.fire_changes();

        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Source(true),
                OutputEvent::Schema(Some("people".into())),
                OutputEvent::Added(vec![a]),
                OutputEvent::Added(vec![b]),
                OutputEvent::Changed(vec![a], vec![1]),
                OutputEvent::Removed(vec![a]),
            ]
        );
    }

    #[test]
    fn test_removed_row_reads_absent_and_is_reused_after_fire() {
        let mut table = people();
        let a = table.insert(|w| w.set_by_name("name", "b")).unwrap();
        table.fire_changes();

        table.remove(a).unwrap();
        assert_eq!(table.get(a, 1).unwrap(), Value::from(""));
        // Not reused inside the removing batch
        let b = table.insert(|_| Ok(())).unwrap();
        assert_ne!(a, b);
        table.fire_changes();

        let c = table.insert(|_| Ok(())).unwrap();
        assert_eq!(c, a);
        assert_eq!(table.get(c, 1).unwrap(), Value::from(""));
        assert_eq!(table.remove(99), Err(Error::invalid_row(99)));
    }

    #[test]
    fn test_replace_schema_carries_values() {
        let mut table = people();
        let a = table
            .insert(|w| {
                w.set(0, 5)?;
                w.set(1, "n")
            })
            .unwrap();
        table.fire_changes();

        let recorder = EventRecorder::shared();
        table.output().attach_input(recorder.clone());
        recorder.borrow_mut().clear();

        table.replace_schema(
            SchemaBuilder::new("people")
                .add_field("name", DataType::String)
                .unwrap()
                .add_field("id", DataType::Int64)
                .unwrap()
                .build(),
        );
        table.fire_changes();

        assert_eq!(table.get_by_name(a, "name").unwrap(), Value::from("n"));
        assert_eq!(table.get_by_name(a, "id").unwrap(), Value::Int64(0));
        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Schema(Some("people".into())),
                OutputEvent::Added(vec![a]),
            ]
        );
    }

    #[test]
    fn test_attach_before_first_fire() {
        let mut table = people();
        let row = table.insert(|w| w.set(0, 1)).unwrap();
        let recorder = EventRecorder::shared();
        table.output().attach_input(recorder.clone());
        table.fire_changes();

        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Source(true),
                OutputEvent::Schema(Some("people".into())),
                OutputEvent::Added(vec![row]),
            ]
        );
    }

    #[test]
    fn test_attach_with_pending_mutations() {
        let mut table = people();
        let a = table.insert(|w| w.set(0, 1)).unwrap();
        let b = table.insert(|w| w.set(0, 2)).unwrap();
        table.fire_changes();

        table.remove(a).unwrap();
        let c = table.insert(|w| w.set(0, 3)).unwrap();
        table.update(b, |w| w.set(1, "x")).unwrap();

        let recorder = EventRecorder::shared();
        table.output().attach_input(recorder.clone());
        assert_eq!(table.output().live_rows(), vec![a, b]);
        table.fire_changes();

        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Source(true),
                OutputEvent::Schema(Some("people".into())),
                OutputEvent::Added(vec![a, b]),
                OutputEvent::Added(vec![c]),
                OutputEvent::Changed(vec![b], vec![1]),
                OutputEvent::Removed(vec![a]),
            ]
        );
        assert_eq!(recorder.borrow().live_rows(), vec![b, c]);
        assert_eq!(table.output().live_rows(), vec![b, c]);
    }

    #[test]
    fn test_attach_with_pending_schema_replacement() {
        let mut table = people();
        let row = table.insert(|w| w.set(0, 1)).unwrap();
        table.fire_changes();
        table.replace_schema(
            SchemaBuilder::new("people2")
                .add_field("id", DataType::Int32)
                .unwrap()
                .build(),
        );

        let recorder = EventRecorder::shared();
        table.output().attach_input(recorder.clone());
        table.fire_changes();

        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Source(true),
                OutputEvent::Schema(Some("people".into())),
                OutputEvent::Added(vec![row]),
                OutputEvent::Schema(Some("people2".into())),
                OutputEvent::Added(vec![row]),
            ]
        );
    }
}
