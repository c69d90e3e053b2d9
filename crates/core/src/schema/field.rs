//! Schema field definition.

use super::metadata::Metadata;
use crate::field::Field;
use crate::row::{FieldId, RowId};
use crate::types::DataType;
use crate::value::Value;
use alloc::string::String;
use core::cell::{Ref, RefCell, RefMut};

/// A named, typed field of a schema together with its storage.
#[derive(Debug)]
pub struct SchemaField {
    id: FieldId,
    name: String,
    data_type: DataType,
    metadata: Metadata,
    storage: RefCell<Field>,
}

impl SchemaField {
    pub(crate) fn new(id: FieldId, name: String, data_type: DataType, metadata: Metadata) -> Self {
        Self {
            id,
            name,
            data_type,
            metadata,
            storage: RefCell::new(Field::new(data_type)),
        }
    }

    /// Returns the position of this field within its schema.
    #[inline]
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Returns the field name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the tags and attributes describing this field.
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Borrows the field storage for reading.
    ///
    /// Panics if the storage is currently borrowed mutably.
    pub fn field(&self) -> Ref<'_, Field> {
        self.storage.borrow()
    }

    /// Borrows the field storage for writing.
    ///
    /// Panics if the storage is currently borrowed.
    pub fn field_mut(&self) -> RefMut<'_, Field> {
        self.storage.borrow_mut()
    }

    /// Reads one row as a dynamic value.
    pub fn value(&self, row: RowId) -> Value {
        self.storage.borrow().get(row)
    }
}
