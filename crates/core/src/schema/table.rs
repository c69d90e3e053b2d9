//! Schema and schema builder.

use super::field::SchemaField;
use super::metadata::Metadata;
use crate::error::{Error, Result};
use crate::types::DataType;
use crate::row::FieldId;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;

/// Shared handle to a schema. Outputs hand these to their inputs.
pub type SchemaRef = Rc<Schema>;

/// An ordered list of uniquely named fields.
#[derive(Debug)]
pub struct Schema {
    name: String,
    fields: Vec<SchemaField>,
    by_name: HashMap<String, FieldId>,
}

impl Schema {
    /// Returns the schema name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all fields in id order.
    #[inline]
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Returns the number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolves a field name to its id.
    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).copied()
    }

    /// Returns a field by id.
    #[inline]
    pub fn field(&self, id: FieldId) -> Option<&SchemaField> {
        self.fields.get(id)
    }

    /// Returns a field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&SchemaField> {
        self.field_id(name).and_then(|id| self.fields.get(id))
    }

    /// Returns a field by name, or `FieldNotFound`.
    pub fn require(&self, name: &str) -> Result<&SchemaField> {
        self.field_by_name(name)
            .ok_or_else(|| Error::field_not_found(name))
    }
}

/// Builder for [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<SchemaField>,
    by_name: HashMap<String, FieldId>,
}

impl SchemaBuilder {
    /// Creates a builder for a schema with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Appends a field. Names must be non-empty and unique.
    pub fn add_field(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.add_field_with(name, data_type, Metadata::new())
    }

    /// Appends a field carrying metadata.
    pub fn add_field_with(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        metadata: Metadata,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_schema("Field name cannot be empty"));
        }
        if self.by_name.contains_key(&name) {
            return Err(Error::invalid_schema(format!(
                "Field already exists: {}",
                name
            )));
        }
        let id = self.fields.len();
        self.by_name.insert(name.clone(), id);
        self.fields.push(SchemaField::new(id, name, data_type, metadata));
        Ok(self)
    }

    /// Finishes the schema.
    pub fn build(self) -> Schema {
        Schema {
            name: self.name,
            fields: self.fields,
            by_name: self.by_name,
        }
    }

    /// Finishes the schema as a shared handle.
    pub fn build_ref(self) -> SchemaRef {
        Rc::new(self.build())
    }
}
