//! Schema module for Strata.
//!
//! A schema is an ordered, named list of fields. Each field owns its columnar
//! storage, so a schema doubles as the data holder of a table.

mod field;
mod metadata;
mod table;

pub use field::SchemaField;
pub use metadata::Metadata;
pub use table::{Schema, SchemaBuilder, SchemaRef};
