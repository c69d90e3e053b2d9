//! Strata Core - Core types, columnar fields and schemas for Strata.
//!
//! This crate provides the foundational types for the Strata dataflow engine:
//!
//! - `DataType`: The closed set of primitive field types
//! - `Value`: Dynamically typed cell values
//! - `Column` / `Field`: Growable per-row columnar storage
//! - `FieldSet`: Bitsets of field ids used in change notifications
//! - `schema`: Named field lists that own their storage
//! - `Error`: Error types shared by every Strata crate
//!
//! # Example
//!
//! ```rust
//! use strata_core::{DataType, Value};
//! use strata_core::schema::SchemaBuilder;
//!
//! let schema = SchemaBuilder::new("orders")
//!     .add_field("id", DataType::Int64)
//!     .unwrap()
//!     .add_field("price", DataType::Float64)
//!     .unwrap()
//!     .build();
//!
//! let price = schema.field_by_name("price").unwrap();
//! price.field_mut().set(0, Value::Float64(10.5)).unwrap();
//!
//! assert_eq!(price.value(0), Value::Float64(10.5));
//! // Rows never written read as the absent value
//! assert_eq!(price.value(7), Value::Float64(0.0));
//! ```

#![no_std]

extern crate alloc;

mod error;
mod field;
mod field_set;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use field::{Column, Field, Primitive};
pub use field_set::FieldSet;
pub use row::{FieldId, RowId};
pub use types::DataType;
pub use value::Value;
