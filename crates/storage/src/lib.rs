//! Strata Storage - Row storage for Strata tables.
//!
//! This crate provides the storage layer including:
//!
//! - `RowStore`: Row id allocation, LIFO reuse and liveness
//! - `RowInterner`: Key to row id interning
//! - `Table`: A schema, its rows and the output that publishes their changes
//! - `IndexedTable` / `IndexedStructTable`: Tables keyed by one or more fields
//!
//! # Example
//!
//! ```rust
//! use strata_core::schema::SchemaBuilder;
//! use strata_core::{DataType, Value};
//! use strata_reactive::EventRecorder;
//! use strata_storage::IndexedTable;
//!
//! let schema = SchemaBuilder::new("prices")
//!     .add_field("symbol", DataType::String)
//!     .unwrap()
//!     .add_field("price", DataType::Float64)
//!     .unwrap()
//!     .build();
//! let mut table: IndexedTable<String> = IndexedTable::new(schema, &["symbol"]).unwrap();
//!
//! let recorder = EventRecorder::shared();
//! table.output().attach_input(recorder.clone());
//!
//! let (row, added) = table
//!     .upsert("AAPL".into(), |w| w.set_by_name("price", 187.5))
//!     .unwrap();
//! table.fire_changes();
//!
//! assert!(added);
//! assert_eq!(table.get(row, 1).unwrap(), Value::Float64(187.5));
//! assert_eq!(recorder.borrow().live_rows(), vec![row]);
//! ```

#![no_std]

extern crate alloc;

pub mod indexed;
pub mod interner;
pub mod row_store;
pub mod table;

pub use indexed::{IndexedStructTable, IndexedTable};
pub use interner::{RowInterner, TableKey, TupleKey};
pub use row_store::RowStore;
pub use table::{RowWriter, Table};
