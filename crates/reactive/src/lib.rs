//! Strata Reactive - Push dataflow for Strata.
//!
//! This crate implements the contract between outputs, which own a schema and
//! a row set, and the inputs attached to them. Every mutation cycle produces
//! one change batch that is pushed synchronously to each input.
//!
//! # Core Concepts
//!
//! - `ChangeSet`: Rows added, changed and removed during one mutation cycle
//! - `TransformInput`: Receives schema and row notifications
//! - `OutputManager`: Owner side of an output; publishes schemas and fires batches
//! - `TransformOutput`: Handle for attaching and detaching inputs
//! - `EventRecorder`: An input that records what it receives
//!
//! # Example
//!
//! ```ignore
//! use strata_reactive::{ChangeSet, EventRecorder, OutputManager};
//!
//! let manager = OutputManager::new(rows);
//! manager.update_schema(Some(schema));
//!
//! // Attaching replays the schema and the current rows
//! let recorder = EventRecorder::shared();
//! manager.output().attach_input(recorder.clone());
//!
//! let mut changes = ChangeSet::new();
//! changes.add_row(4);
//! manager.fire(&changes);
//! ```

#![no_std]

extern crate alloc;

pub mod change_set;
pub mod output;
pub mod recorder;

pub use change_set::ChangeSet;
pub use output::{
    InputRef, OutputManager, RowProvider, RowsRef, TransformInput, TransformOutput,
};
pub use recorder::{EventRecorder, OutputEvent};
