//! Input that records what it receives.

use crate::output::{TransformInput, TransformOutput};
use alloc::collections::BTreeSet;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use strata_core::schema::SchemaRef;
use strata_core::{FieldId, FieldSet, RowId};

/// One callback received by an [`EventRecorder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// `set_source`; true when attached.
    Source(bool),
    /// `schema_updated` with the schema name.
    Schema(Option<String>),
    Added(Vec<RowId>),
    Changed(Vec<RowId>, Vec<FieldId>),
    Removed(Vec<RowId>),
}

/// A `TransformInput` that logs every callback and mirrors the live row set.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Vec<OutputEvent>,
    schema: Option<SchemaRef>,
    live: BTreeSet<RowId>,
}

impl EventRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder ready to attach as an input.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Returns the recorded events in arrival order.
    #[inline]
    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    /// Takes the recorded events.
    pub fn take_events(&mut self) -> Vec<OutputEvent> {
        core::mem::take(&mut self.events)
    }

    /// Forgets recorded events; the mirrored state is kept.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Returns the last schema received.
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    /// Returns the rows currently live according to the notifications.
    pub fn live_rows(&self) -> Vec<RowId> {
        self.live.iter().copied().collect()
    }
}

impl TransformInput for EventRecorder {
    fn set_source(&mut self, source: Option<&TransformOutput>) {
        self.events.push(OutputEvent::Source(source.is_some()));
    }

    fn schema_updated(&mut self, schema: Option<SchemaRef>) {
        self.events
            .push(OutputEvent::Schema(schema.as_ref().map(|s| String::from(s.name()))));
        self.schema = schema;
        self.live.clear();
    }

    fn rows_added(&mut self, rows: &[RowId]) {
        self.live.extend(rows.iter().copied());
        self.events.push(OutputEvent::Added(rows.to_vec()));
    }

    fn rows_changed(&mut self, rows: &[RowId], fields: &FieldSet) {
        self.events
            .push(OutputEvent::Changed(rows.to_vec(), fields.iter().collect()));
    }

    fn rows_removed(&mut self, rows: &[RowId]) {
        for row in rows {
            self.live.remove(row);
        }
        self.events.push(OutputEvent::Removed(rows.to_vec()));
    }
}
