//! Push dataflow between outputs and inputs.
//!
//! An output owns a schema and a row set and pushes every change batch to
//! its attached inputs in one synchronous pass. A stage that both consumes
//! and produces implements [`TransformInput`] and owns an [`OutputManager`].
//!
//! An output replays to new inputs what it has published with its last
//! `fire`, not the owner's unfired mutations. Those arrive with the next
//! batch like they do for every other input.

use crate::change_set::ChangeSet;
use alloc::collections::BTreeSet;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use strata_core::schema::SchemaRef;
use strata_core::{FieldSet, RowId};

/// Receives schema and row notifications from an upstream output.
pub trait TransformInput {
    /// Called with the output on attach and `None` on detach.
    fn set_source(&mut self, _source: Option<&TransformOutput>) {}

    /// Called when the upstream schema is published, replaced or withdrawn.
    fn schema_updated(&mut self, schema: Option<SchemaRef>);

    /// Called with rows that became live.
    fn rows_added(&mut self, rows: &[RowId]);

    /// Called with live rows whose values changed, and the union of changed fields.
    fn rows_changed(&mut self, rows: &[RowId], fields: &FieldSet);

    /// Called with rows that are no longer live.
    fn rows_removed(&mut self, rows: &[RowId]);
}

/// Shared handle to an attached input.
pub type InputRef = Rc<RefCell<dyn TransformInput>>;

/// Source of the live row set an output publishes on a schema reset.
pub trait RowProvider {
    /// Returns live row ids in ascending order.
    fn live_rows(&self) -> Vec<RowId>;

    /// Returns the number of live rows.
    fn row_count(&self) -> usize;
}

/// Shared handle to a row provider.
pub type RowsRef = Rc<RefCell<dyn RowProvider>>;

#[inline]
fn input_key(input: &InputRef) -> usize {
    Rc::as_ptr(input) as *const () as usize
}

struct OutputState {
    inputs: RefCell<Vec<InputRef>>,
    /// Latest schema, delivered on the next fire when dirty.
    schema: RefCell<Option<SchemaRef>>,
    schema_dirty: Cell<bool>,
    /// Schema and rows as of the last fire.
    published_schema: RefCell<Option<SchemaRef>>,
    published_rows: RefCell<BTreeSet<RowId>>,
    firing: Cell<bool>,
    /// Inputs detached during the current pass.
    skipped: RefCell<BTreeSet<usize>>,
    /// Detached inputs still owed `schema_updated(None)` and `set_source(None)`.
    pending_detach: RefCell<Vec<InputRef>>,
    rows: RowsRef,
}

/// Cloneable handle through which inputs attach to an output.
#[derive(Clone)]
pub struct TransformOutput {
    state: Rc<OutputState>,
}

impl TransformOutput {
    /// Attaches an input and replays the published state to it.
    ///
    /// The input receives `set_source`, then `schema_updated` and a single
    /// `rows_added` with every published row if a schema is published.
    /// Attaching an input twice is a no-op.
    pub fn attach_input(&self, input: InputRef) {
        if self.is_attached(&input) {
            return;
        }
        self.state.inputs.borrow_mut().push(input.clone());

        {
            let mut target = input.borrow_mut();
            target.set_source(Some(self));
            let schema = self.state.published_schema.borrow().clone();
            if let Some(schema) = schema {
                target.schema_updated(Some(schema));
                let rows = self.live_rows();
                if !rows.is_empty() && self.is_attached(&input) {
                    target.rows_added(&rows);
                }
            }
        }
        if !self.state.firing.get() {
            self.flush_detached();
        }
    }

    /// Detaches an input. Returns false if it was not attached.
    ///
    /// The input receives `schema_updated(None)` then `set_source(None)`. An
    /// input detaching itself from inside one of its callbacks receives them
    /// once that callback has returned.
    pub fn detach_input(&self, input: &InputRef) -> bool {
        let removed = {
            let mut inputs = self.state.inputs.borrow_mut();
            match inputs.iter().position(|i| input_key(i) == input_key(input)) {
                Some(idx) => Some(inputs.remove(idx)),
                None => None,
            }
        };
        let Some(removed) = removed else {
            return false;
        };
        if self.state.firing.get() {
            self.state.skipped.borrow_mut().insert(input_key(&removed));
        }

        match removed.try_borrow_mut() {
            Ok(mut target) => {
                target.schema_updated(None);
                target.set_source(None);
            }
            Err(_) => self.state.pending_detach.borrow_mut().push(removed.clone()),
        }
        if !self.state.firing.get() {
            self.flush_detached();
        }
        true
    }

    /// Returns true if the input is currently attached.
    pub fn is_attached(&self, input: &InputRef) -> bool {
        self.state
            .inputs
            .borrow()
            .iter()
            .any(|i| input_key(i) == input_key(input))
    }

    /// Returns the published schema, if any.
    pub fn schema(&self) -> Option<SchemaRef> {
        self.state.published_schema.borrow().clone()
    }

    /// Returns the published rows in ascending order.
    pub fn live_rows(&self) -> Vec<RowId> {
        self.state.published_rows.borrow().iter().copied().collect()
    }

    /// Returns the number of published rows.
    pub fn row_count(&self) -> usize {
        self.state.published_rows.borrow().len()
    }

    /// Returns the number of attached inputs.
    pub fn input_count(&self) -> usize {
        self.state.inputs.borrow().len()
    }

    /// Delivers owed detach notifications to inputs no longer borrowed.
    fn flush_detached(&self) {
        let pending = core::mem::take(&mut *self.state.pending_detach.borrow_mut());
        let mut busy = Vec::new();
        for input in pending {
            let delivered = match input.try_borrow_mut() {
                Ok(mut target) => {
                    target.schema_updated(None);
                    target.set_source(None);
                    true
                }
                Err(_) => false,
            };
            if !delivered {
                busy.push(input);
            }
        }
        self.state.pending_detach.borrow_mut().extend(busy);
    }
}

impl core::fmt::Debug for TransformOutput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransformOutput")
            .field("inputs", &self.input_count())
            .field("rows", &self.row_count())
            .finish()
    }
}

/// Owner side of an output: publishes schemas and fires change batches.
pub struct OutputManager {
    output: TransformOutput,
}

impl OutputManager {
    /// Creates an output over the given row provider, with no schema.
    pub fn new(rows: RowsRef) -> Self {
        Self {
            output: TransformOutput {
                state: Rc::new(OutputState {
                    inputs: RefCell::new(Vec::new()),
                    schema: RefCell::new(None),
                    schema_dirty: Cell::new(false),
                    published_schema: RefCell::new(None),
                    published_rows: RefCell::new(BTreeSet::new()),
                    firing: Cell::new(false),
                    skipped: RefCell::new(BTreeSet::new()),
                    pending_detach: RefCell::new(Vec::new()),
                    rows,
                }),
            },
        }
    }

    /// Creates an output that publishes `schema` and the provider's current
    /// rows right away, so inputs attached before the first `fire` see them.
    pub fn with_schema(rows: RowsRef, schema: SchemaRef) -> Self {
        let manager = Self::new(rows);
        let state = &manager.output.state;
        *state.published_rows.borrow_mut() = state.rows.borrow().live_rows().into_iter().collect();
        *state.schema.borrow_mut() = Some(schema.clone());
        *state.published_schema.borrow_mut() = Some(schema);
        manager
    }

    /// Returns a handle for attaching inputs.
    #[inline]
    pub fn output(&self) -> TransformOutput {
        self.output.clone()
    }

    /// Replaces the schema, delivered on the next `fire`.
    ///
    /// Until then new inputs are replayed the previously published schema.
    pub fn update_schema(&self, schema: Option<SchemaRef>) {
        *self.output.state.schema.borrow_mut() = schema;
        self.output.state.schema_dirty.set(true);
    }

    /// Delivers a change batch to every attached input, in attachment order.
    ///
    /// If the schema was replaced since the last pass, inputs receive the new
    /// schema and the full live row set as added, and the batch's changed and
    /// removed rows are dropped.
    pub fn fire(&self, changes: &ChangeSet) {
        let state = &self.output.state;
        let schema_reset = state.schema_dirty.replace(false);
        if !schema_reset && changes.is_empty() {
            return;
        }

        let schema = state.schema.borrow().clone();
        let (added, changed, removed) = if schema_reset {
            let rows = match schema {
                Some(_) => state.rows.borrow().live_rows(),
                None => Vec::new(),
            };
            *state.published_schema.borrow_mut() = schema.clone();
            *state.published_rows.borrow_mut() = rows.iter().copied().collect();
            (rows, Vec::new(), Vec::new())
        } else {
            let mut published = state.published_rows.borrow_mut();
            published.extend(changes.added_rows().iter().copied());
            for row in changes.removed_rows() {
                published.remove(row);
            }
            (changes.added_vec(), changes.changed_vec(), changes.removed_vec())
        };
        let fields = if changed.is_empty() {
            FieldSet::new()
        } else {
            changes.changed_fields()
        };

        let snapshot: Vec<InputRef> = state.inputs.borrow().clone();
        state.firing.set(true);
        for input in &snapshot {
            let key = input_key(input);
            let live = || !state.skipped.borrow().contains(&key);
            if !live() {
                continue;
            }
            if schema_reset {
                input.borrow_mut().schema_updated(schema.clone());
            }
            if !added.is_empty() && live() {
                input.borrow_mut().rows_added(&added);
            }
            if !changed.is_empty() && live() {
                input.borrow_mut().rows_changed(&changed, &fields);
            }
            if !removed.is_empty() && live() {
                input.borrow_mut().rows_removed(&removed);
            }
        }
        state.firing.set(false);
        state.skipped.borrow_mut().clear();
        self.output.flush_detached();
    }
}

impl core::fmt::Debug for OutputManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OutputManager")
            .field("output", &self.output)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{EventRecorder, OutputEvent};
    use alloc::collections::BTreeSet;
    use alloc::vec;
    use strata_core::schema::SchemaBuilder;
    use strata_core::DataType;

    struct Rows(BTreeSet<RowId>);

    impl RowProvider for Rows {
        fn live_rows(&self) -> Vec<RowId> {
            self.0.iter().copied().collect()
        }

        fn row_count(&self) -> usize {
            self.0.len()
        }
    }

    fn setup(live: &[RowId]) -> (OutputManager, Rc<RefCell<Rows>>) {
        let rows = Rc::new(RefCell::new(Rows(live.iter().copied().collect())));
        let manager = OutputManager::new(rows.clone());
        let schema = SchemaBuilder::new("t")
            .add_field("id", DataType::Int32)
            .unwrap()
            .build_ref();
        manager.update_schema(Some(schema));
        manager.fire(&ChangeSet::new());
        (manager, rows)
    }

    #[test]
    fn test_attach_replays_state() {
        let (manager, _) = setup(&[1, 2, 5]);
        let recorder = EventRecorder::shared();
        manager.output().attach_input(recorder.clone());

        let events = recorder.borrow().events().to_vec();
        assert_eq!(
            events,
            vec![
                OutputEvent::Source(true),
                OutputEvent::Schema(Some("t".into())),
                OutputEvent::Added(vec![1, 2, 5]),
            ]
        );
    }

    #[test]
    fn test_attach_twice_is_noop() {
        let (manager, _) = setup(&[1]);
        let recorder = EventRecorder::shared();
        let input: InputRef = recorder.clone();
        manager.output().attach_input(input.clone());
        manager.output().attach_input(input);
        assert_eq!(manager.output().input_count(), 1);
        assert_eq!(recorder.borrow().events().len(), 3);
    }

    #[test]
    fn test_fire_order_and_omission() {
        let (manager, rows) = setup(&[]);
        let recorder = EventRecorder::shared();
        manager.output().attach_input(recorder.clone());
        recorder.borrow_mut().clear();

        rows.borrow_mut().0.insert(7);
        let mut cs = ChangeSet::new();
        cs.add_row(7);
        cs.change_field(3, 0);
        cs.remove_row(4);
        manager.fire(&cs);

        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Added(vec![7]),
                OutputEvent::Changed(vec![3], vec![0]),
                OutputEvent::Removed(vec![4]),
            ]
        );

        recorder.borrow_mut().clear();
        let mut cs = ChangeSet::new();
        cs.remove_row(7);
        manager.fire(&cs);
        assert_eq!(recorder.borrow().events(), &[OutputEvent::Removed(vec![7])]);

        recorder.borrow_mut().clear();
        manager.fire(&ChangeSet::new());
        assert!(recorder.borrow().events().is_empty());
    }

    #[test]
    fn test_schema_replacement_resets() {
        let (manager, _) = setup(&[0, 1]);
        let recorder = EventRecorder::shared();
        manager.output().attach_input(recorder.clone());
        recorder.borrow_mut().clear();

        let schema = SchemaBuilder::new("t2").build_ref();
        manager.update_schema(Some(schema));
        let mut cs = ChangeSet::new();
        cs.change_field(0, 0);
        manager.fire(&cs);

        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Schema(Some("t2".into())),
                OutputEvent::Added(vec![0, 1]),
            ]
        );
    }

    #[test]
    fn test_detach_notifies() {
        let (manager, _) = setup(&[1]);
        let recorder = EventRecorder::shared();
        let input: InputRef = recorder.clone();
        let output = manager.output();
        output.attach_input(input.clone());
        recorder.borrow_mut().clear();

        assert!(output.detach_input(&input));
        assert!(!output.detach_input(&input));
        assert_eq!(
            recorder.borrow().events(),
            &[OutputEvent::Schema(None), OutputEvent::Source(false)]
        );

        let mut cs = ChangeSet::new();
        cs.add_row(2);
        manager.fire(&cs);
        assert_eq!(recorder.borrow().events().len(), 2);
    }

    /// Detaches a target input (possibly itself) on its first `rows_added`.
    struct Detacher {
        output: Option<TransformOutput>,
        target: Option<InputRef>,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl TransformInput for Detacher {
        fn set_source(&mut self, source: Option<&TransformOutput>) {
            if source.is_none() {
                self.log.borrow_mut().push("detached");
            }
            self.output = source.cloned();
        }

        fn schema_updated(&mut self, _schema: Option<SchemaRef>) {}

        fn rows_added(&mut self, _rows: &[RowId]) {
            self.log.borrow_mut().push("added");
            if let (Some(output), Some(target)) = (self.output.clone(), self.target.take()) {
                output.detach_input(&target);
            }
        }

        fn rows_changed(&mut self, _rows: &[RowId], _fields: &FieldSet) {
            self.log.borrow_mut().push("changed");
        }

        fn rows_removed(&mut self, _rows: &[RowId]) {}
    }

    #[test]
    fn test_reentrant_self_detach() {
        let (manager, _) = setup(&[]);
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = Rc::new(RefCell::new(Detacher {
            output: None,
            target: None,
            log: log.clone(),
        }));
        let first_ref: InputRef = first.clone();
        first.borrow_mut().target = Some(first_ref.clone());
        let second = EventRecorder::shared();

        let output = manager.output();
        output.attach_input(first_ref);
        output.attach_input(second.clone());
        second.borrow_mut().clear();

        let mut cs = ChangeSet::new();
        cs.add_row(1);
        cs.change_field(9, 0);
        manager.fire(&cs);

        // The detaching input stops after its own callback; the other still gets the full batch
        assert_eq!(*log.borrow(), vec!["added", "detached"]);
        assert_eq!(
            second.borrow().events(),
            &[
                OutputEvent::Added(vec![1]),
                OutputEvent::Changed(vec![9], vec![0]),
            ]
        );
        assert_eq!(output.input_count(), 1);
    }

    #[test]
    fn test_detach_other_input_mid_pass() {
        let (manager, _) = setup(&[]);
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim = EventRecorder::shared();
        let victim_ref: InputRef = victim.clone();
        let detacher = Rc::new(RefCell::new(Detacher {
            output: None,
            target: Some(victim_ref.clone()),
            log,
        }));

        let output = manager.output();
        output.attach_input(detacher);
        output.attach_input(victim_ref);
        victim.borrow_mut().clear();

        let mut cs = ChangeSet::new();
        cs.add_row(1);
        manager.fire(&cs);

        assert_eq!(
            victim.borrow().events(),
            &[OutputEvent::Schema(None), OutputEvent::Source(false)]
        );
    }

    #[test]
    fn test_attach_replays_published_rows_only() {
        let (manager, rows) = setup(&[1, 2]);
        // Owner mutated rows but has not fired yet
        rows.borrow_mut().0.remove(&1);
        rows.borrow_mut().0.insert(3);
        let mut pending = ChangeSet::new();
        pending.remove_row(1);
        pending.add_row(3);

        let recorder = EventRecorder::shared();
        manager.output().attach_input(recorder.clone());
        assert_eq!(manager.output().live_rows(), vec![1, 2]);
        manager.fire(&pending);

        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Source(true),
                OutputEvent::Schema(Some("t".into())),
                OutputEvent::Added(vec![1, 2]),
                OutputEvent::Added(vec![3]),
                OutputEvent::Removed(vec![1]),
            ]
        );
        assert_eq!(manager.output().live_rows(), vec![2, 3]);
        assert_eq!(manager.output().row_count(), 2);
    }

    #[test]
    fn test_pending_schema_not_replayed() {
        let rows = Rc::new(RefCell::new(Rows(BTreeSet::new())));
        let manager = OutputManager::new(rows.clone());
        manager.update_schema(Some(SchemaBuilder::new("t").build_ref()));
        rows.borrow_mut().0.insert(0);

        let recorder = EventRecorder::shared();
        manager.output().attach_input(recorder.clone());
        assert!(manager.output().schema().is_none());
        manager.fire(&ChangeSet::new());

        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Source(true),
                OutputEvent::Schema(Some("t".into())),
                OutputEvent::Added(vec![0]),
            ]
        );
    }

    #[test]
    fn test_with_schema_publishes_immediately() {
        let rows = Rc::new(RefCell::new(Rows([4].into_iter().collect())));
        let schema = SchemaBuilder::new("t").build_ref();
        let manager = OutputManager::with_schema(rows, schema);
        let recorder = EventRecorder::shared();
        manager.output().attach_input(recorder.clone());

        assert_eq!(
            recorder.borrow().events(),
            &[
                OutputEvent::Source(true),
                OutputEvent::Schema(Some("t".into())),
                OutputEvent::Added(vec![4]),
            ]
        );
        // Nothing is owed to inputs that already saw the schema
        recorder.borrow_mut().clear();
        manager.fire(&ChangeSet::new());
        assert!(recorder.borrow().events().is_empty());
    }

    #[test]
    fn test_self_detach_during_replay_completes_on_return() {
        let (manager, _) = setup(&[1]);
        let log = Rc::new(RefCell::new(Vec::new()));
        let input = Rc::new(RefCell::new(Detacher {
            output: None,
            target: None,
            log: log.clone(),
        }));
        let input_ref: InputRef = input.clone();
        input.borrow_mut().target = Some(input_ref.clone());

        let output = manager.output();
        output.attach_input(input_ref);
        assert_eq!(*log.borrow(), vec!["added", "detached"]);
        assert_eq!(output.input_count(), 0);
    }
}
