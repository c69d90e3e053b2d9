//! Client side of a subscription: a materialized view rebuilt from responses.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashSet;
use strata_binary::{ColumnData, DataUpdate, ResponseType, SubscriptionResponse};
use strata_core::schema::{Schema, SchemaBuilder, SchemaRef};
use strata_core::{DataType, Error, FieldId, FieldSet, Result, RowId, Value};
use strata_reactive::{ChangeSet, OutputManager, RowsRef, TransformOutput};
use strata_storage::RowStore;

use crate::encoder::wire_vector;

/// Highest row id a decoder accepts unless configured otherwise.
pub const DEFAULT_MAX_ROW_ID: RowId = (1 << 24) - 1;

/// Progress of a decoder through the subscription protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingSchema,
    AwaitingInit,
    Live,
    /// The subscription is corrupted; data is ignored until a new schema.
    Failed,
}

/// Values bound for one field, aligned with the message's row list.
type ColumnWrite = (FieldId, Vec<Value>);

/// Rebuilds a server table from its response stream.
///
/// Every accepted message is applied as one mutation cycle and fired to the
/// inputs attached to [`output`](SubscriptionDecoder::output). Messages are
/// validated completely before anything is written.
pub struct SubscriptionDecoder {
    subscription_id: i32,
    state: DecoderState,
    schema: Option<SchemaRef>,
    rows: Rc<RefCell<RowStore>>,
    output: OutputManager,
    max_row_id: RowId,
}

impl SubscriptionDecoder {
    pub fn new(subscription_id: i32) -> Self {
        Self::with_max_row_id(subscription_id, DEFAULT_MAX_ROW_ID)
    }

    /// Creates a decoder rejecting row ids above `max_row_id`.
    pub fn with_max_row_id(subscription_id: i32, max_row_id: RowId) -> Self {
        let rows = Rc::new(RefCell::new(RowStore::new()));
        let provider: RowsRef = rows.clone();
        Self {
            subscription_id,
            state: DecoderState::AwaitingSchema,
            schema: None,
            rows,
            output: OutputManager::new(provider),
            max_row_id,
        }
    }

    #[inline]
    pub fn subscription_id(&self) -> i32 {
        self.subscription_id
    }

    #[inline]
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Returns the schema received last, if any.
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    /// Returns the output re-publishing the mirrored table.
    pub fn output(&self) -> TransformOutput {
        self.output.output()
    }

    #[inline]
    pub fn is_live(&self, row: RowId) -> bool {
        self.rows.borrow().is_live(row)
    }

    pub fn live_rows(&self) -> Vec<RowId> {
        self.rows.borrow().live_rows()
    }

    /// Reads a value; rows that are not live read as absent.
    pub fn get(&self, row: RowId, name: &str) -> Result<Value> {
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| Error::invalid_operation("No schema received"))?;
        let field = schema.require(name)?;
        if self.is_live(row) {
            Ok(field.value(row))
        } else {
            Ok(Value::absent(field.data_type()))
        }
    }

    /// Forgets the schema and every row, as before a fresh subscribe.
    pub fn reset(&mut self) {
        self.rows.borrow_mut().clear();
        self.truncate_storage();
        self.state = DecoderState::AwaitingSchema;
        self.output.update_schema(None);
        self.output.fire(&ChangeSet::new());
    }

    /// Applies one response.
    ///
    /// Ordering errors return `ProtocolViolation` and leave the decoder
    /// `Failed`. Shape errors return `MalformedMessage` or `TypeMismatch`
    /// and drop the message without touching state.
    pub fn accept(&mut self, response: &SubscriptionResponse) -> Result<()> {
        if response.subscription_id != self.subscription_id {
            return Err(Error::unknown_subscription(response.subscription_id));
        }
        match response.response_type {
            ResponseType::Message => {
                let ack = response
                    .response
                    .as_ref()
                    .ok_or_else(|| Error::malformed_message("MESSAGE without acknowledgement"))?;
                if !ack.success {
                    self.state = DecoderState::Failed;
                }
                Ok(())
            }
            ResponseType::Schema => self.accept_schema(response),
            data_type => self.accept_data(data_type, response),
        }
    }

    fn accept_schema(&mut self, response: &SubscriptionResponse) -> Result<()> {
        let update = response
            .schema
            .as_ref()
            .ok_or_else(|| Error::malformed_message("SCHEMA without schema section"))?;
        let mut builder = SchemaBuilder::new(update.name.clone());
        for field in &update.fields {
            builder = builder
                .add_field_with(field.name.clone(), field.data_type, field.metadata.clone())
                .map_err(|e| Error::malformed_message(e.to_string()))?;
        }
        let schema = builder.build_ref();

        self.rows.borrow_mut().clear();
        self.truncate_storage();
        self.schema = Some(schema.clone());
        self.state = DecoderState::AwaitingInit;
        self.output.update_schema(Some(schema));
        self.output.fire(&ChangeSet::new());
        Ok(())
    }

    fn accept_data(
        &mut self,
        response_type: ResponseType,
        response: &SubscriptionResponse,
    ) -> Result<()> {
        if self.state == DecoderState::Failed {
            return Ok(());
        }
        let expected = match response_type {
            ResponseType::Init => DecoderState::AwaitingInit,
            _ => DecoderState::Live,
        };
        if self.state != expected {
            let message = format!("{} received while {:?}", response_type.name(), self.state);
            return Err(self.violation(message));
        }
        let data = response
            .data
            .as_ref()
            .ok_or_else(|| Error::malformed_message("Row response without data section"))?;
        let schema = self
            .schema
            .clone()
            .ok_or_else(|| Error::invalid_operation("No schema received"))?;

        let writes = self.validate(response_type, &schema, data)?;
        let changes = self.apply(response_type, &schema, &data.rows, writes)?;
        if response_type == ResponseType::Init {
            self.state = DecoderState::Live;
        }
        self.output.fire(&changes);
        Ok(())
    }

    fn validate(
        &mut self,
        response_type: ResponseType,
        schema: &Schema,
        data: &DataUpdate,
    ) -> Result<Vec<ColumnWrite>> {
        let mut seen = HashSet::with_capacity(data.rows.len());
        for &row in &data.rows {
            if row > self.max_row_id {
                return Err(Error::malformed_message(format!(
                    "Row id {} above limit {}",
                    row, self.max_row_id
                )));
            }
            if !seen.insert(row) {
                return Err(Error::malformed_message(format!("Row {} listed twice", row)));
            }
        }

        let writes = if response_type == ResponseType::Remove {
            if data.column_count() != 0 {
                return Err(Error::malformed_message("REM carries values"));
            }
            Vec::new()
        } else {
            plan_writes(schema, data)?
        };

        let must_be_live = matches!(response_type, ResponseType::Change | ResponseType::Remove);
        let conflict = {
            let rows = self.rows.borrow();
            data.rows.iter().copied().find(|r| rows.is_live(*r) != must_be_live)
        };
        if let Some(row) = conflict {
            let message = if must_be_live {
                format!("{} for row {} which is not live", response_type.name(), row)
            } else {
                format!("{} for row {} which is already live", response_type.name(), row)
            };
            return Err(self.violation(message));
        }
        Ok(writes)
    }

    fn apply(
        &mut self,
        response_type: ResponseType,
        schema: &Schema,
        rows: &[RowId],
        writes: Vec<ColumnWrite>,
    ) -> Result<ChangeSet> {
        let mut changes = ChangeSet::new();
        {
            let mut store = self.rows.borrow_mut();
            for &row in rows {
                match response_type {
                    ResponseType::Remove => {
                        store.free(row)?;
                        changes.remove_row(row);
                    }
                    ResponseType::Init | ResponseType::Add => {
                        store.claim(row)?;
                        for field in schema.fields() {
                            field.field_mut().reset(row);
                        }
                        changes.add_row(row);
                    }
                    _ => {}
                }
            }
        }

        let mut changed = FieldSet::new();
        for (field_id, values) in writes {
            let Some(field) = schema.field(field_id) else {
                continue;
            };
            let mut storage = field.field_mut();
            for (&row, value) in rows.iter().zip(values) {
                storage.set(row, value)?;
            }
            changed.insert(field_id);
        }
        if response_type == ResponseType::Change && !changed.is_empty() {
            for &row in rows {
                changes.change_fields(row, &changed);
            }
        }
        Ok(changes)
    }

    /// Drops the values held for the outgoing schema.
    fn truncate_storage(&mut self) {
        if let Some(schema) = self.schema.take() {
            for field in schema.fields() {
                field.field_mut().clear();
            }
        }
    }

    fn violation(&mut self, message: String) -> Error {
        self.state = DecoderState::Failed;
        Error::protocol_violation(self.subscription_id, message)
    }
}

impl std::fmt::Debug for SubscriptionDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionDecoder")
            .field("subscription_id", &self.subscription_id)
            .field("state", &self.state)
            .field("schema", &self.schema.as_ref().map(|s| s.name()))
            .field("live", &self.rows.borrow().len())
            .finish()
    }
}

fn plan_writes(schema: &Schema, data: &DataUpdate) -> Result<Vec<ColumnWrite>> {
    let mut plan = Vec::with_capacity(data.column_count());
    let mut seen = FieldSet::new();
    let n = data.rows.len();
    collect(&mut plan, &mut seen, schema, n, &data.bool_data, |v| Value::Bool(*v))?;
    collect(&mut plan, &mut seen, schema, n, &data.byte_data, |v| Value::Byte(*v))?;
    collect(&mut plan, &mut seen, schema, n, &data.int32_data, |v| Value::Int32(*v))?;
    collect(&mut plan, &mut seen, schema, n, &data.int64_data, |v| Value::Int64(*v))?;
    collect(&mut plan, &mut seen, schema, n, &data.float_data, |v| Value::Float32(*v))?;
    collect(&mut plan, &mut seen, schema, n, &data.double_data, |v| Value::Float64(*v))?;
    collect(&mut plan, &mut seen, schema, n, &data.string_data, |v| Value::String(v.clone()))?;
    collect(&mut plan, &mut seen, schema, n, &data.generic_data, |v| Value::Generic(v.clone()))?;
    Ok(plan)
}

fn collect<T>(
    plan: &mut Vec<ColumnWrite>,
    seen: &mut FieldSet,
    schema: &Schema,
    row_count: usize,
    columns: &[ColumnData<T>],
    wrap: impl Fn(&T) -> Value,
) -> Result<()> {
    for column in columns {
        let id = column.field_id as FieldId;
        let field = schema.field(id).ok_or_else(|| {
            Error::malformed_message(format!("Unknown field id {}", column.field_id))
        })?;
        if !seen.insert(id) {
            return Err(Error::malformed_message(format!(
                "Field {} sent twice",
                field.name()
            )));
        }
        if column.values.len() != row_count {
            return Err(Error::malformed_message(format!(
                "Field {} has {} values for {} rows",
                field.name(),
                column.values.len(),
                row_count
            )));
        }
        let values = column
            .values
            .iter()
            .map(|v| fit(field.data_type(), wrap(v)))
            .collect::<Result<Vec<_>>>()?;
        plan.push((id, values));
    }
    Ok(())
}

/// Converts a wire value to the field's type, narrowing widened integers.
fn fit(data_type: DataType, value: Value) -> Result<Value> {
    match (data_type, value) {
        (DataType::Short, Value::Int32(v)) => i16::try_from(v)
            .map(Value::Short)
            .map_err(|_| out_of_range(data_type, v)),
        (DataType::Char, Value::Int32(v)) => u32::try_from(v)
            .ok()
            .and_then(char::from_u32)
            .map(Value::Char)
            .ok_or_else(|| out_of_range(data_type, v)),
        (expected, value) if value.data_type() == expected => Ok(value),
        (expected, value) => Err(Error::type_mismatch(expected, value.data_type())),
    }
}

fn out_of_range(data_type: DataType, value: i32) -> Error {
    Error::malformed_message(format!(
        "{} in {} out of range for {}",
        value,
        wire_vector(data_type),
        data_type.name()
    ))
}
