//! Encoding of schemas and change batches into responses.
//!
//! Values are written column by column: for every projected field a list of
//! values positionally aligned with the batch's row list. Batches whose frame
//! would exceed the frame limit are split into several responses.

use strata_binary::{
    response_frame_len, ColumnData, DataUpdate, FieldDefinition, ResponseType, SchemaUpdate,
    SubscriptionResponse, DEFAULT_MAX_FRAME_LEN,
};
use strata_core::schema::{SchemaField, SchemaRef};
use strata_core::{Column, DataType, Error, Field, FieldId, FieldSet, Primitive, Result, RowId};

/// Encodes one subscription's view of an output.
///
/// The projection maps wire field ids (positions in the published schema)
/// to field ids of the source schema.
#[derive(Debug)]
pub struct DeltaEncoder {
    subscription_id: i32,
    requested: Option<Vec<String>>,
    schema: Option<SchemaRef>,
    projection: Vec<FieldId>,
    max_frame_len: usize,
}

impl DeltaEncoder {
    /// Creates an encoder; `requested` of `None` selects every field.
    pub fn new(subscription_id: i32, requested: Option<Vec<String>>) -> Self {
        Self {
            subscription_id,
            requested,
            schema: None,
            projection: Vec::new(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Limits every encoded response to frames of `max_frame_len` bytes,
    /// excluding the length prefix.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Returns the subscription id stamped on every response.
    #[inline]
    pub fn subscription_id(&self) -> i32 {
        self.subscription_id
    }

    /// Returns the source field ids in wire order.
    #[inline]
    pub fn projection(&self) -> &[FieldId] {
        &self.projection
    }

    /// Checks that every requested field exists in `schema`.
    pub fn validate(&self, schema: &SchemaRef) -> Result<()> {
        self.resolve(schema).map(|_| ())
    }

    fn resolve(&self, schema: &SchemaRef) -> Result<Vec<FieldId>> {
        match &self.requested {
            None => Ok((0..schema.len()).collect()),
            Some(names) => names
                .iter()
                .map(|name| schema.require(name).map(SchemaField::id))
                .collect(),
        }
    }

    /// Adopts a new source schema and encodes the projected `SCHEMA` response.
    ///
    /// Fails with `FieldNotFound` if a requested field is missing.
    pub fn encode_schema(&mut self, schema: &SchemaRef) -> Result<SubscriptionResponse> {
        let projection = self.resolve(schema)?;
        let fields = projection
            .iter()
            .filter_map(|&id| schema.field(id))
            .map(|f| {
                FieldDefinition::new(f.name(), f.data_type()).with_metadata(f.metadata().clone())
            })
            .collect();
        self.projection = projection;
        self.schema = Some(schema.clone());
        Ok(SubscriptionResponse::schema(
            self.subscription_id,
            SchemaUpdate {
                name: schema.name().to_string(),
                fields,
            },
        ))
    }

    /// Forgets the adopted schema.
    pub fn reset(&mut self) {
        self.schema = None;
        self.projection.clear();
    }

    /// Encodes `INIT` or `ADD` responses carrying every projected field.
    ///
    /// A batch too large for one frame is split; for `INIT` only the first
    /// part is an `INIT` and the rest are `ADD`.
    pub fn encode_rows(
        &self,
        response_type: ResponseType,
        rows: &[RowId],
    ) -> Result<Vec<SubscriptionResponse>> {
        let wire_fields: Vec<usize> = (0..self.projection.len()).collect();
        let mut out = Vec::new();
        self.split(response_type, rows, &mut out, &|rows: &[RowId]| {
            self.encode_values(rows, &wire_fields)
        })?;
        Ok(out)
    }

    /// Encodes `CHG` responses carrying the projected fields in `fields`.
    ///
    /// Returns nothing if no projected field changed.
    pub fn encode_change(
        &self,
        rows: &[RowId],
        fields: &FieldSet,
    ) -> Result<Vec<SubscriptionResponse>> {
        let wire_fields: Vec<usize> = self
            .projection
            .iter()
            .enumerate()
            .filter(|(_, source)| fields.contains(**source))
            .map(|(wire, _)| wire)
            .collect();
        let mut out = Vec::new();
        if wire_fields.is_empty() {
            return Ok(out);
        }
        self.split(ResponseType::Change, rows, &mut out, &|rows: &[RowId]| {
            self.encode_values(rows, &wire_fields)
        })?;
        Ok(out)
    }

    /// Encodes `REM` responses; removals carry no values.
    pub fn encode_remove(&self, rows: &[RowId]) -> Result<Vec<SubscriptionResponse>> {
        let mut out = Vec::new();
        self.split(ResponseType::Remove, rows, &mut out, &|rows: &[RowId]| {
            Ok(DataUpdate::with_rows(rows.to_vec()))
        })?;
        Ok(out)
    }

    /// Halves `rows` until each response fits in a frame.
    fn split(
        &self,
        response_type: ResponseType,
        rows: &[RowId],
        out: &mut Vec<SubscriptionResponse>,
        encode: &dyn Fn(&[RowId]) -> Result<DataUpdate>,
    ) -> Result<()> {
        let response = SubscriptionResponse::data(self.subscription_id, response_type, encode(rows)?);
        let len = response_frame_len(&response);
        if len <= self.max_frame_len {
            out.push(response);
            return Ok(());
        }
        if rows.len() < 2 {
            return Err(Error::invalid_operation(format!(
                "{} of row {} needs {} bytes, frame limit is {}",
                response_type.name(),
                rows.first().copied().unwrap_or_default(),
                len,
                self.max_frame_len
            )));
        }
        let (head, tail) = rows.split_at(rows.len() / 2);
        self.split(response_type, head, out, encode)?;
        let rest = match response_type {
            ResponseType::Init => ResponseType::Add,
            other => other,
        };
        self.split(rest, tail, out, encode)
    }

    fn encode_values(&self, rows: &[RowId], wire_fields: &[usize]) -> Result<DataUpdate> {
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| Error::invalid_operation("No schema adopted"))?;
        let mut data = DataUpdate::with_rows(rows.to_vec());
        for &wire in wire_fields {
            let source = schema
                .field(self.projection[wire])
                .ok_or_else(|| Error::invalid_operation("Projection outside schema"))?;
            let field = source.field();
            let id = wire as u32;
            match &*field {
                Field::Bool(c) => data.bool_data.push(gather(id, c, rows)),
                Field::Byte(c) => data.byte_data.push(gather(id, c, rows)),
                Field::Short(c) => data
                    .int32_data
                    .push(ColumnData::new(id, rows.iter().map(|r| i32::from(*c.get(*r))).collect())),
                Field::Char(c) => data
                    .int32_data
                    .push(ColumnData::new(id, rows.iter().map(|r| *c.get(*r) as i32).collect())),
                Field::Int32(c) => data.int32_data.push(gather(id, c, rows)),
                Field::Int64(c) => data.int64_data.push(gather(id, c, rows)),
                Field::Float32(c) => data.float_data.push(gather(id, c, rows)),
                Field::Float64(c) => data.double_data.push(gather(id, c, rows)),
                Field::String(c) => data.string_data.push(gather(id, c, rows)),
                Field::Generic(c) => data.generic_data.push(gather(id, c, rows)),
            }
        }
        Ok(data)
    }
}

fn gather<T: Primitive>(field_id: u32, column: &Column<T>, rows: &[RowId]) -> ColumnData<T> {
    ColumnData::new(field_id, rows.iter().map(|r| column.get(*r).clone()).collect())
}

/// Returns the wire vector a data type travels in, for diagnostics.
pub(crate) fn wire_vector(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Bool => "bool_data",
        DataType::Byte => "byte_data",
        DataType::Short | DataType::Char | DataType::Int32 => "int32_data",
        DataType::Int64 => "int64_data",
        DataType::Float32 => "float_data",
        DataType::Float64 => "double_data",
        DataType::String => "string_data",
        DataType::Generic => "generic_data",
    }
}
