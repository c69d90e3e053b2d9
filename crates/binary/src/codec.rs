//! Encoding and decoding of request and response frames.

use crate::buffer::{ByteReader, ByteWriter};
use crate::message::{
    Acknowledgement, ColumnData, CreateSubscription, DataUpdate, FieldDefinition, Frame,
    Modification, RequestType, ResponseType, SchemaUpdate, SubscriptionRequest,
    SubscriptionResponse,
};
use crate::{FrameKind, FRAME_HEADER_SIZE};
use alloc::format;
use alloc::vec::Vec;
use strata_core::schema::Metadata;
use strata_core::{DataType, Error, Result, Value};

const SECTION_SCHEMA: u8 = 1 << 0;
const SECTION_DATA: u8 = 1 << 1;
const SECTION_ACK: u8 = 1 << 2;

fn begin_frame(kind: FrameKind, capacity: usize) -> ByteWriter {
    let mut w = ByteWriter::with_capacity(FRAME_HEADER_SIZE + capacity);
    // Length is patched once the body is written
    w.put_u32(0);
    w.put_u8(kind as u8);
    w
}

fn end_frame(mut w: ByteWriter) -> Vec<u8> {
    let len = (w.len() - 4) as u32;
    w.patch_u32(0, len);
    w.into_inner()
}

/// Encodes a request as a complete frame.
pub fn encode_request(request: &SubscriptionRequest) -> Vec<u8> {
    let mut w = begin_frame(FrameKind::Request, 32);
    w.put_i64(request.msg_token);
    w.put_i32(request.subscription_id);
    w.put_u8(request.request_type.code());
    match &request.subscription {
        Some(sub) => {
            w.put_u8(1);
            w.put_str(&sub.name);
            w.put_vec(&sub.field_names, |w, name| w.put_str(name));
            w.put_bool(sub.default_all);
            w.put_vec(&sub.modifications, |w, m| {
                w.put_str(&m.target);
                w.put_str(&m.action);
                w.put_vec(&m.arguments, |w, arg| w.put_bytes(arg));
            });
        }
        None => w.put_u8(0),
    }
    end_frame(w)
}

/// Encodes a response as a complete frame.
pub fn encode_response(response: &SubscriptionResponse) -> Vec<u8> {
    let rows = response.data.as_ref().map_or(0, |d| d.rows.len());
    let mut w = begin_frame(FrameKind::Response, 16 + rows * 16);
    w.put_i32(response.subscription_id);
    w.put_i64(response.msg_token);
    w.put_u8(response.response_type.code());

    let mut sections = 0u8;
    if response.schema.is_some() {
        sections |= SECTION_SCHEMA;
    }
    if response.data.is_some() {
        sections |= SECTION_DATA;
    }
    if response.response.is_some() {
        sections |= SECTION_ACK;
    }
    w.put_u8(sections);

    if let Some(schema) = &response.schema {
        w.put_str(&schema.name);
        w.put_vec(&schema.fields, |w, f| {
            w.put_str(&f.name);
            w.put_u8(f.data_type.type_id());
            write_metadata(w, &f.metadata);
        });
    }
    if let Some(data) = &response.data {
        write_data(&mut w, data);
    }
    if let Some(ack) = &response.response {
        w.put_bool(ack.success);
        w.put_str(&ack.message);
    }
    end_frame(w)
}

fn write_metadata(w: &mut ByteWriter, metadata: &Metadata) {
    let tags: Vec<&str> = metadata.tags().iter().map(|t| t.as_str()).collect();
    w.put_vec(&tags, |w, tag| w.put_str(tag));
    let attributes: Vec<(&str, &Value)> = metadata
        .attributes()
        .iter()
        .map(|(k, v)| (k.as_str(), v))
        .collect();
    w.put_vec(&attributes, |w, (name, value)| {
        w.put_str(name);
        write_value(w, value);
    });
}

fn write_value(w: &mut ByteWriter, value: &Value) {
    w.put_u8(value.data_type().type_id());
    match value {
        Value::Bool(v) => w.put_bool(*v),
        Value::Byte(v) => w.put_i8(*v),
        Value::Short(v) => w.put_i32(i32::from(*v)),
        Value::Char(v) => w.put_u32(*v as u32),
        Value::Int32(v) => w.put_i32(*v),
        Value::Int64(v) => w.put_i64(*v),
        Value::Float32(v) => w.put_f32(*v),
        Value::Float64(v) => w.put_f64(*v),
        Value::String(v) => w.put_str(v),
        Value::Generic(v) => w.put_bytes(v),
    }
}

/// Returns the length `encode_response` writes into the frame's prefix:
/// the frame size without the four prefix bytes.
pub fn response_frame_len(response: &SubscriptionResponse) -> usize {
    // kind, subscription id, token, response type, sections
    let mut len = 1 + 4 + 8 + 1 + 1;
    if let Some(schema) = &response.schema {
        len += str_len(&schema.name) + 4;
        for f in &schema.fields {
            len += str_len(&f.name) + 1 + metadata_len(&f.metadata);
        }
    }
    if let Some(data) = &response.data {
        len += data_len(data);
    }
    if let Some(ack) = &response.response {
        len += 1 + str_len(&ack.message);
    }
    len
}

#[inline]
fn str_len(s: &str) -> usize {
    4 + s.len()
}

fn metadata_len(metadata: &Metadata) -> usize {
    let tags: usize = metadata.tags().iter().map(|t| str_len(t)).sum();
    let attributes: usize = metadata
        .attributes()
        .iter()
        .map(|(k, v)| str_len(k) + value_len(v))
        .sum();
    8 + tags + attributes
}

fn value_len(value: &Value) -> usize {
    1 + match value {
        Value::Bool(_) | Value::Byte(_) => 1,
        Value::Short(_) | Value::Char(_) | Value::Int32(_) | Value::Float32(_) => 4,
        Value::Int64(_) | Value::Float64(_) => 8,
        Value::String(v) => str_len(v),
        Value::Generic(v) => 4 + v.len(),
    }
}

fn columns_len<T>(cols: &[ColumnData<T>], size: impl Fn(&T) -> usize) -> usize {
    4 + cols
        .iter()
        .map(|c| 8 + c.values.iter().map(&size).sum::<usize>())
        .sum::<usize>()
}

fn data_len(data: &DataUpdate) -> usize {
    4 + 4 * data.rows.len()
        + columns_len(&data.bool_data, |_| 1)
        + columns_len(&data.byte_data, |_| 1)
        + columns_len(&data.int32_data, |_| 4)
        + columns_len(&data.int64_data, |_| 8)
        + columns_len(&data.float_data, |_| 4)
        + columns_len(&data.double_data, |_| 8)
        + columns_len(&data.string_data, |v| str_len(v))
        + columns_len(&data.generic_data, |v| 4 + v.len())
}

fn write_columns<T>(w: &mut ByteWriter, cols: &[ColumnData<T>], put: fn(&mut ByteWriter, &T)) {
    w.put_vec(cols, |w, col| {
        w.put_u32(col.field_id);
        w.put_vec(&col.values, |w, v| put(w, v));
    });
}

fn write_data(w: &mut ByteWriter, data: &DataUpdate) {
    w.put_vec(&data.rows, |w, row| w.put_u32(*row));
    write_columns(w, &data.bool_data, |w, v| w.put_bool(*v));
    write_columns(w, &data.byte_data, |w, v| w.put_i8(*v));
    write_columns(w, &data.int32_data, |w, v| w.put_i32(*v));
    write_columns(w, &data.int64_data, |w, v| w.put_i64(*v));
    write_columns(w, &data.float_data, |w, v| w.put_f32(*v));
    write_columns(w, &data.double_data, |w, v| w.put_f64(*v));
    write_columns(w, &data.string_data, |w, v| w.put_str(v));
    write_columns(w, &data.generic_data, |w, v| w.put_bytes(v));
}

/// Decodes one complete frame, header included.
///
/// A bad header or unknown kind is a `MalformedFrame`; a body that does not
/// parse is a `MalformedMessage`.
pub fn decode_frame(frame: &[u8]) -> Result<Frame> {
    if frame.len() < FRAME_HEADER_SIZE {
        return Err(Error::malformed_frame(format!(
            "Frame of {} bytes is shorter than its header",
            frame.len()
        )));
    }
    let len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    if len + 4 != frame.len() {
        return Err(Error::malformed_frame(format!(
            "Frame length {} does not match {} bytes",
            len,
            frame.len() - 4
        )));
    }
    let kind = FrameKind::from_u8(frame[4])
        .ok_or_else(|| Error::malformed_frame(format!("Unknown frame kind: {}", frame[4])))?;
    decode_body(kind, &frame[FRAME_HEADER_SIZE..])
}

/// Decodes a frame body of the given kind.
pub fn decode_body(kind: FrameKind, body: &[u8]) -> Result<Frame> {
    let mut r = ByteReader::new(body);
    let frame = match kind {
        FrameKind::Request => Frame::Request(read_request(&mut r)?),
        FrameKind::Response => Frame::Response(read_response(&mut r)?),
    };
    r.finish()?;
    Ok(frame)
}

fn read_request(r: &mut ByteReader<'_>) -> Result<SubscriptionRequest> {
    let msg_token = r.get_i64()?;
    let subscription_id = r.get_i32()?;
    let request_type = RequestType::from_code(r.get_u8()?);
    let subscription = match r.get_u8()? {
        0 => None,
        1 => Some(CreateSubscription {
            name: r.get_str()?,
            field_names: r.get_vec(4, |r| r.get_str())?,
            default_all: r.get_bool()?,
            modifications: r.get_vec(12, |r| {
                Ok(Modification {
                    target: r.get_str()?,
                    action: r.get_str()?,
                    arguments: r.get_vec(4, |r| r.get_bytes())?,
                })
            })?,
        }),
        other => {
            return Err(Error::malformed_message(format!(
                "Invalid subscription marker: {}",
                other
            )))
        }
    };
    Ok(SubscriptionRequest {
        msg_token,
        subscription_id,
        request_type,
        subscription,
    })
}

fn read_response(r: &mut ByteReader<'_>) -> Result<SubscriptionResponse> {
    let subscription_id = r.get_i32()?;
    let msg_token = r.get_i64()?;
    let code = r.get_u8()?;
    let response_type = ResponseType::from_code(code)
        .ok_or_else(|| Error::malformed_message(format!("Unknown response type: {}", code)))?;
    let sections = r.get_u8()?;
    if sections & !(SECTION_SCHEMA | SECTION_DATA | SECTION_ACK) != 0 {
        return Err(Error::malformed_message(format!(
            "Unknown response sections: {:#04x}",
            sections
        )));
    }

    let schema = if sections & SECTION_SCHEMA != 0 {
        Some(read_schema(r)?)
    } else {
        None
    };
    let data = if sections & SECTION_DATA != 0 {
        Some(read_data(r)?)
    } else {
        None
    };
    let response = if sections & SECTION_ACK != 0 {
        Some(Acknowledgement {
            success: r.get_bool()?,
            message: r.get_str()?,
        })
    } else {
        None
    };

    match response_type {
        ResponseType::Schema if schema.is_none() => {
            return Err(Error::malformed_message("SCHEMA response without schema"));
        }
        ResponseType::Message if response.is_none() => {
            return Err(Error::malformed_message(
                "MESSAGE response without acknowledgement",
            ));
        }
        t if t.carries_rows() && data.is_none() => {
            return Err(Error::malformed_message(format!(
                "{} response without data",
                t.name()
            )));
        }
        _ => {}
    }

    Ok(SubscriptionResponse {
        subscription_id,
        msg_token,
        response_type,
        schema,
        data,
        response,
    })
}

fn read_schema(r: &mut ByteReader<'_>) -> Result<SchemaUpdate> {
    let name = r.get_str()?;
    let fields = r.get_vec(13, |r| {
        let name = r.get_str()?;
        let data_type = read_type(r)?;
        let metadata = read_metadata(r)?;
        Ok(FieldDefinition {
            name,
            data_type,
            metadata,
        })
    })?;
    Ok(SchemaUpdate { name, fields })
}

fn read_type(r: &mut ByteReader<'_>) -> Result<DataType> {
    let type_id = r.get_u8()?;
    DataType::from_type_id(type_id)
        .ok_or_else(|| Error::malformed_message(format!("Unknown type id: {}", type_id)))
}

fn read_metadata(r: &mut ByteReader<'_>) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for tag in r.get_vec(4, |r| r.get_str())? {
        metadata = metadata.tag(tag);
    }
    for (name, value) in r.get_vec(6, |r| Ok((r.get_str()?, read_value(r)?)))? {
        metadata = metadata.attribute(name, value);
    }
    Ok(metadata)
}

fn read_value(r: &mut ByteReader<'_>) -> Result<Value> {
    Ok(match read_type(r)? {
        DataType::Bool => Value::Bool(r.get_bool()?),
        DataType::Byte => Value::Byte(r.get_i8()?),
        DataType::Short => {
            let v = r.get_i32()?;
            Value::Short(i16::try_from(v).map_err(|_| {
                Error::malformed_message(format!("Short attribute out of range: {}", v))
            })?)
        }
        DataType::Char => {
            let v = r.get_u32()?;
            Value::Char(char::from_u32(v).ok_or_else(|| {
                Error::malformed_message(format!("Invalid char attribute: {}", v))
            })?)
        }
        DataType::Int32 => Value::Int32(r.get_i32()?),
        DataType::Int64 => Value::Int64(r.get_i64()?),
        DataType::Float32 => Value::Float32(r.get_f32()?),
        DataType::Float64 => Value::Float64(r.get_f64()?),
        DataType::String => Value::String(r.get_str()?),
        DataType::Generic => Value::Generic(r.get_bytes()?),
    })
}

fn read_columns<T>(
    r: &mut ByteReader<'_>,
    item_size: usize,
    get: fn(&mut ByteReader<'_>) -> Result<T>,
) -> Result<Vec<ColumnData<T>>> {
    r.get_vec(8, |r| {
        let field_id = r.get_u32()?;
        let values = r.get_vec(item_size, get)?;
        Ok(ColumnData { field_id, values })
    })
}

fn read_data(r: &mut ByteReader<'_>) -> Result<DataUpdate> {
    Ok(DataUpdate {
        rows: r.get_vec(4, |r| r.get_u32())?,
        bool_data: read_columns(r, 1, |r| r.get_bool())?,
        byte_data: read_columns(r, 1, |r| r.get_i8())?,
        int32_data: read_columns(r, 4, |r| r.get_i32())?,
        int64_data: read_columns(r, 8, |r| r.get_i64())?,
        float_data: read_columns(r, 4, |r| r.get_f32())?,
        double_data: read_columns(r, 8, |r| r.get_f64())?,
        string_data: read_columns(r, 4, |r| r.get_str())?,
        generic_data: read_columns(r, 4, |r| r.get_bytes())?,
    })
}
