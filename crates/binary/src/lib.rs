//! Binary wire protocol for Strata subscriptions.
//!
//! Requests and responses travel as length-prefixed frames over any
//! byte-stream transport. All integers are little-endian.
//!
//! ## Frame Format
//!
//! ```text
//! Header: 5 bytes
//! +----------+------+
//! | len      | kind |
//! | u32      | u8   |
//! +----------+------+
//! len counts kind + body; kind 1 = request, 2 = response
//!
//! Request body:
//! [msg_token: i64][subscription_id: i32][request_type: u8][has_sub: u8][create?]
//!
//! Response body:
//! [subscription_id: i32][msg_token: i64][response_type: u8][sections: u8]
//! [schema if sections & 1][data if sections & 2][ack if sections & 4]
//!
//! Schema section:
//! [name: str][fields: vec<[name: str][type_id: u8][tags: vec<str>]
//! [attributes: vec<[name: str][type_id: u8][value]>]>]
//!
//! Data section (values[i] belongs to rows[i]):
//! [rows: vec<u32>][bool cols][byte cols][int32 cols][int64 cols]
//! [float cols][double cols][string cols][generic cols]
//! ```
//!
//! `str` and `bytes` are a u32 length followed by the bytes; `vec<T>` is a
//! u32 count followed by the items.

#![no_std]

extern crate alloc;

mod buffer;
mod codec;
mod frame;
mod message;

pub use codec::{decode_body, decode_frame, encode_request, encode_response, response_frame_len};
pub use frame::FrameDecoder;
pub use message::{
    Acknowledgement, ColumnData, CreateSubscription, DataUpdate, FieldDefinition, Frame,
    Modification, RequestType, ResponseType, SchemaUpdate, SubscriptionRequest,
    SubscriptionResponse,
};

/// Header size in bytes: length prefix and kind.
pub const FRAME_HEADER_SIZE: usize = 5;

/// Default maximum frame length, excluding the length prefix.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Frame kinds
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Request = 1,
    Response = 2,
}

impl FrameKind {
    /// Resolves a kind byte.
    pub fn from_u8(kind: u8) -> Option<Self> {
        match kind {
            1 => Some(FrameKind::Request),
            2 => Some(FrameKind::Response),
            _ => None,
        }
    }
}
