//! Wire messages exchanged between subscription clients and servers.

use alloc::string::String;
use alloc::vec::Vec;
use strata_core::schema::Metadata;
use strata_core::{DataType, RowId};

/// Kind of a client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Subscribe,
    Modify,
    Unsubscribe,
    /// A request type this build does not understand, kept so it can be answered.
    Unknown(u8),
}

impl RequestType {
    /// Returns the wire code.
    pub fn code(self) -> u8 {
        match self {
            RequestType::Subscribe => 1,
            RequestType::Modify => 2,
            RequestType::Unsubscribe => 3,
            RequestType::Unknown(code) => code,
        }
    }

    /// Resolves a wire code.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => RequestType::Subscribe,
            2 => RequestType::Modify,
            3 => RequestType::Unsubscribe,
            other => RequestType::Unknown(other),
        }
    }
}

/// Kind of a server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Acknowledgement or error text.
    Message,
    Schema,
    Add,
    Change,
    Remove,
    Init,
}

impl ResponseType {
    /// Returns the wire code.
    pub fn code(self) -> u8 {
        match self {
            ResponseType::Message => 1,
            ResponseType::Schema => 2,
            ResponseType::Add => 3,
            ResponseType::Change => 4,
            ResponseType::Remove => 5,
            ResponseType::Init => 6,
        }
    }

    /// Resolves a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ResponseType::Message),
            2 => Some(ResponseType::Schema),
            3 => Some(ResponseType::Add),
            4 => Some(ResponseType::Change),
            5 => Some(ResponseType::Remove),
            6 => Some(ResponseType::Init),
            _ => None,
        }
    }

    /// Returns the short protocol name.
    pub fn name(self) -> &'static str {
        match self {
            ResponseType::Message => "MESSAGE",
            ResponseType::Schema => "SCHEMA",
            ResponseType::Add => "ADD",
            ResponseType::Change => "CHG",
            ResponseType::Remove => "REM",
            ResponseType::Init => "INIT",
        }
    }

    /// Returns true for the row data responses.
    pub fn carries_rows(self) -> bool {
        matches!(
            self,
            ResponseType::Add | ResponseType::Change | ResponseType::Remove | ResponseType::Init
        )
    }
}

/// An opaque change to an existing subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modification {
    pub target: String,
    pub action: String,
    pub arguments: Vec<Vec<u8>>,
}

/// What a client subscribes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSubscription {
    /// Name of the output.
    pub name: String,
    /// Fields to receive; empty means all.
    pub field_names: Vec<String>,
    pub default_all: bool,
    pub modifications: Vec<Modification>,
}

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    /// Increases monotonically per connection; echoed by the acknowledgement.
    pub msg_token: i64,
    /// Assigned by the client, unique per connection.
    pub subscription_id: i32,
    pub request_type: RequestType,
    pub subscription: Option<CreateSubscription>,
}

/// One field of a published schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub data_type: DataType,
    pub metadata: Metadata,
}

impl FieldDefinition {
    /// Creates a definition without metadata.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            metadata: Metadata::new(),
        }
    }

    /// Attaches metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Schema section of a `SCHEMA` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaUpdate {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
}

/// Values of one field, positionally aligned with the row list.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnData<T> {
    pub field_id: u32,
    pub values: Vec<T>,
}

impl<T> ColumnData<T> {
    /// Creates a column section.
    pub fn new(field_id: u32, values: Vec<T>) -> Self {
        Self { field_id, values }
    }
}

/// Data section of a row response.
///
/// Short and char fields travel in `int32_data`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataUpdate {
    pub rows: Vec<RowId>,
    pub bool_data: Vec<ColumnData<bool>>,
    pub byte_data: Vec<ColumnData<i8>>,
    pub int32_data: Vec<ColumnData<i32>>,
    pub int64_data: Vec<ColumnData<i64>>,
    pub float_data: Vec<ColumnData<f32>>,
    pub double_data: Vec<ColumnData<f64>>,
    pub string_data: Vec<ColumnData<String>>,
    pub generic_data: Vec<ColumnData<Vec<u8>>>,
}

impl DataUpdate {
    /// Creates a data section with rows and no values.
    pub fn with_rows(rows: Vec<RowId>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Returns the number of column sections across all variants.
    pub fn column_count(&self) -> usize {
        self.bool_data.len()
            + self.byte_data.len()
            + self.int32_data.len()
            + self.int64_data.len()
            + self.float_data.len()
            + self.double_data.len()
            + self.string_data.len()
            + self.generic_data.len()
    }
}

/// Acknowledgement section of a `MESSAGE` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acknowledgement {
    pub success: bool,
    pub message: String,
}

/// A server response.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionResponse {
    pub subscription_id: i32,
    /// Token of the request this answers; 0 for pushed data.
    pub msg_token: i64,
    pub response_type: ResponseType,
    pub schema: Option<SchemaUpdate>,
    pub data: Option<DataUpdate>,
    pub response: Option<Acknowledgement>,
}

impl SubscriptionResponse {
    /// Creates a `MESSAGE` response.
    pub fn message(
        subscription_id: i32,
        msg_token: i64,
        success: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id,
            msg_token,
            response_type: ResponseType::Message,
            schema: None,
            data: None,
            response: Some(Acknowledgement {
                success,
                message: message.into(),
            }),
        }
    }

    /// Creates a `SCHEMA` response.
    pub fn schema(subscription_id: i32, schema: SchemaUpdate) -> Self {
        Self {
            subscription_id,
            msg_token: 0,
            response_type: ResponseType::Schema,
            schema: Some(schema),
            data: None,
            response: None,
        }
    }

    /// Creates a row data response.
    pub fn data(subscription_id: i32, response_type: ResponseType, data: DataUpdate) -> Self {
        Self {
            subscription_id,
            msg_token: 0,
            response_type,
            schema: None,
            data: Some(data),
            response: None,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request(SubscriptionRequest),
    Response(SubscriptionResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_codes() {
        for t in [RequestType::Subscribe, RequestType::Modify, RequestType::Unsubscribe] {
            assert_eq!(RequestType::from_code(t.code()), t);
        }
        assert_eq!(RequestType::from_code(9), RequestType::Unknown(9));
        assert_eq!(RequestType::Unknown(9).code(), 9);
    }

    #[test]
    fn test_response_type_codes() {
        assert_eq!(ResponseType::from_code(4), Some(ResponseType::Change));
        assert_eq!(ResponseType::Change.name(), "CHG");
        assert_eq!(ResponseType::from_code(0), None);
        assert!(ResponseType::Init.carries_rows());
        assert!(!ResponseType::Schema.carries_rows());
    }

    #[test]
    fn test_message_response() {
        let resp = SubscriptionResponse::message(3, 17, false, "Subscription not found");
        assert_eq!(resp.response_type, ResponseType::Message);
        assert_eq!(resp.msg_token, 17);
        assert!(!resp.response.unwrap().success);
    }
}
