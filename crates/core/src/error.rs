//! Error types for Strata.

use crate::row::RowId;
use crate::types::DataType;
use alloc::string::String;
use core::fmt;

/// Result type alias for Strata operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for storage, dataflow and protocol operations.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The row id is not currently live.
    InvalidRow {
        row: RowId,
    },
    /// Type mismatch error.
    TypeMismatch {
        expected: DataType,
        got: DataType,
    },
    /// Field not found by name.
    FieldNotFound {
        name: String,
    },
    /// Invalid schema definition.
    InvalidSchema {
        message: String,
    },
    /// A message referenced a subscription the receiver does not know.
    UnknownSubscription {
        subscription_id: i32,
    },
    /// Framing could not be parsed; the connection cannot continue.
    MalformedFrame {
        message: String,
    },
    /// A frame did not hold a valid message.
    MalformedMessage {
        message: String,
    },
    /// The subscription ordering contract was broken.
    ProtocolViolation {
        subscription_id: i32,
        message: String,
    },
    /// Invalid operation.
    InvalidOperation {
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRow { row } => write!(f, "Row {} is not live", row),
            Error::TypeMismatch { expected, got } => {
                write!(f, "Type mismatch: expected {:?}, got {:?}", expected, got)
            }
            Error::FieldNotFound { name } => write!(f, "Field not found: {}", name),
            Error::InvalidSchema { message } => write!(f, "Invalid schema: {}", message),
            Error::UnknownSubscription { subscription_id } => {
                write!(f, "Unknown subscription: {}", subscription_id)
            }
            Error::MalformedFrame { message } => write!(f, "Malformed frame: {}", message),
            Error::MalformedMessage { message } => write!(f, "Malformed message: {}", message),
            Error::ProtocolViolation {
                subscription_id,
                message,
            } => write!(
                f,
                "Protocol violation on subscription {}: {}",
                subscription_id, message
            ),
            Error::InvalidOperation { message } => write!(f, "Invalid operation: {}", message),
        }
    }
}

impl Error {
    /// Creates an invalid row error.
    pub fn invalid_row(row: RowId) -> Self {
        Error::InvalidRow { row }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: DataType) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Creates a field not found error.
    pub fn field_not_found(name: impl Into<String>) -> Self {
        Error::FieldNotFound { name: name.into() }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an unknown subscription error.
    pub fn unknown_subscription(subscription_id: i32) -> Self {
        Error::UnknownSubscription { subscription_id }
    }

    /// Creates a malformed frame error.
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Error::MalformedFrame {
            message: message.into(),
        }
    }

    /// Creates a malformed message error.
    pub fn malformed_message(message: impl Into<String>) -> Self {
        Error::MalformedMessage {
            message: message.into(),
        }
    }

    /// Creates a protocol violation error.
    pub fn protocol_violation(subscription_id: i32, message: impl Into<String>) -> Self {
        Error::ProtocolViolation {
            subscription_id,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the error leaves a connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::MalformedFrame { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::type_mismatch(DataType::Int32, DataType::String);
        assert!(err.to_string().contains("Type mismatch"));

        let err = Error::invalid_row(7);
        assert!(err.to_string().contains('7'));

        let err = Error::protocol_violation(3, "CHG before INIT");
        assert!(err.to_string().contains("CHG before INIT"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::malformed_frame("bad length").is_fatal());
        assert!(!Error::malformed_message("bad body").is_fatal());
        assert!(!Error::unknown_subscription(1).is_fatal());
    }

    #[test]
    fn test_error_constructors() {
        match Error::field_not_found("price") {
            Error::FieldNotFound { name } => assert_eq!(name, "price"),
            _ => panic!("Wrong error type"),
        }
    }
}
