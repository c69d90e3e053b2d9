//! Data type definitions for Strata.
//!
//! This module defines the closed set of primitive variants a field can hold.

/// Supported primitive data types.
///
/// The numeric ids returned by [`DataType::type_id`] are the ones carried on
/// the wire in schema messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Bool,
    /// 8-bit signed integer
    Byte,
    /// 16-bit signed integer
    Short,
    /// Unicode scalar value
    Char,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit floating point number
    Float32,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
    /// Opaque encoded bytes
    Generic,
}

impl DataType {
    /// All variants, in type id order.
    pub const ALL: [DataType; 10] = [
        DataType::Bool,
        DataType::Byte,
        DataType::Short,
        DataType::Char,
        DataType::Int32,
        DataType::Int64,
        DataType::Float32,
        DataType::Float64,
        DataType::String,
        DataType::Generic,
    ];

    /// Returns the wire type id for this data type.
    pub fn type_id(self) -> u8 {
        match self {
            DataType::Bool => 1,
            DataType::Byte => 2,
            DataType::Short => 3,
            DataType::Char => 4,
            DataType::Int32 => 5,
            DataType::Int64 => 6,
            DataType::Float32 => 7,
            DataType::Float64 => 8,
            DataType::String => 9,
            DataType::Generic => 10,
        }
    }

    /// Resolves a wire type id back to a data type.
    pub fn from_type_id(id: u8) -> Option<DataType> {
        match id {
            1 => Some(DataType::Bool),
            2 => Some(DataType::Byte),
            3 => Some(DataType::Short),
            4 => Some(DataType::Char),
            5 => Some(DataType::Int32),
            6 => Some(DataType::Int64),
            7 => Some(DataType::Float32),
            8 => Some(DataType::Float64),
            9 => Some(DataType::String),
            10 => Some(DataType::Generic),
            _ => None,
        }
    }

    /// Returns a short display name.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Bool => "Bool",
            DataType::Byte => "Byte",
            DataType::Short => "Short",
            DataType::Char => "Char",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
            DataType::String => "String",
            DataType::Generic => "Generic",
        }
    }

    /// Returns whether values of this type have a fixed width.
    pub fn is_fixed_width(self) -> bool {
        !matches!(self, DataType::String | DataType::Generic)
    }
}
