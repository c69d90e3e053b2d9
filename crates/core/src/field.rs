//! Columnar field storage.
//!
//! A [`Field`] holds one value per row id for a single schema field. Each
//! variant wraps a typed [`Column`]; reads of rows never written return the
//! absent value for the type.

use crate::error::{Error, Result};
use crate::row::RowId;
use crate::types::DataType;
use crate::value::Value;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;

/// A primitive value type that can back a [`Column`].
pub trait Primitive: Clone + Debug + PartialEq + 'static {
    /// The data type tag for this primitive.
    const DATA_TYPE: DataType;

    /// Value returned for rows that were never written.
    fn absent() -> Self;

    /// Converts into the dynamic value form.
    fn into_value(self) -> Value;

    /// Extracts from a dynamic value of the matching variant.
    fn from_value(value: Value) -> Option<Self>;

    /// Borrows the typed column of a field if the variant matches.
    fn column(field: &Field) -> Option<&Column<Self>>;

    /// Mutably borrows the typed column of a field if the variant matches.
    fn column_mut(field: &mut Field) -> Option<&mut Column<Self>>;
}

/// Growable per-row storage for one primitive type.
#[derive(Clone, Debug, PartialEq)]
pub struct Column<T> {
    values: Vec<T>,
    absent: T,
}

impl<T: Primitive> Column<T> {
    /// Creates an empty column.
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            absent: T::absent(),
        }
    }

    /// Returns the value stored at `row`, or the absent value.
    #[inline]
    pub fn get(&self, row: RowId) -> &T {
        self.values.get(row as usize).unwrap_or(&self.absent)
    }

    /// Stores a value at `row`, growing the column as needed.
    pub fn set(&mut self, row: RowId, value: T) {
        let idx = row as usize;
        if idx >= self.values.len() {
            self.values.resize(idx + 1, self.absent.clone());
        }
        self.values[idx] = value;
    }

    /// Resets `row` to the absent value.
    pub fn reset(&mut self, row: RowId) {
        if let Some(slot) = self.values.get_mut(row as usize) {
            *slot = self.absent.clone();
        }
    }

    /// Drops every slot; all rows read as absent afterwards.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Returns the number of allocated slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no slot has been allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: Primitive> Default for Column<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage for one schema field, tagged by data type.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Bool(Column<bool>),
    Byte(Column<i8>),
    Short(Column<i16>),
    Char(Column<char>),
    Int32(Column<i32>),
    Int64(Column<i64>),
    Float32(Column<f32>),
    Float64(Column<f64>),
    String(Column<String>),
    Generic(Column<Vec<u8>>),
}

macro_rules! impl_primitive {
    ($ty:ty, $variant:ident, $absent:expr) => {
        impl Primitive for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            #[inline]
            fn absent() -> Self {
                $absent
            }

            #[inline]
            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            #[inline]
            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            #[inline]
            fn column(field: &Field) -> Option<&Column<Self>> {
                match field {
                    Field::$variant(c) => Some(c),
                    _ => None,
                }
            }

            #[inline]
            fn column_mut(field: &mut Field) -> Option<&mut Column<Self>> {
                match field {
                    Field::$variant(c) => Some(c),
                    _ => None,
                }
            }
        }
    };
}

impl_primitive!(bool, Bool, false);
impl_primitive!(i8, Byte, 0);
impl_primitive!(i16, Short, 0);
impl_primitive!(char, Char, '\0');
impl_primitive!(i32, Int32, 0);
impl_primitive!(i64, Int64, 0);
impl_primitive!(f32, Float32, 0.0);
impl_primitive!(f64, Float64, 0.0);
impl_primitive!(String, String, String::new());
impl_primitive!(Vec<u8>, Generic, Vec::new());

/// Dispatches `$body` over the typed column inside a field.
macro_rules! with_column {
    ($field:expr, $col:ident => $body:expr) => {
        match $field {
            Field::Bool($col) => $body,
            Field::Byte($col) => $body,
            Field::Short($col) => $body,
            Field::Char($col) => $body,
            Field::Int32($col) => $body,
            Field::Int64($col) => $body,
            Field::Float32($col) => $body,
            Field::Float64($col) => $body,
            Field::String($col) => $body,
            Field::Generic($col) => $body,
        }
    };
}

impl Field {
    /// Creates empty storage for the given data type.
    pub fn new(data_type: DataType) -> Self {
        match data_type {
            DataType::Bool => Field::Bool(Column::new()),
            DataType::Byte => Field::Byte(Column::new()),
            DataType::Short => Field::Short(Column::new()),
            DataType::Char => Field::Char(Column::new()),
            DataType::Int32 => Field::Int32(Column::new()),
            DataType::Int64 => Field::Int64(Column::new()),
            DataType::Float32 => Field::Float32(Column::new()),
            DataType::Float64 => Field::Float64(Column::new()),
            DataType::String => Field::String(Column::new()),
            DataType::Generic => Field::Generic(Column::new()),
        }
    }

    /// Returns the data type of this field.
    pub fn data_type(&self) -> DataType {
        match self {
            Field::Bool(_) => DataType::Bool,
            Field::Byte(_) => DataType::Byte,
            Field::Short(_) => DataType::Short,
            Field::Char(_) => DataType::Char,
            Field::Int32(_) => DataType::Int32,
            Field::Int64(_) => DataType::Int64,
            Field::Float32(_) => DataType::Float32,
            Field::Float64(_) => DataType::Float64,
            Field::String(_) => DataType::String,
            Field::Generic(_) => DataType::Generic,
        }
    }

    /// Reads the value at `row` as a dynamic value.
    pub fn get(&self, row: RowId) -> Value {
        with_column!(self, c => c.get(row).clone().into_value())
    }

    /// Writes a dynamic value at `row`.
    ///
    /// Fails with `TypeMismatch` if the value's type differs from the field's.
    pub fn set(&mut self, row: RowId, value: Value) -> Result<()> {
        let expected = self.data_type();
        let got = value.data_type();
        match (self, value) {
            (Field::Bool(c), Value::Bool(v)) => c.set(row, v),
            (Field::Byte(c), Value::Byte(v)) => c.set(row, v),
            (Field::Short(c), Value::Short(v)) => c.set(row, v),
            (Field::Char(c), Value::Char(v)) => c.set(row, v),
            (Field::Int32(c), Value::Int32(v)) => c.set(row, v),
            (Field::Int64(c), Value::Int64(v)) => c.set(row, v),
            (Field::Float32(c), Value::Float32(v)) => c.set(row, v),
            (Field::Float64(c), Value::Float64(v)) => c.set(row, v),
            (Field::String(c), Value::String(v)) => c.set(row, v),
            (Field::Generic(c), Value::Generic(v)) => c.set(row, v),
            _ => return Err(Error::type_mismatch(expected, got)),
        }
        Ok(())
    }

    /// Resets the value at `row` to absent.
    pub fn reset(&mut self, row: RowId) {
        with_column!(self, c => c.reset(row))
    }

    /// Truncates the storage, keeping the data type.
    pub fn clear(&mut self) {
        with_column!(self, c => c.clear())
    }

    /// Returns the number of allocated slots.
    pub fn len(&self) -> usize {
        with_column!(self, c => c.len())
    }

    /// Returns true if no slot has been allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the typed column if `T` matches this field.
    #[inline]
    pub fn typed<T: Primitive>(&self) -> Option<&Column<T>> {
        T::column(self)
    }

    /// Mutably borrows the typed column if `T` matches this field.
    #[inline]
    pub fn typed_mut<T: Primitive>(&mut self) -> Option<&mut Column<T>> {
        T::column_mut(self)
    }
}
