//! Native ⇄ [`Value`] conversion traits.
//!
//! `#[derive(TableRow)]` implements [`TableRow`], [`FieldValue`] and
//! [`RowLoader`] for a struct with named fields. Field types must implement
//! [`FieldValue`]; the implementations below cover the supported scalars and
//! the `Option` / `Vec` / `Box` wrappers.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::codec;
use crate::error::{DecodeError, EncodeError};
use crate::schema::{FieldType, Schema};
use crate::value::{Geography, Value, ValueMap};

// ════════════════════════════════════════════════════════════════
//  Type descriptions
// ════════════════════════════════════════════════════════════════

/// Static description of a native field type, consumed by schema inference.
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    Scalar(FieldType),
    /// `u8`: INTEGER on its own, BYTES as `Vec<u8>`.
    Byte,
    /// `Option<T>`.
    Nullable(Box<TypeDescriptor>),
    /// `Vec<T>`.
    Repeated(Box<TypeDescriptor>),
    /// `Box<T>`.
    Boxed(Box<TypeDescriptor>),
    /// A `#[derive(TableRow)]` struct. Resolved lazily so recursive types
    /// can be described.
    Struct(fn() -> StructDescriptor),
    /// A type with no column mapping; carries the type name.
    Unsupported(&'static str),
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Rust field name.
    pub name: &'static str,
    /// `#[quarry(rename = "...")]`.
    pub rename: Option<&'static str>,
    /// `#[quarry(skip)]`.
    pub skip: bool,
    /// `#[quarry(nullable)]`.
    pub nullable: bool,
    pub ty: TypeDescriptor,
}

impl FieldDescriptor {
    /// Column name after renaming.
    pub fn wire_name(&self) -> &'static str {
        self.rename.unwrap_or(self.name)
    }
}

#[derive(Debug, Clone)]
pub struct StructDescriptor {
    /// Fully qualified type name; identifies the type during cycle detection.
    pub type_name: &'static str,
    /// Declaration order.
    pub fields: Vec<FieldDescriptor>,
}

// ════════════════════════════════════════════════════════════════
//  Traits
// ════════════════════════════════════════════════════════════════

/// A native type that can occupy a single column.
pub trait FieldValue: Sized {
    fn describe() -> TypeDescriptor;

    /// Fails only when the native value has no lossless column form.
    fn to_value(&self) -> Result<Value, EncodeError>;

    fn from_value(value: Value) -> Result<Self, DecodeError>;

    /// Encoding of `Vec<Self>`. Overridden by `u8` to produce bytes.
    #[doc(hidden)]
    fn slice_to_value(items: &[Self]) -> Result<Value, EncodeError> {
        items
            .iter()
            .map(Self::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    /// Decoding of `Vec<Self>`. NULL is the empty list.
    #[doc(hidden)]
    fn vec_from_value(value: Value) -> Result<Vec<Self>, DecodeError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            other => Err(DecodeError::mismatch("array", &other)),
        }
    }
}

/// A native struct that maps to a whole row (or a RECORD column).
///
/// Implemented by `#[derive(TableRow)]`.
pub trait TableRow: Sized {
    fn descriptor() -> StructDescriptor;

    /// Column name → value, with renames applied and skipped fields left out.
    fn to_value_map(&self) -> Result<ValueMap, EncodeError>;

    fn from_value_map(lookup: &mut FieldLookup) -> Result<Self, DecodeError>;
}

/// A target shape for decoded result rows.
///
/// Implemented for `Vec<Value>` (positional), [`ValueMap`] (named) and every
/// `#[derive(TableRow)]` struct.
pub trait RowLoader: Sized {
    fn load(schema: &Schema, values: Vec<Value>) -> Result<Self, DecodeError>;
}

impl RowLoader for Vec<Value> {
    fn load(_schema: &Schema, values: Vec<Value>) -> Result<Self, DecodeError> {
        Ok(values)
    }
}

impl RowLoader for ValueMap {
    fn load(schema: &Schema, values: Vec<Value>) -> Result<Self, DecodeError> {
        codec::name_values(schema, values)
    }
}

/// Insert id of a streamed row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum InsertId {
    /// The client generates a random id; the service deduplicates on it.
    #[default]
    Auto,
    /// Opt out of deduplication for higher throughput. No id is sent.
    NoDedupe,
    Explicit(String),
}

impl From<&str> for InsertId {
    fn from(id: &str) -> Self {
        InsertId::Explicit(id.to_string())
    }
}

impl From<String> for InsertId {
    fn from(id: String) -> Self {
        InsertId::Explicit(id)
    }
}

/// A row type that produces its own named values and insert id.
pub trait ValueSaver {
    fn save(&self) -> Result<(ValueMap, InsertId), EncodeError>;
}

/// A plain map is saved as-is with a generated insert id.
impl ValueSaver for ValueMap {
    fn save(&self) -> Result<(ValueMap, InsertId), EncodeError> {
        Ok((self.clone(), InsertId::Auto))
    }
}

/// Name-indexed view over a decoded record, consumed field by field.
///
/// Lookup is exact first, then case-insensitive. Absent columns read as
/// NULL.
#[derive(Debug, Default)]
pub struct FieldLookup {
    entries: ValueMap,
}

impl FieldLookup {
    pub fn new(entries: ValueMap) -> Self {
        Self { entries }
    }

    pub fn take(&mut self, name: &str) -> Value {
        if let Some(value) = self.entries.remove(name) {
            return value;
        }
        let key = self
            .entries
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned();
        key.and_then(|k| self.entries.remove(&k))
            .unwrap_or(Value::Null)
    }
}

// ════════════════════════════════════════════════════════════════
//  Scalar impls
// ════════════════════════════════════════════════════════════════

macro_rules! int_field_value {
    ($($ty:ty),*) => {$(
        impl FieldValue for $ty {
            fn describe() -> TypeDescriptor {
                TypeDescriptor::Scalar(FieldType::Integer)
            }

            fn to_value(&self) -> Result<Value, EncodeError> {
                Ok(Value::Int64(i64::from(*self)))
            }

            fn from_value(value: Value) -> Result<Self, DecodeError> {
                match value {
                    Value::Int64(v) => <$ty>::try_from(v).map_err(|_| DecodeError::OutOfRange {
                        value: v.to_string(),
                        target: stringify!($ty),
                    }),
                    Value::Null => Err(DecodeError::NullIntoNonNullable { target: stringify!($ty) }),
                    other => Err(DecodeError::mismatch(stringify!($ty), &other)),
                }
            }
        }
    )*};
}

int_field_value!(i8, i16, i32, i64, u16, u32);

impl FieldValue for isize {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::Scalar(FieldType::Integer)
    }

    fn to_value(&self) -> Result<Value, EncodeError> {
        Ok(Value::Int64(*self as i64))
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Int64(v) => isize::try_from(v).map_err(|_| DecodeError::OutOfRange {
                value: v.to_string(),
                target: "isize",
            }),
            Value::Null => Err(DecodeError::NullIntoNonNullable { target: "isize" }),
            other => Err(DecodeError::mismatch("isize", &other)),
        }
    }
}

impl FieldValue for u8 {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::Byte
    }

    fn to_value(&self) -> Result<Value, EncodeError> {
        Ok(Value::Int64(i64::from(*self)))
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Int64(v) => u8::try_from(v).map_err(|_| DecodeError::OutOfRange {
                value: v.to_string(),
                target: "u8",
            }),
            Value::Null => Err(DecodeError::NullIntoNonNullable { target: "u8" }),
            other => Err(DecodeError::mismatch("u8", &other)),
        }
    }

    fn slice_to_value(items: &[Self]) -> Result<Value, EncodeError> {
        Ok(Value::Bytes(items.to_vec()))
    }

    fn vec_from_value(value: Value) -> Result<Vec<Self>, DecodeError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(bytes) => Ok(bytes),
            other => Err(DecodeError::mismatch("bytes", &other)),
        }
    }
}

// u64 and usize exceed the signed 64-bit column range.
macro_rules! unsupported_field_value {
    ($($ty:ty),*) => {$(
        impl FieldValue for $ty {
            fn describe() -> TypeDescriptor {
                TypeDescriptor::Unsupported(stringify!($ty))
            }

            fn to_value(&self) -> Result<Value, EncodeError> {
                i64::try_from(*self)
                    .map(Value::Int64)
                    .map_err(|_| EncodeError::OutOfRange {
                        value: self.to_string(),
                        target: "INTEGER",
                    })
            }

            fn from_value(value: Value) -> Result<Self, DecodeError> {
                match value {
                    Value::Int64(v) => <$ty>::try_from(v).map_err(|_| DecodeError::OutOfRange {
                        value: v.to_string(),
                        target: stringify!($ty),
                    }),
                    Value::Null => Err(DecodeError::NullIntoNonNullable { target: stringify!($ty) }),
                    other => Err(DecodeError::mismatch(stringify!($ty), &other)),
                }
            }
        }
    )*};
}

unsupported_field_value!(u64, usize);

/// Implements `FieldValue` for a type held by exactly one `Value` variant.
macro_rules! scalar_field_value {
    ($ty:ty, $field_type:expr, $variant:ident, $name:literal) => {
        impl FieldValue for $ty {
            fn describe() -> TypeDescriptor {
                TypeDescriptor::Scalar($field_type)
            }

            fn to_value(&self) -> Result<Value, EncodeError> {
                Ok(Value::$variant(self.clone()))
            }

            fn from_value(value: Value) -> Result<Self, DecodeError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    Value::Null => Err(DecodeError::NullIntoNonNullable { target: $name }),
                    other => Err(DecodeError::mismatch($name, &other)),
                }
            }
        }
    };
}

scalar_field_value!(bool, FieldType::Boolean, Bool, "bool");
scalar_field_value!(f64, FieldType::Float, Float64, "f64");
scalar_field_value!(String, FieldType::String, String, "String");
scalar_field_value!(DateTime<Utc>, FieldType::Timestamp, Timestamp, "DateTime<Utc>");
scalar_field_value!(NaiveDate, FieldType::Date, Date, "NaiveDate");
scalar_field_value!(NaiveTime, FieldType::Time, Time, "NaiveTime");
scalar_field_value!(NaiveDateTime, FieldType::Datetime, DateTime, "NaiveDateTime");
scalar_field_value!(serde_json::Value, FieldType::Json, Json, "serde_json::Value");

impl FieldValue for f32 {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::Scalar(FieldType::Float)
    }

    fn to_value(&self) -> Result<Value, EncodeError> {
        Ok(Value::Float64(f64::from(*self)))
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Float64(v) => {
                let narrowed = v as f32;
                if v.is_finite() && f64::from(narrowed) != v {
                    return Err(DecodeError::OutOfRange {
                        value: v.to_string(),
                        target: "f32",
                    });
                }
                Ok(narrowed)
            }
            Value::Null => Err(DecodeError::NullIntoNonNullable { target: "f32" }),
            other => Err(DecodeError::mismatch("f32", &other)),
        }
    }
}

impl FieldValue for BigDecimal {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::Scalar(FieldType::Numeric)
    }

    fn to_value(&self) -> Result<Value, EncodeError> {
        Ok(Value::Numeric(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Numeric(v) => Ok(v),
            Value::Int64(v) => Ok(BigDecimal::from(v)),
            Value::Null => Err(DecodeError::NullIntoNonNullable { target: "BigDecimal" }),
            other => Err(DecodeError::mismatch("BigDecimal", &other)),
        }
    }
}

impl FieldValue for Geography {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::Scalar(FieldType::Geography)
    }

    fn to_value(&self) -> Result<Value, EncodeError> {
        Ok(Value::Geography(self.0.clone()))
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Geography(wkt) | Value::String(wkt) => Ok(Geography(wkt)),
            Value::Null => Err(DecodeError::NullIntoNonNullable { target: "Geography" }),
            other => Err(DecodeError::mismatch("Geography", &other)),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Wrappers
// ════════════════════════════════════════════════════════════════

/// The nullable wrapper: `None` is NULL.
impl<T: FieldValue> FieldValue for Option<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::Nullable(Box::new(T::describe()))
    }

    fn to_value(&self) -> Result<Value, EncodeError> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::Repeated(Box::new(T::describe()))
    }

    fn to_value(&self) -> Result<Value, EncodeError> {
        T::slice_to_value(self)
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        T::vec_from_value(value)
    }
}

/// The pointer wrapper. Inference marks a boxed record NULLABLE only when the
/// field carries `#[quarry(nullable)]`, but a `Box` always holds a value:
/// it never encodes NULL and reading NULL into it fails. `Option<Box<T>>` is
/// the form for records that may be NULL.
impl<T: FieldValue> FieldValue for Box<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::Boxed(Box::new(T::describe()))
    }

    fn to_value(&self) -> Result<Value, EncodeError> {
        (**self).to_value()
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        T::from_value(value).map(Box::new)
    }
}
