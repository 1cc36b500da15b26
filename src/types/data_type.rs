//! # Declared Field Types
//!
//! The types a schemaful table can declare for its fields, together with
//! the SQL type-name aliases accepted in DDL:
//!
//! | declared | aliases |
//! |----------|---------|
//! | Int8     | TINYINT |
//! | Int16    | SMALLINT, INT2 |
//! | Int32    | MEDIUMINT |
//! | Int64    | INT, INTEGER, BIGINT, INT8 |
//! | Float64  | REAL, DOUBLE [PRECISION] |
//! | Bool     | BOOL |
//! | Text     | TEXT, VARCHAR, CHARACTER |
//! | Blob     | BLOB, BYTES |
//! | Array    | ARRAY |
//! | Document | DOCUMENT |
//!
//! (`INT2`/`INT8` follow the SQL convention of counting bytes, not bits.)
//!
//! Schemaful insertion is strict: a value is accepted when its kind
//! matches the declared kind, when it is an integer that fits losslessly
//! in the declared integer width, or when it is an integer going into a
//! float field. Everything else is a type error; `CAST` exists for the
//! lossy conversions.

use crate::error::{Error, Result};
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float64,
    Text,
    Blob,
    Array,
    Document,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "tinyint",
            DataType::Int16 => "smallint",
            DataType::Int32 => "mediumint",
            DataType::Int64 => "integer",
            DataType::Float64 => "double",
            DataType::Text => "text",
            DataType::Blob => "blob",
            DataType::Array => "array",
            DataType::Document => "document",
        }
    }

    /// The value stored for a schemaful field the insert did not provide.
    pub fn zero_value(&self) -> Value {
        match self {
            DataType::Bool => Value::Bool(false),
            DataType::Int8 => Value::Int8(0),
            DataType::Int16 => Value::Int16(0),
            DataType::Int32 => Value::Int32(0),
            DataType::Int64 => Value::Int64(0),
            DataType::Float64 => Value::Float64(0.0),
            DataType::Text => Value::Text(String::new()),
            DataType::Blob => Value::Blob(Vec::new()),
            DataType::Array => Value::Array(Vec::new()),
            DataType::Document => Value::Document(Default::default()),
        }
    }

    /// Wraps a widened integer back into this declared integer width,
    /// failing when it does not fit.
    pub fn rewrap_int(&self, i: i64) -> Result<Value> {
        let out_of_range =
            || Error::Type(format!("integer {} out of range for {}", i, self.name()));
        match self {
            DataType::Int8 => i8::try_from(i).map(Value::Int8).map_err(|_| out_of_range()),
            DataType::Int16 => i16::try_from(i).map(Value::Int16).map_err(|_| out_of_range()),
            DataType::Int32 => i32::try_from(i).map(Value::Int32).map_err(|_| out_of_range()),
            DataType::Int64 => Ok(Value::Int64(i)),
            other => Err(Error::Internal(format!(
                "rewrap_int called for non-integer type {}",
                other.name()
            ))),
        }
    }

    fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    /// Validates a value against this declared type for storage, applying
    /// only the lossless coercions. Null is accepted for every type; the
    /// caller enforces primary-key non-nullability.
    pub fn check(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match (self, &value) {
            (DataType::Bool, Value::Bool(_))
            | (DataType::Float64, Value::Float64(_))
            | (DataType::Text, Value::Text(_))
            | (DataType::Blob, Value::Blob(_))
            | (DataType::Array, Value::Array(_))
            | (DataType::Document, Value::Document(_)) => Ok(value),
            (ty, v) if ty.is_integer() && v.is_integer() => {
                let i = v.as_int().ok_or_else(|| {
                    Error::Type(format!("integer out of range for {}", ty.name()))
                })?;
                ty.rewrap_int(i)
            }
            (DataType::Float64, v) if v.is_integer() => {
                // int into float is the one cross-kind coercion with a rule
                Ok(Value::Float64(v.as_float().ok_or_else(|| {
                    Error::Type("integer out of range for double".to_string())
                })?))
            }
            (ty, v) => Err(Error::Type(format!(
                "cannot assign value of type {:?} into field of type {:?}",
                v.type_name(),
                ty.name()
            ))),
        }
    }

    /// Parses a type name as it appears in catalog records.
    pub fn from_name(name: &str) -> Option<DataType> {
        match name {
            "bool" => Some(DataType::Bool),
            "tinyint" => Some(DataType::Int8),
            "smallint" => Some(DataType::Int16),
            "mediumint" => Some(DataType::Int32),
            "integer" => Some(DataType::Int64),
            "double" => Some(DataType::Float64),
            "text" => Some(DataType::Text),
            "blob" => Some(DataType::Blob),
            "array" => Some(DataType::Array),
            "document" => Some(DataType::Document),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_name() {
        for ty in [
            DataType::Bool,
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
            DataType::Float64,
            DataType::Text,
            DataType::Blob,
            DataType::Array,
            DataType::Document,
        ] {
            assert_eq!(DataType::from_name(ty.name()), Some(ty));
        }
    }

    #[test]
    fn check_accepts_matching_kind() {
        assert_eq!(
            DataType::Text.check(Value::Text("x".into())).unwrap(),
            Value::Text("x".into())
        );
    }

    #[test]
    fn check_narrows_integers_losslessly() {
        assert_eq!(DataType::Int16.check(Value::Int64(300)).unwrap(), Value::Int16(300));
        assert!(DataType::Int8.check(Value::Int64(300)).is_err());
    }

    #[test]
    fn check_widens_integer_into_float_field() {
        assert_eq!(
            DataType::Float64.check(Value::Int64(2)).unwrap(),
            Value::Float64(2.0)
        );
    }

    #[test]
    fn check_rejects_cross_kind_values() {
        assert!(matches!(
            DataType::Int64.check(Value::Text("1".into())),
            Err(Error::Type(_))
        ));
        assert!(matches!(
            DataType::Int64.check(Value::Float64(1.0)),
            Err(Error::Type(_))
        ));
        assert!(matches!(
            DataType::Bool.check(Value::Int64(1)),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn check_accepts_null_for_any_type() {
        assert_eq!(DataType::Blob.check(Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn zero_values_match_their_type() {
        assert!(DataType::Int32.check(DataType::Int32.zero_value()).is_ok());
        assert!(DataType::Document.check(DataType::Document.zero_value()).is_ok());
    }
}
