//! # Runtime Value Representation
//!
//! `Value` is the runtime representation of every scalar and composite
//! InkDB handles. Integer widths exist so that schemaful tables can store
//! compact fixed-width fields; at evaluation time integers widen to 64-bit
//! and all floats are 64-bit, and mixed int/float arithmetic produces
//! float.
//!
//! ## Ordering
//!
//! The total order used by indexes and `ORDER BY`:
//!
//! 1. Kind rank: `Null < Number < Bool < Text < Blob < Array < Document`.
//! 2. Numbers order numerically across integer and float representations
//!    through [`NumKey`], a (rounded, exact) pair whose second component
//!    breaks rounding ties for 64-bit integers outside the f64-exact
//!    range.
//! 3. Text and blob order by byte-lexicographic comparison.
//! 4. Arrays and documents order element-wise, shorter first on equal
//!    prefix; document fields compare by sorted field name, then value.
//!
//! Expression evaluation uses different, three-valued comparison rules
//! (NULL operands yield NULL, incompatible kinds compare false); those
//! live in the SQL layer. This module only defines the total order, which
//! the key encoding mirrors byte-for-byte.

use crate::document::FieldBuffer;
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// Runtime value for one field of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float64(f64),
    Text(String),
    Blob(Vec<u8>),
    Array(Vec<Value>),
    Document(FieldBuffer),
}

/// The kind rank of a value, in total-order position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Kind {
    Null,
    Number,
    Bool,
    Text,
    Blob,
    Array,
    Document,
}

/// Order key for a number: the value rounded to f64, plus the exact
/// integer component. Two numbers compare equal only when both parts
/// agree, so distinct 64-bit integers beyond 2^53 still order correctly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumKey {
    pub approx: f64,
    pub exact: i128,
}

impl NumKey {
    pub fn compare(&self, other: &NumKey) -> Ordering {
        self.approx
            .total_cmp(&other.approx)
            .then(self.exact.cmp(&other.exact))
    }
}

fn float_exact(f: f64) -> i128 {
    if f.is_nan() {
        return 0;
    }
    let t = f.trunc();
    if t <= i64::MIN as f64 {
        i64::MIN as i128
    } else if t >= u64::MAX as f64 {
        u64::MAX as i128
    } else {
        t as i128
    }
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Bool,
            Value::Int8(_)
            | Value::Int16(_)
            | Value::Int32(_)
            | Value::Int64(_)
            | Value::Uint8(_)
            | Value::Uint16(_)
            | Value::Uint32(_)
            | Value::Uint64(_)
            | Value::Float64(_) => Kind::Number,
            Value::Text(_) => Kind::Text,
            Value::Blob(_) => Kind::Blob,
            Value::Array(_) => Kind::Array,
            Value::Document(_) => Kind::Document,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Uint8(_) => "uint8",
            Value::Uint16(_) => "uint16",
            Value::Uint32(_) => "uint32",
            Value::Uint64(_) => "uint64",
            Value::Float64(_) => "float64",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The order key of a numeric value, `None` for other kinds.
    pub fn num_key(&self) -> Option<NumKey> {
        let key = match *self {
            Value::Int8(v) => NumKey { approx: v as f64, exact: v as i128 },
            Value::Int16(v) => NumKey { approx: v as f64, exact: v as i128 },
            Value::Int32(v) => NumKey { approx: v as f64, exact: v as i128 },
            Value::Int64(v) => NumKey { approx: v as f64, exact: v as i128 },
            Value::Uint8(v) => NumKey { approx: v as f64, exact: v as i128 },
            Value::Uint16(v) => NumKey { approx: v as f64, exact: v as i128 },
            Value::Uint32(v) => NumKey { approx: v as f64, exact: v as i128 },
            Value::Uint64(v) => NumKey { approx: v as f64, exact: v as i128 },
            Value::Float64(f) => NumKey { approx: f, exact: float_exact(f) },
            _ => return None,
        };
        Some(key)
    }

    /// Widens an integer value to i64, `None` for non-integers or
    /// unsigned values above `i64::MAX`.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::Int64(v) => Some(v),
            Value::Uint8(v) => Some(v as i64),
            Value::Uint16(v) => Some(v as i64),
            Value::Uint32(v) => Some(v as i64),
            Value::Uint64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Widens any numeric value to f64.
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float64(f) => Some(f),
            _ => self.as_int().map(|i| i as f64).or_else(|| match *self {
                Value::Uint64(v) => Some(v as f64),
                _ => None,
            }),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Value::Int8(_)
                | Value::Int16(_)
                | Value::Int32(_)
                | Value::Int64(_)
                | Value::Uint8(_)
                | Value::Uint16(_)
                | Value::Uint32(_)
                | Value::Uint64(_)
        )
    }

    /// Truthiness for `WHERE`: the zero value of each kind is falsy.
    /// NULL handling (three-valued logic) is the evaluator's job.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Float64(f) => *f != 0.0,
            v if v.is_integer() => v.num_key().map(|k| k.exact != 0).unwrap_or(false),
            Value::Text(s) => !s.is_empty(),
            Value::Blob(b) => !b.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Document(d) => !d.is_empty(),
            _ => false,
        }
    }

    /// Total order over all values; mirrored exactly by the key encoding.
    pub fn cmp_total(&self, other: &Value) -> Ordering {
        let rank = self.kind().cmp(&other.kind());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cmp_total(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Document(a), Value::Document(b)) => {
                let mut fa: Vec<_> = a.iter().collect();
                let mut fb: Vec<_> = b.iter().collect();
                fa.sort_by(|x, y| x.name.cmp(&y.name));
                fb.sort_by(|x, y| x.name.cmp(&y.name));
                for (x, y) in fa.iter().zip(fb.iter()) {
                    match x.name.cmp(&y.name) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                    match x.value.cmp_total(&y.value) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                }
                fa.len().cmp(&fb.len())
            }
            (a, b) => {
                // both numeric: the kind ranks matched above
                let ka = a.num_key().expect("numeric value has a num key");
                let kb = b.num_key().expect("numeric value has a num key");
                ka.compare(&kb)
            }
        }
    }

    /// Converts a value to a declared type, or fails with a type error.
    /// Null passes through every cast.
    pub fn cast(self, target: crate::types::DataType) -> Result<Value> {
        use crate::types::DataType;

        if self.is_null() {
            return Ok(Value::Null);
        }

        fn bad(v: &Value, target: DataType) -> Error {
            Error::Type(format!("cannot cast {} to {}", v.type_name(), target.name()))
        }

        fn to_int(v: &Value, target: DataType) -> Result<i64> {
            match v {
                Value::Bool(b) => Ok(*b as i64),
                Value::Float64(f) => Ok(f.trunc() as i64),
                Value::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| Error::Type(format!("cannot cast {:?} to {}", s, target.name()))),
                v if v.is_integer() => v
                    .as_int()
                    .ok_or_else(|| Error::Type("integer out of range".to_string())),
                v => Err(bad(v, target)),
            }
        }

        match target {
            DataType::Bool => match self {
                Value::Bool(b) => Ok(Value::Bool(b)),
                ref v if v.is_integer() => Ok(Value::Bool(v.is_truthy())),
                Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(Error::Type(format!("cannot cast {:?} to bool", s))),
                },
                ref v => Err(bad(v, target)),
            },
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                let i = to_int(&self, target)?;
                target.rewrap_int(i)
            }
            DataType::Float64 => match self {
                Value::Float64(f) => Ok(Value::Float64(f)),
                ref v if v.is_integer() => Ok(Value::Float64(
                    v.as_float().ok_or_else(|| bad(v, target))?,
                )),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float64)
                    .map_err(|_| Error::Type(format!("cannot cast {:?} to double", s))),
                ref v => Err(bad(v, target)),
            },
            DataType::Text => match self {
                Value::Text(s) => Ok(Value::Text(s)),
                Value::Blob(b) => String::from_utf8(b)
                    .map(Value::Text)
                    .map_err(|_| Error::Type("blob is not valid utf-8 text".to_string())),
                v @ (Value::Bool(_) | Value::Float64(_)) => Ok(Value::Text(v.to_string())),
                v if v.is_integer() => Ok(Value::Text(v.to_string())),
                v => Err(bad(&v, target)),
            },
            DataType::Blob => match self {
                Value::Blob(b) => Ok(Value::Blob(b)),
                Value::Text(s) => Ok(Value::Blob(s.into_bytes())),
                ref v => Err(bad(v, target)),
            },
            DataType::Array => match self {
                Value::Array(a) => Ok(Value::Array(a)),
                ref v => Err(bad(v, target)),
            },
            DataType::Document => match self {
                Value::Document(d) => Ok(Value::Document(d)),
                ref v => Err(bad(v, target)),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Uint8(v) => write!(f, "{}", v),
            Value::Uint16(v) => write!(f, "{}", v),
            Value::Uint32(v) => write!(f, "{}", v),
            Value::Uint64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Blob(b) => {
                write!(f, "x'")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, "'")
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Document(doc) => {
                write!(f, "{{")?;
                for (i, field) in doc.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", field.name, field.value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<FieldBuffer> for Value {
    fn from(v: FieldBuffer) -> Self {
        Value::Document(v)
    }
}
