//! # Typed Value System
//!
//! InkDB stores heterogeneous records, so every stored scalar is a
//! [`Value`]: a closed tagged variant over null, booleans, fixed-width
//! integers, 64-bit floats, text, blobs, arrays, and nested documents.
//! Evaluation dispatches on the variant pair; keeping the sum closed keeps
//! exhaustiveness checkable.
//!
//! [`DataType`] is the declared-type side of the same lattice: the types a
//! schemaful table can require of its fields, together with the coercions
//! they accept and their zero values.

mod data_type;
mod value;

pub use data_type::DataType;
pub use value::{Kind, NumKey, Value};
