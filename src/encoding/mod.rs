//! # Binary Encodings
//!
//! Two codecs over one value system:
//!
//! - [`key`]: the order-preserving codec. Encoding two values and
//!   comparing the bytes as unsigned slices yields the same order as
//!   comparing the values. Used for record ids, index keys, and sort keys.
//! - [`record`]: the full-fidelity codec. Records round-trip exactly,
//!   including integer widths and field order. Used for stored records and
//!   catalog entries.
//!
//! Length framing in the record codec uses [`varint`], a small-value-
//! optimized variable-length integer.

pub mod key;
pub mod record;
pub mod varint;
