//! # Index Overlay
//!
//! Maps one indexed field onto a bucket of order-preserving keys:
//!
//! ```text
//! non-unique   key = encode(value) ++ record id     value = empty
//! unique       key = encode(value)                  value = record id
//! ```
//!
//! Because the key codec is prefix-free, appending the record id to a
//! non-unique entry never disturbs range order, and a range over encoded
//! values maps directly onto a byte range over entry keys.
//!
//! [`IndexRange`] is the planner's range descriptor. When only one side is
//! bounded, the open side is clamped to the kind region of the bounded
//! value: `a >= 2` must not sweep into the text region just because text
//! tags sort above number tags, since a comparison between incompatible
//! kinds is false, never true.

use crate::config::index_bucket;
use crate::encoding::key::{decode_value, encode_key, prefix_successor, tag};
use crate::engine::KvTransaction;
use crate::error::{Error, Result};
use crate::types::{Kind, Value};
use std::cmp::Ordering;
use std::ops::Bound;

/// Catalog entry for one index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub table: String,
    pub field: String,
    pub unique: bool,
}

impl IndexInfo {
    pub fn bucket(&self) -> String {
        index_bucket(&self.table, &self.name)
    }

    /// Adds the entry for `(value, record id)`. A unique index rejects a
    /// second entry for the same encoded value.
    pub fn add_entry(
        &self,
        txn: &mut dyn KvTransaction,
        value: &Value,
        record_id: &[u8],
    ) -> Result<()> {
        let encoded = encode_key(value);
        if self.unique {
            if txn.get(&self.bucket(), &encoded)?.is_some() {
                return Err(Error::ConstraintViolation(format!(
                    "unique index {:?} already contains value {}",
                    self.name, value
                )));
            }
            txn.put(&self.bucket(), &encoded, record_id)?;
        } else {
            let mut key = encoded;
            key.extend_from_slice(record_id);
            txn.put(&self.bucket(), &key, &[])?;
        }
        Ok(())
    }

    /// Removes the entry for `(value, record id)`.
    pub fn remove_entry(
        &self,
        txn: &mut dyn KvTransaction,
        value: &Value,
        record_id: &[u8],
    ) -> Result<()> {
        let mut key = encode_key(value);
        if !self.unique {
            key.extend_from_slice(record_id);
        }
        txn.delete(&self.bucket(), &key)?;
        Ok(())
    }

    /// Extracts the record id from one stored entry.
    pub fn entry_record_id(&self, entry_key: &[u8], entry_value: &[u8]) -> Result<Vec<u8>> {
        if self.unique {
            Ok(entry_value.to_vec())
        } else {
            let (_, consumed) = decode_value(entry_key)?;
            Ok(entry_key[consumed..].to_vec())
        }
    }
}

/// A value range over one indexed field, as produced by index matching.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRange {
    pub low: Option<Value>,
    pub high: Option<Value>,
    pub low_inclusive: bool,
    pub high_inclusive: bool,
}

impl IndexRange {
    pub fn unbounded() -> IndexRange {
        IndexRange { low: None, high: None, low_inclusive: true, high_inclusive: true }
    }

    pub fn exact(value: Value) -> IndexRange {
        IndexRange {
            low: Some(value.clone()),
            high: Some(value),
            low_inclusive: true,
            high_inclusive: true,
        }
    }

    /// True when no value can satisfy the range.
    pub fn is_empty(&self) -> bool {
        match (&self.low, &self.high) {
            (Some(low), Some(high)) => {
                if low.kind() != high.kind() {
                    // bounds of different kinds cannot both hold
                    return true;
                }
                match low.cmp_total(high) {
                    Ordering::Greater => true,
                    Ordering::Equal => !(self.low_inclusive && self.high_inclusive),
                    Ordering::Less => false,
                }
            }
            _ => false,
        }
    }

    fn kind_region(kind: Kind) -> (u8, u8) {
        match kind {
            Kind::Null => (tag::NULL, tag::NULL + 1),
            Kind::Number => (tag::NUMBER, tag::NUMBER + 1),
            Kind::Bool => (tag::FALSE, tag::TRUE + 1),
            Kind::Text => (tag::TEXT, tag::TEXT + 1),
            Kind::Blob => (tag::BLOB, tag::BLOB + 1),
            Kind::Array => (tag::ARRAY, tag::ARRAY + 1),
            Kind::Document => (tag::DOCUMENT, tag::DOCUMENT + 1),
        }
    }

    /// Byte bounds over the entry keyspace. An open side is clamped to the
    /// kind region of the bounded side.
    pub fn to_bounds(&self) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        let lower = match &self.low {
            Some(value) => {
                let encoded = encode_key(value);
                if self.low_inclusive {
                    Bound::Included(encoded)
                } else {
                    // skip every entry extending this exact value
                    match prefix_successor(&encoded) {
                        Some(next) => Bound::Included(next),
                        None => Bound::Unbounded,
                    }
                }
            }
            None => match &self.high {
                Some(high) => Bound::Included(vec![Self::kind_region(high.kind()).0]),
                None => Bound::Unbounded,
            },
        };
        let upper = match &self.high {
            Some(value) => {
                let encoded = encode_key(value);
                if self.high_inclusive {
                    match prefix_successor(&encoded) {
                        Some(next) => Bound::Excluded(next),
                        None => Bound::Unbounded,
                    }
                } else {
                    Bound::Excluded(encoded)
                }
            }
            None => match &self.low {
                Some(low) => Bound::Excluded(vec![Self::kind_region(low.kind()).1]),
                None => Bound::Unbounded,
            },
        };
        (lower, upper)
    }
}
