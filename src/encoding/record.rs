//! # Record Encoding
//!
//! The full-fidelity codec for stored records and catalog entries. Unlike
//! the key codec it is not order-preserving; in exchange it round-trips
//! records exactly, including integer widths and field order.
//!
//! ## Layout
//!
//! ```text
//! record  := varint(field count) field*
//! field   := varint(name len) name-bytes type-tag varint(payload len) payload
//! ```
//!
//! Integer payloads are fixed-width big-endian two's complement, floats
//! are raw IEEE-754 bits, text and blob are raw bytes, arrays are a varint
//! element count followed by `type-tag varint(len) payload` triples, and
//! documents nest a full record encoding.
//!
//! Decoding fails with `BadEncoding` on unknown type tags or when a
//! declared length overruns the buffer. Encoding is total on legal values.

use crate::document::{Field, FieldBuffer};
use crate::encoding::varint::{read_varint, write_varint};
use crate::error::{Error, Result};
use crate::types::Value;

mod type_tag {
    pub const NULL: u8 = 1;
    pub const BOOL: u8 = 2;
    pub const INT8: u8 = 3;
    pub const INT16: u8 = 4;
    pub const INT32: u8 = 5;
    pub const INT64: u8 = 6;
    pub const UINT8: u8 = 7;
    pub const UINT16: u8 = 8;
    pub const UINT32: u8 = 9;
    pub const UINT64: u8 = 10;
    pub const FLOAT64: u8 = 11;
    pub const TEXT: u8 = 12;
    pub const BLOB: u8 = 13;
    pub const ARRAY: u8 = 14;
    pub const DOCUMENT: u8 = 15;
}

fn value_tag(value: &Value) -> u8 {
    match value {
        Value::Null => type_tag::NULL,
        Value::Bool(_) => type_tag::BOOL,
        Value::Int8(_) => type_tag::INT8,
        Value::Int16(_) => type_tag::INT16,
        Value::Int32(_) => type_tag::INT32,
        Value::Int64(_) => type_tag::INT64,
        Value::Uint8(_) => type_tag::UINT8,
        Value::Uint16(_) => type_tag::UINT16,
        Value::Uint32(_) => type_tag::UINT32,
        Value::Uint64(_) => type_tag::UINT64,
        Value::Float64(_) => type_tag::FLOAT64,
        Value::Text(_) => type_tag::TEXT,
        Value::Blob(_) => type_tag::BLOB,
        Value::Array(_) => type_tag::ARRAY,
        Value::Document(_) => type_tag::DOCUMENT,
    }
}

fn write_payload(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => buf.push(*b as u8),
        Value::Int8(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Int16(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Int32(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Int64(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Uint8(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Uint16(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Uint32(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Uint64(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Float64(v) => buf.extend_from_slice(&v.to_bits().to_be_bytes()),
        Value::Text(s) => buf.extend_from_slice(s.as_bytes()),
        Value::Blob(b) => buf.extend_from_slice(b),
        Value::Array(items) => {
            write_varint(items.len() as u64, buf);
            for item in items {
                write_value(item, buf);
            }
        }
        Value::Document(doc) => encode_record(doc, buf),
    }
}

fn write_value(value: &Value, buf: &mut Vec<u8>) {
    buf.push(value_tag(value));
    let mut payload = Vec::new();
    write_payload(value, &mut payload);
    write_varint(payload.len() as u64, buf);
    buf.extend_from_slice(&payload);
}

/// Appends the record encoding of a field buffer.
pub fn encode_record(record: &FieldBuffer, buf: &mut Vec<u8>) {
    write_varint(record.len() as u64, buf);
    for field in record.iter() {
        write_varint(field.name.len() as u64, buf);
        buf.extend_from_slice(field.name.as_bytes());
        write_value(&field.value, buf);
    }
}

/// Encodes a record into a fresh buffer.
pub fn encode(record: &FieldBuffer) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_record(record, &mut buf);
    buf
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| Error::BadEncoding("declared length overruns buffer".to_string()))?;
    let slice = &buf[*pos..end];
    *pos = end;
    Ok(slice)
}

fn fixed<const N: usize>(payload: &[u8]) -> Result<[u8; N]> {
    payload
        .try_into()
        .map_err(|_| Error::BadEncoding(format!("expected {}-byte payload, got {}", N, payload.len())))
}

fn read_value(buf: &[u8], pos: &mut usize) -> Result<Value> {
    let tag = *buf
        .get(*pos)
        .ok_or_else(|| Error::BadEncoding("missing type tag".to_string()))?;
    *pos += 1;
    let (len, read) = read_varint(&buf[*pos..])?;
    *pos += read;
    let payload = take(buf, pos, len as usize)?;

    let value = match tag {
        type_tag::NULL => Value::Null,
        type_tag::BOOL => Value::Bool(fixed::<1>(payload)?[0] != 0),
        type_tag::INT8 => Value::Int8(i8::from_be_bytes(fixed(payload)?)),
        type_tag::INT16 => Value::Int16(i16::from_be_bytes(fixed(payload)?)),
        type_tag::INT32 => Value::Int32(i32::from_be_bytes(fixed(payload)?)),
        type_tag::INT64 => Value::Int64(i64::from_be_bytes(fixed(payload)?)),
        type_tag::UINT8 => Value::Uint8(u8::from_be_bytes(fixed(payload)?)),
        type_tag::UINT16 => Value::Uint16(u16::from_be_bytes(fixed(payload)?)),
        type_tag::UINT32 => Value::Uint32(u32::from_be_bytes(fixed(payload)?)),
        type_tag::UINT64 => Value::Uint64(u64::from_be_bytes(fixed(payload)?)),
        type_tag::FLOAT64 => Value::Float64(f64::from_bits(u64::from_be_bytes(fixed(payload)?))),
        type_tag::TEXT => Value::Text(
            std::str::from_utf8(payload)
                .map_err(|_| Error::BadEncoding("text payload is not valid utf-8".to_string()))?
                .to_string(),
        ),
        type_tag::BLOB => Value::Blob(payload.to_vec()),
        type_tag::ARRAY => {
            let mut inner = 0usize;
            let (count, read) = read_varint(payload)?;
            inner += read;
            let mut items = Vec::with_capacity(count.min(4096) as usize);
            for _ in 0..count {
                items.push(read_value(payload, &mut inner)?);
            }
            if inner != payload.len() {
                return Err(Error::BadEncoding("trailing bytes in array payload".to_string()));
            }
            Value::Array(items)
        }
        type_tag::DOCUMENT => {
            let mut inner = 0usize;
            let doc = read_record(payload, &mut inner)?;
            if inner != payload.len() {
                return Err(Error::BadEncoding(
                    "trailing bytes in document payload".to_string(),
                ));
            }
            Value::Document(doc)
        }
        other => return Err(Error::BadEncoding(format!("unknown type tag {}", other))),
    };
    Ok(value)
}

fn read_record(buf: &[u8], pos: &mut usize) -> Result<FieldBuffer> {
    let (count, read) = read_varint(&buf[*pos..])?;
    *pos += read;
    let mut record = FieldBuffer::new();
    for _ in 0..count {
        let (name_len, read) = read_varint(&buf[*pos..])?;
        *pos += read;
        let name_bytes = take(buf, pos, name_len as usize)?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| Error::BadEncoding("field name is not valid utf-8".to_string()))?
            .to_string();
        let value = read_value(buf, pos)?;
        record.add(Field::new(name, value))?;
    }
    Ok(record)
}

/// Decodes a record, requiring the buffer to be fully consumed.
pub fn decode(buf: &[u8]) -> Result<FieldBuffer> {
    let mut pos = 0;
    let record = read_record(buf, &mut pos)?;
    if pos != buf.len() {
        return Err(Error::BadEncoding("trailing bytes after record".to_string()));
    }
    Ok(record)
}
