//! # Order-Preserving Key Encoding
//!
//! Encodes values into bytes whose unsigned lexicographic order equals the
//! total order of the values. A single `memcmp` is then enough to compare
//! keys, which is what makes the index layout and the sort operator
//! correct.
//!
//! ## Tag Scheme
//!
//! Every encoding starts with a tag byte that fixes the kind rank:
//!
//! ```text
//! 0x01  NULL
//! 0x10  NUMBER      (integers and floats, interleaved numerically)
//! 0x18  FALSE
//! 0x19  TRUE
//! 0x20  TEXT
//! 0x21  BLOB
//! 0x30  ARRAY
//! 0x40  DOCUMENT
//! ```
//!
//! ## Numbers
//!
//! All numeric values share the NUMBER tag so that integers and floats
//! interleave in numeric order. The payload is 17 bytes:
//!
//! - 8 bytes: the value rounded to f64, bit-twiddled so IEEE-754 order
//!   becomes unsigned byte order (negative: all bits inverted;
//!   non-negative: sign bit flipped),
//! - 9 bytes: the exact integer component, biased into an unsigned range.
//!
//! The exact component breaks rounding ties: two distinct 64-bit integers
//! above 2^53 round to the same f64, and the full `[i64::MIN, u64::MAX]`
//! span needs 65 bits, hence 9 bytes.
//!
//! ## Text and Blob
//!
//! Byte strings use escape encoding so embedded zero bytes cannot
//! terminate the key early while order is preserved:
//!
//! ```text
//! 0x00 -> 0x00 0xFF      0xFF -> 0xFF 0x00      terminator: 0x00 0x00
//! ```
//!
//! Empty strings sort before non-empty, and no encoding is a prefix of
//! another, so a key may be extended (index entries append the record id)
//! without disturbing range-scan order.
//!
//! ## Arrays and Documents
//!
//! Recursive: concatenated element (or sorted `name, value` pair)
//! encodings followed by a 0x00 terminator. Element encodings start with a
//! tag >= 0x01, so the terminator is unambiguous and a shorter sequence
//! sorts before any extension of it.

use crate::document::FieldBuffer;
use crate::error::{Error, Result};
use crate::types::{NumKey, Value};

pub mod tag {
    pub const NULL: u8 = 0x01;
    pub const NUMBER: u8 = 0x10;
    pub const FALSE: u8 = 0x18;
    pub const TRUE: u8 = 0x19;
    pub const TEXT: u8 = 0x20;
    pub const BLOB: u8 = 0x21;
    pub const ARRAY: u8 = 0x30;
    pub const DOCUMENT: u8 = 0x40;
}

const TERMINATOR: [u8; 2] = [0x00, 0x00];
const EXACT_BIAS: i128 = 1 << 63;

/// IEEE-754 bits transformed so unsigned byte order matches numeric order.
pub fn f64_order_bits(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits ^ (1 << 63)
    }
}

fn f64_from_order_bits(bits: u64) -> f64 {
    if bits & (1 << 63) != 0 {
        f64::from_bits(bits ^ (1 << 63))
    } else {
        f64::from_bits(!bits)
    }
}

fn write_num_key(key: NumKey, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&f64_order_bits(key.approx).to_be_bytes());
    let biased = (key.exact + EXACT_BIAS) as u128;
    buf.extend_from_slice(&biased.to_be_bytes()[7..16]);
}

fn write_escaped(data: &[u8], buf: &mut Vec<u8>) {
    for &b in data {
        match b {
            0x00 => buf.extend_from_slice(&[0x00, 0xFF]),
            0xFF => buf.extend_from_slice(&[0xFF, 0x00]),
            other => buf.push(other),
        }
    }
    buf.extend_from_slice(&TERMINATOR);
}

fn read_escaped(buf: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let b = *buf
            .get(pos)
            .ok_or_else(|| Error::BadEncoding("unterminated escaped bytes".to_string()))?;
        match b {
            0x00 => {
                let next = *buf.get(pos + 1).ok_or_else(|| {
                    Error::BadEncoding("truncated escape sequence".to_string())
                })?;
                pos += 2;
                match next {
                    0x00 => return Ok((out, pos)),
                    0xFF => out.push(0x00),
                    other => {
                        return Err(Error::BadEncoding(format!(
                            "invalid escape continuation 0x{:02x}",
                            other
                        )))
                    }
                }
            }
            0xFF => {
                let next = *buf.get(pos + 1).ok_or_else(|| {
                    Error::BadEncoding("truncated escape sequence".to_string())
                })?;
                if next != 0x00 {
                    return Err(Error::BadEncoding(format!(
                        "invalid escape continuation 0x{:02x}",
                        next
                    )));
                }
                out.push(0xFF);
                pos += 2;
            }
            other => {
                out.push(other);
                pos += 1;
            }
        }
    }
}

/// Appends the order-preserving encoding of a value.
pub fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => buf.push(tag::NULL),
        Value::Bool(false) => buf.push(tag::FALSE),
        Value::Bool(true) => buf.push(tag::TRUE),
        Value::Text(s) => {
            buf.push(tag::TEXT);
            write_escaped(s.as_bytes(), buf);
        }
        Value::Blob(b) => {
            buf.push(tag::BLOB);
            write_escaped(b, buf);
        }
        Value::Array(items) => {
            buf.push(tag::ARRAY);
            for item in items {
                encode_value(item, buf);
            }
            buf.push(0x00);
        }
        Value::Document(doc) => {
            buf.push(tag::DOCUMENT);
            let mut fields: Vec<_> = doc.iter().collect();
            fields.sort_by(|a, b| a.name.cmp(&b.name));
            for field in fields {
                write_escaped(field.name.as_bytes(), buf);
                encode_value(&field.value, buf);
            }
            buf.push(0x00);
        }
        number => {
            buf.push(tag::NUMBER);
            let key = number.num_key().expect("non-number handled above");
            write_num_key(key, buf);
        }
    }
}

/// Convenience wrapper returning the encoding as a fresh buffer.
pub fn encode_key(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value(value, &mut buf);
    buf
}

/// Decodes one value from the front of `buf`, returning it and the bytes
/// consumed. The number payload is kind-erased, so numbers decode to their
/// canonical form: `Int64` when the value is an exactly-representable
/// integer, `Float64` otherwise.
pub fn decode_value(buf: &[u8]) -> Result<(Value, usize)> {
    let tag_byte = *buf
        .first()
        .ok_or_else(|| Error::BadEncoding("empty key".to_string()))?;
    let rest = &buf[1..];
    match tag_byte {
        tag::NULL => Ok((Value::Null, 1)),
        tag::FALSE => Ok((Value::Bool(false), 1)),
        tag::TRUE => Ok((Value::Bool(true), 1)),
        tag::NUMBER => {
            if rest.len() < 17 {
                return Err(Error::BadEncoding("truncated number key".to_string()));
            }
            let mut approx_bytes = [0u8; 8];
            approx_bytes.copy_from_slice(&rest[..8]);
            let approx = f64_from_order_bits(u64::from_be_bytes(approx_bytes));
            let mut exact_bytes = [0u8; 16];
            exact_bytes[7..16].copy_from_slice(&rest[8..17]);
            let exact = u128::from_be_bytes(exact_bytes) as i128 - EXACT_BIAS;
            let value = if approx.fract() == 0.0
                && exact as f64 == approx
                && i64::try_from(exact).is_ok()
            {
                Value::Int64(exact as i64)
            } else {
                Value::Float64(approx)
            };
            Ok((value, 18))
        }
        tag::TEXT => {
            let (bytes, read) = read_escaped(rest)?;
            let text = String::from_utf8(bytes)
                .map_err(|_| Error::BadEncoding("text key is not valid utf-8".to_string()))?;
            Ok((Value::Text(text), 1 + read))
        }
        tag::BLOB => {
            let (bytes, read) = read_escaped(rest)?;
            Ok((Value::Blob(bytes), 1 + read))
        }
        tag::ARRAY => {
            let mut items = Vec::new();
            let mut pos = 0;
            loop {
                match rest.get(pos) {
                    Some(0x00) => return Ok((Value::Array(items), 1 + pos + 1)),
                    Some(_) => {
                        let (item, read) = decode_value(&rest[pos..])?;
                        items.push(item);
                        pos += read;
                    }
                    None => {
                        return Err(Error::BadEncoding("unterminated array key".to_string()))
                    }
                }
            }
        }
        tag::DOCUMENT => {
            let mut doc = FieldBuffer::new();
            let mut pos = 0;
            loop {
                match rest.get(pos) {
                    // 0x00 is the terminator unless it opens an escaped NUL
                    // in a field name (0x00 0xFF); UTF-8 names never start
                    // with a raw 0xFF, so the lookahead is unambiguous.
                    Some(0x00) if rest.get(pos + 1) != Some(&0xFF) => {
                        return Ok((Value::Document(doc), 1 + pos + 1))
                    }
                    Some(_) => {
                        let (name_bytes, read) = read_escaped(&rest[pos..])?;
                        pos += read;
                        let name = String::from_utf8(name_bytes).map_err(|_| {
                            Error::BadEncoding("field name is not valid utf-8".to_string())
                        })?;
                        let (value, read) = decode_value(&rest[pos..])?;
                        pos += read;
                        doc.add_field(name, value)?;
                    }
                    None => {
                        return Err(Error::BadEncoding("unterminated document key".to_string()))
                    }
                }
            }
        }
        other => Err(Error::BadEncoding(format!("unknown key tag 0x{:02x}", other))),
    }
}

/// The smallest byte string greater than every key starting with `prefix`,
/// or `None` when the prefix is all 0xFF.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(last) = out.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(out);
        }
        out.pop();
    }
    None
}
