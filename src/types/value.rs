//! # Runtime Value Representation
//!
//! `Value` is the tagged sum the whole engine trades in: the row codec
//! encodes it, the executor evaluates expressions over it, and the CLI
//! formats it.
//!
//! ## Encoding
//!
//! | Variant | Bytes |
//! |---------|-------|
//! | Int32   | 4, little-endian |
//! | Int64   | 8, little-endian |
//! | Float32 | 4, IEEE-754 bits little-endian |
//! | Float64 | 8, IEEE-754 bits little-endian |
//! | Text    | u16 length prefix + raw UTF-8 |
//! | Bool    | 1 byte, 0 or 1 |
//! | Null    | nothing — presence is a row-level concern |
//!
//! ## Comparison
//!
//! NULL compared to anything yields `None` (SQL UNKNOWN). Int32/Int64 are
//! widened to i64, Float32/Float64 to f64; integers compare against floats
//! by promotion. Cross-type comparisons otherwise yield `None`.

use crate::types::DataType;
use eyre::{bail, ensure, Result};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The column type this value naturally belongs to, `None` for NULL.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float32(_) => Some(DataType::Float32),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Text(_) => Some(DataType::Text),
            Value::Bool(_) => Some(DataType::Bool),
        }
    }

    /// Encoded size in bytes, excluding the row-level presence flag.
    pub fn encoded_size(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Int32(_) | Value::Float32(_) => 4,
            Value::Int64(_) | Value::Float64(_) => 8,
            Value::Text(s) => 2 + s.len(),
            Value::Bool(_) => 1,
        }
    }

    /// Appends the encoded bytes to `buf`. NULL encodes to nothing; the
    /// row codec writes the presence flag.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Null => {}
            Value::Int32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Int64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Float32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Float64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Text(s) => {
                buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Bool(v) => buf.push(u8::from(*v)),
        }
    }

    /// Decodes one value of type `data_type` from the front of `data`,
    /// returning the value and the number of bytes consumed.
    pub fn decode(data: &[u8], data_type: DataType) -> Result<(Self, usize)> {
        match data_type {
            DataType::Int32 => {
                ensure!(data.len() >= 4, "row data truncated decoding INT");
                let v = i32::from_le_bytes(data[..4].try_into().unwrap());
                Ok((Value::Int32(v), 4))
            }
            DataType::Int64 => {
                ensure!(data.len() >= 8, "row data truncated decoding BIGINT");
                let v = i64::from_le_bytes(data[..8].try_into().unwrap());
                Ok((Value::Int64(v), 8))
            }
            DataType::Float32 => {
                ensure!(data.len() >= 4, "row data truncated decoding FLOAT");
                let v = f32::from_le_bytes(data[..4].try_into().unwrap());
                Ok((Value::Float32(v), 4))
            }
            DataType::Float64 => {
                ensure!(data.len() >= 8, "row data truncated decoding DOUBLE");
                let v = f64::from_le_bytes(data[..8].try_into().unwrap());
                Ok((Value::Float64(v), 8))
            }
            DataType::Text => {
                ensure!(data.len() >= 2, "row data truncated decoding TEXT length");
                let len = u16::from_le_bytes(data[..2].try_into().unwrap()) as usize;
                ensure!(
                    data.len() >= 2 + len,
                    "row data truncated decoding TEXT body: want {} bytes, have {}",
                    len,
                    data.len() - 2
                );
                let s = std::str::from_utf8(&data[2..2 + len])
                    .map_err(|e| eyre::eyre!("TEXT column is not valid UTF-8: {}", e))?;
                Ok((Value::Text(s.to_string()), 2 + len))
            }
            DataType::Bool => {
                ensure!(data.len() >= 1, "row data truncated decoding BOOL");
                match data[0] {
                    0 => Ok((Value::Bool(false), 1)),
                    1 => Ok((Value::Bool(true), 1)),
                    other => bail!("invalid BOOL byte {:#04x}", other),
                }
            }
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Three-way comparison with SQL NULL semantics: any comparison
    /// involving NULL, and any comparison across incompatible types,
    /// yields `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            return Some(a.cmp(&b));
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Bool(v) => f.write_str(if *v { "true" } else { "false" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value, data_type: DataType) {
        let mut buf = Vec::new();
        value.encode_into(&mut buf);
        assert_eq!(buf.len(), value.encoded_size());
        let (decoded, consumed) = Value::decode(&buf, data_type).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn values_round_trip_through_their_encoding() {
        round_trip(Value::Int32(-7), DataType::Int32);
        round_trip(Value::Int64(1 << 40), DataType::Int64);
        round_trip(Value::Float32(1.5), DataType::Float32);
        round_trip(Value::Float64(-2.25), DataType::Float64);
        round_trip(Value::Text("alice".to_string()), DataType::Text);
        round_trip(Value::Text(String::new()), DataType::Text);
        round_trip(Value::Bool(true), DataType::Bool);
        round_trip(Value::Bool(false), DataType::Bool);
    }

    #[test]
    fn int32_encoding_is_little_endian() {
        let mut buf = Vec::new();
        Value::Int32(0x0102_0304).encode_into(&mut buf);
        assert_eq!(buf, vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn text_encoding_is_length_prefixed() {
        let mut buf = Vec::new();
        Value::Text("ab".to_string()).encode_into(&mut buf);
        assert_eq!(buf, vec![2, 0, b'a', b'b']);
    }

    #[test]
    fn truncated_data_is_rejected() {
        assert!(Value::decode(&[1, 2], DataType::Int32).is_err());
        assert!(Value::decode(&[5, 0, b'x'], DataType::Text).is_err());
        assert!(Value::decode(&[], DataType::Bool).is_err());
    }

    #[test]
    fn null_compares_as_unknown() {
        assert_eq!(Value::Null.compare(&Value::Int32(1)), None);
        assert_eq!(Value::Int32(1).compare(&Value::Null), None);
    }

    #[test]
    fn integers_compare_across_widths() {
        assert_eq!(
            Value::Int32(2).compare(&Value::Int64(10)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Int64(3).compare(&Value::Float64(2.5)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn cross_type_comparison_is_unknown() {
        assert_eq!(Value::Text("1".into()).compare(&Value::Int32(1)), None);
        assert_eq!(Value::Bool(true).compare(&Value::Int32(1)), None);
    }
}
