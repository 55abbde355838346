//! # Row Framing and Codec
//!
//! A [`Row`] is a row id plus one [`Value`] per schema column. On disk a
//! row is framed as:
//!
//! ```text
//! +----------------+---------------------+---------------------+ ...
//! | row_id (8, LE) | presence (1) | col0 | presence (1) | col1 | ...
//! +----------------+---------------------+---------------------+ ...
//! ```
//!
//! The presence byte is `0` for NULL (no value bytes follow) or `1`
//! followed by the value's own encoding. Decoding walks the owning
//! schema's columns in order, so a row can only be interpreted against
//! the schema it was written with.

use crate::schema::Schema;
use crate::types::Value;
use eyre::{bail, ensure, Result};

/// Bytes of the row id prefix.
pub const ROW_ID_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    row_id: i64,
    values: Vec<Value>,
}

impl Row {
    /// A row with no id yet; the heap table assigns one on insert.
    pub fn new(values: Vec<Value>) -> Self {
        Self { row_id: 0, values }
    }

    pub fn with_id(row_id: i64, values: Vec<Value>) -> Self {
        Self { row_id, values }
    }

    pub fn row_id(&self) -> i64 {
        self.row_id
    }

    pub fn set_row_id(&mut self, row_id: i64) {
        self.row_id = row_id;
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Encoded size of the framed row.
    pub fn encoded_size(&self) -> usize {
        let mut size = ROW_ID_SIZE;
        for value in &self.values {
            size += 1 + value.encoded_size();
        }
        size
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        buf.extend_from_slice(&self.row_id.to_le_bytes());
        for value in &self.values {
            if value.is_null() {
                buf.push(0);
            } else {
                buf.push(1);
                value.encode_into(&mut buf);
            }
        }
        buf
    }
}

/// Decodes a framed row against `schema`. Fails on truncation, on a
/// presence byte that is neither 0 nor 1, and on malformed value bytes.
pub fn decode_row(data: &[u8], schema: &Schema) -> Result<Row> {
    ensure!(
        data.len() >= ROW_ID_SIZE,
        "row data shorter than the {}-byte row id header",
        ROW_ID_SIZE
    );
    let row_id = i64::from_le_bytes(data[..ROW_ID_SIZE].try_into().unwrap());
    let mut offset = ROW_ID_SIZE;

    let mut values = Vec::with_capacity(schema.column_count());
    for column in schema.columns() {
        ensure!(
            offset < data.len(),
            "row data ends before column '{}'",
            column.name()
        );
        let presence = data[offset];
        offset += 1;
        match presence {
            0 => values.push(Value::Null),
            1 => {
                let (value, consumed) = Value::decode(&data[offset..], column.data_type())?;
                offset += consumed;
                values.push(value);
            }
            other => bail!(
                "invalid presence byte {:#04x} for column '{}'",
                other,
                column.name()
            ),
        }
    }

    Ok(Row::with_id(row_id, values))
}
