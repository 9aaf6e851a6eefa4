//! Packed-tuple row encoding for fixed-size heap records.
//!
//! A row is packed as a leading NULL bitmap (one bit per column, `ceil(n/8)`
//! bytes) followed by each column's value at its declared [`SqlType::byte_len`]
//! width, in schema order. NULL columns still reserve their full width (zeroed)
//! so every record for a table is exactly `record_size(schema)` bytes, letting
//! the heap file treat rows as opaque fixed-size slots.

use crate::{DbError, DbResult};
use types::{SqlType, Value};

fn null_bitmap_len(num_cols: usize) -> usize {
    num_cols.div_ceil(8)
}

/// Total byte width of a packed row for `schema`, including the NULL bitmap.
pub fn record_size(schema: &[SqlType]) -> usize {
    null_bitmap_len(schema.len()) + schema.iter().map(SqlType::byte_len).sum::<usize>()
}

fn bit_set(bitmap: &mut [u8], idx: usize) {
    bitmap[idx / 8] |= 1 << (idx % 8);
}

fn bit_is_set(bitmap: &[u8], idx: usize) -> bool {
    bitmap[idx / 8] & (1 << (idx % 8)) != 0
}

/// Packs `values` according to `schema` into a fixed-width byte buffer.
pub fn encode_row(schema: &[SqlType], values: &[Value]) -> DbResult<Vec<u8>> {
    if schema.len() != values.len() {
        return Err(DbError::InvalidValueCount(format!(
            "expected {} values, got {}",
            schema.len(),
            values.len()
        )));
    }

    let bitmap_len = null_bitmap_len(schema.len());
    let mut buf = vec![0u8; record_size(schema)];
    let mut offset = bitmap_len;

    for (i, (ty, value)) in schema.iter().zip(values.iter()).enumerate() {
        let width = ty.byte_len();
        if matches!(value, Value::Null) {
            bit_set(&mut buf[..bitmap_len], i);
            offset += width;
            continue;
        }
        let field = &mut buf[offset..offset + width];
        match (ty, value) {
            (SqlType::Int, Value::Int(v)) => {
                let v = i32::try_from(*v).map_err(|_| {
                    DbError::IncompatibleType(format!("INT value {v} out of 4-byte range"))
                })?;
                field.copy_from_slice(&v.to_le_bytes());
            }
            (SqlType::Float, Value::Float(v)) => {
                field.copy_from_slice(&(*v as f32).to_le_bytes());
            }
            (SqlType::Float, Value::Int(v)) => {
                field.copy_from_slice(&(*v as f32).to_le_bytes());
            }
            (SqlType::String(n), Value::Text(s)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *n as usize {
                    return Err(DbError::StringOverflow(format!(
                        "value {bytes_len} bytes exceeds column width {n}",
                        bytes_len = bytes.len()
                    )));
                }
                field[..bytes.len()].copy_from_slice(bytes);
            }
            (SqlType::Datetime, Value::Datetime(s)) => {
                if !Value::validate_datetime(s) {
                    return Err(DbError::InvalidDatetimeFormat(s.clone()));
                }
                field.copy_from_slice(s.as_bytes());
            }
            (SqlType::Bool, Value::Bool(b)) => {
                field[0] = *b as u8;
            }
            (SqlType::Text, _) => {
                return Err(DbError::Internal(
                    "variable-length TEXT has no packed width; use STRING(n)".into(),
                ));
            }
            (ty, value) => {
                return Err(DbError::IncompatibleType(format!(
                    "cannot encode {value:?} into column of type {ty:?}"
                )));
            }
        }
        offset += width;
    }

    Ok(buf)
}

/// Unpacks a fixed-width buffer produced by [`encode_row`] back into values.
pub fn decode_row(schema: &[SqlType], buf: &[u8]) -> DbResult<Vec<Value>> {
    let bitmap_len = null_bitmap_len(schema.len());
    if buf.len() != record_size(schema) {
        return Err(DbError::Internal(format!(
            "record buffer is {} bytes, expected {}",
            buf.len(),
            record_size(schema)
        )));
    }

    let bitmap = &buf[..bitmap_len];
    let mut offset = bitmap_len;
    let mut values = Vec::with_capacity(schema.len());

    for (i, ty) in schema.iter().enumerate() {
        let width = ty.byte_len();
        let field = &buf[offset..offset + width];
        if bit_is_set(bitmap, i) {
            values.push(Value::Null);
            offset += width;
            continue;
        }
        let value = match ty {
            SqlType::Int => Value::Int(i32::from_le_bytes(field.try_into().unwrap()) as i64),
            SqlType::Float => Value::Float(f32::from_le_bytes(field.try_into().unwrap()) as f64),
            SqlType::String(_) => {
                let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
                Value::Text(String::from_utf8_lossy(&field[..end]).into_owned())
            }
            SqlType::Datetime => {
                Value::Datetime(String::from_utf8_lossy(field).into_owned())
            }
            SqlType::Bool => Value::Bool(field[0] != 0),
            SqlType::Text => {
                return Err(DbError::Internal(
                    "variable-length TEXT has no packed width; use STRING(n)".into(),
                ));
            }
        };
        values.push(value);
        offset += width;
    }

    Ok(values)
}
