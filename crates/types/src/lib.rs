//! Scalar SQL types and values shared across every storage and execution layer.
//!
//! Column types follow a fixed-width, disk-friendly layout: `INT` and `FLOAT`
//! are 4 bytes, `STRING(n)` is `n` bytes, `DATETIME` is 19 bytes
//! (`YYYY-MM-DD HH:MM:SS`, lexicographically sortable as raw bytes).

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Length in bytes of a fixed `DATETIME` column (`YYYY-MM-DD HH:MM:SS`).
pub const DATETIME_LEN: usize = 19;

/// A column's declared SQL type. `Text`/`Bool` are retained beyond the wire
/// surface named in the data model for parser- and catalog-internal use;
/// `Float` and `Datetime` are the additional column types the data model
/// requires, and `String(n)` is the fixed-length variant of `Text`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    Int,
    Float,
    /// Fixed-length character column, `n` bytes wide.
    String(u16),
    Datetime,
    Text,
    Bool,
}

impl SqlType {
    /// Byte width of a value of this type inside a packed tuple.
    pub fn byte_len(&self) -> usize {
        match self {
            SqlType::Int => 4,
            SqlType::Float => 4,
            SqlType::String(n) => *n as usize,
            SqlType::Datetime => DATETIME_LEN,
            // Variable-length text is not part of the fixed-record data model;
            // callers that need a packed width must use `String(n)` instead.
            SqlType::Text => 0,
            SqlType::Bool => 1,
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    /// Fixed-length string value; always padded/validated to a column's declared length.
    Text(String),
    Datetime(String),
    Bool(bool),
    Null,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Datetime(a), Value::Datetime(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Datetime(s) => s.hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Coerces an `Int`/`Float` value to `f64` for cross-type arithmetic/comparison.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Compares two values of the identical type. `Int`↔`Float` comparisons must
    /// go through [`Value::cmp_numeric`], which promotes both sides to `FLOAT`.
    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Datetime(a), Value::Datetime(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Compares two values, promoting an INT/FLOAT mismatch to FLOAT per the
    /// data model's cross-type comparison rule. Returns `None` for any other
    /// type mismatch.
    pub fn cmp_numeric(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            _ => self.cmp_same_type(other),
        }
    }

    pub fn eq_same_type(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.eq(b)),
            (Value::Float(a), Value::Float(b)) => Some(a == b),
            (Value::Text(a), Value::Text(b)) => Some(a.eq(b)),
            (Value::Datetime(a), Value::Datetime(b)) => Some(a.eq(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.eq(b)),
            _ => None,
        }
    }

    /// Equality with INT/FLOAT cross-type promotion.
    pub fn eq_numeric(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                Some(self.as_f64()? == other.as_f64()?)
            }
            _ => self.eq_same_type(other),
        }
    }

    /// Validates a `DATETIME` string against `YYYY-MM-DD HH:MM:SS`.
    pub fn validate_datetime(s: &str) -> bool {
        if s.len() != DATETIME_LEN {
            return false;
        }
        let bytes = s.as_bytes();
        let digit = |i: usize| bytes[i].is_ascii_digit();
        let expect = |i: usize, c: u8| bytes[i] == c;
        (0..4).all(digit)
            && expect(4, b'-')
            && (5..7).all(digit)
            && expect(7, b'-')
            && (8..10).all(digit)
            && expect(10, b' ')
            && (11..13).all(digit)
            && expect(13, b':')
            && (14..16).all(digit)
            && expect(16, b':')
            && (17..19).all(digit)
    }
}
