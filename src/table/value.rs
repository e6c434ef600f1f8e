//! Cell values and their order-preserving key encoding.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::ColumnKind;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
}

// type bytes of the key encoding; null sorts first
const NULL_BYTE: u8 = 0x00;
const ESCAPE_BYTE: u8 = 0xFF;
const TEXT_TERMINATOR: [u8; 2] = [0x00, 0x01];

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Kind of the value, `None` for null.
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnKind::Bool),
            Value::Int(_) => Some(ColumnKind::Int),
            Value::Uint(_) => Some(ColumnKind::Uint),
            Value::Float(_) => Some(ColumnKind::Float),
            Value::Text(_) => Some(ColumnKind::Text),
        }
    }

    /// Parse a literal into a value of the given kind.
    ///
    /// `NULL` (any case) is null for every kind.
    pub fn parse(kind: ColumnKind, literal: &str) -> Option<Value> {
        if literal.eq_ignore_ascii_case("null") {
            return Some(Value::Null);
        }
        match kind {
            ColumnKind::Bool => literal.parse().ok().map(Value::Bool),
            ColumnKind::Int => literal.parse().ok().map(Value::Int),
            ColumnKind::Uint => literal.parse().ok().map(Value::Uint),
            ColumnKind::Float => literal
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float),
            ColumnKind::Text => Some(Value::Text(literal.to_string())),
        }
    }

    /// Append the memcomparable encoding of this value.
    ///
    /// For two values of the same kind, byte order of the encodings equals
    /// the natural order of the values. Text is escaped and terminated so a
    /// prefix sorts before its extensions even when more key columns follow.
    pub(crate) fn encode_key(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(NULL_BYTE),
            Value::Bool(b) => {
                out.push(ColumnKind::Bool.code());
                out.push(u8::from(*b));
            }
            Value::Int(i) => {
                out.push(ColumnKind::Int.code());
                out.extend_from_slice(&((*i as u64) ^ (1 << 63)).to_be_bytes());
            }
            Value::Uint(u) => {
                out.push(ColumnKind::Uint.code());
                out.extend_from_slice(&u.to_be_bytes());
            }
            Value::Float(f) => {
                out.push(ColumnKind::Float.code());
                // -0.0 == 0.0, so both must land on one key
                let bits = if *f == 0.0 { 0.0f64.to_bits() } else { f.to_bits() };
                let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
                out.extend_from_slice(&ordered.to_be_bytes());
            }
            Value::Text(s) => {
                out.push(ColumnKind::Text.code());
                for byte in s.as_bytes() {
                    out.push(*byte);
                    if *byte == 0x00 {
                        out.push(ESCAPE_BYTE);
                    }
                }
                out.extend_from_slice(&TEXT_TERMINATOR);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Uint(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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
