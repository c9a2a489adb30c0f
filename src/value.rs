//! Decoded scalar values and their comparison against grammar literals.

use crate::ast::Literal;
use serde::Serialize;
use std::fmt;

/// A single decoded scalar (leaf of the parse tree).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// 1/2/4/8-byte reads, bit fields, varints and packet numbers.
    Uint(u64),
    /// 16-byte literal block.
    Wide(u128),
    #[serde(serialize_with = "serialize_hex")]
    Bytes(Vec<u8>),
    /// Output of a `format` transform.
    Text(String),
}

fn serialize_hex<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(x) => Some(*x),
            Value::Wide(x) => u64::try_from(*x).ok(),
            Value::Text(t) => parse_int(t).and_then(|v| u64::try_from(v).ok()),
            Value::Bytes(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Uint(x) => Some(*x as i128),
            Value::Wide(x) => i128::try_from(*x).ok(),
            Value::Text(t) => parse_int(t),
            Value::Bytes(_) => None,
        }
    }

    /// Equality against a grammar literal, used by `values`, `conditions` and
    /// trigger lookup tables.
    pub fn matches(&self, literal: &Literal) -> bool {
        match (self, literal) {
            (Value::Text(t), Literal::Str(s)) if t == s => true,
            (Value::Bytes(b), Literal::Str(s)) => {
                let s = s.strip_prefix("0x").unwrap_or(s);
                hex::decode(s).map(|d| d == *b).unwrap_or(false)
            }
            (Value::Bytes(_), _) => false,
            (_, Literal::Int(i)) => self.as_integer() == Some(*i as i128),
            (_, Literal::Str(s)) => match (self.as_integer(), parse_int(s)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (_, Literal::Bool(b)) => self.as_integer() == Some(*b as i128),
        }
    }
}

/// Parse decimal or `0x`-prefixed hex text.
pub(crate) fn parse_int(text: &str) -> Option<i128> {
    let t = text.trim();
    if let Some(h) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        i128::from_str_radix(h, 16).ok()
    } else {
        t.parse().ok()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(x) => write!(f, "{}", x),
            Value::Wide(x) => write!(f, "{:#034x}", x),
            Value::Bytes(b) => write!(f, "hex({})", hex::encode(b)),
            Value::Text(t) => f.write_str(t),
        }
    }
}
