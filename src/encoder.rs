//! Outbound value normalization.
//!
//! Anything written to a port is first turned into an [`OutboundValue`] and
//! then encoded to bytes. Numbers are truncated to their low 8 bits and read
//! as unsigned, so `-1` becomes `0xFF` and `256` becomes `0x00`.

use crate::error::{SerialError, SerialResult};
use serde_json::Value;

/// The shapes a port accepts for writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundValue {
    /// A single number, sent as one byte.
    Number(i64),
    /// Numbers sent one byte each, in order.
    Numbers(Vec<i64>),
    /// Bytes sent as-is.
    Bytes(Vec<u8>),
}

/// Low 8 bits of `value`.
#[inline]
pub fn truncate(value: i64) -> u8 {
    value as u8
}

/// Encode a value into the bytes that go on the wire.
pub fn encode(value: &OutboundValue) -> Vec<u8> {
    match value {
        OutboundValue::Number(n) => vec![truncate(*n)],
        OutboundValue::Numbers(ns) => ns.iter().copied().map(truncate).collect(),
        OutboundValue::Bytes(bytes) => bytes.clone(),
    }
}

/// Classify a JSON value and encode it.
pub fn encode_json(value: &Value) -> SerialResult<Vec<u8>> {
    OutboundValue::try_from(value).map(|v| encode(&v))
}

impl OutboundValue {
    /// Number of bytes this value encodes to.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Number(_) => 1,
            Self::Numbers(ns) => ns.len(),
            Self::Bytes(bytes) => bytes.len(),
        }
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_u64().map(|u| u as i64)),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl TryFrom<&Value> for OutboundValue {
    type Error = SerialError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        if let Some(n) = integer(value) {
            return Ok(Self::Number(n));
        }
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    integer(item).ok_or_else(|| {
                        SerialError::unsupported(format!("array containing {}", kind_of(item)))
                    })
                })
                .collect::<SerialResult<Vec<_>>>()
                .map(Self::Numbers),
            other => Err(SerialError::unsupported(kind_of(other))),
        }
    }
}

impl From<u8> for OutboundValue {
    fn from(value: u8) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for OutboundValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for OutboundValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<Vec<u8>> for OutboundValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for OutboundValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for OutboundValue {
    fn from(value: &[u8; N]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Vec<i64>> for OutboundValue {
    fn from(value: Vec<i64>) -> Self {
        Self::Numbers(value)
    }
}

impl From<&[i64]> for OutboundValue {
    fn from(value: &[i64]) -> Self {
        Self::Numbers(value.to_vec())
    }
}

impl From<Vec<i32>> for OutboundValue {
    fn from(value: Vec<i32>) -> Self {
        Self::Numbers(value.into_iter().map(i64::from).collect())
    }
}
