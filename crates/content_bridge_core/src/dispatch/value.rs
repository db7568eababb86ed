//! Boundary call values and response envelopes.

use crate::error::BridgeError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Error code reported for every failed call.
pub const ERROR_CODE_EXCEPTION: &str = "exception";
/// Fixed human-readable message for every failed call.
pub const ERROR_MESSAGE: &str = "Internal error.";

/// Value carried by boundary calls, mirroring a standard message codec.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    Map(BTreeMap<String, CallValue>),
}

impl CallValue {
    /// Builds a map value from `(key, value)` pairs.
    pub fn map<const N: usize>(entries: [(&str, CallValue); N]) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }

    pub fn optional_str(value: Option<String>) -> Self {
        value.map(Self::Str).unwrap_or(Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    /// Looks up `key` when this value is a map.
    pub fn get(&self, key: &str) -> Option<&CallValue> {
        match self {
            Self::Map(entries) => entries.get(key),
            _ => None,
        }
    }
}

impl From<&str> for CallValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for CallValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for CallValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Vec<u8>> for CallValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// One inbound call: method name plus arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub arguments: CallValue,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: CallValue) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// Outcome reported back across the boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResponse {
    Success {
        value: CallValue,
    },
    Error {
        code: String,
        message: String,
        details: String,
    },
    NotImplemented,
}

impl MethodResponse {
    pub fn success(value: CallValue) -> Self {
        Self::Success { value }
    }

    /// Generic internal error carrying `cause` for diagnostics.
    pub fn internal_error(cause: &BridgeError) -> Self {
        Self::Error {
            code: ERROR_CODE_EXCEPTION.to_string(),
            message: ERROR_MESSAGE.to_string(),
            details: cause.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Success payload, if any.
    pub fn value(&self) -> Option<&CallValue> {
        match self {
            Self::Success { value } => Some(value),
            _ => None,
        }
    }
}
