// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for ua104.
//!
//! Protocol-agnostic identifiers, the value model shared between the OPC UA
//! side and the IEC 104 side, and the per-server connection state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Identifiers
// =============================================================================

/// A unique identifier for a configured OPC UA server.
///
/// # Examples
///
/// ```
/// use ua104_core::types::ServerId;
///
/// let id = ServerId::new("plant-a");
/// assert_eq!(id.as_str(), "plant-a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Creates a new server ID.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ServerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a configured OPC UA node to IEC 104 point mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingId(u64);

impl MappingId {
    /// Creates a new mapping ID.
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric ID.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MappingId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// IEC 104 Information Object Address (24-bit).
pub type IoAddress = u32;

/// IEC 104 Common Address of ASDU (station address).
pub type CommonAddress = u16;

/// Largest IOA representable in the three-octet IEC 104 address field.
pub const MAX_IO_ADDRESS: IoAddress = 0x00FF_FFFF;

// =============================================================================
// ConnectionState
// =============================================================================

/// Connection state of one OPC UA server.
///
/// ```text
/// Disconnected ──connect──► Connecting ──ok──► Connected
///      ▲                        │                  │
///      │                       err              failure
///      │                        ▼                  ▼
///      └──────disconnect────── Error ◄─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No live handle.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// A live handle is registered.
    Connected,
    /// The last attempt or the live connection failed.
    Error,
}

impl ConnectionState {
    /// Returns `true` if a live handle is registered.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Returns `true` if the state reflects a failure.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, ConnectionState::Error)
    }

    /// Returns the canonical upper-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Error => "ERROR",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disconnected" => Ok(ConnectionState::Disconnected),
            "connecting" => Ok(ConnectionState::Connecting),
            "connected" => Ok(ConnectionState::Connected),
            "error" => Ok(ConnectionState::Error),
            other => Err(format!("unknown connection state '{}'", other)),
        }
    }
}

// =============================================================================
// Value
// =============================================================================

/// A scalar value travelling from an OPC UA data change to a sink.
///
/// OPC UA variants are narrowed to this model before they leave the
/// subscription engine; the IEC 104 side converts it per point type.
///
/// # Examples
///
/// ```
/// use ua104_core::types::Value;
///
/// assert_eq!(Value::Int(1).as_bool(), Some(true));
/// assert_eq!(Value::String("2.5".into()).as_f64(), Some(2.5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer that does not fit `i64`.
    UInt(u64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    String(String),
    /// Missing value.
    Null,
}

impl Value {
    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Null => "null",
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interprets the value as a boolean.
    ///
    /// Numbers are `true` when non-zero; strings accept `true`/`false`,
    /// `on`/`off` and numeric text.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::UInt(v) => Some(*v != 0),
            Value::Float(v) if v.is_nan() => None,
            Value::Float(v) => Some(*v != 0.0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "on" => Some(true),
                "false" | "off" => Some(false),
                other => other.parse::<f64>().ok().filter(|v| !v.is_nan()).map(|v| v != 0.0),
            },
            Value::Null => None,
        }
    }

    /// Interprets the value as a signed integer.
    ///
    /// Floats are accepted only when they carry no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Float(v) => float_to_i64(*v),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_i64))
            }
            Value::Null => None,
        }
    }

    /// Interprets the value as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) if v.is_finite() => Some(*v),
            Value::Float(_) => None,
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Value::Null => None,
        }
    }
}

fn float_to_i64(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_id() {
        let id = ServerId::from("plant-a");
        assert_eq!(id.to_string(), "plant-a");
        assert_eq!(id, ServerId::new("plant-a".to_string()));
    }

    #[test]
    fn test_connection_state_labels() {
        assert_eq!(ConnectionState::Connected.to_string(), "CONNECTED");
        assert_eq!("error".parse::<ConnectionState>().unwrap(), ConnectionState::Error);
        assert!("bogus".parse::<ConnectionState>().is_err());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_value_as_bool() {
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::Float(0.5).as_bool(), Some(true));
        assert_eq!(Value::from("on").as_bool(), Some(true));
        assert_eq!(Value::from("0").as_bool(), Some(false));
        assert_eq!(Value::from("maybe").as_bool(), None);
        assert_eq!(Value::Null.as_bool(), None);
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);
        assert_eq!(Value::UInt(u64::MAX).as_i64(), None);
        assert_eq!(Value::from(" 42 ").as_i64(), Some(42));
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
    }

    #[test]
    fn test_value_as_f64() {
        assert_eq!(Value::Int(-2).as_f64(), Some(-2.0));
        assert_eq!(Value::Float(f64::NAN).as_f64(), None);
        assert_eq!(Value::from("1e3").as_f64(), Some(1000.0));
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn test_value_serde_untagged() {
        let json = serde_json::to_string(&Value::Float(1.5)).unwrap();
        assert_eq!(json, "1.5");
        let back: Value = serde_json::from_str("true").unwrap();
        assert_eq!(back, Value::Bool(true));
    }
}
