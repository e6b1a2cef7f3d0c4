// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Station and point types for the IEC 104 side.
//!
//! # Point Types
//!
//! | Type        | Id | Element            | Quality carried   |
//! |-------------|----|--------------------|-------------------|
//! | `M_SP_NA_1` |  1 | SIQ                | IV NT SB BL       |
//! | `M_DP_NA_1` |  3 | DIQ                | IV NT SB BL       |
//! | `M_ME_NA_1` |  9 | NVA + QDS          | IV NT SB BL OV    |
//! | `M_ME_NB_1` | 11 | SVA + QDS          | IV NT SB BL OV    |
//! | `M_ME_NC_1` | 13 | IEEE 754 + QDS     | IV NT SB BL OV    |
//! | `M_IT_NA_1` | 15 | BCR                | IV                |
//! | `*_TB_1` / `M_ME_T{D,E,F}_1` | 30-37 | as above + CP56Time2a | as above |

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ua104_core::quality::QualityFlags;
use ua104_core::types::{CommonAddress, IoAddress, Value, MAX_IO_ADDRESS};

use crate::error::{Iec104Error, Iec104Result};

// =============================================================================
// Defaults
// =============================================================================

/// Default listen address.
pub const DEFAULT_IP: &str = "0.0.0.0";
/// Default IEC 104 port.
pub const DEFAULT_PORT: u16 = 2404;
/// Default common address.
pub const DEFAULT_COMMON_ADDRESS: CommonAddress = 1;
/// Default t0 (connection establishment / idle before STARTDT), seconds.
pub const DEFAULT_T0_SECS: u64 = 30;
/// Default t1 (send or test APDU acknowledgement), seconds.
pub const DEFAULT_T1_SECS: u64 = 15;
/// Default t2 (acknowledgement without data), seconds.
pub const DEFAULT_T2_SECS: u64 = 10;
/// Default t3 (test frame on idle), seconds.
pub const DEFAULT_T3_SECS: u64 = 20;
/// Default k window.
pub const DEFAULT_K: u16 = 12;
/// Default w window.
pub const DEFAULT_W: u16 = 8;

// =============================================================================
// PointType
// =============================================================================

/// Monitoring-direction information object types a station can publish.
///
/// The `M_SP_TA_1`, `M_DP_TA_1` and `M_IT_TA_1` names are accepted as
/// aliases of their CP56Time2a counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointType {
    /// Single point.
    #[serde(rename = "M_SP_NA_1")]
    SinglePoint,
    /// Single point with time tag.
    #[serde(rename = "M_SP_TB_1", alias = "M_SP_TA_1")]
    SinglePointTime,
    /// Double point.
    #[serde(rename = "M_DP_NA_1")]
    DoublePoint,
    /// Double point with time tag.
    #[serde(rename = "M_DP_TB_1", alias = "M_DP_TA_1")]
    DoublePointTime,
    /// Measured value, normalized.
    #[serde(rename = "M_ME_NA_1")]
    Normalized,
    /// Measured value, normalized, with time tag.
    #[serde(rename = "M_ME_TD_1")]
    NormalizedTime,
    /// Measured value, scaled.
    #[serde(rename = "M_ME_NB_1")]
    Scaled,
    /// Measured value, scaled, with time tag.
    #[serde(rename = "M_ME_TE_1")]
    ScaledTime,
    /// Measured value, short floating point.
    #[serde(rename = "M_ME_NC_1")]
    ShortFloat,
    /// Measured value, short floating point, with time tag.
    #[serde(rename = "M_ME_TF_1")]
    ShortFloatTime,
    /// Integrated totals.
    #[serde(rename = "M_IT_NA_1")]
    Counter,
    /// Integrated totals with time tag.
    #[serde(rename = "M_IT_TB_1", alias = "M_IT_TA_1")]
    CounterTime,
}

impl PointType {
    /// Every point type, in type id order.
    pub const ALL: [PointType; 12] = [
        PointType::SinglePoint,
        PointType::DoublePoint,
        PointType::Normalized,
        PointType::Scaled,
        PointType::ShortFloat,
        PointType::Counter,
        PointType::SinglePointTime,
        PointType::DoublePointTime,
        PointType::NormalizedTime,
        PointType::ScaledTime,
        PointType::ShortFloatTime,
        PointType::CounterTime,
    ];

    /// Returns the type identification octet.
    pub const fn type_id(self) -> u8 {
        match self {
            PointType::SinglePoint => 1,
            PointType::DoublePoint => 3,
            PointType::Normalized => 9,
            PointType::Scaled => 11,
            PointType::ShortFloat => 13,
            PointType::Counter => 15,
            PointType::SinglePointTime => 30,
            PointType::DoublePointTime => 31,
            PointType::NormalizedTime => 34,
            PointType::ScaledTime => 35,
            PointType::ShortFloatTime => 36,
            PointType::CounterTime => 37,
        }
    }

    /// Returns the type for a type identification octet.
    pub fn from_type_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_id() == id)
    }

    /// Returns the standard mnemonic, e.g. `M_SP_NA_1`.
    pub const fn name(self) -> &'static str {
        match self {
            PointType::SinglePoint => "M_SP_NA_1",
            PointType::SinglePointTime => "M_SP_TB_1",
            PointType::DoublePoint => "M_DP_NA_1",
            PointType::DoublePointTime => "M_DP_TB_1",
            PointType::Normalized => "M_ME_NA_1",
            PointType::NormalizedTime => "M_ME_TD_1",
            PointType::Scaled => "M_ME_NB_1",
            PointType::ScaledTime => "M_ME_TE_1",
            PointType::ShortFloat => "M_ME_NC_1",
            PointType::ShortFloatTime => "M_ME_TF_1",
            PointType::Counter => "M_IT_NA_1",
            PointType::CounterTime => "M_IT_TB_1",
        }
    }

    /// Returns `true` if the information element carries a CP56Time2a tag.
    pub const fn is_time_tagged(self) -> bool {
        self.type_id() >= 30
    }

    /// Returns the quality flags this type can carry on the wire.
    pub const fn quality_mask(self) -> QualityFlags {
        match self {
            PointType::SinglePoint
            | PointType::SinglePointTime
            | PointType::DoublePoint
            | PointType::DoublePointTime => QualityFlags::from_bits_truncate(0xF0),
            PointType::Normalized
            | PointType::NormalizedTime
            | PointType::Scaled
            | PointType::ScaledTime
            | PointType::ShortFloat
            | PointType::ShortFloatTime => QualityFlags::from_bits_truncate(0xF1),
            PointType::Counter | PointType::CounterTime => QualityFlags::INVALID,
        }
    }

    /// Returns the value a point holds before its first update.
    pub const fn initial_value(self) -> PointValue {
        match self {
            PointType::SinglePoint | PointType::SinglePointTime => PointValue::Single(false),
            PointType::DoublePoint | PointType::DoublePointTime => PointValue::Double(DoublePointState::Indeterminate),
            PointType::Normalized | PointType::NormalizedTime => PointValue::Normalized(0.0),
            PointType::Scaled | PointType::ScaledTime => PointValue::Scaled(0),
            PointType::ShortFloat | PointType::ShortFloatTime => PointValue::Float(0.0),
            PointType::Counter | PointType::CounterTime => PointValue::Counter(0),
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PointType {
    type Err = Iec104Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        let canonical = match name.as_str() {
            "M_SP_TA_1" => "M_SP_TB_1",
            "M_DP_TA_1" => "M_DP_TB_1",
            "M_IT_TA_1" => "M_IT_TB_1",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|t| t.name() == canonical)
            .ok_or_else(|| Iec104Error::invalid_config(format!("unknown point type '{}'", s)))
    }
}

// =============================================================================
// PointValue
// =============================================================================

/// State of a double point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoublePointState {
    /// 0: intermediate state.
    Intermediate,
    /// 1: determined off.
    Off,
    /// 2: determined on.
    On,
    /// 3: indeterminate state.
    Indeterminate,
}

impl DoublePointState {
    /// Returns the 2-bit wire value.
    pub const fn bits(self) -> u8 {
        match self {
            DoublePointState::Intermediate => 0,
            DoublePointState::Off => 1,
            DoublePointState::On => 2,
            DoublePointState::Indeterminate => 3,
        }
    }

    /// Returns the state of a 2-bit wire value.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(DoublePointState::Intermediate),
            1 => Some(DoublePointState::Off),
            2 => Some(DoublePointState::On),
            3 => Some(DoublePointState::Indeterminate),
            _ => None,
        }
    }
}

/// A value already converted to the representation of its point type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PointValue {
    /// Single point state.
    Single(bool),
    /// Double point state.
    Double(DoublePointState),
    /// Normalized value in `[-1, 1)`.
    Normalized(f32),
    /// Scaled value.
    Scaled(i16),
    /// Short floating point value.
    Float(f32),
    /// Binary counter reading.
    Counter(i32),
}

impl PointValue {
    /// Converts a gateway value to the representation of `point_type`.
    ///
    /// Booleans follow truthiness; integers are truncated toward zero from
    /// floats before the range check.
    ///
    /// # Errors
    ///
    /// Returns [`Iec104Error::InvalidValue`] when the value has no
    /// representation in the point type.
    pub fn convert(point_type: PointType, io_address: IoAddress, value: &Value) -> Iec104Result<Self> {
        let invalid = |reason: String| Iec104Error::invalid_value(io_address, point_type.name(), reason);

        match point_type {
            PointType::SinglePoint | PointType::SinglePointTime => value
                .as_bool()
                .map(PointValue::Single)
                .ok_or_else(|| invalid(format!("{} '{}' is not a boolean", value.type_name(), value))),

            PointType::DoublePoint | PointType::DoublePointTime => {
                let raw = integer(value).ok_or_else(|| invalid(format!("'{}' is not an integer", value)))?;
                u8::try_from(raw)
                    .ok()
                    .and_then(DoublePointState::from_bits)
                    .map(PointValue::Double)
                    .ok_or_else(|| invalid(format!("{} is outside 0..=3", raw)))
            }

            PointType::Normalized | PointType::NormalizedTime => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| invalid(format!("'{}' is not a number", value)))?;
                if (-1.0..1.0).contains(&v) {
                    Ok(PointValue::Normalized(v as f32))
                } else {
                    Err(invalid(format!("{} is outside [-1, 1)", v)))
                }
            }

            PointType::Scaled | PointType::ScaledTime => {
                let raw = integer(value).ok_or_else(|| invalid(format!("'{}' is not an integer", value)))?;
                i16::try_from(raw)
                    .map(PointValue::Scaled)
                    .map_err(|_| invalid(format!("{} is outside the 16-bit range", raw)))
            }

            PointType::ShortFloat | PointType::ShortFloatTime => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| invalid(format!("'{}' is not a number", value)))?;
                let narrowed = v as f32;
                if narrowed.is_finite() {
                    Ok(PointValue::Float(narrowed))
                } else {
                    Err(invalid(format!("{} does not fit a 32-bit float", v)))
                }
            }

            PointType::Counter | PointType::CounterTime => {
                let raw = integer(value).ok_or_else(|| invalid(format!("'{}' is not an integer", value)))?;
                i32::try_from(raw)
                    .map(PointValue::Counter)
                    .map_err(|_| invalid(format!("{} is outside the 32-bit range", raw)))
            }
        }
    }

    /// Returns the value in the gateway's value model.
    pub fn to_value(self) -> Value {
        match self {
            PointValue::Single(v) => Value::Bool(v),
            PointValue::Double(state) => Value::Int(i64::from(state.bits())),
            PointValue::Normalized(v) | PointValue::Float(v) => Value::Float(f64::from(v)),
            PointValue::Scaled(v) => Value::Int(i64::from(v)),
            PointValue::Counter(v) => Value::Int(i64::from(v)),
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Single(v) => write!(f, "{}", v),
            PointValue::Double(state) => write!(f, "{}", state.bits()),
            PointValue::Normalized(v) | PointValue::Float(v) => write!(f, "{}", v),
            PointValue::Scaled(v) => write!(f, "{}", v),
            PointValue::Counter(v) => write!(f, "{}", v),
        }
    }
}

fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .map(f64::trunc)
            .filter(|v| *v >= i64::MIN as f64 && *v <= i64::MAX as f64)
            .map(|v| v as i64)
    })
}

// =============================================================================
// Configuration
// =============================================================================

/// One configured information object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    /// Information object address.
    pub io_address: IoAddress,

    /// Information object type.
    pub point_type: PointType,

    /// Cyclic transmission period in milliseconds; 0 disables it.
    #[serde(default)]
    pub report_interval_ms: u64,

    /// Free text.
    #[serde(default)]
    pub description: Option<String>,
}

impl PointConfig {
    /// Creates a point without cyclic transmission.
    pub fn new(io_address: IoAddress, point_type: PointType) -> Self {
        Self {
            io_address,
            point_type,
            report_interval_ms: 0,
            description: None,
        }
    }

    /// Sets the cyclic transmission period.
    pub fn with_report_interval(mut self, interval_ms: u64) -> Self {
        self.report_interval_ms = interval_ms;
        self
    }
}

/// Configuration of the controlled station.
///
/// Immutable while the station runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Station identifier.
    #[serde(default)]
    pub station_id: u64,

    /// Display name.
    #[serde(default = "default_name")]
    pub name: String,

    /// Listen address.
    #[serde(default = "default_ip")]
    pub ip: String,

    /// Listen port; 0 picks a free port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Common address of ASDU.
    #[serde(default = "default_common_address")]
    pub common_address: CommonAddress,

    /// t0 in seconds.
    #[serde(default = "default_t0")]
    pub t0: u64,

    /// t1 in seconds.
    #[serde(default = "default_t1")]
    pub t1: u64,

    /// t2 in seconds.
    #[serde(default = "default_t2")]
    pub t2: u64,

    /// t3 in seconds.
    #[serde(default = "default_t3")]
    pub t3: u64,

    /// Maximum unacknowledged I-frames sent.
    #[serde(default = "default_k")]
    pub k: u16,

    /// I-frames received before an acknowledgement is due.
    #[serde(default = "default_w")]
    pub w: u16,

    /// Information objects.
    #[serde(default)]
    pub points: Vec<PointConfig>,
}

fn default_name() -> String {
    "station".to_string()
}

fn default_ip() -> String {
    DEFAULT_IP.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_common_address() -> CommonAddress {
    DEFAULT_COMMON_ADDRESS
}

fn default_t0() -> u64 {
    DEFAULT_T0_SECS
}

fn default_t1() -> u64 {
    DEFAULT_T1_SECS
}

fn default_t2() -> u64 {
    DEFAULT_T2_SECS
}

fn default_t3() -> u64 {
    DEFAULT_T3_SECS
}

fn default_k() -> u16 {
    DEFAULT_K
}

fn default_w() -> u16 {
    DEFAULT_W
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_id: 0,
            name: default_name(),
            ip: default_ip(),
            port: DEFAULT_PORT,
            common_address: DEFAULT_COMMON_ADDRESS,
            t0: DEFAULT_T0_SECS,
            t1: DEFAULT_T1_SECS,
            t2: DEFAULT_T2_SECS,
            t3: DEFAULT_T3_SECS,
            k: DEFAULT_K,
            w: DEFAULT_W,
            points: Vec::new(),
        }
    }
}

impl StationConfig {
    /// Creates a configuration with default timers listening on `ip:port`.
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            port,
            ..Default::default()
        }
    }

    /// Sets the common address.
    pub fn with_common_address(mut self, common_address: CommonAddress) -> Self {
        self.common_address = common_address;
        self
    }

    /// Adds a point.
    pub fn with_point(mut self, point: PointConfig) -> Self {
        self.points.push(point);
        self
    }

    /// Sets the timers in seconds.
    pub fn with_timers(mut self, t0: u64, t1: u64, t2: u64, t3: u64) -> Self {
        self.t0 = t0;
        self.t1 = t1;
        self.t2 = t2;
        self.t3 = t3;
        self
    }

    /// Sets the k and w windows.
    pub fn with_windows(mut self, k: u16, w: u16) -> Self {
        self.k = k;
        self.w = w;
        self
    }

    /// Returns the `ip:port` listen address.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Iec104Result<()> {
        if self.ip.trim().is_empty() {
            return Err(Iec104Error::invalid_config("ip must not be empty"));
        }
        if self.k == 0 {
            return Err(Iec104Error::invalid_config("k must be at least 1"));
        }
        if self.w == 0 {
            return Err(Iec104Error::invalid_config("w must be at least 1"));
        }
        if self.w > self.k {
            return Err(Iec104Error::invalid_config(format!(
                "w ({}) must not exceed k ({})",
                self.w, self.k
            )));
        }
        // Sequence numbers are 15 bits.
        if self.k >= 32767 {
            return Err(Iec104Error::invalid_config(format!("k ({}) is too large", self.k)));
        }
        for (name, secs) in [("t0", self.t0), ("t1", self.t1), ("t2", self.t2), ("t3", self.t3)] {
            if secs == 0 {
                return Err(Iec104Error::invalid_config(format!("{} must be at least 1 second", name)));
            }
        }
        if self.t2 >= self.t1 {
            return Err(Iec104Error::invalid_config(format!(
                "t2 ({}s) must be shorter than t1 ({}s)",
                self.t2, self.t1
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for point in &self.points {
            if point.io_address > MAX_IO_ADDRESS {
                return Err(Iec104Error::invalid_config(format!(
                    "IOA {} exceeds {}",
                    point.io_address, MAX_IO_ADDRESS
                )));
            }
            if !seen.insert(point.io_address) {
                return Err(Iec104Error::invalid_config(format!(
                    "duplicate IOA {}",
                    point.io_address
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Runtime state
// =============================================================================

/// The live state of one configured point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimePoint {
    /// Information object address.
    pub io_address: IoAddress,
    /// Information object type.
    pub point_type: PointType,
    /// Current value.
    pub value: PointValue,
    /// Current quality, limited to what the type carries.
    pub quality: QualityFlags,
    /// Time of the last accepted update; `None` before the first.
    pub updated_at: Option<DateTime<Utc>>,
    /// Cyclic transmission period in milliseconds.
    pub report_interval_ms: u64,
}

impl RuntimePoint {
    /// Creates the runtime point of a configured point.
    ///
    /// Points start flagged invalid until their first update.
    pub fn from_config(config: &PointConfig) -> Self {
        Self {
            io_address: config.io_address,
            point_type: config.point_type,
            value: config.point_type.initial_value(),
            quality: QualityFlags::INVALID.intersection(config.point_type.quality_mask()),
            updated_at: None,
            report_interval_ms: config.report_interval_ms,
        }
    }
}

/// Lifecycle state of the station manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StationState {
    /// No station thread.
    #[default]
    Stopped,
    /// The station thread is binding.
    Starting,
    /// The station is listening.
    Running,
}

impl fmt::Display for StationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StationState::Stopped => "STOPPED",
            StationState::Starting => "STARTING",
            StationState::Running => "RUNNING",
        })
    }
}

/// Snapshot returned by `StationManager::status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationStatus {
    /// `true` while the station is listening.
    pub running: bool,
    /// Lifecycle state.
    pub state: StationState,
    /// Configured name, if a station was started.
    pub station_name: Option<String>,
    /// Configured listen address.
    pub ip: Option<String>,
    /// Configured port.
    pub port: Option<u16>,
    /// Bound address while running.
    pub local_addr: Option<String>,
    /// Common address.
    pub common_address: Option<CommonAddress>,
    /// Number of runtime points.
    pub points_count: usize,
    /// Connected masters.
    pub connections: usize,
}

// =============================================================================
// Tests
// =============================================================================
