// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! IEC 104 station error types.
//!
//! # Error Categories
//!
//! ```text
//! Iec104Error
//! ├── AlreadyRunning    - a station is already running
//! ├── StationNotRunning - no station to update
//! ├── UnknownPoint      - (ca, ioa) has no runtime point
//! ├── InvalidValue      - value not convertible to the point type
//! ├── InvalidConfig     - station configuration rejected
//! ├── StartupFailed     - station thread did not come up
//! ├── Io                - socket errors
//! └── Protocol          - malformed or unexpected frames
//! ```
//!
//! # Examples
//!
//! ```
//! use ua104_iec104::error::Iec104Error;
//!
//! let error = Iec104Error::unknown_point(1, 4711);
//! assert_eq!(error.category(), "point");
//! assert!(!error.is_retryable());
//! ```

use std::io;

use thiserror::Error;
use tracing::Level;

use ua104_core::types::{CommonAddress, IoAddress};

// =============================================================================
// Iec104Error - Main Error Type
// =============================================================================

/// The main error type of the IEC 104 side.
#[derive(Debug, Error)]
pub enum Iec104Error {
    /// A station is already running.
    #[error("A station is already running")]
    AlreadyRunning,

    /// No station is running.
    #[error("No station is running")]
    StationNotRunning,

    /// The address pair has no runtime point.
    #[error("No point at CA {common_address}, IOA {io_address}")]
    UnknownPoint {
        /// Common address.
        common_address: CommonAddress,
        /// Information object address.
        io_address: IoAddress,
    },

    /// The value cannot be represented by the point type.
    #[error("Invalid value for {point_type} at IOA {io_address}: {reason}")]
    InvalidValue {
        /// Information object address.
        io_address: IoAddress,
        /// Point type name.
        point_type: &'static str,
        /// Why the conversion failed.
        reason: String,
    },

    /// The station configuration was rejected.
    #[error("Invalid station configuration: {0}")]
    InvalidConfig(String),

    /// The station thread failed to report a running server.
    #[error("Station startup failed: {0}")]
    StartupFailed(String),

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol violation.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),
}

impl Iec104Error {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates an unknown point error.
    pub fn unknown_point(common_address: CommonAddress, io_address: IoAddress) -> Self {
        Self::UnknownPoint {
            common_address,
            io_address,
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(io_address: IoAddress, point_type: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            io_address,
            point_type,
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates a startup failure.
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed(reason.into())
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Returns `true` if the operation might succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StartupFailed(_) | Self::Io(_))
    }

    /// Returns the error category label.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AlreadyRunning | Self::StationNotRunning | Self::StartupFailed(_) => "station",
            Self::UnknownPoint { .. } | Self::InvalidValue { .. } => "point",
            Self::InvalidConfig(_) => "configuration",
            Self::Io(_) => "io",
            Self::Protocol(_) => "protocol",
        }
    }

    /// Returns the tracing level this error should be logged at.
    pub fn tracing_level(&self) -> Level {
        match self {
            Self::InvalidConfig(_) | Self::StartupFailed(_) => Level::ERROR,
            Self::StationNotRunning => Level::DEBUG,
            _ => Level::WARN,
        }
    }
}

/// Result alias for IEC 104 operations.
pub type Iec104Result<T> = Result<T, Iec104Error>;

// =============================================================================
// ProtocolError
// =============================================================================

/// Framing and sequencing violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame does not begin with 0x68.
    #[error("Invalid start byte 0x{0:02X}")]
    InvalidStart(u8),

    /// The APDU length octet is out of range.
    #[error("Invalid APDU length {0}")]
    InvalidLength(usize),

    /// The control field matches no frame format.
    #[error("Invalid control field {0:02X?}")]
    InvalidControl([u8; 4]),

    /// The ASDU is shorter than its header or objects claim.
    #[error("Truncated ASDU: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// The peer sent an out-of-order I-frame.
    #[error("Sequence mismatch: expected {expected}, received {received}")]
    SequenceMismatch {
        /// Expected N(S).
        expected: u16,
        /// Received N(S).
        received: u16,
    },

    /// The peer acknowledged frames that were never sent.
    #[error("Invalid acknowledgement {0}")]
    InvalidAck(u16),

    /// A timer expired.
    #[error("Timeout {0} expired")]
    TimerExpired(&'static str),
}

impl ProtocolError {
    /// Creates a truncation error.
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }
}

// =============================================================================
// Tests
// =============================================================================
