// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # ua104-iec104
//!
//! IEC 60870-5-104 controlled station for the ua104 gateway.
//!
//! - **Station**: [`StationManager`] runs one station on its own thread and
//!   accepts point updates from any thread
//! - **Server**: TCP sessions with STARTDT/STOPDT/TESTFR, k/w windows,
//!   t0 to t3 timers, general interrogation and cyclic transmission
//! - **Frames**: APCI/ASDU encoding and a `tokio_util` codec
//! - **Sink**: [`StationSink`] feeds OPC UA value changes into the station
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  update_point   ┌────────────┐
//! │ StationSink  │───────────────► │ PointTable │
//! └──────────────┘                 └─────┬──────┘
//!                                        │ broadcast
//!                  station thread        ▼
//!                ┌──────────────────────────────────┐
//!                │ StationServer ─► Session per TCP │◄──── SCADA masters
//!                └──────────────────────────────────┘
//! ```
//!
//! ## Point types
//!
//! Single and double points, normalized, scaled and short float measured
//! values and integrated totals, each with and without CP56Time2a.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod frame;
pub mod types;

// =============================================================================
// Station Modules
// =============================================================================

pub mod points;
pub mod server;
pub mod sink;
pub mod station;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::{Iec104Error, Iec104Result, ProtocolError};
pub use points::PointTable;
pub use server::{ServerContext, ServerSettings, StationServer};
pub use sink::StationSink;
pub use station::{StationManager, DEFAULT_STARTUP_TIMEOUT, DEFAULT_STATION_STOP_TIMEOUT};
pub use types::{
    DoublePointState, PointConfig, PointType, PointValue, RuntimePoint, StationConfig, StationState,
    StationStatus,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// IEC 104 default TCP port.
pub const IEC104_PORT: u16 = types::DEFAULT_PORT;
