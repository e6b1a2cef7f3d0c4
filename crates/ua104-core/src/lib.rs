// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # ua104-core
//!
//! Core abstractions shared by the ua104 OPC UA to IEC 60870-5-104 gateway.
//!
//! - **Bridge**: [`AsyncBridge`], the single thread that drives protocol
//!   clients on behalf of synchronous callers
//! - **Types**: identifiers, the [`Value`] model and [`ConnectionState`]
//! - **Quality**: IEC 104 quality descriptor bits
//! - **Mapping**: node to point bindings and their uniqueness rules
//! - **Sink**: the downstream consumer of value changes
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use ua104_core::{AsyncBridge, Mapping, MappingSet};
//!
//! let mappings = MappingSet::try_new(vec![
//!     Mapping::new(1, "plant-a", "ns=2;s=Pump.Running", 100),
//!     Mapping::new(2, "plant-a", "ns=2;s=Tank.Level", 200),
//! ])
//! .unwrap();
//! assert_eq!(mappings.len(), 2);
//!
//! let bridge = AsyncBridge::new();
//! bridge.start().unwrap();
//! assert_eq!(bridge.run_and_wait(async { 1 + 1 }, Duration::from_secs(1)).unwrap(), 2);
//! bridge.stop();
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod quality;
pub mod types;

// =============================================================================
// Runtime Modules
// =============================================================================

pub mod bridge;
pub mod mapping;
pub mod sink;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use types::*;

pub use bridge::{AsyncBridge, BridgeConfig, DEFAULT_OPERATION_TIMEOUT, DEFAULT_STOP_TIMEOUT};
pub use mapping::{Mapping, MappingSet};
pub use quality::QualityFlags;
pub use sink::{LogSink, Sink, ValueUpdate};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
