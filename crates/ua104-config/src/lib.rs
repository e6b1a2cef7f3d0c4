// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # ua104-config
//!
//! Configuration management for the ua104 gateway.
//!
//! ## Features
//!
//! - **Multi-format Support**: YAML, TOML and JSON, picked by extension
//! - **Environment Placeholders**: `${VAR}` and `${VAR:-default}`
//! - **Environment Overrides**: `UA104_LOG_LEVEL`, `UA104_STATION_PORT` and friends
//! - **Validation**: servers, mapping table and station checked on load
//!
//! ## Example
//!
//! ```yaml
//! gateway:
//!   name: substation-7
//! servers:
//!   - server_id: plant
//!     endpoint: "opc.tcp://${PLANT_HOST:-localhost}:4840"
//!     auto_connect: true
//! mappings:
//!   - id: 1
//!     server_id: plant
//!     node_id: "ns=2;s=Breaker"
//!     target_address: 100
//! station:
//!   ip: 0.0.0.0
//!   port: 2404
//!   common_address: 1
//!   points:
//!     - io_address: 100
//!       point_type: M_SP_NA_1
//! ```
//!
//! ```rust,no_run
//! use ua104_config::load_config;
//!
//! let config = load_config("gateway.yaml")?;
//! # Ok::<(), ua104_config::ConfigError>(())
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;
pub mod store;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader};
pub use schema::{
    BridgeSection, GatewayConfig, GatewayInfo, LogFormat, LogLevel, LoggingConfig, ReconnectConfig,
    SinkConfig, SinkKind,
};
pub use store::FileServerStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
