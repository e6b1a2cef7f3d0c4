// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # ua104-bin
//!
//! Command line entry point of the ua104 gateway.
//!
//! - CLI argument parsing with clap
//! - Gateway runtime orchestration
//! - Graceful shutdown handling
//! - Logging initialization
//! - The HTTP push sink
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────┐
//!                    │   main.rs   │
//!                    └──────┬──────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │   cli.rs    │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        └────┬─────┘ └────┬─────┘ └──────────┘
//!             │            │
//!             │     ┌──────▼──────┐
//!             │     │  shutdown   │
//!             │     │  http_sink  │
//!             │     └─────────────┘
//!             │
//!      ┌──────┴──────┐
//!      │   ua104-*   │
//!      └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the gateway (default command)
//! ua104 -c /etc/ua104/gateway.yaml
//!
//! # Validate configuration, failing on warnings
//! ua104 validate --strict
//!
//! # Print the address space of one server as JSON lines
//! ua104 browse plant --depth 4
//!
//! # Read one node
//! ua104 read plant "ns=2;s=Level" --details
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod http_sink;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use http_sink::HttpPushSink;
pub use logging::{init_logging, LogSettings};
pub use runtime::{GatewayRuntime, StartupReport};
pub use shutdown::ShutdownCoordinator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
