// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client side of the ua104 gateway.
//!
//! This crate keeps live sessions to OPC UA servers, catalogs their address
//! spaces and turns monitored items into value updates for a
//! [`Sink`](ua104_core::Sink).
//!
//! # Components
//!
//! - [`ConnectionRegistry`]: one live transport and state per server
//! - [`AddressSpaceBrowser`]: depth and cycle bounded catalog of nodes
//! - [`SubscriptionEngine`]: one monitored item per mapping, changes to the sink
//! - [`details`]: attribute and value reads of single nodes
//!
//! All protocol calls run on the [`AsyncBridge`](ua104_core::AsyncBridge).
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection         - endpoint, session and identity failures
//! ├── Browse             - address space traversal failures
//! ├── Operation          - attribute reads and status codes
//! ├── Subscription       - subscriptions and monitored items
//! ├── Configuration      - invalid settings
//! ├── Bridge             - bridge refused or timed out
//! └── ServerNotConnected - no live handle
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ua104_core::{AsyncBridge, LogSink};
//! use ua104_opcua::{ConnectionRegistry, RealTransportFactory, ServerConfig, SubscriptionEngine};
//!
//! let bridge = AsyncBridge::new();
//! bridge.start()?;
//!
//! let registry = ConnectionRegistry::new(bridge, Arc::new(RealTransportFactory::new()));
//! registry.connect(&ServerConfig::new("plant-a", "opc.tcp://localhost:4840"))?;
//!
//! let engine = SubscriptionEngine::new(registry.clone(), Arc::new(LogSink));
//! engine.subscribe_all(&mappings);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod browse;
pub mod client;
pub mod details;
pub mod error;
pub mod registry;
pub mod subscription;
pub mod types;

pub use error::{
    BrowseError, ConfigurationError, ConnectionError, OpcUaError, OpcUaResult, OperationError,
    SubscriptionError,
};

pub use types::{
    AttributeId, NodeClass, NodeId, NodeIdentifier, SecurityMode, SecurityPolicy, ServerConfig,
    StatusCode, UserIdentity,
};

pub use client::{
    BrowseResult, DataChange, DataChangeSender, OpcUaTransport, OpcUaValue, QualifiedName,
    ReadResult, SharedTransport, TransportFactory,
};

#[cfg(feature = "real-transport")]
pub use client::{RealOpcUaTransport, RealTransportFactory};

pub use browse::{AddressSpaceBrowser, BrowseOptions, BrowseOutcome, BrowseStopFlags, BrowseStream, NodeRecord};
pub use details::{read_node_details, read_node_value, DataValueSnapshot, NodeDetails};
pub use registry::{ConnectionRegistry, ServerStore, SweepReport};
pub use subscription::{ActiveSubscription, BulkReport, NotificationRoute, SubscriptionEngine};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
