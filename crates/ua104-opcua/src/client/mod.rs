// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client transports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   ConnectionRegistry / AddressSpaceBrowser / SubscriptionEngine │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │  Arc<dyn OpcUaTransport>
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OpcUaTransport                             │
//! │        (built per server by a TransportFactory)                 │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//!     RealOpcUaTransport                  test transports
//!   (`real-transport` feature)
//! ```

mod transport;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use transport::{
    BrowseResult, DataChange, DataChangeReceiver, DataChangeSender, OpcUaTransport, OpcUaValue,
    QualifiedName, ReadResult, SharedTransport, TransportFactory,
};

#[cfg(feature = "real-transport")]
pub use real_transport::{RealOpcUaTransport, RealTransportFactory};
