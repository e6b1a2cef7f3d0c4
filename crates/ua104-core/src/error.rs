// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types shared across ua104 crates.
//!
//! # Error Hierarchy
//!
//! ```text
//! BridgeError   - AsyncBridge scheduling and waiting
//! SinkError     - downstream value delivery
//! MappingError  - mapping table invariants
//! ```
//!
//! Protocol crates define their own error enums and wrap [`BridgeError`]
//! through `#[from]` so that a timed-out or unavailable bridge surfaces with
//! the same message everywhere.

use std::time::Duration;
use thiserror::Error;

use crate::types::{IoAddress, MappingId, ServerId};

// =============================================================================
// BridgeError
// =============================================================================

/// Errors returned by [`AsyncBridge`](crate::bridge::AsyncBridge).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The bridge thread is not running.
    #[error("Async bridge is not running")]
    NotRunning,

    /// The operation did not complete within the allowed time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A blocking wait was requested from the bridge thread itself.
    #[error("run_and_wait called from the bridge thread")]
    CalledFromBridgeThread,

    /// The operation's task ended without producing a result.
    #[error("Operation aborted before completion")]
    OperationAborted,

    /// The bridge thread or its runtime could not be created.
    #[error("Failed to start async bridge: {0}")]
    Spawn(String),
}

impl BridgeError {
    /// Creates a spawn error.
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Returns `true` for a timeout. The outcome of a timed-out operation is
    /// unknown and callers reconcile through state queries.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns `true` if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::OperationAborted)
    }
}

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

// =============================================================================
// SinkError
// =============================================================================

/// Errors a [`Sink`](crate::sink::Sink) may report.
///
/// These never propagate past the subscription engine; they are logged.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink's target refused the value (unknown address, bad value).
    #[error("Value for IOA {address} rejected: {reason}")]
    Rejected {
        /// Target address of the update.
        address: IoAddress,
        /// Reason given by the target.
        reason: String,
    },

    /// The value could not be delivered (network, target stopped).
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

impl SinkError {
    /// Creates a rejection error.
    pub fn rejected(address: IoAddress, reason: impl Into<String>) -> Self {
        Self::Rejected {
            address,
            reason: reason.into(),
        }
    }

    /// Creates a delivery error.
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }
}

/// Result alias for sink calls.
pub type SinkResult<T> = Result<T, SinkError>;

// =============================================================================
// MappingError
// =============================================================================

/// Violations of the mapping table invariants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    /// Two mappings share an id.
    #[error("Duplicate mapping id {0}")]
    DuplicateId(MappingId),

    /// Two mappings bind the same node of one server.
    #[error("Node '{node_id}' of server '{server_id}' is mapped by both {first} and {second}")]
    DuplicateNode {
        /// Server owning the node.
        server_id: ServerId,
        /// Node identifier.
        node_id: String,
        /// First mapping.
        first: MappingId,
        /// Conflicting mapping.
        second: MappingId,
    },

    /// Two mappings of one server target the same IOA.
    #[error("IOA {address} of server '{server_id}' is mapped by both {first} and {second}")]
    DuplicateAddress {
        /// Server owning the mappings.
        server_id: ServerId,
        /// Target address.
        address: IoAddress,
        /// First mapping.
        first: MappingId,
        /// Conflicting mapping.
        second: MappingId,
    },

    /// The mapping's fields are unusable.
    #[error("Mapping {id} is invalid: {reason}")]
    Invalid {
        /// Offending mapping.
        id: MappingId,
        /// What is wrong.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_messages() {
        assert_eq!(BridgeError::NotRunning.to_string(), "Async bridge is not running");
        let err = BridgeError::Timeout(Duration::from_secs(1));
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert!(!BridgeError::NotRunning.is_retryable());
    }

    #[test]
    fn test_sink_error() {
        let err = SinkError::rejected(10, "unknown point");
        assert_eq!(err.to_string(), "Value for IOA 10 rejected: unknown point");
    }
}
