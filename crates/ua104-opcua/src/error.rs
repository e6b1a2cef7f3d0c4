// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA error types.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Connection         - endpoint, session and identity failures
//! ├── Browse             - address space traversal failures
//! ├── Operation          - attribute reads and status codes
//! ├── Subscription       - subscriptions and monitored items
//! ├── Configuration      - invalid server settings and node ids
//! ├── Bridge             - the async bridge refused or timed out
//! └── ServerNotConnected - no live handle for the server
//! ```
//!
//! # Examples
//!
//! ```
//! use ua104_opcua::error::OpcUaError;
//!
//! let error = OpcUaError::connection_failed("opc.tcp://localhost:4840", "refused");
//! assert!(error.is_retryable());
//! assert_eq!(error.category(), "connection");
//! ```

use thiserror::Error;
use tracing::Level;

use ua104_core::error::BridgeError;
use ua104_core::types::ServerId;

use crate::types::StatusCode;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for OPC UA operations.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Address space browsing errors.
    #[error("{0}")]
    Browse(#[from] BrowseError),

    /// Attribute read errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Subscription and monitored item errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The bridge could not run the operation.
    #[error("{0}")]
    Bridge(#[from] BridgeError),

    /// No live client handle is registered for the server.
    #[error("Server '{0}' is not connected")]
    ServerNotConnected(ServerId),
}

impl OpcUaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection failure.
    pub fn connection_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::failed(endpoint, reason))
    }

    /// Creates a not connected error for a server.
    pub fn not_connected(server_id: impl Into<ServerId>) -> Self {
        Self::ServerNotConnected(server_id.into())
    }

    /// Creates a browse failure.
    pub fn browse_failed(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Browse(BrowseError::failed(node_id, reason))
    }

    /// Creates a read failure.
    pub fn read_failed(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Operation(OperationError::read_failed(node_id, reason))
    }

    /// Creates a bad status error.
    pub fn bad_status(node_id: impl Into<String>, status: StatusCode) -> Self {
        Self::Operation(OperationError::BadStatus {
            node_id: node_id.into(),
            status,
        })
    }

    /// Creates a subscription failure.
    pub fn subscription_failed(reason: impl Into<String>) -> Self {
        Self::Subscription(SubscriptionError::create_failed(reason))
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration(ConfigurationError::invalid_node_id(node_id, reason))
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Returns `true` if the operation might succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Bridge(e) => e.is_retryable(),
            Self::Operation(OperationError::BadStatus { status, .. }) => status.is_communication(),
            Self::Subscription(SubscriptionError::CreateFailed { .. }) => true,
            Self::ServerNotConnected(_) => true,
            _ => false,
        }
    }

    /// Returns the error category label.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Browse(_) => "browse",
            Self::Operation(_) => "operation",
            Self::Subscription(_) => "subscription",
            Self::Configuration(_) => "configuration",
            Self::Bridge(_) => "bridge",
            Self::ServerNotConnected(_) => "not_connected",
        }
    }

    /// Returns the tracing level this error should be logged at.
    pub fn tracing_level(&self) -> Level {
        match self {
            Self::Configuration(_) => Level::ERROR,
            Self::ServerNotConnected(_) => Level::DEBUG,
            _ => Level::WARN,
        }
    }
}

/// Result alias for OPC UA operations.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection-related errors.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// The session could not be established.
    #[error("Connection to {endpoint} failed: {reason}")]
    Failed {
        /// Server endpoint.
        endpoint: String,
        /// Failure reason.
        reason: String,
    },

    /// The server offers no endpoint with the requested security.
    #[error("No endpoint of {endpoint} matches security {mode}/{policy}")]
    NoSuitableEndpoint {
        /// Server endpoint.
        endpoint: String,
        /// Requested security mode.
        mode: String,
        /// Requested security policy.
        policy: String,
    },

    /// The client certificate or private key could not be loaded.
    #[error("Security setup failed: {0}")]
    Security(String),

    /// The server rejected the user identity.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The session is not connected.
    #[error("Transport is not connected")]
    NotConnected,
}

impl ConnectionError {
    /// Creates a connection failure.
    pub fn failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the operation might succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::NotConnected)
    }
}

// =============================================================================
// BrowseError
// =============================================================================

/// Address space browsing errors.
#[derive(Debug, Clone, Error)]
pub enum BrowseError {
    /// Listing the references of a node failed.
    #[error("Browse of '{node_id}' failed: {reason}")]
    Failed {
        /// Browsed node.
        node_id: String,
        /// Failure reason.
        reason: String,
    },

    /// The node class of a node could not be determined.
    #[error("Node class of '{0}' is unreadable")]
    NodeClassUnreadable(String),
}

impl BrowseError {
    /// Creates a browse failure.
    pub fn failed(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Attribute read errors.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    /// The read request failed.
    #[error("Read of '{node_id}' failed: {reason}")]
    ReadFailed {
        /// Read node.
        node_id: String,
        /// Failure reason.
        reason: String,
    },

    /// The server answered with a non-good status.
    #[error("Read of '{node_id}' returned {status}")]
    BadStatus {
        /// Read node.
        node_id: String,
        /// Returned status.
        status: StatusCode,
    },

    /// The node is not a Variable and carries no value.
    #[error("Node '{node_id}' is a {node_class}, not a Variable")]
    NotAVariable {
        /// Node identifier.
        node_id: String,
        /// Actual node class.
        node_class: String,
    },
}

impl OperationError {
    /// Creates a read failure.
    pub fn read_failed(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription and monitored item errors.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    /// The server-side subscription could not be created.
    #[error("Subscription creation failed: {reason}")]
    CreateFailed {
        /// Failure reason.
        reason: String,
    },

    /// The monitored item could not be attached.
    #[error("Monitored item for '{node_id}' failed: {reason}")]
    MonitoredItemFailed {
        /// Monitored node.
        node_id: String,
        /// Failure reason.
        reason: String,
    },

    /// Deleting a subscription or monitored item failed.
    #[error("Teardown of subscription {subscription_id} failed: {reason}")]
    DeleteFailed {
        /// Server-side subscription id.
        subscription_id: u32,
        /// Failure reason.
        reason: String,
    },
}

impl SubscriptionError {
    /// Creates a subscription creation failure.
    pub fn create_failed(reason: impl Into<String>) -> Self {
        Self::CreateFailed {
            reason: reason.into(),
        }
    }

    /// Creates a monitored item failure.
    pub fn monitored_item_failed(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MonitoredItemFailed {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a teardown failure.
    pub fn delete_failed(subscription_id: u32, reason: impl Into<String>) -> Self {
        Self::DeleteFailed {
            subscription_id,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Invalid server settings.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// A node id string could not be parsed.
    #[error("Invalid node id '{node_id}': {reason}")]
    InvalidNodeId {
        /// The offending text.
        node_id: String,
        /// Parse failure.
        reason: String,
    },

    /// The endpoint URL is unusable.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The offending URL.
        endpoint: String,
        /// What is wrong.
        reason: String,
    },

    /// Security mode and policy do not fit together.
    #[error("Invalid security settings: {0}")]
    InvalidSecurity(String),

    /// Unknown security mode name.
    #[error("Unknown security mode '{0}'")]
    InvalidSecurityMode(String),

    /// Unknown security policy name or URI.
    #[error("Unknown security policy '{0}'")]
    InvalidSecurityPolicy(String),

    /// A required field is missing.
    #[error("Missing required field '{0}'")]
    MissingField(String),
}

impl ConfigurationError {
    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }
}

// =============================================================================
// Tests
// =============================================================================
