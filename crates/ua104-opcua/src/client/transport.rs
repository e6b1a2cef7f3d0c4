// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction layer.
//!
//! The registry, browser and subscription engine only talk to servers through
//! [`OpcUaTransport`]. Handles are shared as `Arc<dyn OpcUaTransport>` and
//! only ever driven from the bridge thread.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use ua104_core::types::Value;

use crate::error::OpcUaResult;
use crate::types::{AttributeId, NodeClass, NodeId, ServerConfig, StatusCode};

// =============================================================================
// QualifiedName
// =============================================================================

/// A name qualified by a namespace index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// Unqualified name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    /// Names outside namespace 0 render as `"<ns>:<name>"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.namespace_index, self.name)
        }
    }
}

// =============================================================================
// OpcUaValue
// =============================================================================

/// OPC UA variant as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcUaValue {
    /// Boolean value.
    Boolean(bool),
    /// Signed byte.
    SByte(i8),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit double.
    Double(f64),
    /// String value.
    String(String),
    /// Date/time value.
    DateTime(DateTime<Utc>),
    /// GUID value.
    Guid(uuid::Uuid),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Node identifier (DataType attribute).
    NodeId(NodeId),
    /// Qualified name (BrowseName attribute).
    QualifiedName(QualifiedName),
    /// Localized text (DisplayName and Description attributes).
    LocalizedText(String),
    /// Array of values.
    Array(Vec<OpcUaValue>),
    /// Empty variant.
    #[default]
    Null,
}

impl OpcUaValue {
    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer content, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Boolean(v) => Some(i64::from(*v)),
            Self::SByte(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Returns the boolean content, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Renders text-like attribute values (names, texts, strings).
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::String(s) | Self::LocalizedText(s) => Some(s.clone()),
            Self::QualifiedName(q) => Some(q.to_string()),
            _ => None,
        }
    }

    /// Narrows the variant to the gateway value model.
    ///
    /// Integers become `Int` (or `UInt` above `i64::MAX`), floats become
    /// `Float`, text-like variants become `String`. Arrays have no scalar
    /// counterpart and become `Null`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Boolean(v) => Value::Bool(*v),
            Self::SByte(_)
            | Self::Byte(_)
            | Self::Int16(_)
            | Self::UInt16(_)
            | Self::Int32(_)
            | Self::UInt32(_)
            | Self::Int64(_) => self.as_i64().map(Value::Int).unwrap_or(Value::Null),
            Self::UInt64(v) => i64::try_from(*v).map(Value::Int).unwrap_or(Value::UInt(*v)),
            Self::Float(v) => Value::Float(f64::from(*v)),
            Self::Double(v) => Value::Float(*v),
            Self::String(v) | Self::LocalizedText(v) => Value::String(v.clone()),
            Self::DateTime(v) => Value::String(v.to_rfc3339()),
            Self::Guid(v) => Value::String(v.to_string()),
            Self::ByteString(v) => Value::String(BASE64.encode(v)),
            Self::NodeId(v) => Value::String(v.to_string()),
            Self::QualifiedName(v) => Value::String(v.to_string()),
            Self::Array(_) | Self::Null => Value::Null,
        }
    }

    /// Returns the OPC UA type name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::Guid(_) => "Guid",
            Self::ByteString(_) => "ByteString",
            Self::NodeId(_) => "NodeId",
            Self::QualifiedName(_) => "QualifiedName",
            Self::LocalizedText(_) => "LocalizedText",
            Self::Array(_) => "Array",
            Self::Null => "Null",
        }
    }
}

impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
            other => write!(f, "{}", other.to_value()),
        }
    }
}

// =============================================================================
// ReadResult / BrowseResult / DataChange
// =============================================================================

/// Result of an attribute read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    /// The node that was read.
    pub node_id: NodeId,
    /// The attribute value; `Null` when the server returned none.
    pub value: OpcUaValue,
    /// Status code of the read.
    pub status: StatusCode,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl ReadResult {
    /// Creates a good result without timestamps.
    pub fn good(node_id: NodeId, value: OpcUaValue) -> Self {
        Self {
            node_id,
            value,
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Creates a result carrying only a status.
    pub fn with_status(node_id: NodeId, status: StatusCode) -> Self {
        Self {
            node_id,
            value: OpcUaValue::Null,
            status,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Returns `true` if the status is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }
}

/// One reference returned by a browse call.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseResult {
    /// Target node.
    pub node_id: NodeId,
    /// Browse name of the target.
    pub browse_name: QualifiedName,
    /// Display name of the target.
    pub display_name: String,
    /// Node class of the target, if reported.
    pub node_class: Option<NodeClass>,
}

/// A data-change notification for one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChange {
    /// Subscription the item belongs to.
    pub subscription_id: u32,
    /// Monitored item that changed.
    pub monitored_item_id: u32,
    /// Monitored node.
    pub node_id: NodeId,
    /// New value.
    pub value: OpcUaValue,
    /// Status of the new value.
    pub status: StatusCode,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

/// Channel on which a subscription delivers its notifications.
pub type DataChangeSender = mpsc::UnboundedSender<DataChange>;

/// Receiving end of [`DataChangeSender`].
pub type DataChangeReceiver = mpsc::UnboundedReceiver<DataChange>;

// =============================================================================
// OpcUaTransport Trait
// =============================================================================

/// Client-side operations the gateway needs from an OPC UA stack.
///
/// Implementations must tolerate `disconnect` on a closed transport.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Opens the session: endpoint selection, secure channel, activation.
    async fn connect(&self) -> OpcUaResult<()>;

    /// Closes the session.
    async fn disconnect(&self) -> OpcUaResult<()>;

    /// Returns `true` while the session is open.
    fn is_connected(&self) -> bool;

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reads one attribute of a node.
    ///
    /// Service-level failures return `Err`; per-node failures return a
    /// result with a bad status.
    async fn read_attribute(&self, node_id: &NodeId, attribute: AttributeId) -> OpcUaResult<ReadResult>;

    /// Reads the Value attribute of a node.
    async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<ReadResult> {
        self.read_attribute(node_id, AttributeId::Value).await
    }

    // =========================================================================
    // Browse
    // =========================================================================

    /// Lists the targets of forward hierarchical references, in server order.
    async fn browse(&self, node_id: &NodeId) -> OpcUaResult<Vec<BrowseResult>>;

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Creates a subscription delivering data changes on `notifications`.
    ///
    /// Returns the subscription id.
    async fn create_subscription(
        &self,
        publishing_interval: Duration,
        notifications: DataChangeSender,
    ) -> OpcUaResult<u32>;

    /// Deletes a subscription.
    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()>;

    /// Attaches a monitored item on the Value attribute of `node_id`.
    ///
    /// Returns the monitored item id.
    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        sampling_interval: Duration,
        queue_size: u32,
    ) -> OpcUaResult<u32>;

    /// Deletes a monitored item.
    async fn delete_monitored_item(&self, subscription_id: u32, monitored_item_id: u32) -> OpcUaResult<()>;

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Returns the server endpoint URL.
    fn endpoint(&self) -> &str;

    /// Returns the transport display name for logging.
    fn display_name(&self) -> String {
        format!("OpcUaTransport({})", self.endpoint())
    }
}

/// Shared transport handle.
pub type SharedTransport = Arc<dyn OpcUaTransport>;

// =============================================================================
// TransportFactory
// =============================================================================

/// Builds a fresh, unconnected transport for a server configuration.
///
/// The factory applies security mode, policy, client certificate and user
/// identity; the registry then calls [`OpcUaTransport::connect`].
pub trait TransportFactory: Send + Sync {
    /// Creates a transport for `config`.
    fn create(&self, config: &ServerConfig) -> OpcUaResult<SharedTransport>;
}

impl<F: TransportFactory + ?Sized> TransportFactory for Arc<F> {
    fn create(&self, config: &ServerConfig) -> OpcUaResult<SharedTransport> {
        (**self).create(config)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_display() {
        assert_eq!(QualifiedName::new(0, "Objects").to_string(), "Objects");
        assert_eq!(QualifiedName::new(2, "Pump").to_string(), "2:Pump");
    }

    #[test]
    fn test_value_narrowing() {
        assert_eq!(OpcUaValue::Int16(-3).to_value(), Value::Int(-3));
        assert_eq!(OpcUaValue::UInt64(u64::MAX).to_value(), Value::UInt(u64::MAX));
        assert_eq!(OpcUaValue::Float(1.5).to_value(), Value::Float(1.5));
        assert_eq!(OpcUaValue::LocalizedText("x".into()).to_value(), Value::String("x".into()));
        assert_eq!(OpcUaValue::Array(vec![OpcUaValue::Boolean(true)]).to_value(), Value::Null);
    }

    #[test]
    fn test_as_text() {
        assert_eq!(
            OpcUaValue::QualifiedName(QualifiedName::new(3, "Tank")).as_text().as_deref(),
            Some("3:Tank")
        );
        assert_eq!(OpcUaValue::Int32(1).as_text(), None);
    }

    #[test]
    fn test_read_result() {
        let good = ReadResult::good(NodeId::numeric(2, 1), OpcUaValue::Double(2.5));
        assert!(good.is_good());
        let bad = ReadResult::with_status(NodeId::numeric(2, 1), StatusCode::BAD_NODE_ID_UNKNOWN);
        assert!(!bad.is_good());
        assert!(bad.value.is_null());
    }
}
