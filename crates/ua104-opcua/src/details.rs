// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Single-node inspection: the common attributes of a node and its current
//! value.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use ua104_core::types::{ServerId, Value};

use crate::client::{OpcUaValue, ReadResult, SharedTransport};
use crate::error::{OpcUaError, OpcUaResult};
use crate::registry::ConnectionRegistry;
use crate::types::{AttributeId, NodeClass, NodeId, StatusCode};

/// Attributes read for every node, in report order.
const DETAIL_ATTRIBUTES: [AttributeId; 8] = [
    AttributeId::NodeClass,
    AttributeId::BrowseName,
    AttributeId::DisplayName,
    AttributeId::Description,
    AttributeId::DataType,
    AttributeId::ValueRank,
    AttributeId::AccessLevel,
    AttributeId::Historizing,
];

/// A value with its status and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataValueSnapshot {
    /// Narrowed value.
    pub value: Value,
    /// OPC UA type of the value.
    pub type_name: String,
    /// Read status.
    pub status: StatusCode,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl From<ReadResult> for DataValueSnapshot {
    fn from(result: ReadResult) -> Self {
        Self {
            value: result.value.to_value(),
            type_name: result.value.type_name().to_string(),
            status: result.status,
            source_timestamp: result.source_timestamp,
            server_timestamp: result.server_timestamp,
        }
    }
}

/// The common attributes of one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeDetails {
    /// Node id in text form.
    pub node_id: String,
    /// Node class name.
    pub node_class: Option<String>,
    /// Browse name.
    pub browse_name: Option<String>,
    /// Display name.
    pub display_name: Option<String>,
    /// Description text.
    pub description: Option<String>,
    /// Data type node id.
    pub data_type: Option<String>,
    /// Display name of the data type node, Variables only.
    pub data_type_name: Option<String>,
    /// Value rank as text, e.g. `Scalar (-1)`.
    pub value_rank: Option<String>,
    /// Access level flags, e.g. `CurrentRead|CurrentWrite`.
    pub access_level: Option<String>,
    /// Historizing flag.
    pub historizing: Option<bool>,
    /// Current value, Variables only.
    pub value: Option<DataValueSnapshot>,
    /// Attributes that could not be read, with the reason.
    pub errors: BTreeMap<String, String>,
}

/// Renders a ValueRank attribute.
pub fn describe_value_rank(rank: i64) -> String {
    match rank {
        -3 => "ScalarOrOneDimension (-3)".to_string(),
        -2 => "Any (-2)".to_string(),
        -1 => "Scalar (-1)".to_string(),
        0 => "OneOrMoreDimensions (0)".to_string(),
        n if n >= 1 => format!("{n}-Dimension Array ({n})"),
        n => n.to_string(),
    }
}

/// Renders an AccessLevel attribute as `|`-joined flag names.
pub fn describe_access_level(level: u8) -> String {
    const FLAGS: [(u8, &str); 7] = [
        (0x01, "CurrentRead"),
        (0x02, "CurrentWrite"),
        (0x04, "HistoryRead"),
        (0x08, "HistoryWrite"),
        (0x10, "SemanticChange"),
        (0x20, "StatusWrite"),
        (0x40, "TimestampWrite"),
    ];
    let names: Vec<&str> = FLAGS
        .iter()
        .filter(|(bit, _)| level & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if names.is_empty() {
        "None".to_string()
    } else {
        names.join("|")
    }
}

/// Reads every common attribute of `node` and, for Variables, its value.
///
/// Individual attribute failures are collected in [`NodeDetails::errors`].
pub async fn fetch_node_details(transport: &SharedTransport, node: &NodeId) -> NodeDetails {
    let mut details = NodeDetails {
        node_id: node.to_string(),
        ..Default::default()
    };
    let mut node_class = None;

    for attribute in DETAIL_ATTRIBUTES {
        let result = match transport.read_attribute(node, attribute).await {
            Ok(r) if r.is_good() => r,
            Ok(r) => {
                details.errors.insert(attribute.name().to_string(), r.status.to_string());
                continue;
            }
            Err(e) => {
                details.errors.insert(attribute.name().to_string(), e.to_string());
                continue;
            }
        };
        let value = result.value;

        match attribute {
            AttributeId::NodeClass => {
                node_class = value
                    .as_i64()
                    .and_then(|v| u32::try_from(v).ok())
                    .and_then(NodeClass::from_value);
                details.node_class = Some(match (node_class, value.as_i64()) {
                    (Some(class), _) => class.name().to_string(),
                    (None, Some(raw)) => format!("Unknown NodeClass value ({raw})"),
                    (None, None) => value.to_string(),
                });
            }
            AttributeId::BrowseName => details.browse_name = value.as_text(),
            AttributeId::DisplayName => details.display_name = value.as_text(),
            AttributeId::Description => details.description = value.as_text().filter(|s| !s.is_empty()),
            AttributeId::DataType => {
                if let OpcUaValue::NodeId(type_node) = value {
                    details.data_type = Some(type_node.to_string());
                }
            }
            AttributeId::ValueRank => details.value_rank = value.as_i64().map(describe_value_rank),
            AttributeId::AccessLevel => {
                details.access_level = value
                    .as_i64()
                    .and_then(|v| u8::try_from(v).ok())
                    .map(describe_access_level);
            }
            AttributeId::Historizing => details.historizing = value.as_bool(),
            AttributeId::Value => {}
        }
    }

    if node_class == Some(NodeClass::Variable) {
        match transport.read_value(node).await {
            Ok(result) => details.value = Some(result.into()),
            Err(e) => {
                details.errors.insert(AttributeId::Value.name().to_string(), e.to_string());
            }
        }

        if let Some(type_text) = details.data_type.clone() {
            details.data_type_name = Some(match NodeId::from_str(&type_text) {
                Ok(type_node) => match transport.read_attribute(&type_node, AttributeId::DisplayName).await {
                    Ok(r) if r.is_good() => r.value.as_text().filter(|s| !s.is_empty()).unwrap_or(type_text),
                    _ => type_text,
                },
                Err(_) => type_text,
            });
        }
    }

    debug!(node_id = %node, failed_attributes = details.errors.len(), "Node details read");
    details
}

/// Reads the full details of one node on the bridge.
pub fn read_node_details(
    registry: &ConnectionRegistry,
    server_id: &ServerId,
    node_id: &str,
    timeout: Duration,
) -> OpcUaResult<NodeDetails> {
    let transport = registry.require_handle(server_id)?;
    let node = NodeId::from_str(node_id)?;
    info!(server_id = %server_id, node_id = %node, "Reading node details");

    let handle = transport.clone();
    let details = registry
        .bridge()
        .run_and_wait(async move { fetch_node_details(&transport, &node).await }, timeout)
        .map_err(OpcUaError::from)?;
    if !details.errors.is_empty() {
        registry.check_session(server_id, &handle);
    }
    Ok(details)
}

/// Reads the current value of one node with status and timestamps.
pub fn read_node_value(
    registry: &ConnectionRegistry,
    server_id: &ServerId,
    node_id: &str,
    timeout: Duration,
) -> OpcUaResult<DataValueSnapshot> {
    let transport = registry.require_handle(server_id)?;
    let node = NodeId::from_str(node_id)?;

    let handle = transport.clone();
    let result = registry
        .bridge()
        .run_and_wait(async move { transport.read_value(&node).await }, timeout)
        .map_err(OpcUaError::from)?;
    match result {
        Ok(read) => Ok(read.into()),
        Err(e) => {
            registry.report_failure(server_id, &handle, &e);
            Err(e)
        }
    }
}
