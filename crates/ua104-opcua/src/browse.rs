// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Address space browsing.
//!
//! Turns the node graph of a connected server into a flat list of
//! [`NodeRecord`]s.
//!
//! # Traversal
//!
//! ```text
//!   stack: [start]                      visited: {}
//!     │
//!     ├─ pop node ── already visited? ──► skip
//!     │      │
//!     │      ├─ read NodeClass (failure drops the node)
//!     │      ├─ read BrowseName / DisplayName / Description
//!     │      ├─ Variable? resolve the data type name
//!     │      ├─ emit NodeRecord
//!     │      └─ Object/View below max depth? push children (server order)
//!     │
//!     └─ stop flag set? ──► end, keep what was emitted
//! ```
//!
//! The traversal is depth first and driven by an explicit stack, so cycles
//! and diamond-shaped reference paths cost one visited-set lookup.
//!
//! # Examples
//!
//! ```rust,ignore
//! use ua104_opcua::browse::{AddressSpaceBrowser, BrowseOptions};
//!
//! let browser = AddressSpaceBrowser::new(registry.clone());
//! let outcome = browser.browse_server(&server_id, BrowseOptions::default().with_depth(2), timeout)?;
//! for record in &outcome.records {
//!     println!("{} {}", record.node_id, record.display_name);
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use ua104_core::types::ServerId;

use crate::client::{OpcUaValue, SharedTransport};
use crate::error::{OpcUaError, OpcUaResult};
use crate::registry::ConnectionRegistry;
use crate::types::{AttributeId, NodeClass, NodeId};

/// Depth used when none or an out-of-range one is requested.
pub const DEFAULT_BROWSE_DEPTH: u32 = 3;

/// Largest accepted depth.
pub const MAX_BROWSE_DEPTH: u32 = 10;

/// Data type name of a Variable whose DataType attribute is empty.
pub const DATA_TYPE_NOT_SET: &str = "DataTypeNotSet";

/// Data type name of a Variable whose DataType attribute is unreadable.
pub const UNKNOWN_DATA_TYPE: &str = "UnknownDataType";

// =============================================================================
// BrowseOptions
// =============================================================================

/// Parameters of one traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseOptions {
    /// Node the traversal starts from.
    pub start_node: NodeId,
    /// Requested depth; values outside 0..=10 fall back to 3.
    pub max_depth: i64,
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            start_node: NodeId::OBJECTS_FOLDER,
            max_depth: i64::from(DEFAULT_BROWSE_DEPTH),
        }
    }
}

impl BrowseOptions {
    /// Sets the start node.
    pub fn with_start(mut self, start_node: NodeId) -> Self {
        self.start_node = start_node;
        self
    }

    /// Sets the requested depth.
    pub fn with_depth(mut self, max_depth: i64) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the depth actually used.
    pub fn effective_depth(&self) -> u32 {
        match u32::try_from(self.max_depth) {
            Ok(depth) if depth <= MAX_BROWSE_DEPTH => depth,
            _ => {
                warn!(
                    requested = self.max_depth,
                    fallback = DEFAULT_BROWSE_DEPTH,
                    "Browse depth out of range"
                );
                DEFAULT_BROWSE_DEPTH
            }
        }
    }
}

// =============================================================================
// NodeRecord
// =============================================================================

/// One catalogued node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Server the node belongs to.
    pub server_id: ServerId,
    /// Node id in text form.
    pub node_id: String,
    /// Browse name, `"<ns>:<name>"` outside namespace 0.
    pub browse_name: String,
    /// Display name; the browse name when the server has none.
    pub display_name: String,
    /// Node class.
    pub node_class: NodeClass,
    /// Node the traversal reached this one from.
    pub parent_node_id: Option<String>,
    /// Display name of the data type, Variables only.
    pub data_type_name: Option<String>,
    /// Description text.
    pub description: Option<String>,
}

// =============================================================================
// BrowseStopFlags
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct FlagState {
    requested: bool,
    cut_short: bool,
}

/// Cooperative stop requests keyed by server.
#[derive(Debug, Clone, Default)]
pub struct BrowseStopFlags {
    flags: Arc<DashMap<ServerId, FlagState>>,
}

impl BrowseStopFlags {
    /// Creates an empty flag table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the running traversal of `server_id` to end.
    pub fn stop(&self, server_id: &ServerId) {
        self.flags.entry(server_id.clone()).or_default().requested = true;
    }

    /// Returns `true` if a stop was requested since the last reset.
    pub fn is_stopped(&self, server_id: &ServerId) -> bool {
        self.flags.get(server_id).map(|f| f.requested).unwrap_or(false)
    }

    /// Returns `true` if the last traversal of `server_id` was cut short.
    pub fn was_stopped(&self, server_id: &ServerId) -> bool {
        self.flags.get(server_id).map(|f| f.cut_short).unwrap_or(false)
    }

    /// Clears both flags; called when a traversal begins.
    pub fn reset(&self, server_id: &ServerId) {
        self.flags.insert(server_id.clone(), FlagState::default());
    }

    fn mark_cut_short(&self, server_id: &ServerId) {
        self.flags.entry(server_id.clone()).or_default().cut_short = true;
    }
}

// =============================================================================
// BrowseStream
// =============================================================================

#[derive(Debug, Clone)]
struct Frame {
    node_id: NodeId,
    parent: Option<NodeId>,
    depth: u32,
}

/// A lazy, finite traversal of one server's address space.
///
/// Records are pulled with [`next`](Self::next); the stream must be driven
/// on the bridge.
pub struct BrowseStream {
    server_id: ServerId,
    registry: ConnectionRegistry,
    transport: SharedTransport,
    flags: BrowseStopFlags,
    start: NodeId,
    max_depth: u32,
    stack: Vec<Frame>,
    visited: HashSet<NodeId>,
    emitted: usize,
    stopped: bool,
}

impl BrowseStream {
    fn new(
        server_id: ServerId,
        registry: ConnectionRegistry,
        transport: SharedTransport,
        flags: BrowseStopFlags,
        options: &BrowseOptions,
    ) -> Self {
        let mut stream = Self {
            server_id,
            registry,
            transport,
            flags,
            start: options.start_node.clone(),
            max_depth: options.effective_depth(),
            stack: Vec::new(),
            visited: HashSet::new(),
            emitted: 0,
            stopped: false,
        };
        stream.restart();
        stream
    }

    /// Rewinds to the start node with a fresh visited set.
    pub fn restart(&mut self) {
        self.flags.reset(&self.server_id);
        self.visited.clear();
        self.emitted = 0;
        self.stopped = false;
        let parent = (self.start == NodeId::OBJECTS_FOLDER).then_some(NodeId::ROOT_FOLDER);
        self.stack = vec![Frame {
            node_id: self.start.clone(),
            parent,
            depth: 0,
        }];
    }

    /// Depth limit of this traversal.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Returns `true` once a stop request ended the traversal.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Returns the next record, or `None` when the traversal is over.
    ///
    /// A traversal that ends on a closed session moves the server to
    /// `ERROR`.
    pub async fn next(&mut self) -> Option<NodeRecord> {
        loop {
            if self.check_stop() {
                return None;
            }
            let Some(frame) = self.stack.pop() else {
                if self.registry.check_session(&self.server_id, &self.transport) {
                    warn!(server_id = %self.server_id, emitted = self.emitted, "Browse ended on a closed session");
                }
                return None;
            };
            if !self.visited.insert(frame.node_id.clone()) {
                trace!(server_id = %self.server_id, node_id = %frame.node_id, "Already visited");
                continue;
            }

            let Some((record, node_class)) = self.visit(&frame).await else {
                continue;
            };

            if node_class.is_container() && frame.depth < self.max_depth && !self.check_stop() {
                self.push_children(&frame).await;
            }

            self.emitted += 1;
            return Some(record);
        }
    }

    /// Drains the remaining records.
    pub async fn collect(mut self) -> BrowseOutcome {
        let mut records = Vec::new();
        while let Some(record) = self.next().await {
            records.push(record);
        }
        BrowseOutcome {
            records,
            stopped: self.stopped,
        }
    }

    fn check_stop(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        if self.flags.is_stopped(&self.server_id) {
            info!(server_id = %self.server_id, emitted = self.emitted, "Browse stopped on request");
            self.stopped = true;
            self.stack.clear();
            self.flags.mark_cut_short(&self.server_id);
        }
        self.stopped
    }

    async fn push_children(&mut self, frame: &Frame) {
        let children = match self.transport.browse(&frame.node_id).await {
            Ok(children) => children,
            Err(e) => {
                warn!(server_id = %self.server_id, node_id = %frame.node_id, error = %e, "Listing children failed");
                return;
            }
        };

        // Reversed so the first child is popped first.
        for child in children.into_iter().rev() {
            if self.visited.contains(&child.node_id) {
                continue;
            }
            self.stack.push(Frame {
                node_id: child.node_id,
                parent: Some(frame.node_id.clone()),
                depth: frame.depth + 1,
            });
        }
    }

    async fn visit(&self, frame: &Frame) -> Option<(NodeRecord, NodeClass)> {
        let node = &frame.node_id;

        let node_class = match self.transport.read_attribute(node, AttributeId::NodeClass).await {
            Ok(r) if r.is_good() => r
                .value
                .as_i64()
                .and_then(|v| u32::try_from(v).ok())
                .and_then(NodeClass::from_value),
            Ok(r) => {
                warn!(server_id = %self.server_id, node_id = %node, status = %r.status, "NodeClass read returned bad status");
                None
            }
            Err(e) => {
                warn!(server_id = %self.server_id, node_id = %node, error = %e, "NodeClass read failed");
                None
            }
        };
        let Some(node_class) = node_class else {
            warn!(server_id = %self.server_id, node_id = %node, "Skipping node without a readable class");
            return None;
        };

        let browse_name = self
            .read_text(node, AttributeId::BrowseName)
            .await
            .unwrap_or_default();
        let display_name = self
            .read_text(node, AttributeId::DisplayName)
            .await
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| browse_name.clone());
        let description = self
            .read_text(node, AttributeId::Description)
            .await
            .filter(|s| !s.is_empty());

        let data_type_name = if node_class == NodeClass::Variable {
            Some(self.data_type_name(node).await)
        } else {
            None
        };

        let record = NodeRecord {
            server_id: self.server_id.clone(),
            node_id: node.to_string(),
            browse_name,
            display_name,
            node_class,
            parent_node_id: frame.parent.as_ref().map(NodeId::to_string),
            data_type_name,
            description,
        };
        trace!(server_id = %self.server_id, node_id = %record.node_id, depth = frame.depth, "Visited node");
        Some((record, node_class))
    }

    async fn read_text(&self, node: &NodeId, attribute: AttributeId) -> Option<String> {
        match self.transport.read_attribute(node, attribute).await {
            Ok(r) if r.is_good() => r.value.as_text(),
            Ok(r) => {
                debug!(node_id = %node, attribute = %attribute, status = %r.status, "Attribute unreadable");
                None
            }
            Err(e) => {
                debug!(node_id = %node, attribute = %attribute, error = %e, "Attribute read failed");
                None
            }
        }
    }

    async fn data_type_name(&self, node: &NodeId) -> String {
        let data_type = match self.transport.read_attribute(node, AttributeId::DataType).await {
            Ok(r) if r.is_good() => r.value,
            Ok(r) => {
                debug!(node_id = %node, status = %r.status, "DataType unreadable");
                return UNKNOWN_DATA_TYPE.to_string();
            }
            Err(e) => {
                debug!(node_id = %node, error = %e, "DataType read failed");
                return UNKNOWN_DATA_TYPE.to_string();
            }
        };

        match data_type {
            OpcUaValue::NodeId(type_node) if !type_node.is_null() => self
                .read_text(&type_node, AttributeId::DisplayName)
                .await
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| type_node.to_string()),
            OpcUaValue::NodeId(_) | OpcUaValue::Null => DATA_TYPE_NOT_SET.to_string(),
            other => {
                debug!(node_id = %node, value = %other, "DataType is not a NodeId");
                UNKNOWN_DATA_TYPE.to_string()
            }
        }
    }
}

/// Result of a complete traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrowseOutcome {
    /// Emitted records in traversal order.
    pub records: Vec<NodeRecord>,
    /// `true` if a stop request ended the traversal early.
    pub stopped: bool,
}

// =============================================================================
// AddressSpaceBrowser
// =============================================================================

/// Browses connected servers through the registry.
#[derive(Clone)]
pub struct AddressSpaceBrowser {
    registry: ConnectionRegistry,
    flags: BrowseStopFlags,
}

impl AddressSpaceBrowser {
    /// Creates a browser with its own stop flags.
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self::with_flags(registry, BrowseStopFlags::new())
    }

    /// Creates a browser sharing `flags`.
    pub fn with_flags(registry: ConnectionRegistry, flags: BrowseStopFlags) -> Self {
        Self { registry, flags }
    }

    /// Returns the stop flags.
    pub fn flags(&self) -> &BrowseStopFlags {
        &self.flags
    }

    /// Starts a traversal and returns the stream. Resets the stop flag.
    pub fn stream(&self, server_id: &ServerId, options: &BrowseOptions) -> OpcUaResult<BrowseStream> {
        let transport = self.registry.require_handle(server_id)?;
        Ok(BrowseStream::new(
            server_id.clone(),
            self.registry.clone(),
            transport,
            self.flags.clone(),
            options,
        ))
    }

    /// Runs a whole traversal on the bridge.
    ///
    /// # Errors
    ///
    /// `ServerNotConnected` without a live handle, or a bridge error.
    pub fn browse_server(
        &self,
        server_id: &ServerId,
        options: &BrowseOptions,
        timeout: Duration,
    ) -> OpcUaResult<BrowseOutcome> {
        let stream = self.stream(server_id, options)?;
        info!(
            server_id = %server_id,
            start = %options.start_node,
            max_depth = stream.max_depth(),
            "Browsing address space"
        );

        let outcome = self
            .registry
            .bridge()
            .run_and_wait(stream.collect(), timeout)
            .map_err(OpcUaError::from)?;

        info!(
            server_id = %server_id,
            records = outcome.records.len(),
            stopped = outcome.stopped,
            "Browse finished"
        );
        Ok(outcome)
    }

    /// Requests the running traversal of `server_id` to stop.
    pub fn stop(&self, server_id: &ServerId) {
        self.flags.stop(server_id);
    }

    /// Returns `true` if the last traversal of `server_id` was cut short.
    pub fn was_stopped(&self, server_id: &ServerId) -> bool {
        self.flags.was_stopped(server_id)
    }
}

// =============================================================================
// Tests
// =============================================================================
