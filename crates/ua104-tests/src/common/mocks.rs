// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! In-memory stand-ins for an OPC UA server and for value sinks.
//!
//! - [`MockTransport`] serves reads and browses from an [`AddressSpace`] and
//!   delivers injected data changes to its subscriptions.
//! - [`MockTransportFactory`] hands out one [`MockServer`] per server id so a
//!   test can script failures before the registry connects.
//! - [`RecordingSink`] keeps every update it receives.
//! - [`MemoryServerStore`] is a [`ServerStore`] with inspectable status.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use ua104_core::error::{SinkError, SinkResult};
use ua104_core::sink::{Sink, ValueUpdate};
use ua104_core::types::{ConnectionState, ServerId};
use ua104_opcua::{
    AttributeId, BrowseResult, DataChange, DataChangeSender, NodeClass, NodeId, OpcUaError, OpcUaResult,
    OpcUaTransport, OpcUaValue, QualifiedName, ReadResult, ServerConfig, ServerStore, SharedTransport,
    StatusCode, SubscriptionError, TransportFactory,
};

// =============================================================================
// Address Space
// =============================================================================

/// One node of a scripted address space.
#[derive(Debug, Clone)]
pub struct MockNode {
    /// Node class.
    pub class: NodeClass,
    /// Browse name.
    pub browse_name: QualifiedName,
    /// Display name; empty means "server sent none".
    pub display_name: String,
    /// Description.
    pub description: Option<String>,
    /// DataType attribute, Variables only.
    pub data_type: Option<NodeId>,
    /// Value attribute, Variables only.
    pub value: OpcUaValue,
    /// Targets of hierarchical references, in server order.
    pub children: Vec<NodeId>,
}

impl MockNode {
    /// Creates a node of `class` named `name` in `namespace`.
    pub fn new(class: NodeClass, namespace: u16, name: &str) -> Self {
        Self {
            class,
            browse_name: QualifiedName::new(namespace, name),
            display_name: name.to_string(),
            description: None,
            data_type: None,
            value: OpcUaValue::Null,
            children: Vec::new(),
        }
    }
}

/// Shared, mutable node table.
#[derive(Debug, Clone, Default)]
pub struct AddressSpace {
    nodes: Arc<RwLock<HashMap<NodeId, MockNode>>>,
}

impl AddressSpace {
    /// Creates an empty address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a node.
    pub fn insert(&self, node_id: NodeId, node: MockNode) {
        self.nodes.write().insert(node_id, node);
    }

    /// Adds a hierarchical reference.
    pub fn link(&self, parent: &NodeId, child: NodeId) {
        if let Some(node) = self.nodes.write().get_mut(parent) {
            node.children.push(child);
        }
    }

    /// Replaces the value of a node.
    pub fn set_value(&self, node_id: &NodeId, value: OpcUaValue) {
        if let Some(node) = self.nodes.write().get_mut(node_id) {
            node.value = value;
        }
    }

    /// Returns a copy of a node.
    pub fn get(&self, node_id: &NodeId) -> Option<MockNode> {
        self.nodes.read().get(node_id).cloned()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns `true` if there are no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

// =============================================================================
// Behaviour
// =============================================================================

/// Failure switches of one mock server.
#[derive(Debug, Default)]
pub struct MockBehavior {
    /// `connect` fails.
    pub fail_connect: AtomicBool,
    /// Reads of the server state node return a bad status.
    pub fail_liveness: AtomicBool,
    /// `create_subscription` fails.
    pub fail_create_subscription: AtomicBool,
    /// `create_monitored_item` fails.
    pub fail_monitored_item: AtomicBool,
    /// Delay before `connect` returns, in milliseconds.
    pub connect_delay_ms: AtomicU64,
    /// Delay before every attribute read, in milliseconds.
    pub read_delay_ms: AtomicU64,
    failing_browses: Mutex<HashSet<NodeId>>,
    failing_reads: Mutex<HashSet<(NodeId, AttributeId)>>,
}

impl MockBehavior {
    /// Makes `connect` fail or succeed.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes liveness reads fail or succeed.
    pub fn set_fail_liveness(&self, fail: bool) {
        self.fail_liveness.store(fail, Ordering::SeqCst);
    }

    /// Makes subscription creation fail or succeed.
    pub fn set_fail_create_subscription(&self, fail: bool) {
        self.fail_create_subscription.store(fail, Ordering::SeqCst);
    }

    /// Makes monitored item creation fail or succeed.
    pub fn set_fail_monitored_item(&self, fail: bool) {
        self.fail_monitored_item.store(fail, Ordering::SeqCst);
    }

    /// Delays every `connect`.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delays every attribute read, yielding to other bridge tasks.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes listing the children of `node_id` fail.
    pub fn fail_browse(&self, node_id: NodeId) {
        self.failing_browses.lock().insert(node_id);
    }

    /// Makes reading `attribute` of `node_id` fail at service level.
    pub fn fail_read(&self, node_id: NodeId, attribute: AttributeId) {
        self.failing_reads.lock().insert((node_id, attribute));
    }

    fn browse_fails(&self, node_id: &NodeId) -> bool {
        self.failing_browses.lock().contains(node_id)
    }

    fn read_fails(&self, node_id: &NodeId, attribute: AttributeId) -> bool {
        self.failing_reads.lock().contains(&(node_id.clone(), attribute))
    }
}

/// The scripted side of one server: its address space and failure switches.
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    /// Nodes served by every transport of this server.
    pub space: AddressSpace,
    /// Failure switches.
    pub behavior: Arc<MockBehavior>,
}

// =============================================================================
// MockTransport
// =============================================================================

#[derive(Debug)]
struct MockSubscription {
    notifications: DataChangeSender,
    items: HashMap<u32, NodeId>,
}

/// Transport serving a [`MockServer`].
#[derive(Debug)]
pub struct MockTransport {
    endpoint: String,
    server: MockServer,
    connected: AtomicBool,
    next_id: AtomicU32,
    subscriptions: Mutex<HashMap<u32, MockSubscription>>,
    connects: AtomicU64,
    disconnects: AtomicU64,
    subscriptions_created: AtomicU64,
    subscriptions_deleted: AtomicU64,
}

impl MockTransport {
    /// Creates an unconnected transport.
    pub fn new(endpoint: impl Into<String>, server: MockServer) -> Self {
        Self {
            endpoint: endpoint.into(),
            server,
            connected: AtomicBool::new(false),
            next_id: AtomicU32::new(1),
            subscriptions: Mutex::new(HashMap::new()),
            connects: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            subscriptions_created: AtomicU64::new(0),
            subscriptions_deleted: AtomicU64::new(0),
        }
    }

    /// Delivers a data change to every monitored item on `node_id`.
    ///
    /// Returns the number of items notified.
    pub fn notify(&self, node_id: &NodeId, value: OpcUaValue, status: StatusCode) -> usize {
        let now = Utc::now();
        let subscriptions = self.subscriptions.lock();
        let mut delivered = 0;
        for (subscription_id, subscription) in subscriptions.iter() {
            for (item_id, item_node) in &subscription.items {
                if item_node != node_id {
                    continue;
                }
                let change = DataChange {
                    subscription_id: *subscription_id,
                    monitored_item_id: *item_id,
                    node_id: node_id.clone(),
                    value: value.clone(),
                    status,
                    source_timestamp: Some(now),
                    server_timestamp: Some(now),
                };
                if subscription.notifications.send(change).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Simulates the server dropping the session.
    pub fn drop_session(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Number of `connect` calls.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` calls.
    pub fn disconnect_count(&self) -> u64 {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Live server-side subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Live monitored items across every subscription.
    pub fn monitored_item_count(&self) -> usize {
        self.subscriptions.lock().values().map(|s| s.items.len()).sum()
    }

    /// Subscriptions ever created.
    pub fn subscriptions_created(&self) -> u64 {
        self.subscriptions_created.load(Ordering::SeqCst)
    }

    /// Subscriptions ever deleted.
    pub fn subscriptions_deleted(&self) -> u64 {
        self.subscriptions_deleted.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self, node_id: &NodeId) -> OpcUaResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(OpcUaError::read_failed(node_id.to_string(), "session closed"))
        }
    }

    fn attribute(node_id: &NodeId, node: &MockNode, attribute: AttributeId) -> ReadResult {
        let is_variable = node.class == NodeClass::Variable;
        let value = match attribute {
            AttributeId::NodeClass => OpcUaValue::Int32(node.class.value() as i32),
            AttributeId::BrowseName => OpcUaValue::QualifiedName(node.browse_name.clone()),
            AttributeId::DisplayName => OpcUaValue::LocalizedText(node.display_name.clone()),
            AttributeId::Description => match &node.description {
                Some(text) => OpcUaValue::LocalizedText(text.clone()),
                None => return ReadResult::with_status(node_id.clone(), StatusCode::BAD_ATTRIBUTE_ID_INVALID),
            },
            AttributeId::Value if is_variable => node.value.clone(),
            AttributeId::DataType if is_variable => match &node.data_type {
                Some(data_type) => OpcUaValue::NodeId(data_type.clone()),
                None => OpcUaValue::Null,
            },
            AttributeId::ValueRank if is_variable => OpcUaValue::Int32(-1),
            AttributeId::AccessLevel if is_variable => OpcUaValue::Byte(1),
            AttributeId::Historizing if is_variable => OpcUaValue::Boolean(false),
            _ => return ReadResult::with_status(node_id.clone(), StatusCode::BAD_ATTRIBUTE_ID_INVALID),
        };
        let mut result = ReadResult::good(node_id.clone(), value);
        if attribute == AttributeId::Value {
            result.source_timestamp = Some(Utc::now());
            result.server_timestamp = result.source_timestamp;
        }
        result
    }
}

#[async_trait]
impl OpcUaTransport for MockTransport {
    async fn connect(&self) -> OpcUaResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = self.server.behavior.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.server.behavior.fail_connect.load(Ordering::SeqCst) {
            return Err(OpcUaError::connection_failed(&self.endpoint, "connection refused"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> OpcUaResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.subscriptions.lock().clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read_attribute(&self, node_id: &NodeId, attribute: AttributeId) -> OpcUaResult<ReadResult> {
        let delay = self.server.behavior.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.ensure_connected(node_id)?;
        if self.server.behavior.read_fails(node_id, attribute) {
            return Err(OpcUaError::read_failed(node_id.to_string(), "scripted read failure"));
        }
        if *node_id == NodeId::SERVER_STATUS_STATE && self.server.behavior.fail_liveness.load(Ordering::SeqCst) {
            return Ok(ReadResult::with_status(node_id.clone(), StatusCode::BAD_COMMUNICATION_ERROR));
        }
        Ok(match self.server.space.get(node_id) {
            Some(node) => Self::attribute(node_id, &node, attribute),
            None => ReadResult::with_status(node_id.clone(), StatusCode::BAD_NODE_ID_UNKNOWN),
        })
    }

    async fn browse(&self, node_id: &NodeId) -> OpcUaResult<Vec<BrowseResult>> {
        self.ensure_connected(node_id)?;
        if self.server.behavior.browse_fails(node_id) {
            return Err(OpcUaError::browse_failed(node_id.to_string(), "scripted browse failure"));
        }
        let Some(node) = self.server.space.get(node_id) else {
            return Err(OpcUaError::browse_failed(node_id.to_string(), "unknown node"));
        };

        Ok(node
            .children
            .iter()
            .map(|child| match self.server.space.get(child) {
                Some(target) => BrowseResult {
                    node_id: child.clone(),
                    browse_name: target.browse_name,
                    display_name: target.display_name,
                    node_class: Some(target.class),
                },
                None => BrowseResult {
                    node_id: child.clone(),
                    browse_name: QualifiedName::default(),
                    display_name: String::new(),
                    node_class: None,
                },
            })
            .collect())
    }

    async fn create_subscription(
        &self,
        _publishing_interval: Duration,
        notifications: DataChangeSender,
    ) -> OpcUaResult<u32> {
        if self.server.behavior.fail_create_subscription.load(Ordering::SeqCst) {
            return Err(OpcUaError::subscription_failed("scripted subscription failure"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().insert(
            id,
            MockSubscription {
                notifications,
                items: HashMap::new(),
            },
        );
        self.subscriptions_created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        match self.subscriptions.lock().remove(&subscription_id) {
            Some(_) => {
                self.subscriptions_deleted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(SubscriptionError::delete_failed(subscription_id, "unknown subscription").into()),
        }
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        _sampling_interval: Duration,
        _queue_size: u32,
    ) -> OpcUaResult<u32> {
        if self.server.behavior.fail_monitored_item.load(Ordering::SeqCst) {
            return Err(SubscriptionError::monitored_item_failed(node_id.to_string(), "scripted item failure").into());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut subscriptions = self.subscriptions.lock();
        let subscription = subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| SubscriptionError::monitored_item_failed(node_id.to_string(), "unknown subscription"))?;
        subscription.items.insert(id, node_id.clone());
        Ok(id)
    }

    async fn delete_monitored_item(&self, subscription_id: u32, monitored_item_id: u32) -> OpcUaResult<()> {
        let mut subscriptions = self.subscriptions.lock();
        match subscriptions
            .get_mut(&subscription_id)
            .and_then(|s| s.items.remove(&monitored_item_id))
        {
            Some(_) => Ok(()),
            None => Err(SubscriptionError::delete_failed(subscription_id, "unknown monitored item").into()),
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// =============================================================================
// MockTransportFactory
// =============================================================================

/// Builds [`MockTransport`]s and remembers the latest one per server.
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    servers: Mutex<HashMap<ServerId, MockServer>>,
    transports: Mutex<HashMap<ServerId, Arc<MockTransport>>>,
    created: AtomicU64,
}

impl MockTransportFactory {
    /// Creates a factory with no scripted servers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `server` under `server_id`, replacing any previous script.
    pub fn with_server(self, server_id: impl Into<ServerId>, server: MockServer) -> Self {
        self.servers.lock().insert(server_id.into(), server);
        self
    }

    /// Returns the script of `server_id`, creating an empty one if needed.
    pub fn server(&self, server_id: impl Into<ServerId>) -> MockServer {
        self.servers.lock().entry(server_id.into()).or_default().clone()
    }

    /// Latest transport built for `server_id`.
    pub fn transport(&self, server_id: impl Into<ServerId>) -> Option<Arc<MockTransport>> {
        self.transports.lock().get(&server_id.into()).cloned()
    }

    /// Number of transports built.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, config: &ServerConfig) -> OpcUaResult<SharedTransport> {
        let server = self.server(config.server_id.clone());
        let transport = Arc::new(MockTransport::new(config.endpoint.clone(), server));
        self.transports
            .lock()
            .insert(config.server_id.clone(), transport.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(transport)
    }
}

// =============================================================================
// RecordingSink
// =============================================================================

/// Sink that records every update.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<ValueUpdate>>,
    reject: AtomicBool,
}

impl RecordingSink {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the sink reject (and still record) every update.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Copy of the recorded updates.
    pub fn updates(&self) -> Vec<ValueUpdate> {
        self.updates.lock().clone()
    }

    /// Number of recorded updates.
    pub fn len(&self) -> usize {
        self.updates.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.updates.lock().is_empty()
    }

    /// Blocks until `count` updates arrived or `timeout` passed.
    ///
    /// Returns `true` if the count was reached.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.len() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_value_changed(&self, update: &ValueUpdate) -> SinkResult<()> {
        self.updates.lock().push(update.clone());
        if self.reject.load(Ordering::SeqCst) {
            return Err(SinkError::rejected(update.target_address, "scripted rejection"));
        }
        Ok(())
    }
}

// =============================================================================
// MemoryServerStore
// =============================================================================

/// [`ServerStore`] over a fixed server list.
#[derive(Debug, Default)]
pub struct MemoryServerStore {
    servers: Vec<ServerConfig>,
    status: Mutex<HashMap<ServerId, ConnectionState>>,
}

impl MemoryServerStore {
    /// Creates a store expecting every server in `servers` to be connected.
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        Self {
            servers,
            status: Mutex::new(HashMap::new()),
        }
    }

    /// Last recorded status of a server.
    pub fn status(&self, server_id: impl Into<ServerId>) -> Option<ConnectionState> {
        self.status.lock().get(&server_id.into()).copied()
    }
}

impl ServerStore for MemoryServerStore {
    fn servers_to_connect(&self) -> Vec<ServerConfig> {
        self.servers.clone()
    }

    fn set_status(&self, server_id: &ServerId, state: ConnectionState) {
        self.status.lock().insert(server_id.clone(), state);
    }
}
