// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA connection registry.
//!
//! The registry owns one live transport per server id together with the
//! server's [`ConnectionState`]. Every state transition runs on the
//! [`AsyncBridge`]; lookups read the maps directly and never wait for the
//! bridge.
//!
//! # State machine
//!
//! ```text
//!                connect()               transport up
//! DISCONNECTED ───────────► CONNECTING ───────────────► CONNECTED
//!      ▲                        │                           │
//!      │                        │ failure                   │ mark_error(), lost session
//!      │     disconnect()       ▼                           ▼
//!      └──────────────────── ERROR ◄────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ua104_core::AsyncBridge;
//! use ua104_opcua::{ConnectionRegistry, RealTransportFactory, ServerConfig};
//!
//! let bridge = AsyncBridge::new();
//! bridge.start()?;
//! let registry = ConnectionRegistry::new(bridge, Arc::new(RealTransportFactory::new()));
//! registry.connect(&ServerConfig::new("plant-a", "opc.tcp://localhost:4840"))?;
//! assert!(registry.is_connected(&"plant-a".into()));
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use ua104_core::bridge::AsyncBridge;
use ua104_core::types::{ConnectionState, ServerId};

use crate::client::{SharedTransport, TransportFactory};
use crate::error::{OpcUaError, OpcUaResult};
use crate::types::{NodeId, ServerConfig};

// =============================================================================
// ServerStore
// =============================================================================

/// Persistent view of the configured servers.
pub trait ServerStore: Send + Sync {
    /// Servers that are expected to be connected.
    fn servers_to_connect(&self) -> Vec<ServerConfig>;

    /// Records the connection state of a server.
    fn set_status(&self, server_id: &ServerId, state: ConnectionState);
}

/// Outcome of [`ConnectionRegistry::auto_reconnect_sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Servers without a live handle that were tried.
    pub attempted: usize,
    /// Servers that are connected again.
    pub reconnected: usize,
    /// Servers that failed to connect.
    pub failed: usize,
    /// Failure reasons by server.
    pub failures: Vec<(ServerId, String)>,
}

/// Called with the server id whenever a live handle is dropped.
pub type HandleDroppedListener = Box<dyn Fn(&ServerId) + Send + Sync>;

// =============================================================================
// ConnectionRegistry
// =============================================================================

/// Registry of live OPC UA client handles.
///
/// Cloning is cheap; clones share the same maps.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    bridge: AsyncBridge,
    factory: Arc<dyn TransportFactory>,
    handles: DashMap<ServerId, SharedTransport>,
    states: DashMap<ServerId, ConnectionState>,
    last_errors: DashMap<ServerId, String>,
    listeners: RwLock<Vec<HandleDroppedListener>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry driving transports on `bridge`.
    pub fn new(bridge: AsyncBridge, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                bridge,
                factory,
                handles: DashMap::new(),
                states: DashMap::new(),
                last_errors: DashMap::new(),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Returns the bridge this registry runs on.
    pub fn bridge(&self) -> &AsyncBridge {
        &self.inner.bridge
    }

    /// Registers a callback fired whenever a live handle is dropped
    /// (disconnect, error, stale handle replaced).
    pub fn on_handle_dropped(&self, listener: HandleDroppedListener) {
        self.inner.listeners.write().push(listener);
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Connects a server, reusing a healthy existing session.
    ///
    /// # Errors
    ///
    /// Returns the configuration, transport or bridge failure. After a
    /// failure no handle is registered and the state is `ERROR`.
    pub fn connect(&self, config: &ServerConfig) -> OpcUaResult<()> {
        config.validate()?;

        let inner = self.inner.clone();
        let server_id = config.server_id.clone();
        let config = config.clone();
        let result = self
            .inner
            .bridge
            .run(async move { inner.connect(config).await })
            .map_err(OpcUaError::from)
            .and_then(|r| r);

        if let Err(ref e) = result {
            if !self.inner.handles.contains_key(&server_id) {
                self.inner.record_failure(&server_id, e);
            }
        }
        result
    }

    /// Disconnects a server. Succeeds when nothing was connected.
    pub fn disconnect(&self, server_id: &ServerId) -> OpcUaResult<()> {
        let inner = self.inner.clone();
        let id = server_id.clone();
        self.inner
            .bridge
            .run(async move { inner.disconnect(&id).await })?;
        Ok(())
    }

    /// Disconnects every registered server.
    pub fn disconnect_all(&self) -> OpcUaResult<()> {
        for server_id in self.connected_servers() {
            self.disconnect(&server_id)?;
        }
        Ok(())
    }

    /// Moves a server to `ERROR` after a protocol failure seen elsewhere.
    ///
    /// The handle is dropped so the next reconnect sweep retries it.
    pub fn mark_error(&self, server_id: &ServerId, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(server_id = %server_id, reason = %reason, "Server marked as failed");

        if let Some((_, transport)) = self.inner.handles.remove(server_id) {
            self.inner.notify_dropped(server_id);
            let closing = async move {
                if let Err(e) = transport.disconnect().await {
                    debug!(error = %e, "Closing failed transport");
                }
            };
            if self.inner.bridge.spawn(closing).is_err() {
                debug!(server_id = %server_id, "Bridge stopped; failed transport left to drop");
            }
        }
        self.inner.states.insert(server_id.clone(), ConnectionState::Error);
        self.inner.last_errors.insert(server_id.clone(), reason);
    }

    /// Checks the handle an operation failed on.
    ///
    /// A connection error, or a transport that no longer reports a session,
    /// moves the server to `ERROR` through [`mark_error`](Self::mark_error).
    /// Nothing happens if `transport` is no longer the registered handle.
    /// Returns `true` if the server was marked.
    pub fn report_failure(&self, server_id: &ServerId, transport: &SharedTransport, error: &OpcUaError) -> bool {
        if !matches!(error, OpcUaError::Connection(_)) && transport.is_connected() {
            return false;
        }
        self.mark_lost(server_id, transport, error.to_string())
    }

    /// Marks the server as failed if `transport` lost its session.
    pub fn check_session(&self, server_id: &ServerId, transport: &SharedTransport) -> bool {
        !transport.is_connected() && self.mark_lost(server_id, transport, "session closed")
    }

    fn mark_lost(&self, server_id: &ServerId, transport: &SharedTransport, reason: impl Into<String>) -> bool {
        let current = self
            .inner
            .handles
            .get(server_id)
            .is_some_and(|h| same_transport(&h, transport));
        if current {
            self.mark_error(server_id, reason);
        }
        current
    }

    /// Reconnects every server the store expects to be connected that has no
    /// live handle. A registered handle whose transport lost its session
    /// counts as missing and is replaced.
    pub fn auto_reconnect_sweep(&self, store: &dyn ServerStore) -> SweepReport {
        let mut report = SweepReport::default();

        for config in store.servers_to_connect() {
            let live = self
                .handle(&config.server_id)
                .is_some_and(|transport| transport.is_connected());
            if live {
                continue;
            }
            report.attempted += 1;
            info!(server_id = %config.server_id, endpoint = %config.endpoint, "Auto-reconnecting server");

            match self.connect(&config) {
                Ok(()) => {
                    report.reconnected += 1;
                    store.set_status(&config.server_id, ConnectionState::Connected);
                }
                Err(e) => {
                    warn!(server_id = %config.server_id, error = %e, "Auto-reconnect failed");
                    report.failed += 1;
                    report.failures.push((config.server_id.clone(), e.to_string()));
                    store.set_status(&config.server_id, ConnectionState::Error);
                }
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                reconnected = report.reconnected,
                failed = report.failed,
                "Reconnect sweep finished"
            );
        }
        report
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Returns `true` if a handle is registered. No liveness check.
    pub fn is_connected(&self, server_id: &ServerId) -> bool {
        self.inner.handles.contains_key(server_id)
    }

    /// Returns the recorded state; unknown servers are `DISCONNECTED`.
    pub fn state(&self, server_id: &ServerId) -> ConnectionState {
        self.inner
            .states
            .get(server_id)
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Returns the reason of the last failure.
    pub fn last_error(&self, server_id: &ServerId) -> Option<String> {
        self.inner.last_errors.get(server_id).map(|e| e.clone())
    }

    /// Returns the ids of servers with a live handle, sorted.
    pub fn connected_servers(&self) -> Vec<ServerId> {
        let mut ids: Vec<ServerId> = self.inner.handles.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Returns the live handle of a server.
    pub fn handle(&self, server_id: &ServerId) -> Option<SharedTransport> {
        self.inner.handles.get(server_id).map(|h| h.clone())
    }

    /// Returns the live handle or `ServerNotConnected`.
    pub fn require_handle(&self, server_id: &ServerId) -> OpcUaResult<SharedTransport> {
        self.handle(server_id)
            .ok_or_else(|| OpcUaError::not_connected(server_id.clone()))
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connected", &self.connected_servers())
            .finish()
    }
}

fn same_transport(a: &SharedTransport, b: &SharedTransport) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl RegistryInner {
    async fn connect(&self, config: ServerConfig) -> OpcUaResult<()> {
        let server_id = config.server_id.clone();

        if let Some(existing) = self.handles.get(&server_id).map(|h| h.clone()) {
            let healthy = self.state_of(&server_id) == ConnectionState::Connected
                && match existing.read_value(&NodeId::SERVER_STATUS_STATE).await {
                    Ok(result) if result.is_good() => true,
                    Ok(result) => {
                        warn!(server_id = %server_id, status = %result.status, "Liveness read returned bad status");
                        false
                    }
                    Err(e) => {
                        warn!(server_id = %server_id, error = %e, "Liveness read failed");
                        false
                    }
                };

            if healthy {
                debug!(server_id = %server_id, "Already connected and healthy");
                return Ok(());
            }

            info!(server_id = %server_id, "Replacing stale connection");
            self.handles.remove(&server_id);
            self.notify_dropped(&server_id);
            if let Err(e) = existing.disconnect().await {
                debug!(server_id = %server_id, error = %e, "Closing stale transport failed");
            }
        }

        self.states.insert(server_id.clone(), ConnectionState::Connecting);
        info!(
            server_id = %server_id,
            endpoint = %config.endpoint,
            security_mode = %config.security_mode,
            security_policy = %config.security_policy,
            identity = %config.identity,
            "Connecting"
        );

        let transport = self.factory.create(&config)?;
        if let Err(e) = transport.connect().await {
            if let Err(close) = transport.disconnect().await {
                debug!(server_id = %server_id, error = %close, "Cleanup after failed connect");
            }
            self.record_failure(&server_id, &e);
            return Err(e);
        }

        self.handles.insert(server_id.clone(), transport);
        self.states.insert(server_id.clone(), ConnectionState::Connected);
        self.last_errors.remove(&server_id);
        info!(server_id = %server_id, endpoint = %config.endpoint, "Connected");
        Ok(())
    }

    async fn disconnect(&self, server_id: &ServerId) {
        if let Some((_, transport)) = self.handles.remove(server_id) {
            self.notify_dropped(server_id);
            match transport.disconnect().await {
                Ok(()) => info!(server_id = %server_id, "Disconnected"),
                Err(e) => warn!(server_id = %server_id, error = %e, "Disconnect reported an error"),
            }
        } else {
            debug!(server_id = %server_id, "Disconnect requested for unconnected server");
        }
        self.states.insert(server_id.clone(), ConnectionState::Disconnected);
    }

    fn state_of(&self, server_id: &ServerId) -> ConnectionState {
        self.states.get(server_id).map(|s| *s).unwrap_or_default()
    }

    fn record_failure(&self, server_id: &ServerId, error: &OpcUaError) {
        warn!(server_id = %server_id, category = error.category(), error = %error, "Connection failed");
        self.states.insert(server_id.clone(), ConnectionState::Error);
        self.last_errors.insert(server_id.clone(), error.to_string());
    }

    fn notify_dropped(&self, server_id: &ServerId) {
        for listener in self.listeners.read().iter() {
            listener(server_id);
        }
    }
}
