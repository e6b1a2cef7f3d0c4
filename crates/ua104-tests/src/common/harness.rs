// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! Wires a running bridge, a registry over a [`MockTransportFactory`], a
//! subscription engine feeding a [`RecordingSink`] and a browser. Dropping
//! the harness stops the bridge.

use std::sync::Arc;
use std::time::Duration;

use ua104_core::bridge::{AsyncBridge, BridgeConfig};
use ua104_core::types::ServerId;
use ua104_opcua::{AddressSpaceBrowser, ConnectionRegistry, OpcUaResult, SubscriptionEngine};

use super::fixtures::{plant_server, server_config, PLANT};
use super::mocks::{MockServer, MockTransport, MockTransportFactory, RecordingSink};

/// Default bound for blocking waits in tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Running components over mock servers.
pub struct GatewayHarness {
    /// The bridge.
    pub bridge: AsyncBridge,
    /// Transport factory shared with the registry.
    pub factory: Arc<MockTransportFactory>,
    /// The registry.
    pub registry: ConnectionRegistry,
    /// Sink behind the engine.
    pub sink: Arc<RecordingSink>,
    /// The subscription engine.
    pub engine: SubscriptionEngine,
    /// The browser.
    pub browser: AddressSpaceBrowser,
}

impl GatewayHarness {
    /// Harness whose `plant` server serves the plant fixture.
    pub fn new() -> Self {
        Self::with_factory(MockTransportFactory::new().with_server(PLANT, plant_server()))
    }

    /// Harness over `factory`.
    pub fn with_factory(factory: MockTransportFactory) -> Self {
        super::init_test_logging();

        let bridge = AsyncBridge::with_config(BridgeConfig::default().with_operation_timeout(WAIT));
        bridge.start().expect("bridge should start");

        let factory = Arc::new(factory);
        let registry = ConnectionRegistry::new(bridge.clone(), factory.clone());
        let sink = Arc::new(RecordingSink::new());
        let engine = SubscriptionEngine::new(registry.clone(), sink.clone());
        let browser = AddressSpaceBrowser::new(registry.clone());

        Self {
            bridge,
            factory,
            registry,
            sink,
            engine,
            browser,
        }
    }

    /// Script of `server_id`.
    pub fn server(&self, server_id: &str) -> MockServer {
        self.factory.server(server_id)
    }

    /// Connects `server_id` with the fixture configuration.
    pub fn connect(&self, server_id: &str) -> OpcUaResult<()> {
        self.registry.connect(&server_config(server_id))
    }

    /// Latest transport of `server_id`.
    pub fn transport(&self, server_id: &str) -> Arc<MockTransport> {
        self.factory
            .transport(server_id)
            .expect("server should have a transport")
    }

    /// `server_id` as an id.
    pub fn id(server_id: &str) -> ServerId {
        ServerId::new(server_id)
    }
}

impl Default for GatewayHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GatewayHarness {
    fn drop(&mut self) {
        self.bridge.stop();
    }
}
