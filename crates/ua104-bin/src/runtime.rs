// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Gateway runtime orchestration.
//!
//! ```text
//!                 ┌──────────────┐   connect / browse / subscribe
//!  run loop ────► │ AsyncBridge  │ ─────────────────────────────► OPC UA servers
//!  (tokio)        └──────┬───────┘
//!                        │ data changes
//!                        ▼
//!                 ┌──────────────┐   station | http | log
//!                 │ Subscription │ ────────────────────────► Sink
//!                 │    Engine    │
//!                 └──────────────┘
//!                                     StationSink ─► StationManager ─► IEC 104 masters
//! ```
//!
//! Startup order: bridge, station, reconnect sweep, bulk subscribe.
//! Shutdown order: unsubscribe all, disconnect every server, stop the
//! station, stop the bridge.
//!
//! The component methods block on the bridge; the async [`GatewayRuntime::run`]
//! moves them onto blocking threads.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ua104_config::{FileServerStore, GatewayConfig, SinkKind};
use ua104_core::bridge::AsyncBridge;
use ua104_core::sink::{LogSink, Sink};
use ua104_core::types::ConnectionState;
use ua104_iec104::{StationManager, StationSink, StationStatus};
use ua104_opcua::{
    BulkReport, ConnectionRegistry, ServerStore, SubscriptionEngine, SweepReport, TransportFactory,
};

use crate::error::{BinError, BinResult};
use crate::http_sink::HttpPushSink;
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// StartupReport
// =============================================================================

/// What happened while starting.
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    /// Station status after start, `None` without a station section.
    pub station: Option<StationStatus>,
    /// Initial reconnect sweep, `None` when skipped.
    pub sweep: Option<SweepReport>,
    /// Initial bulk subscribe, `None` when skipped.
    pub subscriptions: Option<BulkReport>,
}

// =============================================================================
// GatewayRuntime
// =============================================================================

/// The running set of gateway components.
///
/// Cloning is cheap; clones drive the same components.
#[derive(Clone)]
pub struct GatewayRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    config: GatewayConfig,
    bridge: AsyncBridge,
    registry: ConnectionRegistry,
    store: FileServerStore,
    station: StationManager,
    engine: SubscriptionEngine,
    shutdown: ShutdownCoordinator,
    push_worker: Mutex<Option<JoinHandle<()>>>,
}

impl GatewayRuntime {
    /// Wires the components for `config`.
    ///
    /// `handle` runs the HTTP push worker when the sink kind is `http`.
    pub fn build(config: GatewayConfig, factory: Arc<dyn TransportFactory>, handle: &Handle) -> BinResult<Self> {
        let bridge = AsyncBridge::with_config(config.bridge.to_bridge_config());
        let registry = ConnectionRegistry::new(bridge.clone(), factory);
        let store = FileServerStore::new(config.servers.clone());
        let station = StationManager::new();

        let mut push_worker = None;
        let sink: Arc<dyn Sink> = match config.sink.kind {
            SinkKind::Station => {
                let station_config = config
                    .station
                    .as_ref()
                    .ok_or_else(|| BinError::config("sink kind 'station' requires a station section"))?;
                Arc::new(StationSink::new(station.clone(), station_config.common_address))
            }
            SinkKind::Http => {
                let (sink, worker) = HttpPushSink::spawn(handle, config.sink.url.clone(), config.sink.timeout())?;
                push_worker = Some(worker);
                Arc::new(sink)
            }
            SinkKind::Log => Arc::new(LogSink),
        };
        info!(sink = sink.name(), "Sink selected");

        let engine = SubscriptionEngine::new(registry.clone(), sink);

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                config,
                bridge,
                registry,
                store,
                station,
                engine,
                shutdown: ShutdownCoordinator::new(),
                push_worker: Mutex::new(push_worker),
            }),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Returns the connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    /// Returns the subscription engine.
    pub fn engine(&self) -> &SubscriptionEngine {
        &self.inner.engine
    }

    /// Returns the station manager.
    pub fn station(&self) -> &StationManager {
        &self.inner.station
    }

    /// Returns the shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.inner.shutdown
    }

    // =========================================================================
    // Blocking lifecycle
    // =========================================================================

    /// Starts the bridge and the station, then connects and subscribes
    /// unless `skip_connect` is set. Blocks.
    ///
    /// # Errors
    ///
    /// Bridge or station startup failure. Connection and subscription
    /// failures are reported, not returned.
    pub fn start(&self, skip_connect: bool) -> BinResult<StartupReport> {
        let inner = &self.inner;
        inner.bridge.start()?;

        let mut report = StartupReport::default();
        if let Some(station_config) = &inner.config.station {
            let local_addr = inner.station.start(station_config.clone())?;
            info!(
                station = %station_config.name,
                %local_addr,
                common_address = station_config.common_address,
                points = station_config.points.len(),
                "IEC 104 station listening"
            );
            report.station = Some(inner.station.status());
        }

        if skip_connect {
            info!("Initial connection sweep skipped");
            return Ok(report);
        }

        let (sweep, subscriptions) = self.resync();
        report.sweep = Some(sweep);
        report.subscriptions = Some(subscriptions);
        Ok(report)
    }

    /// Reconnects servers that should be connected and subscribes every
    /// mapping that is not yet active. Blocks.
    pub fn resync(&self) -> (SweepReport, BulkReport) {
        let sweep = self.inner.registry.auto_reconnect_sweep(&self.inner.store);
        let subscriptions = self.inner.engine.subscribe_all(&self.inner.config.mappings);
        (sweep, subscriptions)
    }

    /// Tears everything down in order. Blocks. Safe to call twice.
    pub fn stop(&self) {
        let inner = &self.inner;

        let removed = inner.engine.unsubscribe_all();
        for server_id in inner.registry.connected_servers() {
            match inner.registry.disconnect(&server_id) {
                Ok(()) => inner.store.set_status(&server_id, ConnectionState::Disconnected),
                Err(e) => warn!(server_id = %server_id, error = %e, "Disconnect failed"),
            }
        }
        let station_stopped = inner.station.stop();
        let bridge_stopped = inner.bridge.stop();

        if let Some(worker) = inner.push_worker.lock().take() {
            worker.abort();
        }
        info!(
            unsubscribed = removed.succeeded,
            station_stopped,
            bridge_stopped,
            "Gateway components stopped"
        );
    }

    // =========================================================================
    // Async driver
    // =========================================================================

    /// Starts the gateway, keeps it in sync until a shutdown signal, then
    /// stops it.
    pub async fn run(self, skip_connect: bool) -> BinResult<()> {
        info!(
            gateway = %self.inner.config.gateway.name,
            version = ua104_core::VERSION,
            "Starting gateway"
        );

        let starter = self.clone();
        let started = tokio::task::spawn_blocking(move || starter.start(skip_connect))
            .await
            .map_err(|e| BinError::runtime(format!("startup task failed: {}", e)))?;
        if let Err(e) = started {
            let stopper = self.clone();
            let _ = tokio::task::spawn_blocking(move || stopper.stop()).await;
            return Err(e.with_context("gateway startup failed"));
        }

        let reconnect = self
            .inner
            .config
            .reconnect
            .enabled
            .then(|| tokio::spawn(self.clone().reconnect_loop(self.inner.config.reconnect.interval())));

        info!("Gateway is ready");
        self.inner.shutdown.wait_for_shutdown().await;
        info!("Shutdown initiated, cleaning up...");

        if let Some(task) = reconnect {
            let _ = task.await;
        }

        let stopper = self.clone();
        tokio::task::spawn_blocking(move || stopper.stop())
            .await
            .map_err(|e| BinError::runtime(format!("shutdown task failed: {}", e)))?;

        info!("Gateway shutdown complete");
        Ok(())
    }

    async fn reconnect_loop(self, period: Duration) {
        let mut shutdown = self.inner.shutdown.subscribe();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let runtime = self.clone();
                    match tokio::task::spawn_blocking(move || runtime.resync()).await {
                        Ok((sweep, subs)) if sweep.attempted > 0 || subs.succeeded > 0 => info!(
                            reconnected = sweep.reconnected,
                            failed = sweep.failed,
                            subscribed = subs.succeeded,
                            "Periodic resync"
                        ),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Resync task failed"),
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ua104_core::mapping::{Mapping, MappingSet};
    use ua104_iec104::{PointConfig, PointType, StationConfig};
    use ua104_opcua::{OpcUaError, OpcUaResult, ServerConfig, SharedTransport};

    struct Unreachable;

    impl TransportFactory for Unreachable {
        fn create(&self, config: &ServerConfig) -> OpcUaResult<SharedTransport> {
            Err(OpcUaError::connection_failed(&config.endpoint, "unreachable"))
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig {
            servers: vec![ServerConfig::new("plant", "opc.tcp://127.0.0.1:1").with_auto_connect(true)],
            mappings: MappingSet::new(vec![Mapping::new(1, "plant", "ns=2;s=Breaker", 10)]),
            station: Some(
                StationConfig::new("rtu", "127.0.0.1", 0).with_point(PointConfig::new(10, PointType::SinglePoint)),
            ),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_and_stop_with_unreachable_server() {
        let runtime = GatewayRuntime::build(config(), Arc::new(Unreachable), &Handle::current()).unwrap();

        let rt = runtime.clone();
        let report = tokio::task::spawn_blocking(move || rt.start(false)).await.unwrap().unwrap();

        assert!(report.station.as_ref().unwrap().running);
        let sweep = report.sweep.unwrap();
        assert_eq!((sweep.attempted, sweep.failed), (1, 1));
        assert_eq!(report.subscriptions.unwrap().skipped_server_disconnected, 1);
        assert!(runtime.station().is_running());

        let rt = runtime.clone();
        tokio::task::spawn_blocking(move || rt.stop()).await.unwrap();
        assert!(!runtime.station().is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_until_shutdown() {
        let runtime = GatewayRuntime::build(config(), Arc::new(Unreachable), &Handle::current()).unwrap();
        let coordinator = runtime.shutdown_coordinator().clone();
        let station = runtime.station().clone();

        let task = tokio::spawn(runtime.run(true));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(station.is_running());

        coordinator.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(15), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!station.is_running());
    }

    #[tokio::test]
    async fn test_station_sink_needs_station() {
        let mut config = config();
        config.station = None;
        let result = GatewayRuntime::build(config, Arc::new(Unreachable), &Handle::current());
        assert!(matches!(result, Err(BinError::Configuration(_))));
    }
}
