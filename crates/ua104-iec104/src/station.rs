// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! IEC 104 station lifecycle.
//!
//! [`StationManager`] runs at most one station on a dedicated thread with
//! its own current-thread runtime. Callers on any thread update points
//! through [`StationManager::update_point`], which only takes the point
//! table lock and publishes the change to the sessions.
//!
//! ```text
//!            start()                  startup reported
//! STOPPED ───────────► STARTING ───────────────────────► RUNNING
//!    ▲                    │                                 │
//!    │  bind failed or    │                                 │ stop()
//!    └──── timed out ─────┴─────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Builder;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use ua104_core::quality::QualityFlags;
use ua104_core::types::{CommonAddress, IoAddress, Value};

use crate::error::{Iec104Error, Iec104Result};
use crate::frame::asdu::cause;
use crate::points::PointTable;
use crate::server::{ServerContext, ServerSettings, StationServer};
use crate::types::{PointValue, RuntimePoint, StationConfig, StationState, StationStatus};

/// How long `start` waits for the station thread to report.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

/// How long `stop` waits for the station thread to exit.
pub const DEFAULT_STATION_STOP_TIMEOUT: Duration = Duration::from_secs(10);

const THREAD_NAME: &str = "ua104-station";

// =============================================================================
// StationManager
// =============================================================================

/// Owner of the single IEC 104 station.
///
/// Cloning is cheap; clones control the same station. A running station is
/// stopped when the last clone is dropped.
///
/// # Examples
///
/// ```no_run
/// use ua104_core::types::Value;
/// use ua104_core::QualityFlags;
/// use ua104_iec104::{PointConfig, PointType, StationConfig, StationManager};
///
/// let manager = StationManager::new();
/// manager.start(
///     StationConfig::new("substation", "0.0.0.0", 2404)
///         .with_point(PointConfig::new(10, PointType::SinglePoint)),
/// )?;
/// manager.update_point(1, 10, &Value::Bool(true), QualityFlags::GOOD, None)?;
/// manager.stop();
/// # Ok::<(), ua104_iec104::Iec104Error>(())
/// ```
#[derive(Clone)]
pub struct StationManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    points: PointTable,
    startup_timeout: Duration,
    stop_timeout: Duration,
    state: Mutex<ManagerState>,
}

#[derive(Default)]
struct ManagerState {
    lifecycle: StationState,
    config: Option<StationConfig>,
    running: Option<RunningStation>,
}

struct RunningStation {
    shutdown: watch::Sender<bool>,
    thread: JoinHandle<()>,
    context: Arc<ServerContext>,
    local_addr: SocketAddr,
    common_address: CommonAddress,
    generation: u64,
}

impl Default for StationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationManager")
            .field("state", &self.state())
            .finish()
    }
}

impl StationManager {
    /// Creates a stopped manager with the default timeouts.
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_STARTUP_TIMEOUT, DEFAULT_STATION_STOP_TIMEOUT)
    }

    /// Creates a stopped manager.
    pub fn with_timeouts(startup_timeout: Duration, stop_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                points: PointTable::new(),
                startup_timeout,
                stop_timeout,
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts a station and returns its bound address.
    ///
    /// # Errors
    ///
    /// - [`Iec104Error::AlreadyRunning`] if a station is starting or running
    /// - [`Iec104Error::InvalidConfig`] if `config` fails validation
    /// - [`Iec104Error::StartupFailed`] if the thread did not report a bound
    ///   listener in time; the manager is `STOPPED` afterwards
    pub fn start(&self, config: StationConfig) -> Iec104Result<SocketAddr> {
        {
            let mut state = self.inner.state.lock();
            if state.lifecycle != StationState::Stopped {
                return Err(Iec104Error::AlreadyRunning);
            }
            config.validate()?;
            state.lifecycle = StationState::Starting;
            state.config = Some(config.clone());
        }

        info!(
            station = %config.name,
            addr = %config.listen_addr(),
            common_address = config.common_address,
            points = config.points.len(),
            "Starting IEC 104 station"
        );

        let ca = config.common_address;
        let generation = self.inner.points.register(ca, &config.points);
        let context = ServerContext::new(ServerSettings::from(&config), self.inner.points.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Iec104Result<SocketAddr>>(1);

        let thread_context = context.clone();
        let thread_config = config.clone();
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run_station(thread_config, generation, thread_context, shutdown_rx, ready_tx));

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.inner.points.clear_generation(ca, generation);
                self.inner.mark_stopped();
                return Err(Iec104Error::startup_failed(e.to_string()));
            }
        };

        match ready_rx.recv_timeout(self.inner.startup_timeout) {
            Ok(Ok(local_addr)) => {
                let mut state = self.inner.state.lock();
                state.lifecycle = StationState::Running;
                state.running = Some(RunningStation {
                    shutdown: shutdown_tx,
                    thread,
                    context,
                    local_addr,
                    common_address: ca,
                    generation,
                });
                info!(station = %config.name, addr = %local_addr, "IEC 104 station running");
                Ok(local_addr)
            }
            Ok(Err(e)) => {
                error!(station = %config.name, error = %e, "IEC 104 station failed to start");
                join_with_timeout(thread, self.inner.stop_timeout);
                self.inner.points.clear_generation(ca, generation);
                self.inner.mark_stopped();
                Err(Iec104Error::startup_failed(e.to_string()))
            }
            Err(_) => {
                error!(
                    station = %config.name,
                    timeout_ms = self.inner.startup_timeout.as_millis() as u64,
                    "IEC 104 station did not report startup"
                );
                let _ = shutdown_tx.send(true);
                join_with_timeout(thread, self.inner.stop_timeout);
                self.inner.points.clear_generation(ca, generation);
                self.inner.mark_stopped();
                Err(Iec104Error::startup_failed(format!(
                    "no startup report within {:?}",
                    self.inner.startup_timeout
                )))
            }
        }
    }

    /// Stops the station. Stopping a stopped manager does nothing.
    ///
    /// Returns `false` if the station thread did not exit within the stop
    /// timeout; a warning is logged in that case.
    pub fn stop(&self) -> bool {
        self.inner.stop()
    }

    // =========================================================================
    // Points
    // =========================================================================

    /// Converts `value` to the point's type and stores it with `quality`.
    ///
    /// Quality flags the point type cannot carry are dropped. `timestamp`
    /// is only logged; time-tagged types carry the send time. Every started
    /// session receives the new state spontaneously.
    ///
    /// # Errors
    ///
    /// - [`Iec104Error::StationNotRunning`] if no station runs
    /// - [`Iec104Error::UnknownPoint`] if `(common_address, io_address)` has
    ///   no runtime point
    /// - [`Iec104Error::InvalidValue`] if the value does not convert; the
    ///   point keeps its previous value
    pub fn update_point(
        &self,
        common_address: CommonAddress,
        io_address: IoAddress,
        value: &Value,
        quality: QualityFlags,
        timestamp: Option<DateTime<Utc>>,
    ) -> Iec104Result<RuntimePoint> {
        let context = {
            let state = self.inner.state.lock();
            match (&state.lifecycle, &state.running) {
                (StationState::Running, Some(running)) => running.context.clone(),
                _ => return Err(Iec104Error::StationNotRunning),
            }
        };

        let updated = self.inner.points.update(common_address, io_address, |point| {
            let converted = PointValue::convert(point.point_type, io_address, value)?;
            let carried = quality.intersection(point.point_type.quality_mask());
            if carried != quality {
                debug!(
                    ioa = io_address,
                    point_type = %point.point_type,
                    requested = %quality,
                    applied = %carried,
                    "Quality flags not carried by point type dropped"
                );
            }
            Ok(RuntimePoint {
                value: converted,
                quality: carried,
                updated_at: Some(Utc::now()),
                ..point.clone()
            })
        })?;

        let sessions = context.publish(cause::SPONTANEOUS, updated.clone());
        debug!(
            common_address,
            ioa = io_address,
            value = %updated.value,
            quality = %updated.quality,
            source_timestamp = ?timestamp,
            sessions,
            "Point updated"
        );
        Ok(updated)
    }

    /// Returns a snapshot of one runtime point.
    pub fn point(&self, common_address: CommonAddress, io_address: IoAddress) -> Option<RuntimePoint> {
        self.inner.points.get(common_address, io_address)
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Returns the lifecycle state.
    pub fn state(&self) -> StationState {
        self.inner.state.lock().lifecycle
    }

    /// Returns `true` while the station is running.
    pub fn is_running(&self) -> bool {
        self.state() == StationState::Running
    }

    /// Returns a status report.
    pub fn status(&self) -> StationStatus {
        let state = self.inner.state.lock();
        let config = state.config.as_ref();
        StationStatus {
            running: state.lifecycle == StationState::Running,
            state: state.lifecycle,
            station_name: config.map(|c| c.name.clone()),
            ip: config.map(|c| c.ip.clone()),
            port: config.map(|c| c.port),
            local_addr: state.running.as_ref().map(|r| r.local_addr.to_string()),
            common_address: config.map(|c| c.common_address),
            points_count: config.map_or(0, |c| self.inner.points.len(c.common_address)),
            connections: state.running.as_ref().map_or(0, |r| r.context.connections()),
        }
    }
}

impl ManagerInner {
    fn mark_stopped(&self) {
        let mut state = self.state.lock();
        state.lifecycle = StationState::Stopped;
        state.running = None;
    }

    fn stop(&self) -> bool {
        let Some(running) = self.state.lock().running.take() else {
            return true;
        };

        info!(addr = %running.local_addr, "Stopping IEC 104 station");
        let _ = running.shutdown.send(true);
        let finished = join_with_timeout(running.thread, self.stop_timeout);

        self.points.clear_generation(running.common_address, running.generation);
        self.state.lock().lifecycle = StationState::Stopped;

        if finished {
            info!("IEC 104 station stopped");
        }
        finished
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if self.state.lock().running.is_some() {
            self.stop();
        }
    }
}

// =============================================================================
// Station thread
// =============================================================================

fn run_station(
    config: StationConfig,
    generation: u64,
    context: Arc<ServerContext>,
    shutdown: watch::Receiver<bool>,
    ready: std_mpsc::SyncSender<Iec104Result<SocketAddr>>,
) {
    let ca = config.common_address;
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };

    runtime.block_on(async {
        match StationServer::bind(&config.listen_addr(), context.clone()).await {
            Ok(server) => {
                let _ = ready.send(Ok(server.local_addr()));
                server.serve(shutdown).await;
            }
            Err(e) => {
                let _ = ready.send(Err(e));
            }
        }
    });

    runtime.shutdown_timeout(Duration::from_millis(500));
    if !context.points().clear_generation(ca, generation) {
        debug!(common_address = ca, "Points already cleared or taken over by a newer station");
    }
    debug!(common_address = ca, "Station thread exited");
}

fn join_with_timeout(thread: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !thread.is_finished() {
        if Instant::now() >= deadline {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "IEC 104 station thread did not exit in time"
            );
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    if thread.join().is_err() {
        warn!("IEC 104 station thread panicked");
    }
    true
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::apci::UFunction;
    use crate::frame::asdu::{Asdu, Cot, C_IC_NA_1, QOI_STATION};
    use crate::frame::{Apci, Apdu, ApduCodec};
    use crate::types::{DoublePointState, PointConfig, PointType};
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    fn station() -> StationConfig {
        StationConfig::new("test", "127.0.0.1", 0)
            .with_point(PointConfig::new(10, PointType::SinglePoint))
            .with_point(PointConfig::new(11, PointType::DoublePoint))
            .with_point(PointConfig::new(12, PointType::ShortFloat))
    }

    #[test]
    fn test_update_single_point() {
        let manager = StationManager::new();
        manager.start(station()).unwrap();
        assert!(manager.is_running());

        let point = manager
            .update_point(1, 10, &Value::Int(1), QualityFlags::GOOD, Some(Utc::now()))
            .unwrap();
        assert_eq!(point.value, PointValue::Single(true));
        assert!(point.quality.is_good());
        assert_eq!(manager.point(1, 10).unwrap().value, PointValue::Single(true));
        assert!(manager.stop());
    }

    #[test]
    fn test_restart_after_stop_timeout_keeps_new_points() {
        let manager = StationManager::with_timeouts(DEFAULT_STARTUP_TIMEOUT, Duration::ZERO);
        manager.start(station()).unwrap();
        manager.stop();
        manager.start(station()).unwrap();

        // Long enough for the first station thread to wind down.
        thread::sleep(Duration::from_millis(1500));

        let point = manager
            .update_point(1, 10, &Value::Bool(true), QualityFlags::GOOD, None)
            .unwrap();
        assert_eq!(point.value, PointValue::Single(true));
        assert_eq!(manager.status().points_count, 3);
        manager.stop();
    }

    #[test]
    fn test_invalid_double_point_keeps_value() {
        let manager = StationManager::new();
        manager.start(station()).unwrap();
        manager
            .update_point(1, 11, &Value::Int(2), QualityFlags::GOOD, None)
            .unwrap();

        let err = manager
            .update_point(1, 11, &Value::Int(5), QualityFlags::GOOD, None)
            .unwrap_err();
        assert!(matches!(err, Iec104Error::InvalidValue { io_address: 11, .. }));
        assert_eq!(
            manager.point(1, 11).unwrap().value,
            PointValue::Double(DoublePointState::On)
        );
        manager.stop();
    }

    #[test]
    fn test_uncarried_quality_is_dropped() {
        let manager = StationManager::new();
        manager.start(station()).unwrap();
        let point = manager
            .update_point(
                1,
                10,
                &Value::Bool(true),
                QualityFlags::OVERFLOW | QualityFlags::SUBSTITUTED,
                None,
            )
            .unwrap();
        assert_eq!(point.quality, QualityFlags::SUBSTITUTED);

        let point = manager
            .update_point(1, 12, &Value::Float(3.5), QualityFlags::OVERFLOW, None)
            .unwrap();
        assert_eq!(point.quality, QualityFlags::OVERFLOW);
        manager.stop();
    }

    #[test]
    fn test_lifecycle_errors() {
        let manager = StationManager::new();
        assert!(matches!(
            manager.update_point(1, 10, &Value::Bool(true), QualityFlags::GOOD, None),
            Err(Iec104Error::StationNotRunning)
        ));
        assert!(manager.stop());

        manager.start(station()).unwrap();
        assert!(matches!(manager.start(station()), Err(Iec104Error::AlreadyRunning)));
        assert!(matches!(
            manager.update_point(1, 99, &Value::Bool(true), QualityFlags::GOOD, None),
            Err(Iec104Error::UnknownPoint { io_address: 99, .. })
        ));
        assert!(matches!(
            manager.update_point(2, 10, &Value::Bool(true), QualityFlags::GOOD, None),
            Err(Iec104Error::UnknownPoint { common_address: 2, .. })
        ));

        assert!(manager.stop());
        assert_eq!(manager.state(), StationState::Stopped);
        assert!(manager.point(1, 10).is_none());
        manager.start(station()).unwrap();
        manager.stop();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let manager = StationManager::new();
        let err = manager.start(station().with_windows(2, 4)).unwrap_err();
        assert!(matches!(err, Iec104Error::InvalidConfig(_)));
        assert_eq!(manager.state(), StationState::Stopped);
    }

    #[test]
    fn test_bind_failure_leaves_manager_stopped() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let manager = StationManager::new();
        let mut config = station();
        config.port = port;
        let err = manager.start(config).unwrap_err();
        assert!(matches!(err, Iec104Error::StartupFailed(_)));
        assert_eq!(manager.state(), StationState::Stopped);
        assert_eq!(manager.status().points_count, 0);
        drop(occupied);
    }

    #[test]
    fn test_status_report() {
        let manager = StationManager::new();
        let addr = manager.start(station().with_common_address(7)).unwrap();
        let status = manager.status();
        assert!(status.running);
        assert_eq!(status.state, StationState::Running);
        assert_eq!(status.station_name.as_deref(), Some("test"));
        assert_eq!(status.common_address, Some(7));
        assert_eq!(status.points_count, 3);
        assert_eq!(status.local_addr, Some(addr.to_string()));
        manager.stop();

        let status = manager.status();
        assert!(!status.running);
        assert_eq!(status.points_count, 0);
        assert!(status.local_addr.is_none());
    }

    // =========================================================================
    // Master session over TCP
    // =========================================================================

    async fn next(framed: &mut Framed<TcpStream, ApduCodec>) -> Apdu {
        tokio::time::timeout(Duration::from_secs(5), framed.next())
            .await
            .expect("frame within timeout")
            .expect("connection open")
            .expect("valid frame")
    }

    fn command(type_id: u8, common_address: CommonAddress, element: &[u8]) -> Asdu {
        let mut payload = vec![0, 0, 0];
        payload.extend_from_slice(element);
        Asdu {
            type_id,
            sequence: false,
            count: 1,
            cot: Cot::new(cause::ACTIVATION),
            originator: 0,
            common_address,
            payload: Bytes::from(payload),
        }
    }

    #[tokio::test]
    async fn test_master_interrogation_and_spontaneous() {
        let manager = StationManager::new();
        let addr = manager
            .start(StationConfig::new("tcp", "127.0.0.1", 0).with_point(PointConfig::new(10, PointType::SinglePoint)))
            .unwrap();

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut master = Framed::new(stream, ApduCodec);

        master.send(Apdu::u_frame(UFunction::StartDtAct)).await.unwrap();
        assert_eq!(next(&mut master).await.apci, Apci::U(UFunction::StartDtCon));

        let gi = command(C_IC_NA_1, 1, &[QOI_STATION]);
        master
            .send(Apdu::i_frame(Apci::I { send_seq: 0, recv_seq: 0 }, gi))
            .await
            .unwrap();

        let con = next(&mut master).await;
        assert_eq!(con.apci, Apci::I { send_seq: 0, recv_seq: 1 });
        assert_eq!(con.asdu.as_ref().unwrap().cot, Cot::new(cause::ACTIVATION_CON));

        let data = next(&mut master).await.asdu.unwrap();
        assert_eq!(data.type_id, PointType::SinglePoint.type_id());
        assert_eq!(data.cot.cause, cause::INTERROGATED);
        assert_eq!(&data.payload[..], &[10, 0, 0, 0x80]);

        let term = next(&mut master).await.asdu.unwrap();
        assert_eq!(term.type_id, C_IC_NA_1);
        assert_eq!(term.cot.cause, cause::ACTIVATION_TERM);

        manager
            .update_point(1, 10, &Value::Bool(true), QualityFlags::GOOD, None)
            .unwrap();
        let spontaneous = next(&mut master).await;
        assert_eq!(spontaneous.apci, Apci::I { send_seq: 3, recv_seq: 1 });
        let asdu = spontaneous.asdu.unwrap();
        assert_eq!(asdu.cot.cause, cause::SPONTANEOUS);
        assert_eq!(&asdu.payload[..], &[10, 0, 0, 0x01]);
        assert_eq!(manager.status().connections, 1);

        manager.stop();
    }

    #[tokio::test]
    async fn test_master_negative_confirmations() {
        let manager = StationManager::new();
        let addr = manager
            .start(StationConfig::new("neg", "127.0.0.1", 0).with_point(PointConfig::new(1, PointType::Scaled)))
            .unwrap();

        let mut master = Framed::new(TcpStream::connect(addr).await.unwrap(), ApduCodec);
        master.send(Apdu::u_frame(UFunction::TestFrAct)).await.unwrap();
        assert_eq!(next(&mut master).await.apci, Apci::U(UFunction::TestFrCon));
        master.send(Apdu::u_frame(UFunction::StartDtAct)).await.unwrap();
        assert_eq!(next(&mut master).await.apci, Apci::U(UFunction::StartDtCon));

        // Single command, not supported by the station.
        master
            .send(Apdu::i_frame(Apci::I { send_seq: 0, recv_seq: 0 }, command(45, 1, &[0x01])))
            .await
            .unwrap();
        let reply = next(&mut master).await.asdu.unwrap();
        assert_eq!(reply.type_id, 45);
        assert_eq!(reply.cot.cause, cause::UNKNOWN_TYPE);
        assert!(reply.cot.negative);

        master
            .send(Apdu::i_frame(
                Apci::I { send_seq: 1, recv_seq: 1 },
                command(C_IC_NA_1, 9, &[QOI_STATION]),
            ))
            .await
            .unwrap();
        let reply = next(&mut master).await.asdu.unwrap();
        assert_eq!(reply.cot.cause, cause::UNKNOWN_COMMON_ADDRESS);
        assert!(reply.cot.negative);

        manager.stop();
    }
}
