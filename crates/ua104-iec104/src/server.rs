// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Controlled-station side of IEC 60870-5-104.
//!
//! [`StationServer`] accepts master connections and runs one session
//! task per connection. Point changes reach every session through a
//! broadcast channel; a session forwards them only while data transfer is
//! started.
//!
//! ```text
//!   update_point ──► PointTable ──► broadcast ──┬──► Session (master A)
//!   cyclic task  ───────────────────────────────┤
//!                                               └──► Session (master B)
//! ```
//!
//! Per session:
//!
//! - STARTDT/STOPDT/TESTFR are confirmed.
//! - Received I-frames are acknowledged after `w` frames or `t2`.
//! - At most `k` I-frames stay unacknowledged; the rest wait in a queue.
//! - Unacknowledged I-frames or TESTFR older than `t1` close the connection.
//! - A TESTFR is sent after `t3` without traffic from the master.
//! - A connection without data transfer for `t0` is closed.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use ua104_core::types::{CommonAddress, IoAddress};

use crate::error::{Iec104Result, ProtocolError};
use crate::frame::apci::{next_seq, seq_distance};
use crate::frame::asdu::{cause, monitoring_asdus, GLOBAL_COMMON_ADDRESS, C_CS_NA_1, C_IC_NA_1};
use crate::frame::time::decode_cp56;
use crate::frame::{Apci, Apdu, ApduCodec, Asdu, UFunction};
use crate::points::PointTable;
use crate::types::{RuntimePoint, StationConfig};

/// Timer resolution of a session.
const TICK: Duration = Duration::from_millis(100);
/// Capacity of the change broadcast per session.
const TRANSMISSION_CAPACITY: usize = 1024;
/// Largest number of ASDUs waiting for the k window.
const QUEUE_LIMIT: usize = 4096;

// =============================================================================
// Settings and shared context
// =============================================================================

/// Protocol parameters applied to every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Common address served.
    pub common_address: CommonAddress,
    /// Idle time without data transfer before the connection is closed.
    pub t0: Duration,
    /// Acknowledgement timeout for sent I-frames and TESTFR.
    pub t1: Duration,
    /// Delay before received I-frames are acknowledged.
    pub t2: Duration,
    /// Idle time before a TESTFR is sent.
    pub t3: Duration,
    /// Unacknowledged I-frames allowed in flight.
    pub k: u16,
    /// I-frames received before an S-frame is due.
    pub w: u16,
}

impl From<&StationConfig> for ServerSettings {
    fn from(config: &StationConfig) -> Self {
        Self {
            common_address: config.common_address,
            t0: Duration::from_secs(config.t0),
            t1: Duration::from_secs(config.t1),
            t2: Duration::from_secs(config.t2),
            t3: Duration::from_secs(config.t3),
            k: config.k,
            w: config.w,
        }
    }
}

/// A point snapshot to send to every started session.
#[derive(Debug, Clone)]
pub struct Transmission {
    /// Cause of transmission.
    pub cause: u8,
    /// Point state at the time of the change.
    pub point: RuntimePoint,
}

/// State shared by the accept loop, the sessions and the station manager.
#[derive(Debug)]
pub struct ServerContext {
    settings: ServerSettings,
    points: PointTable,
    transmissions: broadcast::Sender<Transmission>,
    connections: AtomicUsize,
}

impl ServerContext {
    /// Creates the context of one station.
    pub fn new(settings: ServerSettings, points: PointTable) -> Arc<Self> {
        let (transmissions, _) = broadcast::channel(TRANSMISSION_CAPACITY);
        Arc::new(Self {
            settings,
            points,
            transmissions,
            connections: AtomicUsize::new(0),
        })
    }

    /// Returns the protocol parameters.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Returns the point table.
    pub fn points(&self) -> &PointTable {
        &self.points
    }

    /// Queues a point for every started session. Returns the number of
    /// sessions reached.
    pub fn publish(&self, cause: u8, point: RuntimePoint) -> usize {
        self.transmissions.send(Transmission { cause, point }).unwrap_or(0)
    }

    /// Returns the number of connected masters.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

struct ConnectionGuard(Arc<ServerContext>);

impl ConnectionGuard {
    fn new(context: Arc<ServerContext>) -> Self {
        context.connections.fetch_add(1, Ordering::Relaxed);
        Self(context)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

// =============================================================================
// StationServer
// =============================================================================

/// A bound station endpoint.
pub struct StationServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: Arc<ServerContext>,
}

impl StationServer {
    /// Binds the listener.
    pub async fn bind(addr: &str, context: Arc<ServerContext>) -> Iec104Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            common_address = context.settings.common_address,
            "IEC 104 station listening"
        );
        Ok(Self {
            listener,
            local_addr,
            context,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts masters until `shutdown` turns `true` or its sender drops.
    ///
    /// Sessions and cyclic tasks are aborted on return.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();
        let ca = self.context.settings.common_address;

        for (_, points) in self.context.points.snapshot_by_type(ca) {
            for point in points.into_iter().filter(|p| p.report_interval_ms > 0) {
                tasks.spawn(cyclic_report(
                    self.context.clone(),
                    point.io_address,
                    Duration::from_millis(point.report_interval_ms),
                ));
            }
        }

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                    accepted = self.listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let context = self.context.clone();
                            let stop = shutdown.clone();
                            tasks.spawn(async move {
                                let guard = ConnectionGuard::new(context.clone());
                                info!(peer = %peer, connections = context.connections(), "Master connected");
                                match Session::new(stream, peer, context).run(stop).await {
                                    Ok(()) => info!(peer = %peer, "Master disconnected"),
                                    Err(e) => warn!(peer = %peer, error = %e, "Session closed"),
                                }
                                drop(guard);
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                            tokio::time::sleep(TICK).await;
                        }
                    },
                }
            }
        }

        tasks.shutdown().await;
        info!(addr = %self.local_addr, "IEC 104 station stopped");
    }
}

async fn cyclic_report(context: Arc<ServerContext>, io_address: IoAddress, period: Duration) {
    let ca = context.settings.common_address;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match context.points.get(ca, io_address) {
            Some(point) => {
                context.publish(cause::PERIODIC, point);
            }
            None => break,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

struct Session {
    framed: Framed<TcpStream, ApduCodec>,
    peer: SocketAddr,
    context: Arc<ServerContext>,
    started: bool,
    send_seq: u16,
    recv_seq: u16,
    /// Oldest N(S) not yet acknowledged by the master.
    acked_seq: u16,
    in_flight: VecDeque<Instant>,
    unacked_received: u16,
    first_unacked_at: Option<Instant>,
    test_sent_at: Option<Instant>,
    last_received: Instant,
    stopped_since: Option<Instant>,
    queue: VecDeque<Asdu>,
}

impl Session {
    fn new(stream: TcpStream, peer: SocketAddr, context: Arc<ServerContext>) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "TCP_NODELAY not set");
        }
        let now = Instant::now();
        Self {
            framed: Framed::new(stream, ApduCodec),
            peer,
            context,
            started: false,
            send_seq: 0,
            recv_seq: 0,
            acked_seq: 0,
            in_flight: VecDeque::new(),
            unacked_received: 0,
            first_unacked_at: None,
            test_sent_at: None,
            last_received: now,
            stopped_since: Some(now),
            queue: VecDeque::new(),
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Iec104Result<()> {
        let mut transmissions = self.context.transmissions.subscribe();
        let mut tick = interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = self.framed.next() => match frame {
                    Some(Ok(apdu)) => self.on_apdu(apdu).await?,
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
                received = transmissions.recv() => match received {
                    Ok(transmission) => self.on_transmission(transmission),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(peer = %self.peer, skipped, "Session lagged behind point changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
                _ = tick.tick() => self.check_timers().await?,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
            self.flush().await?;
        }
    }

    // =========================================================================
    // Receive path
    // =========================================================================

    async fn on_apdu(&mut self, apdu: Apdu) -> Iec104Result<()> {
        let now = Instant::now();
        self.last_received = now;
        self.test_sent_at = None;

        match apdu.apci {
            Apci::I { send_seq, recv_seq } => {
                if send_seq != self.recv_seq {
                    return Err(ProtocolError::SequenceMismatch {
                        expected: self.recv_seq,
                        received: send_seq,
                    }
                    .into());
                }
                self.recv_seq = next_seq(self.recv_seq);
                if self.unacked_received == 0 {
                    self.first_unacked_at = Some(now);
                }
                self.unacked_received += 1;
                self.acknowledge(recv_seq)?;

                if let Some(asdu) = apdu.asdu {
                    self.on_asdu(asdu);
                }
                if self.unacked_received >= self.context.settings.w {
                    self.send_ack().await?;
                }
            }
            Apci::S { recv_seq } => self.acknowledge(recv_seq)?,
            Apci::U(UFunction::StartDtAct) => {
                self.started = true;
                self.stopped_since = None;
                self.framed.send(Apdu::u_frame(UFunction::StartDtCon)).await?;
                info!(peer = %self.peer, "Data transfer started");
            }
            Apci::U(UFunction::StopDtAct) => {
                self.started = false;
                self.stopped_since = Some(now);
                self.queue.clear();
                if self.unacked_received > 0 {
                    self.send_ack().await?;
                }
                self.framed.send(Apdu::u_frame(UFunction::StopDtCon)).await?;
                info!(peer = %self.peer, "Data transfer stopped");
            }
            Apci::U(UFunction::TestFrAct) => {
                self.framed.send(Apdu::u_frame(UFunction::TestFrCon)).await?;
            }
            Apci::U(function) => debug!(peer = %self.peer, ?function, "Ignoring U-frame"),
        }
        Ok(())
    }

    fn on_asdu(&mut self, asdu: Asdu) {
        let ca = self.context.settings.common_address;

        if !self.started {
            warn!(peer = %self.peer, type_id = asdu.type_id, "I-frame before STARTDT ignored");
            return;
        }
        if asdu.common_address != ca && asdu.common_address != GLOBAL_COMMON_ADDRESS {
            debug!(peer = %self.peer, common_address = asdu.common_address, "Unknown common address");
            self.push(asdu.mirror(cause::UNKNOWN_COMMON_ADDRESS, true));
            return;
        }

        match asdu.type_id {
            C_IC_NA_1 if asdu.cot.cause == cause::ACTIVATION => {
                let mut reply = asdu.mirror(cause::ACTIVATION_CON, false);
                reply.common_address = ca;
                self.push(reply.clone());

                let now = Utc::now();
                let mut sent = 0usize;
                for (point_type, points) in self.context.points.snapshot_by_type(ca) {
                    sent += points.len();
                    for data in monitoring_asdus(point_type, &points, cause::INTERROGATED, ca, now) {
                        self.push(data);
                    }
                }
                info!(peer = %self.peer, common_address = ca, points = sent, "General interrogation");

                self.push(Asdu {
                    cot: reply.cot.with_cause(cause::ACTIVATION_TERM),
                    ..reply
                });
            }
            C_CS_NA_1 if asdu.cot.cause == cause::ACTIVATION => {
                let master_time = decode_cp56(asdu.first_element());
                debug!(peer = %self.peer, ?master_time, "Clock synchronisation acknowledged");
                self.push(asdu.mirror(cause::ACTIVATION_CON, false));
            }
            C_IC_NA_1 | C_CS_NA_1 => {
                self.push(asdu.mirror(cause::UNKNOWN_CAUSE, true));
            }
            other => {
                debug!(peer = %self.peer, type_id = other, "Unsupported type identification");
                self.push(asdu.mirror(cause::UNKNOWN_TYPE, true));
            }
        }
    }

    fn on_transmission(&mut self, transmission: Transmission) {
        if !self.started {
            return;
        }
        let point = transmission.point;
        for asdu in monitoring_asdus(
            point.point_type,
            std::slice::from_ref(&point),
            transmission.cause,
            self.context.settings.common_address,
            Utc::now(),
        ) {
            self.push(asdu);
        }
    }

    fn acknowledge(&mut self, recv_seq: u16) -> Result<(), ProtocolError> {
        let outstanding = seq_distance(self.send_seq, self.acked_seq);
        let acked = seq_distance(recv_seq, self.acked_seq);
        if acked > outstanding {
            return Err(ProtocolError::InvalidAck(recv_seq));
        }
        for _ in 0..acked {
            self.in_flight.pop_front();
        }
        self.acked_seq = recv_seq;
        Ok(())
    }

    // =========================================================================
    // Send path
    // =========================================================================

    fn push(&mut self, asdu: Asdu) {
        if self.queue.len() >= QUEUE_LIMIT {
            self.queue.pop_front();
            warn!(peer = %self.peer, "Send queue full; oldest ASDU dropped");
        }
        self.queue.push_back(asdu);
    }

    async fn flush(&mut self) -> Iec104Result<()> {
        let window = usize::from(self.context.settings.k);
        while self.started && self.in_flight.len() < window {
            let Some(asdu) = self.queue.pop_front() else {
                break;
            };
            let apci = Apci::I {
                send_seq: self.send_seq,
                recv_seq: self.recv_seq,
            };
            self.framed.send(Apdu::i_frame(apci, asdu)).await?;
            self.in_flight.push_back(Instant::now());
            self.send_seq = next_seq(self.send_seq);
            self.unacked_received = 0;
            self.first_unacked_at = None;
        }
        Ok(())
    }

    async fn send_ack(&mut self) -> Iec104Result<()> {
        self.framed.send(Apdu::s_frame(self.recv_seq)).await?;
        self.unacked_received = 0;
        self.first_unacked_at = None;
        Ok(())
    }

    async fn check_timers(&mut self) -> Iec104Result<()> {
        let settings = &self.context.settings;
        let (t0, t1, t2, t3) = (settings.t0, settings.t1, settings.t2, settings.t3);

        if self.in_flight.front().is_some_and(|sent| sent.elapsed() >= t1) {
            return Err(ProtocolError::TimerExpired("t1").into());
        }
        if self.test_sent_at.is_some_and(|sent| sent.elapsed() >= t1) {
            return Err(ProtocolError::TimerExpired("t1").into());
        }
        if self.stopped_since.is_some_and(|since| since.elapsed() >= t0) {
            return Err(ProtocolError::TimerExpired("t0").into());
        }
        if self.first_unacked_at.is_some_and(|first| first.elapsed() >= t2) {
            self.send_ack().await?;
        }
        if self.test_sent_at.is_none() && self.last_received.elapsed() >= t3 {
            self.framed.send(Apdu::u_frame(UFunction::TestFrAct)).await?;
            self.test_sent_at = Some(Instant::now());
            debug!(peer = %self.peer, "Idle; TESTFR sent");
        }
        Ok(())
    }
}
