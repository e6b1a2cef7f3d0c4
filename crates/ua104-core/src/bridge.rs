// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Single-threaded async worker for synchronous callers.
//!
//! The OPC UA client objects are only ever touched from one thread. The
//! [`AsyncBridge`] owns that thread: a current-thread tokio runtime consuming
//! an unbounded job channel. Synchronous callers submit a future with
//! [`AsyncBridge::run_and_wait`] and block, with a bound, until its output is
//! available.
//!
//! # Architecture
//!
//! ```text
//!  caller thread A ─┐                       ┌────────── bridge thread ──────────┐
//!  caller thread B ─┼── jobs (mpsc) ───────►│ select { shutdown, jobs.recv() }  │
//!  caller thread C ─┘                       │        └─► tokio::spawn(job)      │
//!        ▲                                  └───────────────────┬───────────────┘
//!        └────────── result (sync_channel, recv_timeout) ───────┘
//! ```
//!
//! A caller that gives up after its timeout fires an abort signal into the
//! job, which drops the in-flight future at its next await point.

use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Default bound for joining the bridge thread on stop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound for one bridged operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// BridgeConfig
// =============================================================================

/// Settings for an [`AsyncBridge`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Name given to the background thread.
    pub thread_name: String,
    /// How long [`AsyncBridge::stop`] waits for the thread to exit.
    pub stop_timeout: Duration,
    /// Timeout used by [`AsyncBridge::run`].
    pub operation_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            thread_name: "ua104-bridge".to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    /// Sets the operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

// =============================================================================
// AsyncBridge
// =============================================================================

struct Running {
    jobs: mpsc::UnboundedSender<Job>,
    shutdown: oneshot::Sender<()>,
    handle: Handle,
    thread: JoinHandle<()>,
    thread_id: ThreadId,
}

struct Inner {
    config: BridgeConfig,
    running: Mutex<Option<Running>>,
}

/// Handle to the bridge thread.
///
/// Cloning is cheap; all clones drive the same thread. The thread is stopped
/// when [`stop`](Self::stop) is called or the last clone is dropped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ua104_core::bridge::AsyncBridge;
///
/// let bridge = AsyncBridge::new();
/// bridge.start().unwrap();
/// let answer = bridge.run_and_wait(async { 6 * 7 }, Duration::from_secs(1)).unwrap();
/// assert_eq!(answer, 42);
/// bridge.stop();
/// ```
#[derive(Clone)]
pub struct AsyncBridge {
    inner: Arc<Inner>,
}

impl Default for AsyncBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AsyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBridge")
            .field("thread_name", &self.inner.config.thread_name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl AsyncBridge {
    /// Creates a stopped bridge with default settings.
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Creates a stopped bridge.
    pub fn with_config(config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                running: Mutex::new(None),
            }),
        }
    }

    /// Returns the bridge settings.
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Launches the background thread and its event loop.
    ///
    /// Calling `start` on a running bridge does nothing.
    pub fn start(&self) -> BridgeResult<()> {
        let mut guard = self.inner.running.lock();
        if let Some(running) = guard.as_ref() {
            if !running.thread.is_finished() {
                return Ok(());
            }
        }

        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<Job>();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<Handle, String>>(1);

        let thread = thread::Builder::new()
            .name(self.inner.config.thread_name.clone())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(runtime.handle().clone()));

                runtime.block_on(async move {
                    loop {
                        tokio::select! {
                            _ = &mut shutdown_rx => break,
                            job = job_rx.recv() => match job {
                                Some(job) => {
                                    tokio::spawn(job);
                                }
                                None => break,
                            },
                        }
                    }
                });
                runtime.shutdown_timeout(Duration::from_millis(500));
                debug!("Async bridge loop exited");
            })
            .map_err(|e| BridgeError::spawn(e.to_string()))?;

        let handle = match ready_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(BridgeError::spawn(e));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(BridgeError::spawn("bridge thread exited during startup"));
            }
        };

        let thread_id = thread.thread().id();
        *guard = Some(Running {
            jobs: job_tx,
            shutdown: shutdown_tx,
            handle,
            thread,
            thread_id,
        });

        info!(thread = %self.inner.config.thread_name, "Async bridge started");
        Ok(())
    }

    /// Requests loop termination and joins the thread within the configured
    /// stop timeout.
    ///
    /// Returns `false` if the thread did not exit in time; a warning is
    /// logged in that case. Stopping a stopped bridge returns `true`.
    pub fn stop(&self) -> bool {
        self.inner.stop()
    }

    /// Returns `true` if the loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .as_ref()
            .map(|r| !r.thread.is_finished())
            .unwrap_or(false)
    }

    /// Returns `true` if called from the bridge thread.
    pub fn is_bridge_thread(&self) -> bool {
        self.inner
            .running
            .lock()
            .as_ref()
            .map(|r| r.thread_id == thread::current().id())
            .unwrap_or(false)
    }

    /// Returns a handle to the bridge runtime, if running.
    pub fn handle(&self) -> Option<Handle> {
        self.inner.running.lock().as_ref().map(|r| r.handle.clone())
    }

    /// Schedules `operation` on the loop and blocks until it completes or
    /// `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NotRunning`] if the loop is not alive
    /// - [`BridgeError::CalledFromBridgeThread`] if called from the loop itself
    /// - [`BridgeError::Timeout`] if the bound is exceeded; the operation is
    ///   aborted at its next await point
    /// - [`BridgeError::OperationAborted`] if the task ended without output
    pub fn run_and_wait<F>(&self, operation: F, timeout: Duration) -> BridgeResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let jobs = {
            let guard = self.inner.running.lock();
            let running = guard.as_ref().ok_or(BridgeError::NotRunning)?;
            if running.thread_id == thread::current().id() {
                return Err(BridgeError::CalledFromBridgeThread);
            }
            if running.thread.is_finished() {
                return Err(BridgeError::NotRunning);
            }
            running.jobs.clone()
        };

        let (result_tx, result_rx) = std_mpsc::sync_channel(1);
        let (abort_tx, abort_rx) = oneshot::channel::<()>();

        let job: Job = Box::pin(async move {
            tokio::select! {
                output = operation => {
                    let _ = result_tx.send(output);
                }
                _ = abort_rx => {}
            }
        });
        jobs.send(job).map_err(|_| BridgeError::NotRunning)?;

        match result_rx.recv_timeout(timeout) {
            Ok(output) => Ok(output),
            Err(RecvTimeoutError::Timeout) => {
                let _ = abort_tx.send(());
                warn!(timeout_ms = timeout.as_millis() as u64, "Bridged operation timed out");
                Err(BridgeError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                if self.is_running() {
                    Err(BridgeError::OperationAborted)
                } else {
                    Err(BridgeError::NotRunning)
                }
            }
        }
    }

    /// Like [`run_and_wait`](Self::run_and_wait) with the configured
    /// operation timeout.
    pub fn run<F>(&self, operation: F) -> BridgeResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.run_and_wait(operation, self.inner.config.operation_timeout)
    }

    /// Schedules a fire-and-forget task on the loop.
    pub fn spawn<F>(&self, task: F) -> BridgeResult<tokio::task::JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.inner.running.lock();
        let running = guard.as_ref().ok_or(BridgeError::NotRunning)?;
        if running.thread.is_finished() {
            return Err(BridgeError::NotRunning);
        }
        Ok(running.handle.spawn(task))
    }
}

impl Inner {
    fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return true;
        };

        let _ = running.shutdown.send(());
        drop(running.jobs);

        if running.thread_id == thread::current().id() {
            warn!("Async bridge stop requested from its own thread; not joining");
            return false;
        }

        let timeout = self.config.stop_timeout;
        let deadline = Instant::now() + timeout;
        while !running.thread.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Async bridge thread did not exit in time"
                );
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }

        if running.thread.join().is_err() {
            warn!("Async bridge thread panicked");
        }
        info!("Async bridge stopped");
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.running.lock().is_some() {
            self.stop();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
