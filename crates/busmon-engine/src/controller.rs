//! Session controller - start / stop / is-active façade.
//!
//! The controller runs the handshake on the caller's thread and, on
//! success, moves the session onto a dedicated dispatch thread. Only the
//! active flag is shared across threads; it is published through a
//! `tokio::sync::watch` channel so async consumers can await changes.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use busmon_core::{BusScope, TracingDiagnostics};
//! use busmon_engine::config::MonitorConfig;
//! use busmon_engine::transport::DbusConnector;
//! use busmon_engine::SessionController;
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let mut controller = SessionController::new(
//!     Arc::new(DbusConnector::new()),
//!     MonitorConfig::default(),
//!     Arc::new(tx),
//!     TracingDiagnostics::shared("busmon"),
//! );
//! if controller.start(BusScope::Session) {
//!     // consume rx ...
//!     controller.request_stop();
//! }
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use busmon_core::{BusScope, Diagnostics};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::SessionError;
use crate::session::{MonitorMode, MonitorSession};
use crate::sink::MonitorSink;
use crate::transport::BusConnector;

/// Name of the dispatch thread.
pub const DISPATCH_THREAD_NAME: &str = "busmon-dispatch";

/// Nice value applied to the dispatch thread when running at low priority.
const LOW_PRIORITY_NICE: i32 = 10;

/// Poll interval while waiting for the dispatch thread to exit.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Worker {
    stop: CancellationToken,
    thread: JoinHandle<()>,
    mode: MonitorMode,
}

/// Owns at most one running monitor session.
pub struct SessionController {
    connector: Arc<dyn BusConnector>,
    config: MonitorConfig,
    sink: Arc<dyn MonitorSink>,
    diagnostics: Arc<dyn Diagnostics>,
    active: Arc<watch::Sender<bool>>,
    worker: Option<Worker>,
}

impl SessionController {
    pub fn new(
        connector: Arc<dyn BusConnector>,
        config: MonitorConfig,
        sink: Arc<dyn MonitorSink>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        let (active, _) = watch::channel(false);
        Self {
            connector,
            config,
            sink,
            diagnostics,
            active: Arc::new(active),
            worker: None,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Starts monitoring `scope`. Returns false if the session could not be
    /// started; the reason is reported as a warning.
    pub fn start(&mut self, scope: BusScope) -> bool {
        match self.try_start(scope) {
            Ok(()) => true,
            Err(err) => {
                self.diagnostics
                    .warn(format_args!("failed to start monitor on {scope} bus: {err}"));
                false
            }
        }
    }

    /// Starts monitoring `scope`, reporting why it failed.
    pub fn try_start(&mut self, scope: BusScope) -> Result<(), SessionError> {
        self.reap_finished();
        if self.worker.is_some() || self.is_active() {
            debug!("Monitor already running");
            return Err(SessionError::AlreadyActive);
        }

        let stop = CancellationToken::new();
        let session = MonitorSession::establish(
            self.connector.as_ref(),
            scope,
            &self.config,
            self.sink.clone(),
            self.diagnostics.clone(),
            stop.clone(),
        )?;
        let mode = session.mode();

        self.set_active(true);

        let active = Arc::clone(&self.active);
        let low_priority = self.config.low_priority;
        let spawned = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || {
                if low_priority {
                    lower_thread_priority();
                }
                session.run(&active);
            });

        match spawned {
            Ok(thread) => {
                info!(bus = %scope, mode = ?mode, "Monitor session started");
                self.worker = Some(Worker { stop, thread, mode });
                Ok(())
            }
            Err(err) => {
                self.set_active(false);
                Err(SessionError::Spawn(err))
            }
        }
    }

    /// Asks the dispatch thread to stop and waits for it up to the
    /// configured grace period.
    pub fn request_stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.stop.cancel();

        let deadline = Instant::now() + self.config.stop_grace;
        while !worker.thread.is_finished() && Instant::now() < deadline {
            thread::sleep(STOP_POLL_INTERVAL);
        }

        if worker.thread.is_finished() {
            if worker.thread.join().is_err() {
                warn!("Dispatch thread panicked");
            }
        } else {
            warn!(
                grace_ms = self.config.stop_grace.as_millis() as u64,
                "Dispatch thread still running after stop request"
            );
        }
    }

    /// Returns true while a dispatch loop is running.
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Subscribes to changes of the active flag.
    pub fn watch_active(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    /// Monitor mode of the running session.
    pub fn mode(&self) -> Option<MonitorMode> {
        self.worker.as_ref().map(|w| w.mode)
    }

    fn set_active(&self, active: bool) {
        self.active.send_replace(active);
        self.sink.on_active_changed(active);
    }

    /// Joins a dispatch thread that left its loop on its own.
    ///
    /// The thread clears the active flag as its last step, so once the flag
    /// is down the join returns promptly.
    fn reap_finished(&mut self) {
        let finished = self
            .worker
            .as_ref()
            .is_some_and(|w| w.thread.is_finished() || !self.is_active());
        if finished {
            if let Some(worker) = self.worker.take() {
                let _ = worker.thread.join();
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.request_stop();
    }
}

#[cfg(target_os = "linux")]
fn lower_thread_priority() {
    // SAFETY: gettid has no preconditions and returns the caller's tid.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    // SAFETY: setpriority on our own tid only changes this thread's nice value.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid as libc::id_t, LOW_PRIORITY_NICE) };
    if rc != 0 {
        debug!(tid, "Could not lower dispatch thread priority");
    }
}

#[cfg(not(target_os = "linux"))]
fn lower_thread_priority() {
    debug!(
        nice = LOW_PRIORITY_NICE,
        "Thread priority unchanged on this platform"
    );
}
