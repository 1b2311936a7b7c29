//! Monitor session - handshake and dispatch loop.
//!
//! # Handshake
//!
//! ```text
//! 1. open primary connection        → own address #1
//! 2. open secondary connection      → own address #2
//! 3. ListNames (primary)
//! 4. GetNameOwner / GetConnectionUnixProcessID per name (secondary)
//! 5. route Peer messages to the handler
//! 6. install the capture filter (primary)
//! 7. BecomeMonitor, else AddMatch("eavesdrop=true"), else AddMatch("")
//! ```
//!
//! Any failure closes whatever was opened and returns a [`SessionError`].
//!
//! # Dispatch
//!
//! [`MonitorSession::run`] blocks on the primary connection for at most one
//! dispatch interval at a time and re-checks the stop token after every
//! wait, so a stop request is honored within one interval.
//!
//! # Panic-Free Guarantees
//!
//! No `.unwrap()` or `.expect()`. The one deliberate process exit is the
//! out-of-memory path, which mirrors the bus library's own contract.

mod filter;

pub use filter::{CaptureFilter, Disposition, FilterParts};

use std::sync::Arc;

use busmon_core::{BusScope, Diagnostics};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::directory::{load_snapshot, NameDirectory};
use crate::error::SessionError;
use crate::procinfo;
use crate::sink::MonitorSink;
use crate::transport::{BusConnector, BusError, MonitorLink, CATCH_ALL_RULE, EAVESDROP_RULE};

/// Exit status used when protocol messages cannot be allocated.
pub const OUT_OF_MEMORY_EXIT_CODE: i32 = 100;

/// How the primary connection receives foreign traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// `BecomeMonitor` succeeded.
    Monitor,
    /// Fell back to an `eavesdrop=true` match rule.
    Eavesdrop,
    /// Fell back to a catch-all match rule.
    CatchAll,
}

/// An established monitor session, ready to run its dispatch loop.
pub struct MonitorSession {
    link: Box<dyn MonitorLink>,
    mode: MonitorMode,
    config: MonitorConfig,
    stop: CancellationToken,
    sink: Arc<dyn MonitorSink>,
}

impl MonitorSession {
    /// Runs the handshake against `scope`.
    ///
    /// `stop` is cancelled by the capture filter if the bus disconnects and
    /// by the owner to request a stop.
    pub fn establish(
        connector: &dyn BusConnector,
        scope: BusScope,
        config: &MonitorConfig,
        sink: Arc<dyn MonitorSink>,
        diagnostics: Arc<dyn Diagnostics>,
        stop: CancellationToken,
    ) -> Result<Self, SessionError> {
        let mut link = connector
            .open_monitor(scope)
            .map_err(|source| SessionError::Connect {
                role: "primary",
                source,
            })?;
        let primary_address = link.unique_name();

        let directory_link =
            connector
                .open_directory(scope)
                .map_err(|source| SessionError::Connect {
                    role: "secondary",
                    source,
                })?;

        info!(
            bus = %scope,
            primary = %primary_address,
            secondary = %directory_link.unique_name(),
            "Connected to bus"
        );

        let names = link
            .list_names(config.query_timeout)
            .map_err(SessionError::ListNames)?;

        let mut directory = NameDirectory::new(diagnostics.clone());
        let snapshot = load_snapshot(
            &mut directory,
            directory_link.as_ref(),
            &names,
            config.query_timeout,
            config.verbose_startup,
        );
        info!(
            names = snapshot.names,
            owners = snapshot.owners,
            pids = snapshot.pids,
            failed = snapshot.failed,
            "Loaded bus name snapshot"
        );
        if config.verbose_startup {
            for addr in directory.known_addresses() {
                diagnostics.debug(format_args!(
                    "  {addr}: names={:?} pid={}",
                    directory.names_for(addr),
                    directory.pid_for(addr)
                ));
            }
        }

        if config.resolve_executables && !procinfo::is_supported() {
            debug!("Executable paths are not available on this platform");
        }

        link.route_peer_messages();

        let mut filter = CaptureFilter::new(FilterParts {
            directory,
            link: directory_link,
            primary_address,
            sink: sink.clone(),
            diagnostics: diagnostics.clone(),
            query_timeout: config.query_timeout,
            resolve_executables: config.resolve_executables,
            stop: stop.clone(),
        });
        link.install_filter(Box::new(move |message| {
            filter.handle(message);
        }))
        .map_err(SessionError::FilterInstall)?;

        let mode = enter_monitor_mode(link.as_ref(), config, diagnostics.as_ref())?;
        info!(mode = ?mode, "Monitoring bus traffic");

        Ok(Self {
            link,
            mode,
            config: config.clone(),
            stop,
            sink,
        })
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    /// Runs the dispatch loop until the stop token is cancelled or the
    /// connection fails, then closes both connections and publishes the
    /// inactive state.
    pub fn run(self, active: &watch::Sender<bool>) {
        let Self {
            mut link,
            config,
            stop,
            sink,
            ..
        } = self;

        debug!(
            interval_ms = config.dispatch_interval.as_millis() as u64,
            "Dispatch loop started"
        );

        loop {
            if let Err(err) = link.read_write_dispatch(config.dispatch_interval) {
                warn!(error = %err, "Bus connection failed, stopping monitor");
                break;
            }
            if stop.is_cancelled() {
                debug!("Stop requested, leaving dispatch loop");
                break;
            }
        }

        // The capture filter owns the secondary connection
        drop(link);

        active.send_replace(false);
        sink.on_active_changed(false);
        info!("Monitor session stopped");
    }
}

/// Step 7 of the handshake, with its fallbacks.
fn enter_monitor_mode(
    link: &dyn MonitorLink,
    config: &MonitorConfig,
    diagnostics: &dyn Diagnostics,
) -> Result<MonitorMode, SessionError> {
    match link.become_monitor(config.query_timeout) {
        Ok(()) => return Ok(MonitorMode::Monitor),
        Err(BusError::OutOfMemory(what)) => abort_out_of_memory(diagnostics, what),
        Err(err) if err.is_unknown_interface() => diagnostics.warn(format_args!(
            "unable to enable new-style monitoring, your dbus-daemon is too old. \
             Falling back to eavesdropping."
        )),
        Err(err) => diagnostics.warn(format_args!(
            "unable to enable new-style monitoring: {err}. Falling back to eavesdropping."
        )),
    }

    if link.add_match(EAVESDROP_RULE).is_ok() {
        return Ok(MonitorMode::Eavesdrop);
    }

    match link.add_match(CATCH_ALL_RULE) {
        Ok(()) => Ok(MonitorMode::CatchAll),
        Err(err) => {
            diagnostics.warn(format_args!("falling back to eavesdropping failed: {err}"));
            Err(SessionError::MonitorModeUnavailable(err))
        }
    }
}

/// Reports a fatal allocation failure and exits the process.
pub fn abort_out_of_memory(diagnostics: &dyn Diagnostics, what: &str) -> ! {
    diagnostics.error(format_args!("out of memory: {what}"));
    std::process::exit(OUT_OF_MEMORY_EXIT_CODE)
}
