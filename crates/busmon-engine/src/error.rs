//! Session error types.

use thiserror::Error;

use crate::transport::BusError;

/// Reasons a monitor session cannot start.
///
/// Every variant leaves nothing running: connections opened before the
/// failure are closed when the error is returned.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another session of this controller is still running
    #[error("a monitor session is already active")]
    AlreadyActive,

    /// A bus connection could not be opened
    #[error("failed to open {role} bus connection: {source}")]
    Connect {
        role: &'static str,
        #[source]
        source: BusError,
    },

    /// `ListNames` failed
    #[error("failed to query bus names: {0}")]
    ListNames(#[source] BusError),

    /// The capture handler could not be installed
    #[error("failed to install capture filter: {0}")]
    FilterInstall(#[source] BusError),

    /// `BecomeMonitor` and both eavesdropping fallbacks failed
    #[error("unable to enter monitor mode: {0}")]
    MonitorModeUnavailable(#[source] BusError),

    /// The dispatch thread could not be spawned
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[source] std::io::Error),
}
