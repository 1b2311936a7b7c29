//! Event delivery to the consumer.
//!
//! The dispatch thread hands every assembled message to a [`MonitorSink`].
//! The stock sink is an unbounded tokio channel of [`MonitorEvent`]s, which
//! never blocks the dispatch thread and keeps bus order.

use busmon_core::MonitoredMessage;
use tokio::sync::mpsc;
use tracing::trace;

/// Everything a session reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// A message observed on the bus.
    Message(Box<MonitoredMessage>),

    /// The bus closed the monitor connection.
    Disconnected,

    /// The session became active or inactive.
    ActiveChanged(bool),
}

/// Receiver of session events.
///
/// Called from the dispatch thread, in bus order. Implementations must not
/// block for long.
pub trait MonitorSink: Send + Sync {
    fn on_message(&self, message: MonitoredMessage);

    fn on_disconnected(&self);

    fn on_active_changed(&self, active: bool);
}

impl MonitorSink for mpsc::UnboundedSender<MonitorEvent> {
    fn on_message(&self, message: MonitoredMessage) {
        if self.send(MonitorEvent::Message(Box::new(message))).is_err() {
            trace!("Event receiver dropped, message discarded");
        }
    }

    fn on_disconnected(&self) {
        let _ = self.send(MonitorEvent::Disconnected);
    }

    fn on_active_changed(&self, active: bool) {
        let _ = self.send(MonitorEvent::ActiveChanged(active));
    }
}
