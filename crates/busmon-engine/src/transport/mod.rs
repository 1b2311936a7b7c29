//! Bus transport seams.
//!
//! The monitor session talks to the bus through three traits:
//!
//! - [`BusConnector`] opens connections for a [`BusScope`].
//! - [`MonitorLink`] is the primary connection: it enumerates names, turns
//!   itself into a monitor, and dispatches every observed message to a
//!   boxed handler.
//! - [`DirectoryLink`] is the secondary connection, used only for blocking
//!   name-owner and pid queries.
//!
//! [`libdbus`] backs them with the system bus library. Tests substitute in-memory fakes.

pub mod libdbus;

use std::time::Duration;

use busmon_core::{BusScope, MessageHeader, Value};
use busmon_wire::ArgumentDecoder;
use thiserror::Error;

pub use self::libdbus::DbusConnector;

/// Well-known name of the bus daemon.
pub const DBUS_SERVICE: &str = "org.freedesktop.DBus";

/// Object path of the bus daemon.
pub const DBUS_PATH: &str = "/org/freedesktop/DBus";

/// Main interface of the bus daemon.
pub const DBUS_INTERFACE: &str = "org.freedesktop.DBus";

/// Interface carrying `BecomeMonitor`.
pub const MONITORING_INTERFACE: &str = "org.freedesktop.DBus.Monitoring";

/// Interface of messages synthesized locally by the bus library.
pub const LOCAL_INTERFACE: &str = "org.freedesktop.DBus.Local";

/// Error returned by daemons that predate the monitoring interface.
pub const UNKNOWN_INTERFACE_ERROR: &str = "org.freedesktop.DBus.Error.UnknownInterface";

/// Match rule of the eavesdropping fallback.
pub const EAVESDROP_RULE: &str = "eavesdrop=true";

/// Catch-all match rule of the last fallback.
pub const CATCH_ALL_RULE: &str = "";

// ============================================================================
// Errors
// ============================================================================

/// Failure reported by the bus or the bus library.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Error reply carrying a D-Bus error name.
    #[error("{name}: {message}")]
    Remote { name: String, message: String },

    /// Local failure without an error name (connect, I/O, disconnect).
    #[error("bus connection error: {0}")]
    Connection(String),

    /// A method call could not be built from the given names.
    #[error("invalid method call {0}")]
    InvalidCall(String),

    /// The bus library could not allocate a protocol message.
    #[error("out of memory while building {0}")]
    OutOfMemory(&'static str),
}

impl BusError {
    pub fn remote(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            name: name.into(),
            message: message.into(),
        }
    }

    /// D-Bus error name, if the failure came from an error reply.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Remote { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns true if the daemon does not know the called interface.
    pub fn is_unknown_interface(&self) -> bool {
        self.name() == Some(UNKNOWN_INTERFACE_ERROR)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Argument payload of an inbound message, decoded on demand.
pub enum MessageBody {
    /// A message straight off the wire.
    Wire(dbus::Message),
    /// A payload that is already decoded.
    Decoded(Option<Value>),
}

impl MessageBody {
    pub fn decode(&self, decoder: &ArgumentDecoder) -> Option<Value> {
        match self {
            Self::Wire(message) => busmon_wire::decode_message(decoder, message),
            Self::Decoded(value) => value.clone(),
        }
    }
}

impl std::fmt::Debug for MessageBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wire(_) => f.write_str("Wire(..)"),
            Self::Decoded(value) => f.debug_tuple("Decoded").field(value).finish(),
        }
    }
}

/// One message delivered to the capture handler.
#[derive(Debug)]
pub struct InboundMessage {
    pub header: MessageHeader,
    pub body: MessageBody,
}

impl InboundMessage {
    /// Builds a message whose arguments are already known.
    pub fn decoded(header: MessageHeader, arguments: Option<Value>) -> Self {
        Self {
            header,
            body: MessageBody::Decoded(arguments),
        }
    }
}

/// Capture handler installed on the primary connection.
pub type MessageHandler = Box<dyn FnMut(InboundMessage) + Send>;

// ============================================================================
// Links
// ============================================================================

/// Primary connection of a monitor session.
pub trait MonitorLink: Send {
    /// Unique address assigned by the bus.
    fn unique_name(&self) -> String;

    /// All names currently registered on the bus.
    fn list_names(&self, timeout: Duration) -> Result<Vec<String>, BusError>;

    /// Delivers `org.freedesktop.DBus.Peer` calls to the handler instead of
    /// letting the bus library answer them.
    fn route_peer_messages(&mut self);

    /// Installs the handler that receives every inbound message. The handler
    /// consumes each message; nothing is ever replied to automatically.
    fn install_filter(&mut self, handler: MessageHandler) -> Result<(), BusError>;

    /// Calls `BecomeMonitor` with no match rules and no flags.
    fn become_monitor(&self, timeout: Duration) -> Result<(), BusError>;

    /// Adds a match rule on the bus for this connection.
    fn add_match(&self, rule: &str) -> Result<(), BusError>;

    /// Waits up to `wait` for traffic and dispatches whatever arrived.
    ///
    /// Returns an error once the connection is closed.
    fn read_write_dispatch(&mut self, wait: Duration) -> Result<(), BusError>;
}

/// Secondary connection of a monitor session.
pub trait DirectoryLink: Send {
    /// Unique address assigned by the bus.
    fn unique_name(&self) -> String;

    /// `GetNameOwner(name)`.
    fn name_owner(&self, name: &str, timeout: Duration) -> Result<String, BusError>;

    /// `GetConnectionUnixProcessID(name)`.
    fn unix_process_id(&self, name: &str, timeout: Duration) -> Result<u32, BusError>;
}

/// Opens connections to a bus.
pub trait BusConnector: Send + Sync {
    fn open_monitor(&self, scope: BusScope) -> Result<Box<dyn MonitorLink>, BusError>;

    fn open_directory(&self, scope: BusScope) -> Result<Box<dyn DirectoryLink>, BusError>;
}
