//! Monitored message model.
//!
//! A [`MonitoredMessage`] is the immutable record the engine emits for every
//! observed bus message: header metadata, the resolved identity of both
//! peers, and the decoded argument payload.
//!
//! Kind-specific header fields live in [`Routing`], so a message can only
//! carry the fields its kind implies.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Value;

// ============================================================================
// Message Kind
// ============================================================================

/// The four D-Bus message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    MethodCall,
    MethodReturn,
    Error,
    Signal,
}

impl MessageKind {
    /// Human-readable label, as shown by monitoring tools.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MethodCall => "method call",
            Self::MethodReturn => "method return",
            Self::Error => "error",
            Self::Signal => "signal",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Header
// ============================================================================

/// Raw header fields as read off the wire.
///
/// Every field except `kind` and `serial` is optional in the protocol; the
/// header is kept loose here and tightened into a [`Routing`] when the
/// message is assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub kind: MessageKind,
    pub serial: u32,
    pub sender: Option<String>,
    pub destination: Option<String>,
    pub path: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
    pub reply_serial: Option<u32>,
    pub error_name: Option<String>,
}

impl MessageHeader {
    /// Creates a header with only the kind and serial set.
    pub fn new(kind: MessageKind, serial: u32) -> Self {
        Self {
            kind,
            serial,
            sender: None,
            destination: None,
            path: None,
            interface: None,
            member: None,
            reply_serial: None,
            error_name: None,
        }
    }

    /// Returns true if this is a signal with the given interface and member.
    pub fn is_signal(&self, interface: &str, member: &str) -> bool {
        self.kind == MessageKind::Signal && self.is_member_of(interface, member)
    }

    /// Returns true if this is a method call with the given interface and member.
    pub fn is_method_call(&self, interface: &str, member: &str) -> bool {
        self.kind == MessageKind::MethodCall && self.is_member_of(interface, member)
    }

    fn is_member_of(&self, interface: &str, member: &str) -> bool {
        self.interface.as_deref() == Some(interface) && self.member.as_deref() == Some(member)
    }

    /// Builds the kind-specific routing, dropping fields the kind does not
    /// carry. Missing required fields become empty strings or serial 0.
    pub fn routing(&self) -> Routing {
        let text = |field: &Option<String>| field.clone().unwrap_or_default();
        match self.kind {
            MessageKind::MethodCall => Routing::MethodCall {
                path: text(&self.path),
                interface: self.interface.clone(),
                member: text(&self.member),
            },
            MessageKind::Signal => Routing::Signal {
                path: text(&self.path),
                interface: text(&self.interface),
                member: text(&self.member),
            },
            MessageKind::MethodReturn => Routing::MethodReturn {
                reply_serial: self.reply_serial.unwrap_or(0),
            },
            MessageKind::Error => Routing::Error {
                reply_serial: self.reply_serial.unwrap_or(0),
                error_name: text(&self.error_name),
            },
        }
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Kind-specific addressing of a message.
///
/// Method calls may omit the interface on the wire; signals always carry one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Routing {
    MethodCall {
        path: String,
        interface: Option<String>,
        member: String,
    },
    Signal {
        path: String,
        interface: String,
        member: String,
    },
    MethodReturn {
        reply_serial: u32,
    },
    Error {
        reply_serial: u32,
        error_name: String,
    },
}

impl Routing {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::MethodCall { .. } => MessageKind::MethodCall,
            Self::Signal { .. } => MessageKind::Signal,
            Self::MethodReturn { .. } => MessageKind::MethodReturn,
            Self::Error { .. } => MessageKind::Error,
        }
    }
}

// ============================================================================
// Peer Identity
// ============================================================================

/// Resolved identity of one end of a message.
///
/// Resolution is best-effort: an unknown address is empty, an unknown pid is
/// `0`, an unknown executable is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeerIdentity {
    /// Numeric connection address (e.g. `:1.42`).
    pub address: String,

    /// Bus names owned by the address, in acquisition order.
    pub names: Vec<String>,

    /// Owning process id, `0` if unresolved.
    pub pid: u32,

    /// Executable path of the owning process, empty if unresolved.
    pub exe: String,
}

impl PeerIdentity {
    /// Identity that carries only an address.
    pub fn from_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Returns true if nothing about this peer is known.
    pub fn is_unknown(&self) -> bool {
        self.address.is_empty()
    }

    /// Best display label: the first well-known name, else the address.
    pub fn label(&self) -> &str {
        self.names
            .first()
            .map(String::as_str)
            .unwrap_or(self.address.as_str())
    }
}

// ============================================================================
// Monitored Message
// ============================================================================

/// One observed bus message, fully resolved and decoded.
///
/// Records are built once by the engine and handed to the consumer; the
/// engine never touches them again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredMessage {
    /// Capture time.
    pub timestamp: DateTime<Utc>,

    /// Sender-assigned serial (unique per sending connection).
    pub serial: u32,

    /// Kind-specific addressing; also determines the message kind.
    pub routing: Routing,

    pub sender: PeerIdentity,

    pub destination: PeerIdentity,

    /// Decoded arguments; `None` if the message carries no arguments.
    pub arguments: Option<Value>,
}

impl MonitoredMessage {
    pub fn kind(&self) -> MessageKind {
        self.routing.kind()
    }

    /// Object path, for method calls and signals.
    pub fn path(&self) -> Option<&str> {
        match &self.routing {
            Routing::MethodCall { path, .. } | Routing::Signal { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Interface, for method calls (if present) and signals.
    pub fn interface(&self) -> Option<&str> {
        match &self.routing {
            Routing::MethodCall { interface, .. } => interface.as_deref(),
            Routing::Signal { interface, .. } => Some(interface),
            _ => None,
        }
    }

    /// Member name, for method calls and signals.
    pub fn member(&self) -> Option<&str> {
        match &self.routing {
            Routing::MethodCall { member, .. } | Routing::Signal { member, .. } => Some(member),
            _ => None,
        }
    }

    /// Serial of the call this message answers, for returns and errors.
    pub fn reply_serial(&self) -> Option<u32> {
        match &self.routing {
            Routing::MethodReturn { reply_serial } | Routing::Error { reply_serial, .. } => {
                Some(*reply_serial)
            }
            _ => None,
        }
    }

    /// Error name, for errors only.
    pub fn error_name(&self) -> Option<&str> {
        match &self.routing {
            Routing::Error { error_name, .. } => Some(error_name),
            _ => None,
        }
    }

    /// Returns true if this message answers `call`.
    ///
    /// Serials are only unique per sending connection, so the reply's
    /// destination must also be the call's sender.
    pub fn answers(&self, call: &MonitoredMessage) -> bool {
        call.kind() == MessageKind::MethodCall
            && self.reply_serial() == Some(call.serial)
            && self.destination.address == call.sender.address
    }
}

impl fmt::Display for MonitoredMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} serial={} {} -> {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.kind(),
            self.serial,
            self.sender.label(),
            self.destination.label(),
        )?;
        match &self.routing {
            Routing::MethodCall {
                path,
                interface,
                member,
            } => {
                write!(f, " path={path}")?;
                if let Some(interface) = interface {
                    write!(f, " interface={interface}")?;
                }
                write!(f, " member={member}")?;
            }
            Routing::Signal {
                path,
                interface,
                member,
            } => write!(f, " path={path} interface={interface} member={member}")?,
            Routing::MethodReturn { reply_serial } => write!(f, " reply_serial={reply_serial}")?,
            Routing::Error {
                reply_serial,
                error_name,
            } => write!(f, " error_name={error_name} reply_serial={reply_serial}")?,
        }
        Ok(())
    }
}
