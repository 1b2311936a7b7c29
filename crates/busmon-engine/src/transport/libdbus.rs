//! libdbus-backed transport.
//!
//! Uses the blocking connection of the `dbus` crate. The primary connection
//! pops messages off its incoming queue and hands them to a catch-all match
//! that always keeps itself installed, so every message is consumed by the
//! capture handler and the library never sends an automatic reply.
//!
//! # Panic-Free Guarantees
//!
//! All bus name literals passed to the library are valid constants. Every
//! library error is mapped into [`BusError`].

use std::time::Duration;

use busmon_core::{BusScope, MessageHeader, MessageKind};
use dbus::blocking::Connection;
use dbus::channel::MatchingReceiver;
use dbus::message::{MatchRule, MessageType};
use dbus::strings::{Interface, Member};
use dbus::Message;
use tracing::debug;

use super::{
    BusConnector, BusError, DirectoryLink, InboundMessage, MessageBody, MessageHandler,
    MonitorLink, DBUS_INTERFACE, DBUS_PATH, DBUS_SERVICE, MONITORING_INTERFACE,
};

/// Opens libdbus connections to the session or system bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbusConnector;

impl DbusConnector {
    pub fn new() -> Self {
        Self
    }
}

impl BusConnector for DbusConnector {
    fn open_monitor(&self, scope: BusScope) -> Result<Box<dyn MonitorLink>, BusError> {
        let conn = connect(scope)?;
        debug!(bus = %scope, address = %conn.unique_name(), "Opened monitor connection");
        Ok(Box::new(DbusMonitorLink { conn }))
    }

    fn open_directory(&self, scope: BusScope) -> Result<Box<dyn DirectoryLink>, BusError> {
        let conn = connect(scope)?;
        debug!(bus = %scope, address = %conn.unique_name(), "Opened directory connection");
        Ok(Box::new(DbusDirectoryLink { conn }))
    }
}

fn connect(scope: BusScope) -> Result<Connection, BusError> {
    let conn = match scope {
        BusScope::Session => Connection::new_session(),
        BusScope::System => Connection::new_system(),
    };
    conn.map_err(BusError::from)
}

impl From<dbus::Error> for BusError {
    fn from(err: dbus::Error) -> Self {
        let message = err.message().unwrap_or_default().to_string();
        match err.name() {
            Some(name) => BusError::remote(name, message),
            None => BusError::Connection(message),
        }
    }
}

// ============================================================================
// Primary connection
// ============================================================================

struct DbusMonitorLink {
    conn: Connection,
}

impl MonitorLink for DbusMonitorLink {
    fn unique_name(&self) -> String {
        self.conn.unique_name().to_string()
    }

    fn list_names(&self, timeout: Duration) -> Result<Vec<String>, BusError> {
        let proxy = self.conn.with_proxy(DBUS_SERVICE, DBUS_PATH, timeout);
        let (names,): (Vec<String>,) = proxy.method_call(DBUS_INTERFACE, "ListNames", ())?;
        Ok(names)
    }

    fn route_peer_messages(&mut self) {
        // Peer calls are answered by libdbus only inside its own dispatch,
        // which this connection never runs: messages are popped off the
        // queue and handed straight to the match handlers.
        debug!("Peer messages are delivered as ordinary messages");
    }

    fn install_filter(&mut self, mut handler: MessageHandler) -> Result<(), BusError> {
        self.conn.start_receive(
            MatchRule::new(),
            Box::new(move |message: Message, _: &Connection| {
                handler(inbound_from_wire(message));
                true
            }),
        );
        Ok(())
    }

    fn become_monitor(&self, timeout: Duration) -> Result<(), BusError> {
        let call = bus_method_call(MONITORING_INTERFACE, "BecomeMonitor")?
            .append2(Vec::<String>::new(), 0u32);

        self.conn
            .channel()
            .send_with_reply_and_block(call, timeout)?;
        Ok(())
    }

    fn add_match(&self, rule: &str) -> Result<(), BusError> {
        self.conn.add_match_no_cb(rule)?;
        Ok(())
    }

    fn read_write_dispatch(&mut self, wait: Duration) -> Result<(), BusError> {
        self.conn.process(wait)?;
        Ok(())
    }
}

/// Builds a call to the bus daemon itself.
///
/// Names are validated up front; the library panics on invalid ones.
fn bus_method_call(interface: &str, member: &str) -> Result<Message, BusError> {
    let invalid = |reason: String| BusError::InvalidCall(format!("{interface}.{member}: {reason}"));
    let interface_name = Interface::new(interface).map_err(invalid)?;
    let member_name = Member::new(member).map_err(invalid)?;
    Message::new_method_call(DBUS_SERVICE, DBUS_PATH, interface_name, member_name)
        .map_err(invalid)
}

/// Copies the header out of `message` and keeps the message as the body.
fn inbound_from_wire(mut message: Message) -> InboundMessage {
    let kind = match message.msg_type() {
        MessageType::MethodCall => MessageKind::MethodCall,
        MessageType::MethodReturn => MessageKind::MethodReturn,
        MessageType::Error => MessageKind::Error,
        MessageType::Signal => MessageKind::Signal,
    };

    let mut header = MessageHeader::new(kind, message.get_serial().unwrap_or(0));
    header.sender = message.sender().map(|s| s.to_string());
    header.destination = message.destination().map(|d| d.to_string());
    header.path = message.path().map(|p| p.to_string());
    header.interface = message.interface().map(|i| i.to_string());
    header.member = message.member().map(|m| m.to_string());
    header.reply_serial = message.get_reply_serial();

    if kind == MessageKind::Error {
        header.error_name = message
            .as_result()
            .err()
            .and_then(|err| err.name().map(str::to_string));
    }

    InboundMessage {
        header,
        body: MessageBody::Wire(message),
    }
}

// ============================================================================
// Secondary connection
// ============================================================================

struct DbusDirectoryLink {
    conn: Connection,
}

impl DirectoryLink for DbusDirectoryLink {
    fn unique_name(&self) -> String {
        self.conn.unique_name().to_string()
    }

    fn name_owner(&self, name: &str, timeout: Duration) -> Result<String, BusError> {
        let proxy = self.conn.with_proxy(DBUS_SERVICE, DBUS_PATH, timeout);
        let (owner,): (String,) = proxy.method_call(DBUS_INTERFACE, "GetNameOwner", (name,))?;
        Ok(owner)
    }

    fn unix_process_id(&self, name: &str, timeout: Duration) -> Result<u32, BusError> {
        let proxy = self.conn.with_proxy(DBUS_SERVICE, DBUS_PATH, timeout);
        let (pid,): (u32,) =
            proxy.method_call(DBUS_INTERFACE, "GetConnectionUnixProcessID", (name,))?;
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_from_method_call() {
        let message = Message::new_method_call(
            "org.example.Svc",
            "/org/example",
            "org.example.Iface",
            "Ping",
        )
        .expect("valid call")
        .append1("payload");

        let inbound = inbound_from_wire(message);
        assert_eq!(inbound.header.kind, MessageKind::MethodCall);
        assert_eq!(
            inbound.header.destination.as_deref(),
            Some("org.example.Svc")
        );
        assert_eq!(inbound.header.path.as_deref(), Some("/org/example"));
        assert_eq!(
            inbound.header.interface.as_deref(),
            Some("org.example.Iface")
        );
        assert_eq!(inbound.header.member.as_deref(), Some("Ping"));
        assert_eq!(inbound.header.reply_serial, None);
        assert!(matches!(inbound.body, MessageBody::Wire(_)));
    }

    #[test]
    fn test_header_from_signal() {
        let message = Message::new_signal("/org/freedesktop/DBus", DBUS_INTERFACE, "NameAcquired")
            .expect("valid signal")
            .append1("org.example.Name");

        let inbound = inbound_from_wire(message);
        assert!(inbound.header.is_signal(DBUS_INTERFACE, "NameAcquired"));
        assert_eq!(inbound.header.error_name, None);
    }

    #[test]
    fn test_bus_method_call() {
        let call = bus_method_call(MONITORING_INTERFACE, "BecomeMonitor").unwrap();
        assert_eq!(call.destination().unwrap().to_string(), DBUS_SERVICE);
        assert_eq!(call.interface().unwrap().to_string(), MONITORING_INTERFACE);

        let err = bus_method_call("not an interface", "BecomeMonitor").unwrap_err();
        assert!(matches!(err, BusError::InvalidCall(_)), "{err:?}");
        assert!(err.to_string().contains("not an interface"));
    }

    #[test]
    fn test_dbus_error_mapping() {
        let named = dbus::Error::new_custom("org.example.Error.Failed", "boom");
        assert_eq!(
            BusError::from(named),
            BusError::remote("org.example.Error.Failed", "boom")
        );
    }
}
