//! Capture filter.
//!
//! Runs on the dispatch thread for every message the primary connection
//! receives. It keeps the name directory current, resolves both peers,
//! decodes the payload and emits the assembled message, except for traffic
//! to or from the session's own connections.
//!
//! Directory updates triggered by a message are applied before that
//! message's own peers are resolved.

use std::sync::Arc;
use std::time::Duration;

use busmon_core::{is_numeric_address, Diagnostics, MessageHeader, MonitoredMessage, PeerIdentity};
use busmon_wire::ArgumentDecoder;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::directory::NameDirectory;
use crate::procinfo;
use crate::sink::MonitorSink;
use crate::transport::{
    DirectoryLink, InboundMessage, MessageBody, DBUS_INTERFACE, LOCAL_INTERFACE,
};

/// What the filter did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handed to the sink.
    Emitted,
    /// Traffic of this session's own connections; dropped.
    Suppressed,
    /// The bus closed the connection; the session is stopping.
    Disconnected,
}

/// Per-message processing state owned by the primary connection's handler.
pub struct CaptureFilter {
    directory: NameDirectory,
    link: Box<dyn DirectoryLink>,
    own_addresses: [String; 2],
    sink: Arc<dyn MonitorSink>,
    decoder: ArgumentDecoder,
    diagnostics: Arc<dyn Diagnostics>,
    query_timeout: Duration,
    resolve_executables: bool,
    stop: CancellationToken,
}

/// Construction parameters of a [`CaptureFilter`].
pub struct FilterParts {
    pub directory: NameDirectory,
    pub link: Box<dyn DirectoryLink>,
    pub primary_address: String,
    pub sink: Arc<dyn MonitorSink>,
    pub diagnostics: Arc<dyn Diagnostics>,
    pub query_timeout: Duration,
    pub resolve_executables: bool,
    pub stop: CancellationToken,
}

impl CaptureFilter {
    pub fn new(parts: FilterParts) -> Self {
        let secondary_address = parts.link.unique_name();
        Self {
            directory: parts.directory,
            own_addresses: [parts.primary_address, secondary_address],
            link: parts.link,
            sink: parts.sink,
            decoder: ArgumentDecoder::new(parts.diagnostics.clone()),
            diagnostics: parts.diagnostics,
            query_timeout: parts.query_timeout,
            resolve_executables: parts.resolve_executables,
            stop: parts.stop,
        }
    }

    pub fn directory(&self) -> &NameDirectory {
        &self.directory
    }

    /// Processes one inbound message.
    pub fn handle(&mut self, message: InboundMessage) -> Disposition {
        let InboundMessage { header, body } = message;

        if header.is_signal(LOCAL_INTERFACE, "Disconnected") {
            self.diagnostics
                .warn(format_args!("bus connection closed by the bus"));
            self.sink.on_disconnected();
            self.stop.cancel();
            return Disposition::Disconnected;
        }

        self.track_membership(&header, &body);

        let sender = self.numeric_address(header.sender.as_deref());
        let destination = self.numeric_address(header.destination.as_deref());

        if self.is_own(&sender) || self.is_own(&destination) {
            return Disposition::Suppressed;
        }

        let message = MonitoredMessage {
            timestamp: Utc::now(),
            serial: header.serial,
            routing: header.routing(),
            sender: self.identity(&sender),
            destination: self.identity(&destination),
            arguments: body.decode(&self.decoder),
        };
        self.sink.on_message(message);
        Disposition::Emitted
    }

    /// Applies the directory side effects of bus daemon traffic.
    fn track_membership(&mut self, header: &MessageHeader, body: &MessageBody) {
        if header.is_method_call(DBUS_INTERFACE, "Hello") {
            self.record_new_client(header.sender.as_deref().unwrap_or_default());
        }

        if header.is_signal(DBUS_INTERFACE, "NameAcquired") {
            if let Some(name) = self.first_string("NameAcquired", body) {
                self.record_acquired_name(&name);
            }
        }

        if header.is_signal(DBUS_INTERFACE, "NameLost") {
            if let Some(name) = self.first_string("NameLost", body) {
                let addr = header.destination.as_deref().unwrap_or_default();
                self.record_lost_name(addr, &name);
            }
        }
    }

    fn record_new_client(&mut self, addr: &str) {
        self.diagnostics
            .debug(format_args!("new client connected: {addr}"));
        match self.link.unix_process_id(addr, self.query_timeout) {
            Ok(pid) if pid > 0 => {
                self.diagnostics
                    .debug(format_args!("new client {addr} has pid {pid}"));
                self.directory.record_pid(addr, pid);
            }
            Ok(_) => self
                .diagnostics
                .warn(format_args!("failed to query unix pid for new client {addr}")),
            Err(err) => self.diagnostics.warn(format_args!(
                "failed to query unix pid for new client {addr}: {err}"
            )),
        }
    }

    fn record_acquired_name(&mut self, name: &str) {
        if is_numeric_address(name) {
            return;
        }
        match self.link.name_owner(name, self.query_timeout) {
            Ok(owner) if !owner.is_empty() => {
                self.diagnostics
                    .debug(format_args!("new name on bus: {name} {owner}"));
                self.directory.record_name_owner(name, &owner);
            }
            Ok(_) => {}
            Err(err) => self
                .diagnostics
                .debug(format_args!("failed to query owner of {name}: {err}")),
        }
    }

    fn record_lost_name(&mut self, addr: &str, name: &str) {
        if is_numeric_address(name) {
            return;
        }
        self.directory.remove_name_owner(addr, name);
        self.diagnostics
            .debug(format_args!("remove name: {name} from {addr}"));
    }

    /// First string argument of a bus signal, `None` for other payloads.
    fn first_string(&self, member: &str, body: &MessageBody) -> Option<String> {
        let value = body.decode(&self.decoder)?;
        if let Some(name) = value.first_str() {
            return Some(name.to_string());
        }
        self.diagnostics
            .debug(format_args!("ignoring {member} with {} argument", value.type_name()));
        None
    }

    /// Numeric form of a header address; well-known names are looked up.
    fn numeric_address(&self, addr: Option<&str>) -> String {
        match addr {
            None | Some("") => String::new(),
            Some(addr) if is_numeric_address(addr) => addr.to_string(),
            Some(name) => self
                .directory
                .address_for(name)
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn is_own(&self, addr: &str) -> bool {
        !addr.is_empty() && self.own_addresses.iter().any(|own| own == addr)
    }

    fn identity(&self, addr: &str) -> PeerIdentity {
        if addr.is_empty() {
            return PeerIdentity::default();
        }
        let mut identity = self.directory.identity_of(addr);
        if self.resolve_executables && identity.pid > 0 {
            identity.exe = procinfo::executable_path(identity.pid);
        }
        identity
    }
}
