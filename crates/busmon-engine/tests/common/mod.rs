//! In-memory bus used by the engine integration tests.
//!
//! The fake hands out monitor and directory links whose behavior is
//! scripted through [`FakeBus`]. Messages injected with [`FakeBus::inject`]
//! are delivered to the installed capture handler by the dispatch thread,
//! one per `read_write_dispatch` call, exactly like the real transport.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use busmon_core::{BusScope, MessageHeader, MessageKind, Value};
use busmon_engine::config::MonitorConfig;
use busmon_engine::transport::{
    BusConnector, BusError, DirectoryLink, InboundMessage, MessageHandler, MonitorLink,
    DBUS_INTERFACE, LOCAL_INTERFACE,
};

pub const PRIMARY_ADDRESS: &str = ":1.100";
pub const SECONDARY_ADDRESS: &str = ":1.101";

enum Incoming {
    Message(InboundMessage),
    Close,
}

pub struct BusState {
    pub names: Vec<String>,
    pub owners: HashMap<String, String>,
    pub pids: HashMap<String, u32>,
    pub fail_connect: Option<&'static str>,
    pub list_names_error: Option<BusError>,
    pub filter_error: Option<BusError>,
    pub become_monitor: Result<(), BusError>,
    pub eavesdrop_ok: bool,
    pub catch_all_ok: bool,
    pub match_rules: Vec<String>,
    pub open_links: usize,
    pub peer_routing_enabled: bool,
    inbox: Option<mpsc::Sender<Incoming>>,
}

impl Default for BusState {
    fn default() -> Self {
        Self {
            names: vec![DBUS_INTERFACE.to_string()],
            owners: HashMap::from([(DBUS_INTERFACE.to_string(), DBUS_INTERFACE.to_string())]),
            pids: HashMap::new(),
            fail_connect: None,
            list_names_error: None,
            filter_error: None,
            become_monitor: Ok(()),
            eavesdrop_ok: true,
            catch_all_ok: true,
            match_rules: Vec::new(),
            open_links: 0,
            peer_routing_enabled: false,
            inbox: None,
        }
    }
}

/// Shared handle to the scripted bus.
#[derive(Clone, Default)]
pub struct FakeBus {
    state: Arc<Mutex<BusState>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap()
    }

    pub fn connector(&self) -> Arc<dyn BusConnector> {
        Arc::new(self.clone())
    }

    /// Registers `name` as owned by `addr` with process `pid`.
    pub fn add_name(&self, name: &str, addr: &str, pid: u32) {
        let mut state = self.state();
        state.names.push(name.to_string());
        if !name.starts_with(':') {
            state.owners.insert(name.to_string(), addr.to_string());
        }
        state.pids.insert(name.to_string(), pid);
        state.pids.insert(addr.to_string(), pid);
    }

    /// Queues a message for the monitor connection.
    pub fn inject(&self, message: InboundMessage) {
        let state = self.state();
        if let Some(inbox) = &state.inbox {
            let _ = inbox.send(Incoming::Message(message));
        }
    }

    /// Closes the monitor connection from the bus side.
    pub fn close(&self) {
        let state = self.state();
        if let Some(inbox) = &state.inbox {
            let _ = inbox.send(Incoming::Close);
        }
    }

    pub fn open_links(&self) -> usize {
        self.state().open_links
    }

    pub fn match_rules(&self) -> Vec<String> {
        self.state().match_rules.clone()
    }
}

impl BusConnector for FakeBus {
    fn open_monitor(&self, _scope: BusScope) -> Result<Box<dyn MonitorLink>, BusError> {
        let mut state = self.state();
        if state.fail_connect == Some("primary") {
            return Err(BusError::Connection("primary refused".into()));
        }
        let (tx, rx) = mpsc::channel();
        state.inbox = Some(tx);
        state.open_links += 1;
        Ok(Box::new(FakeMonitorLink {
            bus: self.clone(),
            inbox: rx,
            handler: None,
        }))
    }

    fn open_directory(&self, _scope: BusScope) -> Result<Box<dyn DirectoryLink>, BusError> {
        let mut state = self.state();
        if state.fail_connect == Some("secondary") {
            return Err(BusError::Connection("secondary refused".into()));
        }
        state.open_links += 1;
        Ok(Box::new(FakeDirectoryLink { bus: self.clone() }))
    }
}

struct FakeMonitorLink {
    bus: FakeBus,
    inbox: mpsc::Receiver<Incoming>,
    handler: Option<MessageHandler>,
}

impl MonitorLink for FakeMonitorLink {
    fn unique_name(&self) -> String {
        PRIMARY_ADDRESS.to_string()
    }

    fn list_names(&self, _timeout: Duration) -> Result<Vec<String>, BusError> {
        let state = self.bus.state();
        match &state.list_names_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.names.clone()),
        }
    }

    fn route_peer_messages(&mut self) {
        self.bus.state().peer_routing_enabled = true;
    }

    fn install_filter(&mut self, handler: MessageHandler) -> Result<(), BusError> {
        let error = self.bus.state().filter_error.clone();
        if let Some(err) = error {
            return Err(err);
        }
        self.handler = Some(handler);
        Ok(())
    }

    fn become_monitor(&self, _timeout: Duration) -> Result<(), BusError> {
        self.bus.state().become_monitor.clone()
    }

    fn add_match(&self, rule: &str) -> Result<(), BusError> {
        let mut state = self.bus.state();
        let ok = if rule.is_empty() {
            state.catch_all_ok
        } else {
            state.eavesdrop_ok
        };
        if !ok {
            return Err(BusError::remote(
                "org.freedesktop.DBus.Error.MatchRuleInvalid",
                format!("rejected rule '{rule}'"),
            ));
        }
        state.match_rules.push(rule.to_string());
        Ok(())
    }

    fn read_write_dispatch(&mut self, wait: Duration) -> Result<(), BusError> {
        match self.inbox.recv_timeout(wait) {
            Ok(Incoming::Message(message)) => {
                if let Some(handler) = self.handler.as_mut() {
                    handler(message);
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(Incoming::Close) | Err(RecvTimeoutError::Disconnected) => {
                Err(BusError::Connection("connection closed".into()))
            }
        }
    }
}

impl Drop for FakeMonitorLink {
    fn drop(&mut self) {
        // Drop the handler (and the directory link it owns) first
        self.handler = None;
        let mut state = self.bus.state();
        state.open_links -= 1;
        state.inbox = None;
    }
}

struct FakeDirectoryLink {
    bus: FakeBus,
}

impl DirectoryLink for FakeDirectoryLink {
    fn unique_name(&self) -> String {
        SECONDARY_ADDRESS.to_string()
    }

    fn name_owner(&self, name: &str, _timeout: Duration) -> Result<String, BusError> {
        self.bus
            .state()
            .owners
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::remote("org.freedesktop.DBus.Error.NameHasNoOwner", name))
    }

    fn unix_process_id(&self, name: &str, _timeout: Duration) -> Result<u32, BusError> {
        self.bus
            .state()
            .pids
            .get(name)
            .copied()
            .ok_or_else(|| BusError::remote("org.freedesktop.DBus.Error.NameHasNoOwner", name))
    }
}

impl Drop for FakeDirectoryLink {
    fn drop(&mut self) {
        self.bus.state().open_links -= 1;
    }
}

// ============================================================================
// Message builders
// ============================================================================

pub fn method_call(serial: u32, sender: &str, destination: &str) -> InboundMessage {
    let mut header = MessageHeader::new(MessageKind::MethodCall, serial);
    header.sender = Some(sender.to_string());
    header.destination = Some(destination.to_string());
    header.path = Some("/org/example".to_string());
    header.interface = Some("org.example.Iface".to_string());
    header.member = Some("Ping".to_string());
    InboundMessage::decoded(header, Some(Value::UInt(u64::from(serial))))
}

pub fn method_return(
    serial: u32,
    reply_serial: u32,
    sender: &str,
    destination: &str,
) -> InboundMessage {
    let mut header = MessageHeader::new(MessageKind::MethodReturn, serial);
    header.sender = Some(sender.to_string());
    header.destination = Some(destination.to_string());
    header.reply_serial = Some(reply_serial);
    InboundMessage::decoded(header, None)
}

pub fn bus_signal(member: &str, destination: &str, arg: &str) -> InboundMessage {
    let mut header = MessageHeader::new(MessageKind::Signal, 1);
    header.sender = Some(DBUS_INTERFACE.to_string());
    header.destination = Some(destination.to_string());
    header.path = Some("/org/freedesktop/DBus".to_string());
    header.interface = Some(DBUS_INTERFACE.to_string());
    header.member = Some(member.to_string());
    InboundMessage::decoded(header, Some(Value::from(arg)))
}

pub fn disconnected() -> InboundMessage {
    let mut header = MessageHeader::new(MessageKind::Signal, 0);
    header.path = Some("/org/freedesktop/DBus/Local".to_string());
    header.interface = Some(LOCAL_INTERFACE.to_string());
    header.member = Some("Disconnected".to_string());
    InboundMessage::decoded(header, None)
}

/// Fast timings for tests.
pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        dispatch_interval: Duration::from_millis(20),
        query_timeout: Duration::from_millis(100),
        stop_grace: Duration::from_secs(2),
        low_priority: false,
        resolve_executables: false,
        verbose_startup: false,
    }
}
