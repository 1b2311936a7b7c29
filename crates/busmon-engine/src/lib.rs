//! busmon engine - passive D-Bus monitor.
//!
//! This crate attaches to a bus as a monitor and turns every observed
//! message into a [`busmon_core::MonitoredMessage`]:
//! - `transport` - bus connections behind the `BusConnector` traits
//! - `directory` - live address ↔ names ↔ pid cache
//! - `session` - handshake, capture filter and dispatch loop
//! - `controller` - start / stop façade running the session on its own thread
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   handshake    ┌──────────────────────────┐
//! │  SessionController   │───────────────▶│      MonitorSession      │
//! │  (caller's thread)   │                │   (dispatch thread)      │
//! └──────────┬───────────┘                └────────────┬─────────────┘
//!            │ watch<bool>                             │ every message
//!            ▼                                         ▼
//!     is_active / watch                   ┌──────────────────────────┐
//!                                         │      CaptureFilter       │
//!                                         │ NameDirectory + decoder  │
//!                                         └────────────┬─────────────┘
//!                                                      │ MonitorSink
//!                                                      ▼
//!                                          mpsc<MonitorEvent> consumer
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Decoding and resolution failures degrade to empty fields

pub mod config;
pub mod controller;
pub mod directory;
pub mod error;
pub mod procinfo;
pub mod session;
pub mod sink;
pub mod transport;

pub use config::{ConfigError, MonitorConfig};
pub use controller::SessionController;
pub use directory::NameDirectory;
pub use error::SessionError;
pub use session::{MonitorMode, MonitorSession};
pub use sink::{MonitorEvent, MonitorSink};
pub use transport::{BusConnector, BusError, DbusConnector};
