//! busmon Core - Shared types for D-Bus traffic monitoring
//!
//! This crate provides the domain types shared between the decoder
//! (busmon-wire), the monitor engine (busmon-engine) and front ends.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod address;
pub mod diagnostics;
pub mod error;
pub mod history;
pub mod message;
pub mod value;

// Re-exports for convenience
pub use address::{is_numeric_address, BusScope};
pub use diagnostics::{
    Diagnostics, Level, MemoryDiagnostics, TracingDiagnostics, DIAGNOSTICS_TARGET,
};
pub use error::DomainError;
pub use history::MessageHistory;
pub use message::{MessageHeader, MessageKind, MonitoredMessage, PeerIdentity, Routing};
pub use value::Value;
