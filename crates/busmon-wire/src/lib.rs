//! Wire-level argument decoding for busmon.
//!
//! Turns the typed, recursive body of a D-Bus message into a
//! [`busmon_core::Value`] tree.
//!
//! - [`ArgCursor`] abstracts the protocol iterator; it is implemented for
//!   `dbus::arg::Iter` and for in-memory trees in tests.
//! - [`ArgumentDecoder`] walks a cursor, skipping what it cannot decode.
//! - Byte arrays are rendered as text or hex dumps, file descriptors as a
//!   description of what they refer to.

pub mod bytes;
pub mod cursor;
mod dbus_iter;
pub mod decode;
#[cfg(unix)]
pub mod descriptor;

pub use bytes::{classify_bytes, hex_columns, hex_dump, ByteArrayForm};
pub use cursor::{ArgCursor, ArgTag, BasicValue};
pub use dbus_iter::decode_message;
pub use decode::{ArgumentDecoder, TOP_LEVEL_DEPTH};
