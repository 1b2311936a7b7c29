//! Argument cursor abstraction.
//!
//! The D-Bus argument grammar is recursive: a message body is a sequence of
//! typed slots, and container slots (arrays, structs, variants, dictionary
//! entries) hold their own sequences. [`ArgCursor`] walks one sequence and
//! can open a sub-cursor on the container it is positioned on.

#[cfg(unix)]
use std::os::fd::OwnedFd;

/// Type tag of one argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgTag {
    Byte,
    Boolean,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    ObjectPath,
    Signature,
    UnixFd,
    Array,
    Struct,
    Variant,
    DictEntry,
    /// A type code this decoder does not understand.
    Other(u8),
}

impl ArgTag {
    /// Maps a D-Bus type code to a tag.
    ///
    /// Accepts both the signature spelling of containers (`(`, `{`) and the
    /// type codes reported by iterators (`r`, `e`). Returns `None` for the
    /// invalid (`\0`) code.
    pub fn from_code(code: u8) -> Option<Self> {
        let tag = match code {
            0 => return None,
            b'y' => Self::Byte,
            b'b' => Self::Boolean,
            b'n' => Self::Int16,
            b'q' => Self::UInt16,
            b'i' => Self::Int32,
            b'u' => Self::UInt32,
            b'x' => Self::Int64,
            b't' => Self::UInt64,
            b'd' => Self::Double,
            b's' => Self::String,
            b'o' => Self::ObjectPath,
            b'g' => Self::Signature,
            b'h' => Self::UnixFd,
            b'a' => Self::Array,
            b'r' | b'(' => Self::Struct,
            b'v' => Self::Variant,
            b'e' | b'{' => Self::DictEntry,
            other => Self::Other(other),
        };
        Some(tag)
    }

    /// Returns true for tags that hold nested sequences.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Array | Self::Struct | Self::Variant | Self::DictEntry
        )
    }
}

/// A fixed-width or string-like argument read from a cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum BasicValue {
    Byte(u8),
    Bool(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    /// Strings, object paths and signatures.
    Str(String),
}

/// Cursor over one sequence of argument slots.
///
/// Implementations mirror the protocol's own iterator: the cursor starts on
/// the first slot, [`advance`](ArgCursor::advance) moves to the next one,
/// and [`current_tag`](ArgCursor::current_tag) returns `None` once the
/// sequence is exhausted.
pub trait ArgCursor {
    /// Tag of the slot under the cursor, `None` past the end.
    fn current_tag(&mut self) -> Option<ArgTag>;

    /// Opens a cursor over the contents of the container under the cursor.
    fn recurse_into(&mut self) -> Option<Self>
    where
        Self: Sized;

    /// Moves to the next slot. Returns false if there is none.
    fn advance(&mut self) -> bool;

    /// Reads the basic value under the cursor.
    fn read_basic(&mut self) -> Option<BasicValue>;

    /// Element tag of the array under the cursor, known even when the array
    /// is empty.
    fn element_tag(&mut self) -> Option<ArgTag>;

    /// Takes ownership of the file descriptor under the cursor.
    ///
    /// The caller closes it by dropping the returned handle.
    #[cfg(unix)]
    fn take_fd(&mut self) -> Option<OwnedFd>;
}
