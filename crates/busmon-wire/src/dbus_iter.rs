//! [`ArgCursor`] over libdbus message iterators.

#[cfg(unix)]
use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd};

use busmon_core::Value;
use dbus::arg::{ArgType, Iter};
use dbus::Message;

use crate::cursor::{ArgCursor, ArgTag, BasicValue};
use crate::decode::ArgumentDecoder;

impl<'a> ArgCursor for Iter<'a> {
    fn current_tag(&mut self) -> Option<ArgTag> {
        tag_of(self.arg_type())
    }

    fn recurse_into(&mut self) -> Option<Self> {
        let kind = self.arg_type();
        self.recurse(kind)
    }

    fn advance(&mut self) -> bool {
        self.next()
    }

    fn read_basic(&mut self) -> Option<BasicValue> {
        let value = match self.arg_type() {
            ArgType::Byte => BasicValue::Byte(self.get()?),
            ArgType::Boolean => BasicValue::Bool(self.get()?),
            ArgType::Int16 => BasicValue::Int16(self.get()?),
            ArgType::UInt16 => BasicValue::UInt16(self.get()?),
            ArgType::Int32 => BasicValue::Int32(self.get()?),
            ArgType::UInt32 => BasicValue::UInt32(self.get()?),
            ArgType::Int64 => BasicValue::Int64(self.get()?),
            ArgType::UInt64 => BasicValue::UInt64(self.get()?),
            ArgType::Double => BasicValue::Double(self.get()?),
            ArgType::String => BasicValue::Str(self.get::<&str>()?.to_string()),
            ArgType::ObjectPath => BasicValue::Str(self.get::<dbus::Path>()?.to_string()),
            ArgType::Signature => BasicValue::Str(self.get::<dbus::Signature>()?.to_string()),
            _ => return None,
        };
        Some(value)
    }

    fn element_tag(&mut self) -> Option<ArgTag> {
        if self.arg_type() != ArgType::Array {
            return None;
        }
        let signature = self.signature();
        signature
            .as_bytes()
            .get(1)
            .and_then(|&code| ArgTag::from_code(code))
    }

    #[cfg(unix)]
    fn take_fd(&mut self) -> Option<OwnedFd> {
        let fd: dbus::arg::OwnedFd = self.get()?;
        // SAFETY: into_raw_fd releases ownership of a valid descriptor.
        Some(unsafe { OwnedFd::from_raw_fd(fd.into_raw_fd()) })
    }
}

fn tag_of(kind: ArgType) -> Option<ArgTag> {
    let tag = match kind {
        ArgType::Invalid => return None,
        ArgType::Byte => ArgTag::Byte,
        ArgType::Boolean => ArgTag::Boolean,
        ArgType::Int16 => ArgTag::Int16,
        ArgType::UInt16 => ArgTag::UInt16,
        ArgType::Int32 => ArgTag::Int32,
        ArgType::UInt32 => ArgTag::UInt32,
        ArgType::Int64 => ArgTag::Int64,
        ArgType::UInt64 => ArgTag::UInt64,
        ArgType::Double => ArgTag::Double,
        ArgType::String => ArgTag::String,
        ArgType::ObjectPath => ArgTag::ObjectPath,
        ArgType::Signature => ArgTag::Signature,
        ArgType::UnixFd => ArgTag::UnixFd,
        ArgType::Array => ArgTag::Array,
        ArgType::Struct => ArgTag::Struct,
        ArgType::Variant => ArgTag::Variant,
        ArgType::DictEntry => ArgTag::DictEntry,
        #[allow(unreachable_patterns)]
        other => ArgTag::Other(other as u8),
    };
    Some(tag)
}

/// Decodes the body of `message` with `decoder`.
///
/// Each call starts a fresh iterator, so a message can be decoded more
/// than once.
pub fn decode_message(decoder: &ArgumentDecoder, message: &Message) -> Option<Value> {
    decoder.decode(&mut message.iter_init())
}
