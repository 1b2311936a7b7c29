//! Argument decoding.
//!
//! Walks an [`ArgCursor`] and folds every slot into a [`Value`]. Decoding
//! never fails as a whole: unsupported or malformed slots are reported to
//! the diagnostics sink and skipped, and their siblings are still decoded.
//!
//! # Panic-Free Guarantees
//!
//! All cursor reads return `Option` and are checked. Nesting depth only
//! feeds the hex column computation, which saturates.

use std::sync::Arc;

use busmon_core::{Diagnostics, Value};

use crate::bytes::classify_bytes;
use crate::cursor::{ArgCursor, ArgTag, BasicValue};

/// Depth assigned to top-level arguments.
pub const TOP_LEVEL_DEPTH: usize = 1;

/// Decodes message bodies into value trees.
#[derive(Clone)]
pub struct ArgumentDecoder {
    diagnostics: Arc<dyn Diagnostics>,
}

impl ArgumentDecoder {
    pub fn new(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self { diagnostics }
    }

    /// Decodes every top-level argument under `cursor`.
    ///
    /// Zero arguments yield `None`, a single argument yields that value
    /// bare, several arguments yield a `List` in wire order.
    pub fn decode<C: ArgCursor>(&self, cursor: &mut C) -> Option<Value> {
        let mut values = self.decode_sequence(cursor, TOP_LEVEL_DEPTH);
        match values.len() {
            0 => None,
            1 => values.pop(),
            _ => Some(Value::List(values)),
        }
    }

    fn decode_sequence<C: ArgCursor>(&self, cursor: &mut C, depth: usize) -> Vec<Value> {
        let mut values = Vec::new();
        while let Some(tag) = cursor.current_tag() {
            if let Some(value) = self.decode_slot(cursor, tag, depth) {
                values.push(value);
            }
            if !cursor.advance() {
                break;
            }
        }
        values
    }

    fn decode_slot<C: ArgCursor>(
        &self,
        cursor: &mut C,
        tag: ArgTag,
        depth: usize,
    ) -> Option<Value> {
        match tag {
            _ if tag.is_container() => self.decode_container(cursor, tag, depth),
            ArgTag::UnixFd => self.decode_fd(cursor),
            ArgTag::Other(code) => {
                self.diagnostics.warn(format_args!(
                    "skipping argument of unsupported type '{}'",
                    char::from(code)
                ));
                None
            }
            _ => match cursor.read_basic() {
                Some(basic) => Some(basic_to_value(basic)),
                None => {
                    self.diagnostics
                        .warn(format_args!("failed to read {tag:?} argument"));
                    None
                }
            },
        }
    }

    /// Variants are unwrapped, byte arrays rendered, other arrays and
    /// structs become lists.
    fn decode_container<C: ArgCursor>(
        &self,
        cursor: &mut C,
        tag: ArgTag,
        depth: usize,
    ) -> Option<Value> {
        if tag == ArgTag::DictEntry {
            return self.decode_dict_entry(cursor, depth);
        }

        let is_bytes = tag == ArgTag::Array && cursor.element_tag() == Some(ArgTag::Byte);
        let mut inner = self.open(cursor, tag)?;

        if tag == ArgTag::Variant {
            let inner_tag = inner.current_tag()?;
            return self.decode_slot(&mut inner, inner_tag, depth + 1);
        }
        if is_bytes {
            let bytes = collect_bytes(&mut inner);
            return Some(Value::String(classify_bytes(&bytes, depth).render()));
        }
        Some(Value::List(self.decode_sequence(&mut inner, depth + 1)))
    }

    fn decode_dict_entry<C: ArgCursor>(&self, cursor: &mut C, depth: usize) -> Option<Value> {
        let mut entry = self.open(cursor, ArgTag::DictEntry)?;

        let key = entry
            .current_tag()
            .and_then(|tag| self.decode_slot(&mut entry, tag, depth + 1));
        let value = if entry.advance() {
            entry
                .current_tag()
                .and_then(|tag| self.decode_slot(&mut entry, tag, depth + 1))
        } else {
            None
        };

        match (key, value) {
            (Some(key), Some(value)) => Some(Value::key_value(key, value)),
            _ => {
                self.diagnostics
                    .warn(format_args!("skipping dictionary entry without both key and value"));
                None
            }
        }
    }

    #[cfg(unix)]
    fn decode_fd<C: ArgCursor>(&self, cursor: &mut C) -> Option<Value> {
        match cursor.take_fd() {
            Some(fd) => Some(Value::Descriptor(crate::descriptor::describe(fd))),
            None => {
                self.diagnostics
                    .warn(format_args!("file descriptor argument could not be read"));
                Some(Value::Descriptor("file descriptor".to_string()))
            }
        }
    }

    #[cfg(not(unix))]
    fn decode_fd<C: ArgCursor>(&self, _cursor: &mut C) -> Option<Value> {
        self.diagnostics
            .warn(format_args!("file descriptors are not supported on this platform"));
        None
    }

    fn open<C: ArgCursor>(&self, cursor: &mut C, tag: ArgTag) -> Option<C> {
        let sub = cursor.recurse_into();
        if sub.is_none() {
            self.diagnostics
                .warn(format_args!("could not open {tag:?} container"));
        }
        sub
    }
}

fn collect_bytes<C: ArgCursor>(cursor: &mut C) -> Vec<u8> {
    let mut bytes = Vec::new();
    while cursor.current_tag().is_some() {
        if let Some(BasicValue::Byte(b)) = cursor.read_basic() {
            bytes.push(b);
        }
        if !cursor.advance() {
            break;
        }
    }
    bytes
}

fn basic_to_value(basic: BasicValue) -> Value {
    match basic {
        BasicValue::Byte(v) => Value::UInt(u64::from(v)),
        BasicValue::Bool(v) => Value::Bool(v),
        BasicValue::Int16(v) => Value::Int(i64::from(v)),
        BasicValue::UInt16(v) => Value::UInt(u64::from(v)),
        BasicValue::Int32(v) => Value::Int(i64::from(v)),
        BasicValue::UInt32(v) => Value::UInt(u64::from(v)),
        BasicValue::Int64(v) => Value::Int(v),
        BasicValue::UInt64(v) => Value::UInt(v),
        BasicValue::Double(v) => Value::Double(v),
        BasicValue::Str(v) => Value::String(v),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use busmon_core::{Level, MemoryDiagnostics};

    #[cfg(unix)]
    use std::os::fd::OwnedFd;

    /// In-memory argument tree.
    #[derive(Debug, Clone)]
    pub(crate) enum Arg {
        Basic(ArgTag, BasicValue),
        Container(ArgTag, Option<ArgTag>, Vec<Arg>),
        Unknown(u8),
    }

    impl Arg {
        pub(crate) fn string(s: &str) -> Self {
            Self::Basic(ArgTag::String, BasicValue::Str(s.to_string()))
        }

        pub(crate) fn u32(v: u32) -> Self {
            Self::Basic(ArgTag::UInt32, BasicValue::UInt32(v))
        }

        pub(crate) fn i32(v: i32) -> Self {
            Self::Basic(ArgTag::Int32, BasicValue::Int32(v))
        }

        pub(crate) fn bytes(bytes: &[u8]) -> Self {
            let elements = bytes
                .iter()
                .map(|&b| Self::Basic(ArgTag::Byte, BasicValue::Byte(b)))
                .collect();
            Self::Container(ArgTag::Array, Some(ArgTag::Byte), elements)
        }

        pub(crate) fn array(element: ArgTag, items: Vec<Arg>) -> Self {
            Self::Container(ArgTag::Array, Some(element), items)
        }

        pub(crate) fn structure(fields: Vec<Arg>) -> Self {
            Self::Container(ArgTag::Struct, None, fields)
        }

        pub(crate) fn variant(inner: Arg) -> Self {
            Self::Container(ArgTag::Variant, None, vec![inner])
        }

        pub(crate) fn entry(parts: Vec<Arg>) -> Self {
            Self::Container(ArgTag::DictEntry, None, parts)
        }

        fn tag(&self) -> ArgTag {
            match self {
                Self::Basic(tag, _) | Self::Container(tag, _, _) => *tag,
                Self::Unknown(code) => ArgTag::Other(*code),
            }
        }
    }

    pub(crate) struct TreeCursor {
        args: Vec<Arg>,
        pos: usize,
    }

    impl TreeCursor {
        pub(crate) fn new(args: Vec<Arg>) -> Self {
            Self { args, pos: 0 }
        }
    }

    impl ArgCursor for TreeCursor {
        fn current_tag(&mut self) -> Option<ArgTag> {
            self.args.get(self.pos).map(Arg::tag)
        }

        fn recurse_into(&mut self) -> Option<Self> {
            match self.args.get(self.pos)? {
                Arg::Container(_, _, children) => Some(Self::new(children.clone())),
                _ => None,
            }
        }

        fn advance(&mut self) -> bool {
            if self.pos < self.args.len() {
                self.pos += 1;
            }
            self.pos < self.args.len()
        }

        fn read_basic(&mut self) -> Option<BasicValue> {
            match self.args.get(self.pos)? {
                Arg::Basic(_, value) => Some(value.clone()),
                _ => None,
            }
        }

        fn element_tag(&mut self) -> Option<ArgTag> {
            match self.args.get(self.pos)? {
                Arg::Container(ArgTag::Array, element, _) => *element,
                _ => None,
            }
        }

        #[cfg(unix)]
        fn take_fd(&mut self) -> Option<OwnedFd> {
            None
        }
    }

    fn decoder() -> (ArgumentDecoder, Arc<MemoryDiagnostics>) {
        let diag = Arc::new(MemoryDiagnostics::new());
        (ArgumentDecoder::new(diag.clone()), diag)
    }

    fn decode(args: Vec<Arg>) -> (Option<Value>, Arc<MemoryDiagnostics>) {
        let (decoder, diag) = decoder();
        let value = decoder.decode(&mut TreeCursor::new(args));
        (value, diag)
    }

    #[test]
    fn test_no_arguments_is_none() {
        let (value, _) = decode(vec![]);
        assert_eq!(value, None);
    }

    #[test]
    fn test_single_argument_is_bare() {
        let (value, _) = decode(vec![Arg::string("org.example.Name")]);
        assert_eq!(value, Some(Value::String("org.example.Name".to_string())));
    }

    #[test]
    fn test_multiple_arguments_form_list() {
        let (value, _) = decode(vec![
            Arg::string("org.example.Name"),
            Arg::string(""),
            Arg::string(":1.42"),
        ]);
        assert_eq!(
            value,
            Some(Value::List(vec![
                Value::from("org.example.Name"),
                Value::from(""),
                Value::from(":1.42"),
            ]))
        );
    }

    #[test]
    fn test_integer_widths_fold() {
        let (value, _) = decode(vec![
            Arg::Basic(ArgTag::Byte, BasicValue::Byte(7)),
            Arg::Basic(ArgTag::Int16, BasicValue::Int16(-3)),
            Arg::Basic(ArgTag::UInt64, BasicValue::UInt64(u64::MAX)),
            Arg::Basic(ArgTag::Boolean, BasicValue::Bool(true)),
            Arg::Basic(ArgTag::Double, BasicValue::Double(1.5)),
        ]);
        assert_eq!(
            value,
            Some(Value::List(vec![
                Value::UInt(7),
                Value::Int(-3),
                Value::UInt(u64::MAX),
                Value::Bool(true),
                Value::Double(1.5),
            ]))
        );
    }

    #[test]
    fn test_variant_is_unwrapped() {
        let (value, _) = decode(vec![Arg::variant(Arg::u32(5))]);
        assert_eq!(value, Some(Value::UInt(5)));
    }

    #[test]
    fn test_dictionary_array() {
        let dict = Arg::array(
            ArgTag::DictEntry,
            vec![
                Arg::entry(vec![Arg::string("a"), Arg::variant(Arg::i32(1))]),
                Arg::entry(vec![Arg::string("b"), Arg::variant(Arg::string("x"))]),
            ],
        );
        let (value, _) = decode(vec![dict]);
        assert_eq!(
            value,
            Some(Value::List(vec![
                Value::key_value(Value::from("a"), Value::Int(1)),
                Value::key_value(Value::from("b"), Value::from("x")),
            ]))
        );
    }

    #[test]
    fn test_incomplete_dict_entry_is_skipped() {
        let dict = Arg::array(
            ArgTag::DictEntry,
            vec![
                Arg::entry(vec![Arg::string("lonely")]),
                Arg::entry(vec![Arg::string("k"), Arg::u32(2)]),
            ],
        );
        let (value, diag) = decode(vec![dict]);
        assert_eq!(
            value,
            Some(Value::List(vec![Value::key_value(
                Value::from("k"),
                Value::UInt(2)
            )]))
        );
        assert!(diag.contains(Level::Warn, "dictionary entry"));
    }

    #[test]
    fn test_struct_and_nested_arrays() {
        let arg = Arg::structure(vec![
            Arg::i32(1),
            Arg::array(ArgTag::String, vec![Arg::string("x"), Arg::string("y")]),
            Arg::array(ArgTag::Int32, vec![]),
        ]);
        let (value, _) = decode(vec![arg]);
        assert_eq!(
            value,
            Some(Value::List(vec![
                Value::Int(1),
                Value::List(vec![Value::from("x"), Value::from("y")]),
                Value::List(vec![]),
            ]))
        );
    }

    #[test]
    fn test_byte_arrays_render() {
        let (value, _) = decode(vec![
            Arg::bytes(b"hi\0"),
            Arg::bytes(b"hi"),
            Arg::bytes(&[0xff, 0x00, 0x01]),
            Arg::bytes(&[]),
        ]);
        let values = value.expect("arguments");
        let items = values.as_list().expect("list");
        assert_eq!(items[0], Value::from("array of bytes \"hi\" + \\0"));
        assert_eq!(items[1], Value::from("array of bytes \"hi\""));
        let hex = items[2].as_str().expect("hex string");
        assert!(hex.starts_with("array of bytes ["));
        assert!(hex.contains("ff 00 01"));
        assert_eq!(items[3], Value::from("array of bytes \"\""));
    }

    #[test]
    fn test_unknown_type_skipped_siblings_kept() {
        let (value, diag) = decode(vec![
            Arg::string("before"),
            Arg::Unknown(b'm'),
            Arg::string("after"),
        ]);
        assert_eq!(
            value,
            Some(Value::List(vec![Value::from("before"), Value::from("after")]))
        );
        assert!(diag.contains(Level::Warn, "unsupported type 'm'"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_fd_still_described() {
        let (value, diag) = decode(vec![Arg::Basic(
            ArgTag::UnixFd,
            BasicValue::UInt32(0),
        )]);
        assert_eq!(
            value,
            Some(Value::Descriptor("file descriptor".to_string()))
        );
        assert_eq!(diag.count(Level::Warn), 1);
    }
}
