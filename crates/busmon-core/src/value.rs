//! Decoded argument values.
//!
//! A [`Value`] is the generic, self-contained form of one D-Bus argument after
//! decoding. Every wire type folds into one of eight variants, so consumers
//! match exhaustively instead of inspecting types at runtime.

use std::fmt;

use serde::Serialize;

/// One decoded argument (or one node of a nested argument).
///
/// Mapping from the wire grammar:
///
/// | Wire type                              | Variant        |
/// |----------------------------------------|----------------|
/// | int16, int32, int64                    | `Int`          |
/// | byte, uint16, uint32, uint64           | `UInt`         |
/// | double                                 | `Double`       |
/// | boolean                                | `Bool`         |
/// | string, object path, signature         | `String`       |
/// | byte array (rendered text or hex dump) | `String`       |
/// | array, struct                          | `List`         |
/// | dictionary entry                       | `KeyValue`     |
/// | unix file descriptor                   | `Descriptor`   |
///
/// Variants carry no wrapper for D-Bus variants: a variant decodes to the
/// value it contains.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    #[serde(rename = "uint")]
    UInt(u64),
    Double(f64),
    Bool(bool),
    String(String),
    List(Vec<Value>),
    KeyValue(Box<Value>, Box<Value>),
    /// Description of a received file descriptor. The descriptor itself is
    /// never retained.
    Descriptor(String),
}

impl Value {
    /// Builds a dictionary entry node.
    pub fn key_value(key: Value, value: Value) -> Self {
        Self::KeyValue(Box::new(key), Box::new(value))
    }

    /// Returns the string payload if this is a `String` node.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the child nodes if this is a `List` node.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the first string found at the top of an argument payload.
    ///
    /// Payloads collapse to a bare value when they hold a single argument,
    /// so the first argument is either the value itself or the head of the
    /// list.
    pub fn first_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::List(items) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Short lowercase name of the variant, used in logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Double(_) => "double",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::KeyValue(..) => "key_value",
            Self::Descriptor(_) => "descriptor",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::KeyValue(k, v) => write!(f, "{k}: {v}"),
            Self::Descriptor(desc) => write!(f, "<{desc}>"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}
