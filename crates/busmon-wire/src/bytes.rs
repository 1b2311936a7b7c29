//! Byte-array rendering.
//!
//! Byte arrays are common carriers of text (file paths, NUL-terminated C
//! strings) and of opaque binary blobs. They are classified before falling
//! back to a hex dump.

/// Width budget of a hex dump line, in characters.
pub const HEX_LINE_WIDTH: usize = 80;

/// Indentation consumed per nesting level.
const INDENT: usize = 3;

/// Each byte takes two hex digits and a separator.
const CELLS_PER_BYTE: usize = 3;

/// Lower bound on hex dump columns, whatever the depth.
pub const MIN_HEX_COLUMNS: usize = 8;

/// How a byte array is presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteArrayForm {
    /// Printable ASCII terminated by a single NUL; holds the text without it.
    CString(String),
    /// Printable ASCII, no terminator.
    Text(String),
    /// Anything else, as a column-wrapped hex dump.
    Hex(String),
}

impl ByteArrayForm {
    /// Renders the form as the display string stored in the value tree.
    pub fn render(&self) -> String {
        match self {
            Self::CString(text) => format!("array of bytes \"{text}\" + \\0"),
            Self::Text(text) => format!("array of bytes \"{text}\""),
            Self::Hex(dump) => format!("array of bytes [\n{dump}\n]"),
        }
    }
}

/// Classifies `bytes` found at nesting `depth`.
pub fn classify_bytes(bytes: &[u8], depth: usize) -> ByteArrayForm {
    let last = bytes.len().saturating_sub(1);
    let all_ascii = bytes
        .iter()
        .enumerate()
        .all(|(i, &b)| is_printable(b) || (i == last && b == 0));

    if !all_ascii {
        return ByteArrayForm::Hex(hex_dump(bytes, hex_columns(depth)));
    }

    match bytes.split_last() {
        Some((0, text)) => ByteArrayForm::CString(ascii_text(text)),
        _ => ByteArrayForm::Text(ascii_text(bytes)),
    }
}

/// Hex dump columns for a byte array at nesting `depth`.
pub fn hex_columns(depth: usize) -> usize {
    let budget = HEX_LINE_WIDTH.saturating_sub((depth + 1) * INDENT);
    (budget / CELLS_PER_BYTE).max(MIN_HEX_COLUMNS)
}

/// Two-digit lowercase hex, `columns` bytes per line.
pub fn hex_dump(bytes: &[u8], columns: usize) -> String {
    let columns = columns.max(1);
    bytes
        .chunks(columns)
        .map(|line| {
            line.iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_printable(b: u8) -> bool {
    (32..=126).contains(&b)
}

fn ascii_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
