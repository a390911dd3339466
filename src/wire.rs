//! Command framing for the device wire protocol.
//!
//! Every command is a single opcode byte, optionally followed by a value
//! payload: `opcode ‖ value_bytes`. How a value is rendered is a per-field
//! protocol detail that must match the firmware parser, so each field
//! selects its own [`FieldEncoding`]:
//!
//! - `AsciiDecimal` — the value printed as decimal ASCII text (the firmware
//!   reads digits until its terminator/length rule);
//! - `BinaryLe(width)` — the value as `width` little-endian bytes, matching
//!   the byte order of every other fixed-width integer in the system.
//!
//! State-transition opcodes (run/start/stop) carry no payload and go out as
//! the bare opcode byte.

use std::fmt;

/// How a command's value payload is rendered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    /// Decimal ASCII text, e.g. tempo 110 → `b"110"`.
    AsciiDecimal,
    /// Fixed-width little-endian binary of the given byte width (1..=8).
    BinaryLe(usize),
}

/// A value to be carried by a parameterized command.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Unsigned integer field (tempo, sound index, ...).
    Unsigned(u64),
    /// Floating-point field (alpha); ASCII-encoded only.
    Float(f64),
    /// Literal text field; ASCII-encoded only.
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Unsigned(n) => write!(f, "{n}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Frames a bare state-transition opcode.
pub fn encode_opcode(opcode: u8) -> Vec<u8> {
    vec![opcode]
}

/// Frames a parameterized command as `opcode ‖ value_bytes`.
///
/// `BinaryLe` accepts only `Unsigned` values; widths are clamped to the
/// 8-byte integers the rest of the format uses. Values that do not fit the
/// requested width are truncated by the cast the same way the firmware's
/// fixed-width read would truncate them, so the table author must size
/// fields to their ranges.
pub fn encode_command(opcode: u8, value: &FieldValue, encoding: FieldEncoding) -> Vec<u8> {
    let mut frame = vec![opcode];
    match encoding {
        FieldEncoding::AsciiDecimal => {
            frame.extend_from_slice(value.to_string().as_bytes());
        }
        FieldEncoding::BinaryLe(width) => {
            let n = match value {
                FieldValue::Unsigned(n) => *n,
                // Non-integer fields have no defined fixed-width form;
                // render the integer part rather than panic in a codec.
                FieldValue::Float(x) => *x as u64,
                FieldValue::Text(_) => 0,
            };
            let width = width.min(8);
            frame.extend_from_slice(&n.to_le_bytes()[..width]);
        }
    }
    frame
}
