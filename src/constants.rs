//! Protocol constants table loaded from a device definitions file.
//!
//! The device firmware and the control process share one source of truth: a
//! C-style header of `#define NAME VALUE` lines. This module parses that
//! file once, at startup, into a flat name→value [`SymbolTable`], and
//! resolves from it the fixed opcode set ([`ProtocolCommands`]) the session
//! transmits. Missing symbols surface as [`AcqError::UndefinedSymbol`]
//! before any device I/O happens.
//!
//! Values stay as raw text in the table; callers coerce through the typed
//! accessors (`byte`, `number`) or take the literal (`raw`). Hexadecimal
//! (`0x..`) and decimal forms are accepted wherever a number is requested.

use crate::error::{AcqError, AcqResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// `#define NAME VALUE` — value part optional so include guards match too.
static DEFINE_LINE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    let pattern = Regex::new(r"^\s*#define\s+(\w+)(?:\s+(.+?))?\s*$")
        .expect("definition line pattern compiles");
    pattern
});

/// Flat name→value table of protocol constants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    symbols: HashMap<String, String>,
}

impl SymbolTable {
    /// Loads and parses a definitions file.
    pub fn load(path: &Path) -> AcqResult<Self> {
        let text = fs::read_to_string(path)?;
        let table = Self::parse(&text);
        log::debug!(
            "Loaded {} protocol symbols from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parses definitions source text. Comments (`//`, `/* */`) are
    /// stripped first; `#define`s without a value (include guards) are
    /// ignored.
    pub fn parse(source: &str) -> Self {
        let mut symbols = HashMap::new();
        for line in strip_comments(source).lines() {
            if let Some(caps) = DEFINE_LINE.captures(line) {
                if let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) {
                    symbols.insert(name.as_str().to_string(), value.as_str().to_string());
                }
            }
        }
        Self { symbols }
    }

    /// Number of symbols in the table.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True when the table holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The raw value text for `name`.
    pub fn raw(&self, name: &str) -> AcqResult<&str> {
        self.symbols
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AcqError::UndefinedSymbol(name.to_string()))
    }

    /// The value for `name` as a signed integer (hex `0x..` or decimal).
    pub fn number(&self, name: &str) -> AcqResult<i64> {
        let raw = self.raw(name)?;
        parse_int(raw).ok_or_else(|| AcqError::Parse(format!("{name} = {raw}")))
    }

    /// The value for `name` as a single protocol byte.
    ///
    /// Opcodes are single bytes on the wire; anything outside 0..=255 is a
    /// definitions-file mistake, reported as [`AcqError::Parse`].
    pub fn byte(&self, name: &str) -> AcqResult<u8> {
        let n = self.number(name)?;
        u8::try_from(n).map_err(|_| {
            AcqError::Parse(format!("{name} = {n} does not fit a single opcode byte"))
        })
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

/// Removes `//` line comments and `/* */` block comments.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_block = false;

    while let Some(c) = chars.next() {
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            }
            continue;
        }
        match (c, chars.peek()) {
            ('/', Some('*')) => {
                chars.next();
                in_block = true;
            }
            ('/', Some('/')) => {
                // discard to end of line, keep the newline itself
                for d in chars.by_ref() {
                    if d == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// The opcode set the acquisition session transmits, resolved once from the
/// symbol table at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolCommands {
    /// Moves the device into its running state.
    pub state_run: u8,
    /// Starts the run.
    pub start: u8,
    /// Stops the run.
    pub stop: u8,
    /// Parameterized: set metronome tempo (BPM).
    pub set_tempo: u8,
    /// Parameterized: set adaptivity alpha.
    pub set_alpha: u8,
    /// Parameterized: select the click sound.
    pub set_sound: u8,
}

impl ProtocolCommands {
    /// Resolves all required opcodes, failing with the first missing symbol.
    pub fn from_table(table: &SymbolTable) -> AcqResult<Self> {
        Ok(Self {
            state_run: table.byte("CMD_STATE_RUN")?,
            start: table.byte("CMD_START")?,
            stop: table.byte("CMD_STOP")?,
            set_tempo: table.byte("CMD_SET_TEMPO")?,
            set_alpha: table.byte("CMD_SET_ALPHA")?,
            set_sound: table.byte("CMD_SET_SOUND")?,
        })
    }
}
