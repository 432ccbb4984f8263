//! Conversions between what a user types, what goes over the wire and what
//! gets drawn on screen.
//!
//! Everything here is pure; no I/O and no allocation beyond the returned
//! buffers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How outgoing text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// UTF-8 bytes of the text
    #[default]
    Text,
    /// Pairs of hex digits; separators are ignored
    Hex,
}

/// Line terminator appended to outgoing payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    None,
    Cr,
    Lf,
    #[default]
    CrLf,
}

/// How received bytes are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Text,
    Hex,
}

impl LineEnding {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineEnding::None => b"",
            LineEnding::Cr => b"\r",
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

impl InputMode {
    /// Label stored in `TerminalMessage::encoding`
    pub fn encoding_label(&self) -> &'static str {
        match self {
            InputMode::Text => "UTF-8",
            InputMode::Hex => "HEX",
        }
    }
}

/// Turn user input into wire bytes.
///
/// In hex mode every character that is not a hex digit is discarded before
/// digits are paired, so `"41 42-43:44"` and `"41424344"` are equivalent. A
/// dangling final nibble is dropped without error. The line ending is
/// appended verbatim after the payload in both modes: `encode("41", Hex, Lf)`
/// yields `[0x41, 0x0A]`.
pub fn encode(text: &str, mode: InputMode, line_ending: LineEnding) -> Vec<u8> {
    let mut bytes = match mode {
        InputMode::Text => text.as_bytes().to_vec(),
        InputMode::Hex => parse_hex(text),
    };
    bytes.extend_from_slice(line_ending.as_bytes());
    bytes
}

fn parse_hex(text: &str) -> Vec<u8> {
    let nibbles: Vec<u8> = text
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();

    nibbles
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect()
}

/// Render received bytes for display.
///
/// Invalid UTF-8 is replaced lossily and the control characters CR, LF, TAB
/// and NUL become visible glyphs. This is presentation only; stored message
/// content is never passed through here.
pub fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| match c {
            '\r' => '\u{240D}',
            '\n' => '\u{240A}',
            '\t' => '\u{2409}',
            '\0' => '\u{2400}',
            other => other,
        })
        .collect()
}

/// Space separated uppercase hex pairs
pub fn to_hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render bytes in the requested display mode
pub fn render(bytes: &[u8], mode: DisplayMode) -> String {
    match mode {
        DisplayMode::Text => decode(bytes),
        DisplayMode::Hex => to_hex_string(bytes),
    }
}

/// Error returned when parsing a mode name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseModeError {
    kind: &'static str,
    value: String,
}

impl FromStr for InputMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "utf8" | "utf-8" => Ok(InputMode::Text),
            "hex" => Ok(InputMode::Hex),
            _ => Err(ParseModeError {
                kind: "input mode",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for LineEnding {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(LineEnding::None),
            "cr" => Ok(LineEnding::Cr),
            "lf" => Ok(LineEnding::Lf),
            "crlf" => Ok(LineEnding::CrLf),
            _ => Err(ParseModeError {
                kind: "line ending",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Text => write!(f, "text"),
            InputMode::Hex => write!(f, "hex"),
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineEnding::None => write!(f, "none"),
            LineEnding::Cr => write!(f, "cr"),
            LineEnding::Lf => write!(f, "lf"),
            LineEnding::CrLf => write!(f, "crlf"),
        }
    }
}
