//! Text codecs
//!
//! Stateless conversions between raw bytes, hexadecimal text and caret
//! notation, plus the outbound payload encoder used by the session.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Errors that can occur while parsing hexadecimal text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    /// Digit count is odd; carries the count
    #[error("Malformed hex: odd number of digits ({0})")]
    OddLength(usize),

    /// A character that is not a hex digit
    #[error("Malformed hex: invalid digit {ch:?} at position {position}")]
    InvalidDigit {
        /// The offending character
        ch: char,
        /// Index among the non-whitespace characters
        position: usize,
    },
}

/// How received bytes are rendered and how sent payloads are encoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Bytes are decoded as text, control characters shown in caret notation
    #[default]
    Text,
    /// Bytes are shown as space separated hex pairs
    Hex,
}

/// Line terminator appended to sent payloads and expected on receive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Newline {
    /// Carriage return + line feed
    #[default]
    Crlf,
    /// Line feed only
    Lf,
    /// Carriage return only
    Cr,
    /// No terminator
    None,
}

impl Newline {
    /// Terminator bytes
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Newline::Crlf => b"\r\n",
            Newline::Lf => b"\n",
            Newline::Cr => b"\r",
            Newline::None => b"",
        }
    }

    /// Setting name as used in config files and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Newline::Crlf => "crlf",
            Newline::Lf => "lf",
            Newline::Cr => "cr",
            Newline::None => "none",
        }
    }

    /// True when received text should be escaped with the line feed kept
    pub fn is_terminator_aware(&self) -> bool {
        !self.as_bytes().is_empty()
    }
}

impl fmt::Display for Newline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown newline setting name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown newline setting '{0}', expected one of crlf, lf, cr, none")]
pub struct UnknownNewline(
    /// The rejected name
    pub String,
);

impl FromStr for Newline {
    type Err = UnknownNewline;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crlf" => Ok(Newline::Crlf),
            "lf" => Ok(Newline::Lf),
            "cr" => Ok(Newline::Cr),
            "none" => Ok(Newline::None),
            _ => Err(UnknownNewline(s.to_string())),
        }
    }
}

/// Render bytes as uppercase hex pairs separated by single spaces
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, &b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push(HEX_DIGITS[(b >> 4) as usize] as char);
        out.push(HEX_DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

/// Parse hex text back into bytes
///
/// Whitespace anywhere in the input is ignored and digits are paired
/// left to right. Both digit cases are accepted.
pub fn from_hex(text: &str) -> Result<Vec<u8>, HexError> {
    let mut out = Vec::with_capacity(text.len() / 2);
    let mut high: Option<u8> = None;
    let mut digits = 0usize;

    for (position, ch) in text.chars().enumerate() {
        if ch.is_whitespace() {
            continue;
        }
        let nibble = ch
            .to_digit(16)
            .ok_or(HexError::InvalidDigit { ch, position })? as u8;
        digits += 1;
        match high.take() {
            Some(h) => out.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }

    if high.is_some() {
        return Err(HexError::OddLength(digits));
    }
    Ok(out)
}

fn needs_caret(c: char, terminator_aware: bool) -> bool {
    c < ' ' && !(terminator_aware && c == '\n')
}

/// Render control characters below U+0020 as `^X` (0x01 -> `^A`, 0x0D -> `^M`)
///
/// With `terminator_aware` the line feed is left as is so that lines still
/// break. Text without anything to escape is returned borrowed.
pub fn to_caret_string(text: &str, terminator_aware: bool) -> Cow<'_, str> {
    if !text.chars().any(|c| needs_caret(c, terminator_aware)) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if needs_caret(c, terminator_aware) {
            out.push('^');
            out.push(char::from(c as u8 + 0x40));
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Encode an outbound payload for the wire, terminator included
///
/// In hex mode the payload is hex text and fails on malformed input.
pub fn encode_payload(payload: &str, mode: RenderMode, newline: Newline) -> Result<Vec<u8>, HexError> {
    let mut data = match mode {
        RenderMode::Text => payload.as_bytes().to_vec(),
        RenderMode::Hex => from_hex(payload)?,
    };
    data.extend_from_slice(newline.as_bytes());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_to_hex_format() {
        assert_eq!(to_hex(&[0x41, 0x42, 0x00, 0xFF]), "41 42 00 FF");
        assert_eq!(to_hex(&[0x0d, 0x0a]), "0D 0A");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn test_hex_round_trip_all_bytes() {
        let all: Vec<u8> = (0..=255u8).collect();
        assert_eq!(from_hex(&to_hex(&all)).unwrap(), all);
        assert_eq!(from_hex(&to_hex(&[])).unwrap(), Vec::<u8>::new());
    }

    mod properties {
        use crate::codec::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn hex_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
                prop_assert_eq!(from_hex(&to_hex(&bytes)).unwrap(), bytes);
            }

            #[test]
            fn from_hex_accepts_lowercase(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
                let lower = to_hex(&bytes).to_lowercase();
                prop_assert_eq!(from_hex(&lower).unwrap(), bytes);
            }

            #[test]
            fn caret_output_has_no_controls(text in "\\PC*|[\\x00-\\x1f]{0,16}", aware in any::<bool>()) {
                let escaped = to_caret_string(&text, aware);
                let stray = escaped.chars().any(|c| c < ' ' && !(aware && c == '\n'));
                prop_assert!(!stray);
            }
        }
    }

    #[test]
    fn test_from_hex_ignores_whitespace_and_case() {
        assert_eq!(from_hex("de ad\tBE\nef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(from_hex("0 1").unwrap(), vec![0x01]);
    }

    #[test]
    fn test_from_hex_odd_length() {
        assert_eq!(from_hex("ABC"), Err(HexError::OddLength(3)));
        assert_eq!(from_hex("A"), Err(HexError::OddLength(1)));
    }

    #[test]
    fn test_from_hex_invalid_digit() {
        assert_eq!(
            from_hex("0A 0G"),
            Err(HexError::InvalidDigit { ch: 'G', position: 4 })
        );
        assert!(from_hex("hello").is_err());
    }

    #[test]
    fn test_caret_control_characters() {
        assert_eq!(to_caret_string("\u{1}", true), "^A");
        assert_eq!(to_caret_string("a\u{0}b", false), "a^@b");
        assert_eq!(to_caret_string("x\u{1b}[0m", true), "x^[[0m");
    }

    #[test]
    fn test_caret_line_feed_handling() {
        assert_eq!(to_caret_string("a\nb", true), "a\nb");
        assert_eq!(to_caret_string("a\nb", false), "a^Jb");
        assert_eq!(to_caret_string("a\r", true), "a^M");
    }

    #[test]
    fn test_caret_borrows_plain_text() {
        assert!(matches!(to_caret_string("plain text\n", true), Cow::Borrowed(_)));
        assert!(matches!(to_caret_string("tab\there", true), Cow::Owned(_)));
    }

    #[test]
    fn test_newline_bytes_and_names() {
        assert_eq!(Newline::Crlf.as_bytes(), b"\r\n");
        assert_eq!(Newline::None.as_bytes(), b"");
        assert!(!Newline::None.is_terminator_aware());
        assert_eq!("LF".parse::<Newline>().unwrap(), Newline::Lf);
        assert!("crlf2".parse::<Newline>().is_err());
        assert_eq!(Newline::Cr.to_string(), "cr");
    }

    #[test]
    fn test_newline_serde_names() {
        assert_eq!(serde_json::to_string(&Newline::Crlf).unwrap(), "\"crlf\"");
        let parsed: Newline = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, Newline::None);
        let mode: RenderMode = serde_json::from_str("\"hex\"").unwrap();
        assert_eq!(mode, RenderMode::Hex);
    }

    #[test]
    fn test_encode_payload_text_appends_newline() {
        assert_eq!(
            encode_payload("AT", RenderMode::Text, Newline::Crlf).unwrap(),
            b"AT\r\n".to_vec()
        );
        assert_eq!(
            encode_payload("AT", RenderMode::Text, Newline::None).unwrap(),
            b"AT".to_vec()
        );
    }

    #[test]
    fn test_encode_payload_hex() {
        assert_eq!(
            encode_payload("01 02", RenderMode::Hex, Newline::Lf).unwrap(),
            vec![0x01, 0x02, 0x0a]
        );
        assert_eq!(
            encode_payload("0", RenderMode::Hex, Newline::Lf),
            Err(HexError::OddLength(1))
        );
    }
}
