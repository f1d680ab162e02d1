//! Text encodings used for string writes and message decoding.

use serde::{Deserialize, Serialize};

/// Encoding applied when converting between strings and wire bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    /// UTF-8. Invalid sequences decode to U+FFFD.
    #[default]
    Utf8,
    /// 7-bit ASCII. Unrepresentable characters encode as `?`.
    Ascii,
    /// ISO-8859-1. Each byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    /// Encode a string to bytes.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }

    /// Decode bytes to a string.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
            Self::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utf8 => write!(f, "UTF-8"),
            Self::Ascii => write!(f, "ASCII"),
            Self::Latin1 => write!(f, "ISO-8859-1"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_is_lossy() {
        assert_eq!(TextEncoding::Utf8.decode(b"caf\xc3\xa9"), "café");
        assert_eq!(TextEncoding::Utf8.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_ascii_replaces_unrepresentable() {
        assert_eq!(TextEncoding::Ascii.encode("café"), b"caf?");
        assert_eq!(TextEncoding::Ascii.decode(b"ok\x80"), "ok\u{FFFD}");
    }

    #[test]
    fn test_latin1_maps_bytes_to_code_points() {
        assert_eq!(TextEncoding::Latin1.encode("café"), b"caf\xe9");
        assert_eq!(TextEncoding::Latin1.decode(b"caf\xe9"), "café");
        assert_eq!(TextEncoding::Latin1.encode("\u{20ac}"), b"?");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TextEncoding::Latin1).unwrap();
        assert_eq!(json, "\"latin1\"");
        let parsed: TextEncoding = serde_json::from_str("\"ascii\"").unwrap();
        assert_eq!(parsed, TextEncoding::Ascii);
    }
}
