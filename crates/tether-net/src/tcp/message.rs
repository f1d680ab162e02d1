//! Messages delivered to subscribers.

use std::sync::{Arc, Weak};

use bytes::Bytes;

use super::config::TcpClientConfig;
use super::connection::{ConnectionInfo, Link};
use super::encoding::TextEncoding;
use crate::error::{NetworkError, Result};

/// A received message: either one delimited frame or one raw chunk.
///
/// Holds a non-owning reference to the connection it arrived on, so handlers
/// can reply while the connection is alive without keeping it open.
#[derive(Clone)]
pub struct Message {
    data: Bytes,
    origin: Weak<Link>,
    encoding: TextEncoding,
    delimiter: u8,
    auto_trim: bool,
}

impl Message {
    /// The raw payload bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The payload decoded with the configured encoding.
    ///
    /// With auto-trim enabled, leading and trailing whitespace and delimiter
    /// characters are removed.
    pub fn text(&self) -> String {
        let text = self.encoding.decode(&self.data);
        if !self.auto_trim {
            return text;
        }
        let delimiter = char::from(self.delimiter);
        text.trim_matches(|c: char| c.is_whitespace() || c == delimiter)
            .to_string()
    }

    /// The encoding used by [`text`](Self::text).
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// The delimiter byte of the originating connection.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Whether auto-trim applies to [`text`](Self::text).
    pub fn auto_trim(&self) -> bool {
        self.auto_trim
    }

    /// Describe the originating connection, if it still exists.
    pub fn connection(&self) -> Option<ConnectionInfo> {
        self.origin.upgrade().map(|link| link.info().clone())
    }

    /// Write raw bytes back to the originating connection.
    pub async fn reply(&self, data: impl AsRef<[u8]>) -> Result<()> {
        let link = self.origin.upgrade().ok_or(NetworkError::NotConnected)?;
        link.write(data.as_ref()).await
    }

    /// Write a line back, appending the delimiter if absent.
    pub async fn reply_line(&self, text: &str) -> Result<()> {
        let line = encode_line(self.encoding, self.delimiter, text);
        self.reply(line).await
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("data", &self.data)
            .field("encoding", &self.encoding)
            .field("delimiter", &self.delimiter)
            .field("auto_trim", &self.auto_trim)
            .finish_non_exhaustive()
    }
}

/// Per-connection settings stamped onto every message.
#[derive(Clone)]
pub(crate) struct MessageContext {
    origin: Weak<Link>,
    encoding: TextEncoding,
    delimiter: u8,
    auto_trim: bool,
}

impl MessageContext {
    pub(crate) fn new(origin: &Arc<Link>, config: &TcpClientConfig) -> Self {
        Self {
            origin: Arc::downgrade(origin),
            encoding: config.encoding,
            delimiter: config.delimiter,
            auto_trim: config.auto_trim,
        }
    }

    /// A context with no connection behind it.
    #[cfg(test)]
    pub(crate) fn detached(config: &TcpClientConfig) -> Self {
        Self {
            origin: Weak::new(),
            encoding: config.encoding,
            delimiter: config.delimiter,
            auto_trim: config.auto_trim,
        }
    }

    pub(crate) fn message(&self, data: Bytes) -> Message {
        Message {
            data,
            origin: self.origin.clone(),
            encoding: self.encoding,
            delimiter: self.delimiter,
            auto_trim: self.auto_trim,
        }
    }
}

/// Encode `text` and terminate it with `delimiter` unless it already ends with it.
pub(crate) fn encode_line(encoding: TextEncoding, delimiter: u8, text: &str) -> Vec<u8> {
    let mut bytes = encoding.encode(text);
    if bytes.last() != Some(&delimiter) {
        bytes.push(delimiter);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(config: &TcpClientConfig, data: &'static [u8]) -> Message {
        MessageContext::detached(config).message(Bytes::from_static(data))
    }

    #[test]
    fn test_text_without_trim() {
        let config = TcpClientConfig::new();
        assert_eq!(message(&config, b"  hi \n").text(), "  hi \n");
    }

    #[test]
    fn test_text_with_trim() {
        let config = TcpClientConfig::new().auto_trim(true);
        assert_eq!(message(&config, b" \x13hi there\x13 \r\n").text(), "hi there");
    }

    #[test]
    fn test_text_uses_encoding() {
        let config = TcpClientConfig::new().encoding(TextEncoding::Latin1);
        assert_eq!(message(&config, b"caf\xe9").text(), "café");
    }

    #[tokio::test]
    async fn test_detached_reply_fails() {
        let config = TcpClientConfig::new();
        let msg = message(&config, b"x");
        assert!(msg.connection().is_none());
        assert!(matches!(msg.reply(b"y").await, Err(NetworkError::NotConnected)));
    }

    #[test]
    fn test_encode_line_appends_delimiter_once() {
        assert_eq!(encode_line(TextEncoding::Utf8, b'\n', "ping"), b"ping\n");
        assert_eq!(encode_line(TextEncoding::Utf8, b'\n', "ping\n"), b"ping\n");
        assert_eq!(encode_line(TextEncoding::Utf8, 0x13, ""), b"\x13");
    }
}
