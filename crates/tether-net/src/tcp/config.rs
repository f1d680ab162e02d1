//! Configuration types for TCP client and server.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::encoding::TextEncoding;

/// Default message delimiter byte.
pub const DEFAULT_DELIMITER: u8 = 0x13;

/// Default interval between receive-loop polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for a delimited TCP client connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpClientConfig {
    /// Encoding for string writes and decoded message text.
    pub encoding: TextEncoding,
    /// Byte that terminates each message.
    pub delimiter: u8,
    /// Trim whitespace and the delimiter from decoded message text.
    pub auto_trim: bool,
    /// How often the receive loop polls the connection.
    pub poll_interval: Duration,
    /// Read buffer size in bytes.
    pub read_buffer_size: usize,
    /// Enable TCP_NODELAY (disable Nagle's algorithm).
    pub no_delay: bool,
    /// Emit the unterminated carry as a final message when the connection ends.
    pub flush_on_disconnect: bool,
}

impl Default for TcpClientConfig {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            delimiter: DEFAULT_DELIMITER,
            auto_trim: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_buffer_size: 8192,
            no_delay: false,
            flush_on_disconnect: false,
        }
    }
}

impl TcpClientConfig {
    /// Create a new client configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text encoding.
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the delimiter byte.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Enable or disable auto-trim of decoded text.
    pub fn auto_trim(mut self, enabled: bool) -> Self {
        self.auto_trim = enabled;
        self
    }

    /// Set the receive-loop polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Enable or disable TCP_NODELAY.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }

    /// Flush the unterminated carry as a final message on disconnect.
    pub fn flush_on_disconnect(mut self, enabled: bool) -> Self {
        self.flush_on_disconnect = enabled;
        self
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.read_buffer_size == 0 {
            return Err(crate::NetworkError::InvalidArgument(
                "read buffer size must be non-zero".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(crate::NetworkError::InvalidArgument(
                "poll interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for a TCP server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpServerConfig {
    /// The address to bind to.
    pub bind_address: String,
    /// The port to listen on.
    pub port: u16,
    /// Settings applied to each accepted connection.
    #[serde(default)]
    pub client: TcpClientConfig,
}

impl TcpServerConfig {
    /// Create a new server configuration.
    pub fn new(bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            bind_address: bind_address.into(),
            port,
            client: TcpClientConfig::default(),
        }
    }

    /// Set the configuration for accepted connections.
    pub fn client_config(mut self, config: TcpClientConfig) -> Self {
        self.client = config;
        self
    }

    /// Set the delimiter byte for accepted connections.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.client.delimiter = delimiter;
        self
    }

    /// Enable TCP_NODELAY for accepted connections.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.client.no_delay = enabled;
        self
    }

    /// Get the bind address string (address:port).
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let config = TcpClientConfig::default();
        assert_eq!(config.delimiter, 0x13);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.encoding, TextEncoding::Utf8);
        assert!(!config.auto_trim);
        assert!(!config.flush_on_disconnect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_builder() {
        let config = TcpClientConfig::new()
            .delimiter(b'\n')
            .auto_trim(true)
            .encoding(TextEncoding::Latin1)
            .poll_interval(Duration::from_millis(5))
            .read_buffer_size(1024)
            .no_delay(true);

        assert_eq!(config.delimiter, b'\n');
        assert!(config.auto_trim);
        assert_eq!(config.encoding, TextEncoding::Latin1);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.read_buffer_size, 1024);
        assert!(config.no_delay);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        assert!(TcpClientConfig::new().read_buffer_size(0).validate().is_err());
        assert!(
            TcpClientConfig::new()
                .poll_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_server_config_builder() {
        let config = TcpServerConfig::new("0.0.0.0", 9000)
            .delimiter(b'\n')
            .no_delay(true);

        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.client.delimiter, b'\n');
        assert!(config.client.no_delay);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: TcpClientConfig =
            serde_json::from_str(r#"{ "delimiter": 10, "auto_trim": true }"#).unwrap();
        assert_eq!(config.delimiter, b'\n');
        assert!(config.auto_trim);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);

        let server: TcpServerConfig =
            serde_json::from_str(r#"{ "bind_address": "127.0.0.1", "port": 7000 }"#).unwrap();
        assert_eq!(server.client, TcpClientConfig::default());
    }
}
