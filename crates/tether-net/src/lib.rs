//! Networking module for Tether.
//!
//! This crate provides a byte-stream TCP client that splits the incoming stream
//! into delimiter-terminated messages:
//!
//! - **Connection establishment**: immediate, or bounded by a deadline with
//!   late successes discarded rather than adopted
//! - **Receive loop**: one background task per connection that polls at a
//!   fixed interval and drains everything available per tick
//! - **Framing**: messages may span any number of reads; the delimiter is a
//!   single configurable byte (default `0x13`) with no escaping
//! - **Notifications**: per-message, per-chunk, and disconnect signals,
//!   dispatched in that order
//! - **Request/reply**: write a line and wait for the next chunk
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tether_net::tcp::{TcpClient, TcpClientConfig};
//!
//! let client = TcpClient::new(TcpClientConfig::default());
//!
//! client.delimiter_data_received.connect(|msg| {
//!     println!("message: {:?}", msg.text());
//! });
//!
//! client.connect("example.com", 7000).await?;
//!
//! let reply = client
//!     .write_line_and_await_reply("STATUS", Duration::from_secs(2))
//!     .await?;
//! match reply {
//!     Some(msg) => println!("status: {}", msg.text()),
//!     None => println!("no reply"),
//! }
//!
//! client.dispose();
//! ```
//!
//! # Logging
//!
//! Events are logged through `tracing` under the targets in
//! [`tether_core::logging::targets`].

mod error;
pub mod tcp;

pub use error::{NetworkError, Result};

// Re-export commonly used types at the crate root
pub use tcp::{
    ConnectionInfo, FrameAssembler, Message, TcpClient, TcpClientConfig, TcpConnectionState,
    TcpServer, TcpServerConfig, TextEncoding,
};
