//! Delimited-message TCP client and server with signal-based event delivery.
//!
//! This module provides:
//! - **TcpClient**: Connect immediately or under a deadline, poll for data on a
//!   background task, and reassemble delimiter-terminated messages
//! - **TcpServer**: Accept incoming connections, each served by its own client
//! - **FrameAssembler**: The stateful delimiter splitter used by both
//!
//! # Client Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tether_net::tcp::{TcpClient, TcpClientConfig};
//!
//! let client = TcpClient::new(TcpClientConfig::new().delimiter(b'\n').auto_trim(true));
//!
//! client.delimiter_data_received.connect(|msg| {
//!     println!("Received line: {}", msg.text());
//! });
//!
//! client.data_received.connect(|chunk| {
//!     println!("Received {} bytes", chunk.data().len());
//! });
//!
//! client.connect_timeout("127.0.0.1", 8080, Duration::from_secs(3)).await?;
//! client.write_line("Hello, Server!").await?;
//! ```
//!
//! # Server Example
//!
//! ```ignore
//! use tether_net::tcp::{TcpServer, TcpServerConfig};
//!
//! let server = TcpServer::new(TcpServerConfig::new("0.0.0.0", 8080));
//!
//! server.client_connected.connect(|info| {
//!     println!("New connection from {}", info.peer_addr);
//! });
//!
//! server.start().await?;
//! ```

mod bus;
mod client;
mod config;
mod connection;
mod encoding;
mod establish;
mod framing;
mod message;
mod receive;
mod server;
mod state;

pub use client::TcpClient;
pub use config::{DEFAULT_DELIMITER, DEFAULT_POLL_INTERVAL, TcpClientConfig, TcpServerConfig};
pub use connection::{ConnectionId, ConnectionInfo};
pub use encoding::TextEncoding;
pub use framing::FrameAssembler;
pub use message::Message;
pub use server::TcpServer;
pub use state::{TcpConnectionState, TcpServerState};
