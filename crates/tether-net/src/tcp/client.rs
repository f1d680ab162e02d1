//! TCP client with delimiter framing and signal-based event delivery.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tether_core::Signal;
use tether_core::logging::targets;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use super::bus::NotificationBus;
use super::config::TcpClientConfig;
use super::connection::{ConnectionInfo, Link};
use super::establish::{self, PendingConnect};
use super::message::{Message, encode_line};
use super::receive::ReceiveLoop;
use super::state::TcpConnectionState;
use crate::Result;
use crate::error::NetworkError;

/// A TCP client that reassembles delimiter-terminated messages.
///
/// Once connected, a background task polls the connection at the configured
/// interval. Each read is split into messages at the delimiter byte, and the
/// client emits signals for every message, every raw chunk, and the eventual
/// disconnect.
///
/// The client requires a Tokio runtime.
///
/// # Signals
///
/// - [`delimiter_data_received`](Self::delimiter_data_received): Emitted once per delimited message
/// - [`data_received`](Self::data_received): Emitted once per raw chunk, after that chunk's messages
/// - [`disconnected`](Self::disconnected): Emitted once when the connection ends
///
/// # Example
///
/// ```ignore
/// let client = TcpClient::new(TcpClientConfig::new().delimiter(b'\n'));
///
/// client.delimiter_data_received.connect(|msg| println!("line: {}", msg.text()));
/// client.disconnected.connect(|info| println!("{} closed", info.peer_addr));
///
/// client.connect_timeout("127.0.0.1", 8080, Duration::from_secs(5)).await?;
/// client.write_line("hello").await?;
///
/// if let Some(reply) = client.write_line_and_await_reply("ping", Duration::from_secs(1)).await? {
///     println!("reply: {}", reply.text());
/// }
/// ```
pub struct TcpClient {
    config: TcpClientConfig,
    link: Mutex<Option<Arc<Link>>>,
    connecting: AtomicBool,
    disposed: AtomicBool,
    bus: NotificationBus,

    /// Signal emitted for each delimiter-terminated message.
    pub delimiter_data_received: Arc<Signal<Message>>,
    /// Signal emitted for each raw chunk read from the connection.
    pub data_received: Arc<Signal<Message>>,
    /// Signal emitted when the connection is closed.
    pub disconnected: Arc<Signal<ConnectionInfo>>,
}

/// Clears the in-progress flag when a connect call returns.
struct ConnectAttempt<'a>(&'a AtomicBool);

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TcpClient {
    /// Create a new TCP client with the given configuration.
    pub fn new(config: TcpClientConfig) -> Self {
        let bus = NotificationBus::new();
        Self {
            config,
            link: Mutex::new(None),
            connecting: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            delimiter_data_received: bus.delimiter_data_received.clone(),
            data_received: bus.data_received.clone(),
            disconnected: bus.disconnected.clone(),
            bus,
        }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &TcpClientConfig {
        &self.config
    }

    /// Get the current connection state.
    pub fn state(&self) -> TcpConnectionState {
        if self.disposed.load(Ordering::SeqCst) {
            TcpConnectionState::Disposed
        } else if self.is_connected() {
            TcpConnectionState::Connected
        } else if self.connecting.load(Ordering::SeqCst) {
            TcpConnectionState::Connecting
        } else {
            TcpConnectionState::Disconnected
        }
    }

    /// Check if the client has a live connection.
    pub fn is_connected(&self) -> bool {
        self.link
            .lock()
            .as_ref()
            .is_some_and(|link| link.is_connected())
    }

    /// Describe the current connection, if any.
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.link.lock().as_ref().map(|link| link.info().clone())
    }

    /// Connect immediately, trying each resolved address in turn.
    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        let _attempt = self.begin_connect(host)?;
        let addrs = establish::resolve(host, port).await?;
        let stream = establish::connect_now(&addrs).await?;
        self.adopt(stream, host, port)
    }

    /// Connect, failing with [`NetworkError::Timeout`] if the handshake does
    /// not finish within `timeout`.
    ///
    /// Resolution happens before the deadline starts. A handshake that
    /// completes after the deadline is closed and never becomes this client's
    /// connection.
    pub async fn connect_timeout(&self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        let _attempt = self.begin_connect(host)?;
        let addrs = establish::resolve(host, port).await?;
        let stream = PendingConnect::start(addrs).wait(timeout).await?;
        self.adopt(stream, host, port)
    }

    /// Adopt an already-connected stream, e.g. one accepted by a listener.
    pub fn attach(&self, stream: TcpStream) -> Result<()> {
        let peer: SocketAddr = stream.peer_addr().map_err(NetworkError::connection)?;
        let host = peer.ip().to_string();
        let _attempt = self.begin_connect(&host)?;
        self.adopt(stream, &host, peer.port())
    }

    fn begin_connect(&self, host: &str) -> Result<ConnectAttempt<'_>> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(NetworkError::Disposed);
        }
        if host.trim().is_empty() {
            return Err(NetworkError::InvalidArgument("host name must not be empty".into()));
        }
        self.config.validate()?;
        if let Some(link) = self.link.lock().as_ref()
            && link.is_connected()
        {
            let info = link.info();
            return Err(NetworkError::AlreadyConnected(format!("{}:{}", info.host, info.port)));
        }
        if self.connecting.swap(true, Ordering::SeqCst) {
            return Err(NetworkError::InvalidArgument(
                "a connect call is already in progress".into(),
            ));
        }
        Ok(ConnectAttempt(&self.connecting))
    }

    /// Make `stream` the live connection and start its receive loop.
    fn adopt(&self, stream: TcpStream, host: &str, port: u16) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(NetworkError::Disposed);
        }
        if let Err(e) = stream.set_nodelay(self.config.no_delay) {
            tracing::warn!(target: targets::CONNECT, error = %e, "failed to set TCP_NODELAY");
        }

        let (link, reader) = Link::open(stream, host, port)?;
        ReceiveLoop::new(reader, link.clone(), self.bus.clone(), &self.config).spawn();

        tracing::debug!(
            target: targets::CONNECT,
            connection = %link.info().id,
            peer = %link.info().peer_addr,
            "connected"
        );
        *self.link.lock() = Some(link.clone());

        // Lost a race with dispose().
        if self.disposed.load(Ordering::SeqCst) {
            self.disconnect();
            return Err(NetworkError::Disposed);
        }
        Ok(())
    }

    fn live_link(&self) -> Result<Arc<Link>> {
        self.link
            .lock()
            .as_ref()
            .filter(|link| link.is_connected())
            .cloned()
            .ok_or(NetworkError::NotConnected)
    }

    /// Send raw bytes.
    pub async fn write(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.live_link()?.write(data.as_ref()).await
    }

    /// Send a string using the configured encoding.
    pub async fn write_str(&self, text: &str) -> Result<()> {
        self.write(self.config.encoding.encode(text)).await
    }

    /// Send a string followed by the delimiter, unless it already ends with it.
    pub async fn write_line(&self, text: &str) -> Result<()> {
        self.write(self.line_bytes(text)).await
    }

    /// Send a line and wait up to `timeout` for the next raw chunk.
    ///
    /// Returns `Ok(None)` if nothing arrives in time. The reply is whatever
    /// chunk arrives next, so this is only meaningful when requests and
    /// replies strictly alternate with one request outstanding.
    pub async fn write_line_and_await_reply(
        &self,
        text: &str,
        timeout: Duration,
    ) -> Result<Option<Message>> {
        let link = self.live_link()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let reply_tx = Mutex::new(Some(reply_tx));
        // Subscribed before writing so a fast reply is not missed.
        let _subscription = self.data_received.connect_scoped(move |message: &Message| {
            if let Some(tx) = reply_tx.lock().take() {
                let _ = tx.send(message.clone());
            }
        });

        link.write(&self.line_bytes(text)).await?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(message)) => Ok(Some(message)),
            Ok(Err(_)) | Err(_) => Ok(None),
        }
    }

    fn line_bytes(&self, text: &str) -> Vec<u8> {
        encode_line(self.config.encoding, self.config.delimiter, text)
    }

    /// Close the connection. Safe to call repeatedly or when never connected.
    ///
    /// The receive loop observes the request on its next tick, releases the
    /// socket, and emits [`disconnected`](Self::disconnected).
    pub fn disconnect(&self) {
        if let Some(link) = self.link.lock().take() {
            link.request_stop();
            tracing::debug!(target: targets::CONNECT, connection = %link.info().id, "disconnect requested");
        }
    }

    /// Release the connection and prevent further connects. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disconnect();
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("connection", &self.connection_info())
            .field("state", &self.state())
            .finish()
    }
}
