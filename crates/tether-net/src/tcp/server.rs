//! TCP server that hands each accepted stream to its own [`TcpClient`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tether_core::Signal;
use tether_core::logging::targets;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::client::TcpClient;
use super::config::TcpServerConfig;
use super::connection::{ConnectionId, ConnectionInfo};
use super::message::{Message, encode_line};
use super::state::TcpServerState;
use crate::error::{NetworkError, Result};

/// Internal state for the TCP server.
struct TcpServerInner {
    state: TcpServerState,
    clients: HashMap<ConnectionId, Arc<TcpClient>>,
    local_addr: Option<SocketAddr>,
}

/// Command sent to the TCP server's accept task.
enum ServerCommand {
    Stop,
    DisconnectClient(ConnectionId),
}

/// A TCP server with signal-based event delivery.
///
/// Every accepted connection is wrapped in a [`TcpClient`] built from the
/// server's client configuration, so accepted connections get the same
/// polling, framing, and dispatch as outgoing ones. Their events are
/// forwarded to the server's signals; messages carry a back-reference, so
/// handlers can answer with [`Message::reply_line`].
///
/// # Signals
///
/// - [`client_connected`](Self::client_connected): Emitted when a client connects
/// - [`client_disconnected`](Self::client_disconnected): Emitted when a client disconnects
/// - [`delimiter_data_received`](Self::delimiter_data_received): Emitted per delimited message from any client
/// - [`data_received`](Self::data_received): Emitted per raw chunk from any client
///
/// # Example
///
/// ```ignore
/// let server = TcpServer::new(TcpServerConfig::new("127.0.0.1", 0).delimiter(b'\n'));
///
/// server.delimiter_data_received.connect(|msg| {
///     let msg = msg.clone();
///     tokio::spawn(async move {
///         let _ = msg.reply_line(&msg.text()).await;
///     });
/// });
///
/// let addr = server.start().await?;
/// ```
pub struct TcpServer {
    config: TcpServerConfig,
    inner: Arc<Mutex<TcpServerInner>>,
    command_tx: Arc<Mutex<Option<mpsc::UnboundedSender<ServerCommand>>>>,
    is_running: Arc<AtomicBool>,

    /// Signal emitted when a new client connects.
    pub client_connected: Arc<Signal<ConnectionInfo>>,
    /// Signal emitted when a client disconnects.
    pub client_disconnected: Arc<Signal<ConnectionInfo>>,
    /// Signal emitted for each delimited message from any client.
    pub delimiter_data_received: Arc<Signal<Message>>,
    /// Signal emitted for each raw chunk from any client.
    pub data_received: Arc<Signal<Message>>,
}

impl TcpServer {
    /// Create a new TCP server with the given configuration.
    pub fn new(config: TcpServerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(TcpServerInner {
                state: TcpServerState::Stopped,
                clients: HashMap::new(),
                local_addr: None,
            })),
            command_tx: Arc::new(Mutex::new(None)),
            is_running: Arc::new(AtomicBool::new(false)),
            client_connected: Arc::new(Signal::new()),
            client_disconnected: Arc::new(Signal::new()),
            delimiter_data_received: Arc::new(Signal::new()),
            data_received: Arc::new(Signal::new()),
        }
    }

    /// Get the current server state.
    pub fn state(&self) -> TcpServerState {
        self.inner.lock().state
    }

    /// Check if the server is listening.
    pub fn is_listening(&self) -> bool {
        self.inner.lock().state == TcpServerState::Listening
    }

    /// Get the number of connected clients.
    pub fn connected_clients_count(&self) -> usize {
        self.inner.lock().clients.len()
    }

    /// Describe all connected clients.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.inner
            .lock()
            .clients
            .values()
            .filter_map(|client| client.connection_info())
            .collect()
    }

    /// Bind and start accepting connections.
    ///
    /// Returns the bound address, which is useful when binding to port 0. If
    /// the server is already running, returns the existing address.
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return self.local_addr().ok_or_else(|| {
                NetworkError::InvalidArgument("server is already starting".into())
            });
        }

        let bind_addr = self.config.bind_addr();
        let bound = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.is_running.store(false, Ordering::SeqCst);
                return Err(NetworkError::Bind {
                    address: bind_addr,
                    source: Arc::new(e),
                });
            }
        };

        let (tx, rx) = mpsc::unbounded_channel::<ServerCommand>();
        *self.command_tx.lock() = Some(tx);
        {
            let mut guard = self.inner.lock();
            guard.state = TcpServerState::Listening;
            guard.local_addr = Some(local_addr);
        }
        tracing::debug!(target: targets::SERVER, %local_addr, "listening");

        let accept_loop = AcceptLoop {
            listener,
            commands: rx,
            config: self.config.clone(),
            inner: self.inner.clone(),
            command_tx: self.command_tx.clone(),
            is_running: self.is_running.clone(),
            client_connected: self.client_connected.clone(),
            client_disconnected: self.client_disconnected.clone(),
            delimiter_data_received: self.delimiter_data_received.clone(),
            data_received: self.data_received.clone(),
        };
        tokio::spawn(accept_loop.run());

        Ok(local_addr)
    }

    /// Stop the server and disconnect all clients.
    pub fn stop(&self) {
        if let Some(tx) = self.command_tx.lock().as_ref() {
            let _ = tx.send(ServerCommand::Stop);
        }
    }

    /// Disconnect a specific client.
    pub fn disconnect_client(&self, id: ConnectionId) {
        if let Some(tx) = self.command_tx.lock().as_ref() {
            let _ = tx.send(ServerCommand::DisconnectClient(id));
        }
    }

    /// Send raw bytes to every connected client.
    ///
    /// Returns the number of clients the data was written to.
    pub async fn broadcast(&self, data: impl AsRef<[u8]>) -> usize {
        let clients: Vec<Arc<TcpClient>> = self.inner.lock().clients.values().cloned().collect();
        let mut delivered = 0;
        for client in clients {
            match client.write(data.as_ref()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(target: targets::SERVER, error = %e, "broadcast write failed");
                }
            }
        }
        delivered
    }

    /// Send a line to every connected client, appending the delimiter if absent.
    pub async fn broadcast_line(&self, text: &str) -> usize {
        let client = &self.config.client;
        self.broadcast(encode_line(client.encoding, client.delimiter, text))
            .await
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> String {
        self.config.bind_addr()
    }

    /// Get the actual local address after the server has started.
    ///
    /// Returns `None` if the server is not listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().local_addr
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("bind_addr", &self.config.bind_addr())
            .field("state", &self.state())
            .field("clients", &self.connected_clients_count())
            .finish()
    }
}

/// The accept task and everything it shares with the server handle.
struct AcceptLoop {
    listener: TcpListener,
    commands: mpsc::UnboundedReceiver<ServerCommand>,
    config: TcpServerConfig,
    inner: Arc<Mutex<TcpServerInner>>,
    command_tx: Arc<Mutex<Option<mpsc::UnboundedSender<ServerCommand>>>>,
    is_running: Arc<AtomicBool>,
    client_connected: Arc<Signal<ConnectionInfo>>,
    client_disconnected: Arc<Signal<ConnectionInfo>>,
    delimiter_data_received: Arc<Signal<Message>>,
    data_received: Arc<Signal<Message>>,
}

impl AcceptLoop {
    async fn run(mut self) {
        let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<ConnectionId>();

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(ServerCommand::Stop) | None => break,
                        Some(ServerCommand::DisconnectClient(id)) => {
                            if let Some(client) = self.inner.lock().clients.get(&id) {
                                client.disconnect();
                            }
                        }
                    }
                }

                Some(id) = closed_rx.recv() => {
                    self.inner.lock().clients.remove(&id);
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let client = Arc::new(TcpClient::new(self.config.client.clone()));
                            self.forward(&client, closed_tx.clone());
                            if let Err(e) = client.attach(stream) {
                                tracing::warn!(target: targets::SERVER, %peer_addr, error = %e, "failed to adopt accepted stream");
                                continue;
                            }
                            let Some(info) = client.connection_info() else {
                                continue;
                            };
                            self.inner.lock().clients.insert(info.id, client);
                            tracing::debug!(target: targets::SERVER, connection = %info.id, %peer_addr, "client connected");
                            self.client_connected.emit_isolated(info);
                        }
                        Err(e) => {
                            tracing::warn!(target: targets::SERVER, error = %e, "accept failed");
                        }
                    }
                }
            }
        }

        self.shutdown();
    }

    /// Route a client's events to the server-wide signals.
    fn forward(&self, client: &TcpClient, closed_tx: mpsc::UnboundedSender<ConnectionId>) {
        let delimited = self.delimiter_data_received.clone();
        client
            .delimiter_data_received
            .connect(move |message| {
                delimited.emit_isolated(message.clone());
            });

        let raw = self.data_received.clone();
        client
            .data_received
            .connect(move |message| {
                raw.emit_isolated(message.clone());
            });

        let disconnected = self.client_disconnected.clone();
        client.disconnected.connect(move |info| {
            let _ = closed_tx.send(info.id);
            disconnected.emit_isolated(info.clone());
        });
    }

    fn shutdown(self) {
        let clients: Vec<Arc<TcpClient>> = {
            let mut guard = self.inner.lock();
            guard.state = TcpServerState::Stopping;
            guard.clients.drain().map(|(_, client)| client).collect()
        };
        for client in clients {
            client.dispose();
        }

        *self.command_tx.lock() = None;
        {
            let mut guard = self.inner.lock();
            guard.state = TcpServerState::Stopped;
            guard.local_addr = None;
        }
        self.is_running.store(false, Ordering::SeqCst);
        tracing::debug!(target: targets::SERVER, "server stopped");
    }
}
