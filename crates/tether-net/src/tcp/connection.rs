//! The live connection owned by a client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex as AsyncMutex, watch};

use crate::error::{NetworkError, Result};

/// Unique identifier for a TCP connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Read-only description of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Host name the connection was opened for.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Remote socket address.
    pub peer_addr: SocketAddr,
    /// Local socket address.
    pub local_addr: SocketAddr,
}

/// A connected byte stream.
///
/// The read half is handed to the receive loop at construction; the write half
/// stays here so the caller is the only writer. The link is closed
/// cooperatively: [`request_stop`](Self::request_stop) marks it closed and the
/// receive loop releases the socket on its next tick. Closing also abandons
/// any write still in flight, so a peer that stops reading cannot hold the
/// writer past the close.
pub(crate) struct Link {
    info: ConnectionInfo,
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    stop: AtomicBool,
    connected: AtomicBool,
    closing: watch::Sender<bool>,
}

impl Link {
    /// Wrap a connected stream, returning the link and the read half.
    pub(crate) fn open(
        stream: TcpStream,
        host: impl Into<String>,
        port: u16,
    ) -> Result<(Arc<Self>, OwnedReadHalf)> {
        let peer_addr = stream.peer_addr().map_err(NetworkError::connection)?;
        let local_addr = stream.local_addr().map_err(NetworkError::connection)?;
        let (reader, writer) = stream.into_split();

        let link = Arc::new(Self {
            info: ConnectionInfo {
                id: ConnectionId::new(),
                host: host.into(),
                port,
                peer_addr,
                local_addr,
            },
            writer: AsyncMutex::new(Some(writer)),
            stop: AtomicBool::new(false),
            connected: AtomicBool::new(true),
            closing: watch::Sender::new(false),
        });

        Ok((link, reader))
    }

    pub(crate) fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Ask the receive loop to stop. Idempotent.
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.mark_closed();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closing.send_replace(true);
    }

    /// Write all bytes to the peer.
    ///
    /// Fails with [`NetworkError::NotConnected`] if the link closes while
    /// waiting for the writer or while the bytes are still being sent.
    pub(crate) async fn write(&self, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(NetworkError::NotConnected);
        }
        let mut closing = self.closing.subscribe();

        let mut guard = tokio::select! {
            guard = self.writer.lock() => guard,
            () = closed(&mut closing) => return Err(NetworkError::NotConnected),
        };
        let writer = guard.as_mut().ok_or(NetworkError::NotConnected)?;

        tokio::select! {
            result = async {
                writer.write_all(data).await?;
                writer.flush().await
            } => result.map_err(NetworkError::from),
            () = closed(&mut closing) => {
                tracing::debug!(
                    target: tether_core::logging::targets::RECEIVE,
                    connection = %self.info.id,
                    "write abandoned by close"
                );
                Err(NetworkError::NotConnected)
            }
        }
    }

    /// Shut down and drop the write half. Failures are ignored.
    pub(crate) async fn release(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer
            && let Err(e) = writer.shutdown().await
        {
            tracing::debug!(
                target: tether_core::logging::targets::RECEIVE,
                connection = %self.info.id,
                error = %e,
                "ignoring shutdown failure"
            );
        }
    }
}

/// Resolves once the link has been marked closed.
async fn closed(closing: &mut watch::Receiver<bool>) {
    let _ = closing.wait_for(|closed| *closed).await;
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.info.id)
            .field("peer_addr", &self.info.peer_addr)
            .field("is_connected", &self.is_connected())
            .finish()
    }
}
