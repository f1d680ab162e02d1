//! Connection establishment: immediate and deadline-bounded.
//!
//! A bounded attempt runs on its own task and is raced against a timer. The
//! attempt is not aborted when the deadline wins; if it later succeeds, the
//! socket is closed and discarded rather than promoted, because the caller
//! has already seen [`NetworkError::Timeout`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tether_core::logging::targets;
use tokio::net::{TcpStream, lookup_host};
use tokio::sync::oneshot;

use crate::error::{NetworkError, Result};

/// Resolve `host:port` to a non-empty address list.
pub(crate) async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let resolution_error = |message: String| NetworkError::Resolution {
        host: host.to_string(),
        message,
    };

    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| resolution_error(e.to_string()))?
        .collect();

    if addrs.is_empty() {
        return Err(resolution_error("no addresses found".into()));
    }
    tracing::trace!(target: targets::CONNECT, host, port, addresses = ?addrs, "resolved");
    Ok(addrs)
}

/// Connect to the first address that accepts, without a deadline.
pub(crate) async fn connect_now(addrs: &[SocketAddr]) -> Result<TcpStream> {
    connect_any(addrs).await.map_err(NetworkError::connection)
}

async fn connect_any(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::trace!(target: targets::CONNECT, %addr, error = %e, "address refused");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses to connect to")
    }))
}

/// State shared between the waiting caller and the in-flight attempt.
#[derive(Default)]
struct PendingConnectState {
    timed_out: AtomicBool,
    failure: Mutex<Option<io::Error>>,
}

/// A connect attempt in flight, raced against a deadline by [`wait`](Self::wait).
pub(crate) struct PendingConnect {
    state: Arc<PendingConnectState>,
    completion: oneshot::Receiver<Option<TcpStream>>,
}

impl PendingConnect {
    /// Spawn an attempt over `addrs` on the current runtime.
    pub(crate) fn start(addrs: Vec<SocketAddr>) -> Self {
        Self::spawn(async move { connect_any(&addrs).await })
    }

    /// Spawn an arbitrary attempt. The completion channel fires once it
    /// resolves, whatever the outcome.
    fn spawn<F>(attempt: F) -> Self
    where
        F: Future<Output = io::Result<TcpStream>> + Send + 'static,
    {
        let state = Arc::new(PendingConnectState::default());
        let (done_tx, done_rx) = oneshot::channel();

        let task_state = state.clone();
        tokio::spawn(async move {
            match attempt.await {
                Ok(stream) => {
                    if task_state.timed_out.load(Ordering::SeqCst) {
                        discard_late(stream);
                        return;
                    }
                    // The caller may give up between the check and the send.
                    if let Err(Some(stream)) = done_tx.send(Some(stream)) {
                        discard_late(stream);
                    }
                }
                Err(e) => {
                    *task_state.failure.lock() = Some(e);
                    let _ = done_tx.send(None);
                }
            }
        });

        Self {
            state,
            completion: done_rx,
        }
    }

    /// Wait up to `timeout` for the attempt to finish.
    ///
    /// Results are read only after the completion channel fires, so the
    /// attempt has fully finished before its outcome is inspected.
    pub(crate) async fn wait(self, timeout: Duration) -> Result<TcpStream> {
        let Self {
            state,
            mut completion,
        } = self;

        if timeout.is_zero() {
            state.timed_out.store(true, Ordering::SeqCst);
            return Err(NetworkError::Timeout);
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let outcome = tokio::select! {
            biased;
            outcome = &mut completion => outcome,
            () = &mut deadline => {
                state.timed_out.store(true, Ordering::SeqCst);
                tracing::debug!(target: targets::CONNECT, ?timeout, "connect deadline elapsed");
                return Err(NetworkError::Timeout);
            }
        };

        match outcome {
            Ok(Some(stream)) => Ok(stream),
            Ok(None) | Err(_) => Err(state
                .failure
                .lock()
                .take()
                .map(NetworkError::connection)
                .unwrap_or_else(|| NetworkError::connection_failed("connection attempt failed"))),
        }
    }
}

fn discard_late(stream: TcpStream) {
    tracing::debug!(
        target: targets::CONNECT,
        peer = ?stream.peer_addr().ok(),
        "discarding connection that completed after the deadline"
    );
    drop(stream);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addrs = resolve("127.0.0.1", 80).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:80".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_connect_any_reports_last_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect_now(&[addr]).await.unwrap_err();
        assert!(matches!(err, NetworkError::Connection { source: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_zero_timeout_discards_late_success() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let pending = PendingConnect::start(vec![addr]);
        let state = pending.state.clone();
        let err = pending.wait(Duration::ZERO).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(state.timed_out.load(Ordering::SeqCst));

        // The attempt still completes at the TCP level, then is closed.
        let (mut accepted, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1];
        let n = tokio::io::AsyncReadExt::read(&mut accepted, &mut buf)
            .await
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_deadline_wins_over_stalled_attempt() {
        let pending = PendingConnect::spawn(std::future::pending());
        let state = pending.state.clone();

        let started = tokio::time::Instant::now();
        let err = pending.wait(Duration::from_millis(50)).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(state.timed_out.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_success_after_nonzero_deadline_is_discarded() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let pending = PendingConnect::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            TcpStream::connect(addr).await
        });
        let err = pending.wait(Duration::from_millis(20)).await.unwrap_err();
        assert!(err.is_timeout());

        let (mut accepted, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1];
        let n = tokio::io::AsyncReadExt::read(&mut accepted, &mut buf)
            .await
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_failure_before_deadline_is_connection_error() {
        let pending = PendingConnect::spawn(async {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        });
        let err = pending.wait(Duration::from_secs(5)).await.unwrap_err();

        assert!(!err.is_timeout());
        assert!(matches!(err, NetworkError::Connection { source: Some(_), .. }));
    }
}
