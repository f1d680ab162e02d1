//! The per-connection polling receive loop.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tether_core::logging::targets;
use tokio::net::tcp::OwnedReadHalf;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::bus::NotificationBus;
use super::config::TcpClientConfig;
use super::connection::{ConnectionId, Link};
use super::framing::FrameAssembler;
use super::message::MessageContext;

/// Why the loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StopReason {
    Requested,
    PeerClosed,
}

/// Bytes drained by one tick.
struct Drained {
    chunk: Vec<u8>,
    closed: bool,
}

/// Polls one connection at a fixed rate and feeds the notification bus.
///
/// Owns the read half and the carry buffer; nothing else touches either. Each
/// tick drains whatever is available into a single chunk, so one physical
/// read produces one notification batch.
pub(crate) struct ReceiveLoop {
    reader: OwnedReadHalf,
    link: Arc<Link>,
    assembler: FrameAssembler,
    context: MessageContext,
    bus: NotificationBus,
    poll_interval: Duration,
    buffer: Vec<u8>,
    flush_on_disconnect: bool,
}

impl ReceiveLoop {
    pub(crate) fn new(
        reader: OwnedReadHalf,
        link: Arc<Link>,
        bus: NotificationBus,
        config: &TcpClientConfig,
    ) -> Self {
        let context = MessageContext::new(&link, config);
        Self {
            reader,
            link,
            assembler: FrameAssembler::new(config.delimiter),
            context,
            bus,
            poll_interval: config.poll_interval,
            buffer: vec![0u8; config.read_buffer_size],
            flush_on_disconnect: config.flush_on_disconnect,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            ticker.tick().await;
            if self.link.stop_requested() {
                break StopReason::Requested;
            }
            if self.tick() {
                break StopReason::PeerClosed;
            }
        };

        self.finish(reason).await;
    }

    /// Run one poll. Returns `true` when the peer has gone away.
    fn tick(&mut self) -> bool {
        let drained = self.drain();
        let Drained { chunk, closed } = settle(drained, self.link.info().id);
        if !chunk.is_empty() {
            self.deliver(chunk);
        }
        closed
    }

    /// Read everything currently available without blocking.
    fn drain(&mut self) -> io::Result<Drained> {
        let mut chunk = Vec::new();
        loop {
            match self.reader.try_read(&mut self.buffer) {
                Ok(0) => return Ok(Drained { chunk, closed: true }),
                Ok(n) => {
                    chunk.extend_from_slice(&self.buffer[..n]);
                    if n < self.buffer.len() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if is_disconnect(&e) => return Ok(Drained { chunk, closed: true }),
                Err(e) if chunk.is_empty() => return Err(e),
                Err(e) => {
                    // Deliver what was read; the error resurfaces on the next tick.
                    tracing::debug!(target: targets::RECEIVE, error = %e, "read failed after partial chunk");
                    break;
                }
            }
        }
        Ok(Drained {
            chunk,
            closed: false,
        })
    }

    fn deliver(&mut self, chunk: Vec<u8>) {
        tracing::trace!(
            target: targets::RECEIVE,
            connection = %self.link.info().id,
            len = chunk.len(),
            "chunk received"
        );
        let frames = self
            .assembler
            .push(&chunk)
            .into_iter()
            .map(|frame| self.context.message(frame))
            .collect();
        let chunk = self.context.message(Bytes::from(chunk));
        self.bus.dispatch_chunk(frames, chunk);
    }

    async fn finish(mut self, reason: StopReason) {
        if self.flush_on_disconnect
            && let Some(rest) = self.assembler.take_carry()
        {
            self.bus.dispatch_frame(self.context.message(rest));
        }

        self.link.mark_closed();
        self.link.release().await;
        let info = self.link.info().clone();
        drop(self.reader);

        tracing::debug!(
            target: targets::RECEIVE,
            connection = %info.id,
            peer = %info.peer_addr,
            ?reason,
            "receive loop stopped"
        );
        self.bus.dispatch_disconnect(info);
    }
}

/// Absorb a failed tick: log it and carry on as if nothing was read.
fn settle(result: io::Result<Drained>, connection: ConnectionId) -> Drained {
    result.unwrap_or_else(|e| {
        tracing::warn!(
            target: targets::RECEIVE,
            %connection,
            error = %e,
            "receive tick failed"
        );
        Drained {
            chunk: Vec::new(),
            closed: false,
        }
    })
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_kinds() {
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::WouldBlock)));
    }

    #[test]
    fn test_failed_tick_keeps_loop_running() {
        let settled = settle(
            Err(io::Error::other("transient failure")),
            ConnectionId::new(),
        );
        assert!(settled.chunk.is_empty());
        assert!(!settled.closed);

        let settled = settle(
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            ConnectionId::new(),
        );
        assert!(!settled.closed);
    }

    #[test]
    fn test_successful_tick_passes_through() {
        let settled = settle(
            Ok(Drained {
                chunk: b"abc".to_vec(),
                closed: true,
            }),
            ConnectionId::new(),
        );
        assert_eq!(settled.chunk, b"abc");
        assert!(settled.closed);
    }
}
