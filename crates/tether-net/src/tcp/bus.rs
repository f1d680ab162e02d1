//! Ordered dispatch of receive-side events.

use std::sync::Arc;

use tether_core::Signal;
use tether_core::logging::targets;

use super::connection::ConnectionInfo;
use super::message::Message;

/// The three subscriber sets of a connection, shared with its receive loop.
///
/// For each chunk, all delimited messages are dispatched first (in the order
/// they were reassembled), then exactly one raw-chunk event. The disconnect
/// event comes after the last chunk of the connection. A panicking slot is
/// logged; the other slots of the same signal still receive the event, and
/// later events are still dispatched.
#[derive(Clone)]
pub(crate) struct NotificationBus {
    pub(crate) delimiter_data_received: Arc<Signal<Message>>,
    pub(crate) data_received: Arc<Signal<Message>>,
    pub(crate) disconnected: Arc<Signal<ConnectionInfo>>,
}

impl NotificationBus {
    pub(crate) fn new() -> Self {
        Self {
            delimiter_data_received: Arc::new(Signal::new()),
            data_received: Arc::new(Signal::new()),
            disconnected: Arc::new(Signal::new()),
        }
    }

    /// Dispatch everything produced by one physical read.
    pub(crate) fn dispatch_chunk(&self, frames: Vec<Message>, chunk: Message) {
        for frame in frames {
            emit_isolated(&self.delimiter_data_received, frame, "delimiter_data_received");
        }
        emit_isolated(&self.data_received, chunk, "data_received");
    }

    /// Dispatch a single delimited message outside a chunk batch.
    pub(crate) fn dispatch_frame(&self, frame: Message) {
        emit_isolated(&self.delimiter_data_received, frame, "delimiter_data_received");
    }

    pub(crate) fn dispatch_disconnect(&self, info: ConnectionInfo) {
        emit_isolated(&self.disconnected, info, "disconnected");
    }
}

fn emit_isolated<Args: 'static>(signal: &Signal<Args>, args: Args, name: &'static str) {
    let panicked = signal.emit_isolated(args);
    if panicked > 0 {
        tracing::warn!(target: targets::RECEIVE, signal = name, panicked, "subscribers panicked during dispatch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::config::TcpClientConfig;
    use crate::tcp::message::MessageContext;
    use bytes::Bytes;
    use parking_lot::Mutex;

    fn record(bus: &NotificationBus) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_clone = log.clone();
        bus.delimiter_data_received.connect(move |m: &Message| {
            log_clone.lock().push(format!("frame:{}", m.text()));
        });
        let log_clone = log.clone();
        bus.data_received.connect(move |m: &Message| {
            log_clone.lock().push(format!("chunk:{}", m.text()));
        });

        log
    }

    #[test]
    fn test_frames_before_chunk() {
        let bus = NotificationBus::new();
        let log = record(&bus);
        let context = MessageContext::detached(&TcpClientConfig::new());

        bus.dispatch_chunk(
            vec![
                context.message(Bytes::from_static(b"a")),
                context.message(Bytes::from_static(b"b")),
            ],
            context.message(Bytes::from_static(b"a;b;c")),
        );

        assert_eq!(*log.lock(), vec!["frame:a", "frame:b", "chunk:a;b;c"]);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus = NotificationBus::new();
        bus.delimiter_data_received.connect(|_| panic!("boom"));
        let log = record(&bus);
        let context = MessageContext::detached(&TcpClientConfig::new());

        bus.dispatch_chunk(
            vec![context.message(Bytes::from_static(b"x"))],
            context.message(Bytes::from_static(b"x")),
        );

        assert_eq!(*log.lock(), vec!["frame:x", "chunk:x"]);
    }
}
