//! State enums for TCP clients and servers.

/// Current state of a TCP client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TcpConnectionState {
    /// Not connected to any peer.
    #[default]
    Disconnected,
    /// A connect call is in progress.
    Connecting,
    /// Connected and ready to send/receive data.
    Connected,
    /// The client was disposed and cannot connect again.
    Disposed,
}

impl std::fmt::Display for TcpConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disposed => write!(f, "Disposed"),
        }
    }
}

/// Current state of a TCP server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TcpServerState {
    /// Server is not running.
    #[default]
    Stopped,
    /// Server is listening for connections.
    Listening,
    /// Server is shutting down.
    Stopping,
}

impl std::fmt::Display for TcpServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Listening => write!(f, "Listening"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}
