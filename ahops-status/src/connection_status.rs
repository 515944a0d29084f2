//! Lifecycle of a connection to a remote node.

/// `NotConnected -> Connecting -> Connected | Error`.
///
/// `Error` is terminal for the lifetime of the connection: nothing retries past the endpoint list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// nothing attempted yet
    #[default]
    NotConnected,
    /// walking the endpoint list
    Connecting,
    /// an endpoint completed the handshake and is in use
    Connected {
        /// the endpoint that was adopted
        endpoint: String,
    },
    /// every endpoint failed; carries the last failure
    Error(String),
}

impl ConnectionStatus {
    /// Returns true once an endpoint has been adopted.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
    /// Returns true if the endpoint list was exhausted.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ConnectionStatus::*;
        match self {
            NotConnected => write!(f, "not connected"),
            Connecting => write!(f, "connecting"),
            Connected { endpoint } => write!(f, "connected to {}", endpoint),
            Error(e) => write!(f, "connection failed: {}", e),
        }
    }
}

impl From<ConnectionStatus> for String {
    fn from(value: ConnectionStatus) -> Self {
        format!("{value}")
    }
}
