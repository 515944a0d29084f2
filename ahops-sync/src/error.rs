//! Top level error module for the crate

use ahops_netutils::RpcError;

/// Errors reading from or writing to a chain node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// No endpoint has been adopted yet, or the connection was torn down
    #[error("not connected")]
    NotConnected,
    /// Transport or node error
    #[error("Rpc error. {0}")]
    Rpc(#[from] RpcError),
    /// The node answered with data that does not have the expected shape
    #[error("malformed response. {0}")]
    Malformed(String),
    /// The endpoint string could not be turned into a websocket URI
    #[error("invalid endpoint. {0}")]
    InvalidEndpoint(String),
    /// The fetch task stopped before answering
    #[error("fetcher stopped")]
    FetcherStopped,
}

/// A raw storage record that does not match the map's key/value schema
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The key is not under the expected map prefix
    #[error("key does not belong to {0}")]
    WrongPrefix(&'static str),
    /// Key has the wrong number of bytes
    #[error("key length {actual}, expected {expected}")]
    KeyLength {
        /// expected byte count
        expected: usize,
        /// actual byte count
        actual: usize,
    },
    /// Value has the wrong number of bytes
    #[error("value length {actual}, expected {expected}")]
    ValueLength {
        /// expected byte count
        expected: usize,
        /// actual byte count
        actual: usize,
    },
}

/// Top level error enum encapsulating any error that may occur during sync
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// A page read failed
    #[error("Fetch error. {0}")]
    Fetch(#[from] ClientError),
    /// A newer sync started or the cache was invalidated while this one was running
    #[error("superseded by a newer sync")]
    Superseded,
    /// The connection the view reads through was torn down
    #[error("view closed")]
    Closed,
}
