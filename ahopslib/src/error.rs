use ahops_sync::{
    connection::ConnectionError, error::SyncError, primitives::EntryKind, watch::WatchListError,
};
use ahopsconfig::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("primary connection failed. {0}")]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    WatchList(#[from] WatchListError),
    #[error("no {kind} row {index}")]
    NotFound { kind: EntryKind, index: usize },
}

pub type DashboardResult<T> = Result<T, DashboardError>;
