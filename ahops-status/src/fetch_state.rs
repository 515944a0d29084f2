//! Progress of one paged walk over a storage map.

/// Drives the progress label of a projection.
///
/// `Idle` is both the initial state and the state a failed walk falls back to, so a failure is never
/// mistaken for a finished walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetchState {
    /// No walk is running and none has completed since the last failure or reset.
    #[default]
    Idle,
    /// A walk is running and has accumulated `current_count` records so far.
    Fetching {
        /// records accumulated by the running walk
        current_count: usize,
    },
    /// The last walk reached the end of the map.
    Complete {
        /// records held by the finished walk
        total_count: usize,
    },
}

impl FetchState {
    /// State entered when a walk starts, whether fresh or forced.
    pub fn start() -> Self {
        Self::Fetching { current_count: 0 }
    }
    /// Returns true while a walk is running.
    pub fn is_fetching(&self) -> bool {
        matches!(self, Self::Fetching { .. })
    }
    /// Returns true once a walk has reached the end of the map.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
    /// Number of records known to the current or last walk.
    pub fn count(&self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Fetching { current_count } => *current_count,
            Self::Complete { total_count } => *total_count,
        }
    }
}

impl std::fmt::Display for FetchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching { current_count } => {
                write!(f, "fetching... {} entries so far", current_count)
            }
            Self::Complete { total_count } => write!(f, "{} entries", total_count),
        }
    }
}
