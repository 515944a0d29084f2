//! The relay chain block number, and unlock estimates derived from it.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use ahopsconfig::{DashboardConfig, SECONDS_PER_BLOCK, SECONDS_PER_DAY};
use tokio::task::JoinHandle;

use crate::client::ChainClient;
use crate::connection::ChainConnection;

/// Source of the current block number.
#[derive(Clone, Debug)]
pub enum BlockClock {
    /// Always reports the configured block. Nothing is polled.
    Override(u32),
    /// Reports the last header successfully read from the secondary chain.
    Live(Arc<RwLock<Option<u32>>>),
}

impl BlockClock {
    /// A clock pinned to `block`
    pub fn fixed(block: u32) -> Self {
        BlockClock::Override(block)
    }

    /// A clock with no reading yet
    pub fn live() -> Self {
        BlockClock::Live(Arc::new(RwLock::new(None)))
    }

    /// Override mode when the config carries a block, live mode otherwise.
    pub fn from_config(config: &DashboardConfig) -> Self {
        match config.block_override {
            Some(block) => Self::fixed(block),
            None => Self::live(),
        }
    }

    /// The current block, `None` until a live clock has read its first header.
    pub fn current_block(&self) -> Option<u32> {
        match self {
            BlockClock::Override(block) => Some(*block),
            BlockClock::Live(latest) => *latest
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        }
    }

    fn record(&self, block: u32) {
        if let BlockClock::Live(latest) = self {
            *latest
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(block);
        }
    }

    /// Polls the connection's header every `interval` until the connection is torn down.
    /// Returns `None` in override mode. Polls are skipped while the connection is not connected and
    /// failures keep the previous reading.
    pub fn spawn_polling<C: ChainClient>(
        &self,
        connection: Arc<ChainConnection<C>>,
        interval: Duration,
    ) -> Option<JoinHandle<()>> {
        if let BlockClock::Override(block) = self {
            tracing::info!("Block clock pinned to {}", block);
            return None;
        }
        let clock = self.clone();
        let liveness = connection.liveness();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !liveness.is_alive() {
                    break;
                }
                if !connection.status().is_connected() {
                    continue;
                }
                let client = match connection.client() {
                    Ok(client) => client,
                    Err(_) => continue,
                };
                match client.header().await {
                    // the header may land after teardown
                    Ok(_) if !liveness.is_alive() => break,
                    Ok(header) => {
                        tracing::debug!("{} is at block {}", connection.name(), header.number);
                        clock.record(header.number);
                    }
                    Err(e) => {
                        tracing::warn!("Header poll of {} failed. {}", connection.name(), e);
                    }
                }
            }
            tracing::debug!("Block clock stopped.");
        }))
    }
}

/// Estimated days until `unlock_block`. `Some(0.0)` once it is reached, `None` without a current block.
pub fn unlock_days_remaining(unlock_block: u32, current_block: Option<u32>) -> Option<f64> {
    let current_block = current_block?;
    let remaining = i64::from(unlock_block) - i64::from(current_block);
    if remaining <= 0 {
        return Some(0.0);
    }

    Some(remaining as f64 * SECONDS_PER_BLOCK / SECONDS_PER_DAY)
}

/// How an unlock estimate is shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnlockCountdown {
    /// no current block
    Unknown,
    /// unlockable
    Now,
    /// more than zero but under one day
    LessThanOneDay,
    /// rounded to the nearest day
    Days(u64),
}

impl From<Option<f64>> for UnlockCountdown {
    fn from(days: Option<f64>) -> Self {
        match days {
            None => UnlockCountdown::Unknown,
            Some(days) if days <= 0.0 => UnlockCountdown::Now,
            Some(days) if days < 1.0 => UnlockCountdown::LessThanOneDay,
            Some(days) => UnlockCountdown::Days(days.round() as u64),
        }
    }
}

impl std::fmt::Display for UnlockCountdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnlockCountdown::Unknown => write!(f, "unknown"),
            UnlockCountdown::Now => write!(f, "now"),
            UnlockCountdown::LessThanOneDay => write!(f, "< 1"),
            UnlockCountdown::Days(days) => write!(f, "{}", days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockChain;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn six_blocks_is_less_than_a_day() {
        let days = unlock_days_remaining(1000, Some(994)).unwrap();
        assert!((days - 6.0 * 6.06 / 86_400.0).abs() < f64::EPSILON);
        assert_eq!(UnlockCountdown::from(Some(days)).to_string(), "< 1");
    }

    #[test_case(1000, Some(1000), "now" ; "reached")]
    #[test_case(1000, Some(5000), "now" ; "passed")]
    #[test_case(1000, None, "unknown" ; "no block")]
    #[test_case(28_000_000, Some(27_985_742), "1" ; "one day")]
    #[test_case(28_000_000, Some(27_000_000), "70" ; "weeks")]
    fn countdown_labels(unlock_block: u32, current_block: Option<u32>, label: &str) {
        assert_eq!(
            UnlockCountdown::from(unlock_days_remaining(unlock_block, current_block)).to_string(),
            label
        );
    }

    #[test]
    fn override_mode_never_polls() {
        let clock = BlockClock::fixed(123);
        let connection = Arc::new(ChainConnection::<MockChain>::new("secondary"));
        assert!(clock
            .spawn_polling(connection, Duration::from_secs(12))
            .is_none());
        assert_eq!(clock.current_block(), Some(123));
    }

    #[tokio::test(start_paused = true)]
    async fn live_mode_keeps_last_good_reading() {
        let chain = MockChain::default();
        chain.set_header(100);
        let connection = Arc::new(ChainConnection::with_client("secondary", "mock", chain.clone()));
        let clock = BlockClock::live();
        assert_eq!(clock.current_block(), None);

        let handle = clock
            .spawn_polling(connection.clone(), Duration::from_secs(12))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(clock.current_block(), Some(100));

        chain.fail_header(true);
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(clock.current_block(), Some(100));

        chain.fail_header(false);
        chain.set_header(102);
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(clock.current_block(), Some(102));

        connection.teardown();
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_secondary_leaves_clock_empty() {
        let connection = Arc::new(ChainConnection::<MockChain>::new("secondary"));
        let clock = BlockClock::live();

        clock.spawn_polling(connection, Duration::from_secs(12));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(clock.current_block(), None);
    }

    proptest! {
        #[test]
        fn never_negative(unlock_block: u32, current_block: u32) {
            let days = unlock_days_remaining(unlock_block, Some(current_block)).unwrap();
            prop_assert!(days >= 0.0);
            if unlock_block <= current_block {
                prop_assert_eq!(days, 0.0);
            }
        }
    }
}
