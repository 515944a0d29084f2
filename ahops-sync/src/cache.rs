//! Result cache for one storage map, with a time-to-live governing resync.

use std::time::Duration;

use getset::{CopyGetters, Getters};
use tokio::time::Instant;

use crate::primitives::Entry;

/// The last published result and when it was fetched.
#[derive(Clone, Debug, Getters, CopyGetters)]
pub struct CacheRecord {
    #[getset(get = "pub")]
    entries: Vec<Entry>,
    #[getset(get_copy = "pub")]
    fetched_at: Instant,
}

impl CacheRecord {
    /// Entries fetched at `fetched_at`
    pub fn new(entries: Vec<Entry>, fetched_at: Instant) -> Self {
        CacheRecord {
            entries,
            fetched_at,
        }
    }
}

/// At most one record per cache. Entries are replaced wholesale, never patched.
#[derive(Clone, Debug)]
pub struct ResultCache {
    record: Option<CacheRecord>,
    ttl: Duration,
}

impl ResultCache {
    /// Empty cache with the given time-to-live
    pub fn new(ttl: Duration) -> Self {
        ResultCache { record: None, ttl }
    }

    /// Cached record, regardless of age
    pub fn get(&self) -> Option<&CacheRecord> {
        self.record.as_ref()
    }

    /// Cached entries, empty when nothing is cached
    pub fn entries(&self) -> &[Entry] {
        self.record
            .as_ref()
            .map(|record| record.entries.as_slice())
            .unwrap_or_default()
    }

    /// Replaces the record
    pub fn put(&mut self, entries: Vec<Entry>, fetched_at: Instant) {
        self.record = Some(CacheRecord::new(entries, fetched_at));
    }

    /// Drops the record so the next [`Self::should_resync`] is true
    pub fn invalidate(&mut self) {
        self.record = None;
    }

    /// True when the record is absent, empty, or at least `ttl` old at `now`.
    pub fn should_resync(&self, now: Instant) -> bool {
        match &self.record {
            None => true,
            Some(record) => {
                record.entries.is_empty()
                    || now.saturating_duration_since(record.fetched_at) >= self.ttl
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::EntryKind;

    fn entry() -> Entry {
        Entry::from_parts(
            EntryKind::LeaseReserve,
            100,
            2000,
            "15oF4uVJwmo4TdGW7VfQxNLavjCXviqxT9S1MgbjMNHr6Sp5".to_string(),
            None,
            1,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_record_is_reused_until_ttl() {
        let mut cache = ResultCache::new(Duration::from_secs(60));
        let fetched_at = Instant::now();
        cache.put(vec![entry()], fetched_at);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!cache.should_resync(Instant::now()));

        tokio::time::advance(Duration::from_secs(51)).await;
        assert!(cache.should_resync(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_boundary_is_inclusive() {
        let mut cache = ResultCache::new(Duration::from_secs(60));
        let fetched_at = Instant::now();
        cache.put(vec![entry()], fetched_at);

        assert!(cache.should_resync(fetched_at + Duration::from_secs(60)));
        assert!(!cache.should_resync(fetched_at + Duration::from_millis(59_999)));
    }

    #[test]
    fn empty_or_missing_records_always_resync() {
        let mut cache = ResultCache::new(Duration::from_secs(60));
        let now = Instant::now();
        assert!(cache.should_resync(now));

        cache.put(Vec::new(), now);
        assert!(cache.should_resync(now));

        cache.put(vec![entry()], now);
        assert!(!cache.should_resync(now));
        cache.invalidate();
        assert!(cache.should_resync(now));
        assert!(cache.entries().is_empty());
    }
}
