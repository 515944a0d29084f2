//! Entrypoint for sync engine

use std::sync::Arc;
use std::time::Duration;

use ahops_status::fetch_state::FetchState;
use ahopsconfig::UPDATE_BATCH_SIZE;
use getset::{CopyGetters, Getters};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use tokio::time::Instant;

use crate::cache::ResultCache;
use crate::client::{get_storage_page, FetchRequest};
use crate::connection::Liveness;
use crate::error::SyncError;
use crate::primitives::{Entry, EntryKind};
use crate::schema::StorageMap;

/// Everything one storage map's view knows about its sync: the cache it fills, the visible progress
/// and the epoch that tells a running sync whether it is still wanted.
#[derive(Debug, Getters, CopyGetters)]
pub struct SyncState {
    #[getset(get_copy = "pub")]
    kind: EntryKind,
    #[getset(get = "pub")]
    cache: ResultCache,
    #[getset(get = "pub")]
    fetch_state: FetchState,
    #[getset(get_copy = "pub")]
    epoch: u64,
    /// set once the first page of the current data has landed
    #[getset(get_copy = "pub")]
    initial_content_ready: bool,
    /// error of the last failed sync, cleared when the next one starts
    #[getset(get = "pub")]
    last_error: Option<SyncError>,
    progress_senders: Vec<UnboundedSender<FetchState>>,
    /// once dead, nothing is written any more
    liveness: Option<Liveness>,
}

/// Sync state shared between the sync task and its readers.
pub type SharedSyncState = Arc<RwLock<SyncState>>;

impl SyncState {
    /// Idle state with an empty cache
    pub fn new(kind: EntryKind, ttl: Duration) -> Self {
        SyncState {
            kind,
            cache: ResultCache::new(ttl),
            fetch_state: FetchState::Idle,
            epoch: 0,
            initial_content_ready: false,
            last_error: None,
            progress_senders: Vec::new(),
            liveness: None,
        }
    }

    /// Closes this state together with the connection `liveness` belongs to. Runs still in flight
    /// at that point are superseded and no new run starts.
    pub fn bound_to(mut self, liveness: Liveness) -> Self {
        self.liveness = Some(liveness);
        self
    }

    /// True once the bound connection is torn down
    pub fn is_closed(&self) -> bool {
        self.liveness
            .as_ref()
            .is_some_and(|liveness| !liveness.is_alive())
    }

    /// Wraps a new state for sharing
    pub fn new_shared(kind: EntryKind, ttl: Duration) -> SharedSyncState {
        Arc::new(RwLock::new(Self::new(kind, ttl)))
    }

    /// Receives every [`FetchState`] transition from now on
    pub fn subscribe_progress(&mut self) -> UnboundedReceiver<FetchState> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.progress_senders.push(sender);
        receiver
    }

    fn set_fetch_state(&mut self, fetch_state: FetchState) {
        self.progress_senders
            .retain(|sender| sender.send(fetch_state.clone()).is_ok());
        self.fetch_state = fetch_state;
    }

    fn check_epoch(&self, epoch: u64) -> Result<(), SyncError> {
        if epoch == self.epoch && !self.is_closed() {
            Ok(())
        } else {
            Err(SyncError::Superseded)
        }
    }

    /// True when no sync is running and either the last one failed or the cache can not be trusted
    /// at `now`. Rows left behind by a failed run never count as fresh.
    pub fn should_resync(&self, now: Instant) -> bool {
        !self.fetch_state.is_fetching()
            && (self.last_error.is_some() || self.cache.should_resync(now))
    }

    /// Starts a run if one is due at `now`, or regardless with `force`. Checking and starting happen
    /// under the same borrow, so two readers can not both start a run.
    pub fn try_begin(&mut self, now: Instant, force: bool) -> Result<Option<u64>, SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        if !force && !self.should_resync(now) {
            return Ok(None);
        }
        Ok(Some(self.begin()))
    }

    /// Starts a new run and returns its epoch. Any older run is superseded.
    pub fn begin(&mut self) -> u64 {
        self.epoch += 1;
        self.last_error = None;
        self.set_fetch_state(FetchState::Fetching { current_count: 0 });
        self.epoch
    }

    /// Publishes the accumulator of run `epoch` as an intermediate result.
    pub fn publish(
        &mut self,
        epoch: u64,
        entries: Vec<Entry>,
        fetched_at: Instant,
    ) -> Result<(), SyncError> {
        self.check_epoch(epoch)?;
        let current_count = entries.len();
        self.cache.put(entries, fetched_at);
        self.set_fetch_state(FetchState::Fetching { current_count });
        Ok(())
    }

    /// Records that run `epoch` has read its first page.
    pub fn mark_initial_content(&mut self, epoch: u64) -> Result<(), SyncError> {
        self.check_epoch(epoch)?;
        self.initial_content_ready = true;
        Ok(())
    }

    /// Publishes the final result of run `epoch`.
    pub fn complete(
        &mut self,
        epoch: u64,
        entries: Vec<Entry>,
        fetched_at: Instant,
    ) -> Result<(), SyncError> {
        self.check_epoch(epoch)?;
        let total_count = entries.len();
        self.cache.put(entries, fetched_at);
        self.set_fetch_state(FetchState::Complete { total_count });
        Ok(())
    }

    /// Ends run `epoch` without a result. Published entries stay in the cache.
    pub fn fail(&mut self, epoch: u64, error: SyncError) -> Result<(), SyncError> {
        self.check_epoch(epoch)?;
        self.last_error = Some(error);
        self.set_fetch_state(FetchState::Idle);
        Ok(())
    }

    /// Drops the cache and supersedes any running sync.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
        self.cache.invalidate();
        self.initial_content_ready = false;
        self.set_fetch_state(FetchState::Idle);
    }
}

/// Reads every record of `kind`'s storage map, page by page, publishing into `state` as it goes.
///
/// Starts a new run even if one is in flight, superseding it. Returns the number of decoded entries.
/// Pages are requested strictly one after another since each cursor is the last key of the previous
/// page.
pub async fn sync(
    fetch_request_sender: UnboundedSender<FetchRequest>,
    kind: EntryKind,
    page_size: u32,
    state: SharedSyncState,
) -> Result<usize, SyncError> {
    let epoch = {
        let mut state = state.write().await;
        if state.is_closed() {
            return Err(SyncError::Closed);
        }
        state.begin()
    };

    walk(fetch_request_sender, kind, page_size, &state, epoch).await
}

/// Syncs the map behind `state` only when its cache can not be trusted, or regardless with `force`.
///
/// Returns `None` when the cache was reused or a run is already in flight.
pub async fn sync_if_stale(
    fetch_request_sender: UnboundedSender<FetchRequest>,
    page_size: u32,
    state: SharedSyncState,
    force: bool,
) -> Result<Option<usize>, SyncError> {
    let (kind, epoch) = {
        let mut state = state.write().await;
        match state.try_begin(Instant::now(), force)? {
            Some(epoch) => (state.kind(), epoch),
            None => {
                tracing::debug!("{} cache reused", state.kind());
                return Ok(None);
            }
        }
    };

    walk(fetch_request_sender, kind, page_size, &state, epoch)
        .await
        .map(Some)
}

async fn walk(
    fetch_request_sender: UnboundedSender<FetchRequest>,
    kind: EntryKind,
    page_size: u32,
    state: &SharedSyncState,
    epoch: u64,
) -> Result<usize, SyncError> {
    let map = StorageMap::new(kind);
    let page_size = page_size.max(1);
    tracing::info!("Syncing {}. epoch {}", kind, epoch);

    match fetch_all(fetch_request_sender, map, page_size, state, epoch).await {
        Ok(total_count) => {
            tracing::info!("Synced {} {}.", total_count, kind);
            Ok(total_count)
        }
        Err(SyncError::Superseded) => {
            tracing::warn!("Discarding {} sync of stale epoch {}.", kind, epoch);
            Err(SyncError::Superseded)
        }
        Err(e) => {
            tracing::warn!("Sync of {} failed. {}", kind, e);
            if state.write().await.fail(epoch, e.clone()).is_err() {
                tracing::debug!("Failure of stale epoch {} not recorded.", epoch);
            }
            Err(e)
        }
    }
}

async fn fetch_all(
    fetch_request_sender: UnboundedSender<FetchRequest>,
    map: StorageMap,
    page_size: u32,
    state: &SharedSyncState,
    epoch: u64,
) -> Result<usize, SyncError> {
    let prefix_hex = map.prefix_hex();
    let mut accumulator: Vec<Entry> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut unpublished = 0;
    let mut first_page = true;

    loop {
        let page = get_storage_page(
            fetch_request_sender.clone(),
            prefix_hex.clone(),
            page_size,
            cursor.clone(),
        )
        .await?;
        let page_len = page.len();
        if let Some(last) = page.last() {
            cursor = Some(format!("0x{}", hex::encode(&last.key)));
        }

        for record in page {
            let Some(value) = record.value else {
                tracing::debug!("Key 0x{} vanished before it was read.", hex::encode(&record.key));
                continue;
            };
            match map.decode(&record.key, &value) {
                Ok(entry) => {
                    accumulator.push(entry);
                    unpublished += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping undecodable {} record. {}", map.kind(), e);
                    continue;
                }
            }
            if unpublished == UPDATE_BATCH_SIZE {
                state
                    .write()
                    .await
                    .publish(epoch, accumulator.clone(), Instant::now())?;
                unpublished = 0;
            }
        }

        if first_page {
            state.write().await.mark_initial_content(epoch)?;
            first_page = false;
        }
        if page_len < page_size as usize {
            break;
        }
        tokio::task::yield_now().await;
    }

    let total_count = accumulator.len();
    state
        .write()
        .await
        .complete(epoch, accumulator, Instant::now())?;

    Ok(total_count)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ahopsconfig::CACHE_TTL;

    use super::*;
    use crate::client::spawn_fetcher;
    use crate::connection::ChainConnection;
    use crate::error::ClientError;
    use crate::mocks::{account, MockChain};
    use tokio::sync::Notify;

    fn fetcher(chain: &MockChain) -> UnboundedSender<FetchRequest> {
        spawn_fetcher(Arc::new(ChainConnection::with_client(
            "primary",
            "mock",
            chain.clone(),
        )))
    }

    fn drain(receiver: &mut UnboundedReceiver<FetchState>) -> Vec<FetchState> {
        let mut states = Vec::new();
        while let Ok(state) = receiver.try_recv() {
            states.push(state);
        }
        states
    }

    #[tokio::test]
    async fn syncs_1200_records_in_three_pages() {
        let chain = MockChain::default();
        chain.fill(EntryKind::LeaseReserve, 1200);
        let state = SyncState::new_shared(EntryKind::LeaseReserve, CACHE_TTL);
        let mut progress = state.write().await.subscribe_progress();

        let total = sync(fetcher(&chain), EntryKind::LeaseReserve, 500, state.clone())
            .await
            .unwrap();

        assert_eq!(total, 1200);
        assert_eq!(chain.page_requests(), 3);
        let states = drain(&mut progress);
        assert_eq!(states.first(), Some(&FetchState::Fetching { current_count: 0 }));
        assert_eq!(states.last(), Some(&FetchState::Complete { total_count: 1200 }));
        let counts: Vec<usize> = states
            .iter()
            .filter_map(|state| match state {
                FetchState::Fetching { current_count } => Some(*current_count),
                _ => None,
            })
            .collect();
        assert!(counts.len() > 2);
        assert!(counts.iter().all(|count| count % 10 == 0));
        assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(state.read().await.cache().entries().len(), 1200);
        assert!(state.read().await.initial_content_ready());
    }

    #[tokio::test]
    async fn full_last_page_needs_one_more_request() {
        let chain = MockChain::default();
        chain.fill(EntryKind::CrowdloanReserve, 1000);
        let state = SyncState::new_shared(EntryKind::CrowdloanReserve, CACHE_TTL);

        let total = sync(fetcher(&chain), EntryKind::CrowdloanReserve, 500, state)
            .await
            .unwrap();

        assert_eq!(total, 1000);
        assert_eq!(chain.page_requests(), 3);
    }

    #[tokio::test]
    async fn empty_map_completes_with_zero() {
        let chain = MockChain::default();
        chain.fill(EntryKind::LeaseReserve, 5);
        let state = SyncState::new_shared(EntryKind::Contribution, CACHE_TTL);

        let total = sync(fetcher(&chain), EntryKind::Contribution, 500, state.clone())
            .await
            .unwrap();

        assert_eq!(total, 0);
        assert_eq!(chain.page_requests(), 1);
        assert_eq!(
            state.read().await.fetch_state(),
            &FetchState::Complete { total_count: 0 }
        );
        assert!(state.read().await.initial_content_ready());
    }

    #[tokio::test]
    async fn failed_page_resets_to_idle_and_keeps_partial_data() {
        let chain = MockChain::default();
        chain.fill(EntryKind::LeaseReserve, 1200);
        chain.fail_on_page(2);
        let state = SyncState::new_shared(EntryKind::LeaseReserve, CACHE_TTL);

        let result = sync(fetcher(&chain), EntryKind::LeaseReserve, 500, state.clone()).await;

        assert!(matches!(result, Err(SyncError::Fetch(ClientError::Rpc(_)))));
        let state = state.read().await;
        assert_eq!(state.fetch_state(), &FetchState::Idle);
        assert_eq!(state.cache().entries().len(), 500);
        assert!(state.last_error().is_some());
    }

    #[tokio::test]
    async fn vanished_and_undecodable_records_are_skipped() {
        let chain = MockChain::default();
        chain.fill(EntryKind::LeaseReserve, 3);
        chain.insert_vanished(EntryKind::LeaseReserve, 50, 2000, account(99));
        chain.insert_undecodable(EntryKind::LeaseReserve, 60, 2000, account(98));
        let state = SyncState::new_shared(EntryKind::LeaseReserve, CACHE_TTL);

        // five listed keys fill the page, so a second request is made
        let total = sync(fetcher(&chain), EntryKind::LeaseReserve, 5, state)
            .await
            .unwrap();

        assert_eq!(total, 3);
        assert_eq!(chain.page_requests(), 2);
    }

    async fn wait_for_count(receiver: &mut UnboundedReceiver<FetchState>, count: usize) {
        loop {
            match receiver.recv().await {
                Some(FetchState::Fetching { current_count }) if current_count == count => return,
                Some(_) => continue,
                None => panic!("progress channel closed before {} entries", count),
            }
        }
    }

    #[tokio::test]
    async fn invalidation_between_pages_supersedes_the_walk() {
        let chain = MockChain::default();
        chain.fill(EntryKind::Contribution, 1200);
        let gate = Arc::new(Notify::new());
        chain.gate_page(2, gate.clone());
        let state = SyncState::new_shared(EntryKind::Contribution, CACHE_TTL);
        let mut progress = state.write().await.subscribe_progress();

        let walk = tokio::spawn(sync(
            fetcher(&chain),
            EntryKind::Contribution,
            500,
            state.clone(),
        ));
        wait_for_count(&mut progress, 500).await;
        state.write().await.invalidate();
        gate.notify_one();

        assert_eq!(walk.await.unwrap(), Err(SyncError::Superseded));
        let state = state.read().await;
        assert!(state.cache().entries().is_empty());
        assert_eq!(state.fetch_state(), &FetchState::Idle);
        assert!(state.last_error().is_none());
    }

    #[tokio::test]
    async fn teardown_discards_a_running_walk() {
        let chain = MockChain::default();
        chain.fill(EntryKind::LeaseReserve, 1200);
        let gate = Arc::new(Notify::new());
        chain.gate_page(2, gate.clone());
        let connection = Arc::new(ChainConnection::with_client("primary", "mock", chain.clone()));
        let sender = spawn_fetcher(connection.clone());
        let state: SharedSyncState = Arc::new(RwLock::new(
            SyncState::new(EntryKind::LeaseReserve, CACHE_TTL).bound_to(connection.liveness()),
        ));
        let mut progress = state.write().await.subscribe_progress();

        let walk = tokio::spawn(sync(sender.clone(), EntryKind::LeaseReserve, 500, state.clone()));
        wait_for_count(&mut progress, 500).await;
        connection.teardown();
        gate.notify_one();

        // either the next page lands after teardown or the fetch is refused, nothing is written
        assert!(walk.await.unwrap().is_err());
        {
            let state = state.read().await;
            assert_eq!(state.cache().entries().len(), 500);
            assert!(state.last_error().is_none());
            assert!(state.is_closed());
        }
        assert_eq!(
            sync_if_stale(sender, 500, state.clone(), true).await,
            Err(SyncError::Closed)
        );
        assert!(state.read().await.last_error().is_none());
    }

    #[tokio::test]
    async fn failed_run_is_retried_inside_the_ttl() {
        let chain = MockChain::default();
        chain.fill(EntryKind::LeaseReserve, 1200);
        chain.fail_on_page(2);
        let sender = fetcher(&chain);
        let state = SyncState::new_shared(EntryKind::LeaseReserve, CACHE_TTL);

        assert!(sync_if_stale(sender.clone(), 500, state.clone(), false)
            .await
            .is_err());
        assert_eq!(state.read().await.cache().entries().len(), 500);
        assert!(state.read().await.should_resync(Instant::now()));

        assert_eq!(
            sync_if_stale(sender.clone(), 500, state.clone(), false).await,
            Ok(Some(1200))
        );
        assert_eq!(chain.page_requests(), 5);
        assert_eq!(
            sync_if_stale(sender, 500, state, false).await,
            Ok(None)
        );
        assert_eq!(chain.page_requests(), 5);
    }

    #[test]
    fn due_check_and_start_are_one_step() {
        let mut state = SyncState::new(EntryKind::Contribution, CACHE_TTL);
        let now = Instant::now();

        let first = state.try_begin(now, false).unwrap();
        assert!(first.is_some());
        assert_eq!(state.try_begin(now, false), Ok(None));
        // forcing supersedes the running walk
        let forced = state.try_begin(now, true).unwrap();
        assert_ne!(forced, first);
    }

    #[test]
    fn stale_epochs_can_not_publish() {
        let mut state = SyncState::new(EntryKind::Contribution, CACHE_TTL);
        let stale = state.begin();
        state.invalidate();

        assert_eq!(
            state.publish(stale, Vec::new(), Instant::now()),
            Err(SyncError::Superseded)
        );
        assert_eq!(
            state.complete(stale, Vec::new(), Instant::now()),
            Err(SyncError::Superseded)
        );
        assert_eq!(state.fetch_state(), &FetchState::Idle);

        let current = state.begin();
        assert!(state.publish(current, Vec::new(), Instant::now()).is_ok());
    }

    #[test]
    fn running_sync_is_not_restarted() {
        let mut state = SyncState::new(EntryKind::Contribution, CACHE_TTL);
        let now = Instant::now();
        assert!(state.should_resync(now));
        state.begin();
        assert!(!state.should_resync(now));
    }
}
