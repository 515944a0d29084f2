//! The dashboard ties both chain connections, the block clock and one sync engine per storage map
//! together, and exposes the three projections plus `unlock`.

use std::sync::Arc;

use ahops_netutils::RpcClient;
use ahops_status::{connection_status::ConnectionStatus, fetch_state::FetchState};
use ahops_sync::{
    client::{get_properties, spawn_fetcher, ChainClient, Connector, FetchRequest},
    clock::{unlock_days_remaining, BlockClock},
    connection::ChainConnection,
    error::SyncError,
    primitives::{ChainProperties, Entry, EntryKind},
    sort::sort_entries,
    submit::{SignerProvider, UnlockSubmitter},
    sync::{SharedSyncState, SyncState},
    watch::{WatchEntry, WatchList, WatchListError},
};
use ahopsconfig::{DashboardConfig, CACHE_TTL, HEADER_POLL_INTERVAL, RESYNC_DELAY};
use log::{info, warn};
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};

use crate::error::DashboardResult;

pub mod describe;
pub mod sync;
pub mod unlock;

/// What one view shows at a point in time.
#[derive(Clone, Debug)]
pub struct Projection {
    pub kind: EntryKind,
    /// cached entries in display order
    pub rows: Vec<Entry>,
    pub fetch_state: FetchState,
    pub current_block: Option<u32>,
    /// why the last sync failed, if it did
    pub last_error: Option<SyncError>,
    /// false while the first page of the current data is outstanding
    pub initial_content_ready: bool,
}

impl Projection {
    /// Estimated days until `entry` unlocks, by the block clock reading this projection was taken at.
    pub fn unlock_days_for(&self, entry: &Entry) -> Option<f64> {
        unlock_days_remaining(entry.unlock_block(), self.current_block)
    }
}

pub struct Dashboard<C: ChainClient = RpcClient> {
    config: DashboardConfig,
    primary: Arc<ChainConnection<C>>,
    secondary: Arc<ChainConnection<C>>,
    clock: BlockClock,
    properties: ChainProperties,
    /// one per [`EntryKind`], indexed by `kind as usize`
    views: [SharedSyncState; 3],
    watch_list: RwLock<WatchList>,
    submitter: Arc<UnlockSubmitter<C>>,
    signer: Arc<dyn SignerProvider>,
    fetch_request_sender: UnboundedSender<FetchRequest>,
}

impl<C: ChainClient> Dashboard<C> {
    /// Connects the primary chain, which must succeed, and the secondary chain unless the block is
    /// overridden. A secondary failure only leaves the block clock empty.
    pub async fn start<K>(
        config: DashboardConfig,
        connector: &K,
        signer: Arc<dyn SignerProvider>,
        mut watch_list: WatchList,
    ) -> DashboardResult<Self>
    where
        K: Connector<Client = C>,
    {
        config.validate()?;

        let primary = Arc::new(ChainConnection::new("primary"));
        primary.connect(connector, &config.primary_endpoints).await?;

        let secondary = Arc::new(ChainConnection::new("secondary"));
        let clock = BlockClock::from_config(&config);
        if config.block_override.is_none() {
            if let Err(e) = secondary
                .connect(connector, &config.secondary_endpoints)
                .await
            {
                warn!("No current block available. {}", e);
            }
        }
        // the poller stops by itself on teardown
        let _ = clock.spawn_polling(secondary.clone(), HEADER_POLL_INTERVAL);

        let fetch_request_sender = spawn_fetcher(primary.clone());
        let properties = match get_properties(fetch_request_sender.clone()).await {
            Ok(properties) => properties,
            Err(e) => {
                warn!("Could not read chain properties, assuming defaults. {}", e);
                ChainProperties::default()
            }
        };
        info!(
            "Balances in {} with {} decimals",
            properties.symbol, properties.decimals
        );

        if let Some(account) = &config.signer_account {
            watch_list.include_account(account);
        }

        // a torn down primary closes every view
        let views = EntryKind::ALL.map(|kind| {
            Arc::new(RwLock::new(
                SyncState::new(kind, CACHE_TTL).bound_to(primary.liveness()),
            ))
        });
        let (resync_sender, resync_receiver) = unbounded_channel();
        let submitter = Arc::new(UnlockSubmitter::new(
            primary.clone(),
            config.wait_for_finalization,
            RESYNC_DELAY,
            resync_sender,
        ));
        sync::spawn_resync_listener(
            resync_receiver,
            views.clone(),
            fetch_request_sender.clone(),
            config.page_size,
            submitter.clone(),
        );

        Ok(Dashboard {
            config,
            primary,
            secondary,
            clock,
            properties,
            views,
            watch_list: RwLock::new(watch_list),
            submitter,
            signer,
            fetch_request_sender,
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn properties(&self) -> &ChainProperties {
        &self.properties
    }

    pub fn current_block(&self) -> Option<u32> {
        self.clock.current_block()
    }

    pub fn primary_status(&self) -> ConnectionStatus {
        self.primary.status()
    }

    pub fn secondary_status(&self) -> ConnectionStatus {
        self.secondary.status()
    }

    fn view(&self, kind: EntryKind) -> &SharedSyncState {
        &self.views[kind as usize]
    }

    /// Every [`FetchState`] transition of `kind`'s view from now on.
    pub async fn subscribe_progress(&self, kind: EntryKind) -> UnboundedReceiver<FetchState> {
        self.view(kind).write().await.subscribe_progress()
    }

    /// Current rows of `kind`, sorted against the current watch list.
    pub async fn projection(&self, kind: EntryKind) -> Projection {
        let watch_list = self.watch_list.read().await;
        let state = self.view(kind).read().await;

        Projection {
            kind,
            rows: sort_entries(state.cache().entries(), &watch_list),
            fetch_state: *state.fetch_state(),
            current_block: self.clock.current_block(),
            last_error: state.last_error().clone(),
            initial_content_ready: state.initial_content_ready(),
        }
    }

    pub async fn contributions(&self) -> Projection {
        self.projection(EntryKind::Contribution).await
    }

    pub async fn lease_reserves(&self) -> Projection {
        self.projection(EntryKind::LeaseReserve).await
    }

    pub async fn crowdloan_reserves(&self) -> Projection {
        self.projection(EntryKind::CrowdloanReserve).await
    }

    pub async fn watch_list(&self) -> WatchList {
        self.watch_list.read().await.clone()
    }

    /// Watches `raw`. Malformed and already watched identifiers are rejected.
    pub async fn add_watched(&self, raw: &str) -> Result<WatchEntry, WatchListError> {
        let mut watch_list = self.watch_list.write().await;
        let entry = watch_list.add(raw)?.clone();
        info!("Watching {}", entry.normalized);
        Ok(entry)
    }

    pub async fn remove_watched(&self, raw: &str) -> Option<WatchEntry> {
        let removed = self.watch_list.write().await.remove(raw);
        if let Some(entry) = &removed {
            info!("No longer watching {}", entry.normalized);
        }
        removed
    }

    /// Tears down both connections. Background work stops, late results are dropped and the views
    /// keep what they last showed.
    pub fn shutdown(&self) {
        self.primary.teardown();
        self.secondary.teardown();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use ahops_sync::mocks::{account, MockChain, MockConnector, MockSigner};

    use super::*;

    pub(crate) const ALICE_GENERIC: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    pub(crate) const ALICE_POLKADOT: &str = "15oF4uVJwmo4TdGW7VfQxNLavjCXviqxT9S1MgbjMNHr6Sp5";

    pub(crate) fn config() -> DashboardConfig {
        DashboardConfig {
            primary_endpoints: vec!["wss://primary-a".to_string(), "wss://primary-b".to_string()],
            secondary_endpoints: vec!["wss://secondary".to_string()],
            ..Default::default()
        }
    }

    pub(crate) async fn dashboard(chain: &MockChain) -> Dashboard<MockChain> {
        Dashboard::start(
            config(),
            &MockConnector::new(chain.clone()),
            Arc::new(MockSigner::new()),
            WatchList::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn primary_failure_is_fatal() {
        let connector = MockConnector::new(MockChain::default())
            .failing(&["wss://primary-a", "wss://primary-b"]);

        let result = Dashboard::start(
            config(),
            &connector,
            Arc::new(MockSigner::new()),
            WatchList::new(),
        )
        .await;

        assert!(matches!(
            result,
            Err(crate::error::DashboardError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn secondary_failure_leaves_the_clock_empty() {
        let chain = MockChain::default();
        chain.set_header(100);
        let connector = MockConnector::new(chain).failing(&["wss://secondary"]);

        let dashboard = Dashboard::start(
            config(),
            &connector,
            Arc::new(MockSigner::new()),
            WatchList::new(),
        )
        .await
        .unwrap();

        assert!(dashboard.primary_status().is_connected());
        assert!(dashboard.secondary_status().is_error());
        assert_eq!(dashboard.current_block(), None);
        dashboard.shutdown();
    }

    #[tokio::test]
    async fn block_override_skips_the_secondary() {
        let connector = MockConnector::new(MockChain::default());
        let config = DashboardConfig {
            block_override: Some(27_000_000),
            ..config()
        };

        let dashboard = Dashboard::start(
            config,
            &connector,
            Arc::new(MockSigner::new()),
            WatchList::new(),
        )
        .await
        .unwrap();

        assert_eq!(connector.attempts(), vec!["wss://primary-a".to_string()]);
        assert_eq!(dashboard.current_block(), Some(27_000_000));
        assert_eq!(dashboard.secondary_status(), ConnectionStatus::NotConnected);
    }

    #[tokio::test]
    async fn properties_are_read_once_at_start() {
        let chain = MockChain::default();
        chain.set_properties(ChainProperties {
            decimals: 12,
            symbol: "KSM".to_string(),
        });

        let dashboard = dashboard(&chain).await;

        assert_eq!(dashboard.properties().symbol, "KSM");
        assert_eq!(dashboard.properties().decimals, 12);
    }

    #[tokio::test]
    async fn signer_account_is_watched_from_the_start() {
        let config = DashboardConfig {
            signer_account: Some(ALICE_POLKADOT.to_string()),
            ..config()
        };
        let mut watch_list = WatchList::new();
        watch_list.add(ALICE_GENERIC).unwrap();

        let dashboard = Dashboard::start(
            config,
            &MockConnector::new(MockChain::default()),
            Arc::new(MockSigner::new()),
            watch_list,
        )
        .await
        .unwrap();

        assert_eq!(dashboard.watch_list().await.len(), 1);
    }

    #[tokio::test]
    async fn watched_accounts_lead_every_projection() {
        let chain = MockChain::default();
        chain.insert_entry(EntryKind::LeaseReserve, 10, 1000, account(1), 1);
        chain.insert_entry(EntryKind::LeaseReserve, 10, 3000, account(2), 1);
        let dashboard = dashboard(&chain).await;
        dashboard
            .sync_view(EntryKind::LeaseReserve, false)
            .await
            .unwrap();

        let before = dashboard.lease_reserves().await;
        assert_eq!(before.rows[0].para_id(), 1000);

        dashboard
            .add_watched(&account(2).to_ss58(42))
            .await
            .unwrap();
        let after = dashboard.lease_reserves().await;
        assert_eq!(after.rows[0].para_id(), 3000);
        assert!(after.initial_content_ready);

        assert!(dashboard.remove_watched(&account(2).to_canonical()).await.is_some());
        assert_eq!(dashboard.lease_reserves().await.rows, before.rows);
    }

    #[tokio::test]
    async fn unlock_days_follow_the_clock() {
        let chain = MockChain::default();
        chain.insert_entry(EntryKind::Contribution, 1000, 2000, account(1), 1);
        let dashboard = Dashboard::start(
            DashboardConfig {
                block_override: Some(994),
                ..config()
            },
            &MockConnector::new(chain),
            Arc::new(MockSigner::new()),
            WatchList::new(),
        )
        .await
        .unwrap();
        dashboard
            .sync_view(EntryKind::Contribution, false)
            .await
            .unwrap();

        let projection = dashboard.contributions().await;
        let days = projection.unlock_days_for(&projection.rows[0]).unwrap();
        assert!(days > 0.0 && days < 1.0);
    }
}
