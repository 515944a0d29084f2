//! Keeping the three views fresh.

use std::sync::{Arc, Weak};

use ahops_sync::{
    client::{ChainClient, FetchRequest},
    error::SyncError,
    primitives::EntryKind,
    submit::UnlockSubmitter,
    sync::{sync_if_stale, SharedSyncState},
};
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::Dashboard;
use crate::error::DashboardResult;

impl<C: ChainClient> Dashboard<C> {
    /// Syncs `kind` when its cache can not be trusted, or regardless with `force`.
    ///
    /// Returns the number of entries read, or `None` when the cache was reused or a sync is
    /// already running.
    pub async fn sync_view(&self, kind: EntryKind, force: bool) -> DashboardResult<Option<usize>> {
        Ok(resync_view(
            self.fetch_request_sender.clone(),
            self.view(kind).clone(),
            self.config.page_size,
            Some(self.submitter.as_ref()),
            force,
        )
        .await?)
    }

    pub async fn sync_all(&self, force: bool) -> Vec<(EntryKind, DashboardResult<Option<usize>>)> {
        let results = join_all(
            EntryKind::ALL
                .iter()
                .map(|kind| self.sync_view(*kind, force)),
        )
        .await;

        EntryKind::ALL.into_iter().zip(results).collect()
    }
}

async fn resync_view<C: ChainClient>(
    fetch_request_sender: UnboundedSender<FetchRequest>,
    state: SharedSyncState,
    page_size: u32,
    submitter: Option<&UnlockSubmitter<C>>,
    force: bool,
) -> Result<Option<usize>, SyncError> {
    let Some(total_count) = sync_if_stale(fetch_request_sender, page_size, state, force).await?
    else {
        return Ok(None);
    };
    // fresh data supersedes the outcome of earlier unlocks
    if let Some(submitter) = submitter {
        submitter.clear_terminal();
    }

    Ok(Some(total_count))
}

/// Invalidates and resyncs every view whenever a successful unlock is reported on `receiver`.
/// Ends when the submitter is dropped.
pub(super) fn spawn_resync_listener<C: ChainClient>(
    mut receiver: UnboundedReceiver<EntryKind>,
    views: [SharedSyncState; 3],
    fetch_request_sender: UnboundedSender<FetchRequest>,
    page_size: u32,
    submitter: Arc<UnlockSubmitter<C>>,
) {
    // the submitter owns the sending half
    let submitter: Weak<UnlockSubmitter<C>> = Arc::downgrade(&submitter);
    tokio::spawn(async move {
        while let Some(kind) = receiver.recv().await {
            info!("Unlock of {} went through, resyncing every view", kind);
            for view in views.iter() {
                view.write().await.invalidate();
            }
            let submitter = submitter.upgrade();
            let results = join_all(views.iter().map(|view| {
                resync_view(
                    fetch_request_sender.clone(),
                    view.clone(),
                    page_size,
                    submitter.as_deref(),
                    true,
                )
            }))
            .await;
            for (kind, result) in EntryKind::ALL.iter().zip(results) {
                if let Err(e) = result {
                    warn!("Resync of {} after unlock failed. {}", kind, e);
                }
            }
        }
        debug!("Resync listener stopped.");
    });
}
