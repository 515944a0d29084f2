use ahops_status::submission_status::SubmissionStatus;
use ahops_sync::{
    client::ChainClient,
    primitives::{Entry, EntryKind, UnlockKey},
};

use super::Dashboard;
use crate::error::{DashboardError, DashboardResult};

impl<C: ChainClient> Dashboard<C> {
    /// Submits the unlock call releasing `entry` and waits for it to resolve.
    ///
    /// `None` means an unlock of the same entry is still in flight and nothing was done.
    pub async fn unlock(&self, entry: &Entry) -> Option<SubmissionStatus> {
        self.submitter.submit(entry, self.signer.as_ref()).await
    }

    /// The `index`th row of `kind`, in display order.
    pub async fn find_row(&self, kind: EntryKind, index: usize) -> DashboardResult<Entry> {
        self.projection(kind)
            .await
            .rows
            .get(index)
            .cloned()
            .ok_or(DashboardError::NotFound { kind, index })
    }

    pub async fn unlock_row(
        &self,
        kind: EntryKind,
        index: usize,
    ) -> DashboardResult<Option<SubmissionStatus>> {
        let entry = self.find_row(kind, index).await?;
        Ok(self.unlock(&entry).await)
    }

    pub fn submission_status(&self, entry: &Entry) -> Option<SubmissionStatus> {
        self.submitter.status(&entry.unlock_key())
    }

    pub fn submission_statuses(&self) -> Vec<(UnlockKey, SubmissionStatus)> {
        self.submitter.statuses()
    }
}
