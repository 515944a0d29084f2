//! Unlock submission: build the call for one entry, have it signed, submit it and follow it to a
//! terminal status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ahops_status::submission_status::{SubmissionFailure, SubmissionStatus};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::client::ChainClient;
use crate::connection::ChainConnection;
use crate::error::ClientError;
use crate::primitives::{Entry, EntryKind, TxEvent, UnlockKey};

/// The pallet call releasing one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnlockAction {
    /// decides the call
    pub kind: EntryKind,
    /// block argument
    pub unlock_block: u32,
    /// para id argument
    pub para_id: u32,
    /// account whose funds are released
    pub depositor: Option<String>,
}

impl UnlockAction {
    /// Unlock of `entry` on behalf of its own account
    pub fn from_entry(entry: &Entry) -> Self {
        UnlockAction {
            kind: entry.kind(),
            unlock_block: entry.unlock_block(),
            para_id: entry.para_id(),
            depositor: Some(entry.account().clone()),
        }
    }

    /// Call name inside the pallet
    pub fn call_name(&self) -> &'static str {
        self.kind.unlock_call()
    }

    /// `{"pallet": "AhOps", "call": .., "args": {..}}`, the form handed to signers.
    pub fn to_json(&self) -> Value {
        json!({
            "pallet": "AhOps",
            "call": self.call_name(),
            "args": {
                "block": self.unlock_block,
                "depositor": self.depositor,
                "para_id": self.para_id,
            },
        })
    }
}

/// Signing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// No signer for the account, or the signer could not be reached
    #[error("signer unavailable. {0}")]
    Unavailable(String),
    /// The signer or its user declined
    #[error("signing rejected. {0}")]
    Rejected(String),
}

/// Signs unlock actions for one account.
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
    /// Account the signer signs for, if it knows.
    fn account(&self) -> Option<String>;

    /// Returns the signed extrinsic ready for submission.
    async fn sign(&self, action: &UnlockAction) -> Result<Vec<u8>, SignerError>;
}

/// Hands out signers by account.
#[async_trait::async_trait]
pub trait SignerProvider: Send + Sync {
    /// Signer able to sign for `address`.
    async fn get_injector(&self, address: &str) -> Result<Arc<dyn Signer>, SignerError>;
}

/// Why a submission did not reach a block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    /// The signer failed
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// The primary connection failed
    #[error("submission failed. {0}")]
    Client(#[from] ClientError),
    /// invalid, dropped, usurped and similar
    #[error("node rejected the transaction. {0}")]
    Rejected(String),
    /// The node stopped reporting
    #[error("status stream ended before a terminal status")]
    StreamEnded,
}

impl From<SubmissionError> for SubmissionFailure {
    fn from(error: SubmissionError) -> Self {
        match error {
            SubmissionError::Signer(SignerError::Unavailable(reason)) => {
                SubmissionFailure::SignerUnavailable(reason)
            }
            SubmissionError::Signer(SignerError::Rejected(reason)) => {
                SubmissionFailure::Rejected(reason)
            }
            other => SubmissionFailure::Other(other.to_string()),
        }
    }
}

/// Submits unlocks through the primary connection. At most one submission per [`UnlockKey`] is in
/// flight; the last status of each key is kept for display. Nothing is recorded once the connection
/// is torn down.
pub struct UnlockSubmitter<C> {
    connection: Arc<ChainConnection<C>>,
    statuses: Arc<Mutex<HashMap<UnlockKey, SubmissionStatus>>>,
    wait_for_finalization: bool,
    resync_delay: Duration,
    resync_sender: UnboundedSender<EntryKind>,
}

impl<C: ChainClient> UnlockSubmitter<C> {
    /// `resync_sender` receives the kind of every successful unlock `resync_delay` after it resolved.
    pub fn new(
        connection: Arc<ChainConnection<C>>,
        wait_for_finalization: bool,
        resync_delay: Duration,
        resync_sender: UnboundedSender<EntryKind>,
    ) -> Self {
        UnlockSubmitter {
            connection,
            statuses: Arc::new(Mutex::new(HashMap::new())),
            wait_for_finalization,
            resync_delay,
            resync_sender,
        }
    }

    fn lock_statuses(&self) -> MutexGuard<'_, HashMap<UnlockKey, SubmissionStatus>> {
        self.statuses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_alive(&self) -> bool {
        self.connection.liveness().is_alive()
    }

    fn set_status(&self, key: &UnlockKey, status: SubmissionStatus) {
        if !self.is_alive() {
            tracing::debug!("Unlock {}: {} discarded after teardown", key, status);
            return;
        }
        tracing::info!("Unlock {}: {}", key, status);
        self.lock_statuses().insert(key.clone(), status);
    }

    /// Last known status of `key`
    pub fn status(&self, key: &UnlockKey) -> Option<SubmissionStatus> {
        self.lock_statuses().get(key).cloned()
    }

    /// Every known status
    pub fn statuses(&self) -> Vec<(UnlockKey, SubmissionStatus)> {
        let mut statuses: Vec<_> = self
            .lock_statuses()
            .iter()
            .map(|(key, status)| (key.clone(), status.clone()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Forgets resolved submissions. In-flight ones are kept.
    pub fn clear_terminal(&self) {
        self.lock_statuses().retain(|_, status| !status.is_terminal());
    }

    /// Unlocks `entry` and resolves once the submission is terminal.
    ///
    /// Returns `None` without touching the signer if an unlock of the same entry is still in flight,
    /// or if the connection has been torn down.
    pub async fn submit(
        &self,
        entry: &Entry,
        provider: &dyn SignerProvider,
    ) -> Option<SubmissionStatus> {
        let key = entry.unlock_key();
        if !self.is_alive() {
            tracing::debug!("Unlock {} ignored after teardown.", key);
            return None;
        }
        {
            let mut statuses = self.lock_statuses();
            if statuses.get(&key).is_some_and(|status| !status.is_terminal()) {
                tracing::debug!("Unlock {} already in flight.", key);
                return None;
            }
            statuses.insert(key.clone(), SubmissionStatus::Signing);
        }
        tracing::info!("Unlock {}: {}", key, SubmissionStatus::Signing);

        let status = match self.run(&key, entry, provider).await {
            Ok(status) => status,
            Err(e) => SubmissionStatus::Failed(e.into()),
        };
        self.set_status(&key, status.clone());
        if status.is_success() && self.is_alive() {
            self.schedule_resync(entry.kind());
        }

        Some(status)
    }

    async fn run(
        &self,
        key: &UnlockKey,
        entry: &Entry,
        provider: &dyn SignerProvider,
    ) -> Result<SubmissionStatus, SubmissionError> {
        let action = UnlockAction::from_entry(entry);
        let signer = provider.get_injector(entry.account()).await?;
        let extrinsic = signer.sign(&action).await?;
        let client = self.connection.client()?;
        let mut events = client.submit(&extrinsic).await?;
        self.set_status(key, SubmissionStatus::Including);

        while let Some(event) = events.recv().await {
            match event {
                TxEvent::Ready | TxEvent::Broadcast => {}
                TxEvent::InBlock { dispatch_error, .. } => {
                    if let Some(dispatch_error) = dispatch_error {
                        return Ok(SubmissionStatus::Failed(SubmissionFailure::Dispatch(
                            dispatch_error,
                        )));
                    }
                    if !self.wait_for_finalization {
                        return Ok(SubmissionStatus::Success);
                    }
                    self.set_status(key, SubmissionStatus::Finalizing);
                }
                TxEvent::Finalized { dispatch_error, .. } => {
                    return Ok(match dispatch_error {
                        Some(dispatch_error) => {
                            SubmissionStatus::Failed(SubmissionFailure::Dispatch(dispatch_error))
                        }
                        None => SubmissionStatus::Success,
                    });
                }
                TxEvent::Rejected(reason) => return Err(SubmissionError::Rejected(reason)),
            }
        }

        Err(SubmissionError::StreamEnded)
    }

    fn schedule_resync(&self, kind: EntryKind) {
        let resync_sender = self.resync_sender.clone();
        let resync_delay = self.resync_delay;
        tokio::spawn(async move {
            tokio::time::sleep(resync_delay).await;
            if resync_sender.send(kind).is_err() {
                tracing::debug!("Resync listener gone.");
            }
        });
    }
}
