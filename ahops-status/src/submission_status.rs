//! An unlock submission moves through signing, inclusion and finalization before it resolves.

/// A module-level dispatch error as reported by the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchError {
    /// pallet the error was raised in
    pub section: String,
    /// error variant name
    pub name: String,
    /// human readable description, possibly empty
    pub description: String,
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.section, self.name)?;
        if !self.description.is_empty() {
            write!(f, ": {}", self.description)?;
        }
        Ok(())
    }
}

/// Why a submission ended in [`SubmissionStatus::Failed`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionFailure {
    /// No signer could be obtained for the account.
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
    /// The signer refused or the user rejected the request.
    #[error("signing rejected: {0}")]
    Rejected(String),
    /// The chain executed the call and it failed in a pallet.
    #[error("dispatch error {0}")]
    Dispatch(DispatchError),
    /// Anything without a decoded form.
    #[error("{0}")]
    Other(String),
}

/// `Signing -> Including -> Finalizing -> (Success | Failed)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// the signer has been invoked
    Signing,
    /// signed and handed to the node, waiting for a block
    Including,
    /// seen in a block, waiting for finality
    Finalizing,
    /// finalized without a dispatch error
    Success,
    /// terminal failure
    Failed(SubmissionFailure),
}

impl SubmissionStatus {
    /// Success and Failed release the per-entry guard.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed(_))
    }
    /// Returns true if the submission resolved successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use SubmissionStatus::*;
        match self {
            Signing => write!(f, "waiting for signature"),
            Including => write!(f, "waiting for inclusion"),
            Finalizing => write!(f, "waiting for finalization"),
            Success => write!(f, "unlocked"),
            Failed(failure) => write!(f, "failed: {}", failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resolved_states_are_terminal() {
        assert!(!SubmissionStatus::Signing.is_terminal());
        assert!(!SubmissionStatus::Including.is_terminal());
        assert!(!SubmissionStatus::Finalizing.is_terminal());
        assert!(SubmissionStatus::Success.is_terminal());
        assert!(
            SubmissionStatus::Failed(SubmissionFailure::Other("dropped".to_string())).is_terminal()
        );
    }

    #[test]
    fn dispatch_error_display() {
        let failure = SubmissionFailure::Dispatch(DispatchError {
            section: "ahOps".to_string(),
            name: "NoLeaseReserve".to_string(),
            description: "The lease reserve does not exist".to_string(),
        });
        assert_eq!(
            SubmissionStatus::Failed(failure).to_string(),
            "failed: dispatch error ahOps.NoLeaseReserve: The lease reserve does not exist"
        );
    }
}
