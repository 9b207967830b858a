use crate::event_store::EventStoreError;
use crate::progress::ProgressError;
use crate::provider::ProviderError;
use crate::relays::ReconcilerError;
use crate::RepoError;

use super::EventFeedError;

#[derive(Debug, thiserror::Error)]
pub enum IngesterError {
    #[error("could not fetch chain head: {0}")]
    Provider(#[from] ProviderError),

    #[error("could not fetch events: {0}")]
    Feed(#[from] EventFeedError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Reconciler(#[from] ReconcilerError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("ingestion was cancelled")]
    Cancelled,
}

impl IngesterError {
    /// Fatal errors stall the source's worker instead of being retried
    pub fn is_fatal(&self) -> bool {
        match self {
            IngesterError::Progress(error) => error.is_fatal(),
            IngesterError::EventStore(error) => error.is_fatal(),
            _ => false,
        }
    }
}
