use crate::events::UnsavedEvent;
use crate::provider::ProviderError;
use crate::ChainId;

#[derive(Debug, thiserror::Error)]
pub enum EventFeedError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("event feed error: {0}")]
    Other(String),
}

/// Normalized bridge events of one chain, as produced by the upstream log decoder.
///
/// Must return the chain's current canonical view of the range, so
/// re-reading a range after a reorg yields the surviving events only.
#[async_trait::async_trait]
pub trait EventFeed: Send + Sync {
    async fn get_events(
        &self,
        chain_id: ChainId,
        from_block_number: u64,
        to_block_number: u64,
    ) -> Result<Vec<UnsavedEvent>, EventFeedError>;
}

/// A feed for chains without bridge activity
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyFeed;

#[async_trait::async_trait]
impl EventFeed for EmptyFeed {
    async fn get_events(
        &self,
        _chain_id: ChainId,
        _from_block_number: u64,
        _to_block_number: u64,
    ) -> Result<Vec<UnsavedEvent>, EventFeedError> {
        Ok(vec![])
    }
}
