use std::fmt::Debug;
use std::sync::Arc;

use crate::finality::ConfirmationDepth;
use crate::ingester::EventFeed;
use crate::provider::Provider;

/// Represents the network ID for an EVM Chain, e.g. `1` for Ethereum mainnet
/// or `42161` for Arbitrum One.
pub type ChainId = u64;

/// A logical scan source. There is one per chain, or one per chain and mode
/// when a chain is scanned by more than one worker (e.g. `"1"` and `"1:backfill"`).
///
/// Each source owns exactly one scan progress row and is the only writer of it.
#[derive(Clone)]
pub struct Source {
    pub id: String,
    pub chain_id: ChainId,
    pub start_block_number: u64,
    /// Blocks behind the head that are never scanned
    pub safety_lag: u64,
    pub finality_depth: ConfirmationDepth,
    pub provider: Arc<dyn Provider>,
    pub feed: Arc<dyn EventFeed>,
}

impl Source {
    /// Builds a scan source for a chain
    ///
    ///
    /// # Example
    /// ```ignore
    /// use relaydexing::Source;
    ///
    /// Source::new("42161", 42161, provider, feed).with_start_block_number(190_000_000);
    /// ```
    pub fn new(
        id: &str,
        chain_id: ChainId,
        provider: Arc<dyn Provider>,
        feed: Arc<dyn EventFeed>,
    ) -> Self {
        Self {
            id: id.to_string(),
            chain_id,
            start_block_number: 0,
            safety_lag: 0,
            finality_depth: ConfirmationDepth::new(64),
            provider,
            feed,
        }
    }

    pub fn with_start_block_number(mut self, start_block_number: u64) -> Self {
        self.start_block_number = start_block_number;

        self
    }

    pub fn with_safety_lag(mut self, safety_lag: u64) -> Self {
        self.safety_lag = safety_lag;

        self
    }

    pub fn with_finality_depth(mut self, finality_depth: u64) -> Self {
        self.finality_depth = ConfirmationDepth::new(finality_depth);

        self
    }

    /// Highest block this source may scan given the chain's head
    pub fn safe_head(&self, current_block_number: u64) -> Option<u64> {
        current_block_number.checked_sub(self.safety_lag)
    }

    /// Highest block considered final given the chain's head
    pub fn finalized_head(&self, current_block_number: u64) -> Option<u64> {
        self.finality_depth.deduct_from(current_block_number)
    }
}

impl Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("chain_id", &self.chain_id)
            .field("start_block_number", &self.start_block_number)
            .field("safety_lag", &self.safety_lag)
            .field("finality_depth", &self.finality_depth)
            .finish()
    }
}
