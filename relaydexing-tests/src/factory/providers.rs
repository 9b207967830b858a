use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ethers::types::H256;
use relaydexing::{Bytes, ChainId, EventFeed, Provider, ProviderError, Source};

pub struct MockProvider {
    block_number: AtomicU64,
    failures_left: AtomicU32,
    calldata: Mutex<HashMap<H256, Bytes>>,
}

impl MockProvider {
    pub fn new(block_number: u64) -> Self {
        Self {
            block_number: AtomicU64::new(block_number),
            failures_left: AtomicU32::new(0),
            calldata: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.block_number.store(block_number, Ordering::SeqCst);
    }

    /// The next `count` head requests fail
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn add_calldata(&self, transaction_hash: H256, calldata: Bytes) {
        self.calldata.lock().unwrap().insert(transaction_hash, calldata);
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    async fn get_block_number(&self) -> Result<u64, ProviderError> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();

        if failed {
            Err(ProviderError::Ethers(ethers::providers::ProviderError::CustomError(
                "connection reset".to_string(),
            )))
        } else {
            Ok(self.block_number.load(Ordering::SeqCst))
        }
    }

    async fn get_transaction_data(&self, hash: H256) -> Result<Bytes, ProviderError> {
        self.calldata
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .ok_or(ProviderError::TransactionNotFound(hash))
    }
}

/// A source scanning from block 0 with no safety lag
pub fn source(
    chain_id: ChainId,
    provider: &Arc<MockProvider>,
    feed: &Arc<impl EventFeed + 'static>,
) -> Source {
    Source::new(&chain_id.to_string(), chain_id, provider.clone(), feed.clone())
}
