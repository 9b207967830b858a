use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use relaydexing::prices::PriceError;
use relaydexing::{ChainId, PriceSource, TokenPrice, TokenRef};

use super::{input_token, output_token, DESTINATION_CHAIN_ID, ORIGIN_CHAIN_ID};

#[derive(Default)]
pub struct FixedPriceSource {
    prices: HashMap<(ChainId, TokenRef), TokenPrice>,
    calls: AtomicUsize,
}

impl FixedPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both relay tokens at one dollar and the destination's native token at 2000
    pub fn with_stablecoins() -> Self {
        Self::new()
            .with_price(ORIGIN_CHAIN_ID, TokenRef::Erc20(input_token()), 1.0)
            .with_price(DESTINATION_CHAIN_ID, TokenRef::Erc20(output_token()), 1.0)
            .with_price(DESTINATION_CHAIN_ID, TokenRef::Native, 2000.0)
    }

    pub fn with_price(mut self, chain_id: ChainId, token: TokenRef, price_usd: f64) -> Self {
        self.prices.insert((chain_id, token), TokenPrice::new(price_usd, 18));

        self
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PriceSource for FixedPriceSource {
    async fn get_price(
        &self,
        chain_id: ChainId,
        token: &TokenRef,
        _at: DateTime<Utc>,
    ) -> Result<Option<TokenPrice>, PriceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        Ok(self.prices.get(&(chain_id, token.clone())).copied())
    }
}
