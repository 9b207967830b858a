use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use ethers::types::{Address, U256};
use ethers::utils::{format_units, ConversionError};

use crate::ttl_cache::TtlCache;
use crate::ChainId;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenRef {
    /// The chain's gas token
    Native,
    Erc20(Address),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TokenPrice {
    pub price_usd: f64,
    pub decimals: u32,
}

impl TokenPrice {
    pub fn new(price_usd: f64, decimals: u32) -> Self {
        Self {
            price_usd,
            decimals,
        }
    }

    /// USD value of a raw on-chain amount of this token
    pub fn value_usd(&self, amount: U256) -> Result<f64, PriceError> {
        let units = format_units(amount, self.decimals)?;
        let units: f64 = units.parse().map_err(|_| PriceError::InvalidAmount(units))?;

        Ok(units * self.price_usd)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("price source unavailable: {0}")]
    Unavailable(String),

    #[error("could not convert amount: {0}")]
    Conversion(#[from] ConversionError),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// External USD price lookup. `Ok(None)` means the token is unknown to the source.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_price(
        &self,
        chain_id: ChainId,
        token: &TokenRef,
        at: DateTime<Utc>,
    ) -> Result<Option<TokenPrice>, PriceError>;
}

type PriceKey = (ChainId, TokenRef, NaiveDate);

/// Daily prices cached in front of another [`PriceSource`].
/// Unknown tokens are cached too; errors are not.
pub struct CachedPriceSource {
    inner: Arc<dyn PriceSource>,
    cache: TtlCache<PriceKey, Option<TokenPrice>>,
}

impl CachedPriceSource {
    pub fn new(inner: Arc<dyn PriceSource>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl, max_entries),
        }
    }
}

#[async_trait::async_trait]
impl PriceSource for CachedPriceSource {
    async fn get_price(
        &self,
        chain_id: ChainId,
        token: &TokenRef,
        at: DateTime<Utc>,
    ) -> Result<Option<TokenPrice>, PriceError> {
        let key = (chain_id, token.clone(), at.date_naive());

        if let Some(price) = self.cache.get_if_valid(&key).await {
            return Ok(price);
        }

        let price = self.inner.get_price(chain_id, token, at).await?;
        self.cache.insert(key, price).await;

        Ok(price)
    }
}
