//! Read access to chain data behind one capability interface.
//!
//! Ingestion only needs two things from a chain client: the current head and
//! the calldata of a transaction. Concrete clients differ in how they expose
//! the latter, so every client is wrapped in an adapter implementing
//! [`Provider`] and callers never branch on which one is active.

use std::sync::Arc;

use alloy::consensus::Transaction as _;
use alloy::primitives::B256;
use alloy::providers::{Provider as _, ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use ethers::prelude::Middleware;
use ethers::providers::{Http as EthersHttp, Provider as EthersProvider};
use ethers::types::H256;

use crate::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("ethers provider error: {0}")]
    Ethers(#[from] ethers::providers::ProviderError),

    #[error("alloy transport error: {0}")]
    Alloy(#[from] alloy::transports::TransportError),

    #[error("transaction not found: {0:?}")]
    TransactionNotFound(H256),

    #[error("invalid json rpc url: {0}")]
    InvalidUrl(String),
}

#[async_trait::async_trait]
pub trait Provider: Sync + Send {
    async fn get_block_number(&self) -> Result<u64, ProviderError>;
    async fn get_transaction_data(&self, hash: H256) -> Result<Bytes, ProviderError>;
}

/// Adapter over an `ethers` HTTP provider. `ethers` exposes calldata as `input`.
#[derive(Clone, Debug)]
pub struct EthersHttpProvider {
    inner: EthersProvider<EthersHttp>,
}

impl EthersHttpProvider {
    pub fn new(json_rpc_url: &str) -> Result<Self, ProviderError> {
        let inner = EthersProvider::<EthersHttp>::try_from(json_rpc_url)
            .map_err(|_| ProviderError::InvalidUrl(json_rpc_url.to_string()))?;

        Ok(Self { inner })
    }
}

#[async_trait::async_trait]
impl Provider for EthersHttpProvider {
    async fn get_block_number(&self) -> Result<u64, ProviderError> {
        Ok(Middleware::get_block_number(&self.inner).await?.as_u64())
    }

    async fn get_transaction_data(&self, hash: H256) -> Result<Bytes, ProviderError> {
        Middleware::get_transaction(&self.inner, hash)
            .await?
            .map(|transaction| transaction.input.to_vec())
            .ok_or(ProviderError::TransactionNotFound(hash))
    }
}

/// Adapter over an `alloy` HTTP provider. `alloy` exposes calldata through its
/// consensus `Transaction` trait rather than a plain field.
#[derive(Clone, Debug)]
pub struct AlloyHttpProvider {
    inner: RootProvider<Http<Client>>,
}

impl AlloyHttpProvider {
    pub fn new(json_rpc_url: &str) -> Result<Self, ProviderError> {
        let url = json_rpc_url
            .parse()
            .map_err(|_| ProviderError::InvalidUrl(json_rpc_url.to_string()))?;

        Ok(Self {
            inner: ProviderBuilder::new().on_http(url),
        })
    }
}

#[async_trait::async_trait]
impl Provider for AlloyHttpProvider {
    async fn get_block_number(&self) -> Result<u64, ProviderError> {
        Ok(self.inner.get_block_number().await?)
    }

    async fn get_transaction_data(&self, hash: H256) -> Result<Bytes, ProviderError> {
        self.inner
            .get_transaction_by_hash(B256::from(hash.0))
            .await?
            .map(|transaction| transaction.input().to_vec())
            .ok_or(ProviderError::TransactionNotFound(hash))
    }
}

/// Concrete client behind a [`Provider`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProviderClient {
    #[default]
    Ethers,
    Alloy,
}

pub fn get(json_rpc_url: &str, client: ProviderClient) -> Result<Arc<dyn Provider>, ProviderError> {
    Ok(match client {
        ProviderClient::Ethers => Arc::new(EthersHttpProvider::new(json_rpc_url)?),
        ProviderClient::Alloy => Arc::new(AlloyHttpProvider::new(json_rpc_url)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_either_client_from_a_json_rpc_url() {
        for client in [ProviderClient::Ethers, ProviderClient::Alloy] {
            assert!(get("http://localhost:8545", client).is_ok());
        }
    }

    #[test]
    fn rejects_invalid_json_rpc_urls() {
        for client in [ProviderClient::Ethers, ProviderClient::Alloy] {
            let error = get("not a url", client).err();

            assert!(matches!(error, Some(ProviderError::InvalidUrl(url)) if url == "not a url"));
        }
    }
}
