use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use reqwest::Url;

use crate::prices::PriceSource;
use crate::relays::{ReconcilerConfig, StatusPolicy};
use crate::webhooks::{WebhookConfig, WebhookTransport};
use crate::{Repo, Source};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one source is required")]
    NoSources,
    #[error("source id {0} is used more than once")]
    DuplicateSource(String),
    #[error("blocks per batch must be greater than zero")]
    ZeroBlocksPerBatch,
    #[error("webhook deliveries need at least one attempt")]
    ZeroWebhookAttempts,
    #[error("webhook delivery concurrency must be greater than zero")]
    ZeroDeliveryConcurrency,
    #[error("webhook queue capacity must be greater than zero")]
    ZeroQueueCapacity,
    #[error("invalid database url: {0}")]
    InvalidDatabaseUrl(String),
}

/// Connection parameters for the relational store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DatabaseConfig {
    /// Postgres connection URL with the credentials and database name
    /// percent-encoded.
    pub fn url(&self) -> Result<String, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidDatabaseUrl(reason.to_string());

        let mut url = Url::parse(&format!("postgres://{}:{}", self.host, self.port))
            .map_err(|error| invalid(&error.to_string()))?;
        url.set_username(&self.user).map_err(|_| invalid("user cannot be set"))?;
        url.set_password(Some(&self.password))
            .map_err(|_| invalid("password cannot be set"))?;
        url.path_segments_mut()
            .map_err(|_| invalid("database cannot be set"))?
            .push(&self.database);

        Ok(url.into())
    }
}

#[derive(Clone)]
pub struct Config<R: Repo> {
    pub repo: R,
    pub sources: Vec<Source>,
    pub blocks_per_batch: u64,
    pub ingestion_interval_ms: u64,
    /// Windows ending more than this many blocks behind the safe head are backfill
    pub backfill_threshold: u64,
    pub provider_max_retries: u32,
    pub reconciler: ReconcilerConfig,
    pub webhook: WebhookConfig,
    pub webhook_transport: Option<Arc<dyn WebhookTransport>>,
    pub price_source: Option<Arc<dyn PriceSource>>,
    pub price_cache_ttl_ms: u64,
    pub price_cache_size: usize,
}

impl<R: Repo> Config<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            sources: vec![],
            blocks_per_batch: 1_000,
            ingestion_interval_ms: 10_000,
            backfill_threshold: 5_000,
            provider_max_retries: 10,
            reconciler: ReconcilerConfig::default(),
            webhook: WebhookConfig::default(),
            webhook_transport: None,
            price_source: None,
            price_cache_ttl_ms: 3_600_000,
            price_cache_size: 10_000,
        }
    }

    pub fn add_source(mut self, source: Source) -> Self {
        self.sources.push(source);

        self
    }

    pub fn with_blocks_per_batch(mut self, blocks_per_batch: u64) -> Self {
        self.blocks_per_batch = blocks_per_batch;

        self
    }

    pub fn with_ingestion_interval_ms(mut self, ingestion_interval_ms: u64) -> Self {
        self.ingestion_interval_ms = ingestion_interval_ms;

        self
    }

    pub fn with_backfill_threshold(mut self, backfill_threshold: u64) -> Self {
        self.backfill_threshold = backfill_threshold;

        self
    }

    pub fn with_provider_max_retries(mut self, provider_max_retries: u32) -> Self {
        self.provider_max_retries = provider_max_retries;

        self
    }

    pub fn with_reconciler_config(mut self, reconciler: ReconcilerConfig) -> Self {
        self.reconciler = reconciler;

        self
    }

    pub fn with_status_policy(mut self, status_policy: StatusPolicy) -> Self {
        self.reconciler.status_policy = status_policy;

        self
    }

    pub fn with_webhook_config(mut self, webhook: WebhookConfig) -> Self {
        self.webhook = webhook;

        self
    }

    /// Replaces the default HTTP transport for webhook deliveries
    pub fn with_webhook_transport(mut self, webhook_transport: Arc<dyn WebhookTransport>) -> Self {
        self.webhook_transport = Some(webhook_transport);

        self
    }

    pub fn with_price_source(mut self, price_source: Arc<dyn PriceSource>) -> Self {
        self.price_source = Some(price_source);

        self
    }

    pub fn with_price_cache(mut self, ttl_ms: u64, size: usize) -> Self {
        self.price_cache_ttl_ms = ttl_ms;
        self.price_cache_size = size;

        self
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut source_ids = HashSet::new();
        for source in &self.sources {
            if !source_ids.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateSource(source.id.clone()));
            }
        }

        if self.blocks_per_batch == 0 {
            Err(ConfigError::ZeroBlocksPerBatch)
        } else if self.webhook.max_attempts == 0 {
            Err(ConfigError::ZeroWebhookAttempts)
        } else if self.webhook.delivery_concurrency == 0 {
            Err(ConfigError::ZeroDeliveryConcurrency)
        } else if self.webhook.queue_capacity == 0 {
            Err(ConfigError::ZeroQueueCapacity)
        } else {
            Ok(())
        }
    }
}

impl<R: Repo> Debug for Config<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("repo", &self.repo)
            .field("sources", &self.sources)
            .field("blocks_per_batch", &self.blocks_per_batch)
            .field("ingestion_interval_ms", &self.ingestion_interval_ms)
            .field("backfill_threshold", &self.backfill_threshold)
            .field("reconciler", &self.reconciler)
            .field("webhook", &self.webhook)
            .finish_non_exhaustive()
    }
}
