//! Reorg-safe lifecycle indexing for cross-chain bridge relays.
//!
//! Bridge events from every configured chain are ingested into an
//! append-only store, correlated by relay hash into one lifecycle
//! aggregate per relay, enriched with USD economics and announced to
//! webhook subscribers as the lifecycle changes.

pub mod backoff;
mod chains;
mod config;
mod diesel;
pub mod event_store;
pub mod events;
mod finality;
pub mod hashes;
pub mod ingester;
pub mod prices;
pub mod progress;
pub mod provider;
pub mod relays;
mod repos;
pub mod ttl_cache;
pub mod webhooks;

pub use chains::{ChainId, Source};
pub use config::{Config, ConfigError, DatabaseConfig};
pub use event_store::{EventStore, EventStoreError};
pub use events::{ChainEvent, EventKind, EventPayload, UnsavedEvent};
pub use finality::ConfirmationDepth;
pub use ingester::{EmptyFeed, EventFeed, EventFeedError, Ingester, IngesterError};
pub use prices::{PriceSource, TokenPrice, TokenRef};
pub use progress::{ProgressTracker, ScanProgress, ScanWindow};
pub use provider::{Provider, ProviderClient, ProviderError};
pub use relays::{LifecycleChange, Reconciler, RelayHashInfo, RelayStatus};
pub use repos::{
    MemoryRepo, PostgresRepo, PostgresRepoConn, PostgresRepoPool, Repo, RepoError,
    RepoMigrations, SQLikeMigrations,
};
pub use webhooks::{WebhookDispatcher, WebhookTransport, WebhookTransportError};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use backoff::Backoff;
use prices::{CachedPriceSource, Enricher};
use webhooks::HttpTransport;

pub type Bytes = Vec<u8>;

#[derive(Debug, thiserror::Error)]
pub enum RelaydexingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("could not build webhook transport: {0}")]
    Transport(#[from] WebhookTransportError),
}

/// Background tasks started by [`index_relays`]
pub struct RelaydexingHandles {
    pub ingesters: Vec<JoinHandle<Result<(), IngesterError>>>,
    pub dispatcher: JoinHandle<()>,
}

impl RelaydexingHandles {
    /// Waits for every ingester, then the dispatcher, to stop.
    /// Returns the first fatal ingester error.
    pub async fn join(self) -> Result<(), IngesterError> {
        let mut first_error = None;

        for ingester in self.ingesters {
            if let Ok(Err(error)) = ingester.await {
                first_error.get_or_insert(error);
            }
        }

        let _ = self.dispatcher.await;

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Migrates the repo, then starts one ingester per source and the webhook
/// dispatcher. Everything stops when `cancel` fires.
pub async fn index_relays<R: Repo>(
    config: &Config<R>,
    cancel: CancellationToken,
) -> Result<RelaydexingHandles, RelaydexingError> {
    config.validate()?;
    config.repo.migrate().await?;

    let transport: Arc<dyn WebhookTransport> = match &config.webhook_transport {
        Some(transport) => transport.clone(),
        None => Arc::new(HttpTransport::new(Duration::from_millis(
            config.webhook.request_timeout_ms,
        ))?),
    };

    let (changes_sender, changes_receiver) = mpsc::channel(config.webhook.queue_capacity);
    let dispatcher = WebhookDispatcher::new(config.repo.clone(), transport, config.webhook.clone())
        .start(changes_receiver, cancel.clone());

    let enricher = build_enricher(config);
    let ingestion_interval = Duration::from_millis(config.ingestion_interval_ms);

    let ingesters = config
        .sources
        .iter()
        .map(|source| {
            let repo = &config.repo;

            Ingester::new(
                source.clone(),
                ProgressTracker::new(
                    repo.clone(),
                    config.blocks_per_batch,
                    config.backfill_threshold,
                ),
                EventStore::new(repo.clone()),
                Reconciler::new(repo.clone(), enricher.clone(), config.reconciler.clone()),
                changes_sender.clone(),
            )
            .with_provider_retries(Backoff::from_millis(500, 30_000), config.provider_max_retries)
            .start(ingestion_interval, cancel.clone())
        })
        .collect();

    info!(source_count = config.sources.len(), "Relay indexing started");

    Ok(RelaydexingHandles {
        ingesters,
        dispatcher,
    })
}

fn build_enricher<R: Repo>(config: &Config<R>) -> Enricher {
    let price_source = config.price_source.clone().map(|price_source| {
        Arc::new(CachedPriceSource::new(
            price_source,
            Duration::from_millis(config.price_cache_ttl_ms),
            config.price_cache_size,
        )) as Arc<dyn PriceSource>
    });

    let providers: HashMap<_, _> = config
        .sources
        .iter()
        .map(|source| (source.chain_id, source.provider.clone()))
        .collect();

    Enricher::new(price_source, providers)
}
