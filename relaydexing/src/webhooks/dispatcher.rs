use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::relays::LifecycleChange;
use crate::{Repo, RepoError};

use super::delivery::{self, DeliveryOutcome, WebhookPayload};
use super::{matching, FilterCache, WebhookFilter, WebhookTransport};

const DISPATCHER_STOPPED: &str = "dispatcher stopped before dispatching the change";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Requests made per delivery before it is recorded as failed
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Lifecycle changes dispatched at the same time
    pub delivery_concurrency: usize,
    /// Pending lifecycle changes buffered between ingestion and dispatch
    pub queue_capacity: usize,
    pub filter_cache_ttl_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            delivery_concurrency: 8,
            queue_capacity: 10_000,
            filter_cache_ttl_ms: 30_000,
            request_timeout_ms: 10_000,
        }
    }
}

/// Delivers lifecycle changes to every matching webhook filter.
///
/// Runs apart from ingestion: changes arrive through a bounded channel and
/// a slow endpoint only ever holds up its own delivery.
#[derive(Clone)]
pub struct WebhookDispatcher<R: Repo> {
    repo: R,
    filters: Arc<FilterCache<R>>,
    transport: Arc<dyn WebhookTransport>,
    config: WebhookConfig,
    backoff: Backoff,
}

impl<R: Repo> WebhookDispatcher<R> {
    pub fn new(repo: R, transport: Arc<dyn WebhookTransport>, config: WebhookConfig) -> Self {
        let filter_cache_ttl = Duration::from_millis(config.filter_cache_ttl_ms);

        Self {
            filters: Arc::new(FilterCache::new(repo.clone(), filter_cache_ttl)),
            backoff: Backoff::from_millis(config.base_backoff_ms, config.max_backoff_ms),
            repo,
            transport,
            config,
        }
    }

    /// Delivers `change` to every matching filter and records deliveries
    /// that did not succeed. Changes from a backfilling source are dropped.
    ///
    /// Repo reads made before any delivery are retried with backoff, so a
    /// transient repo outage never drops a change.
    pub async fn dispatch(
        &self,
        change: &LifecycleChange,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeliveryOutcome>, RepoError> {
        let source_id = &change.source_id;
        let is_backfilling =
            self.retry_repo_read(cancel, move || self.is_backfilling(source_id)).await?;
        if is_backfilling {
            debug!(
                relay_hash = %change.relay_hash,
                source_id = %change.source_id,
                "Dropping lifecycle change from backfilling source"
            );
            return Ok(vec![]);
        }

        let filters = self.retry_repo_read(cancel, move || self.filters.get_filters()).await?;
        let attributes = change.attributes();
        let matching_filters: Vec<&WebhookFilter> = filters
            .iter()
            .filter(|filter| matching::matches(&filter.filter, &attributes))
            .collect();

        let deliveries = matching_filters
            .into_iter()
            .map(|filter| self.deliver_to_filter(filter, change, cancel));

        join_all(deliveries).await.into_iter().collect()
    }

    async fn deliver_to_filter(
        &self,
        filter: &WebhookFilter,
        change: &LifecycleChange,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, RepoError> {
        let payload = WebhookPayload::new(change);

        let outcome = delivery::deliver(
            self.transport.as_ref(),
            &filter.url,
            &payload,
            self.config.max_attempts,
            &self.backoff,
            cancel,
        )
        .await;

        if let Some(failure) = outcome.to_failure(filter, &payload) {
            error!(
                delivery_id = %payload.id,
                filter_id = %filter.id,
                url = %filter.url,
                attempts = failure.attempts,
                last_error = %failure.last_error,
                "Webhook delivery failed"
            );
            self.repo.create_webhook_delivery_failure(&failure).await?;
        }

        Ok(outcome)
    }

    async fn is_backfilling(&self, source_id: &str) -> Result<bool, RepoError> {
        let progress = self.repo.get_scan_progress(source_id).await?;

        Ok(progress.is_some_and(|progress| progress.is_backfilling))
    }

    /// Runs `read` up to `max_attempts` times, backing off between attempts.
    /// Gives up early with the last error once `cancel` fires.
    async fn retry_repo_read<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut read: F,
    ) -> Result<T, RepoError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut retries_so_far = 0;

        loop {
            match read().await {
                Ok(value) => return Ok(value),
                Err(error) if retries_so_far + 1 < max_attempts => {
                    warn!(%error, retries_so_far, "Retrying repo read before dispatch");

                    if !self.backoff.wait(retries_so_far, cancel).await {
                        return Err(error);
                    }
                    retries_so_far += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Records a change that never reached its filters
    async fn record_undispatched(&self, change: &LifecycleChange, reason: &str) {
        let failure = delivery::undispatched_failure(change, reason);

        warn!(
            relay_hash = %change.relay_hash,
            source_id = %change.source_id,
            reason,
            "Recording undispatched lifecycle change"
        );

        if let Err(error) = self.repo.create_webhook_delivery_failure(&failure).await {
            error!(
                relay_hash = %change.relay_hash,
                %error,
                "Could not record undispatched lifecycle change"
            );
        }
    }

    /// Consumes lifecycle changes until the channel closes or `cancel` fires,
    /// dispatching up to `delivery_concurrency` changes at a time.
    ///
    /// The returned handle completes only after every started dispatch has
    /// finished. Changes still queued when `cancel` fires are recorded as
    /// delivery failures.
    pub fn start(
        self,
        mut changes: mpsc::Receiver<LifecycleChange>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let permits = Arc::new(Semaphore::new(self.config.delivery_concurrency.max(1)));

        tokio::spawn(async move {
            let mut dispatches = JoinSet::new();

            loop {
                let change = tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    Some(joined) = dispatches.join_next(), if !dispatches.is_empty() => {
                        log_panicked_dispatch(joined);
                        continue;
                    }
                    change = changes.recv() => match change {
                        Some(change) => change,
                        None => break,
                    },
                };

                let permit = tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        self.record_undispatched(&change, DISPATCHER_STOPPED).await;
                        break;
                    }
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_closed) => {
                            self.record_undispatched(&change, DISPATCHER_STOPPED).await;
                            break;
                        }
                    },
                };

                let dispatcher = self.clone();
                let cancel = cancel.clone();
                dispatches.spawn(async move {
                    if let Err(error) = dispatcher.dispatch(&change, &cancel).await {
                        error!(
                            relay_hash = %change.relay_hash,
                            %error,
                            "Could not dispatch lifecycle change"
                        );
                        dispatcher.record_undispatched(&change, &error.to_string()).await;
                    }
                    drop(permit);
                });
            }

            changes.close();
            while let Ok(change) = changes.try_recv() {
                self.record_undispatched(&change, DISPATCHER_STOPPED).await;
            }

            while let Some(joined) = dispatches.join_next().await {
                log_panicked_dispatch(joined);
            }

            info!("Webhook dispatcher stopped");
        })
    }
}

fn log_panicked_dispatch(joined: Result<(), JoinError>) {
    if let Err(error) = joined {
        error!(%error, "Lifecycle change dispatch panicked");
    }
}
