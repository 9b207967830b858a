//! One ingestion worker per source.
//!
//! Each pass reads the chain head, stores the next window of events,
//! re-checks the unfinalized range for reorgs, reconciles affected relays,
//! advances scan progress, finalizes what is deep enough and finally hands
//! queued lifecycle changes to the webhook dispatcher. Changes are queued in
//! the repo along with the aggregate writes, so a pass failing after its
//! reconciliation loses none of them.

mod error;
mod event_feed;
mod ingest_events;
mod maybe_handle_chain_reorg;

pub use error::IngesterError;
pub use event_feed::{EmptyFeed, EventFeed, EventFeedError};

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::event_store::{EventStore, UpsertOutcome};
use crate::progress::{ProgressTracker, ScanProgress, ScanWindow};
use crate::relays::{LifecycleChange, Reconciler};
use crate::{Repo, Source};

/// Queued lifecycle changes read per repo round trip
const QUEUED_CHANGES_BATCH_SIZE: i64 = 500;

/// What one ingestion pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub window: Option<ScanWindow>,
    pub ingested_count: usize,
    pub invalidated_count: usize,
    pub finalized_up_to: Option<u64>,
    pub lifecycle_change_count: usize,
    /// Queued changes handed to the dispatcher, including ones left over
    /// from earlier passes
    pub sent_change_count: usize,
}

pub struct Ingester<R: Repo> {
    source: Source,
    tracker: ProgressTracker<R>,
    event_store: EventStore<R>,
    reconciler: Reconciler<R>,
    changes: mpsc::Sender<LifecycleChange>,
    repo: R,
    provider_backoff: Backoff,
    provider_max_retries: u32,
}

impl<R: Repo> Ingester<R> {
    pub fn new(
        source: Source,
        tracker: ProgressTracker<R>,
        event_store: EventStore<R>,
        reconciler: Reconciler<R>,
        changes: mpsc::Sender<LifecycleChange>,
    ) -> Self {
        Self {
            repo: event_store.get_repo().clone(),
            source,
            tracker,
            event_store,
            reconciler,
            changes,
            provider_backoff: Backoff::from_millis(500, 30_000),
            provider_max_retries: 10,
        }
    }

    pub fn with_provider_retries(mut self, backoff: Backoff, max_retries: u32) -> Self {
        self.provider_backoff = backoff;
        self.provider_max_retries = max_retries;

        self
    }

    /// Runs a pass every `ingestion_interval` until cancelled. Transient
    /// failures are retried on the next tick; fatal ones stop the worker.
    pub fn start(
        self,
        ingestion_interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<(), IngesterError>> {
        tokio::spawn(async move {
            let mut interval = interval(ingestion_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let source_id = self.source.id.clone();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                match self.ingest(&cancel).await {
                    Ok(report) => debug!(%source_id, ?report, "Ingestion pass completed"),
                    Err(IngesterError::Cancelled) => break,
                    Err(error) if error.is_fatal() => {
                        error!(%source_id, %error, "Ingestion stalled");
                        return Err(error);
                    }
                    Err(error) => warn!(%source_id, %error, "Ingestion pass failed; retrying"),
                }
            }

            info!(%source_id, "Ingestion stopped");
            Ok(())
        })
    }

    /// Runs one ingestion pass
    pub async fn ingest(&self, cancel: &CancellationToken) -> Result<IngestReport, IngesterError> {
        let source = &self.source;
        let current_block_number = self.fetch_current_block_number(cancel).await?;
        let progress = self.tracker.get_progress(&source.id).await?;
        let window = self.tracker.get_window(source, current_block_number).await?;

        let upserted = match &window {
            Some(window) => ingest_events::run(source, &self.event_store, window).await?,
            None => vec![],
        };

        let reorg_up_to = match &window {
            Some(window) => window.from.saturating_sub(1),
            None => u64::MAX,
        };
        let reorg_outcome = maybe_handle_chain_reorg::run(
            source,
            &self.event_store,
            progress.as_ref(),
            reorg_up_to,
        )
        .await?;

        // Every event of the window is reconciled, not just changed ones,
        // so a pass that failed after storing its events is repaired on retry.
        let mut touched_events: Vec<_> =
            upserted.iter().map(UpsertOutcome::get_event).collect();
        if let Some(reorg_outcome) = &reorg_outcome {
            touched_events.extend(reorg_outcome.changed_events());
        }
        let relay_hashes: HashSet<_> =
            self.event_store.get_affected_relay_hashes(&touched_events).await?;

        let is_backfilling = window.as_ref().is_some_and(|window| window.is_backfilling);
        let changes = self
            .reconciler
            .reconcile(relay_hashes, &source.id, is_backfilling)
            .await?;
        if !is_backfilling {
            self.reconciler.enrich_pending().await?;
        }

        let latest_scanned_block = match &window {
            Some(window) => {
                self.tracker
                    .mark_scanned(&source.id, window.to, window.is_backfilling)
                    .await?;
                Some(window.to)
            }
            None => progress.as_ref().map(|progress| progress.latest_scanned_block as u64),
        };

        let finalized_up_to = self
            .maybe_finalize(current_block_number, latest_scanned_block, progress.as_ref())
            .await?;

        let lifecycle_change_count = changes.len();
        let sent_change_count = if is_backfilling {
            debug!(
                source_id = %source.id,
                lifecycle_change_count,
                "Not dispatching lifecycle changes while backfilling"
            );
            0
        } else {
            self.send_queued_changes(cancel).await?
        };

        Ok(IngestReport {
            window,
            ingested_count: upserted.iter().filter(|outcome| !outcome.is_unchanged()).count(),
            invalidated_count: reorg_outcome.map_or(0, |outcome| outcome.invalidated.len()),
            finalized_up_to,
            lifecycle_change_count,
            sent_change_count,
        })
    }

    async fn maybe_finalize(
        &self,
        current_block_number: u64,
        latest_scanned_block: Option<u64>,
        progress: Option<&ScanProgress>,
    ) -> Result<Option<u64>, IngesterError> {
        let source = &self.source;
        let (Some(finalized_head), Some(latest_scanned_block)) =
            (source.finalized_head(current_block_number), latest_scanned_block)
        else {
            return Ok(None);
        };

        let up_to = finalized_head.min(latest_scanned_block);
        let last_finalized_block =
            progress.map_or(0, |progress| progress.last_finalized_block as u64);
        if up_to <= last_finalized_block {
            return Ok(None);
        }

        self.event_store.finalize(source, up_to).await?;
        self.tracker.mark_finalized(&source.id, up_to).await?;

        Ok(Some(up_to))
    }

    async fn fetch_current_block_number(
        &self,
        cancel: &CancellationToken,
    ) -> Result<u64, IngesterError> {
        let mut retries_so_far = 0;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(IngesterError::Cancelled),
                result = self.source.provider.get_block_number() => result,
            };

            match result {
                Ok(current_block_number) => return Ok(current_block_number),
                Err(error) if retries_so_far >= self.provider_max_retries => {
                    return Err(error.into());
                }
                Err(error) => {
                    warn!(
                        source_id = %self.source.id,
                        %error,
                        retries_so_far,
                        "Could not fetch chain head"
                    );

                    if !self.provider_backoff.wait(retries_so_far, cancel).await {
                        return Err(IngesterError::Cancelled);
                    }
                    retries_so_far += 1;
                }
            }
        }
    }

    /// Sends this source's queued changes in commit order. A change leaves
    /// the queue only once the dispatcher has accepted it.
    async fn send_queued_changes(
        &self,
        cancel: &CancellationToken,
    ) -> Result<usize, IngesterError> {
        let mut sent_count = 0;

        loop {
            let queued_changes = self
                .repo
                .get_queued_lifecycle_changes(&self.source.id, QUEUED_CHANGES_BATCH_SIZE)
                .await?;
            let is_last_batch = (queued_changes.len() as i64) < QUEUED_CHANGES_BATCH_SIZE;

            for queued in queued_changes {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(IngesterError::Cancelled),
                    sent = self.changes.send(queued.change) => {
                        if sent.is_err() {
                            debug!(
                                source_id = %self.source.id,
                                "Webhook dispatcher is gone; keeping changes queued"
                            );
                            return Ok(sent_count);
                        }
                    }
                }

                if let Err(error) = self.repo.delete_queued_lifecycle_change(queued.id).await {
                    warn!(
                        source_id = %self.source.id,
                        %error,
                        "Sent lifecycle change stays queued and will be sent again"
                    );
                    return Err(error.into());
                }
                sent_count += 1;
            }

            if is_last_batch {
                return Ok(sent_count);
            }
        }
    }
}
