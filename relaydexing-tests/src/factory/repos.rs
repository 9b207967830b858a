use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use relaydexing::events::EventIdentity;
use relaydexing::relays::QueuedLifecycleChange;
use relaydexing::webhooks::{WebhookDeliveryFailure, WebhookFilter, WebhookSubscription};
use relaydexing::{
    ChainEvent, LifecycleChange, MemoryRepo, RelayHashInfo, Repo, RepoError, ScanProgress,
};
use uuid::Uuid;

/// A [`MemoryRepo`] whose scan progress writes and webhook filter reads can
/// be made to fail a given number of times.
#[derive(Clone, Debug, Default)]
pub struct FlakyRepo {
    inner: MemoryRepo,
    scan_advance_failures: Arc<AtomicU32>,
    filter_read_failures: Arc<AtomicU32>,
}

impl FlakyRepo {
    pub fn new(inner: MemoryRepo) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_next_scan_advances(&self, count: u32) {
        self.scan_advance_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_filter_reads(&self, count: u32) {
        self.filter_read_failures.store(count, Ordering::SeqCst);
    }

    fn take_failure(failures: &AtomicU32) -> Result<(), RepoError> {
        let failed = failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();

        match failed {
            true => Err(RepoError::NotConnected),
            false => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Repo for FlakyRepo {
    async fn migrate(&self) -> Result<(), RepoError> {
        self.inner.migrate().await
    }

    async fn get_scan_progress(&self, source_id: &str) -> Result<Option<ScanProgress>, RepoError> {
        self.inner.get_scan_progress(source_id).await
    }

    async fn advance_latest_scanned_block(
        &self,
        source_id: &str,
        block_number: i64,
        is_backfilling: bool,
    ) -> Result<bool, RepoError> {
        Self::take_failure(&self.scan_advance_failures)?;

        self.inner.advance_latest_scanned_block(source_id, block_number, is_backfilling).await
    }

    async fn advance_last_finalized_block(
        &self,
        source_id: &str,
        block_number: i64,
    ) -> Result<bool, RepoError> {
        self.inner.advance_last_finalized_block(source_id, block_number).await
    }

    async fn get_active_event(
        &self,
        identity: &EventIdentity,
    ) -> Result<Option<ChainEvent>, RepoError> {
        self.inner.get_active_event(identity).await
    }

    async fn create_event(&self, event: &ChainEvent) -> Result<bool, RepoError> {
        self.inner.create_event(event).await
    }

    async fn invalidate_and_replace(
        &self,
        invalidated_id: Uuid,
        replacement: &ChainEvent,
    ) -> Result<bool, RepoError> {
        self.inner.invalidate_and_replace(invalidated_id, replacement).await
    }

    async fn invalidate_events(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        self.inner.invalidate_events(ids).await
    }

    async fn get_active_events_in_range(
        &self,
        chain_id: i64,
        from_block_number: i64,
        to_block_number: i64,
    ) -> Result<Vec<ChainEvent>, RepoError> {
        self.inner.get_active_events_in_range(chain_id, from_block_number, to_block_number).await
    }

    async fn finalize_events(
        &self,
        chain_id: i64,
        up_to_block_number: i64,
    ) -> Result<u64, RepoError> {
        self.inner.finalize_events(chain_id, up_to_block_number).await
    }

    async fn get_active_relay_events(
        &self,
        relay_hash: &str,
    ) -> Result<Vec<ChainEvent>, RepoError> {
        self.inner.get_active_relay_events(relay_hash).await
    }

    async fn get_active_events_by_transaction(
        &self,
        chain_id: i64,
        transaction_hash: &str,
    ) -> Result<Vec<ChainEvent>, RepoError> {
        self.inner.get_active_events_by_transaction(chain_id, transaction_hash).await
    }

    async fn get_unmatched_fill_relay_hashes(&self, limit: i64) -> Result<Vec<String>, RepoError> {
        self.inner.get_unmatched_fill_relay_hashes(limit).await
    }

    async fn get_relay_hash_info(
        &self,
        relay_hash: &str,
    ) -> Result<Option<RelayHashInfo>, RepoError> {
        self.inner.get_relay_hash_info(relay_hash).await
    }

    async fn create_relay_hash_info(
        &self,
        info: &RelayHashInfo,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError> {
        self.inner.create_relay_hash_info(info, change).await
    }

    async fn update_relay_hash_info(
        &self,
        info: &RelayHashInfo,
        expected_version: i64,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError> {
        self.inner.update_relay_hash_info(info, expected_version, change).await
    }

    async fn delete_relay_hash_info(
        &self,
        relay_hash: &str,
        expected_version: i64,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError> {
        self.inner.delete_relay_hash_info(relay_hash, expected_version, change).await
    }

    async fn get_unenriched_relay_hash_infos(
        &self,
        limit: i64,
    ) -> Result<Vec<RelayHashInfo>, RepoError> {
        self.inner.get_unenriched_relay_hash_infos(limit).await
    }

    async fn mark_enrichment_attempted(
        &self,
        relay_hash: &str,
        attempted_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        self.inner.mark_enrichment_attempted(relay_hash, attempted_at).await
    }

    async fn get_queued_lifecycle_changes(
        &self,
        source_id: &str,
        limit: i64,
    ) -> Result<Vec<QueuedLifecycleChange>, RepoError> {
        self.inner.get_queued_lifecycle_changes(source_id, limit).await
    }

    async fn delete_queued_lifecycle_change(&self, id: Uuid) -> Result<(), RepoError> {
        self.inner.delete_queued_lifecycle_change(id).await
    }

    async fn create_webhook_subscription(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<(), RepoError> {
        self.inner.create_webhook_subscription(subscription).await
    }

    async fn get_webhook_subscription(
        &self,
        client_id: &str,
    ) -> Result<Option<WebhookSubscription>, RepoError> {
        self.inner.get_webhook_subscription(client_id).await
    }

    async fn create_webhook_filter(&self, filter: &WebhookFilter) -> Result<bool, RepoError> {
        self.inner.create_webhook_filter(filter).await
    }

    async fn get_webhook_filters(&self) -> Result<Vec<WebhookFilter>, RepoError> {
        Self::take_failure(&self.filter_read_failures)?;

        self.inner.get_webhook_filters().await
    }

    async fn create_webhook_delivery_failure(
        &self,
        failure: &WebhookDeliveryFailure,
    ) -> Result<(), RepoError> {
        self.inner.create_webhook_delivery_failure(failure).await
    }

    async fn get_webhook_delivery_failures(
        &self,
    ) -> Result<Vec<WebhookDeliveryFailure>, RepoError> {
        self.inner.get_webhook_delivery_failures().await
    }
}
