use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::events::{ChainEvent, EventIdentity, EventKind};
use crate::progress::ScanProgress;
use crate::relays::{LifecycleChange, QueuedLifecycleChange, RelayHashInfo};
use crate::webhooks::{WebhookDeliveryFailure, WebhookFilter, WebhookSubscription};

use super::repo::{Repo, RepoError};

#[derive(Debug, Default)]
struct MemoryState {
    scan_progresses: HashMap<String, ScanProgress>,
    events: Vec<ChainEvent>,
    relay_hash_infos: BTreeMap<String, RelayHashInfo>,
    lifecycle_change_queue: Vec<QueuedLifecycleChange>,
    webhook_subscriptions: HashMap<String, WebhookSubscription>,
    webhook_filters: Vec<WebhookFilter>,
    webhook_delivery_failures: Vec<WebhookDeliveryFailure>,
}

impl MemoryState {
    fn find_active_event(&self, identity: &EventIdentity) -> Option<&ChainEvent> {
        self.events.iter().find(|event| event.is_active() && &event.identity() == identity)
    }

    fn active_events(&self) -> impl Iterator<Item = &ChainEvent> {
        self.events.iter().filter(|event| event.is_active())
    }

    fn queue_lifecycle_change(&mut self, change: Option<&LifecycleChange>) {
        if let Some(change) = change {
            self.lifecycle_change_queue.push(QueuedLifecycleChange::new(change));
        }
    }
}

/// Process-local [`Repo`] with the same conditional-write semantics as
/// [`super::PostgresRepo`]. Every operation holds one lock, so each is atomic.
#[derive(Clone, Debug, Default)]
pub struct MemoryRepo {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored event, including invalidated ones, in insertion order
    pub async fn get_all_events(&self) -> Vec<ChainEvent> {
        self.state.lock().await.events.clone()
    }

    pub async fn get_all_relay_hash_infos(&self) -> Vec<RelayHashInfo> {
        self.state.lock().await.relay_hash_infos.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl Repo for MemoryRepo {
    async fn migrate(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn get_scan_progress(&self, source_id: &str) -> Result<Option<ScanProgress>, RepoError> {
        Ok(self.state.lock().await.scan_progresses.get(source_id).cloned())
    }

    async fn advance_latest_scanned_block(
        &self,
        source_id: &str,
        block_number: i64,
        is_backfilling: bool,
    ) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;

        match state.scan_progresses.get_mut(source_id) {
            Some(progress) if progress.latest_scanned_block > block_number => Ok(false),
            Some(progress) => {
                progress.latest_scanned_block = block_number;
                progress.is_backfilling = is_backfilling;
                progress.updated_at = Utc::now();
                Ok(true)
            }
            None => {
                let progress = ScanProgress::new(source_id, block_number as u64, is_backfilling);
                state.scan_progresses.insert(source_id.to_string(), progress);
                Ok(true)
            }
        }
    }

    async fn advance_last_finalized_block(
        &self,
        source_id: &str,
        block_number: i64,
    ) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;

        match state.scan_progresses.get_mut(source_id) {
            Some(progress)
                if progress.last_finalized_block <= block_number
                    && block_number <= progress.latest_scanned_block =>
            {
                progress.last_finalized_block = block_number;
                progress.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_active_event(
        &self,
        identity: &EventIdentity,
    ) -> Result<Option<ChainEvent>, RepoError> {
        Ok(self.state.lock().await.find_active_event(identity).cloned())
    }

    async fn create_event(&self, event: &ChainEvent) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;

        if state.find_active_event(&event.identity()).is_some() {
            return Ok(false);
        }

        state.events.push(event.clone());
        Ok(true)
    }

    async fn invalidate_and_replace(
        &self,
        invalidated_id: Uuid,
        replacement: &ChainEvent,
    ) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;

        let replacement_identity = replacement.identity();
        let conflicts = state
            .active_events()
            .any(|event| event.id != invalidated_id && event.identity() == replacement_identity);
        if conflicts {
            return Ok(false);
        }

        let Some(invalidated) = state
            .events
            .iter_mut()
            .find(|event| event.id == invalidated_id && event.is_active() && !event.finalized)
        else {
            return Ok(false);
        };
        invalidated.deleted_at = Some(Utc::now());

        state.events.push(replacement.clone());
        Ok(true)
    }

    async fn invalidate_events(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        let ids: HashSet<_> = ids.iter().collect();
        let now = Utc::now();
        let mut invalidated_count = 0;

        for event in self.state.lock().await.events.iter_mut() {
            if ids.contains(&event.id) && event.is_active() && !event.finalized {
                event.deleted_at = Some(now);
                invalidated_count += 1;
            }
        }

        Ok(invalidated_count)
    }

    async fn get_active_events_in_range(
        &self,
        chain_id: i64,
        from_block_number: i64,
        to_block_number: i64,
    ) -> Result<Vec<ChainEvent>, RepoError> {
        let state = self.state.lock().await;

        let mut events: Vec<_> = state
            .active_events()
            .filter(|event| {
                event.chain_id == chain_id
                    && from_block_number <= event.block_number
                    && event.block_number <= to_block_number
            })
            .cloned()
            .collect();
        events.sort_by_key(|event| (event.block_number, event.log_index));

        Ok(events)
    }

    async fn finalize_events(
        &self,
        chain_id: i64,
        up_to_block_number: i64,
    ) -> Result<u64, RepoError> {
        let mut finalized_count = 0;

        for event in self.state.lock().await.events.iter_mut() {
            if event.is_active()
                && !event.finalized
                && event.chain_id == chain_id
                && event.block_number <= up_to_block_number
            {
                event.finalized = true;
                finalized_count += 1;
            }
        }

        Ok(finalized_count)
    }

    async fn get_active_relay_events(
        &self,
        relay_hash: &str,
    ) -> Result<Vec<ChainEvent>, RepoError> {
        let state = self.state.lock().await;

        Ok(state
            .active_events()
            .filter(|event| event.relay_hash.as_deref() == Some(relay_hash))
            .cloned()
            .collect())
    }

    async fn get_active_events_by_transaction(
        &self,
        chain_id: i64,
        transaction_hash: &str,
    ) -> Result<Vec<ChainEvent>, RepoError> {
        let state = self.state.lock().await;

        Ok(state
            .active_events()
            .filter(|event| {
                event.chain_id == chain_id && event.transaction_hash == transaction_hash
            })
            .cloned()
            .collect())
    }

    async fn get_unmatched_fill_relay_hashes(&self, limit: i64) -> Result<Vec<String>, RepoError> {
        let state = self.state.lock().await;

        let unmatched: HashSet<_> = state
            .active_events()
            .filter(|event| event.is_kind(EventKind::Fill))
            .filter_map(|event| event.relay_hash.as_ref())
            .filter(|relay_hash| !state.relay_hash_infos.contains_key(*relay_hash))
            .cloned()
            .collect();
        let mut unmatched: Vec<_> = unmatched.into_iter().collect();
        unmatched.sort();
        unmatched.truncate(limit.max(0) as usize);

        Ok(unmatched)
    }

    async fn get_relay_hash_info(
        &self,
        relay_hash: &str,
    ) -> Result<Option<RelayHashInfo>, RepoError> {
        Ok(self.state.lock().await.relay_hash_infos.get(relay_hash).cloned())
    }

    async fn create_relay_hash_info(
        &self,
        info: &RelayHashInfo,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;

        if state.relay_hash_infos.contains_key(&info.relay_hash) {
            return Ok(false);
        }

        state.relay_hash_infos.insert(info.relay_hash.clone(), info.clone());
        state.queue_lifecycle_change(change);
        Ok(true)
    }

    async fn update_relay_hash_info(
        &self,
        info: &RelayHashInfo,
        expected_version: i64,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;

        match state.relay_hash_infos.get_mut(&info.relay_hash) {
            Some(stored) if stored.version == expected_version => {
                *stored = info.clone();
                state.queue_lifecycle_change(change);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_relay_hash_info(
        &self,
        relay_hash: &str,
        expected_version: i64,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;

        match state.relay_hash_infos.get(relay_hash) {
            Some(stored) if stored.version == expected_version => {
                state.relay_hash_infos.remove(relay_hash);
                state.queue_lifecycle_change(change);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_unenriched_relay_hash_infos(
        &self,
        limit: i64,
    ) -> Result<Vec<RelayHashInfo>, RepoError> {
        let state = self.state.lock().await;

        let mut unenriched: Vec<_> = state
            .relay_hash_infos
            .values()
            .filter(|info| info.has_deposit() && !info.has_economics())
            .collect();
        // Never attempted sorts first, as `None < Some(_)`.
        unenriched.sort_by_key(|info| info.enrichment_attempted_at);

        Ok(unenriched.into_iter().take(limit.max(0) as usize).cloned().collect())
    }

    async fn mark_enrichment_attempted(
        &self,
        relay_hash: &str,
        attempted_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        if let Some(info) = self.state.lock().await.relay_hash_infos.get_mut(relay_hash) {
            info.enrichment_attempted_at = Some(attempted_at);
        }

        Ok(())
    }

    async fn get_queued_lifecycle_changes(
        &self,
        source_id: &str,
        limit: i64,
    ) -> Result<Vec<QueuedLifecycleChange>, RepoError> {
        let state = self.state.lock().await;

        Ok(state
            .lifecycle_change_queue
            .iter()
            .filter(|queued| queued.change.source_id == source_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn delete_queued_lifecycle_change(&self, id: Uuid) -> Result<(), RepoError> {
        self.state.lock().await.lifecycle_change_queue.retain(|queued| queued.id != id);

        Ok(())
    }

    async fn create_webhook_subscription(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<(), RepoError> {
        self.state
            .lock()
            .await
            .webhook_subscriptions
            .insert(subscription.client_id.clone(), subscription.clone());

        Ok(())
    }

    async fn get_webhook_subscription(
        &self,
        client_id: &str,
    ) -> Result<Option<WebhookSubscription>, RepoError> {
        Ok(self.state.lock().await.webhook_subscriptions.get(client_id).cloned())
    }

    async fn create_webhook_filter(&self, filter: &WebhookFilter) -> Result<bool, RepoError> {
        let mut state = self.state.lock().await;

        let is_duplicate = state
            .webhook_filters
            .iter()
            .any(|existing| {
                existing.client_id == filter.client_id && existing.filter == filter.filter
            });
        if is_duplicate {
            return Ok(false);
        }

        state.webhook_filters.push(filter.clone());
        Ok(true)
    }

    async fn get_webhook_filters(&self) -> Result<Vec<WebhookFilter>, RepoError> {
        Ok(self.state.lock().await.webhook_filters.clone())
    }

    async fn create_webhook_delivery_failure(
        &self,
        failure: &WebhookDeliveryFailure,
    ) -> Result<(), RepoError> {
        self.state.lock().await.webhook_delivery_failures.push(failure.clone());

        Ok(())
    }

    async fn get_webhook_delivery_failures(
        &self,
    ) -> Result<Vec<WebhookDeliveryFailure>, RepoError> {
        Ok(self.state.lock().await.webhook_delivery_failures.clone())
    }
}
