use std::fmt::Debug;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::events::{ChainEvent, EventIdentity};
use crate::progress::ScanProgress;
use crate::relays::{LifecycleChange, QueuedLifecycleChange, RelayHashInfo};
use crate::webhooks::{WebhookDeliveryFailure, WebhookFilter, WebhookSubscription};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoError {
    #[error("repo is not connected")]
    NotConnected,
    #[error("repo error: {0}")]
    Unknown(String),
}

impl From<diesel::result::Error> for RepoError {
    fn from(error: diesel::result::Error) -> Self {
        RepoError::Unknown(error.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(error: serde_json::Error) -> Self {
        RepoError::Unknown(error.to_string())
    }
}

impl<E: std::fmt::Display> From<bb8::RunError<E>> for RepoError {
    fn from(error: bb8::RunError<E>) -> Self {
        match error {
            bb8::RunError::TimedOut => RepoError::NotConnected,
            bb8::RunError::User(error) => RepoError::Unknown(error.to_string()),
        }
    }
}

/// Durable storage for scan progress, chain events, relay aggregates and
/// webhook registrations.
///
/// Every conditional write reports whether it took effect instead of
/// failing, so callers decide between retrying and raising.
#[async_trait::async_trait]
pub trait Repo: Sync + Send + Clone + Debug + 'static {
    async fn migrate(&self) -> Result<(), RepoError>;

    async fn get_scan_progress(&self, source_id: &str) -> Result<Option<ScanProgress>, RepoError>;
    /// Creates the source's progress on first use. Returns false when
    /// `block_number` is behind the stored latest scanned block.
    async fn advance_latest_scanned_block(
        &self,
        source_id: &str,
        block_number: i64,
        is_backfilling: bool,
    ) -> Result<bool, RepoError>;
    /// Only applies when `last_finalized_block <= block_number <= latest_scanned_block`
    async fn advance_last_finalized_block(
        &self,
        source_id: &str,
        block_number: i64,
    ) -> Result<bool, RepoError>;

    async fn get_active_event(
        &self,
        identity: &EventIdentity,
    ) -> Result<Option<ChainEvent>, RepoError>;
    /// Returns false when an active event with the same identity already exists
    async fn create_event(&self, event: &ChainEvent) -> Result<bool, RepoError>;
    /// Atomically soft-deletes the active, non-finalized event `invalidated_id`
    /// and inserts `replacement`. Returns false when `invalidated_id` is no
    /// longer active or has been finalized.
    async fn invalidate_and_replace(
        &self,
        invalidated_id: Uuid,
        replacement: &ChainEvent,
    ) -> Result<bool, RepoError>;
    /// Soft-deletes the given events, skipping finalized ones. Returns how many changed.
    async fn invalidate_events(&self, ids: &[Uuid]) -> Result<u64, RepoError>;
    async fn get_active_events_in_range(
        &self,
        chain_id: i64,
        from_block_number: i64,
        to_block_number: i64,
    ) -> Result<Vec<ChainEvent>, RepoError>;
    async fn finalize_events(
        &self,
        chain_id: i64,
        up_to_block_number: i64,
    ) -> Result<u64, RepoError>;
    async fn get_active_relay_events(&self, relay_hash: &str) -> Result<Vec<ChainEvent>, RepoError>;
    async fn get_active_events_by_transaction(
        &self,
        chain_id: i64,
        transaction_hash: &str,
    ) -> Result<Vec<ChainEvent>, RepoError>;
    /// Relay hashes with an active fill but no aggregate yet
    async fn get_unmatched_fill_relay_hashes(&self, limit: i64) -> Result<Vec<String>, RepoError>;

    async fn get_relay_hash_info(
        &self,
        relay_hash: &str,
    ) -> Result<Option<RelayHashInfo>, RepoError>;
    /// Every aggregate write takes the lifecycle change it commits, if any,
    /// and queues it atomically with the write.
    ///
    /// Returns false when a row for the relay hash already exists
    async fn create_relay_hash_info(
        &self,
        info: &RelayHashInfo,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError>;
    /// Returns false unless the stored row is at `expected_version`
    async fn update_relay_hash_info(
        &self,
        info: &RelayHashInfo,
        expected_version: i64,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError>;
    async fn delete_relay_hash_info(
        &self,
        relay_hash: &str,
        expected_version: i64,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError>;
    /// Aggregates with a deposit that have not been priced yet, least
    /// recently attempted first
    async fn get_unenriched_relay_hash_infos(
        &self,
        limit: i64,
    ) -> Result<Vec<RelayHashInfo>, RepoError>;
    /// Records a sweep that could not price the relay without bumping its version
    async fn mark_enrichment_attempted(
        &self,
        relay_hash: &str,
        attempted_at: DateTime<Utc>,
    ) -> Result<(), RepoError>;

    /// Oldest first
    async fn get_queued_lifecycle_changes(
        &self,
        source_id: &str,
        limit: i64,
    ) -> Result<Vec<QueuedLifecycleChange>, RepoError>;
    async fn delete_queued_lifecycle_change(&self, id: Uuid) -> Result<(), RepoError>;

    async fn create_webhook_subscription(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<(), RepoError>;
    async fn get_webhook_subscription(
        &self,
        client_id: &str,
    ) -> Result<Option<WebhookSubscription>, RepoError>;
    /// Returns false when the client already has an identical filter
    async fn create_webhook_filter(&self, filter: &WebhookFilter) -> Result<bool, RepoError>;
    async fn get_webhook_filters(&self) -> Result<Vec<WebhookFilter>, RepoError>;
    async fn create_webhook_delivery_failure(
        &self,
        failure: &WebhookDeliveryFailure,
    ) -> Result<(), RepoError>;
    async fn get_webhook_delivery_failures(&self) -> Result<Vec<WebhookDeliveryFailure>, RepoError>;
}

pub trait RepoMigrations {
    fn create_scan_progress_migration() -> &'static [&'static str];
    fn create_events_migration() -> &'static [&'static str];
    fn create_relay_hash_infos_migration() -> &'static [&'static str];
    fn create_webhooks_migration() -> &'static [&'static str];

    fn get_internal_migrations() -> Vec<&'static str> {
        [
            Self::create_scan_progress_migration(),
            Self::create_events_migration(),
            Self::create_relay_hash_infos_migration(),
            Self::create_webhooks_migration(),
        ]
        .concat()
    }
}

pub struct SQLikeMigrations;

impl SQLikeMigrations {
    pub fn create_scan_progress() -> &'static [&'static str] {
        &["CREATE TABLE IF NOT EXISTS relaydexing_scan_progress (
                source_id VARCHAR PRIMARY KEY,
                latest_scanned_block BIGINT NOT NULL,
                last_finalized_block BIGINT NOT NULL DEFAULT 0,
                is_backfilling BOOLEAN NOT NULL DEFAULT FALSE,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"]
    }

    pub fn create_events() -> &'static [&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS relaydexing_events (
                id uuid PRIMARY KEY,
                chain_id BIGINT NOT NULL,
                block_number BIGINT NOT NULL,
                block_hash VARCHAR NOT NULL,
                transaction_hash VARCHAR NOT NULL,
                log_index INTEGER NOT NULL,
                kind VARCHAR NOT NULL,
                relay_hash VARCHAR,
                payload JSONB NOT NULL,
                finalized BOOLEAN NOT NULL DEFAULT FALSE,
                deleted_at TIMESTAMPTZ,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS relaydexing_events_active_identity
            ON relaydexing_events(chain_id,block_number,transaction_hash,log_index)
            WHERE deleted_at IS NULL",
            "CREATE INDEX IF NOT EXISTS relaydexing_events_relay_hash
            ON relaydexing_events(relay_hash) WHERE deleted_at IS NULL",
            "CREATE INDEX IF NOT EXISTS relaydexing_events_chain_transaction
            ON relaydexing_events(chain_id,transaction_hash) WHERE deleted_at IS NULL",
        ]
    }

    pub fn create_relay_hash_infos() -> &'static [&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS relaydexing_relay_hash_infos (
                relay_hash VARCHAR PRIMARY KEY,
                origin_chain_id BIGINT NOT NULL,
                destination_chain_id BIGINT NOT NULL,
                deposit_id VARCHAR NOT NULL,
                deposit_event_id uuid,
                deposit_tx_hash VARCHAR,
                fill_event_id uuid,
                fill_tx_hash VARCHAR,
                slow_fill_request_event_id uuid,
                status VARCHAR NOT NULL,
                fill_deadline TIMESTAMPTZ NOT NULL,
                integrator_id VARCHAR,
                bridge_fee_usd DOUBLE PRECISION,
                gas_fee_usd DOUBLE PRECISION,
                swap_fee_usd DOUBLE PRECISION,
                input_price_usd DOUBLE PRECISION,
                output_price_usd DOUBLE PRECISION,
                swap_token_price_usd DOUBLE PRECISION,
                version BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                enrichment_attempted_at TIMESTAMPTZ
            )",
            "CREATE INDEX IF NOT EXISTS relaydexing_relay_hash_infos_unenriched
            ON relaydexing_relay_hash_infos(enrichment_attempted_at NULLS FIRST, updated_at)
            WHERE input_price_usd IS NULL AND deposit_event_id IS NOT NULL",
            "CREATE TABLE IF NOT EXISTS relaydexing_lifecycle_change_queue (
                id uuid PRIMARY KEY,
                source_id VARCHAR NOT NULL,
                relay_hash VARCHAR NOT NULL,
                change JSONB NOT NULL,
                queued_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            "CREATE INDEX IF NOT EXISTS relaydexing_lifecycle_change_queue_source
            ON relaydexing_lifecycle_change_queue(source_id,queued_at)",
        ]
    }

    pub fn create_webhooks() -> &'static [&'static str] {
        &[
            "CREATE TABLE IF NOT EXISTS relaydexing_webhook_subscriptions (
                client_id VARCHAR PRIMARY KEY,
                api_key VARCHAR NOT NULL UNIQUE,
                domains TEXT[] NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS relaydexing_webhook_filters (
                id uuid PRIMARY KEY,
                client_id VARCHAR NOT NULL,
                url VARCHAR NOT NULL,
                filter JSONB NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS relaydexing_webhook_filters_client_filter
            ON relaydexing_webhook_filters(client_id,filter)",
            "CREATE TABLE IF NOT EXISTS relaydexing_webhook_delivery_failures (
                id uuid PRIMARY KEY,
                delivery_id VARCHAR NOT NULL,
                filter_id uuid,
                url VARCHAR,
                relay_hash VARCHAR NOT NULL,
                payload JSONB NOT NULL,
                attempts INTEGER NOT NULL,
                last_error TEXT NOT NULL,
                failed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        ]
    }
}
