mod migrations;

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use diesel::expression_methods::PgSortExpressionMethods;
use diesel::sql_types::{BigInt, Text};
use diesel::upsert::excluded;
use diesel::{
    sql_query, ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable,
    QueryableByName,
};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::diesel::schema::{
    relaydexing_events as events, relaydexing_lifecycle_change_queue as lifecycle_change_queue,
    relaydexing_relay_hash_infos as relay_hash_infos,
    relaydexing_scan_progress as scan_progress,
    relaydexing_webhook_delivery_failures as webhook_delivery_failures,
    relaydexing_webhook_filters as webhook_filters,
    relaydexing_webhook_subscriptions as webhook_subscriptions,
};
use crate::events::{ChainEvent, EventIdentity, EventKind};
use crate::progress::ScanProgress;
use crate::relays::{LifecycleChange, QueuedLifecycleChange, RelayHashInfo};
use crate::webhooks::{WebhookDeliveryFailure, WebhookFilter, WebhookSubscription};

use super::repo::{Repo, RepoError, RepoMigrations};

pub type Conn<'a> = bb8::PooledConnection<'a, AsyncDieselConnectionManager<AsyncPgConnection>>;
pub type Pool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

#[derive(Clone)]
pub struct PostgresRepo {
    pool: Pool,
}

impl Debug for PostgresRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRepo").field("state", &self.pool.state()).finish()
    }
}

impl PostgresRepo {
    pub async fn new(url: &str, max_pool_size: u32) -> Result<Self, RepoError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);
        let pool = bb8::Pool::builder()
            .max_size(max_pool_size)
            .build(manager)
            .await
            .map_err(|error| RepoError::Unknown(error.to_string()))?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> Pool {
        self.pool.clone()
    }

    async fn get_conn(&self) -> Result<Conn<'_>, RepoError> {
        Ok(self.pool.get().await?)
    }
}

#[derive(QueryableByName)]
struct UnmatchedFill {
    #[diesel(sql_type = Text)]
    relay_hash: String,
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = lifecycle_change_queue)]
struct QueuedLifecycleChangeRow {
    id: Uuid,
    source_id: String,
    relay_hash: String,
    change: serde_json::Value,
    queued_at: DateTime<Utc>,
}

impl QueuedLifecycleChangeRow {
    fn new(change: &LifecycleChange) -> Result<Self, RepoError> {
        Ok(Self {
            id: Uuid::new_v4(),
            source_id: change.source_id.clone(),
            relay_hash: change.relay_hash.clone(),
            change: serde_json::to_value(change)?,
            queued_at: Utc::now(),
        })
    }

    fn into_queued(self) -> Result<QueuedLifecycleChange, RepoError> {
        let mut change: LifecycleChange = serde_json::from_value(self.change)?;
        // `source_id` is not part of the serialized change.
        change.source_id = self.source_id;

        Ok(QueuedLifecycleChange { id: self.id, change })
    }
}

async fn queue_lifecycle_change(
    conn: &mut AsyncPgConnection,
    row: Option<&QueuedLifecycleChangeRow>,
) -> Result<(), diesel::result::Error> {
    if let Some(row) = row {
        diesel::insert_into(lifecycle_change_queue::table).values(row).execute(conn).await?;
    }

    Ok(())
}

#[async_trait::async_trait]
impl Repo for PostgresRepo {
    async fn migrate(&self) -> Result<(), RepoError> {
        let mut conn = self.get_conn().await?;

        for migration in Self::get_internal_migrations() {
            sql_query(migration).execute(&mut *conn).await?;
        }

        Ok(())
    }

    async fn get_scan_progress(&self, source_id: &str) -> Result<Option<ScanProgress>, RepoError> {
        let mut conn = self.get_conn().await?;

        let progress = scan_progress::table
            .filter(scan_progress::source_id.eq(source_id))
            .first::<ScanProgress>(&mut *conn)
            .await
            .optional()?;

        Ok(progress)
    }

    async fn advance_latest_scanned_block(
        &self,
        source_id: &str,
        block_number: i64,
        is_backfilling: bool,
    ) -> Result<bool, RepoError> {
        let mut conn = self.get_conn().await?;

        let updated_count = diesel::update(
            scan_progress::table
                .filter(scan_progress::source_id.eq(source_id))
                .filter(scan_progress::latest_scanned_block.le(block_number)),
        )
        .set((
            scan_progress::latest_scanned_block.eq(block_number),
            scan_progress::is_backfilling.eq(is_backfilling),
            scan_progress::updated_at.eq(Utc::now()),
        ))
        .execute(&mut *conn)
        .await?;

        if updated_count > 0 {
            return Ok(true);
        }

        // Either there is no row yet or the stored block is ahead.
        let progress = ScanProgress::new(source_id, block_number as u64, is_backfilling);
        let inserted_count = diesel::insert_into(scan_progress::table)
            .values(&progress)
            .on_conflict_do_nothing()
            .execute(&mut *conn)
            .await?;

        Ok(inserted_count > 0)
    }

    async fn advance_last_finalized_block(
        &self,
        source_id: &str,
        block_number: i64,
    ) -> Result<bool, RepoError> {
        let mut conn = self.get_conn().await?;

        let updated_count = diesel::update(
            scan_progress::table
                .filter(scan_progress::source_id.eq(source_id))
                .filter(scan_progress::last_finalized_block.le(block_number))
                .filter(scan_progress::latest_scanned_block.ge(block_number)),
        )
        .set((
            scan_progress::last_finalized_block.eq(block_number),
            scan_progress::updated_at.eq(Utc::now()),
        ))
        .execute(&mut *conn)
        .await?;

        Ok(updated_count > 0)
    }

    async fn get_active_event(
        &self,
        identity: &EventIdentity,
    ) -> Result<Option<ChainEvent>, RepoError> {
        let mut conn = self.get_conn().await?;

        let event = events::table
            .filter(events::chain_id.eq(identity.chain_id))
            .filter(events::block_number.eq(identity.block_number))
            .filter(events::transaction_hash.eq(&identity.transaction_hash))
            .filter(events::log_index.eq(identity.log_index))
            .filter(events::deleted_at.is_null())
            .first::<ChainEvent>(&mut *conn)
            .await
            .optional()?;

        Ok(event)
    }

    async fn create_event(&self, event: &ChainEvent) -> Result<bool, RepoError> {
        let mut conn = self.get_conn().await?;

        let inserted_count = diesel::insert_into(events::table)
            .values(event)
            .on_conflict_do_nothing()
            .execute(&mut *conn)
            .await?;

        Ok(inserted_count > 0)
    }

    async fn invalidate_and_replace(
        &self,
        invalidated_id: Uuid,
        replacement: &ChainEvent,
    ) -> Result<bool, RepoError> {
        let mut conn = self.get_conn().await?;

        let replaced = (*conn)
            .transaction::<bool, diesel::result::Error, _>(|conn| {
                async move {
                    let invalidated_count = diesel::update(
                        events::table
                            .filter(events::id.eq(invalidated_id))
                            .filter(events::deleted_at.is_null())
                            .filter(events::finalized.eq(false)),
                    )
                    .set(events::deleted_at.eq(Some(Utc::now())))
                    .execute(conn)
                    .await?;

                    if invalidated_count == 0 {
                        return Ok(false);
                    }

                    let inserted_count = diesel::insert_into(events::table)
                        .values(replacement)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;

                    if inserted_count == 0 {
                        return Err(diesel::result::Error::RollbackTransaction);
                    }

                    Ok(true)
                }
                .scope_boxed()
            })
            .await;

        match replaced {
            Err(diesel::result::Error::RollbackTransaction) => Ok(false),
            replaced => Ok(replaced?),
        }
    }

    async fn invalidate_events(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        let mut conn = self.get_conn().await?;

        let invalidated_count = diesel::update(
            events::table
                .filter(events::id.eq_any(ids.to_vec()))
                .filter(events::deleted_at.is_null())
                .filter(events::finalized.eq(false)),
        )
        .set(events::deleted_at.eq(Some(Utc::now())))
        .execute(&mut *conn)
        .await?;

        Ok(invalidated_count as u64)
    }

    async fn get_active_events_in_range(
        &self,
        chain_id: i64,
        from_block_number: i64,
        to_block_number: i64,
    ) -> Result<Vec<ChainEvent>, RepoError> {
        let mut conn = self.get_conn().await?;

        let active_events = events::table
            .filter(events::chain_id.eq(chain_id))
            .filter(events::block_number.ge(from_block_number))
            .filter(events::block_number.le(to_block_number))
            .filter(events::deleted_at.is_null())
            .order((events::block_number.asc(), events::log_index.asc()))
            .load::<ChainEvent>(&mut *conn)
            .await?;

        Ok(active_events)
    }

    async fn finalize_events(
        &self,
        chain_id: i64,
        up_to_block_number: i64,
    ) -> Result<u64, RepoError> {
        let mut conn = self.get_conn().await?;

        let finalized_count = diesel::update(
            events::table
                .filter(events::chain_id.eq(chain_id))
                .filter(events::block_number.le(up_to_block_number))
                .filter(events::deleted_at.is_null())
                .filter(events::finalized.eq(false)),
        )
        .set(events::finalized.eq(true))
        .execute(&mut *conn)
        .await?;

        Ok(finalized_count as u64)
    }

    async fn get_active_relay_events(
        &self,
        relay_hash: &str,
    ) -> Result<Vec<ChainEvent>, RepoError> {
        let mut conn = self.get_conn().await?;

        let relay_events = events::table
            .filter(events::relay_hash.eq(relay_hash))
            .filter(events::deleted_at.is_null())
            .load::<ChainEvent>(&mut *conn)
            .await?;

        Ok(relay_events)
    }

    async fn get_active_events_by_transaction(
        &self,
        chain_id: i64,
        transaction_hash: &str,
    ) -> Result<Vec<ChainEvent>, RepoError> {
        let mut conn = self.get_conn().await?;

        let transaction_events = events::table
            .filter(events::chain_id.eq(chain_id))
            .filter(events::transaction_hash.eq(transaction_hash))
            .filter(events::deleted_at.is_null())
            .load::<ChainEvent>(&mut *conn)
            .await?;

        Ok(transaction_events)
    }

    async fn get_unmatched_fill_relay_hashes(&self, limit: i64) -> Result<Vec<String>, RepoError> {
        let mut conn = self.get_conn().await?;

        let unmatched_fills: Vec<UnmatchedFill> = sql_query(
            "SELECT DISTINCT e.relay_hash AS relay_hash
            FROM relaydexing_events e
            LEFT JOIN relaydexing_relay_hash_infos r ON r.relay_hash = e.relay_hash
            WHERE e.kind = $1 AND e.deleted_at IS NULL
            AND e.relay_hash IS NOT NULL AND r.relay_hash IS NULL
            ORDER BY e.relay_hash
            LIMIT $2",
        )
        .bind::<Text, _>(EventKind::Fill.to_string())
        .bind::<BigInt, _>(limit)
        .load(&mut *conn)
        .await?;

        Ok(unmatched_fills.into_iter().map(|fill| fill.relay_hash).collect())
    }

    async fn get_relay_hash_info(
        &self,
        relay_hash: &str,
    ) -> Result<Option<RelayHashInfo>, RepoError> {
        let mut conn = self.get_conn().await?;

        let info = relay_hash_infos::table
            .filter(relay_hash_infos::relay_hash.eq(relay_hash))
            .first::<RelayHashInfo>(&mut *conn)
            .await
            .optional()?;

        Ok(info)
    }

    async fn create_relay_hash_info(
        &self,
        info: &RelayHashInfo,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError> {
        let queued = change.map(QueuedLifecycleChangeRow::new).transpose()?;
        let queued = queued.as_ref();
        let mut conn = self.get_conn().await?;

        let created = (*conn)
            .transaction::<bool, diesel::result::Error, _>(|conn| {
                async move {
                    let inserted_count = diesel::insert_into(relay_hash_infos::table)
                        .values(info)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;

                    if inserted_count == 0 {
                        return Ok(false);
                    }

                    queue_lifecycle_change(conn, queued).await?;
                    Ok(true)
                }
                .scope_boxed()
            })
            .await?;

        Ok(created)
    }

    async fn update_relay_hash_info(
        &self,
        info: &RelayHashInfo,
        expected_version: i64,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError> {
        let queued = change.map(QueuedLifecycleChangeRow::new).transpose()?;
        let queued = queued.as_ref();
        let mut conn = self.get_conn().await?;

        let updated = (*conn)
            .transaction::<bool, diesel::result::Error, _>(|conn| {
                async move {
                    let updated_count = diesel::update(
                        relay_hash_infos::table
                            .filter(relay_hash_infos::relay_hash.eq(&info.relay_hash))
                            .filter(relay_hash_infos::version.eq(expected_version)),
                    )
                    .set(info)
                    .execute(conn)
                    .await?;

                    if updated_count == 0 {
                        return Ok(false);
                    }

                    queue_lifecycle_change(conn, queued).await?;
                    Ok(true)
                }
                .scope_boxed()
            })
            .await?;

        Ok(updated)
    }

    async fn delete_relay_hash_info(
        &self,
        relay_hash: &str,
        expected_version: i64,
        change: Option<&LifecycleChange>,
    ) -> Result<bool, RepoError> {
        let queued = change.map(QueuedLifecycleChangeRow::new).transpose()?;
        let queued = queued.as_ref();
        let mut conn = self.get_conn().await?;

        let deleted = (*conn)
            .transaction::<bool, diesel::result::Error, _>(|conn| {
                async move {
                    let deleted_count = diesel::delete(
                        relay_hash_infos::table
                            .filter(relay_hash_infos::relay_hash.eq(relay_hash))
                            .filter(relay_hash_infos::version.eq(expected_version)),
                    )
                    .execute(conn)
                    .await?;

                    if deleted_count == 0 {
                        return Ok(false);
                    }

                    queue_lifecycle_change(conn, queued).await?;
                    Ok(true)
                }
                .scope_boxed()
            })
            .await?;

        Ok(deleted)
    }

    async fn get_unenriched_relay_hash_infos(
        &self,
        limit: i64,
    ) -> Result<Vec<RelayHashInfo>, RepoError> {
        let mut conn = self.get_conn().await?;

        let infos = relay_hash_infos::table
            .filter(relay_hash_infos::deposit_event_id.is_not_null())
            .filter(relay_hash_infos::input_price_usd.is_null())
            .order((
                relay_hash_infos::enrichment_attempted_at.asc().nulls_first(),
                relay_hash_infos::updated_at.asc(),
            ))
            .limit(limit)
            .load::<RelayHashInfo>(&mut *conn)
            .await?;

        Ok(infos)
    }

    async fn mark_enrichment_attempted(
        &self,
        relay_hash: &str,
        attempted_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let mut conn = self.get_conn().await?;

        diesel::update(relay_hash_infos::table.filter(relay_hash_infos::relay_hash.eq(relay_hash)))
            .set(relay_hash_infos::enrichment_attempted_at.eq(Some(attempted_at)))
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    async fn get_queued_lifecycle_changes(
        &self,
        source_id: &str,
        limit: i64,
    ) -> Result<Vec<QueuedLifecycleChange>, RepoError> {
        let mut conn = self.get_conn().await?;

        let rows = lifecycle_change_queue::table
            .filter(lifecycle_change_queue::source_id.eq(source_id))
            .order(lifecycle_change_queue::queued_at.asc())
            .limit(limit)
            .load::<QueuedLifecycleChangeRow>(&mut *conn)
            .await?;

        rows.into_iter().map(QueuedLifecycleChangeRow::into_queued).collect()
    }

    async fn delete_queued_lifecycle_change(&self, id: Uuid) -> Result<(), RepoError> {
        let mut conn = self.get_conn().await?;

        diesel::delete(lifecycle_change_queue::table.filter(lifecycle_change_queue::id.eq(id)))
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    async fn create_webhook_subscription(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<(), RepoError> {
        let mut conn = self.get_conn().await?;

        diesel::insert_into(webhook_subscriptions::table)
            .values(subscription)
            .on_conflict(webhook_subscriptions::client_id)
            .do_update()
            .set((
                webhook_subscriptions::api_key.eq(excluded(webhook_subscriptions::api_key)),
                webhook_subscriptions::domains.eq(excluded(webhook_subscriptions::domains)),
            ))
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    async fn get_webhook_subscription(
        &self,
        client_id: &str,
    ) -> Result<Option<WebhookSubscription>, RepoError> {
        let mut conn = self.get_conn().await?;

        let subscription = webhook_subscriptions::table
            .filter(webhook_subscriptions::client_id.eq(client_id))
            .first::<WebhookSubscription>(&mut *conn)
            .await
            .optional()?;

        Ok(subscription)
    }

    async fn create_webhook_filter(&self, filter: &WebhookFilter) -> Result<bool, RepoError> {
        let mut conn = self.get_conn().await?;

        let inserted_count = diesel::insert_into(webhook_filters::table)
            .values(filter)
            .on_conflict_do_nothing()
            .execute(&mut *conn)
            .await?;

        Ok(inserted_count > 0)
    }

    async fn get_webhook_filters(&self) -> Result<Vec<WebhookFilter>, RepoError> {
        let mut conn = self.get_conn().await?;

        let filters = webhook_filters::table
            .order(webhook_filters::inserted_at.asc())
            .load::<WebhookFilter>(&mut *conn)
            .await?;

        Ok(filters)
    }

    async fn create_webhook_delivery_failure(
        &self,
        failure: &WebhookDeliveryFailure,
    ) -> Result<(), RepoError> {
        let mut conn = self.get_conn().await?;

        diesel::insert_into(webhook_delivery_failures::table)
            .values(failure)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    async fn get_webhook_delivery_failures(
        &self,
    ) -> Result<Vec<WebhookDeliveryFailure>, RepoError> {
        let mut conn = self.get_conn().await?;

        let failures = webhook_delivery_failures::table
            .order(webhook_delivery_failures::failed_at.asc())
            .load::<WebhookDeliveryFailure>(&mut *conn)
            .await?;

        Ok(failures)
    }
}
