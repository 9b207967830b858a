use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{debug, info};

use crate::events::EventKind;
use crate::prices::Enricher;
use crate::{Repo, RepoError};

use super::derivation::{self, Derivation, RelayEvents, StatusPolicy};
use super::{LifecycleChange, RelayHashInfo};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Re-reads after losing an optimistic write race, per relay hash
    pub max_conflict_retries: u32,
    /// Buffered fills retried per pass
    pub unmatched_batch_size: i64,
    /// Aggregates priced per enrichment sweep
    pub unenriched_batch_size: i64,
    pub status_policy: StatusPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
            unmatched_batch_size: 500,
            unenriched_batch_size: 100,
            status_policy: StatusPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    #[error("relay {relay_hash} kept changing concurrently after {attempts} attempts")]
    ConflictRetriesExhausted { relay_hash: String, attempts: u32 },

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Derives relay aggregates from active events and commits them with
/// optimistic, version-checked writes.
///
/// Reconciling is convergent: it recomputes the aggregate from the current
/// active event set, so it can run any number of times, in any order, from
/// any source's worker.
#[derive(Clone)]
pub struct Reconciler<R: Repo> {
    repo: R,
    enricher: Enricher,
    config: ReconcilerConfig,
}

impl<R: Repo> Reconciler<R> {
    pub fn new(repo: R, enricher: Enricher, config: ReconcilerConfig) -> Self {
        Self {
            repo,
            enricher,
            config,
        }
    }

    /// Reconciles the given relay hashes plus any buffered fills still
    /// waiting for their deposit.
    ///
    /// Committed changes are queued for dispatch with their aggregate write,
    /// except while backfilling, which also defers enrichment.
    pub async fn reconcile(
        &self,
        relay_hashes: impl IntoIterator<Item = String>,
        source_id: &str,
        is_backfilling: bool,
    ) -> Result<Vec<LifecycleChange>, ReconcilerError> {
        let mut relay_hashes: BTreeSet<_> = relay_hashes.into_iter().collect();
        relay_hashes.extend(
            self.repo
                .get_unmatched_fill_relay_hashes(self.config.unmatched_batch_size)
                .await?,
        );

        let mut changes = vec![];
        for relay_hash in relay_hashes {
            if let Some(change) =
                self.reconcile_relay_hash(&relay_hash, source_id, is_backfilling).await?
            {
                changes.push(change);
            }
        }

        Ok(changes)
    }

    pub async fn reconcile_relay_hash(
        &self,
        relay_hash: &str,
        source_id: &str,
        is_backfilling: bool,
    ) -> Result<Option<LifecycleChange>, ReconcilerError> {
        let attempts = self.config.max_conflict_retries + 1;
        let queued = |change: &Option<LifecycleChange>| change.clone().filter(|_| !is_backfilling);

        for _attempt in 0..attempts {
            let existing = self.repo.get_relay_hash_info(relay_hash).await?;
            let events = self.get_relay_events(relay_hash).await?;
            let policy = &self.config.status_policy;

            let derivation = derivation::derive(relay_hash, existing.as_ref(), &events, policy);

            let committed = match derivation {
                Derivation::Unchanged => match existing {
                    Some(existing) if !is_backfilling && self.needs_enrichment(&existing) => {
                        let mut enriched = existing.clone();
                        self.enricher.enrich(&mut enriched, &events).await;

                        if enriched == existing {
                            return Ok(None);
                        }
                        enriched.version = existing.version + 1;
                        enriched.updated_at = Utc::now();

                        // Economics alone never make a lifecycle change.
                        let updated = self
                            .repo
                            .update_relay_hash_info(&enriched, existing.version, None)
                            .await?;
                        updated.then_some(None)
                    }
                    _ => return Ok(None),
                },
                Derivation::Remove => match existing {
                    Some(existing) => {
                        let change = LifecycleChange::between(Some(&existing), None, source_id);
                        let deleted = self
                            .repo
                            .delete_relay_hash_info(
                                relay_hash,
                                existing.version,
                                queued(&change).as_ref(),
                            )
                            .await?;
                        if deleted {
                            info!(relay_hash, "Removed relay whose deposit was invalidated");
                        }

                        deleted.then_some(change)
                    }
                    None => return Ok(None),
                },
                Derivation::Upsert(mut info) => {
                    if !is_backfilling {
                        self.enricher.enrich(&mut info, &events).await;
                    }

                    let change =
                        LifecycleChange::between(existing.as_ref(), Some(&info), source_id);
                    let queued_change = queued(&change);
                    let written = match &existing {
                        None => {
                            self.repo
                                .create_relay_hash_info(&info, queued_change.as_ref())
                                .await?
                        }
                        Some(existing) => {
                            self.repo
                                .update_relay_hash_info(
                                    &info,
                                    existing.version,
                                    queued_change.as_ref(),
                                )
                                .await?
                        }
                    };

                    written.then_some(change)
                }
            };

            match committed {
                Some(change) => return Ok(change),
                None => debug!(relay_hash, "Relay changed concurrently; retrying"),
            }
        }

        Err(ReconcilerError::ConflictRetriesExhausted {
            relay_hash: relay_hash.to_string(),
            attempts,
        })
    }

    /// Prices aggregates whose enrichment was deferred, e.g. during backfill.
    ///
    /// Relays that still cannot be priced are marked as attempted, which moves
    /// them behind every relay not tried yet in the next sweep.
    pub async fn enrich_pending(&self) -> Result<usize, ReconcilerError> {
        if !self.enricher.has_price_source() {
            return Ok(0);
        }

        let unenriched = self
            .repo
            .get_unenriched_relay_hash_infos(self.config.unenriched_batch_size)
            .await?;

        let mut enriched_count = 0;
        for info in unenriched {
            let events = self.get_relay_events(&info.relay_hash).await?;
            let attempted_at = Utc::now();
            let mut enriched = info.clone();
            self.enricher.enrich(&mut enriched, &events).await;

            if enriched == info {
                debug!(relay_hash = %info.relay_hash, "Relay could not be priced yet");
                self.repo.mark_enrichment_attempted(&info.relay_hash, attempted_at).await?;
                continue;
            }

            enriched.version = info.version + 1;
            enriched.updated_at = attempted_at;
            enriched.enrichment_attempted_at = Some(attempted_at);
            // A lost race is picked up again by the next sweep.
            if self.repo.update_relay_hash_info(&enriched, info.version, None).await? {
                enriched_count += 1;
            }
        }

        Ok(enriched_count)
    }

    fn needs_enrichment(&self, info: &RelayHashInfo) -> bool {
        info.has_deposit() && self.enricher.has_price_source() && !info.has_economics()
    }

    async fn get_relay_events(&self, relay_hash: &str) -> Result<RelayEvents, RepoError> {
        let mut events = RelayEvents::new(self.repo.get_active_relay_events(relay_hash).await?);

        let deposit_transactions: BTreeSet<_> = events
            .deposits
            .iter()
            .map(|deposit| (deposit.chain_id, deposit.transaction_hash.clone()))
            .collect();

        for (chain_id, transaction_hash) in deposit_transactions {
            let transaction_events =
                self.repo.get_active_events_by_transaction(chain_id, &transaction_hash).await?;

            events.swaps.extend(
                transaction_events.into_iter().filter(|event| event.is_kind(EventKind::Swap)),
            );
        }

        Ok(events)
    }
}
