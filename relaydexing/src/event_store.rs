//! Append-only storage of chain events with soft invalidation.
//!
//! At most one active event exists per natural identity
//! `(chain_id, block_number, transaction_hash, log_index)`. Superseded
//! observations are marked deleted, never removed, and finalized events
//! are never invalidated.

use std::collections::HashSet;

use tracing::warn;

use crate::events::{ChainEvent, EventIdentity, EventKind, UnsavedEvent};
use crate::{Repo, RepoError, Source};

const MAX_UPSERT_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("finalized event {0:?} was re-observed with a different block hash or payload")]
    FinalizedConflict(EventIdentity),

    #[error("event {0:?} kept changing while being upserted")]
    ConcurrentModification(EventIdentity),

    #[error("could not serialize event payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl EventStoreError {
    /// Conflicts on finalized data mean upstream data is inconsistent; retrying cannot help
    pub fn is_fatal(&self) -> bool {
        matches!(self, EventStoreError::FinalizedConflict(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UpsertOutcome {
    Inserted(ChainEvent),
    /// Duplicate delivery of an already stored observation
    Unchanged(ChainEvent),
    Replaced {
        invalidated: ChainEvent,
        inserted: ChainEvent,
    },
}

impl UpsertOutcome {
    pub fn get_event(&self) -> &ChainEvent {
        match self {
            UpsertOutcome::Inserted(event)
            | UpsertOutcome::Unchanged(event)
            | UpsertOutcome::Replaced {
                inserted: event, ..
            } => event,
        }
    }

    /// Events whose state changed, superseded ones included
    pub fn changed_events(&self) -> Vec<&ChainEvent> {
        match self {
            UpsertOutcome::Inserted(event) => vec![event],
            UpsertOutcome::Unchanged(_) => vec![],
            UpsertOutcome::Replaced {
                invalidated,
                inserted,
            } => vec![invalidated, inserted],
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, UpsertOutcome::Unchanged(_))
    }
}

/// Result of re-checking an unfinalized block range against fresh chain data
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReorgOutcome {
    /// Active events the chain no longer contains
    pub invalidated: Vec<ChainEvent>,
    pub upserted: Vec<UpsertOutcome>,
}

impl ReorgOutcome {
    pub fn has_reorg(&self) -> bool {
        !self.invalidated.is_empty()
            || self.upserted.iter().any(|outcome| matches!(outcome, UpsertOutcome::Replaced { .. }))
    }

    pub fn changed_events(&self) -> Vec<&ChainEvent> {
        self.invalidated
            .iter()
            .chain(self.upserted.iter().flat_map(UpsertOutcome::changed_events))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct EventStore<R: Repo> {
    repo: R,
}

impl<R: Repo> EventStore<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn get_repo(&self) -> &R {
        &self.repo
    }

    /// Inserts the event, or replaces the active observation of the same
    /// identity when its block hash or payload differs. Identical
    /// re-deliveries are no-ops.
    pub async fn upsert_event(
        &self,
        unsaved_event: &UnsavedEvent,
    ) -> Result<UpsertOutcome, EventStoreError> {
        let candidate = ChainEvent::new(unsaved_event)?;
        let identity = candidate.identity();

        for _attempt in 0..MAX_UPSERT_ATTEMPTS {
            match self.repo.get_active_event(&identity).await? {
                None => {
                    if self.repo.create_event(&candidate).await? {
                        return Ok(UpsertOutcome::Inserted(candidate));
                    }
                }
                Some(existing) if existing.is_same_observation(&candidate) => {
                    return Ok(UpsertOutcome::Unchanged(existing));
                }
                Some(existing) if existing.finalized => {
                    return Err(EventStoreError::FinalizedConflict(identity));
                }
                Some(existing) => {
                    if self.repo.invalidate_and_replace(existing.id, &candidate).await? {
                        return Ok(UpsertOutcome::Replaced {
                            invalidated: existing,
                            inserted: candidate,
                        });
                    }
                }
            }
        }

        Err(EventStoreError::ConcurrentModification(identity))
    }

    /// Makes the active events of `chain_id` in `[from, to]` agree with
    /// `observed_events`, the chain's current view of that range.
    pub async fn reconcile_range(
        &self,
        chain_id: u64,
        from_block_number: u64,
        to_block_number: u64,
        observed_events: &[UnsavedEvent],
    ) -> Result<ReorgOutcome, EventStoreError> {
        let observed_identities: HashSet<_> =
            observed_events.iter().map(UnsavedEvent::identity).collect();

        let active_events = self
            .repo
            .get_active_events_in_range(
                chain_id as i64,
                from_block_number as i64,
                to_block_number as i64,
            )
            .await?;

        let (finalized_missing, missing): (Vec<_>, Vec<_>) = active_events
            .into_iter()
            .filter(|event| !observed_identities.contains(&event.identity()))
            .partition(|event| event.finalized);

        for event in &finalized_missing {
            warn!(
                chain_id,
                block_number = event.block_number,
                transaction_hash = %event.transaction_hash,
                "Finalized event is missing from chain data; keeping it"
            );
        }

        let missing_ids: Vec<_> = missing.iter().map(|event| event.id).collect();
        if !missing_ids.is_empty() {
            self.repo.invalidate_events(&missing_ids).await?;
        }

        let mut upserted = Vec::with_capacity(observed_events.len());
        for observed_event in observed_events {
            upserted.push(self.upsert_event(observed_event).await?);
        }

        Ok(ReorgOutcome {
            invalidated: missing,
            upserted,
        })
    }

    /// Marks every active event of the source's chain up to the given block as final
    pub async fn finalize(
        &self,
        source: &Source,
        up_to_block_number: u64,
    ) -> Result<u64, RepoError> {
        self.repo
            .finalize_events(source.chain_id as i64, up_to_block_number as i64)
            .await
    }

    /// Relay hashes affected by the given event changes. Swaps are linked
    /// to the active deposits of their transaction.
    pub async fn get_affected_relay_hashes(
        &self,
        changed_events: &[&ChainEvent],
    ) -> Result<HashSet<String>, RepoError> {
        let mut relay_hashes: HashSet<_> =
            changed_events.iter().filter_map(|event| event.relay_hash.clone()).collect();

        let swap_transactions: HashSet<_> = changed_events
            .iter()
            .filter(|event| event.is_kind(EventKind::Swap))
            .map(|event| (event.chain_id, event.transaction_hash.clone()))
            .collect();

        for (chain_id, transaction_hash) in swap_transactions {
            let transaction_events =
                self.repo.get_active_events_by_transaction(chain_id, &transaction_hash).await?;

            relay_hashes.extend(
                transaction_events
                    .into_iter()
                    .filter(|event| event.is_kind(EventKind::Deposit))
                    .filter_map(|event| event.relay_hash),
            );
        }

        Ok(relay_hashes)
    }
}
