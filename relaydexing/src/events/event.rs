use chrono::{DateTime, Utc};
use diesel::{Insertable, Queryable};
use ethers::types::H256;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diesel::schema::relaydexing_events;
use crate::{hashes, ChainId};

use super::payload::{EventKind, EventPayload};

/// Natural identity of an on-chain log
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventIdentity {
    pub chain_id: i64,
    pub block_number: i64,
    pub transaction_hash: String,
    pub log_index: i32,
}

/// A normalized event as produced by the upstream decoder, before it is stored
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsavedEvent {
    pub chain_id: ChainId,
    pub block_number: u64,
    pub block_hash: H256,
    pub transaction_hash: H256,
    pub log_index: u32,
    pub payload: EventPayload,
}

impl UnsavedEvent {
    pub fn new(
        chain_id: ChainId,
        block_number: u64,
        block_hash: H256,
        transaction_hash: H256,
        log_index: u32,
        payload: EventPayload,
    ) -> Self {
        Self {
            chain_id,
            block_number,
            block_hash,
            transaction_hash,
            log_index,
            payload,
        }
    }

    pub fn identity(&self) -> EventIdentity {
        EventIdentity {
            chain_id: self.chain_id as i64,
            block_number: self.block_number as i64,
            transaction_hash: hashes::h256_to_string(&self.transaction_hash),
            log_index: self.log_index as i32,
        }
    }
}

/// One stored observation of an on-chain log.
///
/// Rows are never physically deleted. A row superseded by a reorg gets
/// `deleted_at` set and is ignored by every aggregate computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = relaydexing_events)]
pub struct ChainEvent {
    pub id: Uuid,
    pub chain_id: i64,
    pub block_number: i64,
    pub block_hash: String,
    pub transaction_hash: String,
    pub log_index: i32,
    pub kind: String,
    pub relay_hash: Option<String>,
    payload: serde_json::Value,
    pub finalized: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub inserted_at: DateTime<Utc>,
}

impl ChainEvent {
    pub fn new(unsaved_event: &UnsavedEvent) -> Result<Self, serde_json::Error> {
        let UnsavedEvent {
            block_hash,
            payload,
            ..
        } = unsaved_event;
        let EventIdentity {
            chain_id,
            block_number,
            transaction_hash,
            log_index,
        } = unsaved_event.identity();

        Ok(Self {
            id: Uuid::new_v4(),
            chain_id,
            block_number,
            block_hash: hashes::h256_to_string(block_hash),
            transaction_hash,
            log_index,
            kind: payload.kind().to_string(),
            relay_hash: payload.relay_hash(),
            payload: serde_json::to_value(payload)?,
            finalized: false,
            deleted_at: None,
            inserted_at: Utc::now(),
        })
    }

    pub fn identity(&self) -> EventIdentity {
        EventIdentity {
            chain_id: self.chain_id,
            block_number: self.block_number,
            transaction_hash: self.transaction_hash.clone(),
            log_index: self.log_index,
        }
    }

    pub fn get_chain_id(&self) -> ChainId {
        self.chain_id as ChainId
    }
    pub fn get_block_number(&self) -> u64 {
        self.block_number as u64
    }

    /// `None` only when the stored JSON no longer matches a known payload shape
    pub fn get_payload(&self) -> Option<EventPayload> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    pub fn is_kind(&self, kind: EventKind) -> bool {
        self.kind == kind.to_string()
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Same natural identity and same immutable fields, i.e. a duplicate delivery
    pub fn is_same_observation(&self, other: &ChainEvent) -> bool {
        self.identity() == other.identity()
            && self.block_hash == other.block_hash
            && self.payload == other.payload
    }

    /// Ordering key for "most recent" among events of one relay
    pub(crate) fn recency(&self) -> (i64, i32, DateTime<Utc>) {
        (self.block_number, self.log_index, self.inserted_at)
    }
}
