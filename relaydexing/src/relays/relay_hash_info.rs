use chrono::{DateTime, Utc};
use diesel::{AsChangeset, Insertable, Queryable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diesel::schema::relaydexing_relay_hash_infos;
use crate::ChainId;

use super::RelayStatus;

/// The lifecycle aggregate: one authoritative row per relay hash merging
/// origin and destination chain events.
///
/// `version` increases by one on every committed write and guards
/// conditional updates, so there is at most one successful writer per
/// relay hash at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(
    table_name = relaydexing_relay_hash_infos,
    primary_key(relay_hash),
    treat_none_as_null = true
)]
#[serde(rename_all = "camelCase")]
pub struct RelayHashInfo {
    pub relay_hash: String,
    pub origin_chain_id: i64,
    pub destination_chain_id: i64,
    pub deposit_id: String,
    pub deposit_event_id: Option<Uuid>,
    pub deposit_tx_hash: Option<String>,
    pub fill_event_id: Option<Uuid>,
    pub fill_tx_hash: Option<String>,
    pub slow_fill_request_event_id: Option<Uuid>,
    pub status: RelayStatus,
    pub fill_deadline: DateTime<Utc>,
    pub integrator_id: Option<String>,
    pub bridge_fee_usd: Option<f64>,
    pub gas_fee_usd: Option<f64>,
    pub swap_fee_usd: Option<f64>,
    pub input_price_usd: Option<f64>,
    pub output_price_usd: Option<f64>,
    pub swap_token_price_usd: Option<f64>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    /// Last enrichment sweep that tried to price this relay
    pub enrichment_attempted_at: Option<DateTime<Utc>>,
}

impl RelayHashInfo {
    pub fn get_origin_chain_id(&self) -> ChainId {
        self.origin_chain_id as ChainId
    }
    pub fn get_destination_chain_id(&self) -> ChainId {
        self.destination_chain_id as ChainId
    }

    /// Stored status, except that an unfilled relay past its fill deadline
    /// reads as `Expired`
    pub fn status_at(&self, now: DateTime<Utc>) -> RelayStatus {
        match self.status {
            RelayStatus::Pending | RelayStatus::SlowFillRequested if self.fill_deadline < now => {
                RelayStatus::Expired
            }
            status => status,
        }
    }

    pub fn has_deposit(&self) -> bool {
        self.deposit_event_id.is_some()
    }

    pub fn has_economics(&self) -> bool {
        self.input_price_usd.is_some()
    }

    /// Fields that define the lifecycle, i.e. everything except economics and bookkeeping
    pub fn same_lifecycle_as(&self, other: &RelayHashInfo) -> bool {
        self.relay_hash == other.relay_hash
            && self.origin_chain_id == other.origin_chain_id
            && self.destination_chain_id == other.destination_chain_id
            && self.deposit_id == other.deposit_id
            && self.deposit_event_id == other.deposit_event_id
            && self.deposit_tx_hash == other.deposit_tx_hash
            && self.fill_event_id == other.fill_event_id
            && self.fill_tx_hash == other.fill_tx_hash
            && self.slow_fill_request_event_id == other.slow_fill_request_event_id
            && self.status == other.status
            && self.fill_deadline == other.fill_deadline
    }

    pub(crate) fn carry_enrichment_from(&mut self, previous: &RelayHashInfo) {
        self.integrator_id = previous.integrator_id.clone();
        self.bridge_fee_usd = previous.bridge_fee_usd;
        self.swap_fee_usd = previous.swap_fee_usd;
        self.input_price_usd = previous.input_price_usd;
        self.output_price_usd = previous.output_price_usd;
        self.swap_token_price_usd = previous.swap_token_price_usd;

        if self.fill_event_id == previous.fill_event_id {
            self.gas_fee_usd = previous.gas_fee_usd;
        }
    }
}
