use chrono::{DateTime, Utc};
use derive_more::Display;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::{hashes, ChainId};

/// The kinds of bridge events the store knows about
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    #[display("deposit")]
    Deposit,
    #[display("fill")]
    Fill,
    #[display("speedUp")]
    SpeedUp,
    #[display("slowFillRequest")]
    SlowFillRequest,
    #[display("swap")]
    Swap,
}

/// Immutable parameters of a deposit. Shared verbatim by the deposit on the
/// origin chain and by fills or slow fill requests on the destination chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayData {
    pub depositor: Address,
    pub recipient: Address,
    pub exclusive_relayer: Address,
    pub input_token: Address,
    pub output_token: Address,
    pub input_amount: U256,
    pub output_amount: U256,
    pub origin_chain_id: ChainId,
    pub destination_chain_id: ChainId,
    pub deposit_id: U256,
    pub fill_deadline: u32,
    pub exclusivity_deadline: u32,
    pub message_hash: H256,
}

impl RelayData {
    pub fn relay_hash(&self) -> String {
        hashes::relay_hash(self)
    }

    pub fn fill_deadline_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.fill_deadline as i64, 0).unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub relay_data: RelayData,
    pub quote_timestamp: u32,
}

impl Deposit {
    pub fn quoted_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.quote_timestamp as i64, 0).unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FillType {
    FastFill,
    ReplacedSlowFill,
    SlowFill,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub relay_data: RelayData,
    pub relayer: Address,
    pub repayment_chain_id: ChainId,
    pub fill_type: FillType,
    /// Gas paid by the relayer for the fill transaction, when the decoder knows it
    pub gas_cost_wei: Option<U256>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowFillRequest {
    pub relay_data: RelayData,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedUp {
    pub deposit_id: U256,
    pub depositor: Address,
    pub updated_recipient: Address,
    pub updated_output_amount: U256,
}

/// A token swap executed in the same origin transaction right before a deposit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub swap_token: Address,
    pub acx_input_token: Address,
    pub swap_token_amount: U256,
    pub acx_input_amount: U256,
    pub exchange: Address,
}

/// Kind-specific fields of a normalized chain event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EventPayload {
    Deposit(Deposit),
    Fill(Fill),
    SpeedUp(SpeedUp),
    SlowFillRequest(SlowFillRequest),
    Swap(Swap),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Deposit(_) => EventKind::Deposit,
            EventPayload::Fill(_) => EventKind::Fill,
            EventPayload::SpeedUp(_) => EventKind::SpeedUp,
            EventPayload::SlowFillRequest(_) => EventKind::SlowFillRequest,
            EventPayload::Swap(_) => EventKind::Swap,
        }
    }

    pub fn relay_data(&self) -> Option<&RelayData> {
        match self {
            EventPayload::Deposit(Deposit { relay_data, .. })
            | EventPayload::Fill(Fill { relay_data, .. })
            | EventPayload::SlowFillRequest(SlowFillRequest { relay_data }) => Some(relay_data),
            EventPayload::SpeedUp(_) | EventPayload::Swap(_) => None,
        }
    }

    pub fn relay_hash(&self) -> Option<String> {
        self.relay_data().map(RelayData::relay_hash)
    }
}
