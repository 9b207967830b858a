use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{RelayHashInfo, RelayStatus};

/// A committed change to a relay's lifecycle, as delivered to webhooks.
///
/// `status` is `None` when the aggregate was removed because its deposit
/// was reorged out; `previous_status` is `None` when it was just created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleChange {
    pub relay_hash: String,
    pub origin_chain_id: i64,
    pub destination_chain_id: i64,
    pub deposit_id: String,
    pub deposit_tx_hash: Option<String>,
    pub fill_tx_hash: Option<String>,
    pub previous_status: Option<RelayStatus>,
    pub status: Option<RelayStatus>,
    pub integrator_id: Option<String>,
    pub version: i64,
    /// Source whose ingestion pass committed the change
    #[serde(skip)]
    pub source_id: String,
    pub changed_at: DateTime<Utc>,
}

impl LifecycleChange {
    /// `None` unless the status, the fill reference or the row's existence changed
    pub fn between(
        previous: Option<&RelayHashInfo>,
        current: Option<&RelayHashInfo>,
        source_id: &str,
    ) -> Option<Self> {
        let previous_status = previous.map(|info| info.status);
        let previous_fill = previous.and_then(|info| info.fill_tx_hash.as_deref());

        let (subject, status, fill_tx_hash) = match (previous, current) {
            (_, Some(current)) => (current, Some(current.status), current.fill_tx_hash.clone()),
            (Some(previous), None) => (previous, None, None),
            (None, None) => return None,
        };

        if previous.is_some()
            && previous_status == status
            && previous_fill == fill_tx_hash.as_deref()
        {
            return None;
        }

        Some(Self {
            relay_hash: subject.relay_hash.clone(),
            origin_chain_id: subject.origin_chain_id,
            destination_chain_id: subject.destination_chain_id,
            deposit_id: subject.deposit_id.clone(),
            deposit_tx_hash: subject.deposit_tx_hash.clone(),
            fill_tx_hash,
            previous_status,
            status,
            integrator_id: subject.integrator_id.clone(),
            version: current.map(|info| info.version).unwrap_or(subject.version),
            source_id: source_id.to_string(),
            changed_at: Utc::now(),
        })
    }

    pub fn is_removal(&self) -> bool {
        self.status.is_none()
    }

    /// Attribute view used for webhook filter matching
    pub fn attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(attributes)) => attributes,
            _ => serde_json::Map::new(),
        }
    }
}

/// A committed change waiting to be handed to the webhook dispatcher.
///
/// Queued in the same write as the aggregate it describes and removed only
/// once dispatched, so a pass that fails in between re-sends it.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedLifecycleChange {
    pub id: Uuid,
    pub change: LifecycleChange,
}

impl QueuedLifecycleChange {
    pub fn new(change: &LifecycleChange) -> Self {
        Self {
            id: Uuid::new_v4(),
            change: change.clone(),
        }
    }
}
