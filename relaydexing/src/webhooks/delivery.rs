use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backoff::Backoff;
use crate::relays::LifecycleChange;

use super::{WebhookDeliveryFailure, WebhookFilter, WebhookTransport};

pub const LIFECYCLE_CHANGED_EVENT: &str = "relay.lifecycle_changed";

const DELIVERY_ID_SUFFIX_LENGTH: usize = 10;

/// Body of every webhook request. `id` doubles as the idempotency key and
/// stays the same across retries of one delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: String,
    pub event: String,
    pub data: LifecycleChange,
}

impl WebhookPayload {
    pub fn new(change: &LifecycleChange) -> Self {
        Self {
            id: new_delivery_id(),
            event: LIFECYCLE_CHANGED_EVENT.to_string(),
            data: change.clone(),
        }
    }
}

/// Millisecond timestamp prefix followed by a random alphanumeric suffix
pub fn new_delivery_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DELIVERY_ID_SUFFIX_LENGTH)
        .map(char::from)
        .collect();

    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, last_error: String },
    Cancelled { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn get_attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts }
            | DeliveryOutcome::Failed { attempts, .. }
            | DeliveryOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    /// Terminal failure record, for every outcome except success
    pub fn to_failure(
        &self,
        filter: &WebhookFilter,
        payload: &WebhookPayload,
    ) -> Option<WebhookDeliveryFailure> {
        let last_error = match self {
            DeliveryOutcome::Delivered { .. } => return None,
            DeliveryOutcome::Failed { last_error, .. } => last_error.clone(),
            DeliveryOutcome::Cancelled { .. } => "cancelled before delivery".to_string(),
        };

        Some(WebhookDeliveryFailure {
            id: Uuid::new_v4(),
            delivery_id: payload.id.clone(),
            filter_id: Some(filter.id),
            url: Some(filter.url.clone()),
            relay_hash: payload.data.relay_hash.clone(),
            payload: serde_json::to_value(payload).unwrap_or_default(),
            attempts: self.get_attempts() as i32,
            last_error,
            failed_at: Utc::now(),
        })
    }
}

/// Failure record for a change that was never matched against filters
pub fn undispatched_failure(change: &LifecycleChange, last_error: &str) -> WebhookDeliveryFailure {
    let payload = WebhookPayload::new(change);

    WebhookDeliveryFailure {
        id: Uuid::new_v4(),
        delivery_id: payload.id.clone(),
        filter_id: None,
        url: None,
        relay_hash: change.relay_hash.clone(),
        payload: serde_json::to_value(&payload).unwrap_or_default(),
        attempts: 0,
        last_error: last_error.to_string(),
        failed_at: Utc::now(),
    }
}

/// POSTs `payload` to `url`, retrying with backoff until it succeeds,
/// `max_attempts` requests were made or `cancel` fires.
pub async fn deliver(
    transport: &dyn WebhookTransport,
    url: &str,
    payload: &WebhookPayload,
    max_attempts: u32,
    backoff: &Backoff,
    cancel: &CancellationToken,
) -> DeliveryOutcome {
    let mut attempts = 0;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return DeliveryOutcome::Cancelled { attempts },
            result = transport.post(url, payload) => result,
        };
        attempts += 1;

        let error = match result {
            Ok(()) => {
                debug!(delivery_id = %payload.id, url, attempts, "Delivered webhook");
                return DeliveryOutcome::Delivered { attempts };
            }
            Err(error) => error,
        };

        warn!(
            delivery_id = %payload.id,
            url,
            attempts,
            %error,
            "Webhook delivery attempt failed"
        );

        if attempts >= max_attempts {
            return DeliveryOutcome::Failed {
                attempts,
                last_error: error.to_string(),
            };
        }
        if !backoff.wait(attempts - 1, cancel).await {
            return DeliveryOutcome::Cancelled { attempts };
        }
    }
}
