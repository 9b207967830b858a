//! Lifecycle-change notifications delivered to subscriber endpoints.
//!
//! Delivery is at least once: every request carries an idempotency key
//! that subscribers use to discard retried duplicates.

mod delivery;
mod dispatcher;
mod filter_cache;
mod matching;
mod subscription;
mod transport;

pub use delivery::{
    deliver, new_delivery_id, DeliveryOutcome, WebhookPayload, LIFECYCLE_CHANGED_EVENT,
};
pub use dispatcher::{WebhookConfig, WebhookDispatcher};
pub use filter_cache::FilterCache;
pub use matching::matches;
pub use subscription::{WebhookDeliveryFailure, WebhookFilter, WebhookSubscription};
pub use transport::{
    HttpTransport, WebhookTransport, WebhookTransportError, IDEMPOTENCY_KEY_HEADER,
};
