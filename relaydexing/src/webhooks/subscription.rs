use chrono::{DateTime, Utc};
use diesel::{Insertable, Queryable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diesel::schema::{
    relaydexing_webhook_delivery_failures, relaydexing_webhook_filters,
    relaydexing_webhook_subscriptions,
};

/// A client allowed to register webhook filters for URLs under `domains`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = relaydexing_webhook_subscriptions)]
pub struct WebhookSubscription {
    pub client_id: String,
    pub api_key: String,
    pub domains: Vec<String>,
}

impl WebhookSubscription {
    pub fn new(client_id: &str, api_key: &str, domains: &[&str]) -> Self {
        Self {
            client_id: client_id.to_string(),
            api_key: api_key.to_string(),
            domains: domains.iter().map(|domain| domain.to_lowercase()).collect(),
        }
    }

    /// Whether `host` is one of the subscription's domains or a subdomain of one
    pub fn permits_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();

        self.domains.iter().any(|domain| {
            host == *domain
                || host.strip_suffix(domain.as_str()).is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

/// Where to deliver lifecycle changes matching `filter`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = relaydexing_webhook_filters)]
pub struct WebhookFilter {
    pub id: Uuid,
    pub client_id: String,
    pub url: String,
    pub filter: serde_json::Value,
    pub inserted_at: DateTime<Utc>,
}

impl WebhookFilter {
    pub fn new(client_id: &str, url: &str, filter: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.to_string(),
            url: url.to_string(),
            filter,
            inserted_at: Utc::now(),
        }
    }
}

/// A delivery that exhausted its retries or was cancelled.
///
/// `filter_id` and `url` are `None` for a change that never reached filter
/// matching, e.g. because the dispatcher stopped first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = relaydexing_webhook_delivery_failures)]
pub struct WebhookDeliveryFailure {
    pub id: Uuid,
    pub delivery_id: String,
    pub filter_id: Option<Uuid>,
    pub url: Option<String>,
    pub relay_hash: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_exact_domains_and_subdomains() {
        let subscription = WebhookSubscription::new("client", "key", &["Example.com"]);

        assert!(subscription.permits_host("example.com"));
        assert!(subscription.permits_host("hooks.example.com"));
        assert!(subscription.permits_host("HOOKS.EXAMPLE.COM."));
    }

    #[test]
    fn rejects_lookalike_hosts() {
        let subscription = WebhookSubscription::new("client", "key", &["example.com"]);

        assert!(!subscription.permits_host("badexample.com"));
        assert!(!subscription.permits_host("example.com.evil.io"));
        assert!(!subscription.permits_host("evil.io"));
    }
}
