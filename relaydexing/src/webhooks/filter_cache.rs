use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tracing::warn;

use crate::ttl_cache::TtlCache;
use crate::{Repo, RepoError};

use super::{WebhookFilter, WebhookSubscription};

/// Webhook filters loaded from the repo and kept for a bounded time, so
/// subscription changes take effect without a restart.
///
/// Filters whose URL falls outside the owning subscription's domains are
/// dropped on load.
pub struct FilterCache<R: Repo> {
    repo: R,
    cache: TtlCache<(), Arc<Vec<WebhookFilter>>>,
}

impl<R: Repo> FilterCache<R> {
    pub fn new(repo: R, ttl: Duration) -> Self {
        Self {
            repo,
            cache: TtlCache::new(ttl, 1),
        }
    }

    pub async fn get_filters(&self) -> Result<Arc<Vec<WebhookFilter>>, RepoError> {
        if let Some(filters) = self.cache.get_if_valid(&()).await {
            return Ok(filters);
        }

        let filters = Arc::new(self.load_permitted_filters().await?);
        self.cache.insert((), filters.clone()).await;

        Ok(filters)
    }

    async fn load_permitted_filters(&self) -> Result<Vec<WebhookFilter>, RepoError> {
        let mut subscriptions: HashMap<String, Option<WebhookSubscription>> = HashMap::new();
        let mut permitted_filters = vec![];

        for filter in self.repo.get_webhook_filters().await? {
            if !subscriptions.contains_key(&filter.client_id) {
                let subscription = self.repo.get_webhook_subscription(&filter.client_id).await?;
                subscriptions.insert(filter.client_id.clone(), subscription);
            }

            let subscription = subscriptions.get(&filter.client_id).and_then(Option::as_ref);
            if is_permitted(&filter, subscription) {
                permitted_filters.push(filter);
            } else {
                warn!(
                    filter_id = %filter.id,
                    client_id = %filter.client_id,
                    url = %filter.url,
                    "Skipping webhook filter outside its subscription's domains"
                );
            }
        }

        Ok(permitted_filters)
    }
}

fn is_permitted(filter: &WebhookFilter, subscription: Option<&WebhookSubscription>) -> bool {
    let Some(subscription) = subscription else {
        return false;
    };

    match Url::parse(&filter.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            url.host_str().is_some_and(|host| subscription.permits_host(host))
        }
        _ => false,
    }
}
