#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use relaydexing::webhooks::{WebhookConfig, WebhookFilter, WebhookSubscription};
    use relaydexing::{
        index_relays, Config, ConfigError, RelayStatus, RelaydexingError, Repo,
    };
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::factory::{
        deposit_event, fill_event, relay_data, source, MockProvider, RecordingTransport,
        ScriptedFeed, DESTINATION_CHAIN_ID, ORIGIN_CHAIN_ID,
    };
    use crate::test_runner;

    #[tokio::test]
    pub async fn notifies_subscribers_of_filled_relays() {
        test_runner::run_test(|repo| async move {
            let subscription = WebhookSubscription::new("explorer", "secret", &["example.com"]);
            repo.create_webhook_subscription(&subscription).await.unwrap();
            let filter = WebhookFilter::new(
                "explorer",
                "https://hooks.example.com/relays",
                json!({"destinationChainId": DESTINATION_CHAIN_ID}),
            );
            repo.create_webhook_filter(&filter).await.unwrap();

            let relay_data = relay_data(1);
            let origin_provider = Arc::new(MockProvider::new(50));
            let origin_feed = Arc::new(ScriptedFeed::new(vec![deposit_event(&relay_data, 10)]));
            let destination_provider = Arc::new(MockProvider::new(50));
            let destination_feed = Arc::new(ScriptedFeed::new(vec![fill_event(&relay_data, 20)]));
            let transport = Arc::new(RecordingTransport::new());

            let config = Config::new(repo.clone())
                .add_source(source(ORIGIN_CHAIN_ID, &origin_provider, &origin_feed))
                .add_source(source(DESTINATION_CHAIN_ID, &destination_provider, &destination_feed))
                .with_ingestion_interval_ms(10)
                .with_webhook_transport(transport.clone())
                .with_webhook_config(WebhookConfig {
                    base_backoff_ms: 1,
                    max_backoff_ms: 2,
                    ..WebhookConfig::default()
                });
            let cancel = CancellationToken::new();

            let handles = index_relays(&config, cancel.clone()).await.unwrap();

            let notified = tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    let filled = transport.get_requests().iter().any(|(_, payload)| {
                        payload.data.status == Some(RelayStatus::Filled)
                    });
                    if filled {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            assert!(notified.is_ok());

            cancel.cancel();
            assert!(handles.join().await.is_ok());

            let (url, payload) = transport.get_requests().pop().unwrap();
            assert_eq!(url, "https://hooks.example.com/relays");
            assert_eq!(payload.data.relay_hash, relay_data.relay_hash());
        })
        .await;
    }

    #[tokio::test]
    pub async fn rejects_invalid_configs() {
        test_runner::run_test(|repo| async move {
            let provider = Arc::new(MockProvider::new(50));
            let feed = Arc::new(ScriptedFeed::default());
            let cancel = CancellationToken::new();

            let without_sources = Config::new(repo.clone());
            let error = index_relays(&without_sources, cancel.clone()).await.err().unwrap();
            assert!(matches!(error, RelaydexingError::Config(ConfigError::NoSources)));

            let with_duplicates = Config::new(repo.clone())
                .add_source(source(ORIGIN_CHAIN_ID, &provider, &feed))
                .add_source(source(ORIGIN_CHAIN_ID, &provider, &feed));
            let error = index_relays(&with_duplicates, cancel.clone()).await.err().unwrap();
            assert!(matches!(error, RelaydexingError::Config(ConfigError::DuplicateSource(_))));

            let without_batches = Config::new(repo)
                .add_source(source(ORIGIN_CHAIN_ID, &provider, &feed))
                .with_blocks_per_batch(0);
            let error = index_relays(&without_batches, cancel).await.err().unwrap();
            assert!(matches!(error, RelaydexingError::Config(ConfigError::ZeroBlocksPerBatch)));
        })
        .await;
    }
}
