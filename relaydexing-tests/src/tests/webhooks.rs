#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use relaydexing::webhooks::{
        DeliveryOutcome, WebhookConfig, WebhookFilter, WebhookSubscription,
        LIFECYCLE_CHANGED_EVENT,
    };
    use relaydexing::{
        LifecycleChange, MemoryRepo, ProgressTracker, RelayStatus, Repo, WebhookDispatcher,
    };
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::factory::{
        relay_data, FlakyRepo, RecordingTransport, DESTINATION_CHAIN_ID, ORIGIN_CHAIN_ID,
    };
    use crate::test_runner;

    const CLIENT_ID: &str = "relay-explorer";

    fn quick_retries(max_attempts: u32) -> WebhookConfig {
        WebhookConfig {
            max_attempts,
            base_backoff_ms: 1,
            max_backoff_ms: 2,
            ..WebhookConfig::default()
        }
    }

    fn lifecycle_change(source_id: &str, status: RelayStatus) -> LifecycleChange {
        LifecycleChange {
            relay_hash: relay_data(1).relay_hash(),
            origin_chain_id: ORIGIN_CHAIN_ID as i64,
            destination_chain_id: DESTINATION_CHAIN_ID as i64,
            deposit_id: "1".to_string(),
            deposit_tx_hash: None,
            fill_tx_hash: None,
            previous_status: Some(RelayStatus::Pending),
            status: Some(status),
            integrator_id: None,
            version: 2,
            source_id: source_id.to_string(),
            changed_at: Utc::now(),
        }
    }

    async fn subscribe(repo: &MemoryRepo, filters: &[(&str, serde_json::Value)]) {
        let subscription = WebhookSubscription::new(CLIENT_ID, "secret", &["example.com"]);
        repo.create_webhook_subscription(&subscription).await.unwrap();

        for (url, filter) in filters {
            let filter = WebhookFilter::new(CLIENT_ID, url, filter.clone());
            assert!(repo.create_webhook_filter(&filter).await.unwrap());
        }
    }

    #[tokio::test]
    pub async fn delivers_to_matching_filters_only() {
        test_runner::run_test(|repo| async move {
            subscribe(
                &repo,
                &[
                    ("https://hooks.example.com/filled", json!({"status": "filled"})),
                    ("https://hooks.example.com/pending", json!({"status": "pending"})),
                    ("https://example.com/all", json!({})),
                ],
            )
            .await;
            let transport = Arc::new(RecordingTransport::new());
            let dispatcher =
                WebhookDispatcher::new(repo.clone(), transport.clone(), quick_retries(3));

            let change = lifecycle_change("10", RelayStatus::Filled);
            let outcomes = dispatcher.dispatch(&change, &CancellationToken::new()).await.unwrap();

            assert_eq!(outcomes.len(), 2);
            assert!(outcomes.iter().all(DeliveryOutcome::is_delivered));

            let mut urls: Vec<_> =
                transport.get_requests().into_iter().map(|(url, _)| url).collect();
            urls.sort();
            assert_eq!(urls, vec!["https://example.com/all", "https://hooks.example.com/filled"]);

            let (_, payload) = &transport.get_requests()[0];
            assert_eq!(payload.event, LIFECYCLE_CHANGED_EVENT);
            assert_eq!(payload.data, change);
        })
        .await;
    }

    #[tokio::test]
    pub async fn retries_with_the_same_delivery_id() {
        test_runner::run_test(|repo| async move {
            subscribe(&repo, &[("https://hooks.example.com/relays", json!(null))]).await;
            let transport = Arc::new(RecordingTransport::failing_first(2));
            let dispatcher =
                WebhookDispatcher::new(repo.clone(), transport.clone(), quick_retries(5));

            let outcomes = dispatcher
                .dispatch(&lifecycle_change("10", RelayStatus::Filled), &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(outcomes, vec![DeliveryOutcome::Delivered { attempts: 3 }]);
            let requests = transport.get_requests();
            assert_eq!(requests.len(), 3);
            assert!(requests.iter().all(|(_, payload)| payload.id == requests[0].1.id));
            assert!(repo.get_webhook_delivery_failures().await.unwrap().is_empty());
        })
        .await;
    }

    #[tokio::test]
    pub async fn records_deliveries_that_exhaust_their_attempts() {
        test_runner::run_test(|repo| async move {
            subscribe(&repo, &[("https://hooks.example.com/relays", json!({}))]).await;
            let transport = Arc::new(RecordingTransport::always_failing());
            let dispatcher =
                WebhookDispatcher::new(repo.clone(), transport.clone(), quick_retries(3));

            let change = lifecycle_change("10", RelayStatus::Filled);
            let outcomes = dispatcher.dispatch(&change, &CancellationToken::new()).await.unwrap();

            assert!(matches!(outcomes[..], [DeliveryOutcome::Failed { attempts: 3, .. }]));
            assert_eq!(transport.get_requests().len(), 3);
            let failures = repo.get_webhook_delivery_failures().await.unwrap();
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].attempts, 3);
            assert_eq!(failures[0].relay_hash, change.relay_hash);
            assert_eq!(failures[0].url.as_deref(), Some("https://hooks.example.com/relays"));
            assert!(failures[0].last_error.contains("503"));
        })
        .await;
    }

    #[tokio::test]
    pub async fn stops_retrying_when_cancelled() {
        test_runner::run_test(|repo| async move {
            subscribe(&repo, &[("https://hooks.example.com/relays", json!({}))]).await;
            let transport = Arc::new(RecordingTransport::always_failing());
            let config = WebhookConfig {
                base_backoff_ms: 60_000,
                max_backoff_ms: 60_000,
                ..WebhookConfig::default()
            };
            let dispatcher = WebhookDispatcher::new(repo.clone(), transport.clone(), config);
            let cancel = CancellationToken::new();

            let canceller = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    cancel.cancel();
                })
            };
            let outcomes = dispatcher
                .dispatch(&lifecycle_change("10", RelayStatus::Filled), &cancel)
                .await
                .unwrap();
            canceller.await.unwrap();

            assert_eq!(outcomes, vec![DeliveryOutcome::Cancelled { attempts: 1 }]);
            assert_eq!(repo.get_webhook_delivery_failures().await.unwrap().len(), 1);
        })
        .await;
    }

    #[tokio::test]
    pub async fn skips_filters_outside_the_subscription_domains() {
        test_runner::run_test(|repo| async move {
            subscribe(
                &repo,
                &[
                    ("https://hooks.attacker.com/relays", json!({})),
                    ("https://example.com.attacker.com/relays", json!({})),
                    ("ftp://example.com/relays", json!({})),
                ],
            )
            .await;
            let transport = Arc::new(RecordingTransport::new());
            let dispatcher =
                WebhookDispatcher::new(repo.clone(), transport.clone(), quick_retries(1));

            let outcomes = dispatcher
                .dispatch(&lifecycle_change("10", RelayStatus::Filled), &CancellationToken::new())
                .await
                .unwrap();

            assert!(outcomes.is_empty());
            assert!(transport.get_requests().is_empty());
        })
        .await;
    }

    #[tokio::test]
    pub async fn drops_changes_from_backfilling_sources() {
        test_runner::run_test(|repo| async move {
            subscribe(&repo, &[("https://hooks.example.com/relays", json!({}))]).await;
            ProgressTracker::new(repo.clone(), 100, 1_000)
                .mark_scanned("1:backfill", 99, true)
                .await
                .unwrap();
            let transport = Arc::new(RecordingTransport::new());
            let dispatcher =
                WebhookDispatcher::new(repo.clone(), transport.clone(), quick_retries(1));

            let change = lifecycle_change("1:backfill", RelayStatus::Pending);
            let outcomes = dispatcher.dispatch(&change, &CancellationToken::new()).await.unwrap();

            assert!(outcomes.is_empty());
            assert!(transport.get_requests().is_empty());
        })
        .await;
    }

    #[tokio::test]
    pub async fn refuses_duplicate_filters_of_one_client() {
        test_runner::run_test(|repo| async move {
            subscribe(&repo, &[("https://hooks.example.com/relays", json!({"status": "filled"}))])
                .await;

            let duplicate = WebhookFilter::new(
                CLIENT_ID,
                "https://hooks.example.com/other",
                json!({"status": "filled"}),
            );

            assert!(!repo.create_webhook_filter(&duplicate).await.unwrap());
            assert_eq!(repo.get_webhook_filters().await.unwrap().len(), 1);
        })
        .await;
    }

    #[tokio::test]
    pub async fn dispatches_queued_changes_until_the_queue_closes() {
        test_runner::run_test(|repo| async move {
            subscribe(&repo, &[("https://hooks.example.com/relays", json!({}))]).await;
            let transport = Arc::new(RecordingTransport::new());
            let dispatcher =
                WebhookDispatcher::new(repo.clone(), transport.clone(), quick_retries(1));
            let (sender, receiver) = mpsc::channel(4);

            let handle = dispatcher.start(receiver, CancellationToken::new());
            sender.send(lifecycle_change("10", RelayStatus::Filled)).await.unwrap();
            sender.send(lifecycle_change("1", RelayStatus::Pending)).await.unwrap();
            drop(sender);
            handle.await.unwrap();

            assert_eq!(transport.get_requests().len(), 2);
        })
        .await;
    }

    #[tokio::test]
    pub async fn retries_filter_reads_before_dispatching() {
        test_runner::run_test(|repo| async move {
            subscribe(&repo, &[("https://hooks.example.com/relays", json!({}))]).await;
            let flaky_repo = FlakyRepo::new(repo.clone());
            flaky_repo.fail_next_filter_reads(2);
            let transport = Arc::new(RecordingTransport::new());
            let dispatcher =
                WebhookDispatcher::new(flaky_repo, transport.clone(), quick_retries(3));

            let change = lifecycle_change("10", RelayStatus::Filled);
            let outcomes = dispatcher.dispatch(&change, &CancellationToken::new()).await.unwrap();

            assert!(matches!(outcomes[..], [DeliveryOutcome::Delivered { .. }]));
            assert_eq!(transport.get_requests().len(), 1);
        })
        .await;
    }

    #[tokio::test]
    pub async fn records_changes_it_could_not_dispatch() {
        test_runner::run_test(|repo| async move {
            subscribe(&repo, &[("https://hooks.example.com/relays", json!({}))]).await;
            let flaky_repo = FlakyRepo::new(repo.clone());
            flaky_repo.fail_next_filter_reads(2);
            let transport = Arc::new(RecordingTransport::new());
            let dispatcher =
                WebhookDispatcher::new(flaky_repo, transport.clone(), quick_retries(2));
            let (sender, receiver) = mpsc::channel(4);

            let handle = dispatcher.start(receiver, CancellationToken::new());
            let change = lifecycle_change("10", RelayStatus::Filled);
            sender.send(change.clone()).await.unwrap();
            drop(sender);
            handle.await.unwrap();

            assert!(transport.get_requests().is_empty());
            let failures = repo.get_webhook_delivery_failures().await.unwrap();
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].relay_hash, change.relay_hash);
            assert_eq!(failures[0].filter_id, None);
            assert_eq!(failures[0].url, None);
            assert!(failures[0].last_error.contains("not connected"));
        })
        .await;
    }

    #[tokio::test]
    pub async fn records_queued_changes_left_when_stopped() {
        test_runner::run_test(|repo| async move {
            subscribe(&repo, &[("https://hooks.example.com/relays", json!({}))]).await;
            let transport = Arc::new(RecordingTransport::new());
            let dispatcher =
                WebhookDispatcher::new(repo.clone(), transport.clone(), quick_retries(1));
            let (sender, receiver) = mpsc::channel(4);
            sender.send(lifecycle_change("10", RelayStatus::Filled)).await.unwrap();
            sender.send(lifecycle_change("1", RelayStatus::Pending)).await.unwrap();
            let cancel = CancellationToken::new();
            cancel.cancel();

            dispatcher.start(receiver, cancel).await.unwrap();

            assert!(transport.get_requests().is_empty());
            assert!(sender.is_closed());
            let failures = repo.get_webhook_delivery_failures().await.unwrap();
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().all(|failure| failure.url.is_none() && failure.attempts == 0));
        })
        .await;
    }
}
