#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::Utc;
    use ethers::types::U256;
    use relaydexing::events::RelayData;
    use relaydexing::prices::Enricher;
    use relaydexing::relays::{ReconcilerConfig, StatusPolicy};
    use relaydexing::{
        EventStore, MemoryRepo, PriceSource, Provider, Reconciler, RelayStatus, Repo,
    };

    use crate::factory::{
        address, deposit_event, deposit_transaction_hash, expired_relay_data, fill_event,
        fill_event_with_gas, relay_data, slow_fill_request_event, FixedPriceSource, MockProvider,
        ORIGIN_CHAIN_ID,
    };
    use crate::test_runner::{self, new_reconciler};

    async fn store(repo: &MemoryRepo, events: &[relaydexing::UnsavedEvent]) {
        let event_store = EventStore::new(repo.clone());

        for event in events {
            event_store.upsert_event(event).await.unwrap();
        }
    }

    fn approx_eq(left: Option<f64>, right: f64) -> bool {
        left.is_some_and(|left| (left - right).abs() < 1e-9)
    }

    #[tokio::test]
    pub async fn creates_pending_relays_from_deposits() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(1);
            let relay_hash = relay_data.relay_hash();
            store(&repo, &[deposit_event(&relay_data, 10)]).await;

            let changes = new_reconciler(&repo, None)
                .reconcile([relay_hash.clone()], "1", false)
                .await
                .unwrap();

            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].relay_hash, relay_hash);
            assert_eq!(changes[0].previous_status, None);
            assert_eq!(changes[0].status, Some(RelayStatus::Pending));
            assert_eq!(changes[0].source_id, "1");

            let info = repo.get_relay_hash_info(&relay_hash).await.unwrap().unwrap();
            assert_eq!(info.status, RelayStatus::Pending);
            assert_eq!(info.version, 1);
            assert_eq!(info.deposit_id, "1");
            assert!(info.fill_tx_hash.is_none());
        })
        .await;
    }

    #[tokio::test]
    pub async fn fills_pending_relays() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(1);
            let relay_hash = relay_data.relay_hash();
            let reconciler = new_reconciler(&repo, None);
            store(&repo, &[deposit_event(&relay_data, 10)]).await;
            reconciler.reconcile([relay_hash.clone()], "1", false).await.unwrap();

            store(&repo, &[fill_event(&relay_data, 20)]).await;
            let changes = reconciler.reconcile([relay_hash.clone()], "10", false).await.unwrap();

            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].previous_status, Some(RelayStatus::Pending));
            assert_eq!(changes[0].status, Some(RelayStatus::Filled));
            assert!(changes[0].fill_tx_hash.is_some());

            let info = repo.get_relay_hash_info(&relay_hash).await.unwrap().unwrap();
            assert_eq!(info.status, RelayStatus::Filled);
            assert_eq!(info.version, 2);
        })
        .await;
    }

    #[tokio::test]
    pub async fn reports_nothing_when_reconciling_unchanged_relays() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(1);
            let relay_hash = relay_data.relay_hash();
            let reconciler = new_reconciler(&repo, None);
            store(&repo, &[deposit_event(&relay_data, 10), fill_event(&relay_data, 20)]).await;

            let first = reconciler.reconcile([relay_hash.clone()], "1", false).await.unwrap();
            let second = reconciler.reconcile([relay_hash.clone()], "1", false).await.unwrap();

            assert_eq!(first.len(), 1);
            assert!(second.is_empty());
            let info = repo.get_relay_hash_info(&relay_hash).await.unwrap().unwrap();
            assert_eq!(info.version, 1);
        })
        .await;
    }

    #[tokio::test]
    pub async fn matches_buffered_fills_once_their_deposit_arrives() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(3);
            let relay_hash = relay_data.relay_hash();
            let reconciler = new_reconciler(&repo, None);

            store(&repo, &[fill_event(&relay_data, 20)]).await;
            let changes = reconciler.reconcile([relay_hash.clone()], "10", false).await.unwrap();
            assert!(changes.is_empty());
            assert!(repo.get_relay_hash_info(&relay_hash).await.unwrap().is_none());
            let unmatched = repo.get_unmatched_fill_relay_hashes(10).await.unwrap();
            assert_eq!(unmatched, vec![relay_hash.clone()]);

            // The deposit's pass does not name the relay; the buffered fill is picked up anyway.
            store(&repo, &[deposit_event(&relay_data, 10)]).await;
            let changes = reconciler.reconcile(Vec::<String>::new(), "1", false).await.unwrap();

            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].previous_status, None);
            assert_eq!(changes[0].status, Some(RelayStatus::Filled));
            assert!(repo.get_unmatched_fill_relay_hashes(10).await.unwrap().is_empty());
        })
        .await;
    }

    #[tokio::test]
    pub async fn tracks_slow_fill_requests() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(4);
            let relay_hash = relay_data.relay_hash();
            store(
                &repo,
                &[
                    deposit_event(&relay_data, 10),
                    slow_fill_request_event(&relay_data, 30),
                ],
            )
            .await;

            let changes = new_reconciler(&repo, None)
                .reconcile([relay_hash.clone()], "10", false)
                .await
                .unwrap();

            assert_eq!(changes[0].status, Some(RelayStatus::SlowFillRequested));
        })
        .await;
    }

    #[tokio::test]
    pub async fn can_ignore_slow_fill_requests() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(4);
            let relay_hash = relay_data.relay_hash();
            store(
                &repo,
                &[
                    deposit_event(&relay_data, 10),
                    slow_fill_request_event(&relay_data, 30),
                ],
            )
            .await;
            let config = ReconcilerConfig {
                status_policy: StatusPolicy {
                    track_slow_fill_requests: false,
                    ..StatusPolicy::default()
                },
                ..ReconcilerConfig::default()
            };
            let reconciler = Reconciler::new(repo.clone(), Enricher::default(), config);

            let changes = reconciler.reconcile([relay_hash.clone()], "10", false).await.unwrap();

            assert_eq!(changes[0].status, Some(RelayStatus::Pending));
        })
        .await;
    }

    #[tokio::test]
    pub async fn removes_relays_whose_deposit_was_reorged_out() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(5);
            let relay_hash = relay_data.relay_hash();
            let reconciler = new_reconciler(&repo, None);
            store(&repo, &[deposit_event(&relay_data, 10)]).await;
            reconciler.reconcile([relay_hash.clone()], "1", false).await.unwrap();

            EventStore::new(repo.clone())
                .reconcile_range(ORIGIN_CHAIN_ID, 10, 10, &[])
                .await
                .unwrap();
            let changes = reconciler.reconcile([relay_hash.clone()], "1", false).await.unwrap();

            assert_eq!(changes.len(), 1);
            assert!(changes[0].is_removal());
            assert_eq!(changes[0].previous_status, Some(RelayStatus::Pending));
            assert!(repo.get_relay_hash_info(&relay_hash).await.unwrap().is_none());
        })
        .await;
    }

    #[tokio::test]
    pub async fn reads_unfilled_relays_past_their_deadline_as_expired() {
        test_runner::run_test(|repo| async move {
            let relay_data = expired_relay_data(6);
            let relay_hash = relay_data.relay_hash();
            store(&repo, &[deposit_event(&relay_data, 10)]).await;

            new_reconciler(&repo, None).reconcile([relay_hash.clone()], "1", false).await.unwrap();

            let info = repo.get_relay_hash_info(&relay_hash).await.unwrap().unwrap();
            assert_eq!(info.status, RelayStatus::Pending);
            assert_eq!(info.status_at(Utc::now()), RelayStatus::Expired);
        })
        .await;
    }

    #[tokio::test]
    pub async fn prices_relays() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(8);
            let relay_hash = relay_data.relay_hash();
            let gas_cost_wei = U256::exp10(15);
            store(
                &repo,
                &[
                    deposit_event(&relay_data, 10),
                    fill_event_with_gas(&relay_data, 20, Some(gas_cost_wei)),
                ],
            )
            .await;
            let price_source: Arc<dyn PriceSource> = Arc::new(FixedPriceSource::with_stablecoins());

            new_reconciler(&repo, Some(price_source))
                .reconcile([relay_hash.clone()], "10", false)
                .await
                .unwrap();

            let info = repo.get_relay_hash_info(&relay_hash).await.unwrap().unwrap();
            assert!(approx_eq(info.input_price_usd, 1.0));
            assert!(approx_eq(info.output_price_usd, 1.0));
            assert!(approx_eq(info.bridge_fee_usd, 1.0));
            assert!(approx_eq(info.gas_fee_usd, 2.0));
            assert!(info.swap_fee_usd.is_none());
        })
        .await;
    }

    #[tokio::test]
    pub async fn leaves_relays_unpriced_when_prices_are_unknown() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(8);
            let relay_hash = relay_data.relay_hash();
            store(&repo, &[deposit_event(&relay_data, 10)]).await;
            let price_source: Arc<dyn PriceSource> = Arc::new(FixedPriceSource::new());

            let changes = new_reconciler(&repo, Some(price_source))
                .reconcile([relay_hash.clone()], "1", false)
                .await
                .unwrap();

            assert_eq!(changes[0].status, Some(RelayStatus::Pending));
            let info = repo.get_relay_hash_info(&relay_hash).await.unwrap().unwrap();
            assert!(!info.has_economics());
            assert!(info.bridge_fee_usd.is_none());
        })
        .await;
    }

    #[tokio::test]
    pub async fn prices_deferred_relays_in_a_later_sweep() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(9);
            let relay_hash = relay_data.relay_hash();
            store(&repo, &[deposit_event(&relay_data, 10)]).await;
            let price_source = Arc::new(FixedPriceSource::with_stablecoins());
            let reconciler =
                new_reconciler(&repo, Some(price_source.clone() as Arc<dyn PriceSource>));

            reconciler.reconcile([relay_hash.clone()], "1", true).await.unwrap();
            let deferred = repo.get_relay_hash_info(&relay_hash).await.unwrap().unwrap();
            assert!(!deferred.has_economics());
            assert_eq!(price_source.get_call_count(), 0);

            assert_eq!(reconciler.enrich_pending().await.unwrap(), 1);

            let enriched = repo.get_relay_hash_info(&relay_hash).await.unwrap().unwrap();
            assert!(approx_eq(enriched.bridge_fee_usd, 1.0));
            assert_eq!(enriched.status, RelayStatus::Pending);
            assert_eq!(enriched.version, deferred.version + 1);
            assert_eq!(reconciler.enrich_pending().await.unwrap(), 0);
        })
        .await;
    }

    #[tokio::test]
    pub async fn keeps_sweeping_past_relays_that_cannot_be_priced() {
        test_runner::run_test(|repo| async move {
            let unpriceable: Vec<_> = (20..23)
                .map(|deposit_id| RelayData {
                    input_token: address(0xbad),
                    ..relay_data(deposit_id)
                })
                .collect();
            let priceable = relay_data(23);
            let all_relays: Vec<_> = unpriceable.iter().chain([&priceable]).collect();
            let deposits: Vec<_> =
                all_relays.iter().map(|relay_data| deposit_event(relay_data, 10)).collect();
            store(&repo, &deposits).await;

            let price_source: Arc<dyn PriceSource> = Arc::new(FixedPriceSource::with_stablecoins());
            let config = ReconcilerConfig {
                unenriched_batch_size: 1,
                ..ReconcilerConfig::default()
            };
            let enricher = Enricher::new(Some(price_source), HashMap::new());
            let reconciler = Reconciler::new(repo.clone(), enricher, config);
            let relay_hashes = all_relays.iter().map(|relay_data| relay_data.relay_hash());
            reconciler.reconcile(relay_hashes, "1", true).await.unwrap();

            for _sweep in 0..all_relays.len() {
                reconciler.enrich_pending().await.unwrap();
            }

            let priced = repo.get_relay_hash_info(&priceable.relay_hash()).await.unwrap().unwrap();
            assert!(approx_eq(priced.bridge_fee_usd, 1.0));
            for relay_data in &unpriceable {
                let relay_hash = relay_data.relay_hash();
                let info = repo.get_relay_hash_info(&relay_hash).await.unwrap().unwrap();
                assert!(!info.has_economics());
                assert!(info.enrichment_attempted_at.is_some());
            }
        })
        .await;
    }

    #[tokio::test]
    pub async fn reads_integrator_ids_from_deposit_calldata() {
        test_runner::run_test(|repo| async move {
            let relay_data = relay_data(11);
            let relay_hash = relay_data.relay_hash();
            store(&repo, &[deposit_event(&relay_data, 10)]).await;

            let provider = Arc::new(MockProvider::new(100));
            provider.add_calldata(
                deposit_transaction_hash(11),
                vec![0xad, 0x5c, 0x46, 0x48, 0x1d, 0xc0, 0xde, 0x00, 0x2a],
            );
            let providers: HashMap<_, Arc<dyn Provider>> =
                HashMap::from([(ORIGIN_CHAIN_ID, provider as Arc<dyn Provider>)]);
            let enricher = Enricher::new(None, providers);
            let reconciler = Reconciler::new(repo.clone(), enricher, ReconcilerConfig::default());

            let changes = reconciler.reconcile([relay_hash.clone()], "1", false).await.unwrap();

            assert_eq!(changes[0].integrator_id, Some("0x002a".to_string()));
        })
        .await;
    }
}
