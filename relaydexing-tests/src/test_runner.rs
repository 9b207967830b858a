use std::future::Future;
use std::sync::Arc;

use relaydexing::backoff::Backoff;
use relaydexing::prices::Enricher;
use relaydexing::relays::ReconcilerConfig;
use relaydexing::{
    EventStore, Ingester, LifecycleChange, MemoryRepo, PostgresRepo, PriceSource,
    ProgressTracker, Reconciler, Repo, Source,
};
use tokio::sync::mpsc;

use crate::db;

pub const BLOCKS_PER_BATCH: u64 = 100;
pub const BACKFILL_THRESHOLD: u64 = 1_000;

pub async fn run_test<TestFn, Fut>(test_fn: TestFn)
where
    TestFn: FnOnce(MemoryRepo) -> Fut,
    Fut: Future<Output = ()>,
{
    let repo = MemoryRepo::new();
    repo.migrate().await.unwrap();

    test_fn(repo).await;
}

/// Skips the test when no test database is configured
pub async fn run_postgres_test<TestFn, Fut>(test_fn: TestFn)
where
    TestFn: FnOnce(PostgresRepo) -> Fut,
    Fut: Future<Output = ()>,
{
    let Some(database_url) = db::database_url() else {
        return;
    };

    let repo = PostgresRepo::new(&database_url, 1).await.unwrap();
    repo.migrate().await.unwrap();

    test_fn(repo).await;
}

pub fn new_reconciler<R: Repo>(
    repo: &R,
    price_source: Option<Arc<dyn PriceSource>>,
) -> Reconciler<R> {
    let enricher = Enricher::new(price_source, Default::default());

    Reconciler::new(repo.clone(), enricher, ReconcilerConfig::default())
}

pub fn new_ingester<R: Repo>(
    repo: &R,
    source: Source,
    changes: mpsc::Sender<LifecycleChange>,
) -> Ingester<R> {
    new_ingester_with(repo, source, changes, BLOCKS_PER_BATCH, BACKFILL_THRESHOLD)
}

pub fn new_ingester_with<R: Repo>(
    repo: &R,
    source: Source,
    changes: mpsc::Sender<LifecycleChange>,
    blocks_per_batch: u64,
    backfill_threshold: u64,
) -> Ingester<R> {
    Ingester::new(
        source,
        ProgressTracker::new(repo.clone(), blocks_per_batch, backfill_threshold),
        EventStore::new(repo.clone()),
        new_reconciler(repo, None),
        changes,
    )
    .with_provider_retries(Backoff::from_millis(1, 5), 3)
}

pub fn drain<T>(receiver: &mut mpsc::Receiver<T>) -> Vec<T> {
    let mut items = vec![];
    while let Ok(item) = receiver.try_recv() {
        items.push(item);
    }

    items
}
