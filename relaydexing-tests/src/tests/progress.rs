#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relaydexing::progress::{get_window, ProgressError};
    use relaydexing::{ProgressTracker, Repo, ScanProgress, ScanWindow};

    use crate::factory::{source, MockProvider, ScriptedFeed, ORIGIN_CHAIN_ID};
    use crate::test_runner;

    fn origin_source() -> relaydexing::Source {
        let provider = Arc::new(MockProvider::new(0));
        let feed = Arc::new(ScriptedFeed::default());

        source(ORIGIN_CHAIN_ID, &provider, &feed)
    }

    #[test]
    pub fn starts_at_the_start_block_without_progress() {
        let source = origin_source().with_start_block_number(500);

        let window = get_window(&source, None, 1_000, 100, 10_000).unwrap();

        assert_eq!(
            window,
            ScanWindow {
                from: 500,
                to: 599,
                is_backfilling: false
            }
        );
    }

    #[test]
    pub fn continues_right_after_latest_scanned_block() {
        let source = origin_source();
        let progress = ScanProgress::new(&source.id, 599, false);

        let window = get_window(&source, Some(&progress), 1_000, 100, 10_000).unwrap();

        assert_eq!((window.from, window.to), (600, 699));
    }

    #[test]
    pub fn never_scans_past_the_safety_lag() {
        let source = origin_source().with_safety_lag(10);
        let progress = ScanProgress::new(&source.id, 80, false);

        let window = get_window(&source, Some(&progress), 100, 100, 10_000).unwrap();
        assert_eq!((window.from, window.to), (81, 90));

        let caught_up = ScanProgress::new(&source.id, 90, false);
        assert!(get_window(&source, Some(&caught_up), 100, 100, 10_000).is_none());
        assert!(get_window(&source, None, 5, 100, 10_000).is_none());
    }

    #[test]
    pub fn flags_windows_far_behind_the_head_as_backfill() {
        let source = origin_source();

        let far_behind = get_window(&source, None, 10_000, 100, 1_000).unwrap();
        let near_head = get_window(&source, None, 1_050, 1_000, 100).unwrap();

        assert!(far_behind.is_backfilling);
        assert!(!near_head.is_backfilling);
    }

    #[tokio::test]
    pub async fn tracks_scanned_blocks_monotonically() {
        test_runner::run_test(|repo| async move {
            let tracker = ProgressTracker::new(repo.clone(), 100, 1_000);

            let progress = tracker.mark_scanned("1", 99, true).await.unwrap();
            assert_eq!(progress.latest_scanned_block, 99);
            assert!(progress.is_backfilling);

            let progress = tracker.mark_scanned("1", 199, false).await.unwrap();
            assert_eq!(progress.latest_scanned_block, 199);
            assert!(!progress.is_backfilling);

            let regression = tracker.mark_scanned("1", 150, false).await.unwrap_err();
            assert!(matches!(
                regression,
                ProgressError::Regression {
                    current: 199,
                    requested: 150,
                    ..
                }
            ));
            assert!(regression.is_fatal());

            let stored = repo.get_scan_progress("1").await.unwrap().unwrap();
            assert_eq!(stored.latest_scanned_block, 199);
        })
        .await;
    }

    #[tokio::test]
    pub async fn never_finalizes_beyond_latest_scanned_block() {
        test_runner::run_test(|repo| async move {
            let tracker = ProgressTracker::new(repo.clone(), 100, 1_000);
            tracker.mark_scanned("10", 50, false).await.unwrap();

            let progress = tracker.mark_finalized("10", 40).await.unwrap();
            assert_eq!(progress.last_finalized_block, 40);

            let ahead = tracker.mark_finalized("10", 51).await.unwrap_err();
            assert!(matches!(ahead, ProgressError::FinalizedAheadOfScanned { .. }));

            let regression = tracker.mark_finalized("10", 30).await.unwrap_err();
            assert!(matches!(regression, ProgressError::FinalizedRegression { .. }));

            let stored = repo.get_scan_progress("10").await.unwrap().unwrap();
            assert_eq!(stored.last_finalized_block, 40);
        })
        .await;
    }

    #[tokio::test]
    pub async fn keeps_sources_of_one_chain_apart() {
        test_runner::run_test(|repo| async move {
            let tracker = ProgressTracker::new(repo.clone(), 100, 1_000);

            tracker.mark_scanned("1", 1_000, false).await.unwrap();
            tracker.mark_scanned("1:backfill", 10, true).await.unwrap();

            let live = tracker.get_progress("1").await.unwrap().unwrap();
            let backfill = tracker.get_progress("1:backfill").await.unwrap().unwrap();
            assert_eq!(live.latest_scanned_block, 1_000);
            assert_eq!(backfill.latest_scanned_block, 10);
        })
        .await;
    }
}
