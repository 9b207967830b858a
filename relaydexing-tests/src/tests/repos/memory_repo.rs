#[cfg(test)]
mod tests {
    use crate::test_runner;
    use crate::tests::repos::repo_contract;

    #[tokio::test]
    pub async fn moves_scan_progress_forward_only() {
        test_runner::run_test(|repo| repo_contract::moves_scan_progress_forward_only(repo)).await;
    }

    #[tokio::test]
    pub async fn keeps_one_active_event_per_identity() {
        test_runner::run_test(|repo| {
            repo_contract::keeps_one_active_event_per_identity(repo)
        })
        .await;
    }

    #[tokio::test]
    pub async fn never_invalidates_finalized_events() {
        test_runner::run_test(|repo| repo_contract::never_invalidates_finalized_events(repo)).await;
    }

    #[tokio::test]
    pub async fn guards_relay_hash_infos_by_version() {
        test_runner::run_test(|repo| repo_contract::guards_relay_hash_infos_by_version(repo)).await;
    }

    #[tokio::test]
    pub async fn queues_lifecycle_changes_with_their_writes() {
        test_runner::run_test(|repo| {
            repo_contract::queues_lifecycle_changes_with_their_writes(repo)
        })
        .await;
    }

    #[tokio::test]
    pub async fn records_enrichment_attempts_without_a_new_version() {
        test_runner::run_test(|repo| {
            repo_contract::records_enrichment_attempts_without_a_new_version(repo)
        })
        .await;
    }
}
