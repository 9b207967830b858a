use std::cmp::max;

use tracing::info;

use crate::event_store::{EventStore, ReorgOutcome};
use crate::progress::ScanProgress;
use crate::{Repo, Source};

use super::IngesterError;

/// Re-reads the scanned but not yet finalized blocks below `up_to_block_number`
/// and reconciles stored events with what the chain holds now.
pub async fn run<R: Repo>(
    source: &Source,
    event_store: &EventStore<R>,
    progress: Option<&ScanProgress>,
    up_to_block_number: u64,
) -> Result<Option<ReorgOutcome>, IngesterError> {
    let Some(progress) = progress else {
        return Ok(None);
    };

    let from = max(
        progress.last_finalized_block as u64 + 1,
        source.start_block_number,
    );
    let to = up_to_block_number.min(progress.latest_scanned_block as u64);
    if from > to {
        return Ok(None);
    }

    let observed_events = source.feed.get_events(source.chain_id, from, to).await?;
    let observed_events: Vec<_> = observed_events
        .into_iter()
        .filter(|event| event.chain_id == source.chain_id)
        .collect();

    let outcome = event_store
        .reconcile_range(source.chain_id, from, to, &observed_events)
        .await?;

    if outcome.has_reorg() {
        info!(
            source_id = %source.id,
            from,
            to,
            invalidated = outcome.invalidated.len(),
            "Reconciled chain reorg"
        );
    }

    Ok(Some(outcome))
}
