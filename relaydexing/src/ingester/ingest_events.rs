use tracing::debug;

use crate::event_store::{EventStore, UpsertOutcome};
use crate::progress::ScanWindow;
use crate::{Repo, Source};

use super::IngesterError;

/// Stores the events of a freshly scanned window
pub async fn run<R: Repo>(
    source: &Source,
    event_store: &EventStore<R>,
    window: &ScanWindow,
) -> Result<Vec<UpsertOutcome>, IngesterError> {
    let events = source.feed.get_events(source.chain_id, window.from, window.to).await?;

    let mut outcomes = Vec::with_capacity(events.len());
    for event in events.iter().filter(|event| event.chain_id == source.chain_id) {
        outcomes.push(event_store.upsert_event(event).await?);
    }

    debug!(
        source_id = %source.id,
        from = window.from,
        to = window.to,
        events = outcomes.len(),
        "Ingested window"
    );

    Ok(outcomes)
}
