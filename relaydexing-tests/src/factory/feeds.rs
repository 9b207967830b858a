use std::sync::Mutex;

use relaydexing::events::EventIdentity;
use relaydexing::{ChainId, EventFeed, EventFeedError, UnsavedEvent};

/// A feed serving whatever events the test put on "the chain". Replacing
/// events simulates a reorg.
#[derive(Default)]
pub struct ScriptedFeed {
    events: Mutex<Vec<UnsavedEvent>>,
    requested_ranges: Mutex<Vec<(u64, u64)>>,
}

impl ScriptedFeed {
    pub fn new(events: Vec<UnsavedEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            requested_ranges: Mutex::new(vec![]),
        }
    }

    pub fn push(&self, event: UnsavedEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn remove(&self, identity: &EventIdentity) {
        self.events.lock().unwrap().retain(|event| &event.identity() != identity);
    }

    pub fn replace(&self, event: UnsavedEvent) {
        self.remove(&event.identity());
        self.push(event);
    }

    pub fn get_requested_ranges(&self) -> Vec<(u64, u64)> {
        self.requested_ranges.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EventFeed for ScriptedFeed {
    async fn get_events(
        &self,
        chain_id: ChainId,
        from_block_number: u64,
        to_block_number: u64,
    ) -> Result<Vec<UnsavedEvent>, EventFeedError> {
        self.requested_ranges.lock().unwrap().push((from_block_number, to_block_number));

        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.chain_id == chain_id)
            .filter(|event| (from_block_number..=to_block_number).contains(&event.block_number))
            .cloned()
            .collect())
    }
}
