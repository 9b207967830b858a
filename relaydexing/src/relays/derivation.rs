use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::events::{ChainEvent, Deposit, EventKind, EventPayload, Fill, Swap};

use super::{RelayHashInfo, RelayStatus};

/// What happens to a relay aggregate whose deposit event was invalidated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrphanedRelayPolicy {
    /// Delete the aggregate. A later re-observed deposit recreates it.
    #[default]
    Remove,
    /// Keep the row as `Pending` with no deposit reference
    RetainAsPending,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPolicy {
    /// When false, slow fill requests never move a relay out of `Pending`
    pub track_slow_fill_requests: bool,
    pub orphaned_relays: OrphanedRelayPolicy,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            track_slow_fill_requests: true,
            orphaned_relays: OrphanedRelayPolicy::Remove,
        }
    }
}

/// The active events of one relay hash, plus swaps from its deposit transaction
#[derive(Clone, Debug, Default)]
pub struct RelayEvents {
    pub deposits: Vec<ChainEvent>,
    pub fills: Vec<ChainEvent>,
    pub slow_fill_requests: Vec<ChainEvent>,
    pub swaps: Vec<ChainEvent>,
}

impl RelayEvents {
    pub fn new(events: Vec<ChainEvent>) -> Self {
        let mut relay_events = Self::default();

        for event in events.into_iter().filter(|event| event.is_active()) {
            if event.is_kind(EventKind::Deposit) {
                relay_events.deposits.push(event);
            } else if event.is_kind(EventKind::Fill) {
                relay_events.fills.push(event);
            } else if event.is_kind(EventKind::SlowFillRequest) {
                relay_events.slow_fill_requests.push(event);
            } else if event.is_kind(EventKind::Swap) {
                relay_events.swaps.push(event);
            }
        }

        relay_events
    }

    pub fn latest_deposit(&self) -> Option<(&ChainEvent, Deposit)> {
        most_recent(&self.deposits).and_then(|event| match event.get_payload()? {
            EventPayload::Deposit(deposit) => Some((event, deposit)),
            _ => None,
        })
    }

    pub fn latest_fill(&self) -> Option<(&ChainEvent, Fill)> {
        most_recent(&self.fills).and_then(|event| match event.get_payload()? {
            EventPayload::Fill(fill) => Some((event, fill)),
            _ => None,
        })
    }

    pub fn latest_slow_fill_request(&self) -> Option<&ChainEvent> {
        most_recent(&self.slow_fill_requests)
    }

    /// The swap logged right before the deposit in the same transaction
    pub fn swap_before(&self, deposit_event: &ChainEvent) -> Option<Swap> {
        self.swaps
            .iter()
            .filter(|swap| {
                swap.chain_id == deposit_event.chain_id
                    && swap.transaction_hash == deposit_event.transaction_hash
                    && swap.log_index < deposit_event.log_index
            })
            .max_by_key(|swap| swap.log_index)
            .and_then(|swap| match swap.get_payload()? {
                EventPayload::Swap(swap) => Some(swap),
                _ => None,
            })
    }
}

fn most_recent(events: &[ChainEvent]) -> Option<&ChainEvent> {
    events.iter().max_by_key(|event| event.recency())
}

#[derive(Clone, Debug, PartialEq)]
pub enum Derivation {
    Unchanged,
    /// Write this aggregate. Its version is one past the existing row's.
    Upsert(RelayHashInfo),
    Remove,
}

/// Derives the aggregate a relay hash should have from its currently active
/// events. Only active events are consulted, so running it again over the
/// same event set yields `Unchanged`.
pub fn derive(
    relay_hash: &str,
    existing: Option<&RelayHashInfo>,
    events: &RelayEvents,
    policy: &StatusPolicy,
) -> Derivation {
    let target = match events.latest_deposit() {
        Some((deposit_event, deposit)) => {
            Some(from_deposit(relay_hash, deposit_event, &deposit, events, policy))
        }
        None => match (existing, policy.orphaned_relays) {
            (Some(existing), OrphanedRelayPolicy::RetainAsPending) => Some(orphaned(existing)),
            _ => None,
        },
    };

    match (existing, target) {
        (None, None) => Derivation::Unchanged,
        (Some(_), None) => Derivation::Remove,
        (None, Some(target)) => Derivation::Upsert(target),
        (Some(existing), Some(mut target)) => {
            if existing.same_lifecycle_as(&target) {
                Derivation::Unchanged
            } else {
                target.carry_enrichment_from(existing);
                target.version = existing.version + 1;
                Derivation::Upsert(target)
            }
        }
    }
}

fn from_deposit(
    relay_hash: &str,
    deposit_event: &ChainEvent,
    deposit: &Deposit,
    events: &RelayEvents,
    policy: &StatusPolicy,
) -> RelayHashInfo {
    let relay_data = &deposit.relay_data;
    let fill = events.latest_fill().map(|(event, _fill)| event);
    let slow_fill_request = events.latest_slow_fill_request();

    let status = match (fill, slow_fill_request) {
        (Some(_), _) => RelayStatus::Filled,
        (None, Some(_)) if policy.track_slow_fill_requests => RelayStatus::SlowFillRequested,
        _ => RelayStatus::Pending,
    };

    RelayHashInfo {
        relay_hash: relay_hash.to_string(),
        origin_chain_id: relay_data.origin_chain_id as i64,
        destination_chain_id: relay_data.destination_chain_id as i64,
        deposit_id: relay_data.deposit_id.to_string(),
        deposit_event_id: Some(deposit_event.id),
        deposit_tx_hash: Some(deposit_event.transaction_hash.clone()),
        fill_event_id: fill.map(|fill| fill.id),
        fill_tx_hash: fill.map(|fill| fill.transaction_hash.clone()),
        slow_fill_request_event_id: slow_fill_request.map(|request| request.id),
        status,
        fill_deadline: relay_data.fill_deadline_at(),
        integrator_id: None,
        bridge_fee_usd: None,
        gas_fee_usd: None,
        swap_fee_usd: None,
        input_price_usd: None,
        output_price_usd: None,
        swap_token_price_usd: None,
        version: 1,
        updated_at: Utc::now(),
        enrichment_attempted_at: None,
    }
}

fn orphaned(existing: &RelayHashInfo) -> RelayHashInfo {
    RelayHashInfo {
        deposit_event_id: None,
        deposit_tx_hash: None,
        fill_event_id: None,
        fill_tx_hash: None,
        slow_fill_request_event_id: None,
        status: RelayStatus::Pending,
        updated_at: Utc::now(),
        ..existing.clone()
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::{Address, H256, U256};

    use crate::events::{FillType, RelayData, SlowFillRequest, UnsavedEvent};

    use super::*;

    fn relay_data() -> RelayData {
        RelayData {
            depositor: Address::repeat_byte(1),
            recipient: Address::repeat_byte(2),
            exclusive_relayer: Address::zero(),
            input_token: Address::repeat_byte(3),
            output_token: Address::repeat_byte(4),
            input_amount: U256::from(1_000_000u64),
            output_amount: U256::from(990_000u64),
            origin_chain_id: 1,
            destination_chain_id: 10,
            deposit_id: U256::from(7u64),
            fill_deadline: 1_900_000_000,
            exclusivity_deadline: 0,
            message_hash: H256::zero(),
        }
    }

    fn chain_event(chain_id: u64, block_number: u64, payload: EventPayload) -> ChainEvent {
        let unsaved_event = UnsavedEvent::new(
            chain_id,
            block_number,
            H256::from_low_u64_be(block_number),
            H256::from_low_u64_be(block_number * 1_000),
            0,
            payload,
        );

        ChainEvent::new(&unsaved_event).unwrap()
    }

    fn deposit_event() -> ChainEvent {
        let deposit = Deposit {
            relay_data: relay_data(),
            quote_timestamp: 1_700_000_000,
        };

        chain_event(1, 90, EventPayload::Deposit(deposit))
    }

    fn fill_event(block_number: u64) -> ChainEvent {
        let fill = Fill {
            relay_data: relay_data(),
            relayer: Address::repeat_byte(9),
            repayment_chain_id: 1,
            fill_type: FillType::FastFill,
            gas_cost_wei: None,
        };

        chain_event(10, block_number, EventPayload::Fill(fill))
    }

    fn slow_fill_request_event() -> ChainEvent {
        let request = SlowFillRequest {
            relay_data: relay_data(),
        };

        chain_event(10, 80, EventPayload::SlowFillRequest(request))
    }

    fn upserted(derivation: Derivation) -> RelayHashInfo {
        match derivation {
            Derivation::Upsert(info) => info,
            other => panic!("expected an upsert, got {other:?}"),
        }
    }

    #[test]
    fn deposit_alone_is_pending() {
        let events = RelayEvents::new(vec![deposit_event()]);
        let relay_hash = relay_data().relay_hash();

        let info = upserted(derive(&relay_hash, None, &events, &StatusPolicy::default()));

        assert_eq!(info.status, RelayStatus::Pending);
        assert_eq!(info.version, 1);
        assert_eq!(info.fill_tx_hash, None);
    }

    #[test]
    fn fill_without_deposit_is_buffered() {
        let events = RelayEvents::new(vec![fill_event(95)]);

        let derivation = derive("0xabc", None, &events, &StatusPolicy::default());

        assert_eq!(derivation, Derivation::Unchanged);
    }

    #[test]
    fn most_recent_fill_wins() {
        let older_fill = fill_event(95);
        let newer_fill = fill_event(97);
        let events = RelayEvents::new(vec![deposit_event(), newer_fill.clone(), older_fill]);
        let relay_hash = relay_data().relay_hash();

        let info = upserted(derive(&relay_hash, None, &events, &StatusPolicy::default()));

        assert_eq!(info.status, RelayStatus::Filled);
        assert_eq!(info.fill_event_id, Some(newer_fill.id));
    }

    #[test]
    fn slow_fill_requests_follow_policy() {
        let events = RelayEvents::new(vec![deposit_event(), slow_fill_request_event()]);
        let relay_hash = relay_data().relay_hash();
        let untracked = StatusPolicy {
            track_slow_fill_requests: false,
            ..StatusPolicy::default()
        };

        let tracked_info = upserted(derive(&relay_hash, None, &events, &StatusPolicy::default()));
        let untracked_info = upserted(derive(&relay_hash, None, &events, &untracked));

        assert_eq!(tracked_info.status, RelayStatus::SlowFillRequested);
        assert_eq!(untracked_info.status, RelayStatus::Pending);
    }

    #[test]
    fn rederiving_the_same_events_is_unchanged() {
        let events = RelayEvents::new(vec![deposit_event(), fill_event(95)]);
        let relay_hash = relay_data().relay_hash();
        let policy = StatusPolicy::default();

        let info = upserted(derive(&relay_hash, None, &events, &policy));

        assert_eq!(derive(&relay_hash, Some(&info), &events, &policy), Derivation::Unchanged);
    }

    #[test]
    fn losing_the_fill_rolls_back_to_pending() {
        let deposit = deposit_event();
        let relay_hash = relay_data().relay_hash();
        let policy = StatusPolicy::default();
        let filled = upserted(derive(
            &relay_hash,
            None,
            &RelayEvents::new(vec![deposit.clone(), fill_event(95)]),
            &policy,
        ));

        let rolled_back = upserted(derive(
            &relay_hash,
            Some(&filled),
            &RelayEvents::new(vec![deposit]),
            &policy,
        ));

        assert_eq!(rolled_back.status, RelayStatus::Pending);
        assert_eq!(rolled_back.fill_tx_hash, None);
        assert_eq!(rolled_back.version, filled.version + 1);
    }

    #[test]
    fn losing_the_deposit_follows_orphan_policy() {
        let relay_hash = relay_data().relay_hash();
        let events = RelayEvents::new(vec![deposit_event(), fill_event(95)]);
        let filled = upserted(derive(&relay_hash, None, &events, &StatusPolicy::default()));
        let orphaned_events = RelayEvents::new(vec![fill_event(95)]);
        let retaining = StatusPolicy {
            orphaned_relays: OrphanedRelayPolicy::RetainAsPending,
            ..StatusPolicy::default()
        };

        let removed =
            derive(&relay_hash, Some(&filled), &orphaned_events, &StatusPolicy::default());
        let retained = upserted(derive(&relay_hash, Some(&filled), &orphaned_events, &retaining));

        assert_eq!(removed, Derivation::Remove);
        assert_eq!(retained.status, RelayStatus::Pending);
        assert_eq!(retained.deposit_event_id, None);
        assert_eq!(retained.deposit_tx_hash, None);
        assert_eq!(retained.fill_tx_hash, None);
        assert_eq!(retained.deposit_id, filled.deposit_id);
    }

    #[test]
    fn invalidated_events_are_ignored() {
        let mut fill = fill_event(95);
        fill.deleted_at = Some(Utc::now());
        let events = RelayEvents::new(vec![deposit_event(), fill]);

        let info = upserted(derive(
            &relay_data().relay_hash(),
            None,
            &events,
            &StatusPolicy::default(),
        ));

        assert_eq!(info.status, RelayStatus::Pending);
    }
}
