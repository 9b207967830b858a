use ethers::types::{Address, H256, U256};
use relaydexing::events::{Deposit, Fill, FillType, RelayData, SlowFillRequest, Swap};
use relaydexing::{ChainId, EventPayload, UnsavedEvent};

pub const ORIGIN_CHAIN_ID: ChainId = 1;
pub const DESTINATION_CHAIN_ID: ChainId = 10;

/// Far enough in the future for every test relay to stay fillable
pub const FILL_DEADLINE: u32 = 4_000_000_000;
pub const QUOTE_TIMESTAMP: u32 = 1_700_000_000;

pub const DEPOSIT_LOG_INDEX: u32 = 4;
pub const SWAP_LOG_INDEX: u32 = 2;

pub fn h256(value: u64) -> H256 {
    H256::from_low_u64_be(value)
}

pub fn address(value: u64) -> Address {
    Address::from_low_u64_be(value)
}

pub fn input_token() -> Address {
    address(0xa1)
}

pub fn output_token() -> Address {
    address(0xa2)
}

/// `value` whole tokens with 18 decimals
pub fn tokens(value: u64) -> U256 {
    U256::exp10(18) * value
}

pub fn block_hash(block_number: u64) -> H256 {
    h256(block_number)
}

/// Block hash of the same height on a competing fork
pub fn forked_block_hash(block_number: u64, fork: u64) -> H256 {
    h256((fork << 32) + block_number)
}

pub fn deposit_transaction_hash(deposit_id: u64) -> H256 {
    h256(0xd000_0000 + deposit_id)
}

pub fn fill_transaction_hash(deposit_id: u64) -> H256 {
    h256(0xf000_0000 + deposit_id)
}

/// Relay of 100 input tokens for 99 output tokens
pub fn relay_data(deposit_id: u64) -> RelayData {
    RelayData {
        depositor: address(0xde),
        recipient: address(0xec),
        exclusive_relayer: Address::zero(),
        input_token: input_token(),
        output_token: output_token(),
        input_amount: tokens(100),
        output_amount: tokens(99),
        origin_chain_id: ORIGIN_CHAIN_ID,
        destination_chain_id: DESTINATION_CHAIN_ID,
        deposit_id: U256::from(deposit_id),
        fill_deadline: FILL_DEADLINE,
        exclusivity_deadline: 0,
        message_hash: H256::zero(),
    }
}

pub fn expired_relay_data(deposit_id: u64) -> RelayData {
    RelayData {
        fill_deadline: QUOTE_TIMESTAMP,
        ..relay_data(deposit_id)
    }
}

pub fn deposit_event(relay_data: &RelayData, block_number: u64) -> UnsavedEvent {
    UnsavedEvent::new(
        relay_data.origin_chain_id,
        block_number,
        block_hash(block_number),
        deposit_transaction_hash(relay_data.deposit_id.as_u64()),
        DEPOSIT_LOG_INDEX,
        EventPayload::Deposit(Deposit {
            relay_data: relay_data.clone(),
            quote_timestamp: QUOTE_TIMESTAMP,
        }),
    )
}

pub fn fill_event(relay_data: &RelayData, block_number: u64) -> UnsavedEvent {
    fill_event_with_gas(relay_data, block_number, None)
}

pub fn fill_event_with_gas(
    relay_data: &RelayData,
    block_number: u64,
    gas_cost_wei: Option<U256>,
) -> UnsavedEvent {
    UnsavedEvent::new(
        relay_data.destination_chain_id,
        block_number,
        block_hash(block_number),
        fill_transaction_hash(relay_data.deposit_id.as_u64()),
        0,
        EventPayload::Fill(Fill {
            relay_data: relay_data.clone(),
            relayer: address(0x7e),
            repayment_chain_id: relay_data.origin_chain_id,
            fill_type: FillType::FastFill,
            gas_cost_wei,
        }),
    )
}

pub fn slow_fill_request_event(relay_data: &RelayData, block_number: u64) -> UnsavedEvent {
    UnsavedEvent::new(
        relay_data.destination_chain_id,
        block_number,
        block_hash(block_number),
        h256(0x5f00_0000 + relay_data.deposit_id.as_u64()),
        0,
        EventPayload::SlowFillRequest(SlowFillRequest {
            relay_data: relay_data.clone(),
        }),
    )
}

/// A swap executed in the deposit's transaction right before it
pub fn swap_event(deposit_event: &UnsavedEvent, swap: Swap) -> UnsavedEvent {
    UnsavedEvent::new(
        deposit_event.chain_id,
        deposit_event.block_number,
        deposit_event.block_hash,
        deposit_event.transaction_hash,
        SWAP_LOG_INDEX,
        EventPayload::Swap(swap),
    )
}

/// The same event as seen on another fork, i.e. a different block hash
pub fn on_fork(event: &UnsavedEvent, fork: u64) -> UnsavedEvent {
    UnsavedEvent {
        block_hash: forked_block_hash(event.block_number, fork),
        ..event.clone()
    }
}
