mod event;
mod payload;

pub use event::{ChainEvent, EventIdentity, UnsavedEvent};
pub use payload::{
    Deposit, EventKind, EventPayload, Fill, FillType, RelayData, SlowFillRequest, SpeedUp, Swap,
};
