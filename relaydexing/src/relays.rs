//! The relay lifecycle aggregate and its reconciliation.

mod derivation;
mod lifecycle_change;
mod reconciler;
mod relay_hash_info;
mod status;

pub use derivation::{derive, Derivation, OrphanedRelayPolicy, RelayEvents, StatusPolicy};
pub use lifecycle_change::{LifecycleChange, QueuedLifecycleChange};
pub use reconciler::{Reconciler, ReconcilerConfig, ReconcilerError};
pub use relay_hash_info::RelayHashInfo;
pub use status::{ParseRelayStatusError, RelayStatus};
