mod events;
mod feeds;
mod prices;
mod providers;
mod repos;
mod transports;

pub use events::*;
pub use feeds::*;
pub use prices::*;
pub use providers::*;
pub use repos::*;
pub use transports::*;
