mod enricher;
mod integrator;
mod price_source;

pub use enricher::Enricher;
pub use integrator::get_integrator_id;
pub use price_source::{CachedPriceSource, PriceError, PriceSource, TokenPrice, TokenRef};
