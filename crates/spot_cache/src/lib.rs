pub mod batch;
pub mod keys;
pub mod single_flight;
pub mod store;

pub use batch::fetch_all;
pub use keys::CacheKey;
pub use single_flight::SingleFlight;
pub use store::{CacheStats, CacheValue, TtlCache};
