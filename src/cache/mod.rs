pub mod store;
pub mod types;

pub use store::TtlCache;
pub use types::{CacheEntry, CacheRead, CacheSource, TtlPolicy, empty_default_for};
