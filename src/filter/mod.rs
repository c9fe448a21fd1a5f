pub mod chain;
pub mod rule;

pub use chain::{DEFAULT_RESONANCE_THRESHOLD, FilterChain, FilterStats, resonance_filter};
pub use rule::FilterRule;
