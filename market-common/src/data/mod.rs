pub mod cache;
pub mod merge;
pub mod types;

// Re-export the core value types
pub use types::{Bar, BarPeriod, DataError, DataResult, Tick};

// Re-export the cache seam
pub use cache::{BarCache, MemoryBarCache, RedisBarCache, DEFAULT_HOT_TTL_SECONDS};

// Re-export the pure tier merge
pub use merge::merge_bars;
