//! Cold-tier bar storage and the tiered read path.
//!
//! The cold tier is TimescaleDB with one hypertable per bar period.
//! [`BarStore`] abstracts the operations the rest of the service needs so
//! that reconciliation and routing can run against an in-memory store in
//! tests. [`TieredBarReader`] merges the Redis hot tier with the cold tier
//! on read.

mod memory;
mod repository;
mod tiered;

pub use memory::MemoryBarStore;
pub use repository::{BarRepository, PeriodRowStats, StoreStats};
pub use tiered::TieredBarReader;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use market_common::data::{Bar, BarPeriod, DataError};
use market_common::error::{ErrorCategory, ErrorClassification};

// ============================================================================
// Errors
// ============================================================================

/// Errors from the storage layer.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Hot-tier failure surfaced through the tiered read path.
    #[error("Hot tier error: {0}")]
    HotTier(#[from] DataError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ErrorClassification for RepositoryError {
    fn category(&self) -> ErrorCategory {
        match self {
            RepositoryError::Database(_) => ErrorCategory::Transient,
            RepositoryError::HotTier(e) => e.category(),
            RepositoryError::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    fn suggested_retry_delay(&self) -> Option<std::time::Duration> {
        match self {
            RepositoryError::Database(_) => Some(std::time::Duration::from_millis(500)),
            RepositoryError::HotTier(e) => e.suggested_retry_delay(),
            _ => None,
        }
    }
}

/// Result type for storage operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

// ============================================================================
// Store abstraction
// ============================================================================

/// Cold-tier store operations.
///
/// Dates are exchange-local trading dates; instants are UTC. Implementations
/// must deduplicate on `(instrument_id, frame_start)` so that replayed
/// inserts are no-ops.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Insert bars for one period. Returns the number of rows actually
    /// written; duplicates are silently skipped.
    async fn insert_bars(&self, period: BarPeriod, bars: &[Bar]) -> RepositoryResult<usize>;

    /// Bars for one instrument with `frame_start` in `[start, end]`,
    /// ascending by frame start.
    async fn query_range(
        &self,
        instrument_id: &str,
        period: BarPeriod,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Bar>>;

    /// Distinct instruments with 1-minute coverage on a trading date.
    async fn count_distinct_instruments(&self, date: NaiveDate) -> RepositoryResult<u64>;

    /// Instrument codes with 1-minute coverage on a trading date, sorted.
    async fn list_instruments(&self, date: NaiveDate) -> RepositoryResult<Vec<String>>;

    /// Largest per-date distinct instrument count across all stored dates.
    /// Zero for an empty store.
    async fn max_daily_instrument_count(&self) -> RepositoryResult<u64>;

    /// Trading dates with any 1-minute coverage in `[start, end]`, sorted.
    async fn distinct_trading_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepositoryResult<Vec<NaiveDate>>;
}
