//! Backfill source trait and error classification.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use market_common::data::{Bar, BarPeriod};
use market_common::error::{ErrorCategory, ErrorClassification};

/// Errors from a backfill source.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed vendor response: {0}")]
    Parse(String),
}

impl ErrorClassification for ProviderError {
    fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::Connection(_) => ErrorCategory::Transient,
            ProviderError::Timeout(_) => ErrorCategory::Transient,
            ProviderError::RateLimit(_) => ErrorCategory::ResourceExhausted,
            ProviderError::Authentication(_) => ErrorCategory::Configuration,
            ProviderError::Configuration(_) => ErrorCategory::Configuration,
            ProviderError::Parse(_) => ErrorCategory::Permanent,
        }
    }

    fn suggested_retry_delay(&self) -> Option<std::time::Duration> {
        match self {
            ProviderError::Connection(_) => Some(std::time::Duration::from_secs(2)),
            ProviderError::Timeout(_) => Some(std::time::Duration::from_millis(500)),
            ProviderError::RateLimit(_) => Some(std::time::Duration::from_secs(60)),
            _ => None,
        }
    }
}

/// Result type for backfill source operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A vendor-side source of finalized historical bars.
///
/// Partial results are normal: a source may know only a subset of the
/// requested instruments and returns whatever it has.
#[async_trait]
pub trait BackfillSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Finalized bars for the given instruments with frame starts in
    /// `[start, end]`.
    async fn fetch_bars(
        &self,
        instrument_ids: &[String],
        period: BarPeriod,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ProviderResult<Vec<Bar>>;

    /// Instruments the source can serve.
    async fn list_instruments(&self) -> ProviderResult<Vec<String>>;

    /// Exchange holidays in `[start, end]`.
    async fn fetch_holidays(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<Vec<NaiveDate>>;

    /// Cheap connectivity probe.
    async fn check_connection(&self) -> ProviderResult<()>;
}
