//! Error classification and retry policy shared across the pipeline.
//!
//! This module provides:
//! - Error classification traits for retry logic
//! - A bounded exponential-backoff retry policy for I/O boundaries
//!
//! Per-boundary error enums live with the modules they describe
//! ([`crate::data::DataError`], the service crate's repository and
//! provider errors) and implement [`ErrorClassification`] so the retry
//! policy can treat them uniformly.

mod retry;
mod traits;

pub use retry::RetryPolicy;
pub use traits::{ErrorCategory, ErrorClassification};
