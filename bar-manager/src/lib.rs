//! # Bar Manager
//!
//! Tiered OHLCV bar pipeline: tick ingestion, calendar-gated bar
//! synthesis, hot/cold storage, and completeness reconciliation.
//!
//! ## Features
//!
//! - **Bar synthesis**: 1/5/15/30-minute OHLCV bars from trade ticks, one
//!   synthesizer per instrument shard, admission-checked against the
//!   trading calendar
//! - **Tiered storage**: TTL-bounded Redis hot tier for the current
//!   session, TimescaleDB hypertables for history, merged on read
//! - **Completeness reconciliation**: per-date instrument coverage checks
//!   with bounded-batch backfill from a vendor capability trait
//! - **Scheduled maintenance**: cron-lite scheduler driving daily
//!   reconciliation, hot-store flush, health checks, and calendar /
//!   universe refreshes
//!
//! ## Architecture
//!
//! Ticks are hashed to sharded synthesis workers so each instrument is
//! owned by exactly one task; closed bars flow through a bounded channel
//! into the hot cache. The cold tier is written only by the historical
//! import path and the reconciler, keeping live and repaired data on
//! separate, idempotent paths. Shared domain types (bars, ticks, the
//! trading calendar, retry policies) live in `market-common`.

pub mod admin;
pub mod cli;
pub mod config;
pub mod ingest;
pub mod instruments;
pub mod provider;
pub mod reconcile;
pub mod scheduler;
pub mod storage;
pub mod synthesis;

// Re-export commonly used types
pub use config::Settings;
pub use ingest::{IngestionRouter, RouterStats};
pub use instruments::InstrumentUniverse;
pub use provider::{BackfillSource, MockBarSource, ProviderError, ProviderResult};
pub use reconcile::{
    BackfillOutcome, CompletenessReconciler, CompletenessState, CoverageReport,
};
pub use storage::{BarRepository, BarStore, MemoryBarStore, TieredBarReader};
pub use synthesis::{BarSynthesizer, SynthesizerStats};
