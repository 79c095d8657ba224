//! End-to-end test harness for the bar pipeline
//!
//! This crate drives the full pipeline in process, with no external
//! services:
//!
//! ```text
//! TickGenerator → IngestionRouter → shard synthesizers → hot cache
//!                                 ↘ historical replay  → cold store
//! ```
//!
//! ## Components
//!
//! - **generator**: Deterministic tick generator producing a seeded
//!   random walk over the trading sessions of one date
//! - **fixture**: Shared wiring that assembles the in-memory tiers, the
//!   router and the reconciler the way the service does
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use integration_tests::{PipelineFixture, TickGenConfig, TickGenerator};
//!
//! let fixture = PipelineFixture::new();
//! let mut generator = TickGenerator::new(TickGenConfig::lite());
//! let bundle = generator.generate(&fixture.calendar);
//!
//! let router = fixture.start_router();
//! for tick in &bundle.ticks {
//!     router.ingest_tick(tick.clone()).await;
//! }
//! let stats = router.shutdown().await;
//! ```
//!
//! ## Instrument naming
//!
//! Generated instruments follow the pattern `SIM0000.SH`, `SIM0001.SZ`,
//! alternating venue suffixes, so test data is easy to spot in logs.

pub mod fixture;
pub mod generator;

pub use fixture::PipelineFixture;
pub use generator::{
    instrument_id, session_frames, TickBundle, TickBundleMetadata, TickGenConfig, TickGenerator,
    VolumeProfile,
};
