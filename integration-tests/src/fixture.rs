//! Shared wiring for end-to-end tests.
//!
//! Assembles the in-memory hot and cold tiers, the ingestion router and
//! the reconciler exactly the way the service wires their production
//! counterparts, so tests exercise the real seams.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use bar_manager::config::{ReconciliationSettings, SynthesisSettings};
use bar_manager::{
    BackfillSource, CompletenessReconciler, IngestionRouter, InstrumentUniverse, MemoryBarStore,
    MockBarSource, TieredBarReader,
};
use market_common::calendar::TradingCalendar;
use market_common::data::MemoryBarCache;
use market_common::error::RetryPolicy;

/// In-memory stand-ins for both tiers plus the calendar they share.
pub struct PipelineFixture {
    pub calendar: Arc<TradingCalendar>,
    pub cache: Arc<MemoryBarCache>,
    pub store: Arc<MemoryBarStore>,
}

impl PipelineFixture {
    pub fn new() -> Self {
        Self {
            calendar: Arc::new(TradingCalendar::default()),
            cache: Arc::new(MemoryBarCache::new(3600)),
            store: Arc::new(MemoryBarStore::default()),
        }
    }

    /// Router over this fixture's tiers with default synthesis settings.
    pub fn start_router(&self) -> IngestionRouter {
        IngestionRouter::start(
            self.cache.clone(),
            self.store.clone(),
            self.calendar.clone(),
            &SynthesisSettings::default(),
        )
    }

    /// Merged read path over this fixture's tiers.
    pub fn reader(&self) -> TieredBarReader<MemoryBarCache, MemoryBarStore> {
        TieredBarReader::new(self.cache.clone(), self.store.clone(), self.calendar.clone())
    }

    /// Mock vendor that can serve the given instruments.
    pub fn mock_source(&self, instruments: &[String]) -> Arc<MockBarSource> {
        Arc::new(
            MockBarSource::new(self.calendar.clone()).with_instruments(instruments.to_vec()),
        )
    }

    /// Reconciler over this fixture's store with a fast retry policy.
    /// The returned sender cancels a running backfill between batches.
    pub fn reconciler(
        &self,
        source: Arc<dyn BackfillSource>,
        universe: &[String],
    ) -> (CompletenessReconciler, broadcast::Sender<()>) {
        let universe = Arc::new(InstrumentUniverse::with_seed(universe.iter().cloned()));
        let (shutdown_tx, _keep) = broadcast::channel(1);
        let reconciler = CompletenessReconciler::new(
            self.store.clone(),
            source,
            self.calendar.clone(),
            universe,
            &ReconciliationSettings::default(),
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)),
            &shutdown_tx,
        );
        (reconciler, shutdown_tx)
    }
}

impl Default for PipelineFixture {
    fn default() -> Self {
        Self::new()
    }
}
