//! Coverage checking and bounded-batch backfill.
//!
//! The reconciler answers "does the cold store hold a full trading day"
//! and repairs the dates that fall short. Completeness is measured per
//! date as distinct instruments present versus expected; repair fetches
//! the missing instruments from the backfill source in batches, validates
//! every returned bar, and re-checks once at the end. A failed batch is
//! logged and skipped, never fatal, and a shutdown signal cancels between
//! batches with partial progress retained.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use market_common::calendar::TradingCalendar;
use market_common::data::{Bar, BarPeriod};
use market_common::error::{ErrorCategory, ErrorClassification, RetryPolicy};

use crate::config::ReconciliationSettings;
use crate::instruments::InstrumentUniverse;
use crate::provider::{BackfillSource, ProviderError};
use crate::storage::{BarStore, RepositoryError};

use super::{CompletenessState, CoverageReport};

// ============================================================================
// Errors
// ============================================================================

/// Errors from reconciliation runs.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Store error: {0}")]
    Store(#[from] RepositoryError),

    #[error("Backfill source error: {0}")]
    Source(#[from] ProviderError),

    #[error("Reconciliation already running for {0}")]
    AlreadyRunning(NaiveDate),
}

impl ErrorClassification for ReconcileError {
    fn category(&self) -> ErrorCategory {
        match self {
            ReconcileError::Store(e) => e.category(),
            ReconcileError::Source(e) => e.category(),
            // The per-date slot frees up when the running pass finishes.
            ReconcileError::AlreadyRunning(_) => ErrorCategory::ResourceExhausted,
        }
    }

    fn suggested_retry_delay(&self) -> Option<std::time::Duration> {
        match self {
            ReconcileError::Store(e) => e.suggested_retry_delay(),
            ReconcileError::Source(e) => e.suggested_retry_delay(),
            ReconcileError::AlreadyRunning(_) => Some(std::time::Duration::from_secs(30)),
        }
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

// ============================================================================
// Outcome
// ============================================================================

/// What one backfill pass did.
#[derive(Debug, Clone)]
pub struct BackfillOutcome {
    pub date: NaiveDate,
    /// Instruments absent before the pass started.
    pub missing_instruments: usize,
    /// Batches attempted.
    pub batches: usize,
    /// Batches where a fetch or insert failed after retries.
    pub failed_batches: usize,
    /// Bars newly written to the cold store, all periods.
    pub bars_inserted: usize,
    /// Vendor bars dropped by validation.
    pub bars_rejected: usize,
    /// Whether a shutdown signal stopped the pass early.
    pub cancelled: bool,
    /// Coverage after the pass.
    pub report: CoverageReport,
}

impl BackfillOutcome {
    fn noop(date: NaiveDate, report: CoverageReport) -> Self {
        Self {
            date,
            missing_instruments: 0,
            batches: 0,
            failed_batches: 0,
            bars_inserted: 0,
            bars_rejected: 0,
            cancelled: false,
            report,
        }
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Detects and repairs per-date coverage gaps in the cold store.
pub struct CompletenessReconciler {
    store: Arc<dyn BarStore>,
    source: Arc<dyn BackfillSource>,
    calendar: Arc<TradingCalendar>,
    universe: Arc<InstrumentUniverse>,
    threshold: f64,
    default_batch_size: usize,
    expected_override: Option<u64>,
    fetch_retry: RetryPolicy,
    store_retry: RetryPolicy,
    states: RwLock<HashMap<NaiveDate, CompletenessState>>,
    in_flight: Mutex<HashSet<NaiveDate>>,
    shutdown_rx: Mutex<broadcast::Receiver<()>>,
    shutdown_seen: AtomicBool,
}

impl CompletenessReconciler {
    pub fn new(
        store: Arc<dyn BarStore>,
        source: Arc<dyn BackfillSource>,
        calendar: Arc<TradingCalendar>,
        universe: Arc<InstrumentUniverse>,
        settings: &ReconciliationSettings,
        fetch_retry: RetryPolicy,
        shutdown: &broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            source,
            calendar,
            universe,
            threshold: settings.completeness_threshold,
            default_batch_size: settings.batch_size.max(1),
            expected_override: settings.expected_count,
            fetch_retry,
            store_retry: RetryPolicy::store_default(),
            states: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            shutdown_rx: Mutex::new(shutdown.subscribe()),
            shutdown_seen: AtomicBool::new(false),
        }
    }

    /// Last classification for a date; `Unchecked` if never examined.
    pub fn state_of(&self, date: NaiveDate) -> CompletenessState {
        self.states
            .read()
            .get(&date)
            .copied()
            .unwrap_or(CompletenessState::Unchecked)
    }

    /// Classify one date's coverage.
    pub async fn check_completeness(
        &self,
        date: NaiveDate,
        expected_override: Option<u64>,
    ) -> ReconcileResult<CoverageReport> {
        self.set_state(date, CompletenessState::Checking);
        let result = self.classify_date(date, expected_override).await;
        match &result {
            Ok(report) => self.set_state(date, report.state),
            Err(_) => self.set_state(date, CompletenessState::Unchecked),
        }
        result
    }

    /// Classify every trading day in `[start, end]` and return the ones
    /// that fall short of the threshold.
    pub async fn list_incomplete_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        expected_override: Option<u64>,
    ) -> ReconcileResult<Vec<CoverageReport>> {
        let expected = self.resolve_expected(expected_override).await?;

        let mut incomplete = Vec::new();
        let mut date = start;
        while date <= end {
            if self.calendar.is_trading_day(date) {
                let present = self.store.count_distinct_instruments(date).await?;
                let report = CoverageReport::classify(date, expected, present, self.threshold);
                if !report.is_complete() {
                    incomplete.push(report);
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        Ok(incomplete)
    }

    /// Repair one date: fetch the missing instruments in batches, insert
    /// what validates, re-check once. Holds the per-date guard for the
    /// whole pass.
    pub async fn backfill(
        &self,
        date: NaiveDate,
        expected_override: Option<u64>,
        batch_size: usize,
    ) -> ReconcileResult<BackfillOutcome> {
        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(date) {
                return Err(ReconcileError::AlreadyRunning(date));
            }
        }

        let result = self
            .backfill_guarded(date, expected_override, batch_size.max(1))
            .await;
        self.in_flight.lock().remove(&date);
        result
    }

    /// Reconcile the most recent completed trading day. `None` when the
    /// calendar has no sessions configured.
    pub async fn run_daily(&self) -> ReconcileResult<Option<BackfillOutcome>> {
        let date = match self.calendar.most_recent_completed_day(Utc::now()) {
            Some(date) => date,
            None => {
                warn!("No completed trading day to reconcile");
                return Ok(None);
            }
        };

        info!("Daily reconciliation for {}", date);
        let outcome = self.backfill(date, None, self.default_batch_size).await?;
        Ok(Some(outcome))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn backfill_guarded(
        &self,
        date: NaiveDate,
        expected_override: Option<u64>,
        batch_size: usize,
    ) -> ReconcileResult<BackfillOutcome> {
        let initial = self.check_completeness(date, expected_override).await?;
        info!(
            "Reconciling {}: {}/{} instruments present ({:.1}%, {})",
            date,
            initial.present,
            initial.expected,
            initial.ratio * 100.0,
            initial.state
        );

        let universe = self.universe.all();
        if universe.is_empty() {
            warn!(
                "Instrument universe is empty; {} gets a coverage check only",
                date
            );
            return Ok(BackfillOutcome::noop(date, initial));
        }

        let existing: HashSet<String> =
            self.store.list_instruments(date).await?.into_iter().collect();
        let missing: Vec<String> = universe
            .into_iter()
            .filter(|id| !existing.contains(id))
            .collect();

        if missing.is_empty() {
            debug!("No missing instruments for {}", date);
            return Ok(BackfillOutcome::noop(date, initial));
        }

        self.set_state(date, CompletenessState::Backfilling);
        info!(
            "Backfilling {} missing instruments for {} from '{}' in batches of {}",
            missing.len(),
            date,
            self.source.name(),
            batch_size
        );

        let (day_start, day_end) = self.day_range_utc(date);
        let mut outcome = BackfillOutcome {
            date,
            missing_instruments: missing.len(),
            batches: 0,
            failed_batches: 0,
            bars_inserted: 0,
            bars_rejected: 0,
            cancelled: false,
            report: initial,
        };

        for batch in missing.chunks(batch_size) {
            if self.shutdown_requested() {
                warn!(
                    "Backfill for {} cancelled after {} batches",
                    date, outcome.batches
                );
                outcome.cancelled = true;
                break;
            }

            outcome.batches += 1;
            if !self.backfill_batch(date, batch, day_start, day_end, &mut outcome).await {
                outcome.failed_batches += 1;
            }
        }

        let report = self.classify_date(date, expected_override).await?;
        self.set_state(date, report.state);

        if report.is_complete() {
            info!(
                "{} complete after backfill: {}/{} instruments, {} bars inserted",
                date, report.present, report.expected, outcome.bars_inserted
            );
        } else {
            warn!(
                "{} still incomplete after backfill: {}/{} instruments ({:.1}%)",
                date,
                report.present,
                report.expected,
                report.ratio * 100.0
            );
        }

        outcome.report = report;
        Ok(outcome)
    }

    /// Fetch and insert one batch across all periods. Returns false if
    /// any fetch or insert failed after retries.
    async fn backfill_batch(
        &self,
        date: NaiveDate,
        batch: &[String],
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
        outcome: &mut BackfillOutcome,
    ) -> bool {
        let mut ok = true;

        for period in BarPeriod::ALL {
            let fetched = self
                .fetch_retry
                .execute(|| self.source.fetch_bars(batch, period, day_start, day_end))
                .await;

            let bars = match fetched {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(
                        "Fetch of {} bars for {} failed ({} instruments): {}",
                        period.as_str(),
                        date,
                        batch.len(),
                        e
                    );
                    ok = false;
                    continue;
                }
            };

            let (valid, rejected) = self.partition_valid(bars, date);
            outcome.bars_rejected += rejected;
            if valid.is_empty() {
                continue;
            }

            match self
                .store_retry
                .execute(|| self.store.insert_bars(period, &valid))
                .await
            {
                Ok(inserted) => outcome.bars_inserted += inserted,
                Err(e) => {
                    warn!(
                        "Insert of {} {} bars for {} failed: {}",
                        valid.len(),
                        period.as_str(),
                        date,
                        e
                    );
                    ok = false;
                }
            }
        }
        ok
    }

    async fn classify_date(
        &self,
        date: NaiveDate,
        expected_override: Option<u64>,
    ) -> ReconcileResult<CoverageReport> {
        let expected = self.resolve_expected(expected_override).await?;
        let present = self.store.count_distinct_instruments(date).await?;
        Ok(CoverageReport::classify(date, expected, present, self.threshold))
    }

    async fn resolve_expected(&self, expected_override: Option<u64>) -> ReconcileResult<u64> {
        match expected_override.or(self.expected_override) {
            Some(expected) => Ok(expected),
            None => Ok(self.store.max_daily_instrument_count().await?),
        }
    }

    /// Vendor bars must validate and belong to the date being repaired.
    fn partition_valid(&self, bars: Vec<Bar>, date: NaiveDate) -> (Vec<Bar>, usize) {
        let total = bars.len();
        let valid: Vec<Bar> = bars
            .into_iter()
            .filter(|bar| {
                self.calendar.validate_bar(bar)
                    && self.calendar.local_date(bar.frame_start) == date
            })
            .collect();

        let rejected = total - valid.len();
        if rejected > 0 {
            debug!("Rejected {} vendor bars while repairing {}", rejected, date);
        }
        (valid, rejected)
    }

    /// UTC bounds of an exchange-local calendar date. The upper bound is
    /// the next local midnight, which is never in session.
    fn day_range_utc(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let tz = self.calendar.timezone();
        let midnight = date.and_time(NaiveTime::MIN);
        let start = tz
            .from_local_datetime(&midnight)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| midnight.and_utc());
        (start, start + chrono::Duration::days(1))
    }

    fn set_state(&self, date: NaiveDate, state: CompletenessState) {
        self.states.write().insert(date, state);
    }

    /// Shutdown check between batches. The receiver lives from
    /// construction so a signal sent any time after that is observed; a
    /// dropped sender also counts as shutdown. Latched once seen.
    fn shutdown_requested(&self) -> bool {
        if self.shutdown_seen.load(Ordering::Relaxed) {
            return true;
        }

        let mut rx = self.shutdown_rx.lock();
        match rx.try_recv() {
            Ok(())
            | Err(broadcast::error::TryRecvError::Lagged(_))
            | Err(broadcast::error::TryRecvError::Closed) => {
                self.shutdown_seen.store(true, Ordering::Relaxed);
                true
            }
            Err(broadcast::error::TryRecvError::Empty) => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockBarSource, ProviderResult};
    use crate::storage::MemoryBarStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
    }

    /// 1m bars in the Friday morning session, one per minute from 09:30.
    fn minute_bars(instrument: &str, day: u32, count: u32) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let frame = Utc
                    .with_ymd_and_hms(2026, 2, day, 1, 30 + i, 0)
                    .unwrap();
                Bar::new(
                    instrument,
                    BarPeriod::M1,
                    frame,
                    Decimal::from(10),
                    Decimal::from(11),
                    Decimal::from(9),
                    Decimal::from(10),
                    Decimal::from(100),
                    Decimal::from(1000),
                )
            })
            .collect()
    }

    fn settings(batch_size: usize) -> ReconciliationSettings {
        ReconciliationSettings {
            batch_size,
            ..ReconciliationSettings::default()
        }
    }

    /// Single-attempt fetch policy so failure tests do not sleep.
    fn no_retry() -> RetryPolicy {
        RetryPolicy::new(
            1,
            std::time::Duration::from_millis(1),
            std::time::Duration::from_millis(1),
        )
    }

    fn reconciler(
        store: Arc<MemoryBarStore>,
        source: Arc<dyn BackfillSource>,
        universe: &[&str],
    ) -> (CompletenessReconciler, broadcast::Sender<()>) {
        let (shutdown_tx, _keep) = broadcast::channel(1);
        let reconciler = CompletenessReconciler::new(
            store,
            source,
            Arc::new(TradingCalendar::default()),
            Arc::new(InstrumentUniverse::with_seed(
                universe.iter().map(|s| s.to_string()),
            )),
            &settings(10),
            no_retry(),
            &shutdown_tx,
        );
        (reconciler, shutdown_tx)
    }

    fn mock_source(instruments: &[&str]) -> Arc<MockBarSource> {
        Arc::new(
            MockBarSource::new(Arc::new(TradingCalendar::default()))
                .with_instruments(instruments.iter().map(|s| s.to_string()).collect()),
        )
    }

    #[tokio::test]
    async fn test_check_uses_override() {
        let store = Arc::new(MemoryBarStore::default());
        store
            .insert_bars(BarPeriod::M1, &minute_bars("600519.SH", 13, 3))
            .await
            .unwrap();

        let (reconciler, _tx) = reconciler(store, mock_source(&[]), &[]);
        let report = reconciler
            .check_completeness(date(13), Some(2))
            .await
            .unwrap();

        assert_eq!(report.expected, 2);
        assert_eq!(report.present, 1);
        assert_eq!(report.state, CompletenessState::Incomplete);
        assert_eq!(reconciler.state_of(date(13)), CompletenessState::Incomplete);
    }

    #[tokio::test]
    async fn test_expected_defaults_to_max_observed() {
        let store = Arc::new(MemoryBarStore::default());
        // Thursday had two instruments, Friday only one.
        store
            .insert_bars(BarPeriod::M1, &minute_bars("600519.SH", 12, 2))
            .await
            .unwrap();
        store
            .insert_bars(BarPeriod::M1, &minute_bars("000001.SZ", 12, 2))
            .await
            .unwrap();
        store
            .insert_bars(BarPeriod::M1, &minute_bars("600519.SH", 13, 2))
            .await
            .unwrap();

        let (reconciler, _tx) = reconciler(store, mock_source(&[]), &[]);
        let report = reconciler.check_completeness(date(13), None).await.unwrap();

        assert_eq!(report.expected, 2);
        assert_eq!(report.present, 1);
        assert_eq!(report.state, CompletenessState::Incomplete);

        // Thursday itself is fine.
        let report = reconciler.check_completeness(date(12), None).await.unwrap();
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_empty_store_is_trivially_complete() {
        let store = Arc::new(MemoryBarStore::default());
        let (reconciler, _tx) = reconciler(store, mock_source(&[]), &[]);

        assert_eq!(reconciler.state_of(date(13)), CompletenessState::Unchecked);
        let report = reconciler.check_completeness(date(13), None).await.unwrap();

        assert_eq!(report.expected, 0);
        assert!(report.is_complete());
        assert_eq!(reconciler.state_of(date(13)), CompletenessState::Complete);
    }

    #[tokio::test]
    async fn test_list_incomplete_flags_only_gaps() {
        let store = Arc::new(MemoryBarStore::default());
        // Trading week 2026-02-09..13; Wednesday the 11th lost one feed.
        for day in [9, 10, 12, 13] {
            store
                .insert_bars(BarPeriod::M1, &minute_bars("600519.SH", day, 2))
                .await
                .unwrap();
            store
                .insert_bars(BarPeriod::M1, &minute_bars("000001.SZ", day, 2))
                .await
                .unwrap();
        }
        store
            .insert_bars(BarPeriod::M1, &minute_bars("600519.SH", 11, 2))
            .await
            .unwrap();

        let (reconciler, _tx) = reconciler(store, mock_source(&[]), &[]);
        let incomplete = reconciler
            .list_incomplete_dates(date(9), date(13), None)
            .await
            .unwrap();

        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].date, date(11));
        assert_eq!(incomplete[0].present, 1);
        assert_eq!(incomplete[0].expected, 2);
    }

    #[tokio::test]
    async fn test_backfill_fills_missing_and_is_idempotent() {
        let store = Arc::new(MemoryBarStore::default());
        store
            .insert_bars(BarPeriod::M1, &minute_bars("600519.SH", 13, 5))
            .await
            .unwrap();

        let source = mock_source(&["600519.SH", "000001.SZ"]);
        let (reconciler, _tx) = reconciler(
            store.clone(),
            source,
            &["600519.SH", "000001.SZ"],
        );

        let outcome = reconciler.backfill(date(13), None, 10).await.unwrap();

        assert_eq!(outcome.missing_instruments, 1);
        assert_eq!(outcome.batches, 1);
        assert_eq!(outcome.failed_batches, 0);
        assert!(outcome.bars_inserted > 0);
        assert!(!outcome.cancelled);
        assert!(outcome.report.is_complete());
        assert_eq!(outcome.report.present, 2);
        assert_eq!(reconciler.state_of(date(13)), CompletenessState::Complete);

        let instruments = store.list_instruments(date(13)).await.unwrap();
        assert_eq!(instruments, vec!["000001.SZ".to_string(), "600519.SH".to_string()]);

        // Nothing missing on the second pass.
        let stored_before = store.len(BarPeriod::M1);
        let outcome = reconciler.backfill(date(13), None, 10).await.unwrap();
        assert_eq!(outcome.missing_instruments, 0);
        assert_eq!(outcome.batches, 0);
        assert_eq!(outcome.bars_inserted, 0);
        assert_eq!(store.len(BarPeriod::M1), stored_before);
    }

    #[tokio::test]
    async fn test_backfill_continues_past_failed_batch() {
        let store = Arc::new(MemoryBarStore::default());
        let source = Arc::new(
            MockBarSource::new(Arc::new(TradingCalendar::default()))
                .with_instruments(vec![
                    "000001.SZ".to_string(),
                    "600519.SH".to_string(),
                ])
                .with_failing_instrument("300750.SZ"),
        );
        let (reconciler, _tx) = reconciler(
            store.clone(),
            source,
            &["000001.SZ", "300750.SZ", "600519.SH"],
        );

        // Batch size one isolates the poisoned instrument.
        let outcome = reconciler.backfill(date(13), None, 1).await.unwrap();

        assert_eq!(outcome.missing_instruments, 3);
        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.failed_batches, 1);
        assert!(outcome.bars_inserted > 0);

        let instruments = store.list_instruments(date(13)).await.unwrap();
        assert_eq!(
            instruments,
            vec!["000001.SZ".to_string(), "600519.SH".to_string()]
        );
    }

    #[tokio::test]
    async fn test_backfill_cancels_between_batches() {
        let store = Arc::new(MemoryBarStore::default());
        let source = mock_source(&["600519.SH"]);
        let (reconciler, tx) = reconciler(store.clone(), source, &["600519.SH"]);

        // Signal before the pass; the first batch check observes it.
        tx.send(()).unwrap();
        let outcome = reconciler.backfill(date(13), None, 10).await.unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.batches, 0);
        assert_eq!(outcome.bars_inserted, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_backfill_guard_rejects_concurrent_run() {
        let store = Arc::new(MemoryBarStore::default());
        let source = Arc::new(
            MockBarSource::new(Arc::new(TradingCalendar::default()))
                .with_instruments(vec!["600519.SH".to_string()])
                .with_fetch_delay(std::time::Duration::from_millis(250)),
        );
        let (reconciler, _tx) = reconciler(store, source, &["600519.SH"]);
        let reconciler = Arc::new(reconciler);

        let first = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.backfill(date(13), None, 10).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let second = reconciler.backfill(date(13), None, 10).await;
        assert!(matches!(
            second,
            Err(ReconcileError::AlreadyRunning(d)) if d == date(13)
        ));

        let outcome = first.await.unwrap().unwrap();
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_empty_universe_degrades_to_check() {
        let store = Arc::new(MemoryBarStore::default());
        let (reconciler, _tx) = reconciler(store, mock_source(&["600519.SH"]), &[]);

        let outcome = reconciler.backfill(date(13), None, 10).await.unwrap();

        assert_eq!(outcome.missing_instruments, 0);
        assert_eq!(outcome.batches, 0);
        assert!(outcome.report.is_complete());
    }

    #[tokio::test]
    async fn test_vendor_bars_for_wrong_date_are_rejected() {
        /// Source that pads every answer with a bar from the prior day.
        struct WrongDateSource;

        #[async_trait]
        impl BackfillSource for WrongDateSource {
            fn name(&self) -> &str {
                "wrong-date"
            }

            async fn fetch_bars(
                &self,
                instrument_ids: &[String],
                period: BarPeriod,
                _start: DateTime<Utc>,
                _end: DateTime<Utc>,
            ) -> ProviderResult<Vec<Bar>> {
                if period != BarPeriod::M1 {
                    return Ok(Vec::new());
                }
                let mut bars = Vec::new();
                for id in instrument_ids {
                    bars.extend(minute_bars(id, 13, 1));
                    bars.extend(minute_bars(id, 12, 1)); // belongs to Thursday
                }
                Ok(bars)
            }

            async fn list_instruments(&self) -> ProviderResult<Vec<String>> {
                Ok(Vec::new())
            }

            async fn fetch_holidays(
                &self,
                _start: NaiveDate,
                _end: NaiveDate,
            ) -> ProviderResult<Vec<NaiveDate>> {
                Ok(Vec::new())
            }

            async fn check_connection(&self) -> ProviderResult<()> {
                Ok(())
            }
        }

        let store = Arc::new(MemoryBarStore::default());
        let (reconciler, _tx) =
            reconciler(store.clone(), Arc::new(WrongDateSource), &["600519.SH"]);

        let outcome = reconciler.backfill(date(13), None, 10).await.unwrap();

        assert_eq!(outcome.bars_inserted, 1);
        assert_eq!(outcome.bars_rejected, 1);
        let thursday = store.list_instruments(date(12)).await.unwrap();
        assert!(thursday.is_empty());
    }

    #[tokio::test]
    async fn test_run_daily_handles_empty_store() {
        let store = Arc::new(MemoryBarStore::default());
        let (reconciler, _tx) = reconciler(store, mock_source(&[]), &[]);

        let outcome = reconciler.run_daily().await.unwrap();
        let outcome = outcome.expect("default calendar always has a completed day");
        assert!(outcome.report.is_complete());
        assert_eq!(outcome.missing_instruments, 0);
    }

    #[test]
    fn test_day_range_covers_local_day() {
        let store: Arc<MemoryBarStore> = Arc::new(MemoryBarStore::default());
        let (reconciler, _tx) = reconciler(store, mock_source(&[]), &[]);

        let (start, end) = reconciler.day_range_utc(date(13));
        // Shanghai midnight is 16:00 UTC the previous evening.
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 12, 16, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 2, 13, 16, 0, 0).unwrap());
    }
}
