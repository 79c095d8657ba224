//! Idempotent maintenance operations.
//!
//! `AdminTriggers` is the single place the scheduler and the service
//! wiring go to for "do it now" actions. Every operation is safe to call
//! twice: reconciliation has a per-date guard, the hot-store flush just
//! empties an already-empty cache, and the refreshes report whether
//! anything actually changed.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use tracing::{info, warn};

use market_common::calendar::TradingCalendar;
use market_common::data::{BarCache, DataResult};

use crate::instruments::InstrumentUniverse;
use crate::provider::{BackfillSource, ProviderResult};
use crate::reconcile::{BackfillOutcome, CompletenessReconciler, ReconcileError, ReconcileResult};

/// Maintenance entry points shared by the scheduler and the CLI.
pub struct AdminTriggers {
    reconciler: Arc<CompletenessReconciler>,
    cache: Arc<dyn BarCache>,
    calendar: Arc<TradingCalendar>,
    universe: Arc<InstrumentUniverse>,
    source: Arc<dyn BackfillSource>,
}

impl AdminTriggers {
    pub fn new(
        reconciler: Arc<CompletenessReconciler>,
        cache: Arc<dyn BarCache>,
        calendar: Arc<TradingCalendar>,
        universe: Arc<InstrumentUniverse>,
        source: Arc<dyn BackfillSource>,
    ) -> Self {
        Self {
            reconciler,
            cache,
            calendar,
            universe,
            source,
        }
    }

    /// Reconcile the most recent completed trading day. A run already in
    /// flight for that date is reported as `None`, not an error.
    pub async fn run_daily_reconciliation(&self) -> ReconcileResult<Option<BackfillOutcome>> {
        match self.reconciler.run_daily().await {
            Ok(outcome) => Ok(outcome),
            Err(ReconcileError::AlreadyRunning(date)) => {
                info!("Reconciliation for {} is already in flight", date);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop every cached bar list from the hot tier.
    pub async fn flush_hot_store(&self) -> DataResult<()> {
        self.cache.clear_all().await?;
        info!("Hot store flushed");
        Ok(())
    }

    /// Pull exchange holidays for `[start, end]` and replace the
    /// calendar's holiday set. Returns whether the set changed.
    ///
    /// An empty result from the source never wipes a configured set;
    /// sources that know nothing (or are disabled) leave the calendar
    /// alone.
    pub async fn refresh_calendar(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<bool> {
        let holidays = self.source.fetch_holidays(start, end).await?;
        if holidays.is_empty() && self.calendar.holiday_count() > 0 {
            warn!(
                "'{}' returned no holidays for {}..={}; calendar unchanged",
                self.source.name(),
                start,
                end
            );
            return Ok(false);
        }
        let count = holidays.len();
        let changed = self.calendar.set_holidays(holidays);
        if changed {
            info!(
                "Calendar refreshed from '{}': {} holidays in {}..={}",
                self.source.name(),
                count,
                start,
                end
            );
        } else {
            info!("Calendar already up to date ({} holidays)", count);
        }
        Ok(changed)
    }

    /// Refresh the calendar over the standing window: start of the
    /// current year through the end of the next.
    pub async fn refresh_calendar_default(&self) -> ProviderResult<bool> {
        let year = Utc::now().year();
        let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_else(|| Utc::now().date_naive());
        let end = NaiveDate::from_ymd_opt(year + 1, 12, 31)
            .unwrap_or_else(|| Utc::now().date_naive());
        self.refresh_calendar(start, end).await
    }

    /// Replace the expected-instrument universe with the source's listing.
    /// An empty listing is treated as a source fault and ignored.
    pub async fn refresh_universe(&self) -> ProviderResult<bool> {
        let instruments = self.source.list_instruments().await?;
        if instruments.is_empty() {
            warn!(
                "'{}' returned no instruments; keeping the current universe of {}",
                self.source.name(),
                self.universe.len()
            );
            return Ok(false);
        }

        let count = instruments.len();
        let changed = self.universe.replace(instruments);
        if changed {
            info!("Instrument universe replaced: {} instruments", count);
        } else {
            info!("Instrument universe unchanged ({} instruments)", count);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconciliationSettings;
    use crate::provider::MockBarSource;
    use crate::storage::MemoryBarStore;
    use market_common::data::{Bar, BarPeriod, MemoryBarCache};
    use market_common::error::RetryPolicy;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use tokio::sync::broadcast;

    fn triggers(
        source: Arc<MockBarSource>,
        universe: &[&str],
    ) -> (AdminTriggers, broadcast::Sender<()>) {
        let calendar = Arc::new(TradingCalendar::default());
        let universe = Arc::new(InstrumentUniverse::with_seed(
            universe.iter().map(|s| s.to_string()),
        ));
        let store: Arc<MemoryBarStore> = Arc::new(MemoryBarStore::default());
        let (shutdown_tx, _keep) = broadcast::channel(1);
        let reconciler = Arc::new(CompletenessReconciler::new(
            store,
            source.clone(),
            calendar.clone(),
            universe.clone(),
            &ReconciliationSettings::default(),
            RetryPolicy::new(
                1,
                std::time::Duration::from_millis(1),
                std::time::Duration::from_millis(1),
            ),
            &shutdown_tx,
        ));
        let admin = AdminTriggers::new(
            reconciler,
            Arc::new(MemoryBarCache::new(3600)),
            calendar,
            universe,
            source,
        );
        (admin, shutdown_tx)
    }

    fn source_with(instruments: &[&str]) -> Arc<MockBarSource> {
        Arc::new(
            MockBarSource::new(Arc::new(TradingCalendar::default()))
                .with_instruments(instruments.iter().map(|s| s.to_string()).collect()),
        )
    }

    #[tokio::test]
    async fn test_flush_hot_store_clears_cache() {
        let (admin, _keep) = triggers(source_with(&[]), &[]);

        let frame = Utc.with_ymd_and_hms(2026, 2, 13, 1, 30, 0).unwrap();
        let bar = Bar::new(
            "600519.SH",
            BarPeriod::M1,
            frame,
            Decimal::from(10),
            Decimal::from(11),
            Decimal::from(9),
            Decimal::from(10),
            Decimal::from(100),
            Decimal::from(1000),
        );
        let date = NaiveDate::from_ymd_opt(2026, 2, 13).unwrap();
        admin.cache.publish_bar(&bar, date).await.unwrap();

        admin.flush_hot_store().await.unwrap();
        let bars = admin
            .cache
            .day_bars(BarPeriod::M1, date, None)
            .await
            .unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_universe_replaces_from_source() {
        let (admin, _keep) = triggers(source_with(&["600519.SH", "000001.SZ"]), &["OLD.XX"]);

        assert!(admin.refresh_universe().await.unwrap());
        assert_eq!(
            admin.universe.all(),
            vec!["000001.SZ".to_string(), "600519.SH".to_string()]
        );

        // Same listing again: nothing changes.
        assert!(!admin.refresh_universe().await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_universe_ignores_empty_listing() {
        let (admin, _keep) = triggers(source_with(&[]), &["600519.SH"]);

        assert!(!admin.refresh_universe().await.unwrap());
        assert_eq!(admin.universe.all(), vec!["600519.SH".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_calendar_applies_holidays() {
        let holiday = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(); // a Monday
        let source = Arc::new(
            MockBarSource::new(Arc::new(TradingCalendar::default()))
                .with_holidays(vec![holiday]),
        );
        let (admin, _keep) = triggers(source, &[]);

        assert!(admin.calendar.is_trading_day(holiday));
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();

        assert!(admin.refresh_calendar(start, end).await.unwrap());
        assert!(!admin.calendar.is_trading_day(holiday));

        // Unchanged set on the second pull.
        assert!(!admin.refresh_calendar(start, end).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_calendar_keeps_holidays_on_empty_fetch() {
        let holiday = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let (admin, _keep) = triggers(source_with(&[]), &[]);
        admin.calendar.set_holidays([holiday]);

        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();

        // The source knows no holidays; the configured set survives.
        assert!(!admin.refresh_calendar(start, end).await.unwrap());
        assert!(!admin.calendar.is_trading_day(holiday));
        assert_eq!(admin.calendar.holiday_count(), 1);
    }

    #[tokio::test]
    async fn test_daily_reconciliation_reports_in_flight_as_none() {
        let source = Arc::new(
            MockBarSource::new(Arc::new(TradingCalendar::default()))
                .with_instruments(vec!["600519.SH".to_string()])
                .with_fetch_delay(std::time::Duration::from_millis(250)),
        );
        let (admin, _keep) = triggers(source, &["600519.SH"]);
        let admin = Arc::new(admin);

        let first = {
            let admin = admin.clone();
            tokio::spawn(async move { admin.run_daily_reconciliation().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // The per-date guard maps to a quiet no-op, not an error.
        let second = admin.run_daily_reconciliation().await.unwrap();
        assert!(second.is_none());

        let outcome = first.await.unwrap().unwrap();
        assert!(outcome.is_some());
    }

    #[tokio::test]
    async fn test_daily_reconciliation_with_empty_universe() {
        let (admin, _keep) = triggers(source_with(&[]), &[]);
        let outcome = admin.run_daily_reconciliation().await.unwrap();
        let outcome = outcome.expect("calendar always has a completed day");
        assert!(outcome.report.is_complete());
        assert_eq!(admin.universe.len(), 0);
    }
}
