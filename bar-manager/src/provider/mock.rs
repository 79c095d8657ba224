//! Mock and disabled backfill sources.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use market_common::calendar::TradingCalendar;
use market_common::data::{Bar, BarPeriod};

use super::{BackfillSource, ProviderError, ProviderResult};

/// Deterministic backfill source for tests and development.
///
/// Generates one finalized bar per in-session frame for the instruments
/// it knows; requests for unknown instruments yield nothing, mirroring a
/// vendor with partial coverage.
pub struct MockBarSource {
    calendar: Arc<TradingCalendar>,
    instruments: Vec<String>,
    holidays: Vec<NaiveDate>,
    base_price: Decimal,
    failing: HashSet<String>,
    fetch_delay: Duration,
}

impl MockBarSource {
    pub fn new(calendar: Arc<TradingCalendar>) -> Self {
        Self {
            calendar,
            instruments: Vec::new(),
            holidays: Vec::new(),
            base_price: Decimal::from(100),
            failing: HashSet::new(),
            fetch_delay: Duration::ZERO,
        }
    }

    /// Instruments this source can serve.
    pub fn with_instruments(mut self, instruments: Vec<String>) -> Self {
        self.instruments = instruments;
        self
    }

    /// Holidays reported by `fetch_holidays`.
    pub fn with_holidays(mut self, holidays: Vec<NaiveDate>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn with_base_price(mut self, base_price: Decimal) -> Self {
        self.base_price = base_price;
        self
    }

    /// Any fetch whose batch contains this instrument fails with a
    /// connection error.
    pub fn with_failing_instrument(mut self, instrument_id: impl Into<String>) -> Self {
        self.failing.insert(instrument_id.into());
        self
    }

    /// Artificial latency per fetch, for cancellation tests.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    fn bar_at(&self, instrument_id: &str, period: BarPeriod, frame_start: DateTime<Utc>) -> Bar {
        let seed = (instrument_hash(instrument_id) ^ (frame_start.timestamp() as u64 / 60)) % 5;

        let open = self.base_price + Decimal::from(seed);
        let high = open + Decimal::ONE;
        let low = open - Decimal::ONE;
        let close = if seed % 2 == 0 { high } else { low };
        let volume = Decimal::from(100 + seed * 10);

        Bar::new(
            instrument_id,
            period,
            frame_start,
            open,
            high,
            low,
            close,
            volume,
            close * volume,
        )
    }
}

#[async_trait]
impl BackfillSource for MockBarSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_bars(
        &self,
        instrument_ids: &[String],
        period: BarPeriod,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ProviderResult<Vec<Bar>> {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }

        if let Some(poisoned) = instrument_ids.iter().find(|id| self.failing.contains(*id)) {
            return Err(ProviderError::Connection(format!(
                "simulated failure for {}",
                poisoned
            )));
        }

        let mut bars = Vec::new();
        for id in instrument_ids {
            if !self.instruments.iter().any(|known| known == id) {
                continue;
            }

            let mut frame = period.frame_start(start);
            while frame <= end {
                if frame >= start && self.calendar.is_trading_instant(frame) {
                    bars.push(self.bar_at(id, period, frame));
                }
                frame += period.as_duration();
            }
        }

        debug!(
            "Mock source produced {} {} bars for {} instruments",
            bars.len(),
            period.as_str(),
            instrument_ids.len()
        );
        Ok(bars)
    }

    async fn list_instruments(&self) -> ProviderResult<Vec<String>> {
        Ok(self.instruments.clone())
    }

    async fn fetch_holidays(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<Vec<NaiveDate>> {
        Ok(self
            .holidays
            .iter()
            .copied()
            .filter(|d| *d >= start && *d <= end)
            .collect())
    }

    async fn check_connection(&self) -> ProviderResult<()> {
        Ok(())
    }
}

fn instrument_hash(id: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

/// Source wired in when backfill is switched off. Every request succeeds
/// with an empty result so reconciliation degrades to detection only.
pub struct DisabledBackfillSource;

#[async_trait]
impl BackfillSource for DisabledBackfillSource {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn fetch_bars(
        &self,
        instrument_ids: &[String],
        period: BarPeriod,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> ProviderResult<Vec<Bar>> {
        debug!(
            "Backfill disabled; no {} bars for {} instruments",
            period.as_str(),
            instrument_ids.len()
        );
        Ok(Vec::new())
    }

    async fn list_instruments(&self) -> ProviderResult<Vec<String>> {
        debug!("Backfill disabled; no instrument listing");
        Ok(Vec::new())
    }

    async fn fetch_holidays(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> ProviderResult<Vec<NaiveDate>> {
        debug!("Backfill disabled; no holiday listing");
        Ok(Vec::new())
    }

    async fn check_connection(&self) -> ProviderResult<()> {
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
