//! Merged hot/cold read path.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use market_common::calendar::TradingCalendar;
use market_common::data::{merge_bars, Bar, BarCache, BarPeriod};

use super::{BarStore, RepositoryResult};

/// Reads bars across both tiers and presents one ordered, deduplicated
/// series. Callers never see the tier boundary.
///
/// The hot tier only ever holds the current trading date, so it is
/// consulted when the requested range reaches that date; everything
/// strictly before it comes from the cold store. When both tiers carry a
/// frame the hot copy wins.
pub struct TieredBarReader<C: BarCache, S: BarStore> {
    cache: Arc<C>,
    store: Arc<S>,
    calendar: Arc<TradingCalendar>,
}

impl<C: BarCache, S: BarStore> TieredBarReader<C, S> {
    pub fn new(cache: Arc<C>, store: Arc<S>, calendar: Arc<TradingCalendar>) -> Self {
        Self {
            cache,
            store,
            calendar,
        }
    }

    /// Query `[start, end]` for one instrument and period.
    pub async fn query(
        &self,
        instrument_id: &str,
        period: BarPeriod,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Bar>> {
        self.query_as_of(instrument_id, period, start, end, Utc::now())
            .await
    }

    /// Query with an explicit wall-clock instant deciding what "the
    /// current trading date" is. Exposed for deterministic tests.
    pub async fn query_as_of(
        &self,
        instrument_id: &str,
        period: BarPeriod,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Bar>> {
        if start > end {
            return Ok(Vec::new());
        }

        let today = self.calendar.local_date(now);

        let hot = if self.calendar.local_date(end) >= today {
            let mut bars = self
                .cache
                .day_bars(period, today, Some(instrument_id))
                .await?;
            bars.retain(|bar| bar.frame_start >= start && bar.frame_start <= end);
            bars
        } else {
            Vec::new()
        };

        let cold = if self.calendar.local_date(start) < today {
            let mut bars = self
                .store
                .query_range(instrument_id, period, start, end)
                .await?;
            // The cold tier may briefly hold today's bars too (historical
            // replays); the hot tier owns the current date on read.
            bars.retain(|bar| self.calendar.local_date(bar.frame_start) < today);
            bars
        } else {
            Vec::new()
        };

        Ok(merge_bars(hot, cold))
    }
}
