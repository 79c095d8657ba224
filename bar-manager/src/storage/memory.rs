//! In-memory cold store for tests and development.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;

use market_common::data::{Bar, BarPeriod};

use super::{BarStore, RepositoryResult};

/// [`BarStore`] backed by per-period maps keyed on
/// `(instrument_id, frame_start)`, mirroring the unique index of the
/// database tier.
pub struct MemoryBarStore {
    bars: RwLock<HashMap<BarPeriod, BTreeMap<(String, DateTime<Utc>), Bar>>>,
    timezone: Tz,
}

impl MemoryBarStore {
    pub fn new(timezone: Tz) -> Self {
        Self {
            bars: RwLock::new(HashMap::new()),
            timezone,
        }
    }

    /// Total bars held for one period.
    pub fn len(&self, period: BarPeriod) -> usize {
        self.bars.read().get(&period).map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.bars.read().values().all(|m| m.is_empty())
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }
}

impl Default for MemoryBarStore {
    fn default() -> Self {
        Self::new(chrono_tz::Asia::Shanghai)
    }
}

#[async_trait]
impl BarStore for MemoryBarStore {
    async fn insert_bars(&self, period: BarPeriod, bars: &[Bar]) -> RepositoryResult<usize> {
        let mut guard = self.bars.write();
        let map = guard.entry(period).or_default();

        let mut inserted = 0;
        for bar in bars {
            let key = bar.merge_key();
            if let std::collections::btree_map::Entry::Vacant(entry) = map.entry(key) {
                entry.insert(bar.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn query_range(
        &self,
        instrument_id: &str,
        period: BarPeriod,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Bar>> {
        let guard = self.bars.read();
        let bars = guard
            .get(&period)
            .map(|map| {
                // Map iteration is ordered by (instrument, frame_start), so
                // the filtered single-instrument slice is already ascending.
                map.values()
                    .filter(|bar| {
                        bar.instrument_id == instrument_id
                            && bar.frame_start >= start
                            && bar.frame_start <= end
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(bars)
    }

    async fn count_distinct_instruments(&self, date: NaiveDate) -> RepositoryResult<u64> {
        Ok(self.list_instruments(date).await?.len() as u64)
    }

    async fn list_instruments(&self, date: NaiveDate) -> RepositoryResult<Vec<String>> {
        let guard = self.bars.read();
        let mut instruments = BTreeSet::new();
        if let Some(map) = guard.get(&BarPeriod::M1) {
            for bar in map.values() {
                if self.local_date(bar.frame_start) == date {
                    instruments.insert(bar.instrument_id.clone());
                }
            }
        }
        Ok(instruments.into_iter().collect())
    }

    async fn max_daily_instrument_count(&self) -> RepositoryResult<u64> {
        let guard = self.bars.read();
        let mut per_date: HashMap<NaiveDate, BTreeSet<&str>> = HashMap::new();
        if let Some(map) = guard.get(&BarPeriod::M1) {
            for bar in map.values() {
                per_date
                    .entry(self.local_date(bar.frame_start))
                    .or_default()
                    .insert(bar.instrument_id.as_str());
            }
        }
        Ok(per_date.values().map(|set| set.len() as u64).max().unwrap_or(0))
    }

    async fn distinct_trading_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepositoryResult<Vec<NaiveDate>> {
        let guard = self.bars.read();
        let mut dates = BTreeSet::new();
        if let Some(map) = guard.get(&BarPeriod::M1) {
            for bar in map.values() {
                let date = self.local_date(bar.frame_start);
                if date >= start && date <= end {
                    dates.insert(date);
                }
            }
        }
        Ok(dates.into_iter().collect())
    }
}
