use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =================================================================
// Core data types: tick stream input and synthesized OHLCV bars
// =================================================================

/// A single trade print for one instrument.
///
/// Ticks arrive in approximately but not guaranteed time order per
/// instrument. They are immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument code, e.g. "600519.SH"
    pub instrument_id: String,

    /// Exchange event timestamp
    pub event_time: DateTime<Utc>,

    /// Trade price
    pub price: Decimal,

    /// Traded quantity
    pub size: Decimal,

    /// Traded turnover (price * size in quote currency)
    pub notional: Decimal,
}

impl Tick {
    pub fn new(
        instrument_id: impl Into<String>,
        event_time: DateTime<Utc>,
        price: Decimal,
        size: Decimal,
        notional: Decimal,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            event_time,
            price,
            size,
            notional,
        }
    }
}

/// Supported bar granularities.
///
/// The cold tier keeps one table per period and the hot tier one list
/// per (period, trading date), so the set is closed by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarPeriod {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
}

impl BarPeriod {
    /// All periods, finest first. Aggregation cascades in this order.
    pub const ALL: [BarPeriod; 4] = [BarPeriod::M1, BarPeriod::M5, BarPeriod::M15, BarPeriod::M30];

    /// Coarser-than-one-minute periods, built from closed 1-minute bars.
    pub const AGGREGATED: [BarPeriod; 3] = [BarPeriod::M5, BarPeriod::M15, BarPeriod::M30];

    pub fn minutes(&self) -> u32 {
        match self {
            BarPeriod::M1 => 1,
            BarPeriod::M5 => 5,
            BarPeriod::M15 => 15,
            BarPeriod::M30 => 30,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        match minutes {
            1 => Some(BarPeriod::M1),
            5 => Some(BarPeriod::M5),
            15 => Some(BarPeriod::M15),
            30 => Some(BarPeriod::M30),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BarPeriod::M1 => "1m",
            BarPeriod::M5 => "5m",
            BarPeriod::M15 => "15m",
            BarPeriod::M30 => "30m",
        }
    }

    pub fn as_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes() as i64)
    }

    /// Floor a timestamp to the start of the frame containing it.
    ///
    /// Minute-of-hour arithmetic: all supported periods divide 60, so
    /// frames never straddle an hour boundary.
    pub fn frame_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let aligned_minute = (ts.minute() / self.minutes()) * self.minutes();
        ts.with_minute(aligned_minute)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(ts)
    }
}

impl std::fmt::Display for BarPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A closed OHLCV bar.
///
/// Uniquely identified by (instrument_id, period, frame_start). The hot
/// tier stores the serialized record verbatim; the cold tier maps each
/// field to a column with the period implied by the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub instrument_id: String,
    pub period: BarPeriod,
    /// Start of the frame, aligned to the period boundary
    pub frame_start: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub notional: Decimal,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instrument_id: impl Into<String>,
        period: BarPeriod,
        frame_start: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        notional: Decimal,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            period,
            frame_start,
            open,
            high,
            low,
            close,
            volume,
            notional,
        }
    }

    /// De-duplication key used by the tier merge.
    pub fn merge_key(&self) -> (String, DateTime<Utc>) {
        (self.instrument_id.clone(), self.frame_start)
    }

    /// OHLC shape invariant: low <= open, close <= high and volume >= 0.
    pub fn ohlc_consistent(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
            && self.low <= self.high
            && self.volume >= Decimal::ZERO
    }

    /// Build a bar from the ticks of a single frame.
    ///
    /// Ticks must already be in arrival order; returns None for an empty
    /// slice (frames without trades produce no bar).
    pub fn from_ticks(ticks: &[Tick], period: BarPeriod, frame_start: DateTime<Utc>) -> Option<Self> {
        let first = ticks.first()?;
        let last = ticks.last()?;

        let mut high = first.price;
        let mut low = first.price;
        let mut volume = Decimal::ZERO;
        let mut notional = Decimal::ZERO;

        for tick in ticks {
            if tick.price > high {
                high = tick.price;
            }
            if tick.price < low {
                low = tick.price;
            }
            volume += tick.size;
            notional += tick.notional;
        }

        Some(Bar::new(
            first.instrument_id.clone(),
            period,
            frame_start,
            first.price,
            high,
            low,
            last.price,
            volume,
            notional,
        ))
    }

    /// Aggregate consecutive finer bars into one coarser bar.
    ///
    /// open = first sub-bar's open, close = last sub-bar's close,
    /// high/low = extremes, volume/notional = sums. Returns None for an
    /// empty slice.
    pub fn aggregate(sub_bars: &[Bar], period: BarPeriod, frame_start: DateTime<Utc>) -> Option<Self> {
        let first = sub_bars.first()?;
        let last = sub_bars.last()?;

        let mut high = first.high;
        let mut low = first.low;
        let mut volume = Decimal::ZERO;
        let mut notional = Decimal::ZERO;

        for bar in sub_bars {
            if bar.high > high {
                high = bar.high;
            }
            if bar.low < low {
                low = bar.low;
            }
            volume += bar.volume;
            notional += bar.notional;
        }

        Some(Bar::new(
            first.instrument_id.clone(),
            period,
            frame_start,
            first.open,
            high,
            low,
            last.close,
            volume,
            notional,
        ))
    }
}

// =================================================================
// Error type definition
// =================================================================

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decimal conversion error: {0}")]
    DecimalConversion(#[from] rust_decimal::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported bar period: {0} minutes")]
    InvalidPeriod(u32),
}

pub type DataResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn create_test_tick(price: &str, size: &str, offset_secs: i64) -> Tick {
        let base = Utc.with_ymd_and_hms(2026, 2, 13, 1, 30, 0).unwrap();
        let price = Decimal::from_str(price).unwrap();
        let size = Decimal::from_str(size).unwrap();
        Tick::new(
            "600519.SH",
            base + chrono::Duration::seconds(offset_secs),
            price,
            size,
            price * size,
        )
    }

    #[test]
    fn test_period_minutes_round_trip() {
        for period in BarPeriod::ALL {
            assert_eq!(BarPeriod::from_minutes(period.minutes()), Some(period));
        }
        assert_eq!(BarPeriod::from_minutes(7), None);
        assert_eq!(BarPeriod::from_minutes(60), None);
    }

    #[test]
    fn test_frame_start_alignment() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 13, 1, 37, 42).unwrap();

        assert_eq!(
            BarPeriod::M1.frame_start(ts),
            Utc.with_ymd_and_hms(2026, 2, 13, 1, 37, 0).unwrap()
        );
        assert_eq!(
            BarPeriod::M5.frame_start(ts),
            Utc.with_ymd_and_hms(2026, 2, 13, 1, 35, 0).unwrap()
        );
        assert_eq!(
            BarPeriod::M15.frame_start(ts),
            Utc.with_ymd_and_hms(2026, 2, 13, 1, 30, 0).unwrap()
        );
        assert_eq!(
            BarPeriod::M30.frame_start(ts),
            Utc.with_ymd_and_hms(2026, 2, 13, 1, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_frame_start_is_idempotent() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 13, 1, 35, 0).unwrap();
        let aligned = BarPeriod::M5.frame_start(ts);
        assert_eq!(aligned, ts);
        assert_eq!(BarPeriod::M5.frame_start(aligned), aligned);
    }

    #[test]
    fn test_bar_from_ticks_ohlcv() {
        let ticks = vec![
            create_test_tick("100.0", "10", 0),
            create_test_tick("103.5", "5", 10),
            create_test_tick("99.2", "20", 30),
            create_test_tick("101.0", "7", 59),
        ];
        let frame = BarPeriod::M1.frame_start(ticks[0].event_time);
        let bar = Bar::from_ticks(&ticks, BarPeriod::M1, frame).unwrap();

        assert_eq!(bar.open, Decimal::from_str("100.0").unwrap());
        assert_eq!(bar.high, Decimal::from_str("103.5").unwrap());
        assert_eq!(bar.low, Decimal::from_str("99.2").unwrap());
        assert_eq!(bar.close, Decimal::from_str("101.0").unwrap());
        assert_eq!(bar.volume, Decimal::from(42));
        assert!(bar.ohlc_consistent());
    }

    #[test]
    fn test_bar_from_ticks_empty() {
        let frame = Utc.with_ymd_and_hms(2026, 2, 13, 1, 30, 0).unwrap();
        assert!(Bar::from_ticks(&[], BarPeriod::M1, frame).is_none());
    }

    #[test]
    fn test_aggregate_matches_sub_bars() {
        let frame = Utc.with_ymd_and_hms(2026, 2, 13, 1, 30, 0).unwrap();
        let sub_bars: Vec<Bar> = (0..5)
            .map(|i| {
                Bar::new(
                    "600519.SH",
                    BarPeriod::M1,
                    frame + chrono::Duration::minutes(i),
                    Decimal::from(100 + i),
                    Decimal::from(105 + i),
                    Decimal::from(95 + i),
                    Decimal::from(102 + i),
                    Decimal::from(10),
                    Decimal::from(1000),
                )
            })
            .collect();

        let agg = Bar::aggregate(&sub_bars, BarPeriod::M5, frame).unwrap();
        assert_eq!(agg.open, sub_bars[0].open);
        assert_eq!(agg.close, sub_bars[4].close);
        assert_eq!(agg.high, Decimal::from(109));
        assert_eq!(agg.low, Decimal::from(95));
        assert_eq!(agg.volume, Decimal::from(50));
        assert_eq!(agg.notional, Decimal::from(5000));
        assert!(agg.ohlc_consistent());
    }

    #[test]
    fn test_ohlc_consistency_violations() {
        let frame = Utc.with_ymd_and_hms(2026, 2, 13, 1, 30, 0).unwrap();
        let mut bar = Bar::new(
            "600519.SH",
            BarPeriod::M1,
            frame,
            Decimal::from(100),
            Decimal::from(105),
            Decimal::from(95),
            Decimal::from(101),
            Decimal::from(10),
            Decimal::from(1000),
        );
        assert!(bar.ohlc_consistent());

        bar.low = Decimal::from(102);
        assert!(!bar.ohlc_consistent());

        bar.low = Decimal::from(95);
        bar.volume = Decimal::from(-1);
        assert!(!bar.ohlc_consistent());
    }

    #[test]
    fn test_period_serde_uses_short_names() {
        let json = serde_json::to_string(&BarPeriod::M15).unwrap();
        assert_eq!(json, "\"15m\"");
        let back: BarPeriod = serde_json::from_str("\"5m\"").unwrap();
        assert_eq!(back, BarPeriod::M5);
    }
}
