//! Deterministic tick generator for the pipeline harness.
//!
//! Generates a seeded random walk per instrument across the trading
//! sessions of one date, so the same configuration always produces the
//! same ticks and every assertion downstream can be exact.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;

use market_common::calendar::TradingCalendar;
use market_common::data::Tick;

/// How many ticks land in each session minute per instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeProfile {
    /// Quick validation runs.
    Lite,
    /// Standard end-to-end runs.
    Normal,
    /// Full-session stress runs.
    Heavy,
}

impl VolumeProfile {
    pub fn ticks_per_minute(&self) -> u32 {
        match self {
            VolumeProfile::Lite => 4,
            VolumeProfile::Normal => 30,
            VolumeProfile::Heavy => 120,
        }
    }
}

/// Generator parameters.
#[derive(Debug, Clone)]
pub struct TickGenConfig {
    /// Number of instruments to generate.
    pub instrument_count: usize,
    /// Trading date the ticks fall on (exchange-local).
    pub date: NaiveDate,
    /// Cap on session minutes covered; `None` runs the whole day.
    pub session_minutes: Option<usize>,
    /// Tick rate per instrument per minute.
    pub profile: VolumeProfile,
    /// Random seed; identical seeds produce identical bundles.
    pub seed: u64,
    /// Starting price for every instrument's walk.
    pub base_price: Decimal,
}

impl TickGenConfig {
    /// A Friday with no configured holidays.
    fn default_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 13).expect("valid date")
    }

    /// Four instruments, ten session minutes, four ticks per minute.
    pub fn lite() -> Self {
        Self {
            instrument_count: 4,
            date: Self::default_date(),
            session_minutes: Some(10),
            profile: VolumeProfile::Lite,
            seed: 42,
            base_price: Decimal::from(100),
        }
    }

    /// Eight instruments across the full trading day.
    pub fn heavy() -> Self {
        Self {
            instrument_count: 8,
            date: Self::default_date(),
            session_minutes: None,
            profile: VolumeProfile::Normal,
            seed: 42,
            base_price: Decimal::from(100),
        }
    }
}

/// Facts about one generated bundle.
#[derive(Debug, Clone)]
pub struct TickBundleMetadata {
    /// Instruments present, sorted.
    pub instruments: Vec<String>,
    /// Trading date covered.
    pub date: NaiveDate,
    /// Session minute frames covered.
    pub frames: usize,
    /// Total tick count.
    pub total_ticks: u64,
    /// Seed the bundle was generated from.
    pub seed: u64,
}

/// Generated ticks plus bookkeeping, sorted by event time.
#[derive(Debug, Clone)]
pub struct TickBundle {
    pub ticks: Vec<Tick>,
    pub metadata: TickBundleMetadata,
    /// Tick counts per instrument.
    pub per_instrument: HashMap<String, u64>,
}

impl TickBundle {
    pub fn total_ticks(&self) -> usize {
        self.ticks.len()
    }

    /// Sum of tick sizes for one instrument, for volume conservation
    /// checks against synthesized bars.
    pub fn total_size(&self, instrument_id: &str) -> Decimal {
        self.ticks
            .iter()
            .filter(|t| t.instrument_id == instrument_id)
            .map(|t| t.size)
            .sum()
    }
}

/// Random-walk state for one instrument.
struct InstrumentState {
    price: Decimal,
}

impl InstrumentState {
    fn new(base_price: Decimal) -> Self {
        Self { price: base_price }
    }

    /// Step the walk by up to five cents either way, never at or below
    /// zero.
    fn step(&mut self, rng: &mut ChaCha8Rng) -> Decimal {
        let step = Decimal::new(rng.gen_range(-5i64..=5), 2);
        let next = self.price + step;
        if next > Decimal::ZERO {
            self.price = next;
        }
        self.price
    }
}

/// Seeded tick generator.
pub struct TickGenerator {
    config: TickGenConfig,
    rng: ChaCha8Rng,
}

impl TickGenerator {
    pub fn new(config: TickGenConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    /// Generate the configured bundle against `calendar`'s sessions.
    pub fn generate(&mut self, calendar: &TradingCalendar) -> TickBundle {
        let mut frames = session_frames(calendar, self.config.date);
        if let Some(limit) = self.config.session_minutes {
            frames.truncate(limit);
        }

        let instruments: Vec<String> =
            (0..self.config.instrument_count).map(instrument_id).collect();
        let mut states: Vec<InstrumentState> = instruments
            .iter()
            .map(|_| InstrumentState::new(self.config.base_price))
            .collect();

        let ticks_per_minute = self.config.profile.ticks_per_minute();
        let mut ticks =
            Vec::with_capacity(frames.len() * instruments.len() * ticks_per_minute as usize);
        let mut per_instrument: HashMap<String, u64> = HashMap::new();

        for frame in &frames {
            for (idx, instrument) in instruments.iter().enumerate() {
                // Offsets are drawn unsorted; the final sort restores
                // per-instrument time order.
                for _ in 0..ticks_per_minute {
                    let offset_ms = self.rng.gen_range(0..60_000i64);
                    let event_time = *frame + Duration::milliseconds(offset_ms);
                    let price = states[idx].step(&mut self.rng);
                    let size = Decimal::from(self.rng.gen_range(1u32..=50) * 100);

                    ticks.push(Tick::new(
                        instrument.clone(),
                        event_time,
                        price,
                        size,
                        price * size,
                    ));
                    *per_instrument.entry(instrument.clone()).or_default() += 1;
                }
            }
        }

        ticks.sort_by(|a, b| {
            a.event_time
                .cmp(&b.event_time)
                .then_with(|| a.instrument_id.cmp(&b.instrument_id))
        });

        let metadata = TickBundleMetadata {
            instruments,
            date: self.config.date,
            frames: frames.len(),
            total_ticks: ticks.len() as u64,
            seed: self.config.seed,
        };

        TickBundle {
            ticks,
            metadata,
            per_instrument,
        }
    }
}

/// Instrument code for generator slot `index`, alternating venues.
pub fn instrument_id(index: usize) -> String {
    let venue = if index % 2 == 0 { "SH" } else { "SZ" };
    format!("SIM{:04}.{}", index, venue)
}

/// Every in-session minute frame of `date`, in UTC, ascending.
pub fn session_frames(calendar: &TradingCalendar, date: NaiveDate) -> Vec<DateTime<Utc>> {
    let tz = calendar.timezone();
    let midnight = date.and_time(NaiveTime::MIN);
    let start = tz
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc());
    let end = start + Duration::days(1);

    let mut frames = Vec::new();
    let mut frame = start;
    while frame < end {
        if calendar.is_trading_instant(frame) {
            frames.push(frame);
        }
        frame += Duration::minutes(1);
    }
    frames
}

// ============================================================================
// Tests
// ============================================================================
