//! Frame-aligned OHLCV synthesis from trade ticks.
//!
//! One synthesizer instance owns the open-bar state for the instruments
//! routed to it. Ticks accumulate into 1-minute bars; a 1-minute bar
//! closes when a tick for a later frame arrives (or on flush), and each
//! closed minute cascades into the 5/15/30-minute windows, which close the
//! same way. Frames without trades produce no bars.
//!
//! Ticks are admission-checked against the trading calendar before they
//! touch any state, so an off-session or malformed tick can never open a
//! frame.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use market_common::calendar::TradingCalendar;
use market_common::data::{Bar, BarPeriod, Tick};

/// Accumulating sub-bars for one aggregated period window.
struct PeriodWindow {
    window_start: DateTime<Utc>,
    sub_bars: Vec<Bar>,
}

/// Counters describing one synthesizer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthesizerStats {
    /// Ticks offered via `add_tick`.
    pub ticks_in: u64,
    /// Ticks rejected by calendar admission.
    pub ticks_rejected: u64,
    /// Ticks for frames that had already closed.
    pub ticks_late: u64,
    /// Closed bars emitted, all periods.
    pub bars_emitted: u64,
    /// Closed bars discarded by validation.
    pub bars_rejected: u64,
}

impl SynthesizerStats {
    /// Fold another synthesizer's counters into this one.
    pub fn accumulate(&mut self, other: &SynthesizerStats) {
        self.ticks_in += other.ticks_in;
        self.ticks_rejected += other.ticks_rejected;
        self.ticks_late += other.ticks_late;
        self.bars_emitted += other.bars_emitted;
        self.bars_rejected += other.bars_rejected;
    }
}

/// Synthesizes 1/5/15/30-minute bars from a validated tick stream.
pub struct BarSynthesizer {
    calendar: Arc<TradingCalendar>,
    /// Open 1-minute accumulator per instrument.
    open_minutes: HashMap<String, Bar>,
    /// Open aggregation window per (instrument, aggregated period).
    windows: HashMap<(String, BarPeriod), PeriodWindow>,
    /// Ring of recently closed bars per (instrument, period).
    recent: HashMap<(String, BarPeriod), VecDeque<Bar>>,
    recent_capacity: usize,
    stats: SynthesizerStats,
}

impl BarSynthesizer {
    pub fn new(calendar: Arc<TradingCalendar>, recent_capacity: usize) -> Self {
        Self {
            calendar,
            open_minutes: HashMap::new(),
            windows: HashMap::new(),
            recent: HashMap::new(),
            recent_capacity: recent_capacity.max(1),
            stats: SynthesizerStats::default(),
        }
    }

    /// Offer one tick. Returns every bar that closed as a result, coarser
    /// periods first when a minute close also closes its window.
    pub fn add_tick(&mut self, tick: &Tick) -> Vec<Bar> {
        self.stats.ticks_in += 1;

        if let Err(e) = self.calendar.validate_tick(tick) {
            self.stats.ticks_rejected += 1;
            trace!("Rejected tick for {}: {}", tick.instrument_id, e);
            return Vec::new();
        }

        let frame = BarPeriod::M1.frame_start(tick.event_time);
        let mut emitted = Vec::new();

        let closed_minute = match self.open_minutes.get_mut(&tick.instrument_id) {
            Some(open) if frame == open.frame_start => {
                apply_tick(open, tick);
                None
            }
            Some(open) if frame < open.frame_start => {
                // Frames only move forward; this one already closed.
                self.stats.ticks_late += 1;
                debug!(
                    "Dropped late tick for {} at {} (open frame {})",
                    tick.instrument_id, tick.event_time, open.frame_start
                );
                None
            }
            Some(open) => Some(std::mem::replace(open, minute_bar(tick, frame))),
            None => {
                self.open_minutes
                    .insert(tick.instrument_id.clone(), minute_bar(tick, frame));
                None
            }
        };

        if let Some(minute) = closed_minute {
            self.close_minute(minute, &mut emitted);
        }
        emitted
    }

    /// Close and emit every open accumulator. Partial aggregation windows
    /// are emitted as-is; used at session end and on shutdown.
    pub fn flush(&mut self) -> Vec<Bar> {
        let mut out = Vec::new();

        // Open minutes first so each lands in its aggregation window
        // before the windows themselves close.
        let mut minutes: Vec<Bar> = self.open_minutes.drain().map(|(_, bar)| bar).collect();
        minutes.sort_by_key(|bar| bar.frame_start);
        for minute in minutes {
            self.close_minute(minute, &mut out);
        }

        let mut windows: Vec<((String, BarPeriod), PeriodWindow)> =
            self.windows.drain().collect();
        windows.sort_by_key(|entry| (entry.1.window_start, entry.0 .1.minutes()));
        for ((_, period), window) in windows {
            if let Some(aggregate) = Bar::aggregate(&window.sub_bars, period, window.window_start)
            {
                self.emit(aggregate, &mut out);
            }
        }
        out
    }

    /// Most recent closed bars for one instrument and period, oldest
    /// first, at most `count`.
    pub fn recent_bars(&self, instrument_id: &str, period: BarPeriod, count: usize) -> Vec<Bar> {
        self.recent
            .get(&(instrument_id.to_string(), period))
            .map(|ring| {
                ring.iter()
                    .skip(ring.len().saturating_sub(count))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> SynthesizerStats {
        self.stats
    }

    fn close_minute(&mut self, minute: Bar, out: &mut Vec<Bar>) {
        if !self.calendar.validate_bar(&minute) {
            self.stats.bars_rejected += 1;
            warn!(
                "Discarded invalid 1m bar for {} at {}",
                minute.instrument_id, minute.frame_start
            );
            return;
        }

        for period in BarPeriod::AGGREGATED {
            self.roll_window(period, &minute, out);
        }
        self.emit(minute, out);
    }

    fn roll_window(&mut self, period: BarPeriod, minute: &Bar, out: &mut Vec<Bar>) {
        let window = period.frame_start(minute.frame_start);
        let key = (minute.instrument_id.clone(), period);

        let closed = match self.windows.get_mut(&key) {
            Some(acc) if window == acc.window_start => {
                acc.sub_bars.push(minute.clone());
                None
            }
            Some(acc) if window > acc.window_start => {
                let sub_bars = std::mem::replace(&mut acc.sub_bars, vec![minute.clone()]);
                let closed_window = std::mem::replace(&mut acc.window_start, window);
                Bar::aggregate(&sub_bars, period, closed_window)
            }
            Some(acc) => {
                debug!(
                    "Out-of-order minute for {} {} window at {} discarded",
                    minute.instrument_id,
                    period.as_str(),
                    acc.window_start
                );
                None
            }
            None => {
                self.windows.insert(
                    key,
                    PeriodWindow {
                        window_start: window,
                        sub_bars: vec![minute.clone()],
                    },
                );
                None
            }
        };

        if let Some(aggregate) = closed {
            self.emit(aggregate, out);
        }
    }

    fn emit(&mut self, bar: Bar, out: &mut Vec<Bar>) {
        if !self.calendar.validate_bar(&bar) {
            self.stats.bars_rejected += 1;
            warn!(
                "Discarded invalid {} bar for {} at {}",
                bar.period.as_str(),
                bar.instrument_id,
                bar.frame_start
            );
            return;
        }

        let ring = self
            .recent
            .entry((bar.instrument_id.clone(), bar.period))
            .or_default();
        ring.push_back(bar.clone());
        while ring.len() > self.recent_capacity {
            ring.pop_front();
        }

        self.stats.bars_emitted += 1;
        out.push(bar);
    }
}

fn minute_bar(tick: &Tick, frame_start: DateTime<Utc>) -> Bar {
    Bar::new(
        tick.instrument_id.clone(),
        BarPeriod::M1,
        frame_start,
        tick.price,
        tick.price,
        tick.price,
        tick.price,
        tick.size,
        tick.notional,
    )
}

fn apply_tick(bar: &mut Bar, tick: &Tick) {
    if tick.price > bar.high {
        bar.high = tick.price;
    }
    if tick.price < bar.low {
        bar.low = tick.price;
    }
    bar.close = tick.price;
    bar.volume += tick.size;
    bar.notional += tick.notional;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn synthesizer() -> BarSynthesizer {
        BarSynthesizer::new(Arc::new(TradingCalendar::default()), 16)
    }

    /// Tick on Friday 2026-02-13; 01:30 UTC is 09:30 in Shanghai.
    fn tick_at(hour: u32, minute: u32, second: u32, price: i64, size: i64) -> Tick {
        tick_for("600519.SH", hour, minute, second, price, size)
    }

    fn tick_for(
        instrument: &str,
        hour: u32,
        minute: u32,
        second: u32,
        price: i64,
        size: i64,
    ) -> Tick {
        let time = Utc
            .with_ymd_and_hms(2026, 2, 13, hour, minute, second)
            .unwrap();
        let price = Decimal::from(price);
        let size = Decimal::from(size);
        Tick::new(instrument, time, price, size, price * size)
    }

    fn frame(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 13, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_single_minute_ohlcv() {
        let mut synth = synthesizer();

        assert!(synth.add_tick(&tick_at(1, 30, 0, 10, 1)).is_empty());
        assert!(synth.add_tick(&tick_at(1, 30, 20, 12, 2)).is_empty());
        assert!(synth.add_tick(&tick_at(1, 30, 40, 9, 1)).is_empty());

        // A tick in the next frame closes the minute.
        let closed = synth.add_tick(&tick_at(1, 31, 0, 11, 1));
        assert_eq!(closed.len(), 1);

        let bar = &closed[0];
        assert_eq!(bar.period, BarPeriod::M1);
        assert_eq!(bar.frame_start, frame(1, 30));
        assert_eq!(bar.open, Decimal::from(10));
        assert_eq!(bar.high, Decimal::from(12));
        assert_eq!(bar.low, Decimal::from(9));
        assert_eq!(bar.close, Decimal::from(9));
        assert_eq!(bar.volume, Decimal::from(4));
        assert_eq!(bar.notional, Decimal::from(10 + 24 + 9));
        assert!(bar.ohlc_consistent());
    }

    #[test]
    fn test_empty_frames_produce_no_bars() {
        let mut synth = synthesizer();

        synth.add_tick(&tick_at(1, 30, 0, 10, 1));
        // Minutes 31 and 32 have no trades.
        let closed = synth.add_tick(&tick_at(1, 33, 0, 11, 1));

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].frame_start, frame(1, 30));
    }

    #[test]
    fn test_off_session_tick_rejected() {
        let mut synth = synthesizer();

        // 04:00 UTC is 12:00 in Shanghai, inside the lunch break.
        let closed = synth.add_tick(&tick_at(4, 0, 0, 10, 1));
        assert!(closed.is_empty());
        assert!(synth.flush().is_empty());

        let stats = synth.stats();
        assert_eq!(stats.ticks_in, 1);
        assert_eq!(stats.ticks_rejected, 1);
        assert_eq!(stats.bars_emitted, 0);
    }

    #[test]
    fn test_late_tick_dropped() {
        let mut synth = synthesizer();

        synth.add_tick(&tick_at(1, 30, 0, 10, 1));
        synth.add_tick(&tick_at(1, 31, 0, 11, 1));

        // Minute 30 already closed; a straggler must not reopen it.
        let closed = synth.add_tick(&tick_at(1, 30, 59, 50, 1));
        assert!(closed.is_empty());
        assert_eq!(synth.stats().ticks_late, 1);

        // The open minute 31 is unaffected.
        let closed = synth.add_tick(&tick_at(1, 32, 0, 12, 1));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].frame_start, frame(1, 31));
        assert_eq!(closed[0].volume, Decimal::from(1));
    }

    #[test]
    fn test_five_minute_cascade() {
        let mut synth = synthesizer();

        // One tick per minute through the 09:30 five-minute window.
        for minute in 30..=34 {
            synth.add_tick(&tick_at(1, minute, 0, minute as i64, 1));
        }
        // Closes 1m 09:34, still inside the window.
        let closed = synth.add_tick(&tick_at(1, 35, 0, 35, 1));
        assert_eq!(closed.len(), 1);

        // Closes 1m 09:35, whose window is 09:35, which closes 5m 09:30.
        let closed = synth.add_tick(&tick_at(1, 36, 0, 36, 1));
        let five: Vec<&Bar> = closed.iter().filter(|b| b.period == BarPeriod::M5).collect();
        assert_eq!(five.len(), 1);

        let bar = five[0];
        assert_eq!(bar.frame_start, frame(1, 30));
        assert_eq!(bar.open, Decimal::from(30));
        assert_eq!(bar.close, Decimal::from(34));
        assert_eq!(bar.high, Decimal::from(34));
        assert_eq!(bar.low, Decimal::from(30));
        assert_eq!(bar.volume, Decimal::from(5));

        // The aggregate precedes the 1m bar that closed it.
        assert_eq!(closed[0].period, BarPeriod::M5);
        assert_eq!(closed[1].period, BarPeriod::M1);
        assert_eq!(closed[1].frame_start, frame(1, 35));
    }

    #[test]
    fn test_aggregation_volume_is_conserved() {
        let mut synth = synthesizer();
        let mut all = Vec::new();

        // Full hour 09:30-10:29, two ticks per minute.
        for offset in 0..60u32 {
            let (hour, minute) = (1 + (30 + offset) / 60, (30 + offset) % 60);
            all.extend(synth.add_tick(&tick_at(hour, minute, 10, 100 + offset as i64, 2)));
            all.extend(synth.add_tick(&tick_at(hour, minute, 40, 99 + offset as i64, 3)));
        }
        all.extend(synth.flush());

        let volume_for = |period: BarPeriod| -> Decimal {
            all.iter()
                .filter(|b| b.period == period)
                .map(|b| b.volume)
                .sum()
        };

        let one = volume_for(BarPeriod::M1);
        assert_eq!(one, Decimal::from(60 * 5));
        assert_eq!(volume_for(BarPeriod::M5), one);
        assert_eq!(volume_for(BarPeriod::M15), one);
        assert_eq!(volume_for(BarPeriod::M30), one);

        assert_eq!(all.iter().filter(|b| b.period == BarPeriod::M1).count(), 60);
        assert_eq!(all.iter().filter(|b| b.period == BarPeriod::M5).count(), 12);
        assert_eq!(all.iter().filter(|b| b.period == BarPeriod::M15).count(), 4);
        assert_eq!(all.iter().filter(|b| b.period == BarPeriod::M30).count(), 2);
    }

    #[test]
    fn test_flush_closes_open_state() {
        let mut synth = synthesizer();

        synth.add_tick(&tick_at(1, 30, 0, 10, 1));
        let emitted = synth.add_tick(&tick_at(1, 31, 0, 11, 2));
        assert_eq!(emitted.len(), 1);

        let flushed = synth.flush();
        // Open 1m 09:31 plus the partial 5/15/30 windows at 09:30.
        assert_eq!(flushed.len(), 4);
        assert_eq!(flushed[0].frame_start, frame(1, 31));
        assert_eq!(flushed[0].period, BarPeriod::M1);

        let thirty = flushed
            .iter()
            .find(|b| b.period == BarPeriod::M30)
            .expect("30m window");
        assert_eq!(thirty.frame_start, frame(1, 30));
        assert_eq!(thirty.volume, Decimal::from(3));

        // Everything is closed now.
        assert!(synth.flush().is_empty());
    }

    #[test]
    fn test_session_close_boundary_minute() {
        let mut synth = synthesizer();

        // 03:30 UTC is 11:30 in Shanghai, the inclusive session close.
        synth.add_tick(&tick_at(3, 30, 0, 10, 1));
        let flushed = synth.flush();

        assert!(flushed
            .iter()
            .any(|b| b.period == BarPeriod::M1 && b.frame_start == frame(3, 30)));
        assert_eq!(synth.stats().bars_rejected, 0);
    }

    #[test]
    fn test_instruments_are_independent() {
        let mut synth = synthesizer();

        synth.add_tick(&tick_for("600519.SH", 1, 30, 0, 10, 1));
        synth.add_tick(&tick_for("000001.SZ", 1, 30, 5, 20, 1));

        // Advancing one instrument leaves the other's frame open.
        let closed = synth.add_tick(&tick_for("600519.SH", 1, 31, 0, 11, 1));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].instrument_id, "600519.SH");

        let flushed = synth.flush();
        assert!(flushed
            .iter()
            .any(|b| b.instrument_id == "000001.SZ" && b.period == BarPeriod::M1));
    }

    #[test]
    fn test_recent_bars_ring() {
        let mut synth = synthesizer();

        for minute in 30..=33 {
            synth.add_tick(&tick_at(1, minute, 0, minute as i64, 1));
        }

        // Minutes 30..32 closed, 33 still open.
        let recent = synth.recent_bars("600519.SH", BarPeriod::M1, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].frame_start, frame(1, 31));
        assert_eq!(recent[1].frame_start, frame(1, 32));

        assert!(synth
            .recent_bars("999999.SH", BarPeriod::M1, 4)
            .is_empty());
        assert!(synth
            .recent_bars("600519.SH", BarPeriod::M5, 4)
            .is_empty());
    }

    #[test]
    fn test_recent_ring_capacity() {
        let mut synth = BarSynthesizer::new(Arc::new(TradingCalendar::default()), 2);

        for minute in 30..=35 {
            synth.add_tick(&tick_at(1, minute, 0, 10, 1));
        }

        let recent = synth.recent_bars("600519.SH", BarPeriod::M1, 10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].frame_start, frame(1, 34));
    }

    #[test]
    fn test_stats_counting() {
        let mut synth = synthesizer();

        synth.add_tick(&tick_at(1, 30, 0, 10, 1));
        synth.add_tick(&tick_at(1, 31, 0, 11, 1));
        synth.add_tick(&tick_at(4, 0, 0, 12, 1)); // lunch break
        synth.add_tick(&tick_at(1, 30, 30, 13, 1)); // late
        synth.flush();

        let stats = synth.stats();
        assert_eq!(stats.ticks_in, 4);
        assert_eq!(stats.ticks_rejected, 1);
        assert_eq!(stats.ticks_late, 1);
        // 1m 09:30 + 1m 09:31 + partial 5/15/30 windows.
        assert_eq!(stats.bars_emitted, 5);
        assert_eq!(stats.bars_rejected, 0);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut a = SynthesizerStats {
            ticks_in: 10,
            ticks_rejected: 1,
            ticks_late: 2,
            bars_emitted: 5,
            bars_rejected: 0,
        };
        let b = SynthesizerStats {
            ticks_in: 3,
            ticks_rejected: 0,
            ticks_late: 1,
            bars_emitted: 2,
            bars_rejected: 1,
        };

        a.accumulate(&b);
        assert_eq!(a.ticks_in, 13);
        assert_eq!(a.ticks_late, 3);
        assert_eq!(a.bars_emitted, 7);
        assert_eq!(a.bars_rejected, 1);
    }
}
