//! Sharded tick routing.
//!
//! Ticks are routed by instrument hash to a fixed set of worker shards,
//! so one instrument is always synthesized by exactly one task and its
//! bars come out in order. Workers forward closed bars to a single writer
//! task that publishes them to the hot cache. All channels are bounded;
//! `ingest_tick` awaits shard capacity instead of dropping on a full
//! queue, which backpressures the feed.
//!
//! Control commands (flush, recent-bars, stats) travel on the same shard
//! channels as ticks, so a reply always reflects every tick sent before
//! the request.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use market_common::calendar::TradingCalendar;
use market_common::data::{Bar, BarCache, BarPeriod, Tick};
use market_common::error::RetryPolicy;

use crate::config::SynthesisSettings;
use crate::storage::{BarStore, RepositoryResult};
use crate::synthesis::{BarSynthesizer, SynthesizerStats};

// ============================================================================
// Commands and counters
// ============================================================================

enum ShardCommand {
    Tick(Tick),
    Flush(oneshot::Sender<usize>),
    Recent {
        instrument_id: String,
        period: BarPeriod,
        count: usize,
        reply: oneshot::Sender<Vec<Bar>>,
    },
    Stats(oneshot::Sender<SynthesizerStats>),
}

#[derive(Default)]
struct RouterCounters {
    ticks_routed: AtomicU64,
    ticks_dropped_closed: AtomicU64,
    bars_published: AtomicU64,
    publishes_dropped: AtomicU64,
    historical_inserted: AtomicU64,
    historical_rejected: AtomicU64,
}

impl RouterCounters {
    fn snapshot(&self, synthesis: SynthesizerStats) -> RouterStats {
        RouterStats {
            ticks_routed: self.ticks_routed.load(Ordering::Relaxed),
            ticks_dropped_closed: self.ticks_dropped_closed.load(Ordering::Relaxed),
            synthesis,
            bars_published: self.bars_published.load(Ordering::Relaxed),
            publishes_dropped: self.publishes_dropped.load(Ordering::Relaxed),
            historical_inserted: self.historical_inserted.load(Ordering::Relaxed),
            historical_rejected: self.historical_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pipeline counters plus merged synthesizer stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Ticks accepted onto a shard queue.
    pub ticks_routed: u64,
    /// Ticks dropped because the shard had already stopped.
    pub ticks_dropped_closed: u64,
    pub synthesis: SynthesizerStats,
    /// Closed bars written to the hot cache.
    pub bars_published: u64,
    /// Closed bars dropped after publish retries were exhausted.
    pub publishes_dropped: u64,
    /// Historical bars written to the cold store.
    pub historical_inserted: u64,
    /// Historical bars dropped by validation.
    pub historical_rejected: u64,
}

// ============================================================================
// Router
// ============================================================================

/// Fans ticks out to synthesis workers and closed bars into the hot cache.
pub struct IngestionRouter {
    shards: Vec<mpsc::Sender<ShardCommand>>,
    workers: Vec<JoinHandle<SynthesizerStats>>,
    writer: JoinHandle<()>,
    store: Arc<dyn BarStore>,
    calendar: Arc<TradingCalendar>,
    store_retry: RetryPolicy,
    counters: Arc<RouterCounters>,
}

impl IngestionRouter {
    /// Spawn the shard workers and the hot-cache writer.
    pub fn start(
        cache: Arc<dyn BarCache>,
        store: Arc<dyn BarStore>,
        calendar: Arc<TradingCalendar>,
        settings: &SynthesisSettings,
    ) -> Self {
        let shard_count = settings.worker_shards.max(1);
        let counters = Arc::new(RouterCounters::default());

        let (emit_tx, emit_rx) = mpsc::channel::<Bar>(settings.emit_queue_capacity.max(1));
        let writer = tokio::spawn(hot_writer(
            cache,
            calendar.clone(),
            emit_rx,
            counters.clone(),
        ));

        let mut shards = Vec::with_capacity(shard_count);
        let mut workers = Vec::with_capacity(shard_count);
        for shard_id in 0..shard_count {
            let (tx, rx) = mpsc::channel::<ShardCommand>(settings.tick_queue_capacity.max(1));
            let synthesizer =
                BarSynthesizer::new(calendar.clone(), settings.recent_bars_capacity);
            workers.push(tokio::spawn(shard_worker(
                shard_id,
                synthesizer,
                rx,
                emit_tx.clone(),
            )));
            shards.push(tx);
        }
        // Workers hold the only emit senders now; the writer exits once
        // every worker is gone.
        drop(emit_tx);

        info!("Ingestion router started with {} shards", shard_count);
        Self {
            shards,
            workers,
            writer,
            store,
            calendar,
            store_retry: RetryPolicy::store_default(),
            counters,
        }
    }

    /// Route one tick to its owning shard. Awaits shard queue capacity.
    pub async fn ingest_tick(&self, tick: Tick) {
        let shard = shard_for(&tick.instrument_id, self.shards.len());
        match self.shards[shard].send(ShardCommand::Tick(tick)).await {
            Ok(()) => {
                self.counters.ticks_routed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters
                    .ticks_dropped_closed
                    .fetch_add(1, Ordering::Relaxed);
                warn!("Shard {} has stopped; tick dropped", shard);
            }
        }
    }

    /// Validate and bulk-insert finalized bars into the cold store.
    ///
    /// This is the replay/import path; bars arriving here never touch the
    /// synthesizers or the hot cache.
    pub async fn ingest_historical(
        &self,
        period: BarPeriod,
        bars: Vec<Bar>,
    ) -> RepositoryResult<usize> {
        let total = bars.len();
        let valid: Vec<Bar> = bars
            .into_iter()
            .filter(|bar| bar.period == period && self.calendar.validate_bar(bar))
            .collect();

        let rejected = total - valid.len();
        if rejected > 0 {
            self.counters
                .historical_rejected
                .fetch_add(rejected as u64, Ordering::Relaxed);
            debug!("Rejected {} historical {} bars", rejected, period.as_str());
        }
        if valid.is_empty() {
            return Ok(0);
        }

        let inserted = self
            .store_retry
            .execute(|| self.store.insert_bars(period, &valid))
            .await?;
        self.counters
            .historical_inserted
            .fetch_add(inserted as u64, Ordering::Relaxed);
        Ok(inserted)
    }

    /// Last `count` closed bars for an instrument and period, oldest
    /// first, from the owning shard's ring.
    pub async fn recent_bars(
        &self,
        instrument_id: &str,
        period: BarPeriod,
        count: usize,
    ) -> Vec<Bar> {
        let shard = shard_for(instrument_id, self.shards.len());
        let (reply, rx) = oneshot::channel();
        let command = ShardCommand::Recent {
            instrument_id: instrument_id.to_string(),
            period,
            count,
            reply,
        };
        if self.shards[shard].send(command).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Close every open frame on every shard. Returns how many bars the
    /// flush emitted.
    pub async fn flush(&self) -> usize {
        let mut emitted = 0;
        for shard in &self.shards {
            let (reply, rx) = oneshot::channel();
            if shard.send(ShardCommand::Flush(reply)).await.is_err() {
                continue;
            }
            emitted += rx.await.unwrap_or(0);
        }
        emitted
    }

    /// Counter snapshot plus merged per-shard synthesizer stats.
    pub async fn stats(&self) -> RouterStats {
        let mut synthesis = SynthesizerStats::default();
        for shard in &self.shards {
            let (reply, rx) = oneshot::channel();
            if shard.send(ShardCommand::Stats(reply)).await.is_err() {
                continue;
            }
            if let Ok(stats) = rx.await {
                synthesis.accumulate(&stats);
            }
        }
        self.counters.snapshot(synthesis)
    }

    /// Flush open frames, stop the workers, and drain the writer.
    ///
    /// Joins the writer after the workers so the returned stats count
    /// every published bar.
    pub async fn shutdown(self) -> RouterStats {
        let emitted = self.flush().await;
        debug!("Final flush emitted {} bars", emitted);

        let Self {
            shards,
            workers,
            writer,
            counters,
            ..
        } = self;
        // Workers exit on channel close.
        drop(shards);

        let mut synthesis = SynthesizerStats::default();
        for worker in workers {
            match worker.await {
                Ok(stats) => synthesis.accumulate(&stats),
                Err(e) => warn!("Synthesis worker ended abnormally: {}", e),
            }
        }
        if let Err(e) = writer.await {
            warn!("Hot-cache writer ended abnormally: {}", e);
        }

        let stats = counters.snapshot(synthesis);
        info!(
            "Ingestion router stopped: {} ticks in, {} bars published, {} publishes dropped",
            stats.ticks_routed, stats.bars_published, stats.publishes_dropped
        );
        stats
    }
}

fn shard_for(instrument_id: &str, shard_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    instrument_id.hash(&mut hasher);
    (hasher.finish() as usize) % shard_count
}

// ============================================================================
// Tasks
// ============================================================================

async fn shard_worker(
    shard_id: usize,
    mut synthesizer: BarSynthesizer,
    mut rx: mpsc::Receiver<ShardCommand>,
    emit_tx: mpsc::Sender<Bar>,
) -> SynthesizerStats {
    while let Some(command) = rx.recv().await {
        match command {
            ShardCommand::Tick(tick) => {
                for bar in synthesizer.add_tick(&tick) {
                    forward(&emit_tx, bar).await;
                }
            }
            ShardCommand::Flush(reply) => {
                let bars = synthesizer.flush();
                let count = bars.len();
                for bar in bars {
                    forward(&emit_tx, bar).await;
                }
                let _ = reply.send(count);
            }
            ShardCommand::Recent {
                instrument_id,
                period,
                count,
                reply,
            } => {
                let _ = reply.send(synthesizer.recent_bars(&instrument_id, period, count));
            }
            ShardCommand::Stats(reply) => {
                let _ = reply.send(synthesizer.stats());
            }
        }
    }

    // Channel closed: emit whatever is still open.
    for bar in synthesizer.flush() {
        forward(&emit_tx, bar).await;
    }
    debug!("Synthesis shard {} stopped", shard_id);
    synthesizer.stats()
}

async fn forward(emit_tx: &mpsc::Sender<Bar>, bar: Bar) {
    if emit_tx.send(bar).await.is_err() {
        warn!("Hot-cache writer is gone; closed bar dropped");
    }
}

async fn hot_writer(
    cache: Arc<dyn BarCache>,
    calendar: Arc<TradingCalendar>,
    mut emit_rx: mpsc::Receiver<Bar>,
    counters: Arc<RouterCounters>,
) {
    let retry = RetryPolicy::store_default();
    while let Some(bar) = emit_rx.recv().await {
        let date = calendar.local_date(bar.frame_start);
        match retry.execute(|| cache.publish_bar(&bar, date)).await {
            Ok(()) => {
                counters.bars_published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.publishes_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Dropped {} bar for {} at {}: {}",
                    bar.period.as_str(),
                    bar.instrument_id,
                    bar.frame_start,
                    e
                );
            }
        }
    }
    debug!("Hot-cache writer stopped");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBarStore;
    use chrono::{NaiveDate, TimeZone, Utc};
    use market_common::data::MemoryBarCache;
    use rust_decimal::Decimal;

    fn router() -> (
        IngestionRouter,
        Arc<MemoryBarCache>,
        Arc<MemoryBarStore>,
    ) {
        let cache = Arc::new(MemoryBarCache::new(3600));
        let store = Arc::new(MemoryBarStore::default());
        let router = IngestionRouter::start(
            cache.clone(),
            store.clone(),
            Arc::new(TradingCalendar::default()),
            &SynthesisSettings::default(),
        );
        (router, cache, store)
    }

    /// Tick on Friday 2026-02-13; 01:30 UTC is 09:30 in Shanghai.
    fn tick_for(instrument: &str, hour: u32, minute: u32, second: u32, price: i64) -> Tick {
        let time = Utc
            .with_ymd_and_hms(2026, 2, 13, hour, minute, second)
            .unwrap();
        let price = Decimal::from(price);
        Tick::new(instrument, time, price, Decimal::ONE, price)
    }

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 13).unwrap()
    }

    fn bar_for(instrument: &str, period: BarPeriod, hour: u32, minute: u32) -> Bar {
        let frame = Utc.with_ymd_and_hms(2026, 2, 13, hour, minute, 0).unwrap();
        Bar::new(
            instrument,
            period,
            frame,
            Decimal::from(10),
            Decimal::from(11),
            Decimal::from(9),
            Decimal::from(10),
            Decimal::from(100),
            Decimal::from(1000),
        )
    }

    #[test]
    fn test_shard_assignment_is_stable() {
        let a = shard_for("600519.SH", 4);
        assert_eq!(a, shard_for("600519.SH", 4));
        assert!(a < 4);
        assert_eq!(shard_for("anything", 1), 0);
    }

    #[tokio::test]
    async fn test_ticks_become_hot_bars() {
        let (router, cache, _store) = router();

        router.ingest_tick(tick_for("600519.SH", 1, 30, 10, 100)).await;
        router.ingest_tick(tick_for("600519.SH", 1, 31, 5, 101)).await;

        let stats = router.shutdown().await;

        let minutes = cache
            .day_bars(BarPeriod::M1, friday(), Some("600519.SH"))
            .await
            .unwrap();
        assert_eq!(minutes.len(), 2);
        assert_eq!(minutes[0].close, Decimal::from(100));
        assert_eq!(minutes[1].close, Decimal::from(101));

        // Flush also closed the 5/15/30-minute windows over those minutes.
        let fives = cache
            .day_bars(BarPeriod::M5, friday(), Some("600519.SH"))
            .await
            .unwrap();
        assert_eq!(fives.len(), 1);
        assert_eq!(fives[0].volume, Decimal::from(2));

        assert_eq!(stats.ticks_routed, 2);
        assert_eq!(stats.synthesis.ticks_in, 2);
        assert_eq!(stats.bars_published, 5);
        assert_eq!(stats.publishes_dropped, 0);
    }

    #[tokio::test]
    async fn test_off_session_tick_publishes_nothing() {
        let (router, cache, _store) = router();

        // 04:00 UTC is 12:00 in Shanghai, inside the lunch break.
        router.ingest_tick(tick_for("600519.SH", 4, 0, 0, 100)).await;
        let stats = router.shutdown().await;

        assert_eq!(stats.ticks_routed, 1);
        assert_eq!(stats.synthesis.ticks_rejected, 1);
        assert_eq!(stats.bars_published, 0);

        let bars = cache
            .day_bars(BarPeriod::M1, friday(), None)
            .await
            .unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_open_frames() {
        let (router, cache, _store) = router();

        router.ingest_tick(tick_for("600519.SH", 1, 30, 10, 100)).await;
        let stats = router.shutdown().await;

        // One open minute closes into one bar per period.
        assert_eq!(stats.bars_published, 4);
        let minutes = cache
            .day_bars(BarPeriod::M1, friday(), Some("600519.SH"))
            .await
            .unwrap();
        assert_eq!(minutes.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_bars_follow_queued_ticks() {
        let (router, _cache, _store) = router();

        for minute in 30..33 {
            router
                .ingest_tick(tick_for("600519.SH", 1, minute, 0, 100 + minute as i64))
                .await;
        }

        // The request rides the same shard channel, so it sees all three
        // ticks even though the worker runs asynchronously.
        let recent = router.recent_bars("600519.SH", BarPeriod::M1, 10).await;
        assert_eq!(recent.len(), 2);
        assert!(recent[0].frame_start < recent[1].frame_start);
        assert_eq!(recent[1].close, Decimal::from(131));

        assert!(router
            .recent_bars("UNKNOWN.XX", BarPeriod::M1, 10)
            .await
            .is_empty());

        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_flush_reports_emitted_count() {
        let (router, _cache, _store) = router();

        router.ingest_tick(tick_for("600519.SH", 1, 30, 10, 100)).await;
        router.ingest_tick(tick_for("000001.SZ", 1, 30, 20, 50)).await;

        // Two open minutes, each closing into 1m + 5m + 15m + 30m.
        assert_eq!(router.flush().await, 8);
        assert_eq!(router.flush().await, 0);

        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_stats_merge_across_shards() {
        let (router, _cache, _store) = router();

        router.ingest_tick(tick_for("600519.SH", 1, 30, 0, 100)).await;
        router.ingest_tick(tick_for("000001.SZ", 1, 30, 0, 50)).await;
        router.ingest_tick(tick_for("300750.SZ", 4, 0, 0, 50)).await; // lunch

        let stats = router.stats().await;
        assert_eq!(stats.ticks_routed, 3);
        assert_eq!(stats.synthesis.ticks_in, 3);
        assert_eq!(stats.synthesis.ticks_rejected, 1);

        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_historical_bars_validated_and_stored() {
        let (router, cache, store) = router();

        let bars = vec![
            bar_for("600519.SH", BarPeriod::M5, 1, 30),
            // Wrong period for this call.
            bar_for("600519.SH", BarPeriod::M1, 1, 30),
            // Lunch break, not a trading instant.
            bar_for("600519.SH", BarPeriod::M5, 4, 0),
        ];
        let inserted = router.ingest_historical(BarPeriod::M5, bars).await.unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(store.len(BarPeriod::M5), 1);
        assert_eq!(store.len(BarPeriod::M1), 0);

        // Historical bars bypass the hot cache.
        let hot = cache
            .day_bars(BarPeriod::M5, friday(), None)
            .await
            .unwrap();
        assert!(hot.is_empty());

        let stats = router.shutdown().await;
        assert_eq!(stats.historical_inserted, 1);
        assert_eq!(stats.historical_rejected, 2);
    }

    #[tokio::test]
    async fn test_historical_replay_is_idempotent() {
        let (router, _cache, store) = router();

        let bars = vec![bar_for("600519.SH", BarPeriod::M1, 1, 30)];
        assert_eq!(
            router
                .ingest_historical(BarPeriod::M1, bars.clone())
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            router.ingest_historical(BarPeriod::M1, bars).await.unwrap(),
            0
        );
        assert_eq!(store.len(BarPeriod::M1), 1);

        router.shutdown().await;
    }
}
