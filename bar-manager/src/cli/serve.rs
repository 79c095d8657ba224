//! Serve command - start the bar manager service

use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use market_common::calendar::TradingCalendar;
use market_common::data::{BarCache, RedisBarCache};

use crate::admin::AdminTriggers;
use crate::config::Settings;
use crate::ingest::IngestionRouter;
use crate::instruments::InstrumentUniverse;
use crate::reconcile::CompletenessReconciler;
use crate::scheduler::{
    default_schedules, Scheduler, JOB_CACHE_HEALTH_CHECK, JOB_CALENDAR_REFRESH,
    JOB_DAILY_RECONCILIATION, JOB_HOT_STORE_FLUSH, JOB_STORE_HEALTH_CHECK, JOB_UNIVERSE_REFRESH,
};
use crate::storage::{BarRepository, BarStore};

/// Arguments for the serve command
#[derive(Args)]
pub struct ServeArgs {
    /// Skip cold-store migrations on startup
    #[arg(long)]
    pub skip_migrations: bool,
}

/// Execute the serve command
pub async fn execute(args: ServeArgs) -> Result<()> {
    let settings = Settings::load()?;
    info!("Starting {}", settings.service.name);
    info!("  Worker shards: {}", settings.synthesis.worker_shards);
    info!("  Backfill enabled: {}", settings.backfill.enabled);
    info!(
        "  Seed instruments: {}",
        settings.universe.seed_instruments.len()
    );

    let calendar = Arc::new(TradingCalendar::from_settings(&settings.calendar));

    // Startup connectivity failures are fatal for both tiers.
    info!("Connecting to cold store...");
    let repository =
        BarRepository::from_settings(&settings.database, calendar.timezone()).await?;
    if args.skip_migrations {
        repository.health_check().await?;
        info!("Cold store connected");
    } else {
        repository.run_migrations().await?;
        info!("Cold store connected and migrations applied");
    }
    let repository = Arc::new(repository);
    let store: Arc<dyn BarStore> = repository.clone();

    info!("Connecting to hot tier at {}...", settings.cache.url);
    let cache: Arc<dyn BarCache> = Arc::new(
        RedisBarCache::new(
            &settings.cache.url,
            &settings.cache.key_prefix,
            settings.cache.ttl_seconds,
        )
        .await?,
    );
    info!("Hot tier connected (TTL {}s)", settings.cache.ttl_seconds);

    let universe = Arc::new(InstrumentUniverse::with_seed(
        settings.universe.seed_instruments.iter().cloned(),
    ));
    let source = super::build_source(&settings, calendar.clone(), &universe);
    info!("Backfill source: '{}'", source.name());

    // Set up shutdown handling
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let shutdown_for_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl+c");
        info!("Received shutdown signal");
        let _ = shutdown_for_signal.send(());
    });

    let reconciler = Arc::new(CompletenessReconciler::new(
        store.clone(),
        source.clone(),
        calendar.clone(),
        universe.clone(),
        &settings.reconciliation,
        settings.backfill.fetch_retry_policy(),
        &shutdown_tx,
    ));
    let admin = AdminTriggers::new(
        reconciler,
        cache.clone(),
        calendar.clone(),
        universe.clone(),
        source.clone(),
    );

    let router = IngestionRouter::start(
        cache.clone(),
        store.clone(),
        calendar.clone(),
        &settings.synthesis,
    );

    let scheduler = Scheduler::new();
    for schedule in default_schedules(&settings.reconciliation) {
        scheduler.add_schedule(schedule);
    }
    info!(
        "Scheduler armed with {} jobs, polling every {}s",
        scheduler.list_schedules().len(),
        settings.service.scheduler_poll_secs
    );

    // Poll for due jobs until shutdown.
    let mut poll = tokio::time::interval(Duration::from_secs(
        settings.service.scheduler_poll_secs.max(1),
    ));
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = poll.tick() => {
                for name in scheduler.due_schedules() {
                    run_job(&name, &admin, &repository, cache.as_ref()).await;
                    scheduler.mark_run(&name);
                }
            }
        }
    }

    // Drain the pipeline within the configured grace period.
    info!("Shutting down...");
    let grace = Duration::from_secs(settings.service.shutdown_timeout_secs.max(1));
    match tokio::time::timeout(grace, router.shutdown()).await {
        Ok(stats) => {
            info!(
                "Final stats: {} ticks routed | {} bars published | {} publishes dropped | {} late ticks",
                stats.ticks_routed,
                stats.bars_published,
                stats.publishes_dropped,
                stats.synthesis.ticks_late
            );
        }
        Err(_) => {
            warn!(
                "Pipeline drain exceeded {}s; exiting anyway",
                grace.as_secs()
            );
        }
    }

    Ok(())
}

async fn run_job(
    name: &str,
    admin: &AdminTriggers,
    repository: &BarRepository,
    cache: &dyn BarCache,
) {
    debug!("Running scheduled job '{}'", name);
    match name {
        JOB_DAILY_RECONCILIATION => match admin.run_daily_reconciliation().await {
            Ok(Some(outcome)) => info!(
                "Reconciled {}: {} bars inserted, coverage {:.1}% ({})",
                outcome.date,
                outcome.bars_inserted,
                outcome.report.ratio * 100.0,
                outcome.report.state
            ),
            Ok(None) => {}
            Err(e) => error!("Daily reconciliation failed: {}", e),
        },
        JOB_HOT_STORE_FLUSH => {
            if let Err(e) = admin.flush_hot_store().await {
                error!("Hot-store flush failed: {}", e);
            }
        }
        JOB_STORE_HEALTH_CHECK => match repository.health_check().await {
            Ok(()) => info!("Cold store healthy"),
            Err(e) => error!("Cold store health check failed: {}", e),
        },
        JOB_CACHE_HEALTH_CHECK => match cache.health_check().await {
            Ok(()) => info!("Hot tier healthy"),
            Err(e) => error!("Hot tier health check failed: {}", e),
        },
        JOB_UNIVERSE_REFRESH => {
            if let Err(e) = admin.refresh_universe().await {
                error!("Universe refresh failed: {}", e);
            }
        }
        JOB_CALENDAR_REFRESH => {
            if let Err(e) = admin.refresh_calendar_default().await {
                error!("Calendar refresh failed: {}", e);
            }
        }
        other => warn!("Unknown scheduled job '{}'", other),
    }
}
