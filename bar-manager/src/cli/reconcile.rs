//! Reconcile command - one-shot completeness check and repair

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use market_common::calendar::TradingCalendar;

use crate::config::Settings;
use crate::instruments::InstrumentUniverse;
use crate::reconcile::{BackfillOutcome, CompletenessReconciler, CoverageReport};
use crate::storage::BarRepository;

/// Arguments for the reconcile command
#[derive(Args)]
pub struct ReconcileArgs {
    /// Trading date to check (YYYY-MM-DD)
    #[arg(long)]
    pub date: NaiveDate,

    /// Check every trading day from --date through this date
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Expected instrument count override
    #[arg(long)]
    pub expected: Option<u64>,

    /// Report coverage without backfilling
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the reconcile command
pub async fn execute(args: ReconcileArgs) -> Result<()> {
    let settings = Settings::load()?;
    let calendar = Arc::new(TradingCalendar::from_settings(&settings.calendar));
    let repository = BarRepository::from_settings(&settings.database, calendar.timezone()).await?;
    let universe = Arc::new(InstrumentUniverse::with_seed(
        settings.universe.seed_instruments.iter().cloned(),
    ));
    let source = super::build_source(&settings, calendar.clone(), &universe);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let reconciler = CompletenessReconciler::new(
        Arc::new(repository),
        source,
        calendar,
        universe,
        &settings.reconciliation,
        settings.backfill.fetch_retry_policy(),
        &shutdown_tx,
    );

    // Ctrl+C cancels between batches; partial progress is kept.
    let shutdown_for_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_for_signal.send(());
        }
    });

    let batch_size = settings.reconciliation.batch_size;
    match args.end {
        Some(end) => reconcile_range(&reconciler, &args, end, batch_size).await,
        None => reconcile_single(&reconciler, &args, batch_size).await,
    }
}

async fn reconcile_single(
    reconciler: &CompletenessReconciler,
    args: &ReconcileArgs,
    batch_size: usize,
) -> Result<()> {
    if args.dry_run {
        let report = reconciler
            .check_completeness(args.date, args.expected)
            .await?;
        log_report(&report);
        return Ok(());
    }

    let outcome = reconciler
        .backfill(args.date, args.expected, batch_size)
        .await?;
    log_outcome(&outcome);
    Ok(())
}

async fn reconcile_range(
    reconciler: &CompletenessReconciler,
    args: &ReconcileArgs,
    end: NaiveDate,
    batch_size: usize,
) -> Result<()> {
    if end < args.date {
        return Err(anyhow::anyhow!(
            "--end {} precedes --date {}",
            end,
            args.date
        ));
    }

    let incomplete = reconciler
        .list_incomplete_dates(args.date, end, args.expected)
        .await?;
    if incomplete.is_empty() {
        info!(
            "All trading days in {}..={} meet the completeness threshold",
            args.date, end
        );
        return Ok(());
    }

    info!(
        "{} incomplete trading days in {}..={}",
        incomplete.len(),
        args.date,
        end
    );
    for report in &incomplete {
        log_report(report);
    }
    if args.dry_run {
        return Ok(());
    }

    for report in incomplete {
        let outcome = reconciler
            .backfill(report.date, args.expected, batch_size)
            .await?;
        let cancelled = outcome.cancelled;
        log_outcome(&outcome);
        if cancelled {
            warn!("Remaining dates skipped");
            break;
        }
    }
    Ok(())
}

fn log_report(report: &CoverageReport) {
    info!(
        "{}: {}/{} instruments present ({:.1}%, {})",
        report.date,
        report.present,
        report.expected,
        report.ratio * 100.0,
        report.state
    );
}

fn log_outcome(outcome: &BackfillOutcome) {
    info!(
        "{}: {} missing instruments, {} batches ({} failed), {} bars inserted, {} rejected",
        outcome.date,
        outcome.missing_instruments,
        outcome.batches,
        outcome.failed_batches,
        outcome.bars_inserted,
        outcome.bars_rejected
    );
    if outcome.cancelled {
        warn!("Backfill for {} was cancelled before completion", outcome.date);
    }
    log_report(&outcome.report);
}
