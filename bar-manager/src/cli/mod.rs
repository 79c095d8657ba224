//! Command-line interface
//!
//! Provides CLI commands for the bar manager.

pub mod db;
pub mod flush_hot;
pub mod reconcile;
pub mod refresh_calendar;
pub mod serve;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use market_common::calendar::TradingCalendar;

use crate::config::Settings;
use crate::instruments::InstrumentUniverse;
use crate::provider::{BackfillSource, DisabledBackfillSource, MockBarSource};

/// Bar Manager CLI
#[derive(Parser)]
#[command(name = "bar-manager")]
#[command(about = "Tiered OHLCV bar pipeline for exchange market data")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the bar manager service
    Serve(serve::ServeArgs),
    /// Check and repair cold-tier completeness
    Reconcile(reconcile::ReconcileArgs),
    /// Database operations
    #[command(subcommand)]
    Db(db::DbCommands),
    /// Empty the hot cache
    FlushHot,
    /// Pull exchange holidays and apply them to the trading calendar
    RefreshCalendar(refresh_calendar::RefreshCalendarArgs),
}

/// The backfill source shared by serve, reconcile, and refresh-calendar.
///
/// There is no real vendor client; when backfill is enabled the
/// deterministic mock stands in, seeded with the expected universe so
/// repairs actually fill gaps in development.
pub(crate) fn build_source(
    settings: &Settings,
    calendar: Arc<TradingCalendar>,
    universe: &InstrumentUniverse,
) -> Arc<dyn BackfillSource> {
    if settings.backfill.enabled {
        Arc::new(MockBarSource::new(calendar).with_instruments(universe.all()))
    } else {
        Arc::new(DisabledBackfillSource)
    }
}
