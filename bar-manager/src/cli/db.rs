//! Database management commands

use anyhow::Result;
use clap::Subcommand;
use std::sync::Arc;
use tracing::info;

use market_common::calendar::TradingCalendar;

use crate::config::Settings;
use crate::storage::BarRepository;

/// Database subcommands
#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
    /// Show cold-store statistics
    Stats,
}

/// Execute database commands
pub async fn execute(cmd: DbCommands) -> Result<()> {
    match cmd {
        DbCommands::Migrate => execute_migrate().await,
        DbCommands::Stats => execute_stats().await,
    }
}

async fn execute_migrate() -> Result<()> {
    let settings = Settings::load()?;
    let calendar = Arc::new(TradingCalendar::from_settings(&settings.calendar));
    let repository = BarRepository::from_settings(&settings.database, calendar.timezone()).await?;

    info!("Running migrations...");
    repository.run_migrations().await?;
    info!("Migrations completed");
    Ok(())
}

async fn execute_stats() -> Result<()> {
    let settings = Settings::load()?;
    let calendar = Arc::new(TradingCalendar::from_settings(&settings.calendar));
    let repository = BarRepository::from_settings(&settings.database, calendar.timezone()).await?;

    info!("Fetching cold-store statistics...");
    let stats = repository.stats().await?;

    info!("Cold Store Statistics:");
    info!("  Total rows: {}", stats.total_rows());
    for period in &stats.periods {
        match (period.earliest, period.latest) {
            (Some(earliest), Some(latest)) => {
                info!(
                    "  {}: {} rows ({} - {})",
                    period.period.as_str(),
                    period.rows,
                    earliest,
                    latest
                );
            }
            _ => {
                info!("  {}: empty", period.period.as_str());
            }
        }
    }
    match (stats.earliest_date, stats.latest_date) {
        (Some(earliest), Some(latest)) => {
            info!("  Trading dates: {} - {}", earliest, latest);
        }
        _ => {
            info!("  Trading dates: none");
        }
    }

    Ok(())
}
