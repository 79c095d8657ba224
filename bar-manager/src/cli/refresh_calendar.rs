//! Refresh-calendar command - pull exchange holidays from the backfill source

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use std::sync::Arc;
use tracing::{info, warn};

use market_common::calendar::TradingCalendar;

use crate::config::Settings;
use crate::instruments::InstrumentUniverse;

/// Arguments for the refresh-calendar command
#[derive(Args)]
pub struct RefreshCalendarArgs {
    /// First date of the holiday window (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last date of the holiday window (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,
}

/// Execute the refresh-calendar command.
///
/// The calendar lives in process memory, seeded from the settings files,
/// so this command is a preview: it pulls the source's holiday set for
/// the window, applies it to a freshly loaded calendar, and prints what
/// changed so the dates can be persisted to configuration.
pub async fn execute(args: RefreshCalendarArgs) -> Result<()> {
    if args.end < args.start {
        return Err(anyhow::anyhow!(
            "--end {} precedes --start {}",
            args.end,
            args.start
        ));
    }

    let settings = Settings::load()?;
    let calendar = Arc::new(TradingCalendar::from_settings(&settings.calendar));
    let universe = Arc::new(InstrumentUniverse::with_seed(
        settings.universe.seed_instruments.iter().cloned(),
    ));
    let source = super::build_source(&settings, calendar.clone(), &universe);

    info!(
        "Fetching holidays {}..={} from '{}'...",
        args.start,
        args.end,
        source.name()
    );
    let holidays = source.fetch_holidays(args.start, args.end).await?;

    if holidays.is_empty() {
        if calendar.holiday_count() > 0 {
            warn!(
                "Source returned no holidays; configured set of {} kept",
                calendar.holiday_count()
            );
        } else {
            info!("Source returned no holidays");
        }
        return Ok(());
    }

    for holiday in &holidays {
        info!("  holiday: {}", holiday);
    }
    if calendar.set_holidays(holidays.iter().copied()) {
        info!(
            "{} holidays differ from the configured calendar; update [calendar] holidays to persist them",
            holidays.len()
        );
    } else {
        info!("Configured calendar already matches ({} holidays)", holidays.len());
    }

    Ok(())
}
