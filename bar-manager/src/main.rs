//! Bar Manager CLI
//!
//! Provides commands for:
//! - `serve`: Start the bar manager service
//! - `reconcile`: Check and repair cold-tier completeness
//! - `db`: Database operations
//! - `flush-hot`: Empty the hot cache
//! - `refresh-calendar`: Pull exchange holidays into the trading calendar

use anyhow::Result;
use clap::Parser;

use bar_manager::cli::{Cli, Commands};
use market_common::logging::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file before logging reads them
    dotenv::dotenv().ok();

    // Initialize logging
    init_logging(
        LogConfig::from_env().with_default_level("bar_manager=info,market_common=info"),
    )
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command
    match cli.command {
        Commands::Serve(args) => {
            bar_manager::cli::serve::execute(args).await?;
        }
        Commands::Reconcile(args) => {
            bar_manager::cli::reconcile::execute(args).await?;
        }
        Commands::Db(cmd) => {
            bar_manager::cli::db::execute(cmd).await?;
        }
        Commands::FlushHot => {
            bar_manager::cli::flush_hot::execute().await?;
        }
        Commands::RefreshCalendar(args) => {
            bar_manager::cli::refresh_calendar::execute(args).await?;
        }
    }

    Ok(())
}
