//! Flush-hot command - empty the hot cache

use anyhow::Result;
use tracing::info;

use market_common::data::{BarCache, RedisBarCache};

use crate::config::Settings;

/// Execute the flush-hot command
pub async fn execute() -> Result<()> {
    let settings = Settings::load()?;

    info!("Connecting to hot tier at {}...", settings.cache.url);
    let cache = RedisBarCache::new(
        &settings.cache.url,
        &settings.cache.key_prefix,
        settings.cache.ttl_seconds,
    )
    .await?;

    cache.clear_all().await?;
    info!("Hot store flushed");
    Ok(())
}
