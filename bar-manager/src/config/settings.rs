//! Application settings loaded from layered configuration sources.
//!
//! Settings are resolved in order of precedence (lowest first):
//! 1. Built-in defaults
//! 2. `config/default.toml`
//! 3. `config/{run_mode}.toml` (from `RUN_MODE`, default `development`)
//! 4. `config/local.toml` (gitignored overrides)
//! 5. Environment variables prefixed `BAR_MANAGER__` (e.g.
//!    `BAR_MANAGER__DATABASE__MAX_CONNECTIONS=20`)

use config::{Config, ConfigError, Environment, File};
use market_common::calendar::CalendarSettings;
use serde::Deserialize;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "BAR_MANAGER";

// ============================================================================
// Service
// ============================================================================

/// Service-level identity and lifecycle settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    /// Service name used in log lines.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Grace period for draining workers on shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Scheduler poll interval in seconds.
    #[serde(default = "default_scheduler_poll_secs")]
    pub scheduler_poll_secs: u64,
}

fn default_service_name() -> String {
    "bar-manager".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_scheduler_poll_secs() -> u64 {
    30
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            scheduler_poll_secs: default_scheduler_poll_secs(),
        }
    }
}

// ============================================================================
// Database (cold tier)
// ============================================================================

/// TimescaleDB connection settings for the cold tier.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Postgres connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum pool connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum idle pool connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Rows per multi-row INSERT statement.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
}

fn default_database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/bar_manager".to_string())
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_insert_batch_size() -> usize {
    500
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            insert_batch_size: default_insert_batch_size(),
        }
    }
}

// ============================================================================
// Cache (hot tier)
// ============================================================================

/// Redis settings for the hot tier.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Redis connection URL.
    #[serde(default = "default_cache_url")]
    pub url: String,

    /// Key namespace prefix, keys are `{prefix}:{period}:{date}`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Per-key TTL in seconds.
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_cache_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "bars".to_string()
}

fn default_cache_ttl_seconds() -> u64 {
    market_common::data::DEFAULT_HOT_TTL_SECONDS
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            url: default_cache_url(),
            key_prefix: default_key_prefix(),
            ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

// ============================================================================
// Synthesis
// ============================================================================

/// Tick routing and bar synthesis settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisSettings {
    /// Number of worker shards. Ticks for one instrument always hash to
    /// the same shard.
    #[serde(default = "default_worker_shards")]
    pub worker_shards: usize,

    /// Bounded capacity of each shard's tick queue.
    #[serde(default = "default_tick_queue_capacity")]
    pub tick_queue_capacity: usize,

    /// Bounded capacity of the closed-bar emit queue.
    #[serde(default = "default_emit_queue_capacity")]
    pub emit_queue_capacity: usize,

    /// Closed bars retained per (instrument, period) for recent-bar reads.
    #[serde(default = "default_recent_bars_capacity")]
    pub recent_bars_capacity: usize,
}

fn default_worker_shards() -> usize {
    4
}

fn default_tick_queue_capacity() -> usize {
    1024
}

fn default_emit_queue_capacity() -> usize {
    1024
}

fn default_recent_bars_capacity() -> usize {
    64
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            worker_shards: default_worker_shards(),
            tick_queue_capacity: default_tick_queue_capacity(),
            emit_queue_capacity: default_emit_queue_capacity(),
            recent_bars_capacity: default_recent_bars_capacity(),
        }
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Completeness checking and backfill settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationSettings {
    /// Coverage ratio at or above which a date counts as complete.
    #[serde(default = "default_completeness_threshold")]
    pub completeness_threshold: f64,

    /// Instrument codes per backfill batch.
    #[serde(default = "default_backfill_batch_size")]
    pub batch_size: usize,

    /// Fixed expected instrument count. When unset the store's maximum
    /// observed daily count is used.
    #[serde(default)]
    pub expected_count: Option<u64>,

    /// UTC hour of the daily reconciliation run.
    #[serde(default = "default_daily_check_hour")]
    pub daily_check_hour: u32,

    /// UTC minute of the daily reconciliation run.
    #[serde(default = "default_daily_check_minute")]
    pub daily_check_minute: u32,
}

fn default_completeness_threshold() -> f64 {
    0.95
}

fn default_backfill_batch_size() -> usize {
    100
}

fn default_daily_check_hour() -> u32 {
    7
}

fn default_daily_check_minute() -> u32 {
    35
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            completeness_threshold: default_completeness_threshold(),
            batch_size: default_backfill_batch_size(),
            expected_count: None,
            daily_check_hour: default_daily_check_hour(),
            daily_check_minute: default_daily_check_minute(),
        }
    }
}

// ============================================================================
// Backfill source
// ============================================================================

/// Backfill source selection and fetch retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackfillSettings {
    /// When false a disabled stub source is wired in and backfill fetches
    /// return nothing.
    #[serde(default = "default_backfill_enabled")]
    pub enabled: bool,

    /// Maximum fetch attempts per request.
    #[serde(default = "default_fetch_max_attempts")]
    pub fetch_max_attempts: u32,

    /// Initial fetch retry delay in milliseconds.
    #[serde(default = "default_fetch_initial_delay_ms")]
    pub fetch_initial_delay_ms: u64,

    /// Retry delay ceiling in milliseconds.
    #[serde(default = "default_fetch_max_delay_ms")]
    pub fetch_max_delay_ms: u64,
}

fn default_backfill_enabled() -> bool {
    true
}

fn default_fetch_max_attempts() -> u32 {
    5
}

fn default_fetch_initial_delay_ms() -> u64 {
    500
}

fn default_fetch_max_delay_ms() -> u64 {
    30_000
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            enabled: default_backfill_enabled(),
            fetch_max_attempts: default_fetch_max_attempts(),
            fetch_initial_delay_ms: default_fetch_initial_delay_ms(),
            fetch_max_delay_ms: default_fetch_max_delay_ms(),
        }
    }
}

impl BackfillSettings {
    /// Retry policy for backfill source fetches.
    pub fn fetch_retry_policy(&self) -> market_common::error::RetryPolicy {
        market_common::error::RetryPolicy::new(
            self.fetch_max_attempts,
            std::time::Duration::from_millis(self.fetch_initial_delay_ms),
            std::time::Duration::from_millis(self.fetch_max_delay_ms),
        )
    }
}

// ============================================================================
// Instrument universe
// ============================================================================

/// Seed instrument universe settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UniverseSettings {
    /// Instrument codes the universe starts with before any refresh.
    #[serde(default)]
    pub seed_instruments: Vec<String>,
}

// ============================================================================
// Top level
// ============================================================================

/// Complete application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub service: ServiceSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default = "CalendarSettings::default")]
    pub calendar: CalendarSettings,

    #[serde(default)]
    pub synthesis: SynthesisSettings,

    #[serde(default)]
    pub reconciliation: ReconciliationSettings,

    #[serde(default)]
    pub backfill: BackfillSettings,

    #[serde(default)]
    pub universe: UniverseSettings,
}

impl Settings {
    /// Load settings from the default configuration directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_dir(&Self::config_dir())
    }

    /// Load settings rooted at an explicit configuration directory.
    pub fn load_from_dir(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    fn config_dir() -> String {
        std::env::var(format!("{}_CONFIG_DIR", ENV_PREFIX)).unwrap_or_else(|_| "config".to_string())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            database: DatabaseSettings::default(),
            cache: CacheSettings::default(),
            calendar: CalendarSettings::default(),
            synthesis: SynthesisSettings::default(),
            reconciliation: ReconciliationSettings::default(),
            backfill: BackfillSettings::default(),
            universe: UniverseSettings::default(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
