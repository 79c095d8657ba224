//! TimescaleDB-backed cold tier.
//!
//! One hypertable per bar period (`bars_1m` .. `bars_30m`), partitioned on
//! `frame_start` with monthly chunks. Rows carry the exchange-local
//! `trading_date` so coverage queries group by date without timezone
//! arithmetic in SQL. A unique index on `(instrument_id, frame_start)`
//! backs idempotent inserts via `ON CONFLICT DO NOTHING`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

use market_common::data::{Bar, BarPeriod};

use crate::config::DatabaseSettings;

use super::{BarStore, RepositoryError, RepositoryResult};

/// Columns bound per row in the multi-row insert.
const INSERT_COLUMNS: usize = 9;

/// Cold-tier repository over a Postgres/TimescaleDB pool.
#[derive(Debug, Clone)]
pub struct BarRepository {
    pool: PgPool,
    batch_size: usize,
    timezone: Tz,
}

impl BarRepository {
    /// Connect a pool from settings. The timezone converts each bar's
    /// frame start into the `trading_date` column on insert.
    pub async fn from_settings(
        settings: &DatabaseSettings,
        timezone: Tz,
    ) -> RepositoryResult<Self> {
        if settings.url.is_empty() {
            return Err(RepositoryError::Configuration(
                "database.url is empty".to_string(),
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(settings.acquire_timeout_secs))
            .connect(&settings.url)
            .await?;

        info!(
            "Connected to cold store (max_connections={})",
            settings.max_connections
        );

        Ok(Self {
            pool,
            batch_size: settings.insert_batch_size.max(1),
            timezone,
        })
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ========================================================================
    // Migrations
    // ========================================================================

    /// Create the per-period hypertables and indexes. Idempotent.
    pub async fn run_migrations(&self) -> RepositoryResult<()> {
        info!("Running cold store migrations");

        sqlx::query("CREATE EXTENSION IF NOT EXISTS timescaledb CASCADE")
            .execute(&self.pool)
            .await?;

        for period in BarPeriod::ALL {
            self.migrate_period_table(period).await?;
        }

        info!("Cold store migrations complete");
        Ok(())
    }

    async fn migrate_period_table(&self, period: BarPeriod) -> RepositoryResult<()> {
        let table = table_name(period);

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                instrument_id VARCHAR(32) NOT NULL,
                trading_date DATE NOT NULL,
                frame_start TIMESTAMPTZ NOT NULL,
                open NUMERIC(20, 8) NOT NULL,
                high NUMERIC(20, 8) NOT NULL,
                low NUMERIC(20, 8) NOT NULL,
                close NUMERIC(20, 8) NOT NULL,
                volume NUMERIC(30, 8) NOT NULL,
                notional NUMERIC(30, 8) NOT NULL
            )",
            table
        ))
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(&format!(
            "SELECT create_hypertable('{}', 'frame_start', \
             chunk_time_interval => INTERVAL '1 month', if_not_exists => TRUE)",
            table
        ))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => info!("Hypertable ready: {}", table),
            Err(e) => {
                if e.to_string().contains("already a hypertable") {
                    debug!("{} is already a hypertable", table);
                } else {
                    warn!("Could not create hypertable for {}: {}", table, e);
                }
            }
        }

        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_{}_instrument_frame \
             ON {} (instrument_id, frame_start)",
            table, table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_trading_date ON {} (trading_date)",
            table, table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Inserts
    // ========================================================================

    async fn insert_bar_batch(&self, period: BarPeriod, bars: &[Bar]) -> RepositoryResult<usize> {
        if bars.is_empty() {
            return Ok(0);
        }

        let query = build_insert_sql(table_name(period), bars.len());
        let mut sqlx_query = sqlx::query(&query);

        for bar in bars {
            let trading_date = bar.frame_start.with_timezone(&self.timezone).date_naive();
            sqlx_query = sqlx_query
                .bind(&bar.instrument_id)
                .bind(trading_date)
                .bind(bar.frame_start)
                .bind(bar.open)
                .bind(bar.high)
                .bind(bar.low)
                .bind(bar.close)
                .bind(bar.volume)
                .bind(bar.notional);
        }

        let result = sqlx_query.execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Verify connectivity with a trivial round trip.
    pub async fn health_check(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Earliest and latest trading dates with 1-minute coverage.
    pub async fn date_range(&self) -> RepositoryResult<Option<(NaiveDate, NaiveDate)>> {
        let row = sqlx::query(
            "SELECT MIN(trading_date) AS earliest, MAX(trading_date) AS latest FROM bars_1m",
        )
        .fetch_one(&self.pool)
        .await?;

        let earliest: Option<NaiveDate> = row.get("earliest");
        let latest: Option<NaiveDate> = row.get("latest");

        Ok(earliest.zip(latest))
    }

    /// Row counts and frame-start bounds per period table.
    pub async fn stats(&self) -> RepositoryResult<StoreStats> {
        let mut periods = Vec::with_capacity(BarPeriod::ALL.len());

        for period in BarPeriod::ALL {
            let row = sqlx::query(&format!(
                "SELECT COUNT(*) AS row_count, \
                 MIN(frame_start) AS earliest, MAX(frame_start) AS latest \
                 FROM {}",
                table_name(period)
            ))
            .fetch_one(&self.pool)
            .await?;

            periods.push(PeriodRowStats {
                period,
                rows: row.get::<i64, _>("row_count") as u64,
                earliest: row.get("earliest"),
                latest: row.get("latest"),
            });
        }

        let dates = self.date_range().await?;

        Ok(StoreStats {
            periods,
            earliest_date: dates.map(|(d, _)| d),
            latest_date: dates.map(|(_, d)| d),
        })
    }
}

#[async_trait]
impl BarStore for BarRepository {
    async fn insert_bars(&self, period: BarPeriod, bars: &[Bar]) -> RepositoryResult<usize> {
        let mut inserted = 0;
        for chunk in bars.chunks(self.batch_size) {
            inserted += self.insert_bar_batch(period, chunk).await?;
        }

        if inserted < bars.len() {
            debug!(
                "Skipped {} duplicate {} bars",
                bars.len() - inserted,
                period.as_str()
            );
        }
        Ok(inserted)
    }

    async fn query_range(
        &self,
        instrument_id: &str,
        period: BarPeriod,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Bar>> {
        let rows = sqlx::query(&format!(
            "SELECT instrument_id, frame_start, open, high, low, close, volume, notional \
             FROM {} \
             WHERE instrument_id = $1 AND frame_start >= $2 AND frame_start <= $3 \
             ORDER BY frame_start ASC",
            table_name(period)
        ))
        .bind(instrument_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let bars = rows
            .iter()
            .map(|row| {
                Bar::new(
                    row.get::<String, _>("instrument_id"),
                    period,
                    row.get::<DateTime<Utc>, _>("frame_start"),
                    row.get::<Decimal, _>("open"),
                    row.get::<Decimal, _>("high"),
                    row.get::<Decimal, _>("low"),
                    row.get::<Decimal, _>("close"),
                    row.get::<Decimal, _>("volume"),
                    row.get::<Decimal, _>("notional"),
                )
            })
            .collect();

        Ok(bars)
    }

    async fn count_distinct_instruments(&self, date: NaiveDate) -> RepositoryResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT instrument_id) AS cnt FROM bars_1m WHERE trading_date = $1",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("cnt") as u64)
    }

    async fn list_instruments(&self, date: NaiveDate) -> RepositoryResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT instrument_id FROM bars_1m \
             WHERE trading_date = $1 ORDER BY instrument_id",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("instrument_id")).collect())
    }

    async fn max_daily_instrument_count(&self) -> RepositoryResult<u64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(daily.cnt), 0) AS max_count FROM ( \
             SELECT COUNT(DISTINCT instrument_id) AS cnt FROM bars_1m GROUP BY trading_date \
             ) AS daily",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("max_count") as u64)
    }

    async fn distinct_trading_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepositoryResult<Vec<NaiveDate>> {
        let rows = sqlx::query(
            "SELECT DISTINCT trading_date FROM bars_1m \
             WHERE trading_date >= $1 AND trading_date <= $2 ORDER BY trading_date",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("trading_date")).collect())
    }
}

// ============================================================================
// Stats types
// ============================================================================

/// Row counts and frame bounds for one period table.
#[derive(Debug, Clone)]
pub struct PeriodRowStats {
    pub period: BarPeriod,
    pub rows: u64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// Cold store statistics across all period tables.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub periods: Vec<PeriodRowStats>,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
}

impl StoreStats {
    /// Total rows across all period tables.
    pub fn total_rows(&self) -> u64 {
        self.periods.iter().map(|p| p.rows).sum()
    }
}

// ============================================================================
// SQL helpers
// ============================================================================

fn table_name(period: BarPeriod) -> &'static str {
    match period {
        BarPeriod::M1 => "bars_1m",
        BarPeriod::M5 => "bars_5m",
        BarPeriod::M15 => "bars_15m",
        BarPeriod::M30 => "bars_30m",
    }
}

fn build_insert_sql(table: &str, rows: usize) -> String {
    let mut query = format!(
        "INSERT INTO {} (instrument_id, trading_date, frame_start, \
         open, high, low, close, volume, notional) VALUES ",
        table
    );

    let mut param_count = 1;
    for i in 0..rows {
        if i > 0 {
            query.push_str(", ");
        }
        query.push_str(&format!(
            "(${}, ${}, ${}, ${}, ${}, ${}, ${}, ${}, ${})",
            param_count,
            param_count + 1,
            param_count + 2,
            param_count + 3,
            param_count + 4,
            param_count + 5,
            param_count + 6,
            param_count + 7,
            param_count + 8,
        ));
        param_count += INSERT_COLUMNS;
    }

    query.push_str(" ON CONFLICT (instrument_id, frame_start) DO NOTHING");
    query
}

// ============================================================================
// Tests
// ============================================================================
