//! Trading calendar: session-time validation for ticks and bars.
//!
//! The calendar is the single admission gate of the pipeline. Every
//! tick entering synthesis and every bar leaving it is checked against
//! the exchange's trading hours (weekday, holiday set, intraday session
//! windows). Rejections are counted and dropped, never raised to the
//! caller as failures.
//!
//! All checks convert UTC instants to exchange-local time first;
//! the default configuration models the Shanghai exchanges
//! (09:30–11:30 and 13:00–15:00, `Asia::Shanghai`).

mod schedule;

pub use schedule::{CalendarSettings, SessionWindow};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::data::types::{Bar, Tick};
use crate::error::{ErrorCategory, ErrorClassification};

/// Tick admission failure. Informational only: the ingestion path
/// counts and drops rejected ticks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdmissionError {
    #[error("event time {instant} is outside trading hours")]
    OffSession { instant: DateTime<Utc> },

    #[error("price must be positive, got: {price}")]
    PriceNotPositive { price: Decimal },

    #[error("size must be non-negative, got: {size}")]
    NegativeSize { size: Decimal },

    #[error("notional must be non-negative, got: {notional}")]
    NegativeNotional { notional: Decimal },

    #[error("instrument id cannot be empty")]
    EmptyInstrument,
}

impl ErrorClassification for AdmissionError {
    fn category(&self) -> ErrorCategory {
        // Rejected input won't change on retry
        ErrorCategory::Permanent
    }
}

/// Snapshot of the calendar's admission counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionStats {
    pub checked: u64,
    pub accepted: u64,
    pub rejected_off_session: u64,
    pub rejected_invalid_field: u64,
}

impl AdmissionStats {
    /// Share of checked records that were rejected.
    pub fn rejection_rate(&self) -> f64 {
        if self.checked == 0 {
            return 0.0;
        }
        let rejected = self.rejected_off_session + self.rejected_invalid_field;
        rejected as f64 / self.checked as f64
    }
}

/// Exchange trading calendar with a mutable holiday set.
///
/// Shared across all pipeline workers behind an `Arc`; the holiday set
/// sits behind a `parking_lot::RwLock` so the monthly refresh can
/// replace it without stopping ingestion.
pub struct TradingCalendar {
    timezone: Tz,
    sessions: Vec<SessionWindow>,
    holidays: RwLock<HashSet<NaiveDate>>,

    checked: AtomicU64,
    accepted: AtomicU64,
    rejected_off_session: AtomicU64,
    rejected_invalid_field: AtomicU64,
}

impl TradingCalendar {
    pub fn new(timezone: Tz, sessions: Vec<SessionWindow>) -> Self {
        Self {
            timezone,
            sessions,
            holidays: RwLock::new(HashSet::new()),
            checked: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected_off_session: AtomicU64::new(0),
            rejected_invalid_field: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &CalendarSettings) -> Self {
        let calendar = Self::new(settings.timezone, settings.sessions.clone());
        calendar.set_holidays(settings.holidays.iter().copied());
        calendar
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn sessions(&self) -> &[SessionWindow] {
        &self.sessions
    }

    // =================================================================
    // Day and instant queries
    // =================================================================

    /// Exchange-local trading date of a UTC instant.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    /// Trading day check: a weekday that is not an exchange holiday.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        !self.holidays.read().contains(&date)
    }

    /// Trading instant check: trading day and time-of-day inside one of
    /// the session windows (boundaries inclusive).
    pub fn is_trading_instant(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.timezone);
        if !self.is_trading_day(local.date_naive()) {
            return false;
        }
        let time = local.time();
        self.sessions.iter().any(|window| window.contains(time))
    }

    /// Local close time of the last session window, if any are
    /// configured.
    pub fn final_session_close(&self) -> Option<NaiveTime> {
        self.sessions.iter().map(|window| window.end).max()
    }

    /// Most recent trading day strictly before `date`, looking back up
    /// to 30 days.
    pub fn previous_trading_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        let mut probe = date;
        for _ in 0..30 {
            probe = probe.pred_opt()?;
            if self.is_trading_day(probe) {
                return Some(probe);
            }
        }
        None
    }

    /// Trading day whose sessions have fully completed at `now`: the
    /// local date itself once the final close has passed, otherwise the
    /// previous trading day.
    pub fn most_recent_completed_day(&self, now: DateTime<Utc>) -> Option<NaiveDate> {
        let local = now.with_timezone(&self.timezone);
        let today = local.date_naive();
        let close = self.final_session_close()?;

        if self.is_trading_day(today) && local.time() > close {
            Some(today)
        } else {
            self.previous_trading_day(today)
        }
    }

    // =================================================================
    // Admission validation
    // =================================================================

    /// Validate a tick for admission into synthesis: field sanity plus
    /// the session-time gate. Updates the admission counters.
    pub fn validate_tick(&self, tick: &Tick) -> Result<(), AdmissionError> {
        self.checked.fetch_add(1, Ordering::Relaxed);

        if tick.instrument_id.is_empty() {
            self.rejected_invalid_field.fetch_add(1, Ordering::Relaxed);
            return Err(AdmissionError::EmptyInstrument);
        }
        if tick.price <= Decimal::ZERO {
            self.rejected_invalid_field.fetch_add(1, Ordering::Relaxed);
            return Err(AdmissionError::PriceNotPositive { price: tick.price });
        }
        if tick.size < Decimal::ZERO {
            self.rejected_invalid_field.fetch_add(1, Ordering::Relaxed);
            return Err(AdmissionError::NegativeSize { size: tick.size });
        }
        if tick.notional < Decimal::ZERO {
            self.rejected_invalid_field.fetch_add(1, Ordering::Relaxed);
            return Err(AdmissionError::NegativeNotional {
                notional: tick.notional,
            });
        }
        if !self.is_trading_instant(tick.event_time) {
            self.rejected_off_session.fetch_add(1, Ordering::Relaxed);
            return Err(AdmissionError::OffSession {
                instant: tick.event_time,
            });
        }

        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Validate a synthesized or backfilled bar before it is published:
    /// the frame must start inside trading hours and the OHLC shape must
    /// be consistent. Updates the admission counters.
    pub fn validate_bar(&self, bar: &Bar) -> bool {
        self.checked.fetch_add(1, Ordering::Relaxed);

        if !self.is_trading_instant(bar.frame_start) {
            self.rejected_off_session.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Rejected bar outside trading hours: instrument={}, frame={}",
                bar.instrument_id, bar.frame_start
            );
            return false;
        }
        if !bar.ohlc_consistent() {
            self.rejected_invalid_field.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Rejected inconsistent bar: instrument={}, frame={}",
                bar.instrument_id, bar.frame_start
            );
            return false;
        }

        self.accepted.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            checked: self.checked.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_off_session: self.rejected_off_session.load(Ordering::Relaxed),
            rejected_invalid_field: self.rejected_invalid_field.load(Ordering::Relaxed),
        }
    }

    // =================================================================
    // Holiday management
    // =================================================================

    pub fn add_holiday(&self, date: NaiveDate) {
        self.holidays.write().insert(date);
    }

    pub fn remove_holiday(&self, date: NaiveDate) {
        self.holidays.write().remove(&date);
    }

    /// Replace the whole holiday set (monthly calendar refresh).
    /// Returns true if the set actually changed.
    pub fn set_holidays(&self, dates: impl IntoIterator<Item = NaiveDate>) -> bool {
        let new_set: HashSet<NaiveDate> = dates.into_iter().collect();
        let mut holidays = self.holidays.write();
        if *holidays == new_set {
            return false;
        }
        *holidays = new_set;
        true
    }

    pub fn holiday_count(&self) -> usize {
        self.holidays.read().len()
    }
}

impl Default for TradingCalendar {
    fn default() -> Self {
        Self::from_settings(&CalendarSettings::default())
    }
}
