//! Cron-lite scheduling for recurring maintenance jobs.
//!
//! The serve loop polls [`Scheduler::due_schedules`] and dispatches each
//! due job to the admin triggers; nothing below the service layer ever
//! sees cron state.

mod cron;

pub use cron::{
    default_schedules, Schedule, ScheduleExpression, Scheduler, JOB_CACHE_HEALTH_CHECK,
    JOB_CALENDAR_REFRESH, JOB_DAILY_RECONCILIATION, JOB_HOT_STORE_FLUSH, JOB_STORE_HEALTH_CHECK,
    JOB_UNIVERSE_REFRESH,
};
