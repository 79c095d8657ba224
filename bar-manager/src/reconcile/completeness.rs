//! Per-date completeness classification.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle of a trading date's coverage.
///
/// `Unchecked -> Checking -> Complete | Incomplete`, and through
/// `Backfilling` back to a terminal classification when a backfill runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessState {
    Unchecked,
    Checking,
    Complete,
    Incomplete,
    Backfilling,
}

impl CompletenessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletenessState::Unchecked => "unchecked",
            CompletenessState::Checking => "checking",
            CompletenessState::Complete => "complete",
            CompletenessState::Incomplete => "incomplete",
            CompletenessState::Backfilling => "backfilling",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unchecked" => Some(CompletenessState::Unchecked),
            "checking" => Some(CompletenessState::Checking),
            "complete" => Some(CompletenessState::Complete),
            "incomplete" => Some(CompletenessState::Incomplete),
            "backfilling" => Some(CompletenessState::Backfilling),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompletenessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coverage of one trading date: how many distinct instruments have
/// 1-minute bars versus how many were expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub date: NaiveDate,
    pub expected: u64,
    pub present: u64,
    pub ratio: f64,
    pub state: CompletenessState,
}

impl CoverageReport {
    /// Classify a date. A zero expectation means there is nothing to
    /// miss, so the date counts as complete.
    pub fn classify(date: NaiveDate, expected: u64, present: u64, threshold: f64) -> Self {
        let ratio = if expected == 0 {
            1.0
        } else {
            present as f64 / expected as f64
        };
        let state = if expected == 0 || ratio >= threshold {
            CompletenessState::Complete
        } else {
            CompletenessState::Incomplete
        };

        Self {
            date,
            expected,
            present,
            ratio,
            state,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == CompletenessState::Complete
    }
}
