//! Tier merge for bar queries.
//!
//! Reads that span the hot (Redis, intraday) and cold (TimescaleDB,
//! historical) tiers concatenate both result sets and pass them through
//! `merge_bars`. The same frame may exist in both tiers while the day is
//! being settled, so the merge de-duplicates by bar identity before
//! ordering the output.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::types::Bar;

/// Merge bars from the hot and cold tiers into one time-ordered series.
///
/// De-duplication key is `(instrument_id, frame_start)`; both tiers hold
/// the same synthesized record for a given frame, so whichever copy is
/// seen first wins. Output is sorted by `frame_start` ascending. Either
/// input may be empty.
pub fn merge_bars(hot: Vec<Bar>, cold: Vec<Bar>) -> Vec<Bar> {
    let mut seen: HashSet<(String, DateTime<Utc>)> = HashSet::new();
    let mut merged = Vec::with_capacity(hot.len() + cold.len());

    for bar in hot.into_iter().chain(cold.into_iter()) {
        if seen.insert(bar.merge_key()) {
            merged.push(bar);
        }
    }

    merged.sort_by_key(|bar| bar.frame_start);
    merged
}
