//! The set of instruments a complete trading day is expected to cover.
//!
//! Seeded from configuration and refreshed from the backfill source. The
//! reconciler subtracts a date's stored instruments from this set to find
//! what is missing.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::debug;

/// Thread-safe instrument universe.
pub struct InstrumentUniverse {
    instruments: RwLock<HashSet<String>>,
}

impl InstrumentUniverse {
    pub fn new() -> Self {
        Self {
            instruments: RwLock::new(HashSet::new()),
        }
    }

    /// Universe pre-populated with seed instruments.
    pub fn with_seed(instruments: impl IntoIterator<Item = String>) -> Self {
        let universe = Self::new();
        universe.add_many(instruments);
        universe
    }

    /// Add instruments, returning how many were new.
    pub fn add_many(&self, instruments: impl IntoIterator<Item = String>) -> usize {
        let mut guard = self.instruments.write();
        let mut added = 0;
        for instrument in instruments {
            if guard.insert(instrument) {
                added += 1;
            }
        }
        if added > 0 {
            debug!("Added {} instruments to universe", added);
        }
        added
    }

    /// Replace the whole universe. Returns whether the set changed.
    pub fn replace(&self, instruments: impl IntoIterator<Item = String>) -> bool {
        let next: HashSet<String> = instruments.into_iter().collect();
        let mut guard = self.instruments.write();
        if *guard == next {
            return false;
        }
        *guard = next;
        true
    }

    pub fn contains(&self, instrument_id: &str) -> bool {
        self.instruments.read().contains(instrument_id)
    }

    /// All instruments, sorted for deterministic batching.
    pub fn all(&self) -> Vec<String> {
        let mut instruments: Vec<String> = self.instruments.read().iter().cloned().collect();
        instruments.sort();
        instruments
    }

    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }
}

impl Default for InstrumentUniverse {
    fn default() -> Self {
        Self::new()
    }
}
