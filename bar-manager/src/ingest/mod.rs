//! Live tick ingestion and fan-out.

mod router;

pub use router::{IngestionRouter, RouterStats};
