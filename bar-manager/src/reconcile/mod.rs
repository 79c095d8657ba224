//! Completeness reconciliation and backfill.

mod completeness;
mod reconciler;

pub use completeness::{CompletenessState, CoverageReport};
pub use reconciler::{BackfillOutcome, CompletenessReconciler, ReconcileError, ReconcileResult};
