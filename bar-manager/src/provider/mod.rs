//! Backfill source abstraction and implementations.
//!
//! A backfill source is a vendor-side history endpoint the reconciler
//! pulls finalized bars from. The mock source generates deterministic
//! data for tests and development; the disabled source answers every
//! request with nothing.

mod mock;
mod traits;

pub use mock::{DisabledBackfillSource, MockBarSource};
pub use traits::{BackfillSource, ProviderError, ProviderResult};
