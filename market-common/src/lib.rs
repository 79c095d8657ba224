// market-common: Shared market data types and infrastructure
// Used by bar-manager (service) and integration-tests

pub mod calendar;
pub mod data;
pub mod error;
pub mod logging;
