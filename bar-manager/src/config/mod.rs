//! Configuration management for the bar manager service.

mod settings;

pub use settings::{
    BackfillSettings, CacheSettings, DatabaseSettings, ReconciliationSettings, ServiceSettings,
    Settings, SynthesisSettings, UniverseSettings,
};
