//! Tick-to-bar synthesis.

mod synthesizer;

pub use synthesizer::{BarSynthesizer, SynthesizerStats};
