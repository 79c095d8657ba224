//! Expected instrument universe.

mod universe;

pub use universe::InstrumentUniverse;
