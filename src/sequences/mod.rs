//! Guided sequences: the static catalog, the pure navigator, and the
//! tracker that persists progress.

pub mod catalog;
pub mod navigator;
pub mod routes;
pub mod step;
pub mod tracker;

pub use step::{SequenceKind, StepKey};
pub use tracker::StepTracker;
