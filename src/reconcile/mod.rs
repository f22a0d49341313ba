//! Pairwise reconciliation of FileIndexes.

pub mod engine;

pub use engine::{ReconcileReport, Reconciler, DEFAULT_SKEW_TOLERANCE_SECS};
