//! Persisted snapshot of a FileIndex.

pub mod snapshot;

pub use snapshot::{SnapshotCache, CACHE_SCHEMA};
