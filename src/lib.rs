// Library module for drift
// Re-exports modules for use in integration tests and external crates

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod ops;
pub mod reconcile;
pub mod store;

pub use error::SyncError;
pub use index::{FileIndex, FileRecord};
pub use reconcile::Reconciler;
