// Centralized error handling module
// One taxonomy shared by the index, cache, reconcile and store layers

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Main error type for the reconciliation engine.
/// Identity and consistency errors are raised synchronously to the caller;
/// transfer callbacks are expected to catch the transient variants and skip.
#[derive(Debug)]
pub enum SyncError {
    /// A local source file vanished (or never existed)
    NotFound { path: PathBuf },

    /// A serialized cache tuple had the wrong arity or field types
    InvalidRecord { reason: String },

    /// A record missing its identity fields was handed to an index
    IncompatibleRecord { reason: String },

    /// A parent chain could not be resolved to a root
    OrphanedRecord { id: String, context: String },

    /// Post-transfer digest verification failed; the partial file was discarded
    IntegrityMismatch { path: PathBuf, expected: String, actual: String },

    /// Adapter-level transient failure, retries exhausted
    AdapterTransient { operation: String, attempts: u32, reason: String },

    /// A digest was read before the index finalized it
    PendingDigest { path: String },

    /// The snapshot cache carries an unknown schema tag
    CacheSchema { path: PathBuf, found: String },

    /// I/O errors with context
    IoError { path: Option<PathBuf>, operation: String, source: io::Error },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncError::NotFound { path } => {
                write!(f, "File not found: {}\n", path.display())?;
                write!(f, "Suggestion: Check that the file still exists; it may have been removed since the scan")
            }
            SyncError::InvalidRecord { reason } => {
                write!(f, "Invalid cache record: {}\n", reason)?;
                write!(f, "Suggestion: Delete the cache file and rescan to rebuild it")
            }
            SyncError::IncompatibleRecord { reason } => {
                write!(f, "Incompatible record: {}", reason)
            }
            SyncError::OrphanedRecord { id, context } => {
                write!(f, "Orphaned record: ancestor {} could not be resolved ({})\n", id, context)?;
                write!(f, "Suggestion: The parent folder may have been deleted or is inaccessible; the record can be skipped")
            }
            SyncError::IntegrityMismatch { path, expected, actual } => {
                write!(f, "Integrity mismatch for {}: expected {}, got {}\n", path.display(), expected, actual)?;
                write!(f, "Suggestion: The transfer was discarded; retry it")
            }
            SyncError::AdapterTransient { operation, attempts, reason } => {
                write!(f, "Transient backend failure while {} (gave up after {} attempts): {}", operation, attempts, reason)
            }
            SyncError::PendingDigest { path } => {
                write!(f, "Digest for {} read before finalize_digests() ran", path)
            }
            SyncError::CacheSchema { path, found } => {
                write!(f, "Unrecognized cache schema in {}: {}\n", path.display(), found)?;
                write!(f, "Suggestion: The cache predates this version and will be rebuilt on the next scan")
            }
            SyncError::IoError { path, operation, source } => {
                if let Some(p) = path {
                    write!(f, "I/O error while {} {}: {}", operation, p.display(), source)
                } else {
                    write!(f, "I/O error while {}: {}", operation, source)
                }
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::IoError { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl SyncError {
    /// Create an IoError with context about the operation and optional path.
    /// NotFound is surfaced as its own variant since callers branch on it.
    pub fn from_io_error(err: io::Error, operation: &str, path: Option<PathBuf>) -> Self {
        match (err.kind(), path) {
            (io::ErrorKind::NotFound, Some(p)) => SyncError::NotFound { path: p },
            (_, path) => SyncError::IoError {
                path,
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    /// Whether a transfer callback should log-and-skip this error rather
    /// than abort the whole reconciliation pass.
    pub fn is_skippable_transfer_error(&self) -> bool {
        matches!(
            self,
            SyncError::IntegrityMismatch { .. } | SyncError::AdapterTransient { .. }
        )
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        SyncError::from_io_error(err, "unknown operation", None)
    }
}
