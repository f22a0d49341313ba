// Remote store capability trait
// The narrow seam between the engine and any backend adapter

use std::fs;
use std::path::Path;

use crate::error::SyncError;
use crate::index::resolver::RootPolicy;
use crate::index::{digest_bytes, Digests, FileRecord};

/// Options for a file enumeration pass.
#[derive(Debug, Clone, Default)]
pub struct EnumerateOptions {
    /// Substring filter applied by the backend (title/key contains)
    pub search: Option<String>,
    /// Stop after this many items
    pub limit: Option<usize>,
}

impl EnumerateOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Capability interface every backend adapter implements. The engine
/// never inspects adapter types; it only enumerates into callbacks and
/// moves bytes through `fetch`/`store`. Credential handling, pagination
/// and wire-level retries all live behind this trait.
pub trait RemoteStore {
    /// Backend kind, used for cache-file naming ("s3", "gdrive", ...)
    fn kind(&self) -> &'static str;

    /// Termination and rewrite rules for parent-chain resolution.
    fn root_policy(&self) -> RootPolicy;

    /// Invoke the callback once per non-directory item.
    fn enumerate_files(
        &mut self,
        options: &EnumerateOptions,
        callback: &mut dyn FnMut(FileRecord),
    ) -> Result<(), SyncError>;

    /// Invoke the callback once per directory item.
    fn enumerate_directories(
        &mut self,
        callback: &mut dyn FnMut(FileRecord),
    ) -> Result<(), SyncError>;

    /// Download `locator` to `destination`, returning bytes written.
    /// When an expected digest is supplied and the downloaded content
    /// disagrees, the partial file is discarded and `IntegrityMismatch`
    /// raised; the destination is never left in a committed state.
    fn fetch(
        &mut self,
        locator: &str,
        destination: &Path,
        expected: Option<&Digests>,
    ) -> Result<u64, SyncError>;

    /// Upload a local file, returning the backend's id for it.
    fn store(&mut self, local_path: &Path, parent_id: Option<&str>) -> Result<String, SyncError>;

    /// Create a directory, returning its id.
    fn create_directory(
        &mut self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, SyncError>;

    /// Delete an item by backend id.
    fn delete(&mut self, id: &str) -> Result<(), SyncError>;

    /// Fetch metadata for a single item by backend id, for ancestor
    /// resolution. Flat backends have no ancestors to fetch.
    fn fetch_item(&mut self, _id: &str) -> Result<Option<FileRecord>, SyncError> {
        Ok(None)
    }
}

/// Write downloaded bytes beside the destination, verify them against an
/// expected digest, and only then rename into place. On a mismatch the
/// partial file is removed and the previous destination content, if any,
/// stays untouched.
pub fn verify_and_commit(
    data: &[u8],
    destination: &Path,
    expected: Option<&Digests>,
) -> Result<u64, SyncError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SyncError::from_io_error(e, "creating destination directory", Some(parent.to_path_buf()))
        })?;
    }
    let part = destination.with_extension("part");
    fs::write(&part, data)
        .map_err(|e| SyncError::from_io_error(e, "writing download", Some(part.clone())))?;

    if let Some(expected) = expected {
        if !expected.is_empty() {
            let actual = digest_bytes(data);
            if !expected.matches(&actual) {
                let _ = fs::remove_file(&part);
                return Err(SyncError::IntegrityMismatch {
                    path: destination.to_path_buf(),
                    expected: expected.primary().unwrap_or("").to_string(),
                    actual: actual.primary().unwrap_or("").to_string(),
                });
            }
        }
    }

    fs::rename(&part, destination)
        .map_err(|e| SyncError::from_io_error(e, "committing download", Some(destination.to_path_buf())))?;
    Ok(data.len() as u64)
}
