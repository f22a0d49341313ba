// Local tree scanner
// Builds a FileIndex from a directory walk, reusing cached digests

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use jwalk::WalkDir;
use tracing::warn;

use crate::error::SyncError;
use crate::index::{FileIndex, FileRecord};

/// Scans a local directory tree into a FileIndex. Records are inserted
/// with deferred digests; a snapshot-cache entry with the same path,
/// size and mtime short-circuits the hashing, everything else is hashed
/// during finalize.
pub struct LocalStore {
    root: PathBuf,
    show_progress: bool,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), show_progress: false }
    }

    /// Show an indicatif bar while hashing (skipped off-terminal).
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn kind(&self) -> &'static str {
        "local"
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and produce a finalized index. Unreadable entries
    /// and files that vanish mid-scan are warned about and skipped; the
    /// rest of the scan continues.
    pub fn scan(&self, cached: &[FileRecord]) -> Result<FileIndex, SyncError> {
        let mut index = FileIndex::new();

        for entry_result in WalkDir::new(&self.root)
            .parallelism(jwalk::Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
        {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "error walking directory");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            match FileRecord::from_local_path_deferred(&path) {
                Ok(record) => index.insert(record)?,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                }
            }
        }

        index.reuse_digests_from(cached);
        self.finalize(&mut index)?;
        Ok(index)
    }

    fn finalize(&self, index: &mut FileIndex) -> Result<(), SyncError> {
        let pending = index.pending_count();
        if self.show_progress && pending > 0 && std::io::stderr().is_terminal() {
            let pb = ProgressBar::new(pending as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg}\n[{bar:40.cyan/blue}] {pos}/{len}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            let result = index.finalize_digests_with(|path| {
                pb.set_message(format!("Hashing: {}", path));
                pb.inc(1);
            });
            pb.finish_and_clear();
            result
        } else {
            index.finalize_digests()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_scan_builds_finalized_index() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"beta").unwrap();

        let index = LocalStore::new(dir.path()).scan(&[]).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.pending_count(), 0);
        assert_eq!(index.records_for_name("a.txt").len(), 1);

        let record = index.records_for_name("b.txt")[0];
        assert!(record.canonical_path.ends_with("sub/b.txt"));
        assert!(record.digests().unwrap().md5.is_some());
    }

    #[test]
    fn test_scan_reuses_cached_digests() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"alpha").unwrap();

        let store = LocalStore::new(dir.path());
        let first = store.scan(&[]).unwrap();
        let cached: Vec<FileRecord> = first.records().cloned().collect();

        // rescan with an unchanged file: digests come from the cache
        let second = store.scan(&cached).unwrap();
        let a = second.records_for_name("a.txt")[0];
        assert_eq!(a.digests().unwrap(), first.records_for_name("a.txt")[0].digests().unwrap());
    }
}
