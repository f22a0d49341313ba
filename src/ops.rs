// Orchestration module
// Wires scanning, caching, resolution and reconciliation into whole runs

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::error::SyncError;
use crate::index::{FileIndex, FileRecord, PathResolver};
use crate::reconcile::Reconciler;
use crate::store::{EnumerateOptions, LocalStore, RemoteStore};

/// What a sync run did (or, dry, would have done).
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub report: crate::reconcile::ReconcileReport,
    pub uploaded: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub bytes_downloaded: u64,
    pub dry_run: bool,
}

/// Enumerate a remote into a finalized FileIndex, resolving hierarchical
/// paths through the store's root policy. Returns the index together
/// with its snapshot cache so the caller can rewrite it at process end.
pub fn build_remote_index(
    store: &mut dyn RemoteStore,
    options: &EnumerateOptions,
    cache_dir: &Path,
) -> Result<(FileIndex, SnapshotCache), SyncError> {
    let cache = SnapshotCache::new(cache_dir, store.kind());
    let cached = cache.load_or_rebuild();

    let mut index = FileIndex::new();

    // Directories first so parent chains resolve out of the id maps
    store.enumerate_directories(&mut |record| {
        if let Err(err) = index.insert_directory(record) {
            warn!(%err, "skipping directory record");
        }
    })?;

    let mut files: Vec<FileRecord> = Vec::new();
    store.enumerate_files(options, &mut |record| files.push(record))?;

    let resolver = PathResolver::new(store.root_policy());
    for mut record in files {
        if let Some(id) = &record.backend_id {
            if index.get_by_id(id).is_some() {
                continue;
            }
        }
        // Flat backends pre-fill canonical paths; only id/parent chains
        // need resolving.
        if record.parent_id.is_some() {
            match resolver.resolve(&mut index, &record, &mut |id| store.fetch_item(id)) {
                Ok(path) => record.canonical_path = path,
                Err(err @ SyncError::OrphanedRecord { .. }) => {
                    warn!(%err, "skipping orphaned record");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        index.insert(record)?;
    }

    index.reuse_digests_from(&cached);
    index.finalize_digests()?;
    debug!(kind = store.kind(), files = index.len(), dirs = index.directory_count(), "remote index built");
    Ok((index, cache))
}

/// Scan the local mirror directory into a finalized index, reusing
/// cached digests where size and mtime are unchanged.
pub fn build_local_index(
    root: &Path,
    cache_dir: &Path,
    show_progress: bool,
) -> Result<(FileIndex, SnapshotCache), SyncError> {
    let cache = SnapshotCache::new(cache_dir, "local");
    let cached = cache.load_or_rebuild();
    let index = LocalStore::new(root).with_progress(show_progress).scan(&cached)?;
    debug!(files = index.len(), "local index built");
    Ok((index, cache))
}

/// Reconcile the local mirror of a remote with the remote itself,
/// uploading local-only files and downloading remote-only ones. The
/// transfer callbacks log-and-skip per-file failures; identity errors
/// from the engine abort the run.
pub fn sync(config: &Config, store: &mut dyn RemoteStore, dry_run: bool) -> Result<SyncOutcome> {
    let cache_dir = config.cache_dir();
    let base_dir = store.root_policy().base_dir;

    let (local_index, local_cache) = build_local_index(Path::new(&base_dir), &cache_dir, true)?;
    let (remote_index, remote_cache) =
        build_remote_index(&mut *store, &EnumerateOptions::all(), &cache_dir)?;

    let mut reconciler = Reconciler::new();
    if let Some(tolerance) = config.tolerance_secs {
        reconciler = reconciler.with_tolerance(tolerance);
    }

    let mut uploaded = 0usize;
    let mut downloaded = 0usize;
    let mut upload_skips = 0usize;
    let mut download_skips = 0usize;
    let mut bytes_downloaded = 0u64;

    // Remote directories created during this pass, by relative path
    let mut created_dirs: HashMap<String, String> = HashMap::new();

    // Uploads and downloads run inside the classification callbacks; a
    // failed transfer is reported and skipped so one bad file does not
    // block the batch. Both callbacks need the store, hence the RefCell.
    let store = std::cell::RefCell::new(store);
    let report = {
        let mut on_local_only = |record: &FileRecord| {
            if dry_run {
                info!(path = %record.canonical_path, "would upload");
                return;
            }
            let mut store = store.borrow_mut();
            match upload_record(&mut **store, &remote_index, &mut created_dirs, &base_dir, record)
            {
                Ok(id) => {
                    debug!(path = %record.canonical_path, id = %id, "uploaded");
                    uploaded += 1;
                }
                Err(err) => {
                    warn!(path = %record.canonical_path, %err, "upload failed, skipping");
                    upload_skips += 1;
                }
            }
        };
        let mut on_remote_only = |record: &FileRecord| {
            if dry_run {
                info!(path = %record.canonical_path, "would download");
                return;
            }
            let locator = match &record.remote_locator {
                Some(locator) => locator.clone(),
                None => {
                    warn!(path = %record.canonical_path, "record has no locator, skipping");
                    download_skips += 1;
                    return;
                }
            };
            let expected = record.digests().ok().cloned();
            let mut store = store.borrow_mut();
            match store.fetch(&locator, Path::new(&record.canonical_path), expected.as_ref()) {
                Ok(bytes) => {
                    debug!(path = %record.canonical_path, bytes, "downloaded");
                    downloaded += 1;
                    bytes_downloaded += bytes;
                }
                Err(err) => {
                    warn!(path = %record.canonical_path, %err, "download failed, skipping");
                    download_skips += 1;
                }
            }
        };
        reconciler.reconcile(
            &[&local_index, &remote_index],
            &mut on_local_only,
            &mut on_remote_only,
        )?
    };

    // Rewrite both snapshots at the end of the run
    local_cache.write(&local_index)?;
    remote_cache.write(&remote_index)?;

    Ok(SyncOutcome {
        report,
        uploaded,
        downloaded,
        skipped: upload_skips + download_skips,
        bytes_downloaded,
        dry_run,
    })
}

/// Upload one local record, ensuring its remote parent directory chain
/// exists first.
fn upload_record(
    store: &mut dyn RemoteStore,
    remote_index: &FileIndex,
    created_dirs: &mut HashMap<String, String>,
    base_dir: &str,
    record: &FileRecord,
) -> Result<String, SyncError> {
    let relative_dir = record
        .canonical_path
        .strip_prefix(&format!("{}/", base_dir.trim_end_matches('/')))
        .and_then(|rel| rel.rsplit_once('/').map(|(dir, _)| dir))
        .unwrap_or("");

    let parent_id = if relative_dir.is_empty() {
        None
    } else {
        Some(ensure_remote_dir(store, remote_index, created_dirs, relative_dir)?)
    };
    store.store(Path::new(&record.canonical_path), parent_id.as_deref())
}

/// Walk a relative directory path segment by segment, reusing known
/// directories and creating the missing tail.
fn ensure_remote_dir(
    store: &mut dyn RemoteStore,
    remote_index: &FileIndex,
    created_dirs: &mut HashMap<String, String>,
    relative_dir: &str,
) -> Result<String, SyncError> {
    let mut parent: Option<String> = None;
    let mut prefix = String::new();
    for segment in relative_dir.split('/').filter(|s| !s.is_empty()) {
        if prefix.is_empty() {
            prefix = segment.to_string();
        } else {
            prefix = format!("{}/{}", prefix, segment);
        }
        if let Some(id) = created_dirs.get(&prefix) {
            parent = Some(id.clone());
            continue;
        }
        let existing = remote_index
            .directories_for_name(segment)
            .into_iter()
            .find(|d| d.parent_id.as_deref() == parent.as_deref())
            .and_then(|d| d.backend_id.clone());
        let id = match existing {
            Some(id) => id,
            None => store.create_directory(segment, parent.as_deref())?,
        };
        created_dirs.insert(prefix.clone(), id.clone());
        parent = Some(id);
    }
    parent.ok_or_else(|| SyncError::IncompatibleRecord {
        reason: format!("empty directory path {:?}", relative_dir),
    })
}
