// Snapshot cache module
// Persists one FileIndex as a gzip-compressed, line-oriented file

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::error::SyncError;
use crate::index::record::FileRecord;
use crate::index::FileIndex;

/// Schema tag written in the header line. Caches with any other tag are
/// rejected and rebuilt rather than misparsed.
pub const CACHE_SCHEMA: &str = "DRIFT-CACHE-1";

const FIELD_LIST: &str =
    "path,locator,md5,sha1,mtime,size,backend_id,parent_id,mime_type,export_path";

/// Durability shadow of exactly one FileIndex. One cache file per backend
/// kind, `.<kind>_file_list_cache.gz` under the configured cache
/// directory, written with a temp-file + atomic-rename discipline.
pub struct SnapshotCache {
    path: PathBuf,
    kind: String,
}

impl SnapshotCache {
    /// Conventionally named cache file under `cache_dir`.
    pub fn new(cache_dir: &Path, kind: &str) -> Self {
        Self {
            path: cache_dir.join(format!(".{}_file_list_cache.gz", kind)),
            kind: kind.to_string(),
        }
    }

    /// Cache at an explicit path (tests, unusual layouts).
    pub fn with_path(path: PathBuf, kind: &str) -> Self {
        Self { path, kind: kind.to_string() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached records. An absent file is an empty collection; a
    /// wrong schema tag or malformed tuple is an error, so the caller can
    /// fall back to a full rescan.
    pub fn load(&self) -> Result<Vec<FileRecord>, SyncError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .map_err(|e| SyncError::from_io_error(e, "opening cache", Some(self.path.clone())))?;
        let reader = BufReader::new(GzDecoder::new(file));

        let mut records = Vec::new();
        let mut header_seen = false;
        for line in reader.lines() {
            let line = line.map_err(|e| {
                SyncError::from_io_error(e, "reading cache", Some(self.path.clone()))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            if !header_seen {
                header_seen = true;
                self.check_header(&line)?;
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            records.push(FileRecord::from_cache_tuple(&fields)?);
        }
        Ok(records)
    }

    /// Load, degrading to an empty collection (plus a warning) when the
    /// cache is unreadable, stale-schema or corrupt. The next write
    /// rebuilds it.
    pub fn load_or_rebuild(&self) -> Vec<FileRecord> {
        match self.load() {
            Ok(records) => records,
            Err(err) => {
                warn!(cache = %self.path.display(), %err, "cache unusable, starting empty");
                Vec::new()
            }
        }
    }

    fn check_header(&self, line: &str) -> Result<(), SyncError> {
        let mut parts = line.split_whitespace();
        let marker = parts.next().unwrap_or("");
        let schema = parts.next().unwrap_or("");
        let kind = parts.next().unwrap_or("");
        if marker != "%%%%" || schema != CACHE_SCHEMA {
            return Err(SyncError::CacheSchema {
                path: self.path.clone(),
                found: line.chars().take(64).collect(),
            });
        }
        if kind != self.kind {
            return Err(SyncError::CacheSchema {
                path: self.path.clone(),
                found: format!("backend kind {:?}, expected {:?}", kind, self.kind),
            });
        }
        Ok(())
    }

    /// Rewrite the cache from an index. Records are written in canonical
    /// path order to `<path>.tmp`, then renamed over the old file, so a
    /// crash mid-write never corrupts the committed cache.
    pub fn write(&self, index: &FileIndex) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SyncError::from_io_error(e, "creating cache directory", Some(parent.to_path_buf()))
            })?;
        }
        let tmp = self.path.with_extension("gz.tmp");
        let file = File::create(&tmp)
            .map_err(|e| SyncError::from_io_error(e, "creating cache", Some(tmp.clone())))?;
        let mut writer = BufWriter::new(GzEncoder::new(file, Compression::default()));

        writeln!(writer, "%%%% {} {} {}", CACHE_SCHEMA, self.kind, FIELD_LIST)
            .map_err(|e| SyncError::from_io_error(e, "writing cache", Some(tmp.clone())))?;

        for record in index.sorted_records() {
            let tuple = record.to_cache_tuple();
            if tuple.iter().any(|f| f.contains('\t') || f.contains('\n')) {
                warn!(path = %record.canonical_path, "skipping uncacheable record");
                continue;
            }
            writeln!(writer, "{}", tuple.join("\t"))
                .map_err(|e| SyncError::from_io_error(e, "writing cache", Some(tmp.clone())))?;
        }

        writer
            .into_inner()
            .map_err(|e| {
                SyncError::from_io_error(e.into_error(), "flushing cache", Some(tmp.clone()))
            })?
            .finish()
            .map_err(|e| SyncError::from_io_error(e, "finalizing cache", Some(tmp.clone())))?;

        fs::rename(&tmp, &self.path)
            .map_err(|e| SyncError::from_io_error(e, "committing cache", Some(self.path.clone())))?;
        Ok(())
    }
}
