// File record module
// The uniform metadata unit shared by every backend

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::index::digest::{self, Digests};

/// Modification time and size, the only stat fields the engine compares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatInfo {
    /// Size in bytes
    pub size: u64,
    /// Modification time, epoch seconds
    pub mtime: i64,
}

impl StatInfo {
    pub fn new(size: u64, mtime: i64) -> Self {
        Self { size, mtime }
    }

    pub fn from_modified(size: u64, modified: DateTime<Utc>) -> Self {
        Self { size, mtime: modified.timestamp() }
    }
}

/// Two-phase digest lifecycle. A record never reaches the hash index or
/// the reconciler while `Pending`; reading a pending digest is an error,
/// not an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashState {
    /// Digests will be computed by `FileIndex::finalize_digests`
    Pending,
    /// Digests are known (possibly empty, for backends that report none)
    Final(Digests),
}

/// Metadata for one file on one backend. `canonical_path` is the identity
/// key within a `FileIndex`; the backend id/parent id fields only carry
/// meaning for hierarchical remotes.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub canonical_path: String,
    pub remote_locator: Option<String>,
    hashes: HashState,
    pub stat: StatInfo,
    pub backend_id: Option<String>,
    pub parent_id: Option<String>,
    pub mime_type: Option<String>,
    pub export_path: Option<String>,
    pub is_root: bool,
}

/// Field count of the serialized cache tuple.
pub const CACHE_TUPLE_ARITY: usize = 10;

impl FileRecord {
    /// Construct from a local path, computing digests and stat eagerly
    /// unless supplied. Fails with `NotFound` when the path is absent.
    pub fn from_local_path(
        path: &Path,
        digests: Option<Digests>,
        stat: Option<StatInfo>,
    ) -> Result<Self, SyncError> {
        if !path.exists() {
            return Err(SyncError::NotFound { path: path.to_path_buf() });
        }
        let canonical_path = path.to_string_lossy().to_string();
        let remote_locator = Some(format!("file://{}", canonical_path));

        let stat = match stat {
            Some(s) => s,
            None => {
                let meta = path.metadata().map_err(|e| {
                    SyncError::from_io_error(e, "reading metadata of", Some(path.to_path_buf()))
                })?;
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                StatInfo::new(meta.len(), mtime)
            }
        };
        let hashes = match digests {
            Some(d) => HashState::Final(d),
            None => HashState::Final(digest::digest_file(path)?.0),
        };

        Ok(Self {
            canonical_path,
            remote_locator,
            hashes,
            stat,
            backend_id: None,
            parent_id: None,
            mime_type: None,
            export_path: None,
            is_root: false,
        })
    }

    /// Construct from a local path with the digest computation deferred to
    /// `FileIndex::finalize_digests`. Stat is still taken eagerly.
    pub fn from_local_path_deferred(path: &Path) -> Result<Self, SyncError> {
        let mut record = Self::from_local_path(path, Some(Digests::default()), None)?;
        record.hashes = HashState::Pending;
        Ok(record)
    }

    /// Construct from fields a backend adapter extracted from an item
    /// payload. The adapter owns the mapping from its wire format.
    pub fn from_parts(
        canonical_path: impl Into<String>,
        remote_locator: Option<String>,
        digests: Digests,
        stat: StatInfo,
    ) -> Self {
        Self {
            canonical_path: canonical_path.into(),
            remote_locator,
            hashes: HashState::Final(digests),
            stat,
            backend_id: None,
            parent_id: None,
            mime_type: None,
            export_path: None,
            is_root: false,
        }
    }

    pub fn with_backend_id(mut self, id: impl Into<String>) -> Self {
        self.backend_id = Some(id.into());
        self
    }

    pub fn with_parent_id(mut self, id: impl Into<String>) -> Self {
        self.parent_id = Some(id.into());
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn with_export_path(mut self, path: impl Into<String>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    pub fn with_is_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// The finalized digests. `PendingDigest` when `finalize_digests`
    /// has not run for this record yet.
    pub fn digests(&self) -> Result<&Digests, SyncError> {
        match &self.hashes {
            HashState::Final(d) => Ok(d),
            HashState::Pending => Err(SyncError::PendingDigest {
                path: self.canonical_path.clone(),
            }),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.hashes, HashState::Pending)
    }

    pub fn set_digests(&mut self, digests: Digests) {
        self.hashes = HashState::Final(digests);
    }

    /// Last segment of the canonical path.
    pub fn base_name(&self) -> &str {
        self.canonical_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.canonical_path)
    }

    /// Serialize to the fixed-arity cache tuple. Pending digests are
    /// written as empty fields; everything else round-trips.
    pub fn to_cache_tuple(&self) -> Vec<String> {
        let empty = Digests::default();
        let digests = match &self.hashes {
            HashState::Final(d) => d,
            HashState::Pending => &empty,
        };
        vec![
            self.canonical_path.clone(),
            self.remote_locator.clone().unwrap_or_default(),
            digests.md5.clone().unwrap_or_default(),
            digests.sha1.clone().unwrap_or_default(),
            self.stat.mtime.to_string(),
            self.stat.size.to_string(),
            self.backend_id.clone().unwrap_or_default(),
            self.parent_id.clone().unwrap_or_default(),
            self.mime_type.clone().unwrap_or_default(),
            self.export_path.clone().unwrap_or_default(),
        ]
    }

    /// Deserialize from a cache tuple. Wrong arity or non-integer stat
    /// fields fail with `InvalidRecord`.
    pub fn from_cache_tuple(fields: &[&str]) -> Result<Self, SyncError> {
        if fields.len() != CACHE_TUPLE_ARITY {
            return Err(SyncError::InvalidRecord {
                reason: format!("expected {} fields, found {}", CACHE_TUPLE_ARITY, fields.len()),
            });
        }
        let mtime: i64 = fields[4].parse().map_err(|_| SyncError::InvalidRecord {
            reason: format!("mtime is not an integer: {:?}", fields[4]),
        })?;
        let size: u64 = fields[5].parse().map_err(|_| SyncError::InvalidRecord {
            reason: format!("size is not an integer: {:?}", fields[5]),
        })?;

        let opt = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };

        Ok(Self {
            canonical_path: fields[0].to_string(),
            remote_locator: opt(fields[1]),
            hashes: HashState::Final(Digests {
                md5: opt(fields[2]),
                sha1: opt(fields[3]),
            }),
            stat: StatInfo::new(size, mtime),
            backend_id: opt(fields[6]),
            parent_id: opt(fields[7]),
            mime_type: opt(fields[8]),
            export_path: opt(fields[9]),
            is_root: false,
        })
    }
}
