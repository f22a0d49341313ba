// File index module
// Multi-index collection of FileRecords for one backend

use std::collections::HashMap;

use crate::error::SyncError;
use crate::index::record::FileRecord;

/// Result of a keyed lookup, most specific index first.
#[derive(Debug)]
pub enum Lookup<'a> {
    /// Key matched a content digest
    ByHash(Vec<&'a FileRecord>),
    /// Key matched a base name
    ByName(Vec<&'a FileRecord>),
    /// Key matched a canonical path
    ByPath(&'a FileRecord),
}

/// In-memory collection of FileRecords with secondary indices by base
/// name and content hash, plus backend-id indices for hierarchical
/// remotes. Directories are tracked separately from the primary map;
/// they never participate in reconciliation.
#[derive(Debug, Default)]
pub struct FileIndex {
    /// canonical path -> record
    records: HashMap<String, FileRecord>,
    /// base name -> canonical paths, insertion order
    by_name: HashMap<String, Vec<String>>,
    /// content digest -> canonical paths; populated by finalize_digests only
    by_hash: HashMap<String, Vec<String>>,
    /// backend id -> canonical path
    by_id: HashMap<String, String>,
    /// parent id -> canonical paths
    by_parent: HashMap<String, Vec<String>>,
    /// backend id -> directory record
    dir_by_id: HashMap<String, FileRecord>,
    /// directory base name -> backend ids, insertion order
    dir_by_name: HashMap<String, Vec<String>>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file record. Re-inserting an existing canonical path
    /// replaces the record and retires its stale secondary entries in the
    /// same call, so readers never observe a partially updated state.
    pub fn insert(&mut self, record: FileRecord) -> Result<(), SyncError> {
        if record.canonical_path.is_empty() {
            return Err(SyncError::IncompatibleRecord {
                reason: "record has no canonical path".to_string(),
            });
        }

        let path = record.canonical_path.clone();
        if let Some(old) = self.records.remove(&path) {
            self.retire_secondary_entries(&old);
        }

        let name = record.base_name().to_string();
        let paths = self.by_name.entry(name).or_default();
        if !paths.contains(&path) {
            paths.push(path.clone());
        }
        if let Some(id) = &record.backend_id {
            self.by_id.insert(id.clone(), path.clone());
        }
        if let Some(pid) = &record.parent_id {
            let siblings = self.by_parent.entry(pid.clone()).or_default();
            if !siblings.contains(&path) {
                siblings.push(path.clone());
            }
        }
        self.records.insert(path, record);
        Ok(())
    }

    /// Track a directory record. Directories live in their own id/name
    /// maps; they are consulted by path resolution and directory
    /// bookkeeping, never by the reconciler.
    pub fn insert_directory(&mut self, record: FileRecord) -> Result<(), SyncError> {
        let id = record.backend_id.clone().ok_or_else(|| SyncError::IncompatibleRecord {
            reason: format!("directory {} has no backend id", record.canonical_path),
        })?;
        let name = record.base_name().to_string();
        let ids = self.dir_by_name.entry(name).or_default();
        if !ids.contains(&id) {
            ids.push(id.clone());
        }
        self.dir_by_id.insert(id, record);
        Ok(())
    }

    fn retire_secondary_entries(&mut self, old: &FileRecord) {
        let path = &old.canonical_path;
        retire_from(&mut self.by_name, old.base_name(), path);
        if let Ok(digests) = old.digests() {
            for digest in digests.iter() {
                retire_from(&mut self.by_hash, digest, path);
            }
        }
        if let Some(id) = &old.backend_id {
            self.by_id.remove(id);
        }
        if let Some(pid) = &old.parent_id {
            retire_from(&mut self.by_parent, pid, path);
        }
    }

    /// Resolve every pending digest, then rebuild the hash index.
    /// Rebuilding from the primary map makes this idempotent: a second
    /// call finds nothing pending and reproduces the same index.
    pub fn finalize_digests(&mut self) -> Result<(), SyncError> {
        self.finalize_digests_with(|_| {})
    }

    /// `finalize_digests` with a per-file callback, invoked before each
    /// pending digest computation (progress reporting).
    pub fn finalize_digests_with(
        &mut self,
        mut on_file: impl FnMut(&str),
    ) -> Result<(), SyncError> {
        let mut pending: Vec<String> = self
            .records
            .values()
            .filter(|r| r.is_pending())
            .map(|r| r.canonical_path.clone())
            .collect();
        pending.sort();

        for path in pending {
            on_file(&path);
            let (digests, _) = crate::index::digest::digest_file(std::path::Path::new(&path))?;
            if let Some(record) = self.records.get_mut(&path) {
                record.set_digests(digests);
            }
        }

        self.by_hash.clear();
        for record in self.records.values() {
            let digests = record.digests()?;
            for digest in digests.iter() {
                self.by_hash
                    .entry(digest.to_string())
                    .or_default()
                    .push(record.canonical_path.clone());
            }
        }
        for paths in self.by_hash.values_mut() {
            paths.sort();
        }
        Ok(())
    }

    /// Number of records still awaiting digest computation.
    pub fn pending_count(&self) -> usize {
        self.records.values().filter(|r| r.is_pending()).count()
    }

    /// Adopt digests from a cached snapshot: a pending record whose size
    /// and mtime are unchanged reuses the cached digests and skips
    /// rehashing. Live records win whenever size or digest differ, and
    /// cached entries for paths the live scan did not produce are dropped.
    pub fn reuse_digests_from(&mut self, cached: &[FileRecord]) {
        let mut by_path: HashMap<&str, &FileRecord> = HashMap::new();
        for rec in cached {
            by_path.insert(rec.canonical_path.as_str(), rec);
        }
        for record in self.records.values_mut() {
            if !record.is_pending() {
                continue;
            }
            if let Some(old) = by_path.get(record.canonical_path.as_str()) {
                if old.stat == record.stat {
                    if let Ok(digests) = old.digests() {
                        if !digests.is_empty() {
                            record.set_digests(digests.clone());
                        }
                    }
                }
            }
        }
    }

    /// Keyed lookup: hash index first (most specific identity signal),
    /// then base name, then canonical path.
    pub fn lookup(&self, key: &str) -> Option<Lookup<'_>> {
        if let Some(paths) = self.by_hash.get(key) {
            return Some(Lookup::ByHash(self.resolve_paths(paths)));
        }
        if let Some(paths) = self.by_name.get(key) {
            return Some(Lookup::ByName(self.resolve_paths(paths)));
        }
        self.records.get(key).map(Lookup::ByPath)
    }

    fn resolve_paths(&self, paths: &[String]) -> Vec<&FileRecord> {
        paths.iter().filter_map(|p| self.records.get(p)).collect()
    }

    pub fn get(&self, canonical_path: &str) -> Option<&FileRecord> {
        self.records.get(canonical_path)
    }

    pub fn get_by_id(&self, backend_id: &str) -> Option<&FileRecord> {
        self.by_id
            .get(backend_id)
            .and_then(|p| self.records.get(p))
    }

    /// Records sharing a base name, insertion order.
    pub fn records_for_name(&self, name: &str) -> Vec<&FileRecord> {
        self.by_name
            .get(name)
            .map(|paths| self.resolve_paths(paths))
            .unwrap_or_default()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn contains_hash(&self, digest: &str) -> bool {
        self.by_hash.contains_key(digest)
    }

    /// Children of one remote directory.
    pub fn records_for_parent(&self, parent_id: &str) -> Vec<&FileRecord> {
        self.by_parent
            .get(parent_id)
            .map(|paths| self.resolve_paths(paths))
            .unwrap_or_default()
    }

    pub fn directory_by_id(&self, id: &str) -> Option<&FileRecord> {
        self.dir_by_id.get(id)
    }

    /// Directory records sharing a base name, insertion order.
    pub fn directories_for_name(&self, name: &str) -> Vec<&FileRecord> {
        self.dir_by_name
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.dir_by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// A record an ancestor walk can start from: files first, then
    /// directories.
    pub fn any_by_id(&self, id: &str) -> Option<&FileRecord> {
        self.get_by_id(id).or_else(|| self.directory_by_id(id))
    }

    /// Sorted base names, for deterministic reconciliation order.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn name_count(&self) -> usize {
        self.by_name.len()
    }

    pub fn hash_count(&self) -> usize {
        self.by_hash.len()
    }

    pub fn directory_count(&self) -> usize {
        self.dir_by_id.len()
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn directories(&self) -> impl Iterator<Item = &FileRecord> {
        self.dir_by_id.values()
    }

    /// Records in canonical-path order, for stable serialization.
    pub fn sorted_records(&self) -> Vec<&FileRecord> {
        let mut records: Vec<&FileRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.canonical_path.cmp(&b.canonical_path));
        records
    }
}

/// Drop one path from a keyed path-list index, removing the key when its
/// list empties.
fn retire_from(index: &mut HashMap<String, Vec<String>>, key: &str, path: &str) {
    let emptied = match index.get_mut(key) {
        Some(paths) => {
            paths.retain(|p| p != path);
            paths.is_empty()
        }
        None => false,
    };
    if emptied {
        index.remove(key);
    }
}
