// Path resolution module
// Derives canonical local-style paths for hierarchical remotes by
// walking parent-id chains

use std::collections::HashSet;

use tracing::debug;

use crate::error::SyncError;
use crate::index::file_index::FileIndex;
use crate::index::record::FileRecord;

/// Backend-specific termination and rewrite rules for a parent walk.
#[derive(Debug, Clone, Default)]
pub struct RootPolicy {
    /// Parent ids that mean "top of the drive" without a record of their
    /// own (empty string, "0", "root", ...)
    pub root_ids: Vec<String>,
    /// Display name of the drive root folder, e.g. "My Drive"
    pub drive_root_name: Option<String>,
    /// Local directory the drive root maps onto
    pub base_dir: String,
}

impl RootPolicy {
    pub fn new(base_dir: impl Into<String>) -> Self {
        Self {
            root_ids: Vec::new(),
            drive_root_name: None,
            base_dir: base_dir.into(),
        }
    }

    pub fn with_root_ids(mut self, ids: &[&str]) -> Self {
        self.root_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_drive_root_name(mut self, name: impl Into<String>) -> Self {
        self.drive_root_name = Some(name.into());
        self
    }

    fn is_root_id(&self, id: &str) -> bool {
        self.root_ids.iter().any(|r| r == id)
    }
}

/// Callback used to fetch a missing ancestor by backend id. `Ok(None)`
/// means the backend does not know the id either.
pub type FetchAncestor<'a> =
    dyn FnMut(&str) -> Result<Option<FileRecord>, SyncError> + 'a;

/// Walks `parent_id` chains over a FileIndex's backend-id maps, fetching
/// unknown ancestors on demand. Fetched directories are inserted into the
/// index so later resolutions reuse them.
pub struct PathResolver {
    policy: RootPolicy,
}

impl PathResolver {
    pub fn new(policy: RootPolicy) -> Self {
        Self { policy }
    }

    /// Canonical path for a record: resolved parent directory plus the
    /// record's own base name.
    pub fn resolve(
        &self,
        index: &mut FileIndex,
        record: &FileRecord,
        fetch: &mut FetchAncestor<'_>,
    ) -> Result<String, SyncError> {
        let dir = self.resolve_parent_dir(index, record, fetch)?;
        Ok(format!("{}/{}", dir, record.base_name()))
    }

    /// Directory path containing a record, rooted at the configured base
    /// directory. Iterative walk; a repeated id within one resolution is
    /// a cycle and fails as `OrphanedRecord` instead of looping.
    pub fn resolve_parent_dir(
        &self,
        index: &mut FileIndex,
        record: &FileRecord,
        fetch: &mut FetchAncestor<'_>,
    ) -> Result<String, SyncError> {
        let mut segments: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut next = record.parent_id.clone();

        while let Some(pid) = next {
            if pid.is_empty() || self.policy.is_root_id(&pid) {
                break;
            }
            if !visited.insert(pid.clone()) {
                return Err(SyncError::OrphanedRecord {
                    id: pid,
                    context: format!("cycle while resolving {}", record.canonical_path),
                });
            }

            let known = index.any_by_id(&pid).cloned();
            let parent = match known {
                Some(parent) => parent,
                None => {
                    debug!(id = %pid, "fetching unknown ancestor");
                    match fetch(&pid)? {
                        Some(fetched) => {
                            index.insert_directory(fetched.clone())?;
                            fetched
                        }
                        None => {
                            return Err(SyncError::OrphanedRecord {
                                id: pid,
                                context: format!(
                                    "unresolvable ancestor of {}",
                                    record.canonical_path
                                ),
                            });
                        }
                    }
                }
            };

            segments.push(parent.base_name().to_string());
            if parent.is_root {
                break;
            }
            next = parent.parent_id.clone();
        }

        segments.reverse();
        Ok(self.rewrite_root(segments))
    }

    /// Join segments and replace the backend's drive-root name with the
    /// configured base directory; chains that never reach a named root
    /// are anchored at the base directory.
    fn rewrite_root(&self, segments: Vec<String>) -> String {
        let base = self.policy.base_dir.trim_end_matches('/');
        let joined = segments.join("/");
        match &self.policy.drive_root_name {
            Some(root) if joined == *root => base.to_string(),
            Some(root) if joined.starts_with(&format!("{}/", root)) => {
                format!("{}{}", base, &joined[root.len()..])
            }
            _ if joined.is_empty() => base.to_string(),
            _ => format!("{}/{}", base, joined),
        }
    }
}

/// Collapse the doubled extension some backends produce when exporting a
/// converted document ("report.pdf.pdf" -> "report.pdf"). Naming policy
/// for callers feeding the reconciler, not an identity rule.
pub fn collapse_export_suffix(name: &str) -> String {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() >= 3 {
        let last = parts[parts.len() - 1];
        let prev = parts[parts.len() - 2];
        if !last.is_empty() && last == prev {
            return parts[..parts.len() - 1].join(".");
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_export_suffix() {
        assert_eq!(collapse_export_suffix("report.pdf.pdf"), "report.pdf");
        assert_eq!(collapse_export_suffix("report.pdf"), "report.pdf");
        assert_eq!(collapse_export_suffix("archive.tar.gz"), "archive.tar.gz");
        assert_eq!(collapse_export_suffix("noext"), "noext");
        assert_eq!(collapse_export_suffix("a.b.b.b"), "a.b.b");
    }
}
