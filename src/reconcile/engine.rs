// Reconcile engine module
// Pairwise diff over FileIndexes with hash-equality and mtime-skew heuristics

use tracing::debug;

use crate::error::SyncError;
use crate::index::resolver::collapse_export_suffix;
use crate::index::{FileIndex, FileRecord};

/// Default modification-time skew tolerance: twelve hours, absorbing
/// backend clock and timezone differences.
pub const DEFAULT_SKEW_TOLERANCE_SECS: i64 = 12 * 3600;

/// Hook consulted before classifying a record as "only in A": returns
/// true when an equivalent is already materialized in the other index
/// under a different name.
pub type NamingEquivalence = dyn Fn(&FileRecord, &FileIndex) -> bool;

/// Classification summary of one reconcile pass.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReconcileReport {
    pub files_a: usize,
    pub files_b: usize,
    /// Canonical paths emitted through the A-only callback
    pub a_only: Vec<String>,
    /// Canonical paths emitted through the B-only callback
    pub b_only: Vec<String>,
    /// Subset of `a_only` classified "present in both, A is newer"
    pub newer_in_a: Vec<String>,
    /// Names whose content matched (or stayed inside the tolerance)
    pub matched: usize,
    /// A-only candidates suppressed by the naming-equivalence check
    pub suppressed_by_name: usize,
}

impl ReconcileReport {
    pub fn transfer_count(&self) -> usize {
        self.a_only.len() + self.b_only.len()
    }

    /// Plain text rendering of the report.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        out.push_str("\n=== Reconcile Report ===\n\n");
        out.push_str("Summary:\n");
        out.push_str(&format!("  Index A:    {} files\n", self.files_a));
        out.push_str(&format!("  Index B:    {} files\n", self.files_b));
        out.push_str(&format!("  Matched:    {} names\n", self.matched));
        out.push_str(&format!("  Only in A:  {} files\n", self.a_only.len()));
        out.push_str(&format!("  Only in B:  {} files\n", self.b_only.len()));
        out.push_str(&format!("  A newer:    {} files\n", self.newer_in_a.len()));
        if self.suppressed_by_name > 0 {
            out.push_str(&format!(
                "  Suppressed by naming equivalence: {}\n",
                self.suppressed_by_name
            ));
        }
        if !self.a_only.is_empty() {
            out.push_str("\nOnly in A (candidates to transfer A -> B):\n");
            for path in &self.a_only {
                out.push_str(&format!("  {}\n", path));
            }
        }
        if !self.b_only.is_empty() {
            out.push_str("\nOnly in B (candidates to transfer B -> A):\n");
            for path in &self.b_only {
                out.push_str(&format!("  {}\n", path));
            }
        }
        out.push('\n');
        out
    }

    /// JSON rendering of the report.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// State-free diff over two or more FileIndexes. Index 0 is compared
/// against each of the others in turn.
///
/// Tie-break policy: identical hashes always suppress a transfer
/// regardless of time skew; a newer modification time (beyond the
/// tolerance) wins when hashes differ; a file present on one side only
/// is always a candidate unless the naming-equivalence check objects.
pub struct Reconciler {
    tolerance_secs: i64,
    naming_equivalence: Option<Box<NamingEquivalence>>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    /// Reconciler with the default twelve-hour tolerance and the
    /// export-suffix naming check.
    pub fn new() -> Self {
        Self {
            tolerance_secs: DEFAULT_SKEW_TOLERANCE_SECS,
            naming_equivalence: Some(Box::new(export_suffix_equivalent)),
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Replace the naming-equivalence hook; `None` disables it.
    pub fn with_naming_equivalence(
        mut self,
        check: Option<Box<NamingEquivalence>>,
    ) -> Self {
        self.naming_equivalence = check;
        self
    }

    pub fn tolerance_secs(&self) -> i64 {
        self.tolerance_secs
    }

    /// Compare index 0 against each other index, invoking `on_a_only`
    /// for records missing (or stale) on the other side and `on_b_only`
    /// for records only the other side has. Callbacks receive the first
    /// record of a base-name group and their outcome is not interpreted
    /// here; transfer, dry-run and idempotence are the callback's
    /// business. Fewer than two indexes is a no-op.
    pub fn reconcile(
        &self,
        indexes: &[&FileIndex],
        on_a_only: &mut dyn FnMut(&FileRecord),
        on_b_only: &mut dyn FnMut(&FileRecord),
    ) -> Result<ReconcileReport, SyncError> {
        let mut report = ReconcileReport::default();
        if indexes.len() < 2 {
            return Ok(report);
        }
        let a = indexes[0];
        report.files_a = a.len();
        report.files_b = indexes[1..].iter().map(|i| i.len()).sum();

        for name in a.sorted_names() {
            let group = a.records_for_name(name);
            let rec_a = match group.first() {
                Some(r) => *r,
                None => continue,
            };
            let dig_a = rec_a.digests()?;
            let t_a = rec_a.stat.mtime;

            for b in &indexes[1..] {
                if !b.contains_name(name) {
                    if self.is_naming_equivalent(rec_a, b) {
                        debug!(name, "equivalent already present under a different name");
                        report.suppressed_by_name += 1;
                        continue;
                    }
                    report.a_only.push(rec_a.canonical_path.clone());
                    on_a_only(rec_a);
                    continue;
                }

                // The hash index is the most reliable identity signal:
                // content present anywhere in B suppresses the transfer.
                if dig_a.iter().any(|d| b.contains_hash(d)) {
                    report.matched += 1;
                    continue;
                }

                let group_b = b.records_for_name(name);
                let rec_b = match group_b.first() {
                    Some(r) => *r,
                    None => continue,
                };
                let dig_b = rec_b.digests()?;
                if !dig_a.matches(dig_b) && t_a > rec_b.stat.mtime + self.tolerance_secs {
                    debug!(
                        name,
                        a = %rec_a.canonical_path,
                        b = %rec_b.canonical_path,
                        mtime_a = t_a,
                        mtime_b = rec_b.stat.mtime,
                        "content differs and A is newer"
                    );
                    report.newer_in_a.push(rec_a.canonical_path.clone());
                    report.a_only.push(rec_a.canonical_path.clone());
                    on_a_only(rec_a);
                } else {
                    if !dig_a.matches(dig_b) {
                        // Concurrent edits inside the window have no
                        // principled winner; flag them, don't resolve.
                        debug!(name, "content differs inside skew tolerance, leaving both sides");
                    }
                    report.matched += 1;
                }
            }
        }

        for b in &indexes[1..] {
            for name in b.sorted_names() {
                if a.contains_name(name) {
                    continue;
                }
                let group = b.records_for_name(name);
                if let Some(rec_b) = group.first() {
                    report.b_only.push(rec_b.canonical_path.clone());
                    on_b_only(rec_b);
                }
            }
        }

        Ok(report)
    }

    fn is_naming_equivalent(&self, record: &FileRecord, other: &FileIndex) -> bool {
        match &self.naming_equivalence {
            Some(check) => check(record, other),
            None => false,
        }
    }
}

/// Default naming-equivalence check: a doubled export suffix collapses to
/// a name the other index already has.
fn export_suffix_equivalent(record: &FileRecord, other: &FileIndex) -> bool {
    let collapsed = collapse_export_suffix(record.base_name());
    collapsed != record.base_name() && other.contains_name(&collapsed)
}
