//! Before/after comparison of two checksum snapshots.

use std::collections::BTreeSet;

use super::ChecksumMap;

/// Paths that changed between two snapshots of the same directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumDiff {
    /// Present after but not before.
    pub new: BTreeSet<String>,
    /// Present before but not after.
    pub deleted: BTreeSet<String>,
    /// Present in both with a different checksum.
    pub modified: BTreeSet<String>,
}

impl ChecksumDiff {
    /// Compares `before` against `after` by key-set arithmetic.
    pub fn between(before: &ChecksumMap, after: &ChecksumMap) -> Self {
        let mut diff = Self::default();

        for (path, checksum) in after.iter() {
            match before.get(path) {
                None => {
                    diff.new.insert(path.to_string());
                }
                Some(previous) if previous != checksum => {
                    diff.modified.insert(path.to_string());
                }
                Some(_) => {}
            }
        }

        diff.deleted = before
            .paths()
            .filter(|path| !after.contains(path))
            .map(str::to_string)
            .collect();

        diff
    }

    /// New and modified paths: everything that has to be pushed back.
    pub fn changed(&self) -> BTreeSet<String> {
        self.new.union(&self.modified).cloned().collect()
    }

    /// Returns true if nothing was added, removed or modified.
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }

    /// The deleted paths as newline-separated text, in sorted order.
    pub fn deleted_manifest(&self) -> String {
        self.deleted
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
