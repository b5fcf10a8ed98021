//! Change detection between the document source and the index.
//!
//! Compares the current document listing against the `path → fingerprint`
//! map recorded in the index and splits paths into three disjoint sets:
//! reindex, delete, and unchanged. The builder is pure; identical inputs
//! always produce identical (sorted) outputs.
//!
//! # Fingerprints
//!
//! A fingerprint hashes `(last_modified, size_bytes)` and never reads the
//! document body. Listing a thousand notes stays cheap, at the cost that an
//! edit which keeps both the size and the modification time (at the
//! filesystem's timestamp resolution) goes unnoticed until the next edit.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::models::DocumentMeta;

/// Result of comparing the current documents against the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// New or changed paths, each with its freshly computed fingerprint.
    pub to_reindex: Vec<(String, String)>,
    /// Paths recorded in the index that no longer exist in the source.
    pub to_delete: Vec<String>,
    /// Paths whose fingerprint matches the recorded one.
    pub unchanged: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.to_reindex.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute the metadata fingerprint of a document.
///
/// SHA-256 over `"{unix_micros}:{size_bytes}"`, hex encoded.
pub fn fingerprint(last_modified: DateTime<Utc>, size_bytes: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", last_modified.timestamp_micros(), size_bytes).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Build the change set for an incremental sync.
pub fn build_change_set(current: &[DocumentMeta], indexed: &BTreeMap<String, String>) -> ChangeSet {
    let mut by_path: BTreeMap<&str, &DocumentMeta> = BTreeMap::new();
    for doc in current {
        by_path.insert(doc.path.as_str(), doc);
    }

    let mut set = ChangeSet::default();

    for (path, doc) in &by_path {
        let fp = fingerprint(doc.last_modified, doc.size_bytes);
        match indexed.get(*path) {
            Some(recorded) if *recorded == fp => set.unchanged.push(path.to_string()),
            _ => set.to_reindex.push((path.to_string(), fp)),
        }
    }

    let current_paths: BTreeSet<&str> = by_path.keys().copied().collect();
    set.to_delete = indexed
        .keys()
        .filter(|p| !current_paths.contains(p.as_str()))
        .cloned()
        .collect();

    set
}

/// Build a change set that reindexes every current document.
///
/// Used for `sync --full` and after an embedding model change.
pub fn build_change_set_full(
    current: &[DocumentMeta],
    indexed: &BTreeMap<String, String>,
) -> ChangeSet {
    let mut set = build_change_set(current, indexed);
    let mut unchanged = std::mem::take(&mut set.unchanged);
    if unchanged.is_empty() {
        return set;
    }
    let lookup: BTreeMap<&str, &DocumentMeta> =
        current.iter().map(|d| (d.path.as_str(), d)).collect();
    for path in unchanged.drain(..) {
        if let Some(doc) = lookup.get(path.as_str()) {
            set.to_reindex
                .push((path.clone(), fingerprint(doc.last_modified, doc.size_bytes)));
        }
    }
    set.to_reindex.sort();
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(path: &str, secs: i64, size: u64) -> DocumentMeta {
        DocumentMeta {
            path: path.to_string(),
            last_modified: Utc.timestamp_opt(secs, 0).unwrap(),
            size_bytes: size,
        }
    }

    fn indexed_from(docs: &[DocumentMeta]) -> BTreeMap<String, String> {
        docs.iter()
            .map(|d| (d.path.clone(), fingerprint(d.last_modified, d.size_bytes)))
            .collect()
    }

    #[test]
    fn test_fingerprint_stable_and_metadata_sensitive() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(fingerprint(t, 10), fingerprint(t, 10));
        assert_ne!(fingerprint(t, 10), fingerprint(t, 11));
        let later = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        assert_ne!(fingerprint(t, 10), fingerprint(later, 10));
        assert_eq!(fingerprint(t, 10).len(), 64);
    }

    #[test]
    fn test_subsecond_mtime_changes_fingerprint() {
        let a = Utc.timestamp_opt(1_700_000_000, 1_000).unwrap();
        let b = Utc.timestamp_opt(1_700_000_000, 5_000).unwrap();
        assert_ne!(fingerprint(a, 10), fingerprint(b, 10));
    }

    #[test]
    fn test_empty_index_reindexes_everything() {
        let current = vec![doc("b.md", 2, 20), doc("a.md", 1, 10)];
        let set = build_change_set(&current, &BTreeMap::new());
        let paths: Vec<&str> = set.to_reindex.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "b.md"]);
        assert!(set.to_delete.is_empty());
        assert!(set.unchanged.is_empty());
    }

    #[test]
    fn test_detects_changed_new_deleted_unchanged() {
        let old = vec![doc("keep.md", 1, 10), doc("edit.md", 1, 10), doc("gone.md", 1, 10)];
        let indexed = indexed_from(&old);
        let current = vec![doc("keep.md", 1, 10), doc("edit.md", 5, 12), doc("new.md", 3, 7)];

        let set = build_change_set(&current, &indexed);
        let reindex: Vec<&str> = set.to_reindex.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(reindex, vec!["edit.md", "new.md"]);
        assert_eq!(set.to_delete, vec!["gone.md".to_string()]);
        assert_eq!(set.unchanged, vec!["keep.md".to_string()]);
        assert_eq!(set.to_reindex[0].1, fingerprint(current[1].last_modified, 12));
    }

    #[test]
    fn test_sets_are_disjoint() {
        let indexed = indexed_from(&[doc("a.md", 1, 1), doc("b.md", 1, 1)]);
        let current = vec![doc("a.md", 1, 1), doc("c.md", 1, 1)];
        let set = build_change_set(&current, &indexed);
        let mut all: Vec<String> = set.to_reindex.iter().map(|(p, _)| p.clone()).collect();
        all.extend(set.to_delete.clone());
        all.extend(set.unchanged.clone());
        let unique: BTreeSet<&String> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn test_deterministic_regardless_of_listing_order() {
        let indexed = indexed_from(&[doc("x.md", 1, 1)]);
        let a = build_change_set(&[doc("m.md", 1, 1), doc("c.md", 2, 2)], &indexed);
        let b = build_change_set(&[doc("c.md", 2, 2), doc("m.md", 1, 1)], &indexed);
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_changes_is_empty() {
        let current = vec![doc("a.md", 1, 1)];
        let set = build_change_set(&current, &indexed_from(&current));
        assert!(set.is_empty());
        assert_eq!(set.unchanged.len(), 1);
    }

    #[test]
    fn test_full_marks_unchanged_for_reindex() {
        let current = vec![doc("a.md", 1, 1), doc("b.md", 2, 2)];
        let mut indexed = indexed_from(&current);
        indexed.insert("old.md".into(), "ff".into());
        let set = build_change_set_full(&current, &indexed);
        assert_eq!(set.to_reindex.len(), 2);
        assert!(set.unchanged.is_empty());
        assert_eq!(set.to_delete, vec!["old.md".to_string()]);
    }
}
