//! # Checksum Manifest & Differ
//!
//! Per-file checksums of a dataset directory, an aggregate checksum over
//! them, and the set difference between two manifests. `same` is the fast
//! path that only looks at the recorded archive checksums.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::info;

use crate::archive::collect_entries;
use crate::config::keys;
use crate::error::{ArchiverError, Result};
use crate::extract::{extract_dataset_archive, read_archive_metadata};
use crate::fsx;
use crate::hash::{md5_file, ContentHasher};
use crate::meta::{load_metadata, metadata_path, Metadata};

/// Relative posix path -> content checksum.
pub type ChecksumMap = BTreeMap<String, String>;

/// Path -> (checksum in A, checksum in B); `None` marks a side without the file.
pub type ChecksumDiff = BTreeMap<String, (Option<String>, Option<String>)>;

/// Checksums of every regular file under `dir`, the root `meta.json` excluded.
pub fn manifest(dir: &Path) -> Result<ChecksumMap> {
    let mut map = ChecksumMap::new();
    for entry in collect_entries(dir)? {
        if entry.is_directory {
            continue;
        }
        let checksum = md5_file(&entry.absolute_path)?;
        map.insert(entry.relative_path, checksum);
    }
    Ok(map)
}

/// A single checksum over (path, checksum) pairs, sorted by path first.
pub fn aggregate<I, K, V>(entries: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(K, V)> = entries.into_iter().collect();
    pairs.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));

    let mut hasher = ContentHasher::new();
    for (path, checksum) in &pairs {
        hasher.update(path.as_ref());
        hasher.update(checksum.as_ref());
    }
    hasher.finish_hex()
}

/// Every path whose checksum differs between `a` and `b`, including paths
/// present on one side only.
pub fn diff(a: &ChecksumMap, b: &ChecksumMap) -> ChecksumDiff {
    let paths: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    paths
        .into_iter()
        .filter_map(|key| {
            let left = a.get(key);
            let right = b.get(key);
            (left != right).then(|| (key.clone(), (left.cloned(), right.cloned())))
        })
        .collect()
}

/// Compares the recorded `checksum` fields only. Records without one are never the same.
pub fn same(a: &Metadata, b: &Metadata) -> bool {
    match (a.checksum(), b.checksum()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Verdict of a quick check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Same,
    Different,
}

/// Loads the metadata of a dataset directory or of a final archive file.
///
/// The record must carry a string `checksum`.
pub fn load_comparable_metadata(path: &Path) -> Result<Metadata> {
    let is_archive = fsx::metadata(path)
        .map_err(|e| ArchiverError::unreadable(path, e))?
        .is_file();
    let (metadata, origin) = if is_archive {
        (read_archive_metadata(path)?, path.to_path_buf())
    } else {
        (load_metadata(path)?, metadata_path(path))
    };
    metadata.require_str(keys::CHECKSUM, &origin)?;
    Ok(metadata)
}

/// Quick equality check of two datasets or archives through their metadata.
///
/// A mismatch is a regular outcome; only structural problems are errors.
pub fn check_datasets(a: &Path, b: &Path) -> Result<CheckOutcome> {
    let meta_a = load_comparable_metadata(a)?;
    let meta_b = load_comparable_metadata(b)?;
    let outcome = if same(&meta_a, &meta_b) {
        CheckOutcome::Same
    } else {
        CheckOutcome::Different
    };
    info!(a = %a.display(), b = %b.display(), ?outcome, "checked");
    Ok(outcome)
}

/// Detailed per-file comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    pub aggregate_a: String,
    pub aggregate_b: String,
    pub differences: ChecksumDiff,
}

impl DiffReport {
    pub fn is_identical(&self) -> bool {
        self.differences.is_empty()
    }
}

/// Manifest of a dataset directory, or of a final archive extracted into a
/// temporary directory first.
pub fn manifest_of(path: &Path) -> Result<ChecksumMap> {
    let is_archive = fsx::metadata(path)
        .map_err(|e| ArchiverError::unreadable(path, e))?
        .is_file();
    if !is_archive {
        return manifest(path);
    }
    let scratch = tempfile::Builder::new()
        .prefix("dataset-archiver-")
        .tempdir()
        .map_err(|e| ArchiverError::io(std::env::temp_dir(), e))?;
    let extracted = extract_dataset_archive(path, scratch.path())?;
    manifest(&extracted)
}

pub fn diff_datasets(a: &Path, b: &Path) -> Result<DiffReport> {
    let map_a = manifest_of(a)?;
    let map_b = manifest_of(b)?;
    Ok(DiffReport {
        aggregate_a: aggregate(&map_a),
        aggregate_b: aggregate(&map_b),
        differences: diff(&map_a, &map_b),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::md5_bytes;
    use tempfile::tempdir;

    fn write(path: &Path, data: &[u8]) {
        if let Some(parent) = path.parent() {
            fsx::create_dir_all(parent).unwrap();
        }
        fsx::write(path, data).unwrap();
    }

    fn map(pairs: &[(&str, &str)]) -> ChecksumMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_manifest_scenario() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("a.txt"), b"x");
        write(&dir.path().join("b").join("c.txt"), b"y");
        write(&dir.path().join("meta.json"), b"{}");

        let before = manifest(dir.path()).unwrap();
        assert_eq!(
            before,
            map(&[
                ("a.txt", md5_bytes(b"x").as_str()),
                ("b/c.txt", md5_bytes(b"y").as_str())
            ])
        );

        write(&dir.path().join("b").join("c.txt"), b"z");
        let after = manifest(dir.path()).unwrap();
        assert_eq!(after["a.txt"], before["a.txt"]);

        let d = diff(&before, &after);
        assert_eq!(d.len(), 1);
        assert_eq!(
            d["b/c.txt"],
            (Some(md5_bytes(b"y")), Some(md5_bytes(b"z")))
        );
    }

    #[test]
    fn test_nested_meta_json_is_data() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("sub").join("meta.json"), b"{}");
        let m = manifest(dir.path()).unwrap();
        assert!(m.contains_key("sub/meta.json"));
    }

    #[test]
    fn test_diff_one_sided() {
        let a = map(&[("only_a", "1"), ("both", "2")]);
        let b = map(&[("both", "2"), ("only_b", "3")]);
        let d = diff(&a, &b);
        assert_eq!(d.len(), 2);
        assert_eq!(d["only_a"], (Some("1".to_string()), None));
        assert_eq!(d["only_b"], (None, Some("3".to_string())));
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn test_aggregate_matches_concatenation() {
        let m = map(&[("b/c.txt", "cc"), ("a.txt", "aa")]);
        assert_eq!(aggregate(&m), md5_bytes(b"a.txtaab/c.txtcc"));
        let reversed = vec![("b/c.txt", "cc"), ("a.txt", "aa")];
        assert_eq!(aggregate(reversed), aggregate(&m));
    }

    #[test]
    fn test_same_compares_checksum_only() {
        let a = Metadata::from_json_str(r#"{"name": "a", "checksum": "1"}"#).unwrap();
        let b = Metadata::from_json_str(r#"{"name": "b", "checksum": "1"}"#).unwrap();
        let c = Metadata::from_json_str(r#"{"name": "a", "checksum": "2"}"#).unwrap();
        let none = Metadata::from_json_str(r#"{"name": "a"}"#).unwrap();
        assert!(same(&a, &b));
        assert!(!same(&a, &c));
        assert!(!same(&none, &none));
    }

    #[test]
    fn test_check_missing_metadata_is_error() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        write(&a.path().join("meta.json"), br#"{"checksum": "1"}"#);
        let err = check_datasets(a.path(), b.path()).unwrap_err();
        assert!(matches!(err, ArchiverError::MissingMetadataFile { .. }));
    }

    #[test]
    fn test_check_mismatch_is_outcome() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        write(&a.path().join("meta.json"), br#"{"checksum": "1"}"#);
        write(&b.path().join("meta.json"), br#"{"checksum": "2"}"#);
        assert_eq!(check_datasets(a.path(), b.path()).unwrap(), CheckOutcome::Different);
        write(&b.path().join("meta.json"), br#"{"checksum": "1", "extra": true}"#);
        assert_eq!(check_datasets(a.path(), b.path()).unwrap(), CheckOutcome::Same);
    }

    #[test]
    fn test_check_requires_checksum() {
        let a = tempdir().unwrap();
        write(&a.path().join("meta.json"), br#"{"name": "movies"}"#);
        let err = check_datasets(a.path(), a.path()).unwrap_err();
        assert!(matches!(err, ArchiverError::InvalidMetadata { .. }));
    }
}
