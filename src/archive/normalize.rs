//! Attribute normalization.
//!
//! Two entries with the same name and content must serialize to identical
//! tar headers no matter where, when, or by whom the files were created.

use std::path::Path;

use crate::common::{EntryKind, NormalizedRecord, RawEntryMetadata};
use crate::config::{
    CANONICAL_DIR_MODE, CANONICAL_FILE_MODE, CANONICAL_GID, CANONICAL_GROUP_NAME, CANONICAL_MTIME,
    CANONICAL_UID, CANONICAL_USER_NAME, META_DATA_FILE,
};
use crate::error::{ArchiverError, Result};

/// Replaces every filesystem-origin attribute with its canonical value.
/// Name, kind and size are kept. Extended attributes are dropped.
pub fn normalize(raw: &RawEntryMetadata) -> NormalizedRecord {
    NormalizedRecord {
        name: raw.name.clone(),
        is_directory: raw.is_directory,
        size: if raw.is_directory { 0 } else { raw.size },
        modification_time: CANONICAL_MTIME,
        permission_mode: if raw.is_directory {
            CANONICAL_DIR_MODE
        } else {
            CANONICAL_FILE_MODE
        },
        owner_id: CANONICAL_UID,
        group_id: CANONICAL_GID,
        owner_name: CANONICAL_USER_NAME,
        group_name: CANONICAL_GROUP_NAME,
    }
}

/// True only for the metadata file directly under the dataset root.
/// A nested `sub/meta.json` is ordinary data.
pub fn is_root_metadata_file(relative_path: &str) -> bool {
    relative_path == META_DATA_FILE
}

/// Rejects entries that cannot be archived as (path, content) pairs.
pub fn ensure_archivable(path: &Path, kind: EntryKind) -> Result<()> {
    match kind {
        EntryKind::File | EntryKind::Directory => Ok(()),
        EntryKind::Symlink | EntryKind::Special => Err(ArchiverError::UnsupportedEntry {
            path: path.to_path_buf(),
            kind: kind.describe(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, is_directory: bool) -> RawEntryMetadata {
        RawEntryMetadata {
            name: name.to_string(),
            is_directory,
            size: if is_directory { 4096 } else { 11 },
            modification_time: 1_700_000_000,
            permission_mode: 0o600,
            owner_id: 1000,
            group_id: 100,
            owner_name: "alice".to_string(),
            group_name: "users".to_string(),
            extended_attributes: vec![("user.origin".to_string(), b"laptop".to_vec())],
        }
    }

    #[test]
    fn test_normalize_resets_fs_fields() {
        let record = normalize(&raw("data/a.txt", false));
        assert_eq!(record.name, "data/a.txt");
        assert_eq!(record.size, 11);
        assert_eq!(record.modification_time, 0);
        assert_eq!(record.permission_mode, CANONICAL_FILE_MODE);
        assert_eq!(record.owner_id, 0);
        assert_eq!(record.group_id, 0);
        assert_eq!(record.owner_name, "");
        assert_eq!(record.group_name, "");
    }

    #[test]
    fn test_normalize_directory() {
        let record = normalize(&raw("data/b", true));
        assert!(record.is_directory);
        assert_eq!(record.size, 0);
        assert_eq!(record.permission_mode, CANONICAL_DIR_MODE);
    }

    #[test]
    fn test_origin_does_not_matter() {
        let a = raw("data/a.txt", false);
        let mut b = a.clone();
        b.modification_time = 42;
        b.permission_mode = 0o777;
        b.owner_id = 0;
        b.owner_name = "root".to_string();
        b.extended_attributes.clear();
        assert_eq!(normalize(&a), normalize(&b));
    }

    #[test]
    fn test_root_metadata_only() {
        assert!(is_root_metadata_file("meta.json"));
        assert!(!is_root_metadata_file("nested/meta.json"));
        assert!(!is_root_metadata_file("meta.json.bak"));
    }

    #[test]
    fn test_links_rejected() {
        let p = Path::new("/tmp/ds/link");
        assert!(ensure_archivable(p, EntryKind::File).is_ok());
        assert!(ensure_archivable(p, EntryKind::Directory).is_ok());
        let err = ensure_archivable(p, EntryKind::Symlink).unwrap_err();
        assert!(matches!(err, ArchiverError::UnsupportedEntry { kind: "symbolic link", .. }));
        assert!(ensure_archivable(p, EntryKind::Special).is_err());
    }
}
