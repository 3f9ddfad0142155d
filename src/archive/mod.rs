//! # Deterministic Data Archive
//!
//! Builds the inner `data.tar.zst` of a dataset archive. The bytes of the
//! produced archive depend only on the set of relative paths and the file
//! contents under the source directory:
//!
//! - members live under the fixed [`ROOT_ALIAS`], never under the source
//!   directory's own name;
//! - every header is normalized (see [`normalize`]);
//! - members are emitted in a depth-first walk with siblings sorted by name;
//! - the root `meta.json` is left out, it is regenerated by the composer.

pub mod assemble;
pub mod normalize;

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tar::{Builder, EntryType, Header};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::common::{Entry, EntryKind, NormalizedRecord, RawEntryMetadata};
use crate::config::{ArchiveOptions, DATA_ARCHIVE_NAME, ROOT_ALIAS};
use crate::error::{ArchiverError, Result};
use crate::fsx;
use normalize::{ensure_archivable, is_root_metadata_file, normalize};

/// Handle to a freshly built inner data archive.
///
/// The archive lives in a private temporary directory that is removed when
/// the handle is dropped, on success and on every error path alike.
#[derive(Debug)]
pub struct DataArchive {
    _dir: TempDir,
    path: PathBuf,
    size: u64,
    entry_count: usize,
}

impl DataArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the compressed archive in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of members, the root alias directory included.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }
}

/// Enumerates every entry under `source`, the root first, siblings in name order.
///
/// The root `meta.json` is skipped. Symbolic links and special files are rejected.
pub fn collect_entries(source: &Path) -> Result<Vec<Entry>> {
    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() == 1 && e.file_name().to_str().map_or(false, is_root_metadata_file))
        });

    let mut entries = Vec::new();
    for item in walker {
        let item = item.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            ArchiverError::unreadable(path, io::Error::from(e))
        })?;

        let kind = EntryKind::from_file_type(item.file_type());
        ensure_archivable(item.path(), kind)?;

        let relative_path = fsx::posix_relative(source, item.path())?;
        let is_directory = kind == EntryKind::Directory;
        let size = if is_directory {
            0
        } else {
            item.metadata()
                .map_err(|e| ArchiverError::unreadable(item.path(), io::Error::from(e)))?
                .len()
        };

        entries.push(Entry {
            relative_path,
            absolute_path: item.path().to_path_buf(),
            is_directory,
            size,
        });
    }
    Ok(entries)
}

/// Builds the inner data archive for `source` inside a private temporary directory.
pub fn build_data_archive(source: &Path, options: &ArchiveOptions) -> Result<DataArchive> {
    ensure_source_dir(source)?;

    let dir = tempfile::Builder::new()
        .prefix("dataset-archiver-")
        .tempdir()
        .map_err(|e| ArchiverError::io(std::env::temp_dir(), e))?;
    let path = dir.path().join(DATA_ARCHIVE_NAME);

    let entry_count = write_data_archive(source, &path, options)?;
    let size = fsx::metadata(&path)
        .map_err(|e| ArchiverError::io(&path, e))?
        .len();

    debug!(source = %source.display(), entries = entry_count, bytes = size, "data archive built");
    Ok(DataArchive {
        _dir: dir,
        path,
        size,
        entry_count,
    })
}

/// Writes the normalized, compressed tar of `source` to `dest`.
///
/// `dest` must not exist yet. Returns the number of members written.
pub fn write_data_archive(source: &Path, dest: &Path, options: &ArchiveOptions) -> Result<usize> {
    ensure_source_dir(source)?;
    let entries = collect_entries(source)?;

    let file = fsx::create_new_file(dest)?;
    let mut builder = compressed_tar(file, dest, options)?;

    for entry in &entries {
        let name = member_name(&entry.relative_path);
        let fs_meta = fsx::symlink_metadata(&entry.absolute_path)
            .map_err(|e| ArchiverError::unreadable(&entry.absolute_path, e))?;
        let record = normalize(&RawEntryMetadata::from_fs(name, entry, &fs_meta));

        if entry.is_directory {
            append_record(&mut builder, &record, io::empty())
                .map_err(|e| ArchiverError::io(dest, e))?;
        } else {
            let content = File::open(&entry.absolute_path)
                .map_err(|e| ArchiverError::unreadable(&entry.absolute_path, e))?;
            append_record(&mut builder, &record, content)
                .map_err(|e| ArchiverError::unreadable(&entry.absolute_path, e))?;
        }
        debug!(member = %record.name, size = record.size, "archived");
    }

    finish_compressed_tar(builder, dest)?;
    Ok(entries.len())
}

/// Name of the member holding `relative_path` inside the data archive.
pub fn member_name(relative_path: &str) -> String {
    if relative_path.is_empty() {
        ROOT_ALIAS.to_string()
    } else {
        format!("{}/{}", ROOT_ALIAS, relative_path)
    }
}

pub(crate) type CompressedTar = Builder<zstd::Encoder<'static, BufWriter<File>>>;

/// Wraps `file` in a single-threaded zstd encoder and a tar builder.
pub(crate) fn compressed_tar(file: File, path: &Path, options: &ArchiveOptions) -> Result<CompressedTar> {
    let encoder = zstd::Encoder::new(BufWriter::new(file), options.compression_level)
        .map_err(|e| ArchiverError::io(path, e))?;
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);
    Ok(builder)
}

pub(crate) fn finish_compressed_tar(builder: CompressedTar, path: &Path) -> Result<()> {
    let encoder = builder.into_inner().map_err(|e| ArchiverError::io(path, e))?;
    let mut writer = encoder.finish().map_err(|e| ArchiverError::io(path, e))?;
    writer.flush().map_err(|e| ArchiverError::io(path, e))?;
    Ok(())
}

/// Appends one member whose header carries exactly the attributes of `record`.
pub(crate) fn append_record<W: Write, R: Read>(
    builder: &mut Builder<W>,
    record: &NormalizedRecord,
    content: R,
) -> io::Result<()> {
    let mut header = header_for(record)?;
    if record.is_directory {
        builder.append_data(&mut header, format!("{}/", record.name), content)
    } else {
        builder.append_data(&mut header, &record.name, content)
    }
}

fn header_for(record: &NormalizedRecord) -> io::Result<Header> {
    let mut header = Header::new_gnu();
    header.set_entry_type(if record.is_directory {
        EntryType::Directory
    } else {
        EntryType::Regular
    });
    header.set_size(record.size);
    header.set_mode(record.permission_mode);
    header.set_mtime(record.modification_time);
    header.set_uid(record.owner_id);
    header.set_gid(record.group_id);
    header.set_username(record.owner_name)?;
    header.set_groupname(record.group_name)?;
    Ok(header)
}

fn ensure_source_dir(source: &Path) -> Result<()> {
    let meta = fsx::metadata(source).map_err(|e| ArchiverError::unreadable(source, e))?;
    if !meta.is_dir() {
        return Err(ArchiverError::unreadable(
            source,
            io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::META_DATA_FILE;
    use std::io::Read;
    use tempfile::tempdir;

    fn write(path: &Path, data: &[u8]) {
        if let Some(parent) = path.parent() {
            fsx::create_dir_all(parent).unwrap();
        }
        fsx::write(path, data).unwrap();
    }

    fn member_names(archive: &Path) -> Vec<String> {
        let decoder = zstd::Decoder::new(File::open(archive).unwrap()).unwrap();
        let mut tar = tar::Archive::new(decoder);
        tar.entries()
            .unwrap()
            .map(|e| {
                let name = e.unwrap().path().unwrap().to_string_lossy().to_string();
                name.trim_end_matches('/').to_string()
            })
            .collect()
    }

    fn sample_dataset(root: &Path) {
        write(&root.join("a.txt"), b"x");
        write(&root.join("b").join("c.txt"), b"y");
        write(&root.join(META_DATA_FILE), br#"{"name":"old"}"#);
    }

    #[test]
    fn test_collect_entries_order_and_exclusion() {
        let dir = tempdir().unwrap();
        sample_dataset(dir.path());
        write(&dir.path().join("b").join(META_DATA_FILE), b"nested, kept");

        let rel: Vec<String> = collect_entries(dir.path())
            .unwrap()
            .into_iter()
            .map(|e| e.relative_path)
            .collect();
        assert_eq!(rel, vec!["", "a.txt", "b", "b/c.txt", "b/meta.json"]);
    }

    #[test]
    fn test_members_under_root_alias() {
        let dir = tempdir().unwrap();
        sample_dataset(dir.path());

        let archive = build_data_archive(dir.path(), &ArchiveOptions::default()).unwrap();
        assert_eq!(archive.entry_count(), 4);
        assert_eq!(
            member_names(archive.path()),
            vec!["data", "data/a.txt", "data/b", "data/b/c.txt"]
        );
    }

    #[test]
    fn test_headers_are_normalized() {
        let dir = tempdir().unwrap();
        sample_dataset(dir.path());
        let archive = build_data_archive(dir.path(), &ArchiveOptions::default()).unwrap();

        let decoder = zstd::Decoder::new(File::open(archive.path()).unwrap()).unwrap();
        let mut tar = tar::Archive::new(decoder);
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let header = entry.header();
            assert_eq!(header.mtime().unwrap(), 0);
            assert_eq!(header.uid().unwrap(), 0);
            assert_eq!(header.gid().unwrap(), 0);
            assert_eq!(header.username().unwrap(), Some(""));
            if header.entry_type().is_dir() {
                assert_eq!(header.mode().unwrap(), 0o755);
            } else {
                assert_eq!(header.mode().unwrap(), 0o644);
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                assert!(content == "x" || content == "y");
            }
        }
    }

    #[test]
    fn test_same_bytes_for_renamed_copy() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        sample_dataset(a.path());
        let copy = b.path().join("renamed");
        write(&copy.join("b").join("c.txt"), b"y");
        write(&copy.join("a.txt"), b"x");

        let opts = ArchiveOptions::default();
        let first = build_data_archive(a.path(), &opts).unwrap();
        let second = build_data_archive(&copy, &opts).unwrap();
        assert_eq!(
            fsx::read(first.path()).unwrap(),
            fsx::read(second.path()).unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_do_not_matter() {
        use std::os::unix::fs::PermissionsExt;

        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        sample_dataset(a.path());
        sample_dataset(b.path());
        fsx::set_permissions(b.path().join("a.txt"), fsx::Permissions::from_mode(0o600)).unwrap();

        let opts = ArchiveOptions::default();
        let first = build_data_archive(a.path(), &opts).unwrap();
        let second = build_data_archive(b.path(), &opts).unwrap();
        assert_eq!(
            fsx::read(first.path()).unwrap(),
            fsx::read(second.path()).unwrap()
        );
    }

    #[test]
    fn test_write_data_archive_is_write_once() {
        let src = tempdir().unwrap();
        sample_dataset(src.path());
        let out = tempdir().unwrap();
        let dest = out.path().join(DATA_ARCHIVE_NAME);

        write_data_archive(src.path(), &dest, &ArchiveOptions::default()).unwrap();
        let err = write_data_archive(src.path(), &dest, &ArchiveOptions::default()).unwrap_err();
        assert!(matches!(err, ArchiverError::DestinationAlreadyExists { .. }));
    }

    #[test]
    fn test_temp_dir_removed_on_drop() {
        let src = tempdir().unwrap();
        sample_dataset(src.path());
        let archive = build_data_archive(src.path(), &ArchiveOptions::default()).unwrap();
        let path = archive.path().to_path_buf();
        assert!(path.exists());
        drop(archive);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_source_is_unreadable() {
        let dir = tempdir().unwrap();
        let err = build_data_archive(&dir.path().join("missing"), &ArchiveOptions::default())
            .unwrap_err();
        assert!(matches!(err, ArchiverError::UnreadableSource { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_rejected() {
        let dir = tempdir().unwrap();
        sample_dataset(dir.path());
        std::os::unix::fs::symlink(dir.path().join("a.txt"), dir.path().join("link")).unwrap();

        let err = build_data_archive(dir.path(), &ArchiveOptions::default()).unwrap_err();
        assert!(matches!(err, ArchiverError::UnsupportedEntry { .. }));
    }
}
