//! Final archive assembly.
//!
//! A final archive is a zstd-compressed tar with exactly two members:
//!
//! ```text
//! <name>_<creation_date>.tar.zst
//! ├── meta.json      (the composed metadata record)
//! └── data.tar.zst   (the deterministic data archive)
//! ```

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use super::normalize::normalize;
use super::{append_record, build_data_archive, compressed_tar, finish_compressed_tar, DataArchive};
use crate::common::RawEntryMetadata;
use crate::config::{
    keys, ArchiveOptions, ARCHIVE_EXTENSION, ARCHIVE_NAME_SEPARATOR, DATA_ARCHIVE_NAME,
    META_DATA_FILE,
};
use crate::error::{ArchiverError, Result};
use crate::fsx;
use crate::hash::md5_file;
use crate::meta::{compose, Metadata};

/// Result of a successful `create`.
#[derive(Debug, Clone)]
pub struct CreatedArchive {
    pub path: PathBuf,
    pub metadata: Metadata,
    /// Size of the inner data archive in bytes.
    pub data_size: u64,
}

/// File name of the final archive for `metadata`: `<name>_<creation_date>.tar.zst`.
///
/// Colons of the timestamp become `-` so the name is valid on every platform.
pub fn archive_file_name(metadata: &Metadata) -> Result<String> {
    let origin = Path::new(META_DATA_FILE);
    let name = metadata.require_str(keys::NAME, origin)?;
    let created = metadata.require_str(keys::CREATION_DATE, origin)?;
    if !fsx::is_single_component(name) {
        return Err(ArchiverError::invalid_metadata(
            origin,
            format!("name '{}' is not usable as a file name", name),
        ));
    }
    Ok(format!(
        "{}{}{}.{}",
        name,
        ARCHIVE_NAME_SEPARATOR,
        created.replace(':', "-"),
        ARCHIVE_EXTENSION
    ))
}

/// Bundles `metadata` and `data` into a new archive under `destination`.
///
/// The archive is written to a temporary file next to its final location and
/// moved into place without replacing anything; an existing file of the same
/// name makes this fail with `DestinationAlreadyExists`.
pub fn assemble(
    metadata: &Metadata,
    data: &DataArchive,
    destination: &Path,
    options: &ArchiveOptions,
) -> Result<PathBuf> {
    let final_path = destination.join(archive_file_name(metadata)?);
    let meta_bytes = metadata.to_json_bytes()?;

    let tmp = NamedTempFile::new_in(destination).map_err(|e| ArchiverError::io(destination, e))?;
    let file = tmp.reopen().map_err(|e| ArchiverError::io(tmp.path(), e))?;
    let mut builder = compressed_tar(file, tmp.path(), options)?;

    let meta_record = normalize(&member_metadata(META_DATA_FILE, meta_bytes.len() as u64));
    append_record(&mut builder, &meta_record, meta_bytes.as_slice())
        .map_err(|e| ArchiverError::io(tmp.path(), e))?;

    let data_file = fsx::File::open(data.path()).map_err(|e| ArchiverError::io(data.path(), e))?;
    let data_record = normalize(&member_metadata(DATA_ARCHIVE_NAME, data.size()));
    append_record(&mut builder, &data_record, data_file)
        .map_err(|e| ArchiverError::io(data.path(), e))?;

    finish_compressed_tar(builder, tmp.path())?;

    tmp.persist_noclobber(&final_path)
        .map_err(|e| ArchiverError::from_create(&final_path, e.error))?;
    Ok(final_path)
}

fn member_metadata(name: &str, size: u64) -> RawEntryMetadata {
    RawEntryMetadata {
        name: name.to_string(),
        is_directory: false,
        size,
        modification_time: 0,
        permission_mode: 0,
        owner_id: 0,
        group_id: 0,
        owner_name: String::new(),
        group_name: String::new(),
        extended_attributes: Vec::new(),
    }
}

/// Archives `source` into `archives_path`: build, hash, compose, assemble.
///
/// `archives_path` is created if needed. The temporary data archive is
/// removed before returning, whatever the outcome.
pub fn create_dataset_archive(
    source: &Path,
    caller_metadata: Option<&Metadata>,
    archives_path: &Path,
    options: &ArchiveOptions,
) -> Result<CreatedArchive> {
    fsx::create_dir_all(archives_path).map_err(|e| ArchiverError::io(archives_path, e))?;

    let data = build_data_archive(source, options)?;
    let checksum = md5_file(data.path())?;
    let metadata = compose(source, caller_metadata, &checksum)?;
    let path = assemble(&metadata, &data, archives_path, options)?;

    info!(
        archive = %path.display(),
        checksum = %checksum,
        entries = data.entry_count(),
        "dataset archived"
    );
    Ok(CreatedArchive {
        path,
        metadata,
        data_size: data.size(),
    })
}
