//! # Extraction Module
//!
//! Reads final archives back: the metadata member alone (for `check`), the
//! full dataset (for `extract`), or the inner data archive's checksum (for
//! `verify`). An extracted dataset contains its `meta.json` at the root, so
//! it can be archived again and will inherit that metadata.

use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tar::{Archive, EntryType};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::{keys, DATA_ARCHIVE_NAME, META_DATA_FILE, ROOT_ALIAS};
use crate::error::{ArchiverError, Result};
use crate::fsx;
use crate::hash::md5_file;
use crate::meta::Metadata;

type ArchiveStream = Archive<zstd::Decoder<'static, BufReader<fsx::File>>>;

fn open_archive(path: &Path) -> Result<ArchiveStream> {
    let file = fsx::File::open(path).map_err(|e| ArchiverError::unreadable(path, e))?;
    let decoder = zstd::Decoder::new(file)
        .map_err(|e| ArchiverError::malformed(path, format!("zstd: {}", e)))?;
    Ok(Archive::new(decoder))
}

/// The two members of a final archive, unpacked into a scratch directory.
struct Unpacked {
    metadata: Metadata,
    meta_bytes: Vec<u8>,
    data_path: PathBuf,
    _scratch: TempDir,
}

fn unpack_final(archive: &Path) -> Result<Unpacked> {
    let scratch = tempfile::Builder::new()
        .prefix("dataset-archiver-")
        .tempdir()
        .map_err(|e| ArchiverError::io(std::env::temp_dir(), e))?;
    let data_path = scratch.path().join(DATA_ARCHIVE_NAME);

    let mut tar = open_archive(archive)?;
    let mut meta_bytes = None;
    let mut has_data = false;

    let entries = tar
        .entries()
        .map_err(|e| ArchiverError::malformed(archive, e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiverError::malformed(archive, e.to_string()))?;
        let name = member_path(&entry, archive)?;

        match name.as_str() {
            META_DATA_FILE if meta_bytes.is_none() => {
                let mut bytes = Vec::new();
                entry
                    .read_to_end(&mut bytes)
                    .map_err(|e| ArchiverError::malformed(archive, e.to_string()))?;
                meta_bytes = Some(bytes);
            }
            DATA_ARCHIVE_NAME if !has_data => {
                let mut out = fsx::create_new_file(&data_path)?;
                io::copy(&mut entry, &mut out)
                    .map_err(|e| ArchiverError::malformed(archive, e.to_string()))?;
                has_data = true;
            }
            other => {
                return Err(ArchiverError::malformed(
                    archive,
                    format!("unexpected member '{}'", other),
                ))
            }
        }
    }

    let meta_bytes = meta_bytes
        .ok_or_else(|| ArchiverError::malformed(archive, format!("missing {}", META_DATA_FILE)))?;
    if !has_data {
        return Err(ArchiverError::malformed(
            archive,
            format!("missing {}", DATA_ARCHIVE_NAME),
        ));
    }
    let metadata = Metadata::from_json_slice(&meta_bytes, archive)?;

    Ok(Unpacked {
        metadata,
        meta_bytes,
        data_path,
        _scratch: scratch,
    })
}

fn member_path<R: Read>(entry: &tar::Entry<'_, R>, archive: &Path) -> Result<String> {
    let raw = entry
        .path()
        .map_err(|e| ArchiverError::malformed(archive, e.to_string()))?;
    let clean = fsx::sanitize_member_path(&raw)
        .ok_or_else(|| ArchiverError::malformed(archive, format!("unsafe member path '{}'", raw.display())))?;
    Ok(clean.to_string_lossy().replace('\\', "/"))
}

/// Reads only the metadata member of a final archive.
pub fn read_archive_metadata(archive: &Path) -> Result<Metadata> {
    let mut tar = open_archive(archive)?;
    let entries = tar
        .entries()
        .map_err(|e| ArchiverError::malformed(archive, e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiverError::malformed(archive, e.to_string()))?;
        if member_path(&entry, archive)? == META_DATA_FILE {
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| ArchiverError::malformed(archive, e.to_string()))?;
            return Metadata::from_json_slice(&bytes, archive);
        }
    }
    Err(ArchiverError::malformed(
        archive,
        format!("missing {}", META_DATA_FILE),
    ))
}

/// Extracts `archive` into a new directory `<destination>/<name>`.
///
/// Fails with `DestinationAlreadyExists` if that directory is already there.
/// On any later failure the partially written directory is removed again.
pub fn extract_dataset_archive(archive: &Path, destination: &Path) -> Result<PathBuf> {
    let unpacked = unpack_final(archive)?;
    let name = unpacked.metadata.require_str(keys::NAME, archive)?;
    if !fsx::is_single_component(name) {
        return Err(ArchiverError::invalid_metadata(
            archive,
            format!("name '{}' is not a single directory name", name),
        ));
    }

    fsx::create_dir_all(destination).map_err(|e| ArchiverError::io(destination, e))?;
    let target = destination.join(name);
    fsx::create_new_dir(&target)?;

    let cleanup = scopeguard::guard(target.clone(), |dir| {
        let _ = fsx::remove_dir_all(&dir);
    });

    let files = unpack_data_archive(&unpacked.data_path, &target)?;

    let meta_path = target.join(META_DATA_FILE);
    let mut meta_file = fsx::create_new_file(&meta_path)?;
    io::Write::write_all(&mut meta_file, &unpacked.meta_bytes)
        .map_err(|e| ArchiverError::io(&meta_path, e))?;

    let target = scopeguard::ScopeGuard::into_inner(cleanup);
    info!(archive = %archive.display(), dataset = %target.display(), files, "dataset extracted");
    Ok(target)
}

/// Unpacks the members of an inner data archive below `target`, dropping
/// the root alias. Returns the number of regular files written.
pub fn unpack_data_archive(data_archive: &Path, target: &Path) -> Result<usize> {
    let mut tar = open_archive(data_archive)?;
    let entries = tar
        .entries()
        .map_err(|e| ArchiverError::malformed(data_archive, e.to_string()))?;

    let mut files = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiverError::malformed(data_archive, e.to_string()))?;
        let member = member_path(&entry, data_archive)?;
        let relative = if member == ROOT_ALIAS {
            ""
        } else {
            member
                .strip_prefix(ROOT_ALIAS)
                .and_then(|rest| rest.strip_prefix('/'))
                .ok_or_else(|| {
                    ArchiverError::malformed(
                        data_archive,
                        format!("member '{}' is outside '{}'", member, ROOT_ALIAS),
                    )
                })?
        };
        if relative == META_DATA_FILE {
            return Err(ArchiverError::malformed(
                data_archive,
                format!("data archive must not contain a root {}", META_DATA_FILE),
            ));
        }

        let out_path = target.join(relative);
        match entry.header().entry_type() {
            EntryType::Directory => {
                fsx::create_dir_all(&out_path).map_err(|e| ArchiverError::io(&out_path, e))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = out_path.parent() {
                    fsx::create_dir_all(parent).map_err(|e| ArchiverError::io(parent, e))?;
                }
                let mut out = fsx::create_new_file(&out_path)?;
                io::copy(&mut entry, &mut out)
                    .map_err(|e| ArchiverError::malformed(data_archive, e.to_string()))?;
                files += 1;
                debug!(file = %relative, "extracted");
            }
            other => {
                return Err(ArchiverError::malformed(
                    data_archive,
                    format!("member '{}' has unsupported type {:?}", member, other),
                ))
            }
        }
    }
    Ok(files)
}

/// Outcome of recomputing an archive's data checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub recorded: String,
    pub actual: String,
}

impl VerifyReport {
    pub fn is_intact(&self) -> bool {
        self.recorded == self.actual
    }
}

/// Recomputes the checksum of the inner data archive and compares it with `meta.json`.
pub fn verify_dataset_archive(archive: &Path) -> Result<VerifyReport> {
    let unpacked = unpack_final(archive)?;
    let recorded = unpacked
        .metadata
        .require_str(keys::CHECKSUM, archive)?
        .to_string();
    let actual = md5_file(&unpacked.data_path)?;
    debug!(archive = %archive.display(), %recorded, %actual, "verified");
    Ok(VerifyReport { recorded, actual })
}
