//! Filesystem helpers.
//!
//! Destinations are write-once: they are created with the atomic
//! "create new" primitives of the OS, never with check-then-create, so two
//! racing operations on the same destination cannot both succeed.
//!
//! Dataset paths are carried around as posix-style strings relative to the
//! dataset root, independent of the host separator.

use std::path::{Component, Path, PathBuf};

use crate::error::{ArchiverError, Result};

pub use std::fs::*;

/// Creates `path` as a new file, failing with `DestinationAlreadyExists` if anything is there.
pub fn create_new_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| ArchiverError::from_create(path, e))
}

/// Creates `path` as a new directory. The parent must exist.
pub fn create_new_dir(path: &Path) -> Result<()> {
    std::fs::create_dir(path).map_err(|e| ArchiverError::from_create(path, e))
}

/// Renders `path` relative to `root` with `/` separators. The root itself is `""`.
pub fn posix_relative(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        ArchiverError::unreadable(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not under '{}'", root.display()),
            ),
        )
    })?;

    let mut parts = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(os) => match os.to_str() {
                Some(s) => parts.push(s),
                None => {
                    return Err(ArchiverError::UnsupportedEntry {
                        path: path.to_path_buf(),
                        kind: "non UTF-8 file name",
                    })
                }
            },
            Component::CurDir => {}
            _ => {
                return Err(ArchiverError::UnsupportedEntry {
                    path: path.to_path_buf(),
                    kind: "non-relative path component",
                })
            }
        }
    }
    Ok(parts.join("/"))
}

/// Converts an archive member path into a relative path that stays inside
/// the extraction directory. Returns `None` for absolute paths, `..`, or
/// anything else that could escape.
pub fn sanitize_member_path(member: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in member.components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// True when `name` can be used as a single directory name under a destination.
pub fn is_single_component(name: &str) -> bool {
    let mut comps = Path::new(name).components();
    matches!(
        (comps.next(), comps.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains('/')
        && !name.contains('\\')
}
