//! Common types shared by the builder, the manifest and the extractor.

use std::path::PathBuf;

/// Kind of a filesystem entry inside a dataset tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Sockets, FIFOs, device nodes.
    Special,
}

impl EntryKind {
    pub fn from_file_type(ft: std::fs::FileType) -> Self {
        if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_dir() {
            EntryKind::Directory
        } else if ft.is_file() {
            EntryKind::File
        } else {
            EntryKind::Special
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            EntryKind::File => "regular file",
            EntryKind::Directory => "directory",
            EntryKind::Symlink => "symbolic link",
            EntryKind::Special => "special file",
        }
    }
}

/// One file or directory inside a source tree.
///
/// Identity is `relative_path`; the absolute path only locates the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Posix-style path relative to the dataset root. Empty for the root itself.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub is_directory: bool,
    /// Content length in bytes, 0 for directories.
    pub size: u64,
}

/// Raw archive-entry attributes as they come from the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntryMetadata {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modification_time: u64,
    pub permission_mode: u32,
    pub owner_id: u64,
    pub group_id: u64,
    pub owner_name: String,
    pub group_name: String,
    pub extended_attributes: Vec<(String, Vec<u8>)>,
}

impl RawEntryMetadata {
    /// Reads the attributes of `entry` from the filesystem, naming it `name`.
    pub fn from_fs(name: String, entry: &Entry, meta: &std::fs::Metadata) -> Self {
        let modification_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        #[cfg(unix)]
        let (permission_mode, owner_id, group_id) = {
            use std::os::unix::fs::MetadataExt;
            (meta.mode() & 0o7777, meta.uid() as u64, meta.gid() as u64)
        };
        #[cfg(not(unix))]
        let (permission_mode, owner_id, group_id) =
            (if meta.permissions().readonly() { 0o444 } else { 0o644 }, 0, 0);

        Self {
            name,
            is_directory: entry.is_directory,
            size: entry.size,
            modification_time,
            permission_mode,
            owner_id,
            group_id,
            owner_name: String::new(),
            group_name: String::new(),
            extended_attributes: Vec::new(),
        }
    }
}

/// Archive-entry attributes with every filesystem-origin field replaced by a constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modification_time: u64,
    pub permission_mode: u32,
    pub owner_id: u64,
    pub group_id: u64,
    pub owner_name: &'static str,
    pub group_name: &'static str,
}
