//! Process-wide constants.
//!
//! Every value that influences the bytes of a produced archive lives here,
//! so the determinism of `create` can be audited in one place.

/// Reserved name of the metadata file at the root of a dataset and of a final archive.
pub const META_DATA_FILE: &str = "meta.json";

/// Root directory name of every member inside the inner data archive.
/// Independent of the source directory's real name.
pub const ROOT_ALIAS: &str = "data";

/// File name of the inner data archive, as stored in the final archive.
pub const DATA_ARCHIVE_NAME: &str = "data.tar.zst";

/// Extension of the final distributable archive.
pub const ARCHIVE_EXTENSION: &str = "tar.zst";

/// Separator joining `name` and `creation_date` in the final archive's file name.
pub const ARCHIVE_NAME_SEPARATOR: &str = "_";

/// Canonical tar attributes written for every member.
pub const CANONICAL_MTIME: u64 = 0;
pub const CANONICAL_FILE_MODE: u32 = 0o644;
pub const CANONICAL_DIR_MODE: u32 = 0o755;
pub const CANONICAL_UID: u64 = 0;
pub const CANONICAL_GID: u64 = 0;
pub const CANONICAL_USER_NAME: &str = "";
pub const CANONICAL_GROUP_NAME: &str = "";

/// Read size used when streaming file contents through the hasher.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024; // 64 KiB

/// Default zstd level (same for the inner and the final archive).
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Metadata keys the archiver itself reads or writes.
pub mod keys {
    pub const NAME: &str = "name";
    pub const CREATION_DATE: &str = "creation_date";
    pub const CHECKSUM: &str = "checksum";
    pub const SOURCE: &str = "source";
}

/// Options for building archives.
///
/// Two archives are only comparable by checksum when they were produced
/// with the same options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// zstd compression level (1-22).
    pub compression_level: i32,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}
