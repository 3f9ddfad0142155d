use std::path::{Path, PathBuf};

use thiserror::Error;

/// The primary error type for all operations in the `dataset_archiver` crate.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// A dataset directory (or final archive) has no `meta.json` where one is required.
    #[error("Metadata file '{}' does not exist", path.display())]
    MissingMetadataFile { path: PathBuf },

    /// A write-once destination is already present. Archives and extracted
    /// datasets are never overwritten.
    #[error("Destination '{}' already exists", path.display())]
    DestinationAlreadyExists { path: PathBuf },

    /// Walking or reading the source tree failed.
    #[error("Cannot read source '{}': {source}", path.display())]
    UnreadableSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The final or the inner archive cannot be parsed, or its metadata is not JSON.
    #[error("Malformed archive '{}': {reason}", path.display())]
    MalformedArchive { path: PathBuf, reason: String },

    /// A metadata file parsed but does not have the expected shape.
    #[error("Invalid metadata in '{}': {reason}", path.display())]
    InvalidMetadata { path: PathBuf, reason: String },

    /// Symbolic links and special files are not archived.
    #[error("Unsupported entry '{}' ({kind})", path.display())]
    UnsupportedEntry { path: PathBuf, kind: &'static str },

    /// An I/O error on the write side, with the path where it happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Caller-supplied metadata could not be parsed.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for archiver operations.
pub type Result<T> = std::result::Result<T, ArchiverError>;

impl ArchiverError {
    pub fn unreadable(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::UnreadableSource {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn malformed(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::MalformedArchive {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn invalid_metadata(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn already_exists(path: impl AsRef<Path>) -> Self {
        Self::DestinationAlreadyExists {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Maps a write-side I/O error, turning `AlreadyExists` into the write-once violation.
    pub fn from_create(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::AlreadyExists {
            Self::already_exists(path)
        } else {
            Self::io(path, source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display_includes_path() {
        let err = ArchiverError::MissingMetadataFile {
            path: PathBuf::from("/data/movies/meta.json"),
        };
        assert!(err.to_string().contains("/data/movies/meta.json"));

        let err = ArchiverError::malformed("archive.tar.zst", "missing meta.json");
        assert!(err.to_string().contains("archive.tar.zst"));
        assert!(err.to_string().contains("missing meta.json"));
    }

    #[test]
    fn test_from_create_maps_already_exists() {
        let err = ArchiverError::from_create(
            "out/data.tar.zst",
            io::Error::new(io::ErrorKind::AlreadyExists, "exists"),
        );
        assert!(matches!(err, ArchiverError::DestinationAlreadyExists { .. }));

        let err = ArchiverError::from_create(
            "out/data.tar.zst",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ArchiverError::Io { .. }));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ArchiverError = json_err.into();
        assert!(matches!(err, ArchiverError::Json(_)));
    }
}
