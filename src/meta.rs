//! # Dataset Metadata
//!
//! A metadata record is a JSON object stored as `meta.json` at the root of
//! every dataset directory and every final archive. The archiver owns three
//! keys (`name`, `creation_date`, `checksum`); everything else is free-form
//! and carried verbatim from one archive cycle to the next.
//!
//! ## Precedence
//!
//! [`compose`] layers the record, later layers overwriting earlier ones:
//!
//! 1. `name` derived from the source directory's leaf name;
//! 2. the `meta.json` already present in the source directory, if any,
//!    extended with `source` (lineage of the archive it came from);
//! 3. metadata supplied by the caller;
//! 4. `creation_date` and `checksum`, always computed.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{keys, META_DATA_FILE};
use crate::error::{ArchiverError, Result};
use crate::fsx;

/// String-keyed JSON record describing one dataset archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merges `other` into `self`; keys of `other` win on collision.
    pub fn merge(&mut self, other: Metadata) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str(keys::NAME)
    }

    pub fn creation_date(&self) -> Option<&str> {
        self.get_str(keys::CREATION_DATE)
    }

    pub fn checksum(&self) -> Option<&str> {
        self.get_str(keys::CHECKSUM)
    }

    /// Returns the string value of `key`, or `InvalidMetadata` naming `origin`.
    pub fn require_str(&self, key: &str, origin: &Path) -> Result<&str> {
        match self.0.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(ArchiverError::invalid_metadata(
                origin,
                format!("'{}' must be a string", key),
            )),
            None => Err(ArchiverError::invalid_metadata(
                origin,
                format!("missing required key '{}'", key),
            )),
        }
    }

    /// Parses the bytes of a metadata file. `origin` is only used in errors.
    pub fn from_json_slice(bytes: &[u8], origin: &Path) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ArchiverError::malformed(origin, format!("metadata is not valid JSON: {}", e)))?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ArchiverError::invalid_metadata(
                origin,
                format!("expected a JSON object, found {}", json_kind(&other)),
            )),
        }
    }

    /// Parses metadata supplied on the command line.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ArchiverError::Json(serde::de::Error::custom(format!(
                "metadata must be a JSON object, found {}",
                json_kind(&other)
            )))),
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.0)?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Path of the metadata file inside `dataset_dir`.
pub fn metadata_path(dataset_dir: &Path) -> PathBuf {
    dataset_dir.join(META_DATA_FILE)
}

/// Loads `meta.json` from `dataset_dir`, returning `None` when it is absent.
pub fn try_load_metadata(dataset_dir: &Path) -> Result<Option<Metadata>> {
    let path = metadata_path(dataset_dir);
    let mut file = match fsx::File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ArchiverError::unreadable(&path, e)),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| ArchiverError::unreadable(&path, e))?;
    Metadata::from_json_slice(&bytes, &path).map(Some)
}

/// Loads `meta.json` from `dataset_dir`; its absence is an error.
pub fn load_metadata(dataset_dir: &Path) -> Result<Metadata> {
    try_load_metadata(dataset_dir)?.ok_or_else(|| ArchiverError::MissingMetadataFile {
        path: metadata_path(dataset_dir),
    })
}

/// The leaf name of `source`, resolving `.` and similar through the filesystem.
pub fn dataset_name(source: &Path) -> Result<String> {
    let resolved;
    let leaf = match source.file_name() {
        Some(name) => name,
        None => {
            resolved = fsx::canonicalize(source).map_err(|e| ArchiverError::unreadable(source, e))?;
            resolved.file_name().ok_or_else(|| {
                ArchiverError::unreadable(
                    source,
                    io::Error::new(io::ErrorKind::InvalidInput, "dataset directory has no name"),
                )
            })?
        }
    };
    leaf.to_str()
        .map(str::to_string)
        .ok_or_else(|| ArchiverError::UnsupportedEntry {
            path: source.to_path_buf(),
            kind: "non UTF-8 file name",
        })
}

/// ISO-8601 with microseconds and the local UTC offset.
pub fn format_creation_date(at: DateTime<Local>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Composes the metadata record for a new archive of `source`, stamped with the current time.
pub fn compose(source: &Path, caller: Option<&Metadata>, checksum: &str) -> Result<Metadata> {
    compose_at(source, caller, checksum, Local::now())
}

/// [`compose`] with an explicit creation time.
pub fn compose_at(
    source: &Path,
    caller: Option<&Metadata>,
    checksum: &str,
    created: DateTime<Local>,
) -> Result<Metadata> {
    let mut meta = Metadata::new();
    meta.insert(keys::NAME, dataset_name(source)?);

    if let Some(mut inherited) = try_load_metadata(source)? {
        let lineage = format!(
            "{}{}",
            inherited.name().unwrap_or_default(),
            inherited.creation_date().unwrap_or_default()
        );
        debug!(source = %source.display(), lineage = %lineage, "inheriting metadata");
        inherited.insert(keys::SOURCE, lineage);
        meta.merge(inherited);
    }

    if let Some(caller) = caller {
        meta.merge(caller.clone());
    }

    meta.insert(keys::CREATION_DATE, format_creation_date(created));
    meta.insert(keys::CHECKSUM, checksum);
    Ok(meta)
}
