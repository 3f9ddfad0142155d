//! # Dataset Archiver Core Library
//!
//! This crate provides the core functionality for the `dataset-archiver` tool.
//!
//! A dataset is a directory with a `meta.json` record at its root. Archiving it
//! produces a byte-reproducible `data.tar.zst` of the content plus a final
//! `<name>_<creation_date>.tar.zst` bundling that archive with the composed
//! metadata. The recorded `checksum` depends on file paths and contents only.
//!
//! ## Key Modules
//!
//! - [`archive`]: Deterministic data archive builder and final archive assembly.
//! - [`meta`]: The metadata record and its composition rules.
//! - [`extract`]: Unpacking and verification of final archives.
//! - [`manifest`]: Per-file checksum manifests, aggregates and diffs.
//! - [`hash`]: Streaming MD5 content hashing.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::Path;
//! use dataset_archiver::{create_dataset_archive, extract_dataset_archive, ArchiveOptions};
//!
//! let created = create_dataset_archive(
//!     Path::new("datasets/movies"),
//!     None,
//!     Path::new("archives"),
//!     &ArchiveOptions::default(),
//! )?;
//! let restored = extract_dataset_archive(&created.path, Path::new("restored"))?;
//! # Ok::<(), dataset_archiver::ArchiverError>(())
//! ```

pub mod archive;
pub mod cli;
pub mod cli_runner;
pub mod common;
pub mod config;
pub mod error;
pub mod extract;
pub mod hash;
pub mod manifest;
pub mod meta;

// Cross-platform filesystem wrapper
pub mod fsx;

pub use archive::assemble::{create_dataset_archive, CreatedArchive};
pub use archive::build_data_archive;
pub use config::ArchiveOptions;
pub use error::{ArchiverError, Result};
pub use extract::{extract_dataset_archive, read_archive_metadata, verify_dataset_archive};
pub use manifest::{check_datasets, diff_datasets, CheckOutcome};
pub use meta::Metadata;
