use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dataset-archiver", author, version, about, long_about = None)]
pub struct Args {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Archive a dataset directory into `<name>_<creation_date>.tar.zst`.
    Create {
        /// Dataset directory to archive.
        #[arg(long = "dataset_dir", value_parser = existing_dir)]
        dataset_dir: PathBuf,

        /// Extra metadata as a JSON object. Overrides keys of the dataset's own meta.json.
        #[arg(long = "meta_data")]
        meta_data: Option<String>,

        /// Directory that receives the archive. Created if missing.
        #[arg(long = "archives_path")]
        archives_path: PathBuf,
    },

    /// Extract a dataset archive into `<extract_path>/<name>`.
    Extract {
        /// The archive file to extract.
        #[arg(long = "dataset_archive", value_parser = existing_file)]
        dataset_archive: PathBuf,

        /// Parent directory of the extracted dataset.
        #[arg(long = "extract_path")]
        extract_path: PathBuf,
    },

    /// Compare two datasets (directories or archives) by their recorded checksum.
    Check {
        #[arg(long = "dataset_dir_a")]
        dataset_dir_a: PathBuf,

        #[arg(long = "dataset_dir_b")]
        dataset_dir_b: PathBuf,

        /// Also compare per-file checksums and list every differing path.
        #[arg(long)]
        diff: bool,
    },

    /// Print the per-file checksums of a dataset directory and their aggregate.
    Manifest {
        #[arg(long = "dataset_dir", value_parser = existing_dir)]
        dataset_dir: PathBuf,
    },

    /// Recompute the data archive checksum of an archive and compare it with the recorded one.
    Verify {
        #[arg(long = "dataset_archive", value_parser = existing_file)]
        dataset_archive: PathBuf,
    },
}

fn existing_dir(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("'{}' is not a directory", value))
    }
}

fn existing_file(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("'{}' is not a file", value))
    }
}

/// Parses command-line arguments using `clap`.
///
/// Help and version requests come back as errors too; `clap::Error::exit`
/// prints them with the right exit status.
pub fn run() -> Result<Args, clap::Error> {
    Args::try_parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_with_underscore_flags() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "dataset-archiver",
            "create",
            "--dataset_dir",
            dir.path().to_str().unwrap(),
            "--meta_data",
            r#"{"split": "train"}"#,
            "--archives_path=out",
        ])
        .unwrap();
        match args.command {
            Commands::Create { meta_data, archives_path, .. } => {
                assert_eq!(meta_data.as_deref(), Some(r#"{"split": "train"}"#));
                assert_eq!(archives_path, PathBuf::from("out"));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(!args.verbose);
    }

    #[test]
    fn test_parse_check_diff_and_verbose() {
        let args = Args::try_parse_from([
            "dataset-archiver",
            "-v",
            "check",
            "--dataset_dir_a=a",
            "--dataset_dir_b=b",
            "--diff",
        ])
        .unwrap();
        assert!(args.verbose);
        assert!(matches!(args.command, Commands::Check { diff: true, .. }));
    }

    #[test]
    fn test_missing_dataset_dir_is_rejected() {
        let err = Args::try_parse_from([
            "dataset-archiver",
            "create",
            "--dataset_dir=/definitely/not/here",
            "--archives_path=out",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
