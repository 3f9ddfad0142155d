//! Dispatch of parsed CLI commands to the library.
//!
//! Everything printed to stdout is the command's result; diagnostics go
//! through `tracing` to stderr.

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use crate::archive::assemble::create_dataset_archive;
use crate::cli::{Args, Commands};
use crate::config::ArchiveOptions;
use crate::extract::{extract_dataset_archive, verify_dataset_archive};
use crate::manifest::{self, aggregate, check_datasets, diff_datasets, CheckOutcome};
use crate::meta::Metadata;

const MISSING: &str = "<missing>";

/// Runs one parsed command, writing its result to stdout.
pub fn run_cli_app(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if run_command(&args.command, &ArchiveOptions::default(), &mut out)? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Same as [`run_cli_app`] with an explicit sink and options.
///
/// Returns `false` when the command ran but found a damaged archive.
pub fn run_command<W: Write>(
    command: &Commands,
    options: &ArchiveOptions,
    out: &mut W,
) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        Commands::Create { dataset_dir, meta_data, archives_path } => {
            let caller = meta_data
                .as_deref()
                .map(Metadata::from_json_str)
                .transpose()?;
            let created = create_dataset_archive(dataset_dir, caller.as_ref(), archives_path, options)?;
            writeln!(out, "{}", created.path.display())?;
        }
        Commands::Extract { dataset_archive, extract_path } => {
            let target = extract_dataset_archive(dataset_archive, extract_path)?;
            writeln!(out, "{}", target.display())?;
        }
        Commands::Check { dataset_dir_a, dataset_dir_b, diff } => {
            match check_datasets(dataset_dir_a, dataset_dir_b)? {
                CheckOutcome::Same => writeln!(out, "Datasets are the same.")?,
                CheckOutcome::Different => writeln!(out, "Datasets are different")?,
            }
            if *diff {
                print_diff(dataset_dir_a, dataset_dir_b, out)?;
            }
        }
        Commands::Manifest { dataset_dir } => {
            let map = manifest::manifest(dataset_dir)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&map)?)?;
            writeln!(out, "aggregate: {}", aggregate(&map))?;
        }
        Commands::Verify { dataset_archive } => {
            let report = verify_dataset_archive(dataset_archive)?;
            writeln!(out, "recorded: {}", report.recorded)?;
            writeln!(out, "actual:   {}", report.actual)?;
            if !report.is_intact() {
                writeln!(out, "Checksum mismatch")?;
                return Ok(false);
            }
            writeln!(out, "Archive is intact.")?;
        }
    }
    Ok(true)
}

fn print_diff<W: Write>(a: &Path, b: &Path, out: &mut W) -> Result<(), Box<dyn std::error::Error>> {
    let report = diff_datasets(a, b)?;
    for (path, (left, right)) in &report.differences {
        writeln!(
            out,
            "{}: {} -> {}",
            path,
            left.as_deref().unwrap_or(MISSING),
            right.as_deref().unwrap_or(MISSING)
        )?;
    }
    writeln!(out, "aggregate a: {}", report.aggregate_a)?;
    writeln!(out, "aggregate b: {}", report.aggregate_b)?;
    Ok(())
}
