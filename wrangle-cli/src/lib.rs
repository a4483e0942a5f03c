//! Command-line interface for auditing and ingesting OSM XML extracts.
#![forbid(unsafe_code)]

mod audit;
mod error;
mod ingest;

use std::{
    ffi::OsString,
    io::{BufRead, BufReader, ErrorKind, Write},
};

use bzip2::read::MultiBzDecoder;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use clap::{Parser, Subcommand};
use serde::Serialize;
use wrangle_data::RuleSet;

use audit::{AuditArgs, run_audit_with};
pub use error::CliError;
use ingest::{IngestArgs, run_ingest_with};

const ARG_OSM_XML: &str = "osm-xml";
const ARG_DATABASE: &str = "database";
const ARG_RULES: &str = "rules";
const ARG_BATCH_SIZE: &str = "batch-size";
const ARG_REFERENCE_MODE: &str = "reference-mode";
const ARG_TIMEOUT_SECS: &str = "timeout-secs";
const ARG_SAMPLE_LIMIT: &str = "sample-limit";
const ENV_INGEST_OSM_XML: &str = "OSM_WRANGLE_CMDS_INGEST_OSM_XML";
const ENV_INGEST_DATABASE: &str = "OSM_WRANGLE_CMDS_INGEST_DATABASE";
const ENV_AUDIT_OSM_XML: &str = "OSM_WRANGLE_CMDS_AUDIT_OSM_XML";

/// Run the CLI with the current process arguments, printing the report to
/// stdout.
pub fn run() -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_with(std::env::args_os(), &mut stdout)
}

/// Run the CLI with explicit arguments, writing the report to `writer`.
pub fn run_with<I, T>(args: I, writer: &mut dyn Write) -> Result<(), CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Audit(args) => run_audit_with(args, writer),
        Command::Ingest(args) => run_ingest_with(args, writer),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "osm-wrangle",
    about = "Audit, clean and load OpenStreetMap XML extracts",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report key usage and what the cleaning rules would change.
    Audit(AuditArgs),
    /// Clean an extract and load it into SQLite.
    Ingest(IngestArgs),
}

/// Whether `path` names a bzip2-compressed file.
pub(crate) fn is_bz2(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("bz2"))
}

/// Check that `path` exists and is a regular file.
pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match fs_utf8::Dir::open_ambient_dir(parent_or_current(path), ambient_authority())
        .and_then(|dir| dir.metadata(path.file_name().unwrap_or_default()))
    {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == ErrorKind::NotFound => Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CliError::OpenSource {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parent_or_current(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

/// Open an extract, decompressing `.bz2` files on the fly.
pub(crate) fn open_extract(path: &Utf8Path) -> Result<Box<dyn BufRead>, CliError> {
    let file = fs_utf8::File::open_ambient(path, ambient_authority()).map_err(|source| {
        CliError::OpenSource {
            field: ARG_OSM_XML,
            path: path.to_path_buf(),
            source,
        }
    })?;
    if is_bz2(path) {
        Ok(Box::new(BufReader::new(MultiBzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// The rule table at `path`, or the built-in table.
pub(crate) fn load_rules(path: Option<&Utf8PathBuf>) -> Result<RuleSet, CliError> {
    let Some(path) = path else {
        return RuleSet::builtin().map_err(CliError::BuiltinRules);
    };
    let file = fs_utf8::File::open_ambient(path, ambient_authority()).map_err(|source| {
        CliError::OpenSource {
            field: ARG_RULES,
            path: path.clone(),
            source,
        }
    })?;
    RuleSet::from_json_reader(BufReader::new(file)).map_err(|source| CliError::LoadRules {
        path: path.clone(),
        source,
    })
}

/// Write `report` as pretty JSON followed by a newline.
pub(crate) fn write_report<T: Serialize>(writer: &mut dyn Write, report: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(report).map_err(CliError::SerialiseReport)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteReport)?;
    writer.write_all(b"\n").map_err(CliError::WriteReport)?;
    Ok(())
}

#[cfg(test)]
mod tests;
