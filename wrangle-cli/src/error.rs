//! Error types emitted by the `osm-wrangle` CLI.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use wrangle_data::{
    IngestError, ParseError,
    load::OpenStoreError,
    normalise::RuleConfigError,
};

/// Errors emitted by the `osm-wrangle` CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Name of the flag.
        field: &'static str,
        /// Environment variable that also sets it.
        env: &'static str,
    },
    /// A numeric option is out of range.
    #[error("{field} must be at least 1")]
    ZeroArgument {
        /// Name of the flag.
        field: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        /// Name of the flag.
        field: &'static str,
        /// The path given.
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        /// Name of the flag.
        field: &'static str,
        /// The path given.
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected or opened.
    #[error("failed to open {field} path {path:?}: {source}")]
    OpenSource {
        /// Name of the flag.
        field: &'static str,
        /// The path given.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The built-in cleaning rules failed to compile.
    #[error("built-in cleaning rules are invalid: {0}")]
    BuiltinRules(#[source] RuleConfigError),
    /// A rule file could not be used.
    #[error("invalid cleaning rules in {path:?}: {source}")]
    LoadRules {
        /// Rule file path.
        path: Utf8PathBuf,
        /// Why the rules were rejected.
        #[source]
        source: RuleConfigError,
    },
    /// The destination database could not be opened.
    #[error(transparent)]
    OpenDatabase(#[from] OpenStoreError),
    /// The audit could not read the extract.
    #[error("audit of {path:?} failed: {source}")]
    Audit {
        /// Extract path.
        path: Utf8PathBuf,
        /// Parser error.
        #[source]
        source: ParseError,
    },
    /// The ingestion run aborted.
    #[error("ingestion of {path:?} aborted: {source}")]
    Ingest {
        /// Extract path.
        path: Utf8PathBuf,
        /// Pipeline error.
        #[source]
        source: IngestError,
    },
    /// Serialising a report failed.
    #[error("failed to serialise report: {0}")]
    SerialiseReport(#[source] serde_json::Error),
    /// Writing a report failed.
    #[error("failed to write report: {0}")]
    WriteReport(#[source] std::io::Error),
}
