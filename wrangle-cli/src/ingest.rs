//! `ingest` command: clean an extract and load it into SQLite.

use std::{io::Write, time::Duration};

use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use wrangle_data::{
    IngestOptions, IngestReport, ReferenceMode, ingest::DEFAULT_BATCH_SIZE, ingest_osm_xml,
    load::open_database,
};

use crate::{
    ARG_BATCH_SIZE, ARG_DATABASE, ARG_OSM_XML, ARG_REFERENCE_MODE, ARG_RULES, ARG_TIMEOUT_SECS,
    CliError, ENV_INGEST_DATABASE, ENV_INGEST_OSM_XML, load_rules, open_extract,
    require_existing, write_report,
};

/// CLI arguments for the `ingest` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Parse an OSM XML extract (optionally .bz2), clean its tags \
                 and load nodes, ways, relations, tags and memberships into a \
                 SQLite database. The database is rebuilt from scratch. \
                 Paths and settings can come from CLI flags, configuration \
                 files, or environment variables.",
    about = "Load an OSM XML extract into SQLite"
)]
#[ortho_config(prefix = "OSM_WRANGLE")]
pub(crate) struct IngestArgs {
    /// Path to the OSM XML extract.
    #[arg(long = ARG_OSM_XML, value_name = "path")]
    #[serde(default)]
    pub(crate) osm_xml: Option<Utf8PathBuf>,
    /// Destination SQLite database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// JSON rule document replacing the built-in cleaning rules.
    #[arg(long = ARG_RULES, value_name = "path")]
    #[serde(default)]
    pub(crate) rules: Option<Utf8PathBuf>,
    /// Elements written per transaction.
    #[arg(long = ARG_BATCH_SIZE, value_name = "n")]
    #[serde(default)]
    pub(crate) batch_size: Option<usize>,
    /// Treatment of members whose target is missing: strict, lenient or deferred.
    #[arg(long = ARG_REFERENCE_MODE, value_name = "mode")]
    #[serde(default)]
    pub(crate) reference_mode: Option<ReferenceMode>,
    /// Abort reading after this many seconds.
    #[arg(long = ARG_TIMEOUT_SECS, value_name = "n")]
    #[serde(default)]
    pub(crate) timeout_secs: Option<u64>,
}

impl IngestArgs {
    pub(crate) fn into_config(self) -> Result<IngestConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IngestConfig::try_from(merged)
    }
}

/// Resolved `ingest` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IngestConfig {
    pub(crate) osm_xml: Utf8PathBuf,
    pub(crate) database: Utf8PathBuf,
    pub(crate) rules: Option<Utf8PathBuf>,
    pub(crate) batch_size: usize,
    pub(crate) reference_mode: ReferenceMode,
    pub(crate) timeout: Option<Duration>,
}

impl IngestConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.osm_xml, ARG_OSM_XML)?;
        if let Some(rules) = &self.rules {
            require_existing(rules, ARG_RULES)?;
        }
        Ok(())
    }
}

impl TryFrom<IngestArgs> for IngestConfig {
    type Error = CliError;

    fn try_from(args: IngestArgs) -> Result<Self, Self::Error> {
        let osm_xml = args.osm_xml.ok_or(CliError::MissingArgument {
            field: ARG_OSM_XML,
            env: ENV_INGEST_OSM_XML,
        })?;
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_INGEST_DATABASE,
        })?;
        let batch_size = args.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(CliError::ZeroArgument {
                field: ARG_BATCH_SIZE,
            });
        }
        Ok(Self {
            osm_xml,
            database,
            rules: args.rules,
            batch_size,
            reference_mode: args.reference_mode.unwrap_or_default(),
            timeout: args.timeout_secs.map(Duration::from_secs),
        })
    }
}

pub(crate) fn run_ingest_with(args: IngestArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let report = execute_ingest(&config)?;
    write_report(writer, &report)
}

pub(crate) fn execute_ingest(config: &IngestConfig) -> Result<IngestReport, CliError> {
    config.validate_sources()?;
    let options = IngestOptions {
        batch_size: config.batch_size,
        reference_mode: config.reference_mode,
        rules: load_rules(config.rules.as_ref())?,
        timeout: config.timeout,
        reset: true,
    };
    let reader = open_extract(&config.osm_xml)?;
    let mut connection = open_database(&config.database)?;
    info!(
        "ingesting {} into {} ({} mode, batches of {})",
        config.osm_xml, config.database, config.reference_mode, config.batch_size
    );
    ingest_osm_xml(reader, &mut connection, &options).map_err(|source| CliError::Ingest {
        path: config.osm_xml.clone(),
        source,
    })
}

#[cfg(test)]
pub(crate) fn ingest_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<IngestConfig, CliError> {
    let merged = IngestArgs::merge_from_layers(layers).map_err(CliError::from)?;
    IngestConfig::try_from(merged)
}
