//! `audit` command: survey an extract's tags without loading it.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use wrangle_data::{AuditOptions, AuditReport, audit_osm_xml};

use crate::{
    ARG_OSM_XML, ARG_RULES, ARG_SAMPLE_LIMIT, CliError, ENV_AUDIT_OSM_XML, load_rules,
    open_extract, require_existing, write_report,
};

/// CLI arguments for the `audit` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Read an OSM XML extract (optionally .bz2) and report key \
                 frequencies, street-name endings, value distributions and \
                 what the cleaning rules would change or flag. Nothing is \
                 written to disk.",
    about = "Audit the tags of an OSM XML extract"
)]
#[ortho_config(prefix = "OSM_WRANGLE")]
pub(crate) struct AuditArgs {
    /// Path to the OSM XML extract.
    #[arg(long = ARG_OSM_XML, value_name = "path")]
    #[serde(default)]
    pub(crate) osm_xml: Option<Utf8PathBuf>,
    /// JSON rule document replacing the built-in cleaning rules.
    #[arg(long = ARG_RULES, value_name = "path")]
    #[serde(default)]
    pub(crate) rules: Option<Utf8PathBuf>,
    /// Example values kept per rule and per flag.
    #[arg(long = ARG_SAMPLE_LIMIT, value_name = "n")]
    #[serde(default)]
    pub(crate) sample_limit: Option<usize>,
}

impl AuditArgs {
    pub(crate) fn into_config(self) -> Result<AuditConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        AuditConfig::try_from(merged)
    }
}

/// Resolved `audit` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuditConfig {
    pub(crate) osm_xml: Utf8PathBuf,
    pub(crate) rules: Option<Utf8PathBuf>,
    pub(crate) sample_limit: usize,
}

impl AuditConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.osm_xml, ARG_OSM_XML)?;
        if let Some(rules) = &self.rules {
            require_existing(rules, ARG_RULES)?;
        }
        Ok(())
    }
}

impl TryFrom<AuditArgs> for AuditConfig {
    type Error = CliError;

    fn try_from(args: AuditArgs) -> Result<Self, Self::Error> {
        let osm_xml = args.osm_xml.ok_or(CliError::MissingArgument {
            field: ARG_OSM_XML,
            env: ENV_AUDIT_OSM_XML,
        })?;
        Ok(Self {
            osm_xml,
            rules: args.rules,
            sample_limit: args
                .sample_limit
                .unwrap_or(AuditOptions::default().sample_limit),
        })
    }
}

pub(crate) fn run_audit_with(args: AuditArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let report = execute_audit(&config)?;
    write_report(writer, &report)
}

pub(crate) fn execute_audit(config: &AuditConfig) -> Result<AuditReport, CliError> {
    config.validate_sources()?;
    let rules = load_rules(config.rules.as_ref())?;
    let options = AuditOptions {
        sample_limit: config.sample_limit,
        ..AuditOptions::default()
    };
    info!("auditing {}", config.osm_xml);
    let reader = open_extract(&config.osm_xml)?;
    audit_osm_xml(reader, &rules, options).map_err(|source| CliError::Audit {
        path: config.osm_xml.clone(),
        source,
    })
}

#[cfg(test)]
pub(crate) fn audit_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<AuditConfig, CliError> {
    let merged = AuditArgs::merge_from_layers(layers).map_err(CliError::from)?;
    AuditConfig::try_from(merged)
}
