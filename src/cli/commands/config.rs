//! Implementation of the `kypria config` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

/// Arguments for `kypria config`
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file (defaults to .kypria/config.yaml merged with local.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Effective configuration and where it came from
#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    /// Explicit file, or the project config directory
    pub source: String,
    /// Merged configuration
    pub config: Config,
    #[serde(skip)]
    yaml: String,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        format!("# effective configuration ({})\n{}", self.source, self.yaml)
    }
}

/// Load and print the effective configuration
pub async fn execute(args: ConfigArgs, json_mode: bool) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
    let source = args
        .config
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| crate::infrastructure::config::CONFIG_DIR.to_string());

    output(&ConfigOutput { source, config, yaml }, json_mode);
    Ok(())
}
