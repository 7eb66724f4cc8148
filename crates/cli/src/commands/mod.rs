//! CLI subcommands

use anyhow::Context;
use clap::Args;
use std::path::PathBuf;
use tracing::debug;

use owl_common::{logging, OwlConfig, Platform, RunConfiguration};

pub mod build;
pub mod run;

/// Arguments shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Platform to target: ios, tvos or android
    #[arg(short, long)]
    pub platform: Platform,

    /// Path to the owl config file
    #[arg(short, long, default_value = "./owl.config.json", env = "OWL_CONFIG")]
    pub config: PathBuf,
}

/// Load the config file, start logging and resolve the run configuration
pub fn resolve(
    common: &CommonArgs,
    update_baseline: bool,
    verbose: bool,
) -> anyhow::Result<RunConfiguration> {
    let file = OwlConfig::load(&common.config)?;
    logging::init(file.debug || verbose);
    debug!(
        "[OWL - CLI] Using the config file {}.",
        common.config.display()
    );

    let project_root =
        std::env::current_dir().context("cannot determine the current directory")?;
    let run = RunConfiguration::resolve(file, common.platform, update_baseline, project_root)?;
    Ok(run)
}
