//! `owl build`

use clap::Args;
use std::sync::Arc;
use tracing::{debug, info};

use owl_common::SystemExecutor;

use super::CommonArgs;
use crate::driver;

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn execute(args: BuildArgs, verbose: bool) -> anyhow::Result<()> {
    let run = super::resolve(&args.common, false, verbose)?;
    info!("[OWL - CLI] Building the app on {} platform.", run.platform);

    let driver = driver::for_run(&run, Arc::new(SystemExecutor));
    driver.build().await?;

    debug!("[OWL - CLI] Successfully built for the {} platform.", run.platform);
    Ok(())
}
