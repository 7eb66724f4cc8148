//! `owl run`

use clap::Args;
use std::sync::Arc;

use owl_common::SystemExecutor;

use super::CommonArgs;
use crate::coordinator::RunCoordinator;
use crate::report::HtmlReportGenerator;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Replace the baseline screenshots with the ones from this run
    #[arg(short, long)]
    pub update: bool,

    /// Build the app before installing it
    #[arg(long)]
    pub build: bool,
}

pub async fn execute(args: RunArgs, verbose: bool) -> anyhow::Result<()> {
    let run = super::resolve(&args.common, args.update, verbose)?;

    let mut coordinator = RunCoordinator::new(
        run,
        Arc::new(SystemExecutor),
        Arc::new(HtmlReportGenerator),
    )
    .with_build(args.build);

    coordinator.run().await?;
    Ok(())
}
