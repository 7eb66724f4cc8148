//! owl CLI - Main Entry Point

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;

use owl_cli::commands::{build, run};
use owl_common::logging::PREFIX;

/// owl - visual regression testing for React Native apps
#[derive(Parser)]
#[command(name = "owl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the app for a platform
    Build(build::BuildArgs),

    /// Install, launch and run the screenshot tests
    Run(run::RunArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build(args) => build::execute(args, cli.verbose).await,
        Commands::Run(args) => run::execute(args, cli.verbose).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {} {:#}", PREFIX, "✗".red(), e);
            ExitCode::FAILURE
        }
    }
}
