use std::process::ExitCode;
use std::time::Instant;

use anstream::eprintln;
use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use hub_logging::{Level, setup_logging};

use crate::installability::InstallabilityArgs;
use crate::resolve_cli::ResolveCliArgs;

mod installability;
mod resolve_cli;
mod settings;

#[derive(Parser)]
#[command(name = "hub-dev", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Use verbose output, repeat for timestamps and spans.
    #[arg(global = true, long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Resolve requirements for one target and list what would be installed.
    Resolve(ResolveCliArgs),
    /// Check requirements against a matrix of python versions and platforms.
    Installability(InstallabilityArgs),
}

#[instrument(skip_all)] // Anchor span to check for overhead
async fn run(command: Command) -> Result<()> {
    match command {
        Command::Resolve(args) => resolve_cli::resolve_cli(args).await,
        Command::Installability(args) => installability::installability(args).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::Default,
        1 => Level::Verbose,
        _ => Level::ExtraVerbose,
    };
    if let Err(err) = setup_logging(level) {
        eprintln!("{}: {err}", "error".red().bold());
        return ExitCode::FAILURE;
    }

    let start = Instant::now();
    let result = run(cli.command).await;
    debug!("Took {}ms", start.elapsed().as_millis());
    if let Err(err) = result {
        eprintln!("{}", "hub-dev failed".red().bold());
        for err in err.chain() {
            eprintln!("  {}: {}", "Caused by".red().bold(), err);
        }
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
