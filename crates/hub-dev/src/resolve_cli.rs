use std::fmt::Write;

use anstream::println;
use anyhow::{Result, bail};
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::debug;

use hub_resolver::{
    ArtifactClassifier, DEFAULT_MAX_ROUNDS, PlatformTargetBuilder, PythonVersion,
    RegistryResolver, ResolutionResult, ResolverEvent, ResolverPort,
};

use crate::settings::{RequirementsArgs, ResolutionArgs};

#[derive(Parser)]
pub(crate) struct ResolveCliArgs {
    #[command(flatten)]
    requirements: RequirementsArgs,
    /// The python version to resolve for, e.g. `3.11`. Defaults to 3.12.
    #[arg(long)]
    python_version: Option<PythonVersion>,
    /// `win`, `linux`, `macos` or a wheel platform tag. Defaults to the current platform.
    #[arg(long)]
    platform: Option<String>,
    /// Give up after this many resolution rounds.
    #[arg(long, default_value_t = DEFAULT_MAX_ROUNDS)]
    max_rounds: usize,
    /// Print every decision the resolver takes.
    #[arg(long)]
    trace_decisions: bool,
    #[command(flatten)]
    resolution: ResolutionArgs,
}

pub(crate) async fn resolve_cli(args: ResolveCliArgs) -> Result<()> {
    let requirements = args.requirements.requirements()?;
    let targets = PlatformTargetBuilder::new(args.resolution.options()?)
        .build(&[args.python_version], &[args.platform]);

    let mut resolver = RegistryResolver::new().with_max_rounds(args.max_rounds);
    if args.trace_decisions {
        resolver = resolver.with_reporter(|event: &ResolverEvent| {
            println!("{}", event.dimmed());
        });
    }

    for options in &targets {
        debug!("Resolving {} requirements for {options}", requirements.len());
        match resolver.resolve(&requirements, options).await {
            ResolutionResult::Resolved { artifacts } => {
                println!("{} {}", "Resolved for".green().bold(), options);
                for artifact in artifacts.values() {
                    let mut line = artifact.package_name.to_string();
                    if let Some(version) = &artifact.version {
                        write!(line, "=={version}")?;
                    }
                    if let Some(filename) = &artifact.filename {
                        write!(line, " ({filename})")?;
                    }
                    let classification = ArtifactClassifier::classify(artifact);
                    if classification.is_pure() {
                        println!("  {line}");
                    } else {
                        println!("  {line} {}", "[native]".yellow());
                    }
                }
            }
            ResolutionResult::Impossible {
                reason,
                conflicting_requirements,
            } => {
                println!("{} {}: {reason}", "Not installable on".red().bold(), options);
                for requirement in conflicting_requirements {
                    println!("  {requirement}");
                }
            }
            ResolutionResult::UnknownError { cause } => {
                bail!("Failed to resolve for {options}: {cause}");
            }
        }
    }
    Ok(())
}
