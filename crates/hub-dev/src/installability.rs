use std::path::PathBuf;

use anstream::println;
use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::info;

use hub_installability::{DEFAULT_CONCURRENCY, InstallabilityReport, InstallationRequirements};
use hub_resolver::PythonVersion;

use crate::settings::{RequirementsArgs, ResolutionArgs};

#[derive(Parser)]
pub(crate) struct InstallabilityArgs {
    #[command(flatten)]
    requirements: RequirementsArgs,
    /// A supported python version, e.g. `3.11`. Repeat for several.
    #[arg(long = "python-version")]
    python_versions: Vec<PythonVersion>,
    /// A supported platform: `win`, `linux`, `macos` or a wheel platform tag. Repeat for
    /// several.
    #[arg(long = "platform")]
    platforms: Vec<String>,
    /// How many targets to resolve at once.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
    /// Write the report as JSON to this file instead of printing a summary.
    #[arg(long)]
    output: Option<PathBuf>,
    #[command(flatten)]
    resolution: ResolutionArgs,
}

pub(crate) async fn installability(args: InstallabilityArgs) -> Result<()> {
    let python_versions = if args.python_versions.is_empty() {
        vec![None]
    } else {
        args.python_versions.into_iter().map(Some).collect()
    };
    let platforms = if args.platforms.is_empty() {
        vec![None]
    } else {
        args.platforms.into_iter().map(Some).collect()
    };

    let requirements = InstallationRequirements::from_classifiers(
        args.requirements.requirements()?,
        args.resolution.options()?,
        &python_versions,
        &platforms,
    )
    .with_concurrency(args.concurrency);
    info!(
        "Checking {} requirements on {} targets",
        requirements.requirements().len(),
        requirements.options_list().len()
    );

    let report = requirements.report().await;
    match args.output {
        Some(path) => {
            fs_err::write(&path, serde_json::to_string_pretty(&report)?)?;
            println!("Report written to {}", path.display());
        }
        None => print_summary(&report),
    }
    Ok(())
}

fn print_summary(report: &InstallabilityReport) {
    for target in &report.targets {
        if target.installable {
            let wheels = if target.alldeps_wheel {
                "all wheels"
            } else {
                "needs a build"
            };
            let native = if target.has_no_c_extensions_dependencies {
                "pure"
            } else {
                "native"
            };
            println!(
                "{} {}: {} packages, {wheels}, {native}",
                "✓".green(),
                target.target,
                target.num_installed_packages
            );
        } else if target.unexpected_error {
            println!(
                "{} {}: {}",
                "?".yellow(),
                target.target,
                target.reason.as_deref().unwrap_or_default()
            );
        } else {
            println!(
                "{} {}: {}",
                "✗".red(),
                target.target,
                target.reason.as_deref().unwrap_or_default()
            );
        }
    }

    let support = [
        ("windows", report.has_windows_support),
        ("linux", report.has_linux_support),
        ("macos", report.has_macos_support),
    ]
    .into_iter()
    .filter(|(_, supported)| *supported)
    .map(|(family, _)| family)
    .collect::<Vec<_>>();
    if support.is_empty() {
        println!("{}", "Not installable on any platform family".bold());
    } else {
        println!("{} {}", "Installable on".bold(), support.join(", "));
    }
    if report.had_unexpected_error {
        println!(
            "{}",
            "Some targets failed with an unexpected error, their results are unknown".yellow()
        );
    }
}
