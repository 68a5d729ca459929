use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use hub_pypi_types::IndexUrl;
use hub_resolver::ResolutionOptions;

/// How to resolve, shared by every target.
///
/// Values given on the command line (or through the environment) take precedence over the
/// settings file.
#[derive(Args, Debug, Default)]
pub(crate) struct ResolutionArgs {
    /// A TOML file with resolution settings, e.g. `index-url` or `retries`.
    #[arg(long, env = "HUB_CONFIG_FILE")]
    config_file: Option<PathBuf>,
    /// The URL of the package index.
    #[arg(long, short, env = "HUB_INDEX_URL")]
    index_url: Option<IndexUrl>,
    /// Indexes to query when the package isn't found on the primary one.
    #[arg(long, env = "HUB_EXTRA_INDEX_URL", value_delimiter = ' ')]
    extra_index_url: Option<Vec<IndexUrl>>,
    /// How often to retry failed index requests.
    #[arg(long, env = "HUB_RETRIES")]
    retries: Option<u32>,
    /// The timeout for a single index request, in seconds.
    #[arg(long, env = "HUB_TIMEOUT")]
    timeout: Option<u64>,
    /// The directory to download distributions into while reading their metadata.
    #[arg(long, env = "HUB_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
    /// Consider pre-release versions.
    #[arg(long)]
    prerelease: bool,
    /// Don't prefer versions that have a wheel over newer versions that don't.
    #[arg(long)]
    no_prefer_binary: bool,
    /// Accept distributions whatever python version they declare they require.
    #[arg(long)]
    ignore_requires_python: bool,
}

impl ResolutionArgs {
    /// The settings file (if any), overridden by the command line.
    pub(crate) fn options(self) -> Result<ResolutionOptions> {
        let base = match &self.config_file {
            Some(path) => read_settings(path)?,
            None => ResolutionOptions::default(),
        };
        Ok(self.apply(base))
    }

    fn apply(self, options: ResolutionOptions) -> ResolutionOptions {
        ResolutionOptions {
            index_url: self.index_url.unwrap_or(options.index_url),
            extra_index_urls: self.extra_index_url.unwrap_or(options.extra_index_urls),
            retries: self.retries.unwrap_or(options.retries),
            timeout: self.timeout.map_or(options.timeout, Duration::from_secs),
            cache_dir: self.cache_dir.or(options.cache_dir),
            allow_prereleases: self.prerelease || options.allow_prereleases,
            prefer_binary: !self.no_prefer_binary && options.prefer_binary,
            ignore_requires_python: self.ignore_requires_python || options.ignore_requires_python,
            ..options
        }
    }
}

fn read_settings(path: &Path) -> Result<ResolutionOptions> {
    let contents = fs_err::read_to_string(path)?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse settings file: `{}`", path.display()))
}

/// The requirements to check, given inline or in requirements files.
#[derive(Args, Debug, Default)]
pub(crate) struct RequirementsArgs {
    /// Requirements, e.g. `numpy>=1.20`.
    requirements: Vec<String>,
    /// Read requirements from a file, one per line.
    #[arg(long, short)]
    requirement: Vec<PathBuf>,
}

impl RequirementsArgs {
    pub(crate) fn requirements(self) -> Result<Vec<String>> {
        let mut requirements = self.requirements;
        for path in &self.requirement {
            let contents = fs_err::read_to_string(path)?;
            requirements.extend(parse_requirements_file(&contents));
        }
        if requirements.is_empty() {
            anyhow::bail!("No requirements given, pass them as arguments or with `-r`");
        }
        Ok(requirements)
    }
}

/// Requirement lines, skipping comments, blank lines and pip options.
fn parse_requirements_file(contents: &str) -> impl Iterator<Item = String> + '_ {
    contents.lines().filter_map(|line| {
        let line = match line.find(" #") {
            Some(comment) => &line[..comment],
            None => line,
        }
        .trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            None
        } else {
            Some(line.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;
    use indoc::indoc;

    use super::{RequirementsArgs, ResolutionArgs, parse_requirements_file};

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        resolution: ResolutionArgs,
        #[command(flatten)]
        requirements: RequirementsArgs,
    }

    #[test]
    fn flags_override_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("hub.toml");
        fs_err::write(
            &settings,
            indoc! {r#"
                index-url = "https://example.org/simple"
                retries = 7
                timeout = 60
                prefer-binary = true
            "#},
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "hub-dev",
            "--config-file",
            settings.to_str().unwrap(),
            "--timeout",
            "5",
            "--no-prefer-binary",
            "six",
        ])
        .unwrap();
        let options = cli.resolution.options().unwrap();
        insta::assert_snapshot!(options.index_url, @"https://example.org/simple");
        assert_eq!(options.retries, 7);
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert!(!options.prefer_binary);
        assert!(!options.allow_prereleases);
        assert_eq!(cli.requirements.requirements().unwrap(), ["six"]);
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["hub-dev", "six"]).unwrap();
        let options = cli.resolution.options().unwrap();
        insta::assert_snapshot!(options.index_url, @"https://pypi.org/simple");
        assert_eq!(options.retries, 3);
        assert!(options.prefer_binary);
    }

    #[test]
    fn invalid_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("hub.toml");
        fs_err::write(&settings, "retries = \"many\"").unwrap();
        let cli = Cli::try_parse_from([
            "hub-dev",
            "--config-file",
            settings.to_str().unwrap(),
            "six",
        ])
        .unwrap();
        let err = cli.resolution.options().unwrap_err();
        assert!(
            err.to_string().starts_with("Failed to parse settings file"),
            "{err}"
        );
    }

    #[test]
    fn requirements_file() {
        let requirements = parse_requirements_file(indoc! {"
            # Runtime
            numpy>=1.20
            --index-url https://example.org/simple

            scipy ; sys_platform == 'linux'  # only on linux
        "})
        .collect::<Vec<_>>();
        insta::assert_debug_snapshot!(requirements, @r#"
        [
            "numpy>=1.20",
            "scipy ; sys_platform == 'linux'",
        ]
        "#);
    }

    #[test]
    fn no_requirements() {
        let cli = Cli::try_parse_from(["hub-dev"]).unwrap();
        assert!(cli.requirements.requirements().is_err());
    }
}
