use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

use hub_platform_tags::PlatformFamily;
use hub_pypi_types::{IndexUrl, IndexUrls};

/// A CPython version to resolve for, e.g. `3.10` or `3.10.4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PythonVersion {
    major: u8,
    minor: u8,
    patch: Option<u8>,
}

impl PythonVersion {
    /// The version resolved for when a target doesn't declare one.
    pub const DEFAULT: Self = Self::new(3, 12, None);

    pub const fn new(major: u8, minor: u8, patch: Option<u8>) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn major(self) -> u8 {
        self.major
    }

    pub fn minor(self) -> u8 {
        self.minor
    }

    pub fn patch(self) -> Option<u8> {
        self.patch
    }

    /// The `python_version` marker value, `{major}.{minor}`.
    pub fn python_version(self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// The `python_full_version` marker value. A missing patch is `0`.
    pub fn python_full_version(self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch.unwrap_or(0))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid python version `{0}`, expected `major.minor` or `major.minor.patch`")]
pub struct PythonVersionError(String);

impl FromStr for PythonVersion {
    type Err = PythonVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(u8::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| PythonVersionError(s.to_string()))?;
        match parts[..] {
            [major, minor] => Ok(Self::new(major, minor, None)),
            [major, minor, patch] => Ok(Self::new(major, minor, Some(patch))),
            _ => Err(PythonVersionError(s.to_string())),
        }
    }
}

impl Display for PythonVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{patch}", self.major, self.minor),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

impl Serialize for PythonVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PythonVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// How to resolve for one target.
///
/// Two options are equal (and hash equally) when they describe the same target, that is the
/// same python version and platform tags. The remaining fields control how the resolution is
/// carried out, not what it's for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolutionOptions {
    pub index_url: IndexUrl,
    pub extra_index_urls: Vec<IndexUrl>,
    /// `None` resolves for [`PythonVersion::DEFAULT`].
    pub python_version: Option<PythonVersion>,
    /// `None` resolves for the platform we're running on.
    pub platform_tags: Option<Vec<String>>,
    pub allow_prereleases: bool,
    /// Build source distributions in isolated environments. Resolution never builds, so this
    /// is carried for callers and has no effect here.
    pub isolated: bool,
    pub cache_dir: Option<PathBuf>,
    /// The per-request timeout, in seconds when serialized.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub retries: u32,
    pub prefer_binary: bool,
    /// Build dependencies without isolation. Like [`ResolutionOptions::isolated`], this has no
    /// effect on a resolution.
    pub no_build_isolation_for_deps: bool,
    pub ignore_requires_python: bool,
}

impl Default for ResolutionOptions {
    fn default() -> Self {
        Self {
            index_url: IndexUrl::Pypi,
            extra_index_urls: Vec::new(),
            python_version: None,
            platform_tags: None,
            allow_prereleases: false,
            isolated: true,
            cache_dir: None,
            timeout: Duration::from_secs(30),
            retries: 3,
            prefer_binary: true,
            no_build_isolation_for_deps: false,
            ignore_requires_python: false,
        }
    }
}

impl PartialEq for ResolutionOptions {
    fn eq(&self, other: &Self) -> bool {
        self.python_version == other.python_version && self.platform_tags == other.platform_tags
    }
}

impl Eq for ResolutionOptions {}

impl Hash for ResolutionOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.python_version.hash(state);
        self.platform_tags.hash(state);
    }
}

impl ResolutionOptions {
    /// The indexes to query, primary first.
    pub fn index_urls(&self) -> IndexUrls {
        IndexUrls::new(self.index_url.clone(), self.extra_index_urls.clone())
    }

    /// The python version to resolve for.
    pub fn target_python_version(&self) -> PythonVersion {
        self.python_version.unwrap_or(PythonVersion::DEFAULT)
    }

    /// The platform tags to resolve for, falling back to the host platform family.
    ///
    /// Hosts outside the known families resolve like Linux.
    pub fn target_platform_tags(&self) -> Vec<String> {
        match &self.platform_tags {
            Some(platform_tags) => platform_tags.clone(),
            None => PlatformFamily::host()
                .unwrap_or(PlatformFamily::Linux)
                .default_tags(),
        }
    }

    /// The family of the target platform, if its tags belong to one.
    pub fn platform_family(&self) -> Option<PlatformFamily> {
        match &self.platform_tags {
            Some(platform_tags) => platform_tags
                .iter()
                .find_map(|tag| PlatformFamily::from_platform_tag(tag)),
            None => Some(PlatformFamily::host().unwrap_or(PlatformFamily::Linux)),
        }
    }
}

impl Display for ResolutionOptions {
    /// A short label for the target, e.g. `3.11 / win_amd64`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let python_version = self.target_python_version();
        match &self.platform_tags {
            Some(platform_tags) => match &platform_tags[..] {
                [] => write!(f, "{python_version} / (no platform)"),
                [tag] => write!(f, "{python_version} / {tag}"),
                [tag, rest @ ..] => write!(f, "{python_version} / {tag} (+{})", rest.len()),
            },
            None => write!(f, "{python_version} / host"),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
