use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use hub_normalize::PackageName;
use hub_pep440::Version;

/// Where a resolved artifact comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Wheel,
    Sdist,
    Vcs,
    Local,
}

impl SourceKind {
    /// Classify a direct URL reference.
    pub fn from_url(url: &Url) -> Self {
        let is_wheel = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .is_some_and(|filename| filename.ends_with(".whl"));
        if ["git+", "hg+", "svn+", "bzr+"]
            .iter()
            .any(|prefix| url.scheme().starts_with(prefix))
        {
            Self::Vcs
        } else if is_wheel {
            Self::Wheel
        } else if url.scheme() == "file" {
            Self::Local
        } else {
            Self::Sdist
        }
    }
}

/// One package in a resolution, with the distribution that would be installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    pub package_name: PackageName,
    /// `None` for VCS and local references, whose version is only known after building.
    pub version: Option<Version>,
    pub is_wheel: bool,
    pub wheel_platform_tags: Option<Vec<String>>,
    pub source_kind: SourceKind,
    pub filename: Option<String>,
}

/// The outcome of resolving a set of requirements for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ResolutionResult {
    /// A consistent set of distributions, covering every requirement and its dependencies.
    Resolved {
        artifacts: BTreeMap<PackageName, ResolvedArtifact>,
    },
    /// The requirements can't be satisfied on this target.
    Impossible {
        reason: String,
        conflicting_requirements: Vec<String>,
    },
    /// Resolution failed for a reason unrelated to the requirements, e.g. the network.
    UnknownError { cause: String },
}

impl ResolutionResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    pub fn is_unknown_error(&self) -> bool {
        matches!(self, Self::UnknownError { .. })
    }

    /// The resolved artifacts, if resolution succeeded.
    pub fn artifacts(&self) -> Option<&BTreeMap<PackageName, ResolvedArtifact>> {
        match self {
            Self::Resolved { artifacts } => Some(artifacts),
            _ => None,
        }
    }
}
