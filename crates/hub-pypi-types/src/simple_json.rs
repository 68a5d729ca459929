use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};

use hub_pep440::{VersionSpecifierParseError, VersionSpecifiers};

use crate::lenient_requirement::LenientVersionSpecifiers;

/// A PEP 691 project detail response.
///
/// <https://peps.python.org/pep-0691/#project-detail>
#[derive(Debug, Clone, Deserialize)]
pub struct SimpleJson {
    pub files: Vec<File>,
}

/// A single (remote) file belonging to a package, either a wheel or a source distribution.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct File {
    /// PEP 714 name of the core metadata field.
    pub core_metadata: Option<CoreMetadata>,
    /// PEP 658 name, superseded by `core-metadata`.
    pub dist_info_metadata: Option<CoreMetadata>,
    /// Non-PEP 691-compliant alias used by PyPI.
    pub data_dist_info_metadata: Option<CoreMetadata>,
    pub filename: String,
    #[serde(default)]
    pub hashes: Hashes,
    /// There are a number of invalid specifiers on PyPI, so we first try to parse it into a
    /// [`VersionSpecifiers`] according to spec (PEP 440), then a [`LenientVersionSpecifiers`]
    /// with fixup for some common problems, and if this still fails, we skip the file.
    #[serde(default, deserialize_with = "deserialize_version_specifiers_lenient")]
    pub requires_python: Option<Result<VersionSpecifiers, VersionSpecifierParseError>>,
    pub size: Option<u64>,
    pub upload_time: Option<Timestamp>,
    pub url: String,
    pub yanked: Option<Yanked>,
}

impl File {
    /// Whether the index serves the file's core metadata separately at `{url}.metadata`.
    pub fn has_core_metadata(&self) -> bool {
        [
            &self.core_metadata,
            &self.dist_info_metadata,
            &self.data_dist_info_metadata,
        ]
        .into_iter()
        .flatten()
        .any(CoreMetadata::is_available)
    }

    pub fn is_yanked(&self) -> bool {
        self.yanked.as_ref().is_some_and(Yanked::is_yanked)
    }
}

/// Parse a `Requires-Python` value leniently. Empty strings mean "no constraint".
pub(crate) fn parse_requires_python_lenient(
    requires_python: &str,
) -> Option<Result<VersionSpecifiers, VersionSpecifierParseError>> {
    if requires_python.trim().is_empty() {
        return None;
    }
    Some(LenientVersionSpecifiers::from_str(requires_python).map(VersionSpecifiers::from))
}

fn deserialize_version_specifiers_lenient<'de, D>(
    deserializer: D,
) -> Result<Option<Result<VersionSpecifiers, VersionSpecifierParseError>>, D::Error>
where
    D: Deserializer<'de>,
{
    let maybe_string: Option<String> = Option::deserialize(deserializer)?;
    Ok(maybe_string.as_deref().and_then(parse_requires_python_lenient))
}

/// Either a flag or the hashes of the metadata file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoreMetadata {
    Bool(bool),
    Hashes(Hashes),
}

impl CoreMetadata {
    pub fn is_available(&self) -> bool {
        match self {
            Self::Bool(is_available) => *is_available,
            Self::Hashes(_) => true,
        }
    }
}

/// PEP 592 yank status: a flag or the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Yanked {
    Bool(bool),
    Reason(String),
}

impl Yanked {
    pub fn is_yanked(&self) -> bool {
        match self {
            Self::Bool(is_yanked) => *is_yanked,
            Self::Reason(_) => true,
        }
    }
}

/// A dictionary mapping a hash name to a hex encoded digest of the file.
///
/// PEP 691 says multiple hashes can be included and the interpretation is left to the client.
/// Only SHA-256 is read.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct Hashes {
    pub sha256: Option<String>,
}
