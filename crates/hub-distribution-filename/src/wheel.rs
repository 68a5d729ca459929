use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;
use url::Url;

use hub_normalize::{InvalidNameError, PackageName};
use hub_pep440::{Version, VersionParseError};
use hub_platform_tags::{TagCompatibility, Tags};

/// A parsed [wheel filename](https://packaging.python.org/en/latest/specifications/binary-distribution-format/#file-name-convention),
/// `{name}-{version}(-{build tag})?-{python tag}-{abi tag}-{platform tag}.whl`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct WheelFilename {
    pub name: PackageName,
    pub version: Version,
    pub build_tag: Option<String>,
    pub python_tag: Vec<String>,
    pub abi_tag: Vec<String>,
    pub platform_tag: Vec<String>,
}

impl FromStr for WheelFilename {
    type Err = WheelFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            WheelFilenameError::InvalidWheelFileName(filename.to_string(), reason.to_string())
        };
        let basename = filename
            .strip_suffix(".whl")
            .ok_or_else(|| invalid("Must end with .whl"))?;

        // Five entries, or six when the third is a build tag.
        let parts: Vec<&str> = basename.split('-').collect();
        let (name, version, build_tag, python_tag, abi_tag, platform_tag) = match parts[..] {
            [name, version, python_tag, abi_tag, platform_tag] => {
                (name, version, None, python_tag, abi_tag, platform_tag)
            }
            [name, version, build_tag, python_tag, abi_tag, platform_tag] => (
                name,
                version,
                Some(build_tag),
                python_tag,
                abi_tag,
                platform_tag,
            ),
            [] | [_] => return Err(invalid("Must have a version")),
            [_, _] => return Err(invalid("Must have a Python tag")),
            [_, _, _] => return Err(invalid("Must have an ABI tag")),
            [_, _, _, _] => return Err(invalid("Must have a platform tag")),
            _ => return Err(invalid("Must have 5 or 6 components, but has more")),
        };

        if let Some(build_tag) = build_tag {
            if !build_tag.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(invalid("Build tag must start with a digit"));
            }
        }

        let name = PackageName::from_str(name)
            .map_err(|err| WheelFilenameError::InvalidPackageName(filename.to_string(), err))?;
        let version = Version::from_str(version)
            .map_err(|err| WheelFilenameError::InvalidVersion(filename.to_string(), err))?;
        Ok(Self {
            name,
            version,
            build_tag: build_tag.map(ToString::to_string),
            python_tag: python_tag.split('.').map(String::from).collect(),
            abi_tag: abi_tag.split('.').map(String::from).collect(),
            platform_tag: platform_tag.split('.').map(String::from).collect(),
        })
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}.whl",
            self.name.as_dist_info_name(),
            self.version,
            self.get_tag()
        )
    }
}

impl WheelFilename {
    /// Returns `true` if the wheel is compatible with the given tags.
    pub fn is_compatible(&self, compatible_tags: &Tags) -> bool {
        compatible_tags.is_compatible(&self.python_tag, &self.abi_tag, &self.platform_tag)
    }

    /// Return the [`TagCompatibility`] of the wheel with the given tags.
    pub fn compatibility(&self, compatible_tags: &Tags) -> TagCompatibility {
        compatible_tags.compatibility(&self.python_tag, &self.abi_tag, &self.platform_tag)
    }

    /// Whether the wheel installs anywhere: no ABI and the `any` platform.
    pub fn is_pure(&self) -> bool {
        self.abi_tag.iter().all(|tag| tag == "none")
            && self.platform_tag.iter().all(|tag| tag == "any")
    }

    /// Get the tag for this wheel.
    pub fn get_tag(&self) -> String {
        format!(
            "{}-{}-{}",
            self.python_tag.join("."),
            self.abi_tag.join("."),
            self.platform_tag.join(".")
        )
    }
}

impl TryFrom<&Url> for WheelFilename {
    type Error = WheelFilenameError;

    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        let filename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|filename| !filename.is_empty())
            .ok_or_else(|| {
                WheelFilenameError::InvalidWheelFileName(
                    url.to_string(),
                    "URL must contain a filename".to_string(),
                )
            })?;
        Self::from_str(filename)
    }
}

impl Serialize for WheelFilename {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WheelFilename {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WheelFilenameError {
    #[error("The wheel filename \"{0}\" is invalid: {1}")]
    InvalidWheelFileName(String, String),
    #[error("The wheel filename \"{0}\" has an invalid version part: {1}")]
    InvalidVersion(String, #[source] VersionParseError),
    #[error("The wheel filename \"{0}\" has an invalid package name")]
    InvalidPackageName(String, #[source] InvalidNameError),
}
