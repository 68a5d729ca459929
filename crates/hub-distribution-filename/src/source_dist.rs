use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hub_normalize::{InvalidNameError, PackageName};
use hub_pep440::{Version, VersionParseError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceDistExtension {
    Zip,
    TarGz,
    TarBz2,
    TarXz,
    TarZst,
}

impl FromStr for SourceDistExtension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "zip" => Self::Zip,
            "tar.gz" => Self::TarGz,
            "tar.bz2" => Self::TarBz2,
            "tar.xz" => Self::TarXz,
            "tar.zst" => Self::TarZst,
            other => return Err(other.to_string()),
        })
    }
}

impl Display for SourceDistExtension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zip => f.write_str("zip"),
            Self::TarGz => f.write_str("tar.gz"),
            Self::TarBz2 => f.write_str("tar.bz2"),
            Self::TarXz => f.write_str("tar.xz"),
            Self::TarZst => f.write_str("tar.zst"),
        }
    }
}

impl SourceDistExtension {
    /// Split a filename into its stem and archive extension.
    pub fn from_filename(filename: &str) -> Option<(&str, Self)> {
        [
            (".zip", Self::Zip),
            (".tar.gz", Self::TarGz),
            (".tar.bz2", Self::TarBz2),
            (".tar.xz", Self::TarXz),
            (".tar.zst", Self::TarZst),
        ]
        .into_iter()
        .find_map(|(suffix, extension)| {
            filename
                .strip_suffix(suffix)
                .map(|stem| (stem, extension))
        })
    }
}

/// A parsed source distribution filename, `{name}-{version}.{extension}`.
///
/// Note that this is a normalized and not an exact representation, keep the original string if
/// you need the latter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceDistFilename {
    pub name: PackageName,
    pub version: Version,
    pub extension: SourceDistExtension,
}

impl SourceDistFilename {
    /// No `FromStr` impl since we need to know the package name to be able to reasonably parse
    /// these (consider e.g. `a-1-1.zip`).
    pub fn parse(
        filename: &str,
        package_name: &PackageName,
    ) -> Result<Self, SourceDistFilenameError> {
        let error = |kind| SourceDistFilenameError {
            filename: filename.to_string(),
            kind,
        };

        let Some((stem, extension)) = SourceDistExtension::from_filename(filename) else {
            return Err(error(SourceDistFilenameErrorKind::Extension));
        };

        // The name may be spelled with any separators, so compare its normalized form.
        let name_len = package_name.as_ref().len();
        let (Some(name), Some(version)) = (stem.get(..name_len), stem.get(name_len + 1..)) else {
            return Err(error(SourceDistFilenameErrorKind::Filename(
                package_name.clone(),
            )));
        };
        if stem.as_bytes().get(name_len) != Some(&b'-') || version.is_empty() {
            return Err(error(SourceDistFilenameErrorKind::Filename(
                package_name.clone(),
            )));
        }
        let actual_name = PackageName::from_str(name)
            .map_err(|err| error(SourceDistFilenameErrorKind::PackageName(err)))?;
        if &actual_name != package_name {
            return Err(error(SourceDistFilenameErrorKind::Filename(
                package_name.clone(),
            )));
        }

        let version = Version::from_str(version)
            .map_err(|err| error(SourceDistFilenameErrorKind::Version(err)))?;

        Ok(Self {
            name: package_name.clone(),
            version,
            extension,
        })
    }
}

impl Display for SourceDistFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.version, self.extension)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to parse source distribution filename {filename}: {kind}")]
pub struct SourceDistFilenameError {
    filename: String,
    kind: SourceDistFilenameErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
enum SourceDistFilenameErrorKind {
    #[error("Name doesn't start with package name {0}")]
    Filename(PackageName),
    #[error("Source distributions filenames must end with .zip, .tar.gz, .tar.bz2, .tar.xz or .tar.zst")]
    Extension,
    #[error("Version section is invalid")]
    Version(#[source] VersionParseError),
    #[error(transparent)]
    PackageName(InvalidNameError),
}
