use std::fmt::{Display, Formatter};

use hub_normalize::PackageName;
use hub_pep440::Version;

pub use source_dist::{SourceDistExtension, SourceDistFilename, SourceDistFilenameError};
pub use wheel::{WheelFilename, WheelFilenameError};

mod source_dist;
mod wheel;

/// A parsed distribution filename, either a wheel or a source distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistFilename {
    SourceDistFilename(SourceDistFilename),
    WheelFilename(WheelFilename),
}

impl DistFilename {
    /// Parse a filename as wheel or source dist name.
    ///
    /// Returns `None` for files that are neither, such as `.egg` or `.exe` installers, and for
    /// files that don't belong to `package_name`.
    pub fn try_from_filename(filename: &str, package_name: &PackageName) -> Option<Self> {
        if let Ok(filename) = filename.parse::<WheelFilename>() {
            if &filename.name == package_name {
                return Some(Self::WheelFilename(filename));
            }
            return None;
        }
        SourceDistFilename::parse(filename, package_name)
            .ok()
            .map(Self::SourceDistFilename)
    }

    pub fn name(&self) -> &PackageName {
        match self {
            Self::SourceDistFilename(filename) => &filename.name,
            Self::WheelFilename(filename) => &filename.name,
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            Self::SourceDistFilename(filename) => &filename.version,
            Self::WheelFilename(filename) => &filename.version,
        }
    }

    pub fn is_wheel(&self) -> bool {
        matches!(self, Self::WheelFilename(_))
    }
}

impl Display for DistFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceDistFilename(filename) => Display::fmt(filename, f),
            Self::WheelFilename(filename) => Display::fmt(filename, f),
        }
    }
}
