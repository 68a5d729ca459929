use std::fmt::{Display, Formatter};

use hub_normalize::PackageName;
use hub_pep440::Version;

/// A structured event emitted while resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverEvent {
    /// The solver tried a candidate for a package.
    Selected {
        package: PackageName,
        version: Option<Version>,
        filename: Option<String>,
    },
    /// A candidate was ruled out because the target can't use it.
    Rejected {
        package: PackageName,
        version: Option<Version>,
        reason: String,
    },
    /// A candidate was skipped because its metadata could not be read.
    MetadataUnavailable {
        package: PackageName,
        version: Option<Version>,
        reason: String,
    },
    /// The round bound was reached.
    Exhausted { rounds: usize },
}

impl Display for ResolverEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Selected {
                package,
                version: Some(version),
                ..
            } => write!(f, "selected {package}=={version}"),
            Self::Selected {
                package,
                version: None,
                filename,
            } => write!(
                f,
                "selected {package} @ {}",
                filename.as_deref().unwrap_or("<unknown>")
            ),
            Self::Rejected {
                package,
                version,
                reason,
            } => match version {
                Some(version) => write!(f, "rejected {package}=={version}: {reason}"),
                None => write!(f, "rejected {package}: {reason}"),
            },
            Self::MetadataUnavailable {
                package,
                version,
                reason,
            } => match version {
                Some(version) => write!(f, "no metadata for {package}=={version}: {reason}"),
                None => write!(f, "no metadata for {package}: {reason}"),
            },
            Self::Exhausted { rounds } => write!(f, "exhausted after {rounds} rounds"),
        }
    }
}

/// Receives [`ResolverEvent`]s while resolving.
///
/// Implemented for any `Fn(&ResolverEvent)`.
pub trait Reporter: Send + Sync {
    fn on_event(&self, event: &ResolverEvent);
}

impl<F> Reporter for F
where
    F: Fn(&ResolverEvent) + Send + Sync,
{
    fn on_event(&self, event: &ResolverEvent) {
        self(event);
    }
}
