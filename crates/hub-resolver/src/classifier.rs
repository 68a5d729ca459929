use std::str::FromStr;

use serde::{Deserialize, Serialize};

use hub_distribution_filename::WheelFilename;

use crate::result::ResolvedArtifact;

/// Whether an artifact can only be installed where it was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// A wheel that installs anywhere.
    Pure,
    /// A platform-specific wheel, or anything that has to be built first.
    Native,
}

impl Classification {
    pub fn is_pure(self) -> bool {
        matches!(self, Self::Pure)
    }
}

/// Classifies resolved artifacts from their tags alone, without touching the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactClassifier;

impl ArtifactClassifier {
    /// Source distributions, VCS and local references are [`Classification::Native`]: building
    /// them may compile extensions.
    pub fn classify(artifact: &ResolvedArtifact) -> Classification {
        if !artifact.is_wheel {
            return Classification::Native;
        }

        let is_pure = match artifact
            .filename
            .as_deref()
            .and_then(|filename| WheelFilename::from_str(filename).ok())
        {
            Some(filename) => filename.is_pure(),
            None => artifact
                .wheel_platform_tags
                .as_ref()
                .is_some_and(|tags| !tags.is_empty() && tags.iter().all(|tag| tag == "any")),
        };

        if is_pure {
            Classification::Pure
        } else {
            Classification::Native
        }
    }
}
