use thiserror::Error;

use hub_normalize::PackageName;
use hub_pep440::{VersionParseError, VersionSpecifier};
use hub_pep508::Pep508Error;

use crate::result::ResolutionResult;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Failed to parse requirement `{0}`")]
    Requirement(String, #[source] Box<Pep508Error>),

    #[error("Invalid target python version")]
    PythonVersion(#[source] VersionParseError),

    #[error("Failed to create a scratch directory")]
    Scratch(#[source] std::io::Error),

    #[error(transparent)]
    Client(#[from] hub_client::Error),

    #[error(transparent)]
    NoSolution(#[from] NoSolutionError),

    #[error("Resolution did not finish within {0} rounds")]
    RoundLimit(usize),

    #[error("`~=` requires at least two release segments: `{0}`")]
    InvalidTildeEquals(VersionSpecifier),

    /// The solver failed in a way that isn't a conflict between requirements.
    #[error("{0}")]
    Solver(String),
}

/// No assignment of versions satisfies the requirements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct NoSolutionError {
    pub(crate) package: Option<PackageName>,
    pub(crate) reason: String,
    pub(crate) requirements: Vec<String>,
}

impl NoSolutionError {
    /// The package for which no acceptable candidate remained.
    pub fn package(&self) -> Option<&PackageName> {
        self.package.as_ref()
    }
}

impl From<ResolveError> for ResolutionResult {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NoSolution(NoSolutionError {
                reason,
                requirements,
                ..
            }) => Self::Impossible {
                reason,
                conflicting_requirements: requirements,
            },
            err @ ResolveError::RoundLimit(_) => Self::Impossible {
                reason: err.to_string(),
                conflicting_requirements: Vec::new(),
            },
            err => Self::UnknownError {
                cause: format_chain(&err),
            },
        }
    }
}

/// Render an error with its sources, e.g. `Failed to fetch: ...: connection refused`.
fn format_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}
