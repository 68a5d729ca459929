pub use classifier::{ArtifactClassifier, Classification};
pub use error::{NoSolutionError, ResolveError};
pub use options::{PythonVersion, PythonVersionError, ResolutionOptions};
pub use port::{RegistryResolver, ResolverPort};
pub use reporter::{Reporter, ResolverEvent};
pub use resolver::{DEFAULT_MAX_ROUNDS, DependencyResolver};
pub use result::{ResolutionResult, ResolvedArtifact, SourceKind};
pub use source::ArtifactSource;
pub use target::{PlatformTargetBuilder, TargetEnvironment, platform_tags};

mod classifier;
mod error;
mod options;
mod port;
mod pubgrub;
mod reporter;
mod resolver;
mod result;
mod source;
mod target;
