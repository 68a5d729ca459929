pub use cache::ResolutionCache;
pub use report::{InstallabilityReport, TargetReport};
pub use requirements::{DEFAULT_CONCURRENCY, InstallationRequirements};

mod cache;
mod report;
mod requirements;
