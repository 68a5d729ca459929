use rustc_hash::FxHashMap;

use hub_normalize::PackageName;
use hub_pypi_types::Metadata23;

use crate::resolver::candidates::VersionMap;

/// In-memory index of what the sources returned during one resolution.
#[derive(Debug, Default)]
pub(crate) struct InMemoryIndex {
    /// The usable versions of each listed package, `None` if no index knows the package.
    pub(crate) packages: FxHashMap<PackageName, Option<VersionMap>>,

    /// The metadata of each distribution, keyed by file URL. `Err` holds why the metadata is
    /// unavailable.
    pub(crate) distributions: FxHashMap<String, Result<Metadata23, String>>,
}

impl InMemoryIndex {
    /// The number of responses held, used to check that fetching made progress.
    pub(crate) fn len(&self) -> usize {
        self.packages.len() + self.distributions.len()
    }
}
