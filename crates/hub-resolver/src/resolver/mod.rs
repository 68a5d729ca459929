//! Given a set of requirements and a target, find a set of compatible distributions.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use futures::StreamExt;
use pubgrub::PubGrubError;
use tracing::{debug, instrument, trace};

use hub_normalize::PackageName;
use hub_pep508::{Requirement, VersionOrUrl};
use hub_pypi_types::IndexUrls;

use crate::error::ResolveError;
use crate::options::ResolutionOptions;
use crate::pubgrub::PubGrubPackage;
use crate::reporter::{Reporter, ResolverEvent};
use crate::result::{ResolutionResult, ResolvedArtifact};
use crate::source::ArtifactSource;
use crate::target::TargetEnvironment;
use candidates::{CandidateSelector, VersionMap};
use index::InMemoryIndex;
use provider::{HubDependencyProvider, MIN_VERSION, Requests};
use urls::DirectUrls;

mod candidates;
mod index;
mod provider;
mod urls;

/// The default number of solver rounds before a resolution gives up.
pub const DEFAULT_MAX_ROUNDS: usize = 200_000;

/// How many packages are listed from the indexes at once.
const CONCURRENT_FETCHES: usize = 50;

/// Resolves requirements against an [`ArtifactSource`] with the PubGrub algorithm.
pub struct DependencyResolver<S: ArtifactSource> {
    source: S,
    reporter: Option<Arc<dyn Reporter>>,
    max_rounds: usize,
}

impl<S: ArtifactSource> DependencyResolver<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            reporter: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Set the [`Reporter`] that receives [`ResolverEvent`]s.
    #[must_use]
    pub fn with_reporter(self, reporter: impl Reporter + 'static) -> Self {
        Self {
            reporter: Some(Arc::new(reporter)),
            ..self
        }
    }

    #[must_use]
    pub(crate) fn with_shared_reporter(self, reporter: Option<Arc<dyn Reporter>>) -> Self {
        Self { reporter, ..self }
    }

    /// Bound the number of solver rounds.
    #[must_use]
    pub fn with_max_rounds(self, max_rounds: usize) -> Self {
        Self { max_rounds, ..self }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Resolve `requirements` for the target described by `options`.
    ///
    /// Downloads go to a scratch directory under `options.cache_dir` (or the system temporary
    /// directory) that is removed before returning.
    #[instrument(skip_all, fields(target = %options))]
    pub async fn try_resolve(
        &self,
        requirements: &[String],
        options: &ResolutionOptions,
    ) -> Result<BTreeMap<PackageName, ResolvedArtifact>, ResolveError> {
        let roots = requirements
            .iter()
            .map(|requirement| {
                Requirement::from_str(requirement)
                    .map_err(|err| ResolveError::Requirement(requirement.clone(), Box::new(err)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let target =
            TargetEnvironment::from_options(options).map_err(ResolveError::PythonVersion)?;

        let scratch_dir = match &options.cache_dir {
            Some(cache_dir) => {
                fs_err::create_dir_all(cache_dir).map_err(ResolveError::Scratch)?;
                tempfile::tempdir_in(cache_dir)
            }
            None => tempfile::tempdir(),
        }
        .map_err(ResolveError::Scratch)?;
        trace!("Using scratch directory {}", scratch_dir.path().display());

        let mut urls = DirectUrls::default();
        for requirement in &roots {
            if let Some(VersionOrUrl::Url(url)) = &requirement.version_or_url {
                if requirement.evaluate_markers(target.markers(), &[]) {
                    urls.insert(requirement.name.clone(), url.clone());
                }
            }
        }

        let mut state = ResolverState {
            source: &self.source,
            max_rounds: self.max_rounds,
            options,
            index_urls: options.index_urls(),
            target,
            scratch_dir: scratch_dir.path(),
            roots,
            index: InMemoryIndex::default(),
            urls,
        };
        let (result, events) = state.solve().await;
        for event in &events {
            if let Some(reporter) = &self.reporter {
                reporter.on_event(event);
            }
        }
        if let Ok(artifacts) = &result {
            debug!("Resolved {} packages", artifacts.len());
        }
        result
    }
}

/// The outcome of one solver run.
enum Run {
    /// The run needed responses that aren't in the index yet.
    Incomplete(Requests),
    Complete {
        result: Result<BTreeMap<PackageName, ResolvedArtifact>, ResolveError>,
        events: Vec<ResolverEvent>,
        rounds: usize,
    },
}

/// The state of one resolution across solver runs.
struct ResolverState<'a, S: ArtifactSource> {
    source: &'a S,
    max_rounds: usize,
    options: &'a ResolutionOptions,
    index_urls: IndexUrls,
    target: TargetEnvironment,
    scratch_dir: &'a Path,
    roots: Vec<Requirement>,
    index: InMemoryIndex,
    urls: DirectUrls,
}

impl<S: ArtifactSource> ResolverState<'_, S> {
    /// Solve from what is known, fetch what the solver asked for, and solve again until a run
    /// needs nothing new.
    async fn solve(
        &mut self,
    ) -> (
        Result<BTreeMap<PackageName, ResolvedArtifact>, ResolveError>,
        Vec<ResolverEvent>,
    ) {
        let mut runs = 0usize;
        loop {
            runs += 1;
            match self.run() {
                Run::Incomplete(requests) => {
                    trace!(
                        "Run {runs} requested {} packages, {} distributions and {} URLs",
                        requests.packages.len(),
                        requests.distributions.len(),
                        requests.urls.len()
                    );
                    if let Err(err) = self.fetch(requests).await {
                        return (Err(err), Vec::new());
                    }
                }
                Run::Complete {
                    result,
                    events,
                    rounds,
                } => {
                    debug!("Solved in {runs} runs, the last took {rounds} rounds");
                    return (result, events);
                }
            }
        }
    }

    /// Run the solver once against the index.
    fn run(&self) -> Run {
        let provider = HubDependencyProvider::new(
            &self.index,
            &self.urls,
            &self.roots,
            &self.target,
            CandidateSelector::new(&self.target, self.options),
            self.options.ignore_requires_python,
            self.max_rounds,
        );
        let solution = pubgrub::resolve(&provider, PubGrubPackage::Root, MIN_VERSION.clone());

        let requests = provider.take_requests();
        if !requests.is_empty() {
            return Run::Incomplete(requests);
        }

        let mut events = provider.take_events();
        let result = match solution {
            Ok(solution) => Ok(solution
                .into_iter()
                .filter_map(|(package, version)| match package {
                    PubGrubPackage::Package(name) => {
                        let artifact = provider.artifact(&name, &version)?;
                        Some((name, artifact))
                    }
                    PubGrubPackage::Root | PubGrubPackage::Extra(..) => None,
                })
                .collect()),
            Err(PubGrubError::NoSolution(tree)) => {
                Err(ResolveError::NoSolution(provider.explain(&tree)))
            }
            Err(PubGrubError::ErrorInShouldCancel(err)) => {
                if let ResolveError::RoundLimit(rounds) = err {
                    events.push(ResolverEvent::Exhausted { rounds });
                }
                Err(err)
            }
            Err(
                PubGrubError::ErrorRetrievingDependencies { source, .. }
                | PubGrubError::ErrorChoosingVersion { source, .. },
            ) => Err(source),
            Err(err) => Err(ResolveError::Solver(err.to_string())),
        };
        Run::Complete {
            result,
            events,
            rounds: provider.rounds(),
        }
    }

    /// Fetch everything a run asked for, concurrently.
    async fn fetch(&mut self, requests: Requests) -> Result<(), ResolveError> {
        let known = self.index.len() + self.urls.len();

        let mut new_urls = false;
        for (package, url) in requests.urls {
            new_urls |= self.urls.insert(package, url);
        }

        let source = self.source;
        let index_urls = &self.index_urls;
        let listings: Vec<_> = requests
            .packages
            .iter()
            .map(|package| async move { (package, source.simple(package, index_urls).await) })
            .collect();
        let listings: Vec<_> = futures::stream::iter(listings)
            .buffer_unordered(CONCURRENT_FETCHES)
            .collect()
            .await;
        for (package, response) in listings {
            let version_map = match response {
                Ok((index, metadata)) => {
                    trace!("Received package metadata for: {package} from {index}");
                    Some(VersionMap::from_metadata(
                        &index,
                        metadata,
                        &self.target,
                        self.options.ignore_requires_python,
                    ))
                }
                Err(err) if err.is_package_not_found() => {
                    debug!("Package {package} was not found in any index");
                    None
                }
                Err(err) => return Err(err.into()),
            };
            self.index.packages.insert(package.clone(), version_map);
        }

        let scratch_dir = self.scratch_dir;
        let metadata: Vec<_> = requests
            .distributions
            .iter()
            .map(|(url, (package, version, dist))| async move {
                let response = source
                    .metadata(&dist.index, &dist.filename, &dist.file, scratch_dir)
                    .await;
                (url, package, version, response)
            })
            .collect();
        let metadata: Vec<_> = futures::stream::iter(metadata)
            .buffer_unordered(CONCURRENT_FETCHES)
            .collect()
            .await;
        for (url, package, version, response) in metadata {
            let metadata = match response {
                Ok(metadata) => Ok(metadata),
                Err(err) if err.is_metadata_unavailable() => {
                    debug!("No metadata for {package}=={version}: {err}");
                    Err(err.to_string())
                }
                Err(err) => return Err(err.into()),
            };
            self.index.distributions.insert(url.clone(), metadata);
        }

        if !new_urls && self.index.len() + self.urls.len() == known {
            return Err(ResolveError::Solver(
                "The solver requested responses that were already fetched".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<Result<BTreeMap<PackageName, ResolvedArtifact>, ResolveError>> for ResolutionResult {
    fn from(result: Result<BTreeMap<PackageName, ResolvedArtifact>, ResolveError>) -> Self {
        match result {
            Ok(artifacts) => Self::Resolved { artifacts },
            Err(err) => Self::from(err),
        }
    }
}
