use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::slice;
use std::sync::LazyLock;

use pubgrub::{Dependencies, DependencyProvider, PackageResolutionStatistics, Range};
use rustc_hash::FxHashMap;
use tracing::trace;
use url::Url;

use hub_normalize::{ExtraName, PackageName};
use hub_pep440::Version;
use hub_pep508::{Requirement, VersionOrUrl};

use crate::error::{NoSolutionError, ResolveError};
use crate::pubgrub::{NoSolutionReport, PubGrubPackage, PubGrubPriority, PubGrubSpecifier};
use crate::reporter::ResolverEvent;
use crate::resolver::candidates::{
    Candidate, CandidateDist, CandidateFlags, CandidateSelector, RegistryDist,
};
use crate::resolver::index::InMemoryIndex;
use crate::resolver::urls::DirectUrls;
use crate::result::ResolvedArtifact;
use crate::target::TargetEnvironment;

/// The version of the root package, and of direct references whose version is unknown.
pub(crate) static MIN_VERSION: LazyLock<Version> =
    LazyLock::new(|| Version::from_release(vec![0]));

type PubGrubDependencies = Vec<(PubGrubPackage, Range<Version>)>;

/// What a solver run looked for and didn't find in the [`InMemoryIndex`].
#[derive(Debug, Default)]
pub(crate) struct Requests {
    pub(crate) packages: BTreeSet<PackageName>,
    /// Keyed by file URL.
    pub(crate) distributions: BTreeMap<String, (PackageName, Version, RegistryDist)>,
    pub(crate) urls: Vec<(PackageName, Url)>,
}

impl Requests {
    pub(crate) fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.distributions.is_empty() && self.urls.is_empty()
    }
}

/// The dependencies of a registry candidate, as far as its metadata tells.
enum RequiresDist<'a> {
    Available(&'a [Requirement]),
    /// Not fetched yet.
    Pending,
    Unavailable(String),
}

/// Answers the solver's questions from an [`InMemoryIndex`], recording everything it had to
/// guess because a response was missing.
///
/// A run with outstanding [`Requests`] is only good for discovering what to fetch next: a
/// package that wasn't listed yet has no versions, and a distribution whose metadata wasn't
/// fetched yet has no dependencies.
pub(crate) struct HubDependencyProvider<'a> {
    index: &'a InMemoryIndex,
    urls: &'a DirectUrls,
    roots: &'a [Requirement],
    target: &'a TargetEnvironment,
    selector: CandidateSelector<'a>,
    ignore_requires_python: bool,
    max_rounds: usize,
    rounds: Cell<usize>,
    requests: RefCell<Requests>,
    flags: RefCell<FxHashMap<PackageName, CandidateFlags>>,
    /// Why a package has no candidate at all.
    unavailable: RefCell<FxHashMap<PackageName, String>>,
    /// The requirement strings each package declared on each of its dependencies.
    declared: RefCell<FxHashMap<(PubGrubPackage, PackageName), Vec<String>>>,
    events: RefCell<Vec<ResolverEvent>>,
}

impl<'a> HubDependencyProvider<'a> {
    pub(crate) fn new(
        index: &'a InMemoryIndex,
        urls: &'a DirectUrls,
        roots: &'a [Requirement],
        target: &'a TargetEnvironment,
        selector: CandidateSelector<'a>,
        ignore_requires_python: bool,
        max_rounds: usize,
    ) -> Self {
        Self {
            index,
            urls,
            roots,
            target,
            selector,
            ignore_requires_python,
            max_rounds,
            rounds: Cell::new(0),
            requests: RefCell::default(),
            flags: RefCell::default(),
            unavailable: RefCell::default(),
            declared: RefCell::default(),
            events: RefCell::default(),
        }
    }

    pub(crate) fn rounds(&self) -> usize {
        self.rounds.get()
    }

    pub(crate) fn take_requests(&self) -> Requests {
        self.requests.take()
    }

    pub(crate) fn take_events(&self) -> Vec<ResolverEvent> {
        self.events.take()
    }

    /// Explain a conflict with what this run learned about unavailable packages and declared
    /// requirements.
    pub(crate) fn explain(
        &self,
        tree: &pubgrub::DerivationTree<PubGrubPackage, Range<Version>, String>,
    ) -> NoSolutionError {
        NoSolutionReport {
            unavailable: &self.unavailable.borrow(),
            declared: &self.declared.borrow(),
        }
        .explain(tree)
    }

    /// The artifact that would be installed for `package_name` at a version the solver picked.
    pub(crate) fn artifact(
        &self,
        package_name: &PackageName,
        version: &Version,
    ) -> Option<ResolvedArtifact> {
        if let Some(url) = self.urls.get(package_name) {
            let url = url.as_ref().ok()?;
            return self
                .selector
                .direct_candidate(package_name, url)
                .ok()
                .map(|candidate| candidate.to_artifact());
        }
        let dist = self.version_map_dist(package_name, version)?;
        let candidate = Candidate {
            name: package_name.clone(),
            version: Some(version.clone()),
            dist: CandidateDist::Registry(Box::new(dist.clone())),
        };
        Some(candidate.to_artifact())
    }

    fn version_map_dist(
        &self,
        package_name: &PackageName,
        version: &Version,
    ) -> Option<&'a RegistryDist> {
        let index = self.index;
        index
            .packages
            .get(package_name)?
            .as_ref()?
            .get(version)
    }

    fn flags(&self, package_name: &PackageName) -> CandidateFlags {
        self.flags
            .borrow()
            .get(package_name)
            .copied()
            .unwrap_or_default()
    }

    fn mark_unavailable(&self, package_name: &PackageName, reason: String) {
        self.unavailable
            .borrow_mut()
            .insert(package_name.clone(), reason);
    }

    fn report(&self, event: ResolverEvent) {
        trace!("{event}");
        self.events.borrow_mut().push(event);
    }

    /// The best candidate for `package_name` within `range`.
    fn candidate(&self, package_name: &PackageName, range: &Range<Version>) -> Option<Candidate> {
        if let Some(url) = self.urls.get(package_name) {
            let candidate = match url {
                Ok(url) => self.selector.direct_candidate(package_name, url),
                Err(reason) => Err(reason.clone()),
            };
            return match candidate {
                Ok(candidate) => candidate
                    .version
                    .as_ref()
                    .is_none_or(|version| range.contains(version))
                    .then_some(candidate),
                Err(reason) => {
                    self.mark_unavailable(package_name, reason);
                    None
                }
            };
        }

        match self.index.packages.get(package_name) {
            None => {
                self.requests
                    .borrow_mut()
                    .packages
                    .insert(package_name.clone());
                None
            }
            Some(None) => {
                self.mark_unavailable(
                    package_name,
                    format!("Package `{package_name}` was not found in the package index"),
                );
                None
            }
            Some(Some(version_map)) if version_map.is_empty() => {
                self.mark_unavailable(
                    package_name,
                    format!(
                        "Package `{package_name}` has no wheel or source distribution usable on the target"
                    ),
                );
                None
            }
            Some(Some(version_map)) => self.selector.select(
                package_name,
                range,
                self.flags(package_name),
                version_map,
            ),
        }
    }

    /// The declared dependencies of `package_name` at `version`.
    fn requires_dist(&self, package_name: &PackageName, version: &Version) -> RequiresDist<'a> {
        // Direct references are taken as-is.
        if self.urls.get(package_name).is_some() {
            return RequiresDist::Available(&[]);
        }
        let Some(dist) = self.version_map_dist(package_name, version) else {
            return RequiresDist::Unavailable(format!(
                "{package_name}=={version} has no usable distribution"
            ));
        };

        let index = self.index;
        match index.distributions.get(&dist.file.url) {
            None => {
                self.requests.borrow_mut().distributions.insert(
                    dist.file.url.clone(),
                    (package_name.clone(), version.clone(), dist.clone()),
                );
                RequiresDist::Pending
            }
            Some(Err(reason)) => {
                self.report(ResolverEvent::MetadataUnavailable {
                    package: package_name.clone(),
                    version: Some(version.clone()),
                    reason: reason.clone(),
                });
                RequiresDist::Unavailable(format!(
                    "The metadata of {package_name}=={version} is unavailable"
                ))
            }
            Some(Ok(metadata)) => {
                if !self.ignore_requires_python {
                    if let Some(requires_python) = &metadata.requires_python {
                        if !requires_python.contains(self.target.python_version()) {
                            let reason = format!(
                                "{package_name}=={version} requires Python {requires_python}, but the target is {}",
                                self.target.python_version()
                            );
                            self.report(ResolverEvent::Rejected {
                                package: package_name.clone(),
                                version: Some(version.clone()),
                                reason: reason.clone(),
                            });
                            return RequiresDist::Unavailable(reason);
                        }
                    }
                }
                RequiresDist::Available(&metadata.requires_dist)
            }
        }
    }

    /// Convert the requirements of `dependent` that apply on the target with `extras` active.
    fn dependencies<'r>(
        &self,
        dependent: &PubGrubPackage,
        requirements: impl IntoIterator<Item = &'r Requirement>,
        extras: &[ExtraName],
        dependencies: &mut PubGrubDependencies,
    ) -> Result<(), ResolveError> {
        for requirement in requirements {
            if !requirement.evaluate_markers(self.target.markers(), extras) {
                continue;
            }
            // A package may enable its own extras, but never depends on itself.
            let is_self = dependent.name() == Some(&requirement.name);
            if is_self && requirement.extras.is_empty() {
                continue;
            }

            self.declare(dependent, requirement);
            let range = self.range(requirement)?;
            if !is_self {
                add(
                    dependencies,
                    PubGrubPackage::Package(requirement.name.clone()),
                    &range,
                );
            }
            for extra in &requirement.extras {
                add(
                    dependencies,
                    PubGrubPackage::Extra(requirement.name.clone(), extra.clone()),
                    &range,
                );
            }
        }
        Ok(())
    }

    fn declare(&self, dependent: &PubGrubPackage, requirement: &Requirement) {
        let requirement_string = requirement.to_string();
        let mut declared = self.declared.borrow_mut();
        let strings = declared
            .entry((dependent.clone(), requirement.name.clone()))
            .or_default();
        if !strings.contains(&requirement_string) {
            strings.push(requirement_string);
        }

        if let Some(specifiers) = requirement.specifiers() {
            let flags = CandidateFlags {
                prereleases: specifiers.any_prerelease(),
                yanked: specifiers.is_exact_pin(),
            };
            let mut all_flags = self.flags.borrow_mut();
            let entry = all_flags.entry(requirement.name.clone()).or_default();
            *entry = entry.union(flags);
        }
    }

    /// The versions `requirement` allows.
    ///
    /// Direct references allow any version; the URL itself decides the candidate. So do
    /// specifiers on a package given by a URL whose version isn't known before building.
    fn range(&self, requirement: &Requirement) -> Result<Range<Version>, ResolveError> {
        match &requirement.version_or_url {
            Some(VersionOrUrl::Url(url)) => {
                if !self.urls.knows(&requirement.name, url) {
                    let mut requests = self.requests.borrow_mut();
                    let request = (requirement.name.clone(), url.clone());
                    if !requests.urls.contains(&request) {
                        requests.urls.push(request);
                    }
                }
                Ok(Range::full())
            }
            None => Ok(Range::full()),
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => {
                let versionless = match self.urls.get(&requirement.name) {
                    Some(Ok(url)) => !self
                        .selector
                        .direct_candidate(&requirement.name, url)
                        .is_ok_and(|candidate| candidate.version.is_some()),
                    Some(Err(_)) => true,
                    None => false,
                };
                if versionless {
                    Ok(Range::full())
                } else {
                    Ok(PubGrubSpecifier::from_specifiers(specifiers)?.into())
                }
            }
        }
    }
}

/// Add a dependency, intersecting with an earlier requirement on the same package.
fn add(dependencies: &mut PubGrubDependencies, package: PubGrubPackage, range: &Range<Version>) {
    match dependencies.iter_mut().find(|(known, _)| *known == package) {
        Some((_, known)) => *known = known.intersection(range),
        None => dependencies.push((package, range.clone())),
    }
}

impl DependencyProvider for HubDependencyProvider<'_> {
    type P = PubGrubPackage;
    type V = Version;
    type VS = Range<Version>;
    type M = String;
    type Priority = PubGrubPriority;
    type Err = ResolveError;

    fn prioritize(
        &self,
        package: &PubGrubPackage,
        range: &Range<Version>,
        _stats: &PackageResolutionStatistics,
    ) -> PubGrubPriority {
        let Some(package_name) = package.name() else {
            return PubGrubPriority::Root;
        };
        if self.urls.get(package_name).is_some() {
            return PubGrubPriority::DirectUrl(Reverse(package.clone()));
        }
        match self.index.packages.get(package_name) {
            None => {
                self.requests
                    .borrow_mut()
                    .packages
                    .insert(package_name.clone());
                PubGrubPriority::Unlisted(Reverse(package.clone()))
            }
            Some(None) => PubGrubPriority::Candidates(Reverse(0), Reverse(package.clone())),
            Some(Some(version_map)) => {
                let count = self
                    .selector
                    .count(range, self.flags(package_name), version_map);
                PubGrubPriority::Candidates(Reverse(count), Reverse(package.clone()))
            }
        }
    }

    fn choose_version(
        &self,
        package: &PubGrubPackage,
        range: &Range<Version>,
    ) -> Result<Option<Version>, ResolveError> {
        let Some(package_name) = package.name() else {
            return Ok(Some(MIN_VERSION.clone()));
        };
        let Some(candidate) = self.candidate(package_name, range) else {
            trace!("No candidate of {package} in {range}");
            return Ok(None);
        };
        if let PubGrubPackage::Package(_) = package {
            self.report(ResolverEvent::Selected {
                package: package_name.clone(),
                version: candidate.version.clone(),
                filename: candidate.to_artifact().filename,
            });
        }
        Ok(Some(candidate.version.unwrap_or_else(|| MIN_VERSION.clone())))
    }

    fn get_dependencies(
        &self,
        package: &PubGrubPackage,
        version: &Version,
    ) -> Result<Dependencies<PubGrubPackage, Range<Version>, String>, ResolveError> {
        let mut dependencies = PubGrubDependencies::new();
        let (package_name, extras) = match package {
            PubGrubPackage::Root => {
                self.dependencies(package, self.roots, &[], &mut dependencies)?;
                return Ok(Dependencies::Available(dependencies.into_iter().collect()));
            }
            PubGrubPackage::Package(package_name) => (package_name, &[][..]),
            PubGrubPackage::Extra(package_name, extra) => {
                dependencies.push((
                    PubGrubPackage::Package(package_name.clone()),
                    Range::singleton(version.clone()),
                ));
                (package_name, slice::from_ref(extra))
            }
        };

        match self.requires_dist(package_name, version) {
            RequiresDist::Available(requirements) => {
                self.dependencies(package, requirements, extras, &mut dependencies)?;
            }
            RequiresDist::Pending => {}
            RequiresDist::Unavailable(reason) => return Ok(Dependencies::Unavailable(reason)),
        }
        Ok(Dependencies::Available(dependencies.into_iter().collect()))
    }

    fn should_cancel(&self) -> Result<(), ResolveError> {
        let rounds = self.rounds.get() + 1;
        self.rounds.set(rounds);
        if rounds > self.max_rounds {
            return Err(ResolveError::RoundLimit(self.max_rounds));
        }
        Ok(())
    }
}
