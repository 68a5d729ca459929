use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use pubgrub::Range;
use url::Url;

use hub_client::SimpleMetadata;
use hub_distribution_filename::{DistFilename, SourceDistFilename, WheelFilename};
use hub_normalize::PackageName;
use hub_pep440::Version;
use hub_platform_tags::TagCompatibility;
use hub_pypi_types::{File, IndexUrl};

use crate::options::ResolutionOptions;
use crate::result::{ResolvedArtifact, SourceKind};
use crate::target::TargetEnvironment;

/// The file that would be installed for one version of a package.
#[derive(Debug, Clone)]
pub(crate) struct RegistryDist {
    pub(crate) index: IndexUrl,
    pub(crate) filename: DistFilename,
    pub(crate) file: File,
}

#[derive(Debug, Clone)]
struct VersionEntry {
    dist: RegistryDist,
    yanked: bool,
}

/// The versions of a package with at least one file usable on the target, each with its best
/// file.
#[derive(Debug, Clone)]
pub(crate) struct VersionMap(BTreeMap<Version, VersionEntry>);

impl VersionMap {
    /// Pick the best file of every version: the highest-priority compatible wheel, else a
    /// source distribution. Yanked files are only used if a version has nothing else.
    ///
    /// Files whose `Requires-Python` excludes the target are dropped unless
    /// `ignore_requires_python` is set.
    pub(crate) fn from_metadata(
        index: &IndexUrl,
        metadata: SimpleMetadata,
        target: &TargetEnvironment,
        ignore_requires_python: bool,
    ) -> Self {
        let mut versions = BTreeMap::new();

        for (version, files) in metadata {
            let usable = |file: &File| {
                ignore_requires_python
                    || match &file.requires_python {
                        Some(Ok(requires_python)) => {
                            requires_python.contains(target.python_version())
                        }
                        _ => true,
                    }
            };

            let mut wheel: Option<(bool, TagCompatibility, WheelFilename, File)> = None;
            for (filename, file) in files.wheels {
                if !usable(&file) {
                    continue;
                }
                let compatibility = filename.compatibility(target.tags());
                if !compatibility.is_compatible() {
                    continue;
                }
                let live = !file.is_yanked();
                if wheel.as_ref().is_none_or(|(best_live, best_compatibility, ..)| {
                    (live, &compatibility) > (*best_live, best_compatibility)
                }) {
                    wheel = Some((live, compatibility, filename, file));
                }
            }
            let sdist = files
                .source_dists
                .into_iter()
                .filter(|(_, file)| usable(file))
                .min_by_key(|(_, file)| file.is_yanked());

            // A yanked wheel loses to a live source distribution.
            let (filename, file) = match (wheel, sdist) {
                (Some((true, _, filename, file)), _) => {
                    (DistFilename::WheelFilename(filename), file)
                }
                (_, Some((filename, file))) if !file.is_yanked() => {
                    (DistFilename::SourceDistFilename(filename), file)
                }
                (Some((_, _, filename, file)), _) => (DistFilename::WheelFilename(filename), file),
                (None, Some((filename, file))) => {
                    (DistFilename::SourceDistFilename(filename), file)
                }
                (None, None) => continue,
            };
            let yanked = file.is_yanked();
            let dist = RegistryDist {
                index: index.clone(),
                filename,
                file,
            };
            versions.insert(version, VersionEntry { dist, yanked });
        }

        Self(versions)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The file picked for `version`, if the package has that version.
    pub(crate) fn get(&self, version: &Version) -> Option<&RegistryDist> {
        self.0.get(version).map(|entry| &entry.dist)
    }
}

/// A possible pin for a package.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub(crate) name: PackageName,
    /// `None` for direct references whose version is only known after building.
    pub(crate) version: Option<Version>,
    pub(crate) dist: CandidateDist,
}

#[derive(Debug, Clone)]
pub(crate) enum CandidateDist {
    Registry(Box<RegistryDist>),
    Url {
        url: Url,
        kind: SourceKind,
        wheel: Option<WheelFilename>,
    },
}

impl Candidate {
    pub(crate) fn is_wheel(&self) -> bool {
        match &self.dist {
            CandidateDist::Registry(dist) => dist.filename.is_wheel(),
            CandidateDist::Url { wheel, .. } => wheel.is_some(),
        }
    }

    pub(crate) fn to_artifact(&self) -> ResolvedArtifact {
        match &self.dist {
            CandidateDist::Registry(dist) => {
                let (source_kind, wheel_platform_tags) = match &dist.filename {
                    DistFilename::WheelFilename(wheel) => {
                        (SourceKind::Wheel, Some(wheel.platform_tag.clone()))
                    }
                    DistFilename::SourceDistFilename(_) => (SourceKind::Sdist, None),
                };
                ResolvedArtifact {
                    package_name: self.name.clone(),
                    version: self.version.clone(),
                    is_wheel: dist.filename.is_wheel(),
                    wheel_platform_tags,
                    source_kind,
                    filename: Some(dist.file.filename.clone()),
                }
            }
            CandidateDist::Url { url, kind, wheel } => ResolvedArtifact {
                package_name: self.name.clone(),
                version: self.version.clone(),
                is_wheel: wheel.is_some(),
                wheel_platform_tags: wheel.as_ref().map(|wheel| wheel.platform_tag.clone()),
                source_kind: *kind,
                filename: match kind {
                    SourceKind::Wheel | SourceKind::Sdist => url_filename(url).map(str::to_string),
                    SourceKind::Vcs | SourceKind::Local => None,
                },
            },
        }
    }
}

impl Display for Candidate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.dist, &self.version) {
            (CandidateDist::Url { url, .. }, _) => write!(f, "{} @ {url}", self.name),
            (CandidateDist::Registry(_), Some(version)) => write!(f, "{}=={version}", self.name),
            (CandidateDist::Registry(dist), None) => {
                write!(f, "{} ({})", self.name, dist.file.filename)
            }
        }
    }
}

/// What the requirements on a package opt into.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CandidateFlags {
    /// A specifier names a prerelease.
    pub(crate) prereleases: bool,
    /// A specifier is an exact `==` pin, which admits yanked files.
    pub(crate) yanked: bool,
}

impl CandidateFlags {
    #[must_use]
    pub(crate) fn union(self, other: Self) -> Self {
        Self {
            prereleases: self.prereleases || other.prereleases,
            yanked: self.yanked || other.yanked,
        }
    }
}

/// Orders and filters the versions of a package into the candidates the resolver tries.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CandidateSelector<'a> {
    target: &'a TargetEnvironment,
    allow_prereleases: bool,
    prefer_binary: bool,
}

impl<'a> CandidateSelector<'a> {
    pub(crate) fn new(target: &'a TargetEnvironment, options: &ResolutionOptions) -> Self {
        Self {
            target,
            allow_prereleases: options.allow_prereleases,
            prefer_binary: options.prefer_binary,
        }
    }

    /// The candidates for `package_name` within `range`, best first.
    pub(crate) fn candidates(
        &self,
        package_name: &PackageName,
        range: &Range<Version>,
        flags: CandidateFlags,
        version_map: &VersionMap,
    ) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .matching(range, flags, version_map)
            .map(|(version, entry)| Candidate {
                name: package_name.clone(),
                version: Some(version.clone()),
                dist: CandidateDist::Registry(Box::new(entry.dist.clone())),
            })
            .collect();
        if self.prefer_binary {
            // Stable, so newest first within each group.
            candidates.sort_by_key(|candidate| !candidate.is_wheel());
        }
        candidates
    }

    /// The number of candidates within `range`.
    pub(crate) fn count(
        &self,
        range: &Range<Version>,
        flags: CandidateFlags,
        version_map: &VersionMap,
    ) -> usize {
        self.matching(range, flags, version_map).count()
    }

    /// The usable versions within `range`, newest first.
    fn matching<'m>(
        &self,
        range: &'m Range<Version>,
        flags: CandidateFlags,
        version_map: &'m VersionMap,
    ) -> impl Iterator<Item = (&'m Version, &'m VersionEntry)> + 'm {
        let allow_prereleases = self.allow_prereleases || flags.prereleases;
        version_map.0.iter().rev().filter(move |(version, entry)| {
            (allow_prereleases || !version.any_prerelease())
                && (flags.yanked || !entry.yanked)
                && range.contains(*version)
        })
    }

    /// The best candidate for `package_name` within `range`.
    pub(crate) fn select(
        &self,
        package_name: &PackageName,
        range: &Range<Version>,
        flags: CandidateFlags,
        version_map: &VersionMap,
    ) -> Option<Candidate> {
        self.candidates(package_name, range, flags, version_map)
            .into_iter()
            .next()
    }

    /// The only candidate of a package given by URL. Returns the reason if it can't be used
    /// on the target.
    pub(crate) fn direct_candidate(
        &self,
        package_name: &PackageName,
        url: &Url,
    ) -> Result<Candidate, String> {
        let kind = SourceKind::from_url(url);
        let (version, wheel) = match kind {
            SourceKind::Wheel => {
                let wheel = WheelFilename::try_from(url).map_err(|err| err.to_string())?;
                if wheel.name != *package_name {
                    return Err(format!(
                        "The wheel `{wheel}` at `{url}` is not a distribution of `{package_name}`"
                    ));
                }
                if !wheel.is_compatible(self.target.tags()) {
                    return Err(format!(
                        "The wheel `{wheel}` is not compatible with the target platform"
                    ));
                }
                (Some(wheel.version.clone()), Some(wheel))
            }
            SourceKind::Sdist => {
                let version = url_filename(url)
                    .and_then(|filename| SourceDistFilename::parse(filename, package_name).ok())
                    .map(|filename| filename.version);
                (version, None)
            }
            SourceKind::Vcs | SourceKind::Local => (None, None),
        };

        Ok(Candidate {
            name: package_name.clone(),
            version,
            dist: CandidateDist::Url {
                url: url.clone(),
                kind,
                wheel,
            },
        })
    }
}

fn url_filename(url: &Url) -> Option<&str> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|filename| !filename.is_empty())
}
