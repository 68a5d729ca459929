use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{FutureExt, StreamExt};
use tracing::{debug, instrument, warn};

use hub_platform_tags::PlatformFamily;
use hub_resolver::{
    ArtifactClassifier, PlatformTargetBuilder, PythonVersion, RegistryResolver, ResolutionOptions,
    ResolutionResult, ResolverPort,
};

use crate::cache::ResolutionCache;
use crate::report::{InstallabilityReport, TargetReport};

/// The number of targets [`InstallationRequirements::resolve_all`] resolves at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// The installability signals of one dependency list across a matrix of targets.
///
/// Each target is resolved at most once until [`InstallationRequirements::clear_cache`] is
/// called. Targets are independent: a failure (or a panic) while resolving one of them is
/// recorded for that target only.
pub struct InstallationRequirements<P: ResolverPort = RegistryResolver> {
    requirements: Vec<String>,
    options_list: Vec<ResolutionOptions>,
    resolver: P,
    cache: ResolutionCache,
    unexpected_error: AtomicBool,
    concurrency: usize,
}

impl InstallationRequirements {
    /// Resolve `requirements` for each of `options_list` against the indexes the options name.
    pub fn new(requirements: Vec<String>, options_list: Vec<ResolutionOptions>) -> Self {
        Self::with_resolver(requirements, options_list, RegistryResolver::new())
    }

    /// Resolve `requirements` for every declared (python version, platform) pair.
    ///
    /// `None` stands for the default python version or the host platform respectively, see
    /// [`PlatformTargetBuilder::build`].
    pub fn from_classifiers(
        requirements: Vec<String>,
        base: ResolutionOptions,
        python_versions: &[Option<PythonVersion>],
        platforms: &[Option<String>],
    ) -> Self {
        let options_list = PlatformTargetBuilder::new(base).build(python_versions, platforms);
        Self::new(requirements, options_list)
    }
}

impl<P: ResolverPort> InstallationRequirements<P> {
    pub fn with_resolver(
        requirements: Vec<String>,
        options_list: Vec<ResolutionOptions>,
        resolver: P,
    ) -> Self {
        Self {
            requirements,
            options_list,
            resolver,
            cache: ResolutionCache::default(),
            unexpected_error: AtomicBool::new(false),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set how many targets [`InstallationRequirements::resolve_all`] resolves at once.
    #[must_use]
    pub fn with_concurrency(self, concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            ..self
        }
    }

    pub fn requirements(&self) -> &[String] {
        &self.requirements
    }

    pub fn options_list(&self) -> &[ResolutionOptions] {
        &self.options_list
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// The resolution for the target at `index`.
    ///
    /// Returns `None` if the index is out of range or the resolution failed unexpectedly. The
    /// latter also sets [`InstallationRequirements::had_unexpected_error`].
    pub async fn resolve_dependencies(&self, index: usize) -> Option<Arc<ResolutionResult>> {
        let result = self.resolution(index).await?;
        if result.is_unknown_error() {
            None
        } else {
            Some(result)
        }
    }

    /// Whether the requirements resolve on the target at `index`.
    pub async fn is_installable(&self, index: usize) -> bool {
        self.resolve_dependencies(index)
            .await
            .is_some_and(|result| result.is_resolved())
    }

    /// Whether every package installed on the target at `index` comes from a wheel.
    ///
    /// True when nothing would be installed, including when the target doesn't resolve.
    pub async fn alldeps_wheel(&self, index: usize) -> bool {
        alldeps_wheel(self.resolve_dependencies(index).await.as_deref())
    }

    /// Whether every package installed on the target at `index` is a pure wheel.
    ///
    /// True when nothing would be installed, including when the target doesn't resolve.
    pub async fn has_no_c_extensions_dependencies(&self, index: usize) -> bool {
        has_no_c_extensions(self.resolve_dependencies(index).await.as_deref())
    }

    /// The number of packages installed on the target at `index`, or zero if it doesn't
    /// resolve.
    pub async fn num_installed_packages(&self, index: usize) -> usize {
        num_installed_packages(self.resolve_dependencies(index).await.as_deref())
    }

    pub async fn has_windows_support(&self) -> bool {
        self.has_family_support(PlatformFamily::Windows).await
    }

    pub async fn has_linux_support(&self) -> bool {
        self.has_family_support(PlatformFamily::Linux).await
    }

    pub async fn has_macos_support(&self) -> bool {
        self.has_family_support(PlatformFamily::Macos).await
    }

    /// Whether any resolution since the last [`InstallationRequirements::clear_cache`] failed
    /// for a reason unrelated to the requirements.
    pub fn had_unexpected_error(&self) -> bool {
        self.unexpected_error.load(Ordering::SeqCst)
    }

    /// Forget every resolution, and the unexpected-error flag with them.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.unexpected_error.store(false, Ordering::SeqCst);
    }

    /// Resolve every target, at most `concurrency` at a time.
    ///
    /// Outcomes are in target order and include unexpected errors.
    #[instrument(skip_all, fields(targets = self.options_list.len()))]
    pub async fn resolve_all(&self) -> Vec<Arc<ResolutionResult>> {
        let mut results = futures::stream::iter(0..self.options_list.len())
            .map(|index| async move { (index, self.resolution(index).await) })
            .buffer_unordered(self.concurrency)
            .filter_map(|(index, result)| async move { Some((index, result?)) })
            .collect::<Vec<_>>()
            .await;
        results.sort_unstable_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Resolve every target and summarize the signals.
    pub async fn report(&self) -> InstallabilityReport {
        let results = self.resolve_all().await;
        let targets = self
            .options_list
            .iter()
            .zip(&results)
            .map(|(options, result)| target_report(options, result))
            .collect::<Vec<_>>();
        let supports = |family: PlatformFamily| {
            targets
                .iter()
                .any(|target| target.platform_family == Some(family) && target.installable)
        };
        InstallabilityReport {
            has_windows_support: supports(PlatformFamily::Windows),
            has_linux_support: supports(PlatformFamily::Linux),
            has_macos_support: supports(PlatformFamily::Macos),
            had_unexpected_error: self.had_unexpected_error(),
            targets,
        }
    }

    async fn has_family_support(&self, family: PlatformFamily) -> bool {
        for (index, options) in self.options_list.iter().enumerate() {
            if options.platform_family() == Some(family) && self.is_installable(index).await {
                return true;
            }
        }
        false
    }

    /// The cached or freshly computed outcome for a target, unexpected errors included.
    async fn resolution(&self, index: usize) -> Option<Arc<ResolutionResult>> {
        let Some(options) = self.options_list.get(index) else {
            debug!(
                "No target at index {index}, there are {}",
                self.options_list.len()
            );
            return None;
        };

        if let Some(result) = self.cache.get(options) {
            debug!("Using cached resolution for {options}");
            return Some(result);
        }

        let result = match AssertUnwindSafe(self.resolver.resolve(&self.requirements, options))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => ResolutionResult::UnknownError {
                cause: format!("Resolver panicked: {}", panic_message(panic.as_ref())),
            },
        };

        if let ResolutionResult::UnknownError { cause } = &result {
            warn!("Unexpected error during dependency analysis for {options}: {cause}");
            self.unexpected_error.store(true, Ordering::SeqCst);
        }

        Some(self.cache.insert(options.clone(), result))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

fn alldeps_wheel(result: Option<&ResolutionResult>) -> bool {
    result
        .and_then(ResolutionResult::artifacts)
        .is_none_or(|artifacts| artifacts.values().all(|artifact| artifact.is_wheel))
}

fn has_no_c_extensions(result: Option<&ResolutionResult>) -> bool {
    result
        .and_then(ResolutionResult::artifacts)
        .is_none_or(|artifacts| {
            artifacts
                .values()
                .all(|artifact| ArtifactClassifier::classify(artifact).is_pure())
        })
}

fn num_installed_packages(result: Option<&ResolutionResult>) -> usize {
    result
        .and_then(ResolutionResult::artifacts)
        .map_or(0, |artifacts| artifacts.len())
}

fn target_report(options: &ResolutionOptions, result: &ResolutionResult) -> TargetReport {
    // Unexpected errors don't count towards the signals.
    let signals = (!result.is_unknown_error()).then_some(result);
    TargetReport {
        target: options.to_string(),
        python_version: options.target_python_version(),
        platform_tags: options.target_platform_tags(),
        platform_family: options.platform_family(),
        installable: result.is_resolved(),
        alldeps_wheel: alldeps_wheel(signals),
        has_no_c_extensions_dependencies: has_no_c_extensions(signals),
        num_installed_packages: num_installed_packages(signals),
        reason: match result {
            ResolutionResult::Resolved { .. } => None,
            ResolutionResult::Impossible { reason, .. } => Some(reason.clone()),
            ResolutionResult::UnknownError { cause } => Some(cause.clone()),
        },
        unexpected_error: result.is_unknown_error(),
    }
}
