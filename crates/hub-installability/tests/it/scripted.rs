//! A resolver that replays canned outcomes per target.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use hub_distribution_filename::WheelFilename;
use hub_normalize::PackageName;
use hub_pep440::Version;
use hub_resolver::{ResolutionOptions, ResolutionResult, ResolvedArtifact, ResolverPort, SourceKind};

pub(crate) enum Outcome {
    /// Resolve to these distribution filenames.
    Resolve(&'static [&'static str]),
    Impossible(&'static str),
    Fail(&'static str),
    Panic(&'static str),
}

/// Outcomes are keyed by `{python version} / {platform family}`, e.g. `3.11 / win`.
#[derive(Default)]
pub(crate) struct ScriptedResolver {
    outcomes: BTreeMap<String, Outcome>,
    calls: AtomicUsize,
    resolved: Mutex<Vec<String>>,
}

impl ScriptedResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub(crate) fn on(mut self, target: &str, outcome: Outcome) -> Self {
        self.outcomes.insert(target.to_string(), outcome);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The targets resolved so far, in call order.
    pub(crate) fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

pub(crate) fn target_key(options: &ResolutionOptions) -> String {
    format!(
        "{} / {}",
        options.target_python_version(),
        options
            .platform_family()
            .map_or("other", |family| family.name())
    )
}

fn artifact(filename: &str) -> (PackageName, ResolvedArtifact) {
    let artifact = if let Ok(wheel) = WheelFilename::from_str(filename) {
        ResolvedArtifact {
            package_name: wheel.name.clone(),
            version: Some(wheel.version.clone()),
            is_wheel: true,
            wheel_platform_tags: Some(wheel.platform_tag.clone()),
            source_kind: SourceKind::Wheel,
            filename: Some(filename.to_string()),
        }
    } else {
        let stem = filename.trim_end_matches(".tar.gz");
        let (name, version) = stem.rsplit_once('-').unwrap();
        ResolvedArtifact {
            package_name: PackageName::from_str(name).unwrap(),
            version: Some(Version::from_str(version).unwrap()),
            is_wheel: false,
            wheel_platform_tags: None,
            source_kind: SourceKind::Sdist,
            filename: Some(filename.to_string()),
        }
    };
    (artifact.package_name.clone(), artifact)
}

impl ResolverPort for ScriptedResolver {
    async fn resolve<'io>(
        &'io self,
        requirements: &'io [String],
        options: &'io ResolutionOptions,
    ) -> ResolutionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = target_key(options);
        self.resolved.lock().unwrap().push(key.clone());
        match self.outcomes.get(&key) {
            Some(Outcome::Resolve(filenames)) => ResolutionResult::Resolved {
                artifacts: filenames.iter().map(|filename| artifact(filename)).collect(),
            },
            Some(Outcome::Impossible(reason)) => ResolutionResult::Impossible {
                reason: (*reason).to_string(),
                conflicting_requirements: requirements.to_vec(),
            },
            Some(Outcome::Fail(cause)) => ResolutionResult::UnknownError {
                cause: (*cause).to_string(),
            },
            Some(Outcome::Panic(message)) => panic!("{message}"),
            None => panic!("No outcome scripted for `{key}`"),
        }
    }
}
