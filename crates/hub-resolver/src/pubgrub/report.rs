use std::collections::BTreeSet;

use pubgrub::{DefaultStringReporter, DerivationTree, External, Range, Reporter as _};
use rustc_hash::FxHashMap;
use tracing::debug;

use hub_normalize::PackageName;
use hub_pep440::Version;

use crate::error::NoSolutionError;
use crate::pubgrub::PubGrubPackage;

type Tree = DerivationTree<PubGrubPackage, Range<Version>, String>;
type Incompatibility = External<PubGrubPackage, Range<Version>, String>;

/// Condenses a PubGrub derivation tree into the package at fault, a reason and the
/// requirements that were declared on that package.
pub(crate) struct NoSolutionReport<'a> {
    /// Why a package has no candidate at all, e.g. because no index knows it.
    pub(crate) unavailable: &'a FxHashMap<PackageName, String>,
    /// The requirements each package declared on each of its dependencies.
    pub(crate) declared: &'a FxHashMap<(PubGrubPackage, PackageName), Vec<String>>,
}

impl NoSolutionReport<'_> {
    pub(crate) fn explain(&self, tree: &Tree) -> NoSolutionError {
        debug!("No solution:\n{}", DefaultStringReporter::report(tree));

        let mut externals = Vec::new();
        collect_externals(tree, &mut externals);

        let Some((package, reason)) = self.blame(&externals) else {
            return NoSolutionError {
                package: None,
                reason: DefaultStringReporter::report(tree),
                requirements: Vec::new(),
            };
        };
        let requirements = self.requirements_on(&package, &externals);
        NoSolutionError {
            package: Some(package),
            reason,
            requirements,
        }
    }

    /// The package at fault, most specific explanation first: a package without candidates,
    /// a version that was ruled out for a stated reason, requirements that exclude each other,
    /// and finally any package that ran out of versions.
    fn blame(&self, externals: &[&Incompatibility]) -> Option<(PackageName, String)> {
        let no_versions = || {
            externals.iter().filter_map(|external| match external {
                External::NoVersions(package, _) => package.name(),
                _ => None,
            })
        };

        if let Some((name, reason)) = no_versions()
            .find_map(|name| Some((name.clone(), self.unavailable.get(name)?.clone())))
        {
            return Some((name, reason));
        }

        if let Some((name, reason)) = externals.iter().find_map(|external| match external {
            External::Custom(package, _, reason) => Some((package.name()?.clone(), reason.clone())),
            _ => None,
        }) {
            return Some((name, reason));
        }

        let name = conflicting_demands(externals).or_else(|| no_versions().next().cloned())?;
        let reason = format!("No version of `{name}` satisfies the requirements on the target");
        Some((name, reason))
    }

    /// The requirements on `package` from the dependents named in the tree, ordered by
    /// dependent.
    fn requirements_on(&self, package: &PackageName, externals: &[&Incompatibility]) -> Vec<String> {
        let mut dependents: BTreeSet<&PubGrubPackage> = externals
            .iter()
            .filter_map(|external| match external {
                External::FromDependencyOf(dependent, _, dependency, _)
                    if dependency.name() == Some(package) =>
                {
                    Some(dependent)
                }
                _ => None,
            })
            .collect();
        if dependents.is_empty() {
            dependents = self
                .declared
                .keys()
                .filter(|(_, dependency)| dependency == package)
                .map(|(dependent, _)| dependent)
                .collect();
        }

        let mut requirements: Vec<String> = Vec::new();
        for dependent in dependents {
            for requirement in self
                .declared
                .get(&(dependent.clone(), package.clone()))
                .into_iter()
                .flatten()
            {
                if !requirements.contains(requirement) {
                    requirements.push(requirement.clone());
                }
            }
        }
        requirements
    }
}

fn collect_externals<'a>(tree: &'a Tree, externals: &mut Vec<&'a Incompatibility>) {
    match tree {
        DerivationTree::External(external) => externals.push(external),
        DerivationTree::Derived(derived) => {
            collect_externals(&derived.cause1, externals);
            collect_externals(&derived.cause2, externals);
        }
    }
}

/// The first package whose dependents ask for versions that exclude each other.
fn conflicting_demands(externals: &[&Incompatibility]) -> Option<PackageName> {
    let mut demands: Vec<(&PackageName, Range<Version>, usize)> = Vec::new();
    for external in externals {
        let External::FromDependencyOf(_, _, dependency, range) = external else {
            continue;
        };
        let Some(name) = dependency.name() else {
            continue;
        };
        match demands.iter_mut().find(|(known, ..)| *known == name) {
            Some((_, demanded, count)) => {
                *demanded = demanded.intersection(range);
                *count += 1;
            }
            None => demands.push((name, range.clone(), 1)),
        }
    }
    demands
        .into_iter()
        .find(|(_, demanded, count)| *count > 1 && demanded.is_empty())
        .map(|(name, ..)| name.clone())
}
