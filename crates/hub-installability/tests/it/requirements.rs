use std::sync::Arc;

use anyhow::Result;

use hub_installability::InstallationRequirements;
use hub_resolver::{PythonVersion, ResolutionOptions, ResolutionResult};

use crate::scripted::{Outcome, ScriptedResolver, target_key};

const SIX: &str = "six-1.16.0-py2.py3-none-any.whl";
const NUMPY_WIN: &str = "numpy-1.26.2-cp311-cp311-win_amd64.whl";
const PYYAML: &str = "pyyaml-6.0.1.tar.gz";

fn target(python_version: &str, platform_tag: &str) -> ResolutionOptions {
    ResolutionOptions {
        python_version: Some(python_version.parse().unwrap()),
        platform_tags: Some(vec![platform_tag.to_string()]),
        ..ResolutionOptions::default()
    }
}

fn requirements(
    targets: Vec<ResolutionOptions>,
    resolver: &Arc<ScriptedResolver>,
) -> InstallationRequirements<Arc<ScriptedResolver>> {
    InstallationRequirements::with_resolver(
        vec!["numpy>=1.20".to_string(), "six".to_string()],
        targets,
        resolver.clone(),
    )
}

#[tokio::test]
async fn memoized_per_target() -> Result<()> {
    let resolver = Arc::new(ScriptedResolver::new().on("3.11 / win", Outcome::Resolve(&[SIX])));
    let requirements = requirements(
        vec![
            target("3.11", "win_amd64"),
            // The same target, with different network settings.
            ResolutionOptions {
                retries: 0,
                ..target("3.11", "win_amd64")
            },
        ],
        &resolver,
    );

    let first = requirements.resolve_dependencies(0).await.unwrap();
    let second = requirements.resolve_dependencies(0).await.unwrap();
    let third = requirements.resolve_dependencies(1).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(resolver.calls(), 1);
    assert_eq!(requirements.cache().len(), 1);

    assert!(requirements.is_installable(0).await);
    assert!(requirements.alldeps_wheel(0).await);
    assert_eq!(requirements.num_installed_packages(1).await, 1);
    assert_eq!(resolver.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn clear_cache_forces_resolution() {
    let resolver = Arc::new(
        ScriptedResolver::new()
            .on("3.11 / win", Outcome::Resolve(&[SIX]))
            .on("3.11 / linux", Outcome::Fail("Failed to fetch `six`")),
    );
    let requirements = requirements(
        vec![target("3.11", "win_amd64"), target("3.11", "manylinux2014_x86_64")],
        &resolver,
    );

    let before = requirements.resolve_dependencies(0).await.unwrap();
    assert!(requirements.resolve_dependencies(1).await.is_none());
    assert!(requirements.had_unexpected_error());
    assert_eq!(resolver.calls(), 2);

    requirements.clear_cache();
    assert!(requirements.cache().is_empty());
    assert!(!requirements.had_unexpected_error());

    let after = requirements.resolve_dependencies(0).await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before, after);
    assert_eq!(resolver.calls(), 3);
    assert!(!requirements.had_unexpected_error());
}

#[tokio::test]
async fn unexpected_error_is_not_a_result() {
    let resolver = Arc::new(
        ScriptedResolver::new().on("3.12 / linux", Outcome::Fail("error: connection reset")),
    );
    let requirements = requirements(vec![target("3.12", "manylinux2014_x86_64")], &resolver);

    assert!(!requirements.had_unexpected_error());
    assert!(requirements.resolve_dependencies(0).await.is_none());
    assert!(requirements.had_unexpected_error());
    assert!(!requirements.is_installable(0).await);
    assert!(requirements.alldeps_wheel(0).await);
    assert!(requirements.has_no_c_extensions_dependencies(0).await);
    assert_eq!(requirements.num_installed_packages(0).await, 0);
    assert!(!requirements.has_linux_support().await);

    // The failure is cached like any other outcome.
    assert_eq!(resolver.calls(), 1);
    let results = requirements.resolve_all().await;
    assert_eq!(
        *results[0],
        ResolutionResult::UnknownError {
            cause: "error: connection reset".to_string()
        }
    );
    assert_eq!(resolver.calls(), 1);
}

#[tokio::test]
async fn unknown_error_stays_with_its_target() {
    let resolver = Arc::new(
        ScriptedResolver::new()
            .on("3.12 / win", Outcome::Fail("error: connection reset"))
            .on("3.12 / linux", Outcome::Resolve(&[SIX])),
    );
    let requirements = requirements(
        vec![target("3.12", "win_amd64"), target("3.12", "manylinux2014_x86_64")],
        &resolver,
    );

    let report = requirements.report().await;
    assert!(report.had_unexpected_error);
    assert!(!report.has_windows_support);
    assert!(report.has_linux_support);

    let (failed, installable) = (&report.targets[0], &report.targets[1]);
    assert!(failed.unexpected_error);
    assert!(!failed.installable);
    assert_eq!(failed.reason.as_deref(), Some("error: connection reset"));
    assert!(!installable.unexpected_error);
    assert!(installable.installable);
    assert_eq!(installable.num_installed_packages, 1);
    assert_eq!(resolver.calls(), 2);
}

#[tokio::test]
async fn panic_is_contained() {
    let resolver = Arc::new(
        ScriptedResolver::new()
            .on("3.11 / win", Outcome::Panic("index out of bounds"))
            .on("3.11 / linux", Outcome::Resolve(&[SIX])),
    );
    let requirements = requirements(
        vec![target("3.11", "win_amd64"), target("3.11", "manylinux2014_x86_64")],
        &resolver,
    );

    assert!(requirements.resolve_dependencies(0).await.is_none());
    assert!(requirements.had_unexpected_error());
    assert!(requirements.is_installable(1).await);
    assert!(!requirements.has_windows_support().await);
    assert!(requirements.has_linux_support().await);

    let results = requirements.resolve_all().await;
    insta::assert_debug_snapshot!(results[0], @r#"
    UnknownError {
        cause: "Resolver panicked: index out of bounds",
    }
    "#);
    assert!(results[1].is_resolved());
    assert_eq!(resolver.calls(), 2);
}

#[tokio::test]
async fn out_of_range() {
    let resolver = Arc::new(ScriptedResolver::new());
    let requirements = requirements(vec![], &resolver);

    assert!(requirements.resolve_dependencies(0).await.is_none());
    assert!(!requirements.is_installable(3).await);
    assert_eq!(requirements.num_installed_packages(3).await, 0);
    assert!(!requirements.had_unexpected_error());
    assert!(requirements.resolve_all().await.is_empty());
    assert_eq!(resolver.calls(), 0);
}

#[tokio::test]
async fn signals_per_target() {
    let resolver = Arc::new(
        ScriptedResolver::new()
            .on("3.11 / win", Outcome::Resolve(&[SIX, NUMPY_WIN]))
            .on("3.11 / linux", Outcome::Resolve(&[SIX, PYYAML]))
            .on("3.11 / macos", Outcome::Resolve(&[SIX])),
    );
    let requirements = requirements(
        vec![
            target("3.11", "win_amd64"),
            target("3.11", "manylinux2014_x86_64"),
            target("3.11", "macosx_11_0_arm64"),
        ],
        &resolver,
    );

    // A platform wheel.
    assert!(requirements.alldeps_wheel(0).await);
    assert!(!requirements.has_no_c_extensions_dependencies(0).await);
    assert_eq!(requirements.num_installed_packages(0).await, 2);

    // A source distribution.
    assert!(!requirements.alldeps_wheel(1).await);
    assert!(!requirements.has_no_c_extensions_dependencies(1).await);

    // Pure wheels only.
    assert!(requirements.alldeps_wheel(2).await);
    assert!(requirements.has_no_c_extensions_dependencies(2).await);
    assert_eq!(requirements.num_installed_packages(2).await, 1);

    assert!(!requirements.had_unexpected_error());
}

#[tokio::test]
async fn family_support() {
    let resolver = Arc::new(
        ScriptedResolver::new()
            .on("3.10 / win", Outcome::Impossible("No wheels for windows"))
            .on("3.11 / win", Outcome::Resolve(&[SIX]))
            .on("3.11 / linux", Outcome::Impossible("No wheels for linux"))
            .on("3.11 / macos", Outcome::Fail("error: timed out")),
    );
    let requirements = requirements(
        vec![
            target("3.10", "win_amd64"),
            target("3.11", "win_amd64"),
            target("3.11", "manylinux2014_x86_64"),
            target("3.11", "macosx_10_9_x86_64"),
        ],
        &resolver,
    );

    assert!(requirements.has_windows_support().await);
    assert!(!requirements.has_linux_support().await);
    assert!(!requirements.has_macos_support().await);
    assert!(requirements.had_unexpected_error());
    assert!(!requirements.is_installable(0).await);
    assert!(requirements.has_no_c_extensions_dependencies(2).await);
    assert_eq!(requirements.num_installed_packages(2).await, 0);
}

#[tokio::test]
async fn resolve_all_keeps_target_order() {
    let resolver = Arc::new(
        ScriptedResolver::new()
            .on("3.10 / win", Outcome::Resolve(&[SIX]))
            .on("3.10 / linux", Outcome::Impossible("No matching distribution"))
            .on("3.11 / win", Outcome::Resolve(&[SIX, NUMPY_WIN]))
            .on("3.11 / linux", Outcome::Fail("error: dns error")),
    );
    let requirements = requirements(
        vec![
            target("3.10", "win_amd64"),
            target("3.10", "manylinux2014_x86_64"),
            target("3.11", "win_amd64"),
            target("3.11", "manylinux2014_x86_64"),
        ],
        &resolver,
    )
    .with_concurrency(2);

    let results = requirements.resolve_all().await;
    let statuses = results
        .iter()
        .map(|result| match result.as_ref() {
            ResolutionResult::Resolved { artifacts } => format!("resolved ({})", artifacts.len()),
            ResolutionResult::Impossible { reason, .. } => format!("impossible: {reason}"),
            ResolutionResult::UnknownError { cause } => format!("unknown: {cause}"),
        })
        .collect::<Vec<_>>();
    insta::assert_debug_snapshot!(statuses, @r#"
    [
        "resolved (1)",
        "impossible: No matching distribution",
        "resolved (2)",
        "unknown: error: dns error",
    ]
    "#);
    assert_eq!(resolver.calls(), 4);
    assert_eq!(requirements.cache().len(), 4);

    // Everything is cached now.
    assert!(requirements.is_installable(2).await);
    assert_eq!(resolver.calls(), 4);
}

#[tokio::test]
async fn report() {
    let resolver = Arc::new(
        ScriptedResolver::new()
            .on("3.11 / win", Outcome::Resolve(&[SIX, NUMPY_WIN]))
            .on(
                "3.11 / linux",
                Outcome::Impossible("No version of `numpy` satisfies the requirements on the target"),
            ),
    );
    let requirements = requirements(
        vec![target("3.11", "win_amd64"), target("3.11", "manylinux2014_x86_64")],
        &resolver,
    );

    let report = requirements.report().await;
    assert!(!report.is_installable_everywhere());
    insta::assert_json_snapshot!(report, @r#"
    {
      "targets": [
        {
          "target": "3.11 / win_amd64",
          "python_version": "3.11",
          "platform_tags": [
            "win_amd64"
          ],
          "platform_family": "windows",
          "installable": true,
          "alldeps_wheel": true,
          "has_no_c_extensions_dependencies": false,
          "num_installed_packages": 2,
          "unexpected_error": false
        },
        {
          "target": "3.11 / manylinux2014_x86_64",
          "python_version": "3.11",
          "platform_tags": [
            "manylinux2014_x86_64"
          ],
          "platform_family": "linux",
          "installable": false,
          "alldeps_wheel": true,
          "has_no_c_extensions_dependencies": true,
          "num_installed_packages": 0,
          "reason": "No version of `numpy` satisfies the requirements on the target",
          "unexpected_error": false
        }
      ],
      "has_windows_support": true,
      "has_linux_support": false,
      "has_macos_support": false,
      "had_unexpected_error": false
    }
    "#);
}

#[test]
fn from_classifiers() {
    let base = ResolutionOptions {
        retries: 1,
        ..ResolutionOptions::default()
    };
    let requirements = InstallationRequirements::from_classifiers(
        vec!["requests".to_string()],
        base,
        &[
            Some(PythonVersion::new(3, 10, None)),
            Some(PythonVersion::new(3, 12, Some(1))),
        ],
        &[Some("win".to_string()), Some("linux".to_string())],
    );
    assert_eq!(requirements.requirements(), ["requests"]);
    let targets = requirements
        .options_list()
        .iter()
        .map(target_key)
        .collect::<Vec<_>>();
    insta::assert_debug_snapshot!(targets, @r#"
    [
        "3.10 / win",
        "3.10 / linux",
        "3.12.1 / win",
        "3.12.1 / linux",
    ]
    "#);
    assert!(
        requirements
            .options_list()
            .iter()
            .all(|options| options.retries == 1)
    );
}
