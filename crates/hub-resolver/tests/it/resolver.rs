use std::sync::{Arc, Mutex};

use anyhow::Result;

use hub_resolver::{
    ArtifactClassifier, DependencyResolver, PlatformTargetBuilder, PythonVersion,
    ResolutionOptions, ResolutionResult, ResolverEvent, ResolverPort,
};

use crate::memory::MemorySource;

fn target(python: (u8, u8), platform: &str) -> ResolutionOptions {
    ResolutionOptions {
        python_version: Some(PythonVersion::new(python.0, python.1, None)),
        platform_tags: Some(vec![platform.to_string()]),
        ..ResolutionOptions::default()
    }
}

fn linux() -> ResolutionOptions {
    target((3, 12), "manylinux2014_x86_64")
}

fn windows() -> ResolutionOptions {
    target((3, 12), "win_amd64")
}

fn requirements(requirements: &[&str]) -> Vec<String> {
    requirements.iter().map(ToString::to_string).collect()
}

/// `name==version (kind)` for every resolved artifact, or the failure.
fn summary(result: &ResolutionResult) -> Vec<String> {
    match result {
        ResolutionResult::Resolved { artifacts } => artifacts
            .values()
            .map(|artifact| {
                let version = artifact
                    .version
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                format!(
                    "{}=={version} ({:?})",
                    artifact.package_name, artifact.source_kind
                )
            })
            .collect(),
        ResolutionResult::Impossible {
            reason,
            conflicting_requirements,
        } => vec![
            format!("impossible: {reason}"),
            format!("conflicts: {}", conflicting_requirements.join(" | ")),
        ],
        ResolutionResult::UnknownError { cause } => vec![format!("error: {cause}")],
    }
}

fn recording(
    resolver: DependencyResolver<MemorySource>,
) -> (DependencyResolver<MemorySource>, Arc<Mutex<Vec<String>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let resolver = resolver.with_reporter(move |event: &ResolverEvent| {
        sink.lock().unwrap().push(event.to_string());
    });
    (resolver, events)
}

#[tokio::test]
async fn depends_on_target_not_host() {
    let resolver = DependencyResolver::new(
        MemorySource::new().wheel("winonly", "1.0", "cp312-cp312-win_amd64", &[]),
    );
    let requirements = requirements(&["winonly"]);

    let result = resolver.resolve(&requirements, &windows()).await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "winonly==1.0 (Wheel)",
    ]
    "#);
    let artifact = &result.artifacts().unwrap().values().next().unwrap();
    assert_eq!(
        artifact.wheel_platform_tags.as_deref(),
        Some(&["win_amd64".to_string()][..])
    );

    let result = resolver.resolve(&requirements, &linux()).await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "impossible: Package `winonly` has no wheel or source distribution usable on the target",
        "conflicts: winonly",
    ]
    "#);
}

#[tokio::test]
async fn native_wheels_on_every_family() {
    let resolver = DependencyResolver::new(
        MemorySource::new()
            .wheel("lxml", "5.2.2", "cp312-cp312-win_amd64", &[])
            .wheel("lxml", "5.2.2", "cp312-cp312-manylinux2014_x86_64", &[])
            .wheel("lxml", "5.2.2", "cp312-cp312-macosx_10_9_x86_64", &[])
            .sdist("lxml", "5.2.2", &[]),
    );
    let targets = PlatformTargetBuilder::new(ResolutionOptions::default()).build(
        &[Some(PythonVersion::new(3, 12, None))],
        &[
            Some("win".to_string()),
            Some("linux".to_string()),
            Some("macos".to_string()),
        ],
    );

    let mut filenames = Vec::new();
    for options in &targets {
        let result = resolver.resolve(&requirements(&["lxml"]), options).await;
        let artifacts = result.artifacts().unwrap();
        assert_eq!(artifacts.len(), 1, "{options}");
        let artifact = artifacts.values().next().unwrap();
        assert!(artifact.is_wheel, "{options}");
        assert!(!ArtifactClassifier::classify(artifact).is_pure(), "{options}");
        filenames.push(artifact.filename.clone().unwrap());
    }
    insta::assert_debug_snapshot!(filenames, @r#"
    [
        "lxml-5.2.2-cp312-cp312-win_amd64.whl",
        "lxml-5.2.2-cp312-cp312-manylinux2014_x86_64.whl",
        "lxml-5.2.2-cp312-cp312-macosx_10_9_x86_64.whl",
    ]
    "#);
}

#[tokio::test]
async fn transitive_closure_with_sdist() {
    let resolver = DependencyResolver::new(
        MemorySource::new()
            .wheel("app", "2.0", "py3-none-any", &["lib>=1", "tool<3"])
            .sdist("lib", "1.5", &[])
            .wheel("tool", "3.0", "py3-none-any", &[])
            .wheel("tool", "2.1", "py3-none-any", &[]),
    );
    let result = resolver
        .resolve(&requirements(&["app"]), &linux())
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "app==2.0 (Wheel)",
        "lib==1.5 (Sdist)",
        "tool==2.1 (Wheel)",
    ]
    "#);
    let artifacts = result.artifacts().unwrap();
    assert!(!artifacts.values().all(|artifact| artifact.is_wheel));
}

#[tokio::test]
async fn build_isolation_does_not_change_resolution() {
    let resolver = DependencyResolver::new(
        MemorySource::new()
            .wheel("app", "1.0", "py3-none-any", &["lib"])
            .sdist("lib", "1.0", &[]),
    );
    let isolated = resolver
        .resolve(&requirements(&["app"]), &linux())
        .await;
    let options = ResolutionOptions {
        isolated: false,
        no_build_isolation_for_deps: true,
        ..linux()
    };
    let not_isolated = resolver.resolve(&requirements(&["app"]), &options).await;
    assert_eq!(summary(&isolated), vec!["app==1.0 (Wheel)", "lib==1.0 (Sdist)"]);
    assert_eq!(isolated, not_isolated);
}

#[tokio::test]
async fn empty_requirements() {
    let resolver = DependencyResolver::new(MemorySource::new());
    let result = resolver.resolve(&[], &linux()).await;
    assert_eq!(
        result,
        ResolutionResult::Resolved {
            artifacts: Default::default()
        }
    );
    assert_eq!(resolver.source().simple_calls(), 0);
}

#[tokio::test]
async fn backtracks_to_older_version() {
    let source = MemorySource::new()
        .wheel("a", "2.0", "py3-none-any", &[])
        .wheel("a", "1.0", "py3-none-any", &[])
        .wheel("b", "2.0", "py3-none-any", &["a<2"])
        .wheel("b", "1.0", "py3-none-any", &["a<2"]);
    let (resolver, events) = recording(DependencyResolver::new(source));

    let result = resolver
        .resolve(&requirements(&["a", "b"]), &linux())
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "a==1.0 (Wheel)",
        "b==2.0 (Wheel)",
    ]
    "#);
    // The newest `a` is tried first and abandoned once `b` rules it out.
    let events = events.lock().unwrap();
    let first = events.iter().position(|event| event == "selected a==2.0");
    let second = events.iter().position(|event| event == "selected a==1.0");
    assert!(first.is_some() && second.is_some(), "{events:?}");
    assert!(first < second, "{events:?}");
    assert_eq!(events.last().map(String::as_str), Some("selected b==2.0"));
}

#[tokio::test]
async fn unsatisfiable_conflict() {
    let resolver = DependencyResolver::new(
        MemorySource::new()
            .wheel("a", "1.0", "py3-none-any", &["c>=2"])
            .wheel("b", "1.0", "py3-none-any", &["c<2"])
            .wheel("c", "1.0", "py3-none-any", &[])
            .wheel("c", "2.0", "py3-none-any", &[]),
    );
    let result = resolver
        .resolve(&requirements(&["a", "b"]), &linux())
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "impossible: No version of `c` satisfies the requirements on the target",
        "conflicts: c>=2 | c<2",
    ]
    "#);
}

#[tokio::test]
async fn round_limit() {
    let source = MemorySource::new()
        .wheel("a", "2.0", "py3-none-any", &[])
        .wheel("a", "1.0", "py3-none-any", &[])
        .wheel("b", "1.0", "py3-none-any", &["a<2"]);
    let (resolver, events) = recording(DependencyResolver::new(source).with_max_rounds(1));

    let result = resolver
        .resolve(&requirements(&["a", "b"]), &linux())
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "impossible: Resolution did not finish within 1 rounds",
        "conflicts: ",
    ]
    "#);
    assert_eq!(
        events.lock().unwrap().last().map(String::as_str),
        Some("exhausted after 1 rounds")
    );
}

#[tokio::test]
async fn missing_package() {
    let resolver = DependencyResolver::new(MemorySource::new());
    let result = resolver
        .resolve(&requirements(&["does-not-exist>=1"]), &linux())
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "impossible: Package `does-not-exist` was not found in the package index",
        "conflicts: does-not-exist>=1",
    ]
    "#);
}

#[tokio::test]
async fn network_failure_is_unknown_error() {
    let resolver = DependencyResolver::new(
        MemorySource::new()
            .wheel("app", "1.0", "py3-none-any", &["flaky"])
            .failing("flaky"),
    );
    let result = resolver
        .resolve(&requirements(&["app"]), &linux())
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "error: connection reset by peer",
    ]
    "#);
}

#[tokio::test]
async fn malformed_requirement() {
    let resolver = DependencyResolver::new(MemorySource::new());
    let result = resolver
        .resolve(&requirements(&["flask", "foo>="]), &linux())
        .await;
    assert!(result.is_unknown_error(), "{result:?}");
    assert_eq!(resolver.source().simple_calls(), 0);
}

#[tokio::test]
async fn extras_and_markers() {
    let resolver = DependencyResolver::new(
        MemorySource::new()
            .wheel(
                "app",
                "1.0",
                "py3-none-any",
                &[
                    "speedups; extra == 'fast'",
                    "winhelper; sys_platform == 'win32'",
                    "backport; python_version < '3.8'",
                ],
            )
            .wheel("speedups", "1.0", "py3-none-any", &[])
            .wheel("winhelper", "1.0", "py3-none-any", &[])
            .wheel("backport", "1.0", "py3-none-any", &[]),
    );

    let result = resolver
        .resolve(&requirements(&["app"]), &linux())
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "app==1.0 (Wheel)",
    ]
    "#);

    let result = resolver
        .resolve(&requirements(&["app[fast]"]), &windows())
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "app==1.0 (Wheel)",
        "speedups==1.0 (Wheel)",
        "winhelper==1.0 (Wheel)",
    ]
    "#);

    let result = resolver
        .resolve(
            &requirements(&["app", "winhelper; sys_platform == 'win32'"]),
            &target((3, 7), "manylinux2014_x86_64"),
        )
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "app==1.0 (Wheel)",
        "backport==1.0 (Wheel)",
    ]
    "#);
}

#[tokio::test]
async fn yanked_and_prereleases() {
    let resolver = DependencyResolver::new(
        MemorySource::new()
            .wheel("lib", "1.0", "py3-none-any", &[])
            .yanked_wheel("lib", "1.1", &[])
            .wheel("lib", "2.0rc1", "py3-none-any", &[]),
    );

    let result = resolver
        .resolve(&requirements(&["lib"]), &linux())
        .await;
    assert_eq!(summary(&result), vec!["lib==1.0 (Wheel)"]);

    let result = resolver
        .resolve(&requirements(&["lib==1.1"]), &linux())
        .await;
    assert_eq!(summary(&result), vec!["lib==1.1 (Wheel)"]);

    let options = ResolutionOptions {
        allow_prereleases: true,
        ..linux()
    };
    let result = resolver.resolve(&requirements(&["lib"]), &options).await;
    assert_eq!(summary(&result), vec!["lib==2.0rc1 (Wheel)"]);
}

#[tokio::test]
async fn requires_python_in_metadata() {
    let (resolver, events) = recording(DependencyResolver::new(
        MemorySource::new()
            .wheel("lib", "2.0", "py3-none-any", &[])
            .wheel("lib", "1.0", "py3-none-any", &[])
            .requires_python("lib", "2.0", ">=3.13"),
    ));

    let result = resolver
        .resolve(&requirements(&["lib"]), &linux())
        .await;
    assert_eq!(summary(&result), vec!["lib==1.0 (Wheel)"]);
    insta::assert_debug_snapshot!(events.lock().unwrap(), @r#"
    [
        "selected lib==2.0",
        "rejected lib==2.0: lib==2.0 requires Python >=3.13, but the target is 3.12.0",
        "selected lib==1.0",
    ]
    "#);

    let options = ResolutionOptions {
        ignore_requires_python: true,
        ..linux()
    };
    let result = resolver.resolve(&requirements(&["lib"]), &options).await;
    assert_eq!(summary(&result), vec!["lib==2.0 (Wheel)"]);
}

#[tokio::test]
async fn metadata_unavailable_skips_candidate() {
    let (resolver, events) = recording(DependencyResolver::new(
        MemorySource::new()
            .opaque_sdist("lib", "2.0")
            .wheel("lib", "1.0", "py3-none-any", &[]),
    ));
    let options = ResolutionOptions {
        prefer_binary: false,
        ..linux()
    };

    let result = resolver.resolve(&requirements(&["lib"]), &options).await;
    assert_eq!(summary(&result), vec!["lib==1.0 (Wheel)"]);
    insta::assert_debug_snapshot!(events.lock().unwrap(), @r#"
    [
        "selected lib==2.0",
        "no metadata for lib==2.0: Metadata for `lib-2.0.tar.gz` is not available without building it",
        "selected lib==1.0",
    ]
    "#);
}

#[tokio::test]
async fn direct_url_requirements() {
    let resolver = DependencyResolver::new(MemorySource::new());

    let result = resolver
        .resolve(
            &requirements(&[
                "pure @ https://example.org/wheels/pure-1.0-py3-none-any.whl",
                "tool @ git+https://github.com/example/tool@main",
            ]),
            &linux(),
        )
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "pure==1.0 (Wheel)",
        "tool== (Vcs)",
    ]
    "#);
    assert_eq!(resolver.source().simple_calls(), 0);
    assert_eq!(resolver.source().metadata_calls(), 0);

    let result = resolver
        .resolve(
            &requirements(&["native @ https://example.org/native-1.0-cp312-cp312-win_amd64.whl"]),
            &linux(),
        )
        .await;
    insta::assert_debug_snapshot!(summary(&result), @r#"
    [
        "impossible: The wheel `native-1.0-cp312-cp312-win_amd64.whl` is not compatible with the target platform",
        "conflicts: native @ https://example.org/native-1.0-cp312-cp312-win_amd64.whl",
    ]
    "#);
}

#[tokio::test]
async fn scratch_directory_is_removed() -> Result<()> {
    let cache_dir = tempfile::tempdir()?;
    let resolver = DependencyResolver::new(
        MemorySource::new()
            .wheel("app", "1.0", "py3-none-any", &["lib"])
            .wheel("lib", "1.0", "py3-none-any", &[]),
    );
    let options = ResolutionOptions {
        cache_dir: Some(cache_dir.path().join("hub")),
        ..linux()
    };

    let result = resolver.resolve(&requirements(&["app"]), &options).await;
    assert!(result.is_resolved());

    let scratch_dirs = resolver.source().scratch_dirs();
    assert_eq!(scratch_dirs.len(), 2);
    for scratch_dir in scratch_dirs {
        assert!(scratch_dir.starts_with(cache_dir.path().join("hub")));
        assert!(!scratch_dir.exists());
    }
    assert_eq!(fs_err::read_dir(cache_dir.path().join("hub"))?.count(), 0);
    Ok(())
}
