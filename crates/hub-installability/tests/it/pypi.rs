//! Resolutions against the real PyPI.
//!
//! These depend on the current state of the index, and only run with the `pypi` feature.

use hub_installability::InstallationRequirements;
use hub_resolver::{PythonVersion, ResolutionOptions};

fn classifiers(requirements: &[&str]) -> InstallationRequirements {
    InstallationRequirements::from_classifiers(
        requirements.iter().map(ToString::to_string).collect(),
        ResolutionOptions::default(),
        &[Some(PythonVersion::new(3, 12, None))],
        &[
            Some("win".to_string()),
            Some("linux".to_string()),
            Some("macos".to_string()),
        ],
    )
}

#[tokio::test]
async fn numpy() {
    let requirements = classifiers(&["numpy<2"]);
    for index in 0..requirements.options_list().len() {
        assert!(requirements.is_installable(index).await, "target {index}");
        assert!(requirements.alldeps_wheel(index).await, "target {index}");
        assert!(
            !requirements.has_no_c_extensions_dependencies(index).await,
            "target {index}"
        );
        assert_eq!(requirements.num_installed_packages(index).await, 1);
    }
    assert!(requirements.has_windows_support().await);
    assert!(requirements.has_linux_support().await);
    assert!(requirements.has_macos_support().await);
    assert!(!requirements.had_unexpected_error());
}

#[tokio::test]
async fn lxml() {
    let requirements = classifiers(&["lxml"]);
    let report = requirements.report().await;
    assert!(report.is_installable_everywhere());
    for target in &report.targets {
        assert!(target.alldeps_wheel, "{}", target.target);
    }
    assert!(
        report
            .targets
            .iter()
            .any(|target| !target.has_no_c_extensions_dependencies)
    );
    assert!(report.has_windows_support);
    assert!(report.has_linux_support);
    assert!(report.has_macos_support);
    assert!(!report.had_unexpected_error);
}

#[tokio::test]
async fn pure_python() {
    let requirements = classifiers(&["requests>=2.31"]);
    let report = requirements.report().await;
    assert!(report.is_installable_everywhere());
    for target in &report.targets {
        assert!(target.alldeps_wheel, "{}", target.target);
        assert!(target.has_no_c_extensions_dependencies, "{}", target.target);
        // requests, charset-normalizer, idna, urllib3, certifi.
        assert!(target.num_installed_packages >= 5, "{}", target.target);
    }
}

#[tokio::test]
async fn nonexistent_package() {
    let requirements = classifiers(&["this-package-does-not-exist-on-pypi-4c1f"]);
    assert!(!requirements.is_installable(0).await);
    assert!(requirements.has_no_c_extensions_dependencies(0).await);
    assert_eq!(requirements.num_installed_packages(0).await, 0);
    assert!(!requirements.had_unexpected_error());
}
