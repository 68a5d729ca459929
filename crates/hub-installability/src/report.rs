use serde::Serialize;

use hub_platform_tags::PlatformFamily;
use hub_resolver::PythonVersion;

/// The installability signals of every target, and their aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallabilityReport {
    pub targets: Vec<TargetReport>,
    pub has_windows_support: bool,
    pub has_linux_support: bool,
    pub has_macos_support: bool,
    pub had_unexpected_error: bool,
}

impl InstallabilityReport {
    /// Whether the requirements resolve on every target.
    pub fn is_installable_everywhere(&self) -> bool {
        self.targets.iter().all(|target| target.installable)
    }
}

/// The signals of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub python_version: PythonVersion,
    pub platform_tags: Vec<String>,
    pub platform_family: Option<PlatformFamily>,
    pub installable: bool,
    pub alldeps_wheel: bool,
    pub has_no_c_extensions_dependencies: bool,
    pub num_installed_packages: usize,
    /// Why the target isn't installable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub unexpected_error: bool,
}
