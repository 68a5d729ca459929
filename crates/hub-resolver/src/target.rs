use std::str::FromStr;

use tracing::debug;

use hub_pep440::{Version, VersionParseError};
use hub_pep508::{MarkerEnvironment, StringVersion};
use hub_platform_tags::{Arch, PlatformFamily, Tags};

use crate::options::{PythonVersion, ResolutionOptions};

/// Expands a (python versions x platforms) matrix into one [`ResolutionOptions`] per target.
#[derive(Debug, Clone, Default)]
pub struct PlatformTargetBuilder {
    base: ResolutionOptions,
}

impl PlatformTargetBuilder {
    /// Create a builder whose targets share the index, network and resolution settings of
    /// `base`.
    pub fn new(base: ResolutionOptions) -> Self {
        Self { base }
    }

    /// One target per (version, platform) pair, in version-major order.
    ///
    /// Platforms are `win`, `linux` or `macos`, which expand to the tags of that family. Any
    /// other string is used as a literal platform tag. `None` stands for the host.
    pub fn build(
        &self,
        python_versions: &[Option<PythonVersion>],
        platforms: &[Option<String>],
    ) -> Vec<ResolutionOptions> {
        python_versions
            .iter()
            .flat_map(|python_version| {
                platforms.iter().map(move |platform| ResolutionOptions {
                    python_version: *python_version,
                    platform_tags: platform.as_deref().map(platform_tags),
                    ..self.base.clone()
                })
            })
            .collect()
    }
}

/// The platform tags a declared platform stands for.
pub fn platform_tags(platform: &str) -> Vec<String> {
    match PlatformFamily::from_name(platform) {
        Some(family) => family.default_tags(),
        None => vec![platform.to_string()],
    }
}

/// The interpreter a resolution targets: its wheel tags, marker values and version.
#[derive(Debug, Clone)]
pub struct TargetEnvironment {
    pub(crate) tags: Tags,
    pub(crate) markers: MarkerEnvironment,
    pub(crate) python_version: Version,
}

impl TargetEnvironment {
    pub fn from_options(options: &ResolutionOptions) -> Result<Self, VersionParseError> {
        let python_version = options.target_python_version();
        let platform_tags = options.target_platform_tags();
        let tags = Tags::for_target(
            (python_version.major(), python_version.minor()),
            &platform_tags,
        );
        let markers = marker_environment(python_version, &platform_tags)?;
        debug!(
            "Resolving for python {python_version} on {} ({})",
            markers.sys_platform,
            markers.platform_machine
        );
        Ok(Self {
            tags,
            markers,
            python_version: Version::from_str(&python_version.python_full_version())?,
        })
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn markers(&self) -> &MarkerEnvironment {
        &self.markers
    }

    /// The version `Requires-Python` is checked against.
    pub fn python_version(&self) -> &Version {
        &self.python_version
    }
}

/// Synthesize the marker values of a CPython interpreter on the platform of the first
/// declared tag with a known family.
///
/// Tags outside the known families leave the platform markers empty, so that no
/// platform-specific marker matches.
fn marker_environment(
    python_version: PythonVersion,
    platform_tags: &[String],
) -> Result<MarkerEnvironment, VersionParseError> {
    let platform = platform_tags.iter().find_map(|tag| {
        PlatformFamily::from_platform_tag(tag)
            .map(|family| (family, Arch::from_platform_tag(tag).unwrap_or(Arch::X86_64)))
    });
    let (os_name, sys_platform, platform_system, platform_machine) = match platform {
        Some((family, arch)) => (
            family.os_name(),
            family.sys_platform(),
            family.platform_system(),
            arch.platform_machine(family),
        ),
        None => ("", "", "", ""),
    };

    let python_full_version = StringVersion::from_str(&python_version.python_full_version())?;
    Ok(MarkerEnvironment {
        implementation_name: "cpython".to_string(),
        implementation_version: python_full_version.clone(),
        os_name: os_name.to_string(),
        platform_machine: platform_machine.to_string(),
        platform_python_implementation: "CPython".to_string(),
        platform_release: String::new(),
        platform_system: platform_system.to_string(),
        platform_version: String::new(),
        python_full_version,
        python_version: StringVersion::from_str(&python_version.python_version())?,
        sys_platform: sys_platform.to_string(),
    })
}
