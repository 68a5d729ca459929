//! Platform families and the wheel platform tags a declared target tag accepts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The historical macOS wheel tags a "macos" target stands for.
const MACOS_TAGS: &[&str] = &[
    "macosx_10_9_x86_64",
    "macosx_10_10_x86_64",
    "macosx_10_11_x86_64",
    "macosx_10_12_x86_64",
    "macosx_10_13_x86_64",
    "macosx_10_14_x86_64",
    "macosx_10_15_x86_64",
    "macosx_11_0_x86_64",
    "macosx_12_0_x86_64",
    "macosx_13_0_x86_64",
    "macosx_14_0_x86_64",
    "macosx_10_9_intel",
    "macosx_10_9_universal2",
    "macosx_11_0_universal2",
    "macosx_12_0_universal2",
    "macosx_11_0_arm64",
    "macosx_12_0_arm64",
    "macosx_13_0_arm64",
    "macosx_14_0_arm64",
];

/// The operating system families a target can be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    Windows,
    Linux,
    Macos,
}

impl PlatformFamily {
    /// Parse a canonical platform name: `win`, `linux` or `macos`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "win" | "windows" => Some(Self::Windows),
            "linux" => Some(Self::Linux),
            "macos" => Some(Self::Macos),
            _ => None,
        }
    }

    /// The canonical platform name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Windows => "win",
            Self::Linux => "linux",
            Self::Macos => "macos",
        }
    }

    /// The wheel tags that stand for this family when it is declared as a target.
    pub fn default_tags(self) -> Vec<String> {
        match self {
            Self::Windows => vec!["win_amd64".to_string()],
            Self::Linux => vec!["manylinux2014_x86_64".to_string()],
            Self::Macos => MACOS_TAGS.iter().map(ToString::to_string).collect(),
        }
    }

    /// The family a wheel platform tag belongs to, if any.
    pub fn from_platform_tag(tag: &str) -> Option<Self> {
        if tag.starts_with("win") {
            Some(Self::Windows)
        } else if tag.starts_with("manylinux")
            || tag.starts_with("musllinux")
            || tag.starts_with("linux")
        {
            Some(Self::Linux)
        } else if tag.starts_with("macosx") {
            Some(Self::Macos)
        } else {
            None
        }
    }

    /// The family of the machine we're running on.
    pub fn host() -> Option<Self> {
        match std::env::consts::OS {
            "windows" => Some(Self::Windows),
            "linux" => Some(Self::Linux),
            "macos" => Some(Self::Macos),
            _ => None,
        }
    }

    /// `sys.platform` on this family.
    pub fn sys_platform(self) -> &'static str {
        match self {
            Self::Windows => "win32",
            Self::Linux => "linux",
            Self::Macos => "darwin",
        }
    }

    /// `platform.system()` on this family.
    pub fn platform_system(self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::Macos => "Darwin",
        }
    }

    /// `os.name` on this family.
    pub fn os_name(self) -> &'static str {
        match self {
            Self::Windows => "nt",
            Self::Linux | Self::Macos => "posix",
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PlatformFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("Unknown platform: {s}"))
    }
}

/// CPU architectures that appear in platform tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Aarch64,
    Armv7L,
    Powerpc64Le,
    Powerpc64,
    S390X,
    X86,
    X86_64,
}

impl Arch {
    fn from_tag_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "aarch64" | "arm64" => Some(Self::Aarch64),
            "armv7l" => Some(Self::Armv7L),
            "ppc64le" => Some(Self::Powerpc64Le),
            "ppc64" => Some(Self::Powerpc64),
            "s390x" => Some(Self::S390X),
            "i686" | "x86" => Some(Self::X86),
            "x86_64" | "amd64" => Some(Self::X86_64),
            _ => None,
        }
    }

    /// The lowest glibc minor a manylinux wheel for this architecture can declare.
    fn minimum_manylinux_minor(self) -> u16 {
        match self {
            // manylinux 2014
            Self::Aarch64 | Self::Armv7L | Self::Powerpc64 | Self::Powerpc64Le | Self::S390X => 17,
            // manylinux 1
            Self::X86 | Self::X86_64 => 5,
        }
    }

    /// `platform.machine()` for this architecture on the given family.
    pub fn platform_machine(self, family: PlatformFamily) -> &'static str {
        match (family, self) {
            (PlatformFamily::Windows, Self::X86_64) => "AMD64",
            (PlatformFamily::Windows, Self::X86) => "x86",
            (PlatformFamily::Windows, Self::Aarch64) => "ARM64",
            (PlatformFamily::Macos, Self::Aarch64) => "arm64",
            (_, Self::Aarch64) => "aarch64",
            (_, Self::Armv7L) => "armv7l",
            (_, Self::Powerpc64Le) => "ppc64le",
            (_, Self::Powerpc64) => "ppc64",
            (_, Self::S390X) => "s390x",
            (_, Self::X86) => "i686",
            (_, Self::X86_64) => "x86_64",
        }
    }

    /// The architecture of a platform tag such as `win_amd64`, `manylinux2014_aarch64` or
    /// `macosx_11_0_arm64`. Multi-architecture macOS formats report `x86_64`.
    pub fn from_platform_tag(tag: &str) -> Option<Self> {
        if tag == "win32" {
            return Some(Self::X86);
        }
        if let Some(suffix) = tag
            .strip_prefix("win_")
            .or_else(|| tag.strip_prefix("linux_"))
        {
            return Self::from_tag_suffix(suffix);
        }
        if let Some(rest) = tag.strip_prefix("macosx_") {
            let format = rest.splitn(3, '_').nth(2)?;
            return Self::from_tag_suffix(format).or(Some(Self::X86_64));
        }
        LinuxTag::parse(tag).map(|linux| linux.arch)
    }
}

/// A parsed `manylinux` or `musllinux` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinuxTag<'a> {
    musl: bool,
    major: u16,
    minor: u16,
    arch: Arch,
    arch_name: &'a str,
}

impl<'a> LinuxTag<'a> {
    fn parse(tag: &'a str) -> Option<Self> {
        // PEP 600 legacy aliases.
        for (prefix, minor) in [
            ("manylinux1_", 5),
            ("manylinux2010_", 12),
            ("manylinux2014_", 17),
        ] {
            if let Some(arch_name) = tag.strip_prefix(prefix) {
                return Some(Self {
                    musl: false,
                    major: 2,
                    minor,
                    arch: Arch::from_tag_suffix(arch_name)?,
                    arch_name,
                });
            }
        }
        let (musl, rest) = if let Some(rest) = tag.strip_prefix("manylinux_") {
            (false, rest)
        } else if let Some(rest) = tag.strip_prefix("musllinux_") {
            (true, rest)
        } else {
            return None;
        };
        let mut parts = rest.splitn(3, '_');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let arch_name = parts.next()?;
        Some(Self {
            musl,
            major,
            minor,
            arch: Arch::from_tag_suffix(arch_name)?,
            arch_name,
        })
    }

    /// Every tag a wheel may carry to install on this target, best first.
    fn compatible_tags(self) -> Vec<String> {
        let arch_name = self.arch_name;
        if self.musl {
            // musl 1.1 is the lowest supported version in musllinux.
            return (1..=self.minor)
                .rev()
                .map(|minor| format!("musllinux_{}_{minor}_{arch_name}", self.major))
                .collect();
        }
        let lowest = self.arch.minimum_manylinux_minor();
        let mut tags = Vec::new();
        for minor in (lowest..=self.minor).rev() {
            tags.push(format!("manylinux_{}_{minor}_{arch_name}", self.major));
            if self.major == 2 {
                match minor {
                    17 => tags.push(format!("manylinux2014_{arch_name}")),
                    12 => tags.push(format!("manylinux2010_{arch_name}")),
                    5 => tags.push(format!("manylinux1_{arch_name}")),
                    _ => {}
                }
            }
        }
        tags
    }
}

/// The binary formats a macOS wheel may declare and still run on `arch` at the given version.
///
/// See: <https://github.com/pypa/packaging/blob/fd4f11139d1c884a637be8aa26bb60a31fbc9411/packaging/tags.py#L314>
fn mac_binary_formats(major: u16, minor: u16, arch: Arch) -> Vec<&'static str> {
    match arch {
        Arch::X86_64 => {
            if (major, minor) < (10, 4) {
                return vec![];
            }
            vec!["x86_64", "intel", "fat64", "fat32", "universal2", "universal"]
        }
        Arch::Aarch64 => {
            if major < 11 {
                vec!["universal2"]
            } else {
                vec!["arm64", "universal2"]
            }
        }
        _ => vec![],
    }
}

/// Every tag a wheel may carry to install on a `macosx_{major}_{minor}_{format}` target, best
/// first.
fn macos_compatible_tags(major: u16, minor: u16, format: &str) -> Vec<String> {
    let mut versions = Vec::new();
    if major >= 11 {
        // Since macOS 11, each yearly release bumps the major version.
        if minor > 0 {
            versions.push((major, minor));
        }
        versions.extend((11..=major).rev().map(|major| (major, 0)));
        // The x86_64 half of a universal2 wheel may target earlier releases.
        versions.extend((4..=16).rev().map(|minor| (10, minor)));
    } else {
        versions.extend((0..=minor).rev().map(|minor| (major, minor)));
    }

    let mut tags = Vec::new();
    for (major, minor) in versions {
        match Arch::from_tag_suffix(format) {
            Some(arch) => {
                for binary_format in mac_binary_formats(major, minor, arch) {
                    tags.push(format!("macosx_{major}_{minor}_{binary_format}"));
                }
            }
            // A multi-architecture format only accepts the same format.
            None => tags.push(format!("macosx_{major}_{minor}_{format}")),
        }
    }
    tags
}

/// Expand a declared target platform tag into every platform tag a wheel may carry and still
/// install there, best first.
///
/// Unknown tags expand to themselves.
pub fn expand_platform_tag(tag: &str) -> Vec<String> {
    if let Some(linux) = LinuxTag::parse(tag) {
        return linux.compatible_tags();
    }
    if let Some(rest) = tag.strip_prefix("macosx_") {
        let mut parts = rest.splitn(3, '_');
        if let (Some(Ok(major)), Some(Ok(minor)), Some(format)) = (
            parts.next().map(str::parse::<u16>),
            parts.next().map(str::parse::<u16>),
            parts.next(),
        ) {
            let tags = macos_compatible_tags(major, minor, format);
            if !tags.is_empty() {
                return tags;
            }
        }
    }
    vec![tag.to_string()]
}
