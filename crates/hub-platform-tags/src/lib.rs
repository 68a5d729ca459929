use std::cmp;
use std::num::NonZeroU32;
use std::sync::Arc;

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use tracing::trace;

pub use platform::{Arch, PlatformFamily, expand_platform_tag};

mod platform;

#[derive(Debug, Eq, Ord, PartialEq, PartialOrd, Clone, Copy)]
pub enum IncompatibleTag {
    Invalid,
    Python,
    Abi,
    Platform,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TagCompatibility {
    Incompatible(IncompatibleTag),
    Compatible(TagPriority),
}

impl Ord for TagCompatibility {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match (self, other) {
            (Self::Compatible(p_self), Self::Compatible(p_other)) => p_self.cmp(p_other),
            (Self::Incompatible(_), Self::Compatible(_)) => cmp::Ordering::Less,
            (Self::Compatible(_), Self::Incompatible(_)) => cmp::Ordering::Greater,
            (Self::Incompatible(t_self), Self::Incompatible(t_other)) => t_self.cmp(t_other),
        }
    }
}

impl PartialOrd for TagCompatibility {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(Self::cmp(self, other))
    }
}

impl TagCompatibility {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible(_))
    }
}

/// The priority of a tag. Higher values indicate higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagPriority(NonZeroU32);

impl From<usize> for TagPriority {
    /// Higher `usize` values are given higher priority. Saturates at `u32::MAX`.
    fn from(priority: usize) -> Self {
        let priority = u32::try_from(priority).unwrap_or(u32::MAX);
        Self(NonZeroU32::MIN.saturating_add(priority))
    }
}

/// The set of wheel tags installable on one target: a CPython version plus a set of declared
/// platform tags.
///
/// Its principal function is to decide whether a particular wheel is compatible with the
/// target, and how well.
#[derive(Debug, Clone)]
pub struct Tags {
    /// python_tag |--> abi_tag |--> platform_tag |--> priority
    #[allow(clippy::type_complexity)]
    map: Arc<FxHashMap<String, FxHashMap<String, FxHashMap<String, TagPriority>>>>,
    platform_tags: Arc<[String]>,
}

impl Tags {
    /// Create a new set of tags.
    ///
    /// Tags that appear earlier in the vector are given higher priority than tags that appear
    /// later.
    pub fn new(tags: Vec<(String, String, String)>) -> Self {
        let platform_tags: IndexSet<String> = tags
            .iter()
            .map(|(_, _, platform)| platform.clone())
            .filter(|platform| platform != "any")
            .collect();
        let mut map = FxHashMap::default();
        for (index, (py, abi, platform)) in tags.into_iter().rev().enumerate() {
            map.entry(py)
                .or_insert_with(FxHashMap::default)
                .entry(abi)
                .or_insert_with(FxHashMap::default)
                .entry(platform)
                .or_insert(TagPriority::from(index));
        }
        Self {
            map: Arc::new(map),
            platform_tags: platform_tags.into_iter().collect(),
        }
    }

    /// Returns the compatible tags for a CPython `python_version` on a target declared by
    /// `platform_tags`, e.g. `["manylinux2014_x86_64"]` or `["win_amd64"]`.
    ///
    /// Each declared tag is expanded to every platform tag a wheel may carry and still install
    /// there (see [`expand_platform_tag`]).
    pub fn for_target(python_version: (u8, u8), platform_tags: &[String]) -> Self {
        let (major, minor) = python_version;
        let platform_tags: IndexSet<String> = platform_tags
            .iter()
            .flat_map(|tag| expand_platform_tag(tag))
            .collect();
        trace!(
            "Expanded target platform tags for cp{major}{minor}: {}",
            platform_tags.len()
        );

        let language_tag = format!("cp{major}{minor}");
        // CPython 3.7 and earlier used `pymalloc` ABI flags.
        let abi_tag = if major == 3 && minor <= 7 {
            format!("cp{major}{minor}m")
        } else {
            format!("cp{major}{minor}")
        };

        let mut tags = Vec::with_capacity(5 * platform_tags.len() + usize::from(minor) + 2);

        // 1. This exact C API version.
        for platform_tag in &platform_tags {
            tags.push((language_tag.clone(), abi_tag.clone(), platform_tag.clone()));
            tags.push((language_tag.clone(), "abi3".to_string(), platform_tag.clone()));
            tags.push((language_tag.clone(), "none".to_string(), platform_tag.clone()));
        }
        // 2. Older stable ABI builds. 3.2 is the first version with `abi3`.
        if major == 3 {
            for older in (2..minor).rev() {
                for platform_tag in &platform_tags {
                    tags.push((
                        format!("cp{major}{older}"),
                        "abi3".to_string(),
                        platform_tag.clone(),
                    ));
                }
            }
        }
        // 3. Generic Python tags, e.g. executables wrapped in a wheel.
        for platform_tag in &platform_tags {
            tags.push((
                format!("py{major}{minor}"),
                "none".to_string(),
                platform_tag.clone(),
            ));
            tags.push((format!("py{major}"), "none".to_string(), platform_tag.clone()));
        }
        for older in (0..minor).rev() {
            for platform_tag in &platform_tags {
                tags.push((
                    format!("py{major}{older}"),
                    "none".to_string(),
                    platform_tag.clone(),
                ));
            }
        }
        // 4. Pure Python.
        tags.push((language_tag, "none".to_string(), "any".to_string()));
        tags.push((
            format!("py{major}{minor}"),
            "none".to_string(),
            "any".to_string(),
        ));
        tags.push((format!("py{major}"), "none".to_string(), "any".to_string()));
        for older in (0..minor).rev() {
            tags.push((
                format!("py{major}{older}"),
                "none".to_string(),
                "any".to_string(),
            ));
        }

        let mut tags = Self::new(tags);
        tags.platform_tags = platform_tags.into_iter().collect();
        tags
    }

    /// The expanded platform tags of this target, best first.
    pub fn platform_tags(&self) -> &[String] {
        &self.platform_tags
    }

    /// Returns true when there exists at least one tag for this target whose individual
    /// components all appear in each of the slices given.
    ///
    /// Like [`Tags::compatibility`], but short-circuits as soon as a compatible tag is found.
    pub fn is_compatible(
        &self,
        wheel_python_tags: &[String],
        wheel_abi_tags: &[String],
        wheel_platform_tags: &[String],
    ) -> bool {
        // A wheel usually carries one or two tags per slot while the target has hundreds,
        // so iterate the wheel and look up the target.
        for wheel_py in wheel_python_tags {
            let Some(abis) = self.map.get(wheel_py) else {
                continue;
            };
            for wheel_abi in wheel_abi_tags {
                let Some(platforms) = abis.get(wheel_abi) else {
                    continue;
                };
                if wheel_platform_tags
                    .iter()
                    .any(|wheel_platform| platforms.contains_key(wheel_platform))
                {
                    return true;
                }
            }
        }
        false
    }

    /// Returns the [`TagCompatibility`] of the given tags.
    ///
    /// If compatible, includes the score of the most-compatible tag.
    /// If incompatible, includes the tag part which was the closest match.
    pub fn compatibility(
        &self,
        wheel_python_tags: &[String],
        wheel_abi_tags: &[String],
        wheel_platform_tags: &[String],
    ) -> TagCompatibility {
        let mut max_compatibility = TagCompatibility::Incompatible(IncompatibleTag::Invalid);

        for wheel_py in wheel_python_tags {
            let Some(abis) = self.map.get(wheel_py) else {
                max_compatibility =
                    max_compatibility.max(TagCompatibility::Incompatible(IncompatibleTag::Python));
                continue;
            };
            for wheel_abi in wheel_abi_tags {
                let Some(platforms) = abis.get(wheel_abi) else {
                    max_compatibility =
                        max_compatibility.max(TagCompatibility::Incompatible(IncompatibleTag::Abi));
                    continue;
                };
                for wheel_platform in wheel_platform_tags {
                    let compatibility = match platforms.get(wheel_platform) {
                        Some(priority) => TagCompatibility::Compatible(*priority),
                        None => TagCompatibility::Incompatible(IncompatibleTag::Platform),
                    };
                    max_compatibility = max_compatibility.max(compatibility);
                }
            }
        }
        max_compatibility
    }
}
