use std::cmp::{Ordering, max};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::iter;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// The PEP 440 appendix B regex, extended to accept a trailing `.*` for specifiers.
///
/// See <https://peps.python.org/pep-0440/#appendix-b-parsing-version-strings-with-regular-expressions>
const VERSION_RE_INNER: &str = r"
(?:
    (?:v?)
    (?:(?P<epoch>[0-9]+)!)?
    (?P<release>[0-9]+(?:\.[0-9]+)*)
    (?P<pre_field>
        [-_\.]?
        (?P<pre_name>(a|b|c|rc|alpha|beta|pre|preview))
        [-_\.]?
        (?P<pre>[0-9]+)?
    )?
    (?P<post_field>
        (?:-(?P<post_old>[0-9]+))
        |
        (?:
            [-_\.]?
            (?P<post_l>post|rev|r)
            [-_\.]?
            (?P<post_new>[0-9]+)?
        )
    )?
    (?P<dev_field>
        [-_\.]?
        (?P<dev_l>dev)
        [-_\.]?
        (?P<dev>[0-9]+)?
    )?
)
(?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?
(?P<trailing_dot_star>\.\*)?
";

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?xi)^(?:\s*){VERSION_RE_INNER}(?:\s*)$")).unwrap());

/// An error that occurs when parsing a [`Version`] string fails.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Version `{0}` doesn't match PEP 440 rules")]
    NoMatch(String),
    #[error("Couldn't parse `{value}` as a number in version `{version}`")]
    InvalidNumber { version: String, value: String },
    #[error("A star (`*`) must not be used in a fixed version `{0}`")]
    UnexpectedStar(String),
    #[error("A trailing `.*` can't be combined with a {segment} segment in `{version}`")]
    StarWithSuffix {
        version: String,
        segment: &'static str,
    },
}

/// Optional prerelease modifier (alpha, beta or release candidate) appended to version
///
/// <https://peps.python.org/pep-0440/#pre-releases>
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy, Ord, PartialOrd)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "a" | "alpha" => Some(Self::Alpha),
            "b" | "beta" => Some(Self::Beta),
            "c" | "rc" | "pre" | "preview" => Some(Self::Rc),
            _ => None,
        }
    }
}

impl Display for PreRelease {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => write!(f, "a"),
            Self::Beta => write!(f, "b"),
            Self::Rc => write!(f, "rc"),
        }
    }
}

/// A part of the [local version identifier](<https://peps.python.org/pep-0440/#local-version-identifiers>)
///
/// Numeric segments compare as integers and always sort above alphanumeric segments, which
/// compare case-insensitively. With that `Ord`, the derived ordering of `Vec<LocalSegment>`
/// matches the PEP 440 rules.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum LocalSegment {
    String(String),
    Number(u64),
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(string) => write!(f, "{string}"),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(n1), Self::Number(n2)) => n1.cmp(n2),
            (Self::String(s1), Self::String(s2)) => s1.cmp(s2),
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

/// A version number such as `1.2.3` or `4!5.6.7-a8.post9.dev0`.
///
/// Beware that the sorting implemented with [Ord] and [Eq] is not consistent with the operators
/// from PEP 440: `>` on two versions is not the same as a `VersionSpecifier` with `>`.
#[derive(Debug, Clone)]
pub struct Version {
    /// The [versioning epoch](https://peps.python.org/pep-0440/#version-epochs), normally 0.
    pub epoch: u64,
    /// The [final release](https://peps.python.org/pep-0440/#final-releases) segment, such as
    /// `1.2.3` in `4!1.2.3-a8.post9.dev1`.
    pub release: Vec<u64>,
    /// The [prerelease](https://peps.python.org/pep-0440/#pre-releases) kind and number.
    pub pre: Option<(PreRelease, u64)>,
    /// The [post release](https://peps.python.org/pep-0440/#post-releases) number.
    pub post: Option<u64>,
    /// The [developmental release](https://peps.python.org/pep-0440/#developmental-releases) number.
    pub dev: Option<u64>,
    /// A [local version identifier](https://peps.python.org/pep-0440/#local-version-identifiers)
    /// such as `+deadbeef` in `1.2.3+deadbeef`.
    pub local: Option<Vec<LocalSegment>>,
}

impl Version {
    /// Constructor for a version that is just a release such as `3.8`
    pub fn from_release(release: Vec<u64>) -> Self {
        Self {
            epoch: 0,
            release,
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }

    /// For specifier matching, local labels are ignored unless the specifier has one.
    pub(crate) fn without_local(&self) -> Self {
        Self {
            local: None,
            ..self.clone()
        }
    }

    /// Whether this is an alpha/beta/rc or dev version
    pub fn any_prerelease(&self) -> bool {
        self.is_pre() || self.is_dev()
    }

    pub fn is_pre(&self) -> bool {
        self.pre.is_some()
    }

    pub fn is_dev(&self) -> bool {
        self.dev.is_some()
    }

    pub fn is_post(&self) -> bool {
        self.post.is_some()
    }

    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }

    /// Like [`Self::from_str`], but also allows the version to end with `.*`, returning whether
    /// it did.
    ///  * `1.2.3` -> false
    ///  * `1.2.3.*` -> true
    ///  * `1.0.dev1.*` -> err
    pub fn from_str_star(version: &str) -> Result<(Self, bool), VersionParseError> {
        let captures = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionParseError::NoMatch(version.to_string()))?;
        Self::parse_impl(version, &captures)
    }

    fn parse_impl(input: &str, captures: &Captures) -> Result<(Self, bool), VersionParseError> {
        let number_field = |field_name| -> Result<Option<u64>, VersionParseError> {
            captures
                .name(field_name)
                .map(|field| {
                    field
                        .as_str()
                        .parse::<u64>()
                        .map_err(|_| VersionParseError::InvalidNumber {
                            version: input.to_string(),
                            value: field.as_str().to_string(),
                        })
                })
                .transpose()
        };

        let epoch = number_field("epoch")?.unwrap_or_default();
        let pre = captures
            .name("pre_name")
            .and_then(|name| PreRelease::from_label(name.as_str()))
            .map(|kind| Ok::<_, VersionParseError>((kind, number_field("pre")?.unwrap_or_default())))
            .transpose()?;
        // `1.0.post` is `1.0.post0`, matching `packaging`.
        let post = if captures.name("post_field").is_some() {
            Some(
                number_field("post_new")?
                    .or(number_field("post_old")?)
                    .unwrap_or_default(),
            )
        } else {
            None
        };
        let dev = if captures.name("dev_field").is_some() {
            Some(number_field("dev")?.unwrap_or_default())
        } else {
            None
        };
        let local = captures.name("local").map(|local| {
            local
                .as_str()
                .split(['-', '_', '.'])
                .map(|segment| match segment.parse::<u64>() {
                    Ok(number) => LocalSegment::Number(number),
                    Err(_) => LocalSegment::String(segment.to_ascii_lowercase()),
                })
                .collect()
        });
        let release = captures
            .name("release")
            .map(|release| release.as_str())
            .unwrap_or_default()
            .split('.')
            .map(|segment| {
                segment
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::InvalidNumber {
                        version: input.to_string(),
                        value: segment.to_string(),
                    })
            })
            .collect::<Result<Vec<u64>, _>>()?;

        let star = captures.name("trailing_dot_star").is_some();
        if star {
            let segment = if pre.is_some() {
                Some("prerelease")
            } else if post.is_some() {
                Some("post")
            } else if dev.is_some() {
                Some("dev")
            } else if local.is_some() {
                Some("local")
            } else {
                None
            };
            if let Some(segment) = segment {
                return Err(VersionParseError::StarWithSuffix {
                    version: input.to_string(),
                    segment,
                });
            }
        }

        Ok((
            Self {
                epoch,
                release,
                pre,
                post,
                dev,
                local,
            },
            star,
        ))
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses a version such as `1.19`, `1.0a1`,`1.0+abc.5` or `1!2012.2`
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let (parsed, star) = Self::from_str_star(version)?;
        if star {
            return Err(VersionParseError::UnexpectedStar(version.to_string()));
        }
        Ok(parsed)
    }
}

/// Shows the normalized version
impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let mut release = self.release.iter();
        if let Some(first) = release.next() {
            write!(f, "{first}")?;
        }
        for segment in release {
            write!(f, ".{segment}")?;
        }
        if let Some((kind, number)) = &self.pre {
            write!(f, "{kind}{number}")?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if let Some(local) = &self.local {
            let mut segments = local.iter();
            if let Some(first) = segments.next() {
                write!(f, "+{first}")?;
            }
            for segment in segments {
                write!(f, ".{segment}")?;
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Compare the release parts of two versions, e.g. `4.3.1` > `4.2`, `1.1.0` == `1.1` and
/// `1.16` < `1.19`
pub(crate) fn compare_release(this: &[u64], other: &[u64]) -> Ordering {
    // The shorter release segment is padded out with zeros.
    let len = max(this.len(), other.len());
    this.iter()
        .chain(iter::repeat(&0))
        .zip(other.iter().chain(iter::repeat(&0)))
        .take(len)
        .map(|(this, other)| this.cmp(other))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Compare the parts attached after the release, given equal releases.
///
/// The order is `.devN, aN, bN, rcN, <no suffix (final)>, .postN`, with dev and post releases
/// allowed on prereleases too. Any post number beats none; for dev, no number beats any.
fn sortable_tuple(version: &Version) -> (u64, u64, Option<u64>, u64, Option<&[LocalSegment]>) {
    let local = version.local.as_deref();
    match (&version.pre, &version.post, &version.dev) {
        (None, None, Some(n)) => (0, 0, None, *n, local),
        (Some((kind, n)), post, dev) => {
            let stage = match kind {
                PreRelease::Alpha => 1,
                PreRelease::Beta => 2,
                PreRelease::Rc => 3,
            };
            (stage, *n, *post, dev.unwrap_or(u64::MAX), local)
        }
        (None, None, None) => (4, 0, None, 0, local),
        (None, Some(post), dev) => (5, 0, Some(*post), dev.unwrap_or(u64::MAX), local),
    }
}

impl PartialEq<Self> for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    /// Ignores trailing zeros, since `PartialEq` pads with zeros.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        for segment in self.release.iter().rev().skip_while(|x| **x == 0) {
            segment.hash(state);
        }
        self.pre.hash(state);
        self.dev.hash(state);
        self.post.hash(state);
        self.local.hash(state);
    }
}

impl PartialOrd<Self> for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// 1.0.dev456 < 1.0a1 < 1.0a2.dev456 < 1.0a12.dev456 < 1.0a12 < 1.0b1.dev456 < 1.0b2
    /// < 1.0b2.post345.dev456 < 1.0b2.post345 < 1.0c1.dev456 < 1.0c1 < 1.0rc2 < 1.0
    /// < 1.0.post456.dev34 < 1.0.post456
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| sortable_tuple(self).cmp(&sortable_tuple(other)))
    }
}
