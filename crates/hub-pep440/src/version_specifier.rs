use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::version::compare_release;
use crate::{Version, VersionParseError};

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`
#[derive(Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `===` (discouraged)
    ///
    /// <https://peps.python.org/pep-0440/#arbitrary-equality>
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~=`
    TildeEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
}

impl Operator {
    /// The star variant of this operator, if it has one.
    fn to_star(self) -> Option<Self> {
        match self {
            Self::Equal => Some(Self::EqualStar),
            Self::NotEqual => Some(Self::NotEqualStar),
            _ => None,
        }
    }

    /// Whether a local version may be used with this operator.
    fn is_local_compatible(self) -> bool {
        !matches!(
            self,
            Self::GreaterThan
                | Self::GreaterThanEqual
                | Self::LessThan
                | Self::LessThanEqual
                | Self::TildeEqual
                | Self::EqualStar
                | Self::NotEqualStar
        )
    }
}

impl FromStr for Operator {
    type Err = ParseErrorKind;

    /// Star versions are handled by the caller; this only knows the base operator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operator = match s {
            "==" => Self::Equal,
            "===" => {
                tracing::warn!("Using arbitrary equality (`===`) is discouraged");
                Self::ExactEqual
            }
            "!=" => Self::NotEqual,
            "~=" => Self::TildeEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            other => return Err(ParseErrorKind::InvalidOperator(other.to_string())),
        };
        Ok(operator)
    }
}

impl Display for Operator {
    /// Note the `EqualStar` is also `==`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let operator = match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        };
        write!(f, "{operator}")
    }
}

/// An error that occurs when parsing a single version specifier such as `>=1.19`.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("Failed to parse version specifier `{specifier}`: {kind}")]
pub struct VersionSpecifierParseError {
    specifier: String,
    kind: ParseErrorKind,
}

impl VersionSpecifierParseError {
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("Missing comparison operator")]
    MissingOperator,
    #[error("No such comparison operator `{0}`, must be one of ~= == != <= >= < > ===")]
    InvalidOperator(String),
    #[error("Missing version")]
    MissingVersion,
    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),
    #[error("Operator {0} must not be used with a star version")]
    OperatorWithStar(Operator),
    #[error("Operator {0} is incompatible with local versions")]
    OperatorLocalCombo(Operator),
    #[error("The ~= operator requires at least two segments in the release version")]
    CompatibleRelease,
    #[error("Trailing `{0}` is not allowed")]
    InvalidTrailing(String),
}

/// A version range such as `>1.2.3`, `<=4!5.6.7-a8.post9.dev0` or `== 4.1.*`.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
}

impl VersionSpecifier {
    /// Create a new version specifier from an operator and a version, validating that the
    /// operator is allowed with that version. `star` marks a trailing `.*`.
    pub fn new(operator: Operator, version: Version, star: bool) -> Result<Self, ParseErrorKind> {
        let operator = if star {
            operator
                .to_star()
                .ok_or(ParseErrorKind::OperatorWithStar(operator))?
        } else {
            operator
        };

        if version.is_local() && !operator.is_local_compatible() {
            return Err(ParseErrorKind::OperatorLocalCombo(operator));
        }

        if operator == Operator::TildeEqual && version.release.len() < 2 {
            return Err(ParseErrorKind::CompatibleRelease);
        }

        Ok(Self { operator, version })
    }

    /// `==<version>`
    pub fn equals_version(version: Version) -> Self {
        Self {
            operator: Operator::Equal,
            version,
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether the specifier's version is a prerelease, which opts the range into prereleases.
    pub fn any_prerelease(&self) -> bool {
        self.version.any_prerelease()
    }

    /// Whether the given version satisfies the specifier.
    ///
    /// For example, `>=1.19` contains `1.21`, but not `1.18`.
    ///
    /// See:
    /// - <https://peps.python.org/pep-0440/#version-specifiers>
    /// - <https://github.com/pypa/packaging/blob/e184feef1a28a5c574ec41f5c263a3a573861f5a/packaging/specifiers.py#L362-L496>
    pub fn contains(&self, version: &Version) -> bool {
        // Local version labels are ignored unless the specifier carries one.
        let this = &self.version;
        let other = if this.is_local() {
            version.clone()
        } else {
            version.without_local()
        };

        match self.operator {
            Operator::Equal => other == *this,
            Operator::EqualStar => {
                this.epoch == other.epoch
                    && this
                        .release
                        .iter()
                        .zip(other.release.iter().chain(std::iter::repeat(&0)))
                        .all(|(this, other)| this == other)
            }
            Operator::ExactEqual => this.to_string() == version.to_string(),
            Operator::NotEqual => other != *this,
            Operator::NotEqualStar => {
                this.epoch != other.epoch
                    || !this
                        .release
                        .iter()
                        .zip(other.release.iter().chain(std::iter::repeat(&0)))
                        .all(|(this, other)| this == other)
            }
            Operator::TildeEqual => {
                // `~= V.N` is `>= V.N, == V.*`; the constructor guarantees two segments.
                if this.epoch != other.epoch {
                    return false;
                }
                let prefix = &this.release[..this.release.len() - 1];
                if !prefix
                    .iter()
                    .zip(other.release.iter().chain(std::iter::repeat(&0)))
                    .all(|(this, other)| this == other)
                {
                    return false;
                }
                other >= *this
            }
            Operator::GreaterThan => Self::greater_than(this, &other),
            Operator::GreaterThanEqual => Self::greater_than(this, &other) || other >= *this,
            Operator::LessThan => {
                Self::less_than(this, &other)
                    && !(compare_release(&this.release, &other.release) == Ordering::Equal
                        && other.any_prerelease())
            }
            Operator::LessThanEqual => Self::less_than(this, &other) || other <= *this,
        }
    }

    fn less_than(this: &Version, other: &Version) -> bool {
        if other.epoch < this.epoch {
            return true;
        }

        // `<3.1` must not match `3.1.dev0` unless the specifier is itself a prerelease.
        if !this.any_prerelease()
            && other.is_pre()
            && compare_release(&this.release, &other.release) == Ordering::Equal
        {
            return false;
        }

        other < this
    }

    fn greater_than(this: &Version, other: &Version) -> bool {
        if other.epoch > this.epoch {
            return true;
        }

        if compare_release(&this.release, &other.release) == Ordering::Equal {
            // `>3.1` must not match `3.1.post0` unless the specifier is itself a post release.
            if !this.is_post() && other.is_post() {
                return false;
            }
            if other.is_local() {
                return false;
            }
        }

        other > this
    }
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    /// Parses a specifier such as `>= 1.19`, `== 1.1.*`,`~=1.0+abc.5` or `<=1!2012.2`
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let error = |kind| VersionSpecifierParseError {
            specifier: spec.to_string(),
            kind,
        };

        let mut s = unscanny::Scanner::new(spec);
        s.eat_whitespace();
        let operator = s.eat_while(['=', '!', '~', '<', '>']);
        if operator.is_empty() {
            return Err(error(ParseErrorKind::MissingOperator));
        }
        let operator = Operator::from_str(operator).map_err(error)?;
        s.eat_whitespace();
        let version = s.eat_while(|c: char| !c.is_whitespace());
        if version.is_empty() {
            return Err(error(ParseErrorKind::MissingVersion));
        }
        let (version, star) =
            Version::from_str_star(version).map_err(|err| error(ParseErrorKind::from(err)))?;
        let specifier = Self::new(operator, version, star).map_err(error)?;
        s.eat_whitespace();
        if !s.done() {
            return Err(error(ParseErrorKind::InvalidTrailing(s.after().to_string())));
        }
        Ok(specifier)
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if matches!(self.operator, Operator::EqualStar | Operator::NotEqualStar) {
            return write!(f, "{}{}.*", self.operator, self.version);
        }
        write!(f, "{}{}", self.operator, self.version)
    }
}

/// A thin wrapper around `Vec<VersionSpecifier>` with a comma-separated [`Display`], as in
/// `>= 1.2.3, < 2.0`.
///
/// An empty set of specifiers contains every version.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl std::ops::Deref for VersionSpecifiers {
    type Target = [VersionSpecifier];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl VersionSpecifiers {
    /// Whether all specifiers match the given version.
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|specifier| specifier.contains(version))
    }

    /// Whether any of the specifiers names a prerelease version.
    pub fn any_prerelease(&self) -> bool {
        self.0.iter().any(VersionSpecifier::any_prerelease)
    }

    /// Whether this is an exact `==` pin, which also admits yanked files (PEP 592).
    pub fn is_exact_pin(&self) -> bool {
        self.0
            .iter()
            .any(|specifier| matches!(specifier.operator, Operator::Equal | Operator::ExactEqual))
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<T: IntoIterator<Item = VersionSpecifier>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<VersionSpecifier> for VersionSpecifiers {
    fn from(specifier: VersionSpecifier) -> Self {
        Self(vec![specifier])
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        s.split(',')
            .map(VersionSpecifier::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Display for VersionSpecifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, specifier) in self.0.iter().enumerate() {
            if idx == 0 {
                write!(f, "{specifier}")?;
            } else {
                write!(f, ", {specifier}")?;
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for VersionSpecifiers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for VersionSpecifiers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
