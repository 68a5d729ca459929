use pubgrub::Range;

use hub_pep440::{Operator, Version, VersionSpecifier, VersionSpecifiers};

use crate::error::ResolveError;

/// A range of versions that can be used to satisfy a requirement.
#[derive(Debug)]
pub(crate) struct PubGrubSpecifier(Range<Version>);

impl PubGrubSpecifier {
    /// The intersection of every specifier in the set. An empty set allows any version.
    pub(crate) fn from_specifiers(specifiers: &VersionSpecifiers) -> Result<Self, ResolveError> {
        specifiers
            .iter()
            .map(Self::try_from)
            .try_fold(Range::full(), |range, specifier| {
                Ok(range.intersection(&specifier?.0))
            })
            .map(Self)
    }
}

impl From<PubGrubSpecifier> for Range<Version> {
    /// Convert a `PubGrub` specifier to a range of versions.
    fn from(specifier: PubGrubSpecifier) -> Self {
        specifier.0
    }
}

impl TryFrom<&VersionSpecifier> for PubGrubSpecifier {
    type Error = ResolveError;

    /// Convert a PEP 440 specifier to a `PubGrub`-compatible version range.
    fn try_from(specifier: &VersionSpecifier) -> Result<Self, ResolveError> {
        let version = specifier.version().clone();
        let ranges = match specifier.operator() {
            Operator::Equal | Operator::ExactEqual => Range::singleton(version),
            Operator::NotEqual => Range::singleton(version).complement(),
            Operator::TildeEqual => {
                let [rest @ .., last, _] = version.release.as_slice() else {
                    return Err(ResolveError::InvalidTildeEquals(specifier.clone()));
                };
                let upper = Version {
                    epoch: version.epoch,
                    dev: Some(0),
                    ..Version::from_release(rest.iter().copied().chain([last + 1]).collect())
                };
                Range::from_range_bounds(version..upper)
            }
            Operator::LessThan => Range::strictly_lower_than(version),
            Operator::LessThanEqual => Range::lower_than(version),
            Operator::GreaterThan => Range::strictly_higher_than(version),
            Operator::GreaterThanEqual => Range::higher_than(version),
            Operator::EqualStar => star_range(version),
            Operator::NotEqualStar => star_range(version).complement(),
        };

        Ok(Self(ranges))
    }
}

/// The versions matched by `== version.*`.
fn star_range(version: Version) -> Range<Version> {
    let low = Version {
        dev: Some(0),
        ..version
    };
    let mut high = low.clone();
    if let Some(post) = high.post {
        high.post = Some(post + 1);
    } else if let Some((kind, number)) = high.pre {
        high.pre = Some((kind, number + 1));
    } else if let Some(last) = high.release.last_mut() {
        *last += 1;
    }
    Range::from_range_bounds(low..high)
}
