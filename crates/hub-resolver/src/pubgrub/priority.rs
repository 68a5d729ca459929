use std::cmp::Reverse;

use crate::pubgrub::PubGrubPackage;

/// The order in which the solver decides packages, highest first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum PubGrubPriority {
    /// Fewer remaining candidates first, so conflicts surface early. Ties go by name.
    Candidates(Reverse<usize>, Reverse<PubGrubPackage>),
    /// A direct reference has exactly one candidate.
    DirectUrl(Reverse<PubGrubPackage>),
    /// Nothing is known about the package yet.
    Unlisted(Reverse<PubGrubPackage>),
    Root,
}
