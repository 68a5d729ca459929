pub(crate) use crate::pubgrub::package::PubGrubPackage;
pub(crate) use crate::pubgrub::priority::PubGrubPriority;
pub(crate) use crate::pubgrub::report::NoSolutionReport;
pub(crate) use crate::pubgrub::specifier::PubGrubSpecifier;

mod package;
mod priority;
mod report;
mod specifier;
