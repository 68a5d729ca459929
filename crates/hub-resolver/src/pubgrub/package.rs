use std::fmt::{Display, Formatter};

use hub_normalize::{ExtraName, PackageName};

/// A PubGrub-compatible wrapper around a python package.
///
/// [`PubGrubPackage::Root`] stands for the requirements being resolved. Each extra is a virtual
/// package (e.g. `black[colorama]`) that depends on the same version of the real package and
/// on the requirements the extra enables. Virtual packages are dropped from the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum PubGrubPackage {
    Root,
    Package(PackageName),
    Extra(PackageName, ExtraName),
}

impl PubGrubPackage {
    /// The python package behind this node, if any.
    pub(crate) fn name(&self) -> Option<&PackageName> {
        match self {
            Self::Root => None,
            Self::Package(name) | Self::Extra(name, _) => Some(name),
        }
    }
}

impl Display for PubGrubPackage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Package(name) => write!(f, "{name}"),
            Self::Extra(name, extra) => write!(f, "{name}[{extra}]"),
        }
    }
}
