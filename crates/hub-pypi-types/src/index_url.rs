use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use url::Url;

static PYPI_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse("https://pypi.org/simple").unwrap());

/// The url of an index, newtype'd to avoid mixing it with file urls.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Default)]
pub enum IndexUrl {
    #[default]
    Pypi,
    Url(Url),
}

impl IndexUrl {
    pub fn is_pypi(&self) -> bool {
        matches!(self, Self::Pypi)
    }

    /// The URL of the simple API page for a package, `{index}/{name}/`.
    pub fn simple_url(&self, package: &str) -> Result<Url, url::ParseError> {
        let mut base = self.deref().clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(&format!("{package}/"))
    }
}

impl FromStr for IndexUrl {
    type Err = url::ParseError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(Url::parse(url)?))
    }
}

impl From<Url> for IndexUrl {
    fn from(url: Url) -> Self {
        if url.as_str().trim_end_matches('/') == PYPI_URL.as_str() {
            Self::Pypi
        } else {
            Self::Url(url)
        }
    }
}

impl From<IndexUrl> for Url {
    fn from(index: IndexUrl) -> Self {
        match index {
            IndexUrl::Pypi => PYPI_URL.clone(),
            IndexUrl::Url(url) => url,
        }
    }
}

impl Deref for IndexUrl {
    type Target = Url;

    fn deref(&self) -> &Self::Target {
        match &self {
            Self::Pypi => &PYPI_URL,
            Self::Url(url) => url,
        }
    }
}

impl Display for IndexUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.deref(), f)
    }
}

impl Serialize for IndexUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IndexUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// The index URLs to use for fetching packages.
///
/// From a pip perspective, this type merges `--index-url` and `--extra-index-url`. The primary
/// index is queried first, then the extra indexes in order.
#[derive(Debug, Clone, Default, Hash, Eq, PartialEq)]
pub struct IndexUrls {
    index: IndexUrl,
    extra_index: Vec<IndexUrl>,
}

impl IndexUrls {
    pub fn new(index: IndexUrl, extra_index: Vec<IndexUrl>) -> Self {
        Self { index, extra_index }
    }

    pub fn indexes(&self) -> impl Iterator<Item = &IndexUrl> {
        std::iter::once(&self.index).chain(self.extra_index.iter())
    }
}
