use std::fmt::{Display, Formatter};

use url::Url;

/// The URL a page's relative links are resolved against: the page itself, or its `<base>`.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct BaseUrl(Url);

impl BaseUrl {
    /// Parse the given URL. If it's relative, join it to the current [`BaseUrl`]. Allows for
    /// parsing URLs that may be absolute or relative, with a known base URL.
    pub fn join_relative(&self, url: &str) -> Result<Url, url::ParseError> {
        match Url::parse(url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self.0.join(url),
            Err(err) => Err(err),
        }
    }

    /// Return the underlying [`Url`].
    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl From<Url> for BaseUrl {
    fn from(url: Url) -> Self {
        Self(url)
    }
}

impl Display for BaseUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
