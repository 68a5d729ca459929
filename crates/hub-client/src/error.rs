use std::fmt::{Display, Formatter};

use url::Url;

use hub_distribution_filename::WheelFilenameError;
use hub_normalize::PackageName;
use hub_pypi_types::MetadataError;

use crate::html;

#[derive(Debug)]
pub struct Error {
    kind: Box<ErrorKind>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl Error {
    /// Convert this error into an [`ErrorKind`].
    pub fn into_kind(self) -> ErrorKind {
        *self.kind
    }

    /// Return the [`ErrorKind`] of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Create a new error from a JSON parsing error.
    pub(crate) fn from_json_err(err: serde_json::Error, url: Url) -> Self {
        ErrorKind::BadJson { source: err, url }.into()
    }

    /// Create a new error from an HTML parsing error.
    pub(crate) fn from_html_err(err: html::Error, url: Url) -> Self {
        ErrorKind::BadHtml { source: err, url }.into()
    }

    /// Returns `true` if no configured index knows the package.
    pub fn is_package_not_found(&self) -> bool {
        matches!(&*self.kind, ErrorKind::PackageNotFound(_))
    }

    /// Returns `true` if the metadata can't be read without building a source distribution.
    pub fn is_metadata_unavailable(&self) -> bool {
        matches!(&*self.kind, ErrorKind::MetadataUnavailable(_))
    }

    /// Returns `true` if the server answered with a `404 Not Found`.
    pub(crate) fn is_http_not_found(&self) -> bool {
        let status = match &*self.kind {
            ErrorKind::ReqwestError(_, err) => err.status(),
            ErrorKind::ReqwestMiddlewareError(_, reqwest_middleware::Error::Reqwest(err)) => {
                err.status()
            }
            _ => None,
        };
        status == Some(reqwest::StatusCode::NOT_FOUND)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    #[error("Failed to build the HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    /// The package was not found in any of the configured indexes.
    ///
    /// Make sure the package name is spelled correctly and that you've
    /// configured the right registry to fetch it from.
    #[error("Package `{0}` was not found in the registry")]
    PackageNotFound(String),

    /// Neither the index nor the file itself provide the core metadata.
    #[error("Metadata for `{0}` is not available without building it")]
    MetadataUnavailable(String),

    /// The metadata file could not be parsed.
    #[error("Couldn't parse metadata of {0} from {1}")]
    MetadataParseError(String, String, #[source] Box<MetadataError>),

    /// The metadata file was not found in the wheel.
    #[error("Metadata file `METADATA` was not found in {0}")]
    MetadataNotFound(String),

    #[error("Package metadata name `{metadata}` does not match given name `{given}`")]
    NameMismatch {
        given: PackageName,
        metadata: PackageName,
    },

    #[error(transparent)]
    WheelFilename(#[from] WheelFilenameError),

    #[error("Failed to fetch: `{0}`")]
    ReqwestError(Url, #[source] reqwest::Error),

    #[error("Failed to fetch: `{0}`")]
    ReqwestMiddlewareError(Url, #[source] reqwest_middleware::Error),

    #[error("Received some unexpected JSON from {url}")]
    BadJson { source: serde_json::Error, url: Url },

    #[error("Received some unexpected HTML from {url}")]
    BadHtml { source: html::Error, url: Url },

    #[error("Missing `Content-Type` header for {0}")]
    MissingContentType(Url),

    #[error("Invalid `Content-Type` header for {0}")]
    InvalidContentTypeHeader(Url, #[source] http::header::ToStrError),

    #[error("Unsupported `Content-Type` \"{1}\" for {0}. Expected JSON or HTML.")]
    UnsupportedMediaType(Url, String),

    #[error("Failed to unzip wheel: {0}")]
    Zip(String, #[source] zip::result::ZipError),

    #[error("Failed to write to the scratch directory")]
    CacheWrite(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
