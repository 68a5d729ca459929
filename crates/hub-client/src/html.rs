use std::str::FromStr;

use tl::HTMLTag;
use tracing::{debug, instrument};
use url::Url;

use hub_pep440::VersionSpecifiers;
use hub_pypi_types::{BaseUrl, CoreMetadata, File, Hashes, LenientVersionSpecifiers, Yanked};

/// A parsed structure from PyPI "HTML" index format for a single package.
#[derive(Debug, Clone)]
pub(crate) struct SimpleHtml {
    /// The [`BaseUrl`] to which all relative URLs should be resolved.
    pub(crate) base: BaseUrl,
    /// The list of [`File`]s available for download sorted by filename.
    pub(crate) files: Vec<File>,
}

impl SimpleHtml {
    /// Parse the list of [`File`]s from the simple HTML page returned by the given URL.
    #[instrument(skip_all, fields(url = % url))]
    pub(crate) fn parse(text: &str, url: &Url) -> Result<Self, Error> {
        let dom = tl::parse(text, tl::ParserOptions::default())?;

        // A `<base>` tag must appear before any tag with a URL attribute to take effect.
        let base = BaseUrl::from(
            dom.nodes()
                .iter()
                .filter_map(|node| node.as_tag())
                .take_while(|tag| !matches!(tag.name().as_bytes(), b"a" | b"link"))
                .find(|tag| tag.name().as_bytes() == b"base")
                .map(|base| Self::parse_base(base))
                .transpose()?
                .flatten()
                .unwrap_or_else(|| url.clone()),
        );

        let mut files: Vec<File> = dom
            .nodes()
            .iter()
            .filter_map(|node| node.as_tag())
            .filter(|link| link.name().as_bytes() == b"a")
            .map(|link| Self::parse_anchor(link))
            .filter_map(Result::transpose)
            .collect::<Result<Vec<_>, _>>()?;
        files.sort_unstable_by(|f1, f2| f1.filename.cmp(&f2.filename));

        Ok(Self { base, files })
    }

    /// Parse the `href` from a `<base>` tag.
    fn parse_base(base: &HTMLTag) -> Result<Option<Url>, Error> {
        let Some(Some(href)) = base.attributes().get("href") else {
            return Ok(None);
        };
        let href = std::str::from_utf8(href.as_bytes())?;
        let url = Url::parse(href).map_err(|err| Error::UrlParse(href.to_string(), err))?;
        Ok(Some(url))
    }

    /// Parse a [`File`] from an `<a>` tag.
    ///
    /// Returns `None` if the `<a>` doesn't have an `href` attribute.
    fn parse_anchor(link: &HTMLTag) -> Result<Option<File>, Error> {
        let Some(href) = link
            .attributes()
            .get("href")
            .flatten()
            .filter(|bytes| !bytes.as_bytes().is_empty())
        else {
            return Ok(None);
        };
        let href = std::str::from_utf8(href.as_bytes())?;

        // The hash, if any, lives in the fragment.
        let decoded = html_escape::decode_html_entities(href);
        let (path, hashes) = match decoded.split_once('#') {
            Some((path, fragment)) => {
                let fragment = percent_encoding::percent_decode_str(fragment).decode_utf8()?;
                (path, parse_hash_fragment(&fragment))
            }
            None => (decoded.as_ref(), Hashes::default()),
        };

        // The filename is the last path component of the URL, without the query string.
        let filename = path
            .split('/')
            .next_back()
            .filter(|filename| !filename.is_empty())
            .ok_or_else(|| Error::MissingFilename(href.to_string()))?;
        let filename = filename.split('?').next().unwrap_or(filename);
        let filename = percent_encoding::percent_decode_str(filename)
            .decode_utf8()
            .map_err(|_| Error::UnsupportedFilename(filename.to_string()))?;

        let requires_python = get_attribute(link, "data-requires-python")?
            .filter(|requires_python| !requires_python.trim().is_empty())
            .map(|requires_python| {
                LenientVersionSpecifiers::from_str(&requires_python).map(VersionSpecifiers::from)
            });

        // PEP 714 renamed `data-dist-info-metadata` to `data-core-metadata`.
        let core_metadata = match get_attribute(link, "data-core-metadata")? {
            Some(value) => Some(value),
            None => get_attribute(link, "data-dist-info-metadata")?,
        }
        .map(|value| match value.as_str() {
            "false" => CoreMetadata::Bool(false),
            "true" => CoreMetadata::Bool(true),
            fragment => CoreMetadata::Hashes(parse_hash_fragment(fragment)),
        });

        // An empty `data-yanked` still marks the file as yanked.
        let yanked = get_attribute(link, "data-yanked")?.map(Yanked::Reason);

        // Not standardized for the HTML API, so parse failures are discarded.
        let size = get_attribute(link, "data-size")?.and_then(|size| size.parse().ok());

        Ok(Some(File {
            core_metadata,
            dist_info_metadata: None,
            data_dist_info_metadata: None,
            filename: filename.to_string(),
            hashes,
            requires_python,
            size,
            upload_time: None,
            url: path.to_string(),
            yanked,
        }))
    }
}

/// Read and unescape an attribute of an HTML tag.
fn get_attribute(link: &HTMLTag, name: &str) -> Result<Option<String>, Error> {
    let Some(value) = link.attributes().get(name).flatten() else {
        return Ok(None);
    };
    let value = std::str::from_utf8(value.as_bytes())?;
    Ok(Some(html_escape::decode_html_entities(value).into_owned()))
}

/// Parse a `<algorithm>=<digest>` fragment. Only SHA-256 is retained.
fn parse_hash_fragment(fragment: &str) -> Hashes {
    match fragment.split_once('=') {
        Some(("sha256", digest)) if !digest.is_empty() => Hashes {
            sha256: Some(digest.to_string()),
        },
        _ => {
            debug!("Ignoring hash fragment: `{fragment}`");
            Hashes::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Failed to parse URL: {0}")]
    UrlParse(String, #[source] url::ParseError),

    #[error(transparent)]
    HtmlParse(#[from] tl::ParseError),

    #[error("Expected distribution filename as last path component of URL: {0}")]
    MissingFilename(String),

    #[error("Expected distribution filename to be UTF-8: {0}")]
    UnsupportedFilename(String),
}
