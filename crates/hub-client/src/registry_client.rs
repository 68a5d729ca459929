use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Response};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::RetryTransientMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use hub_distribution_filename::{DistFilename, SourceDistFilename, WheelFilename};
use hub_normalize::PackageName;
use hub_pep440::Version;
use hub_pypi_types::{BaseUrl, File, IndexUrl, IndexUrls, Metadata23, PypiJson, SimpleJson};

use crate::html::SimpleHtml;
use crate::{Error, ErrorKind};

/// The user agent sent with every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("hub/", env!("CARGO_PKG_VERSION"));

/// The `Accept` header for simple API requests: JSON preferred over HTML.
const SIMPLE_ACCEPT: &str = "application/vnd.pypi.simple.v1+json, application/vnd.pypi.simple.v1+html;q=0.2, text/html;q=0.01";

/// A builder for an [`RegistryClient`].
#[derive(Debug, Clone)]
pub struct RegistryClientBuilder {
    index_urls: IndexUrls,
    retries: u32,
    timeout: Duration,
    user_agent: String,
}

impl Default for RegistryClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClientBuilder {
    pub fn new() -> Self {
        Self {
            index_urls: IndexUrls::default(),
            retries: 3,
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    #[must_use]
    pub fn index_urls(mut self, index_urls: IndexUrls) -> Self {
        self.index_urls = index_urls;
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<RegistryClient, Error> {
        let client_raw: Client = ClientBuilder::new()
            .user_agent(self.user_agent)
            .pool_max_idle_per_host(20)
            .timeout(self.timeout)
            .build()
            .map_err(ErrorKind::ClientBuild)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(self.retries);
        let retry_strategy = RetryTransientMiddleware::new_with_policy(retry_policy);

        let client = reqwest_middleware::ClientBuilder::new(client_raw)
            .with(retry_strategy)
            .build();

        Ok(RegistryClient {
            index_urls: self.index_urls,
            client,
        })
    }
}

/// A client for fetching packages from a `PyPI`-compatible index.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    index_urls: IndexUrls,
    client: ClientWithMiddleware,
}

impl RegistryClient {
    /// The indexes this client queries by default.
    pub fn index_urls(&self) -> &IndexUrls {
        &self.index_urls
    }

    /// Fetch a package from the configured indexes.
    ///
    /// "simple" here refers to [PEP 503 – Simple Repository API](https://peps.python.org/pep-0503/)
    /// and [PEP 691 – JSON-based Simple API for Python Package Indexes](https://peps.python.org/pep-0691/).
    pub async fn simple(
        &self,
        package_name: &PackageName,
    ) -> Result<(IndexUrl, SimpleMetadata), Error> {
        self.simple_in(package_name, &self.index_urls).await
    }

    /// Fetch a package from the given indexes, querying them in order and returning the first
    /// index that knows the package.
    #[instrument(skip(self, index_urls), fields(package = %package_name))]
    pub async fn simple_in(
        &self,
        package_name: &PackageName,
        index_urls: &IndexUrls,
    ) -> Result<(IndexUrl, SimpleMetadata), Error> {
        for index in index_urls.indexes() {
            let url = index
                .simple_url(package_name.as_ref())
                .map_err(ErrorKind::from)?;
            trace!("Fetching metadata for {package_name} from {url}");

            match self.simple_single_index(package_name, &url).await {
                Ok(metadata) => return Ok((index.clone(), metadata)),
                Err(err) if err.is_http_not_found() => {
                    debug!("Package {package_name} not found at {url}");
                }
                Err(err) => return Err(err),
            }
        }

        Err(ErrorKind::PackageNotFound(package_name.to_string()).into())
    }

    async fn simple_single_index(
        &self,
        package_name: &PackageName,
        url: &Url,
    ) -> Result<SimpleMetadata, Error> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, SIMPLE_ACCEPT)
            .send()
            .await
            .map_err(|err| ErrorKind::ReqwestMiddlewareError(url.clone(), err))?
            .error_for_status()
            .map_err(|err| ErrorKind::ReqwestError(url.clone(), err))?;

        // Relative file URLs resolve against the final URL, after redirects.
        let url = response.url().clone();
        let media_type = MediaType::from_response(&response, &url)?;
        let text = response
            .text()
            .await
            .map_err(|err| ErrorKind::ReqwestError(url.clone(), err))?;

        let (base, files) = match media_type {
            MediaType::Json => {
                let data: SimpleJson = serde_json::from_str(&text)
                    .map_err(|err| Error::from_json_err(err, url.clone()))?;
                (BaseUrl::from(url), data.files)
            }
            MediaType::Html => {
                let SimpleHtml { base, files } = SimpleHtml::parse(&text, &url)
                    .map_err(|err| Error::from_html_err(err, url.clone()))?;
                (base, files)
            }
        };

        Ok(SimpleMetadata::from_files(files, package_name, &base))
    }

    /// Fetch the core metadata for a distribution file.
    ///
    /// The metadata is read from the first source that has it:
    /// 1. From a [PEP 658](https://peps.python.org/pep-0658/) `{url}.metadata` file.
    /// 2. From the `PyPI` JSON API, if the file came from `PyPI`.
    /// 3. For wheels, from a download of the wheel into `scratch_dir`.
    #[instrument(skip_all, fields(filename = %file.filename))]
    pub async fn metadata(
        &self,
        index: &IndexUrl,
        filename: &DistFilename,
        file: &File,
        scratch_dir: &Path,
    ) -> Result<Metadata23, Error> {
        let metadata = if file.has_core_metadata() {
            let mut url = Url::parse(&file.url).map_err(ErrorKind::from)?;
            url.set_fragment(None);
            let path = format!("{}.metadata", url.path());
            url.set_path(&path);
            trace!("Fetching PEP 658 metadata from {url}");
            let bytes = self.fetch_bytes(&url).await?;
            parse_metadata(&bytes, &file.filename, &url)?
        } else if let Some(url) = pypi_json_url(index, filename.name(), filename.version()) {
            trace!("Fetching metadata from the JSON API at {url}");
            let bytes = self.fetch_bytes(&url).await?;
            let data: PypiJson = serde_json::from_slice(&bytes)
                .map_err(|err| Error::from_json_err(err, url.clone()))?;
            Metadata23::try_from(data).map_err(|err| {
                ErrorKind::MetadataParseError(
                    file.filename.clone(),
                    url.to_string(),
                    Box::new(err),
                )
            })?
        } else if let DistFilename::WheelFilename(wheel) = filename {
            debug!("No static metadata for {wheel}; downloading wheel");
            let url = Url::parse(&file.url).map_err(ErrorKind::from)?;
            self.wheel_metadata_from_download(wheel, &url, scratch_dir)
                .await?
        } else {
            return Err(ErrorKind::MetadataUnavailable(file.filename.clone()).into());
        };

        if metadata.name != *filename.name() {
            return Err(ErrorKind::NameMismatch {
                metadata: metadata.name,
                given: filename.name().clone(),
            }
            .into());
        }

        Ok(metadata)
    }

    /// Download a wheel into the scratch directory and read its `METADATA`.
    async fn wheel_metadata_from_download(
        &self,
        filename: &WheelFilename,
        url: &Url,
        scratch_dir: &Path,
    ) -> Result<Metadata23, Error> {
        let temp_download = tempfile::tempfile_in(scratch_dir).map_err(ErrorKind::CacheWrite)?;
        let mut writer = tokio::fs::File::from_std(temp_download);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ErrorKind::ReqwestMiddlewareError(url.clone(), err))?
            .error_for_status()
            .map_err(|err| ErrorKind::ReqwestError(url.clone(), err))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| ErrorKind::ReqwestError(url.clone(), err))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(ErrorKind::CacheWrite)?;
        }
        writer.flush().await.map_err(ErrorKind::CacheWrite)?;
        let reader = writer.into_std().await;

        let filename = filename.clone();
        let source = url.to_string();
        tokio::task::spawn_blocking(move || {
            let contents = read_wheel_metadata(&filename, reader)?;
            parse_metadata(&contents, &filename.to_string(), &source)
        })
        .await
        .map_err(|err| ErrorKind::Io(std::io::Error::other(err)))?
    }

    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, Error> {
        let bytes = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ErrorKind::ReqwestMiddlewareError(url.clone(), err))?
            .error_for_status()
            .map_err(|err| ErrorKind::ReqwestError(url.clone(), err))?
            .bytes()
            .await
            .map_err(|err| ErrorKind::ReqwestError(url.clone(), err))?;
        Ok(bytes.to_vec())
    }
}

/// The `PyPI` JSON API URL for a release, `https://pypi.org/pypi/{name}/{version}/json`.
///
/// Only `PyPI` itself serves this API next to its simple index.
pub(crate) fn pypi_json_url(
    index: &IndexUrl,
    package_name: &PackageName,
    version: &Version,
) -> Option<Url> {
    if !index.is_pypi() {
        return None;
    }
    let mut url = (**index).clone();
    url.set_path(&format!("/pypi/{package_name}/{version}/json"));
    Some(url)
}

fn parse_metadata(
    contents: &[u8],
    filename: &str,
    source: impl ToString,
) -> Result<Metadata23, Error> {
    Metadata23::parse_metadata(contents).map_err(|err| {
        ErrorKind::MetadataParseError(filename.to_string(), source.to_string(), Box::new(err))
            .into()
    })
}

/// Read the top-level `*.dist-info/METADATA` file from a wheel archive.
fn read_wheel_metadata(
    filename: &WheelFilename,
    reader: std::fs::File,
) -> Result<Vec<u8>, Error> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|err| ErrorKind::Zip(filename.to_string(), err))?;

    let dist_info_prefix = filename.name.as_dist_info_name();
    let metadata_path = archive
        .file_names()
        .filter(|path| {
            path.split_once('/').is_some_and(|(dir, file)| {
                file == "METADATA"
                    && dir
                        .strip_suffix(".dist-info")
                        .and_then(|stem| stem.split_once('-'))
                        .is_some_and(|(name, _)| {
                            PackageName::from_str(name)
                                .is_ok_and(|name| name.as_dist_info_name() == dist_info_prefix)
                        })
            })
        })
        .map(ToString::to_string)
        .next()
        .ok_or_else(|| ErrorKind::MetadataNotFound(filename.to_string()))?;

    let mut contents = Vec::new();
    archive
        .by_name(&metadata_path)
        .map_err(|err| ErrorKind::Zip(filename.to_string(), err))?
        .read_to_end(&mut contents)
        .map_err(ErrorKind::Io)?;
    Ok(contents)
}

/// The format of a simple API response, from its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaType {
    Json,
    Html,
}

impl MediaType {
    fn from_response(response: &Response, url: &Url) -> Result<Self, Error> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .ok_or_else(|| ErrorKind::MissingContentType(url.clone()))?;
        let content_type = content_type
            .to_str()
            .map_err(|err| ErrorKind::InvalidContentTypeHeader(url.clone(), err))?;
        let media_type = content_type.split(';').next().unwrap_or(content_type).trim();
        match media_type {
            "application/vnd.pypi.simple.v1+json" | "application/json" => Ok(Self::Json),
            "application/vnd.pypi.simple.v1+html" | "text/html" => Ok(Self::Html),
            _ => Err(ErrorKind::UnsupportedMediaType(url.clone(), media_type.to_string()).into()),
        }
    }
}

/// The distributions of a single version, split by kind.
#[derive(Default, Debug, Clone)]
pub struct VersionFiles {
    pub wheels: Vec<(WheelFilename, File)>,
    pub source_dists: Vec<(SourceDistFilename, File)>,
}

impl VersionFiles {
    fn push(&mut self, filename: DistFilename, file: File) {
        match filename {
            DistFilename::WheelFilename(inner) => self.wheels.push((inner, file)),
            DistFilename::SourceDistFilename(inner) => self.source_dists.push((inner, file)),
        }
    }

    pub fn all(self) -> impl Iterator<Item = (DistFilename, File)> {
        self.wheels
            .into_iter()
            .map(|(filename, file)| (DistFilename::WheelFilename(filename), file))
            .chain(
                self.source_dists
                    .into_iter()
                    .map(|(filename, file)| (DistFilename::SourceDistFilename(filename), file)),
            )
    }
}

/// The files of a package on an index, grouped by version.
#[derive(Default, Debug, Clone)]
pub struct SimpleMetadata(BTreeMap<Version, VersionFiles>);

impl SimpleMetadata {
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Version, &VersionFiles)> {
        self.0.iter()
    }

    pub fn get(&self, version: &Version) -> Option<&VersionFiles> {
        self.0.get(version)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Group the files of a package by version and kind, resolving their URLs against `base`.
    ///
    /// Files with unparseable names, URLs or `Requires-Python` are skipped.
    pub fn from_files(files: Vec<File>, package_name: &PackageName, base: &BaseUrl) -> Self {
        let mut metadata = Self::default();

        for mut file in files {
            let Some(filename) = DistFilename::try_from_filename(&file.filename, package_name)
            else {
                trace!("Skipping file with unrecognized name: {}", file.filename);
                continue;
            };
            if let Some(Err(err)) = &file.requires_python {
                warn!("Skipping file with invalid `Requires-Python` {}: {err}", file.filename);
                continue;
            }
            match base.join_relative(&file.url) {
                Ok(url) => file.url = url.to_string(),
                Err(err) => {
                    warn!("Skipping file with invalid URL {}: {err}", file.url);
                    continue;
                }
            }

            match metadata.0.entry(filename.version().clone()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().push(filename, file);
                }
                Entry::Vacant(entry) => {
                    let mut files = VersionFiles::default();
                    files.push(filename, file);
                    entry.insert(files);
                }
            }
        }

        metadata
    }
}

impl FromIterator<(Version, VersionFiles)> for SimpleMetadata {
    fn from_iter<T: IntoIterator<Item = (Version, VersionFiles)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for SimpleMetadata {
    type Item = (Version, VersionFiles);
    type IntoIter = std::collections::btree_map::IntoIter<Version, VersionFiles>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
