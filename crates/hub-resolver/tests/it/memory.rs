//! An in-memory package index.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use url::Url;

use hub_client::{ErrorKind, SimpleMetadata};
use hub_distribution_filename::DistFilename;
use hub_normalize::PackageName;
use hub_pep440::Version;
use hub_pep508::Requirement;
use hub_pypi_types::{BaseUrl, File, IndexUrl, IndexUrls, Metadata23, Yanked};
use hub_resolver::ArtifactSource;

#[derive(Default)]
pub(crate) struct MemorySource {
    files: BTreeMap<PackageName, Vec<File>>,
    /// Keyed by filename; files without an entry have no metadata.
    metadata: BTreeMap<String, Metadata23>,
    failing: BTreeSet<PackageName>,
    simple_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
    scratch_dirs: Mutex<Vec<PathBuf>>,
}

impl MemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a wheel, e.g. `wheel("foo", "1.0", "py3-none-any", &["bar>=1"])`.
    #[must_use]
    pub(crate) fn wheel(self, name: &str, version: &str, tag: &str, requires: &[&str]) -> Self {
        let filename = format!("{}-{version}-{tag}.whl", name.replace('-', "_"));
        self.file(name, version, filename, requires, false)
    }

    #[must_use]
    pub(crate) fn sdist(self, name: &str, version: &str, requires: &[&str]) -> Self {
        let filename = format!("{name}-{version}.tar.gz");
        self.file(name, version, filename, requires, false)
    }

    /// Add a source distribution whose metadata can't be read without building it.
    #[must_use]
    pub(crate) fn opaque_sdist(mut self, name: &str, version: &str) -> Self {
        let filename = format!("{name}-{version}.tar.gz");
        self.files
            .entry(PackageName::from_str(name).unwrap())
            .or_default()
            .push(file(&filename, false));
        self
    }

    #[must_use]
    pub(crate) fn yanked_wheel(self, name: &str, version: &str, requires: &[&str]) -> Self {
        let filename = format!("{name}-{version}-py3-none-any.whl");
        self.file(name, version, filename, requires, true)
    }

    /// Set `Requires-Python` in the metadata of every file of a release.
    #[must_use]
    pub(crate) fn requires_python(mut self, name: &str, version: &str, specifiers: &str) -> Self {
        let name = PackageName::from_str(name).unwrap();
        let version = Version::from_str(version).unwrap();
        for metadata in self.metadata.values_mut() {
            if metadata.name == name && metadata.version == version {
                metadata.requires_python = Some(specifiers.parse().unwrap());
            }
        }
        self
    }

    /// Fail every listing of `name` as if the network was down.
    #[must_use]
    pub(crate) fn failing(mut self, name: &str) -> Self {
        self.failing.insert(PackageName::from_str(name).unwrap());
        self
    }

    fn file(
        mut self,
        name: &str,
        version: &str,
        filename: String,
        requires: &[&str],
        yanked: bool,
    ) -> Self {
        let package_name = PackageName::from_str(name).unwrap();
        self.metadata.insert(
            filename.clone(),
            Metadata23 {
                metadata_version: "2.1".to_string(),
                name: package_name.clone(),
                version: Version::from_str(version).unwrap(),
                requires_dist: requires
                    .iter()
                    .map(|requirement| Requirement::from_str(requirement).unwrap())
                    .collect(),
                requires_python: None,
                provides_extras: Vec::new(),
            },
        );
        self.files
            .entry(package_name)
            .or_default()
            .push(file(&filename, yanked));
        self
    }

    pub(crate) fn simple_calls(&self) -> usize {
        self.simple_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn scratch_dirs(&self) -> Vec<PathBuf> {
        self.scratch_dirs.lock().unwrap().clone()
    }
}

fn file(filename: &str, yanked: bool) -> File {
    File {
        core_metadata: None,
        dist_info_metadata: None,
        data_dist_info_metadata: None,
        filename: filename.to_string(),
        hashes: Default::default(),
        requires_python: None,
        size: None,
        upload_time: None,
        url: filename.to_string(),
        yanked: yanked.then(|| Yanked::Reason("broken release".to_string())),
    }
}

impl ArtifactSource for MemorySource {
    async fn simple<'io>(
        &'io self,
        package_name: &'io PackageName,
        index_urls: &'io IndexUrls,
    ) -> Result<(IndexUrl, SimpleMetadata), hub_client::Error> {
        self.simple_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(package_name) {
            return Err(ErrorKind::Io(std::io::Error::other("connection reset by peer")).into());
        }
        let Some(files) = self.files.get(package_name) else {
            return Err(ErrorKind::PackageNotFound(package_name.to_string()).into());
        };
        let index = index_urls
            .indexes()
            .next()
            .cloned()
            .unwrap_or(IndexUrl::Pypi);
        let base = BaseUrl::from(
            Url::parse(&format!("https://memory.invalid/simple/{package_name}/")).unwrap(),
        );
        Ok((
            index,
            SimpleMetadata::from_files(files.clone(), package_name, &base),
        ))
    }

    async fn metadata<'io>(
        &'io self,
        _index: &'io IndexUrl,
        _filename: &'io DistFilename,
        file: &'io File,
        scratch_dir: &'io Path,
    ) -> Result<Metadata23, hub_client::Error> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        assert!(scratch_dir.is_dir());
        self.scratch_dirs
            .lock()
            .unwrap()
            .push(scratch_dir.to_path_buf());
        self.metadata
            .get(&file.filename)
            .cloned()
            .ok_or_else(|| ErrorKind::MetadataUnavailable(file.filename.clone()).into())
    }
}
