use std::future::Future;
use std::path::Path;

use hub_client::{RegistryClient, SimpleMetadata};
use hub_distribution_filename::DistFilename;
use hub_normalize::PackageName;
use hub_pypi_types::{File, IndexUrl, IndexUrls, Metadata23};

type SimpleResponse = Result<(IndexUrl, SimpleMetadata), hub_client::Error>;
type MetadataResponse = Result<Metadata23, hub_client::Error>;

/// Where the resolver reads package listings and distribution metadata from.
pub trait ArtifactSource: Send + Sync {
    /// The files of a package on the first of `index_urls` that knows it.
    fn simple<'io>(
        &'io self,
        package_name: &'io PackageName,
        index_urls: &'io IndexUrls,
    ) -> impl Future<Output = SimpleResponse> + Send + 'io;

    /// The core metadata of a distribution. Downloads, if any, go to `scratch_dir`.
    fn metadata<'io>(
        &'io self,
        index: &'io IndexUrl,
        filename: &'io DistFilename,
        file: &'io File,
        scratch_dir: &'io Path,
    ) -> impl Future<Output = MetadataResponse> + Send + 'io;
}

impl ArtifactSource for RegistryClient {
    async fn simple<'io>(
        &'io self,
        package_name: &'io PackageName,
        index_urls: &'io IndexUrls,
    ) -> SimpleResponse {
        self.simple_in(package_name, index_urls).await
    }

    async fn metadata<'io>(
        &'io self,
        index: &'io IndexUrl,
        filename: &'io DistFilename,
        file: &'io File,
        scratch_dir: &'io Path,
    ) -> MetadataResponse {
        RegistryClient::metadata(self, index, filename, file, scratch_dir).await
    }
}

impl<T: ArtifactSource> ArtifactSource for &T {
    fn simple<'io>(
        &'io self,
        package_name: &'io PackageName,
        index_urls: &'io IndexUrls,
    ) -> impl Future<Output = SimpleResponse> + Send + 'io {
        (**self).simple(package_name, index_urls)
    }

    fn metadata<'io>(
        &'io self,
        index: &'io IndexUrl,
        filename: &'io DistFilename,
        file: &'io File,
        scratch_dir: &'io Path,
    ) -> impl Future<Output = MetadataResponse> + Send + 'io {
        (**self).metadata(index, filename, file, scratch_dir)
    }
}
