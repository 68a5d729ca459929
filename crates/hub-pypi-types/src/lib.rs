pub use base_url::BaseUrl;
pub use index_url::{IndexUrl, IndexUrls};
pub use lenient_requirement::{LenientRequirement, LenientVersionSpecifiers};
pub use metadata::{Metadata23, MetadataError};
pub use pypi_json::{PypiInfo, PypiJson};
pub use simple_json::{CoreMetadata, File, Hashes, SimpleJson, Yanked};

mod base_url;
mod index_url;
mod lenient_requirement;
mod metadata;
mod pypi_json;
mod simple_json;
