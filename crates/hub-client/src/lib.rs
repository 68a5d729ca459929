pub use error::{Error, ErrorKind};
pub use registry_client::{
    DEFAULT_USER_AGENT, RegistryClient, RegistryClientBuilder, SimpleMetadata, VersionFiles,
};

mod error;
mod html;
mod registry_client;
