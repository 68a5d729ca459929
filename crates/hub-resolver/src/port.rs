use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use hub_client::{DEFAULT_USER_AGENT, RegistryClientBuilder};

use crate::error::ResolveError;
use crate::options::ResolutionOptions;
use crate::reporter::Reporter;
use crate::resolver::{DEFAULT_MAX_ROUNDS, DependencyResolver};
use crate::result::ResolutionResult;
use crate::source::ArtifactSource;

/// Resolves requirement strings for one target.
///
/// Never fails: every outcome, including network and parse errors, is a [`ResolutionResult`].
pub trait ResolverPort: Send + Sync {
    fn resolve<'io>(
        &'io self,
        requirements: &'io [String],
        options: &'io ResolutionOptions,
    ) -> impl Future<Output = ResolutionResult> + Send + 'io;
}

impl<S: ArtifactSource> ResolverPort for DependencyResolver<S> {
    async fn resolve<'io>(
        &'io self,
        requirements: &'io [String],
        options: &'io ResolutionOptions,
    ) -> ResolutionResult {
        let result = self.try_resolve(requirements, options).await;
        if let Err(err @ (ResolveError::Client(_) | ResolveError::Scratch(_))) = &result {
            warn!("Failed to resolve for {options}: {err}");
        }
        ResolutionResult::from(result)
    }
}

impl<T: ResolverPort> ResolverPort for Arc<T> {
    fn resolve<'io>(
        &'io self,
        requirements: &'io [String],
        options: &'io ResolutionOptions,
    ) -> impl Future<Output = ResolutionResult> + Send + 'io {
        (**self).resolve(requirements, options)
    }
}

/// A [`ResolverPort`] that talks to the indexes named by each target's options.
///
/// Builds one [`hub_client::RegistryClient`] per resolution, with the target's index URLs,
/// timeout and retries.
#[derive(Clone)]
pub struct RegistryResolver {
    user_agent: String,
    reporter: Option<Arc<dyn Reporter>>,
    max_rounds: usize,
}

impl Default for RegistryResolver {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            reporter: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl RegistryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..self
        }
    }

    #[must_use]
    pub fn with_reporter(self, reporter: impl Reporter + 'static) -> Self {
        Self {
            reporter: Some(Arc::new(reporter)),
            ..self
        }
    }

    #[must_use]
    pub fn with_max_rounds(self, max_rounds: usize) -> Self {
        Self { max_rounds, ..self }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl ResolverPort for RegistryResolver {
    async fn resolve<'io>(
        &'io self,
        requirements: &'io [String],
        options: &'io ResolutionOptions,
    ) -> ResolutionResult {
        let client = match RegistryClientBuilder::new()
            .index_urls(options.index_urls())
            .retries(options.retries)
            .timeout(options.timeout)
            .user_agent(self.user_agent.clone())
            .build()
        {
            Ok(client) => client,
            Err(err) => return ResolutionResult::from(ResolveError::from(err)),
        };
        DependencyResolver::new(client)
            .with_shared_reporter(self.reporter.clone())
            .with_max_rounds(self.max_rounds)
            .resolve(requirements, options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::time::Duration;

    use hub_pypi_types::IndexUrl;

    use crate::options::ResolutionOptions;

    use super::{RegistryResolver, ResolverPort};

    #[test]
    fn user_agent() {
        assert!(RegistryResolver::new().user_agent().starts_with("hub/"));
        let resolver = RegistryResolver::new().with_user_agent("hub-tests/1.0");
        assert_eq!(resolver.user_agent(), "hub-tests/1.0");
    }

    #[tokio::test]
    async fn unreachable_index_is_unknown_error() {
        // Nothing listens on the discard port.
        let options = ResolutionOptions {
            index_url: IndexUrl::from_str("http://127.0.0.1:9/simple").unwrap(),
            retries: 0,
            timeout: Duration::from_secs(5),
            ..ResolutionOptions::default()
        };
        let result = RegistryResolver::new()
            .resolve(&["flask".to_string()], &options)
            .await;
        assert!(result.is_unknown_error(), "{result:?}");
    }
}
