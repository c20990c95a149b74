//! Main Load Impact API client.
//!
//! The `LoadImpactClient` is the entry point for talking to the API. It owns
//! the resolved configuration and the HTTP client; job handles created from
//! it hold a clone, so they outlive the borrow of the client.

use crate::auth;
use crate::config::{ApiVersion, ClientConfig};
use crate::http::HttpClient;
use crate::results::StreamOptions;
use crate::CoreError;

use super::test_runs::TestsClient;
use super::types::Routes;
use super::validations::ValidationsClient;

/// Load Impact API client.
///
/// # Example
///
/// ```ignore
/// use loadimpact_core::api::LoadImpactClient;
///
/// // Token from ~/.loadimpact/config.toml or LOADIMPACT_API_TOKEN
/// let client = LoadImpactClient::from_env()?;
///
/// let run = client.tests().start_from_config(1234).await?;
/// let mut stream = run.result_stream(Vec::new());
/// ```
#[derive(Clone)]
pub struct LoadImpactClient {
    pub(crate) http: HttpClient,
    pub(crate) config: ClientConfig,
}

impl LoadImpactClient {
    /// Create a client from a configuration.
    ///
    /// The token comes from `config.api_token`; fails with
    /// `CoreError::MissingApiToken` when there is none.
    pub fn new(config: ClientConfig) -> Result<Self, CoreError> {
        Self::with_token(None, config)
    }

    /// Create a client, preferring an explicit token over the configured one.
    pub fn with_token(api_token: Option<&str>, mut config: ClientConfig) -> Result<Self, CoreError> {
        let token = auth::resolve_api_token(api_token, &config)?;
        config.validate()?;

        let http = HttpClient::with_user_agent(
            &config.resolved_base_url(),
            &token,
            config.timeout_secs,
            &config.user_agent,
        )
        .map_err(|e| CoreError::Internal(format!("failed to create HTTP client: {}", e)))?;

        config.api_token = Some(token);
        Ok(Self { http, config })
    }

    /// Create a client from the config file and the environment.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::new(ClientConfig::load()?)
    }

    /// Get a reference to the HTTP client.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// The resolved configuration, including the token in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api_version(&self) -> ApiVersion {
        self.config.api_version
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Get a Tests API client.
    ///
    /// Use this to start test runs and look up existing ones.
    pub fn tests(&self) -> TestsClient<'_> {
        TestsClient::new(self)
    }

    /// Get a Validations API client.
    pub fn validations(&self) -> ValidationsClient<'_> {
        ValidationsClient::new(self)
    }

    pub(crate) fn routes(&self) -> Routes {
        Routes(self.config.api_version)
    }

    pub(crate) fn stream_options(&self) -> StreamOptions {
        StreamOptions::from(&self.config.stream)
    }
}

impl std::fmt::Debug for LoadImpactClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadImpactClient")
            .field("base_url", &self.http.base_url())
            .field("api_version", &self.config.api_version)
            .finish()
    }
}
