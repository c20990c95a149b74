//! # Load Impact SDK
//!
//! Ergonomic Rust SDK for the Load Impact load-testing API.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loadimpact::{JsonHandler, ChangeHandler, LoadImpact};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), loadimpact::Error> {
//!     // Token from LOADIMPACT_API_TOKEN or ~/.loadimpact/config.toml
//!     let li = LoadImpact::from_env()?;
//!
//!     let run = li.start_test(1234).await?;
//!     let mut stream = run.result_stream(Vec::new());
//!
//!     let out: Arc<dyn ChangeHandler> = Arc::new(JsonHandler::stdout());
//!     stream.iterate().drive(&[out]).await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use loadimpact_core::auth;
use loadimpact_core::{ClientConfig, CoreError, LoadImpactClient};

// Re-export core for advanced usage
pub use loadimpact_core as core;

// Re-export commonly used core types
pub use loadimpact_core::{
    ApiVersion, BufferedHandler, ChangeHandler, ChangeSet, DataPoint,
    JsonHandler, LastSeen, LoadZone, LogEntry, MetricId, ResultSource, ResultStream,
    ScenarioValidation, StandardMetric, StreamDefaults, StreamOptions, StreamState, Test,
    TestRun, TestStatus, Validation, ValidationLogStream, ValidationStatus,
};

/// SDK version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Error Types
// =============================================================================

/// SDK error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing API token.
    #[error(
        "API token not found. Set {} or provide explicitly.",
        auth::ENV_API_TOKEN
    )]
    MissingApiToken,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Core error passthrough.
    #[error(transparent)]
    Core(CoreError),

    /// Timeout waiting for a job.
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

/// Token and configuration errors get their own variants; the rest pass through.
impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingApiToken => Error::MissingApiToken,
            CoreError::Config(msg) => Error::Config(msg),
            other => Error::Core(other),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Main Client
// =============================================================================

/// Main Load Impact client.
///
/// # Example
///
/// ```rust,ignore
/// use loadimpact::LoadImpact;
///
/// let li = LoadImpact::from_env()?;
///
/// // Or with an explicit token
/// let li = LoadImpact::new("0123abcd...", None)?;
/// ```
pub struct LoadImpact {
    client: LoadImpactClient,
}

impl LoadImpact {
    /// Create a client with an explicit token.
    ///
    /// # Arguments
    ///
    /// * `api_token` - Your Load Impact API token
    /// * `config` - Optional configuration; defaults are used when `None`
    pub fn new(api_token: impl Into<String>, config: Option<ClientConfig>) -> Result<Self> {
        let api_token = api_token.into();
        let config = config.unwrap_or_default();
        let client = LoadImpactClient::with_token(Some(&api_token), config)?;
        Ok(Self { client })
    }

    /// Create a client from `~/.loadimpact/config.toml` and the environment.
    pub fn from_env() -> Result<Self> {
        let config = ClientConfig::load()?;
        let client = LoadImpactClient::new(config)?;
        Ok(Self { client })
    }

    /// Get the API token (masked for display).
    pub fn api_token_masked(&self) -> String {
        auth::mask_token(self.client.config().api_token.as_deref().unwrap_or_default())
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    /// Access the underlying core client.
    pub fn client(&self) -> &LoadImpactClient {
        &self.client
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    /// Start a run of a test configuration.
    pub async fn start_test(&self, config_id: i64) -> Result<TestRun> {
        Ok(self.client.tests().start_from_config(config_id).await?)
    }

    /// Look up a test run.
    pub async fn test(&self, id: i64) -> Result<TestRun> {
        Ok(self.client.tests().get(id).await?)
    }

    /// Poll a run until it reaches a terminal status.
    ///
    /// Uses the configured stream poll interval between checks.
    pub async fn wait_for_test(&self, run: &TestRun, timeout: Duration) -> Result<Test> {
        let interval = Duration::from_millis(self.client.config().stream.poll_interval_ms);
        let start = Instant::now();
        loop {
            let test = run.sync().await?;
            if test.status.is_terminal() {
                return Ok(test);
            }
            if start.elapsed() >= timeout {
                return Err(Error::Timeout(timeout));
            }
            debug!(test_id = run.id(), status = %test.status, "waiting for test");
            tokio::time::sleep(interval).await;
        }
    }

    // -------------------------------------------------------------------------
    // Scenario validations
    // -------------------------------------------------------------------------

    /// Queue a validation of a user scenario.
    pub async fn validate_scenario(&self, user_scenario_id: i64) -> Result<ScenarioValidation> {
        Ok(self.client.validations().create(user_scenario_id).await?)
    }

    /// Look up a scenario validation.
    pub async fn validation(&self, id: i64) -> Result<ScenarioValidation> {
        Ok(self.client.validations().get(id).await?)
    }
}

impl std::fmt::Debug for LoadImpact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadImpact")
            .field("api_token", &self.api_token_masked())
            .field("base_url", &self.base_url())
            .finish()
    }
}
