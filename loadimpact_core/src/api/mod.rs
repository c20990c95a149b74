//! Load Impact API client.
//!
//! # Example
//!
//! ```ignore
//! use loadimpact_core::api::LoadImpactClient;
//! use loadimpact_core::results::{ChangeHandler, JsonHandler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LoadImpactClient::from_env()?;
//!
//!     // Start a test and stream its default metrics until it settles
//!     let run = client.tests().start_from_config(1234).await?;
//!     let mut stream = run.result_stream(Vec::new());
//!
//!     let printer: Arc<dyn ChangeHandler> = Arc::new(JsonHandler::stdout());
//!     stream.iterate().drive(&[printer]).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod test_runs;
pub mod types;
pub mod validations;

pub use client::LoadImpactClient;
pub use test_runs::{TestRun, TestsClient};
pub use types::{Test, Validation};
pub use validations::{ScenarioValidation, ValidationsClient};
