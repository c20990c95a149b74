//! Load Impact core library.
//!
//! This crate provides the core functionality for the Load Impact SDK:
//! - API client, test run and scenario validation handles
//! - API token resolution and configuration handling
//! - HTTP client utilities
//! - Result streaming: offset tracking, settling detection and grace polls
//! - Validation log streaming

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod http;
pub mod jobs;
pub mod polling;
pub mod results;

// Re-export core types at crate root for convenience
pub use errors::{CoreError, CoreResult, HttpErrorInfo, HttpErrorKind};
pub use jobs::{TestStatus, ValidationStatus};

pub use config::{ApiVersion, ClientConfig, StreamDefaults};
pub use http::HttpClient;

// Re-export API types for convenience
pub use api::{LoadImpactClient, ScenarioValidation, Test, TestRun, Validation};

// Re-export result streaming types
pub use results::{
    BufferedHandler, ChangeHandler, ChangeSet, DataPoint, JsonHandler,
    LastSeen, LoadZone, LogEntry, MetricId, ResultQuery, ResultSource, ResultStream,
    StandardMetric, StreamOptions, StreamState, ValidationLogStream,
};
