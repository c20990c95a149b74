//! API records and per-version routes.
//!
//! v2 returns bare JSON bodies. v3 wraps single resources in an envelope
//! object named after the resource (`{"test_run": {...}}`).

use crate::config::ApiVersion;
use crate::errors::CoreError;
use crate::jobs::{TestStatus, ValidationStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Records
// =============================================================================

/// A test run as reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub started: Option<String>,
    #[serde(default)]
    pub ended: Option<String>,
}

impl Test {
    /// Status text from the API, or the local one when the API sent none.
    pub fn status_text(&self) -> &str {
        match self.status_text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => self.status.as_str(),
        }
    }
}

/// A user scenario validation as reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub id: i64,
    #[serde(default)]
    pub user_scenario_id: Option<i64>,
    #[serde(default)]
    pub status: ValidationStatus,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default, alias = "queued")]
    pub created: Option<String>,
    #[serde(default)]
    pub started: Option<String>,
    #[serde(default)]
    pub ended: Option<String>,
}

// =============================================================================
// Routes
// =============================================================================

/// Resource paths for one API version, relative to the base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Routes(pub ApiVersion);

impl Routes {
    pub fn test(&self, id: i64) -> String {
        match self.0 {
            ApiVersion::V2 => format!("tests/{}", id),
            ApiVersion::V3 => format!("test-runs/{}", id),
        }
    }

    pub fn test_results(&self, id: i64) -> String {
        format!("{}/results", self.test(id))
    }

    pub fn test_abort(&self, id: i64) -> String {
        format!("{}/abort", self.test(id))
    }

    pub fn start(&self, config_id: i64) -> String {
        match self.0 {
            ApiVersion::V2 => format!("test-configs/{}/start", config_id),
            ApiVersion::V3 => format!("tests/{}/start", config_id),
        }
    }

    pub fn validations(&self) -> &'static str {
        match self.0 {
            ApiVersion::V2 => "user-scenario-validations",
            ApiVersion::V3 => "validations",
        }
    }

    pub fn validation(&self, id: i64) -> String {
        format!("{}/{}", self.validations(), id)
    }

    pub fn validation_results(&self, id: i64) -> String {
        format!("{}/results", self.validation(id))
    }
}

/// Envelope name of a test run in v3 responses.
pub(crate) const TEST_RUN_ENVELOPE: &str = "test_run";

/// Envelope name of a validation in v3 responses.
pub(crate) const VALIDATION_ENVELOPE: &str = "user_scenario_validation";

/// Envelope name of a result batch list in v3 responses.
pub(crate) const TEST_RUN_RESULTS_ENVELOPE: &str = "test_run_results";

/// Take a resource out of its v3 envelope. v2 bodies pass through.
pub(crate) fn unwrap_envelope(
    version: ApiVersion,
    body: Value,
    envelope: &str,
) -> Result<Value, CoreError> {
    match version {
        ApiVersion::V2 => Ok(body),
        ApiVersion::V3 => match body {
            Value::Object(mut map) => map.remove(envelope).ok_or_else(|| {
                CoreError::protocol(format!("response has no '{}' object", envelope))
            }),
            other => Err(CoreError::protocol(format!(
                "expected '{}' envelope, got {}",
                envelope,
                json_kind(&other)
            ))),
        },
    }
}

/// Decode a record, naming the resource in the error.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    value: Value,
    resource: &str,
) -> Result<T, CoreError> {
    serde_json::from_value(value)
        .map_err(|e| CoreError::protocol(format!("invalid {} record: {}", resource, e)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
