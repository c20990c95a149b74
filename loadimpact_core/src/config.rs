//! Client configuration.
//!
//! This module provides:
//! - `ClientConfig` (API version, base URL, token, timeout, user agent)
//! - `StreamDefaults` applied to result streams created by job handles
//! - TOML file parsing and deep merge onto defaults
//! - Environment overrides
//!
//! Sources, lowest to highest precedence: defaults, the TOML config file,
//! environment variables, then explicit `with_*` calls.

use crate::auth;
use crate::errors::CoreError;
use crate::http::default_user_agent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub const ENV_API_URL: &str = "LOADIMPACT_API_URL";
pub const ENV_API_VERSION: &str = "LOADIMPACT_API_VERSION";
pub const ENV_TIMEOUT_SECS: &str = "LOADIMPACT_TIMEOUT_SECS";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Load Impact REST API generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    /// Bare JSON bodies; results keyed by metric id.
    #[default]
    V2,
    /// Enveloped bodies; test runs under `test-runs/`.
    V3,
}

impl ApiVersion {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ApiVersion::V2 => "https://api.loadimpact.com/v2/",
            ApiVersion::V3 => "https://api.loadimpact.com/v3/",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V2 => "v2",
            ApiVersion::V3 => "v3",
        }
    }
}

impl FromStr for ApiVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "2" | "v2" => Ok(ApiVersion::V2),
            "3" | "v3" => Ok(ApiVersion::V3),
            other => Err(CoreError::config(format!("unknown API version: {}", other))),
        }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream settings used when a job handle builds a stream for you.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamDefaults {
    /// Delay between poll cycles in milliseconds
    pub poll_interval_ms: u64,
    /// Polls performed after the stream reaches its terminal, stable state
    pub grace_polls: u32,
    /// Surface transport failures instead of tolerating them
    pub propagate_errors: bool,
    /// Tolerated consecutive failures before giving up
    pub max_consecutive_errors: u32,
}

impl Default for StreamDefaults {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            grace_polls: 5,
            propagate_errors: true,
            max_consecutive_errors: 10,
        }
    }
}

/// Configuration for a Load Impact client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_version: ApiVersion,
    /// Overrides the per-version default URL when set.
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub stream: StreamDefaults,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_version: ApiVersion::default(),
            base_url: None,
            api_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: default_user_agent(),
            stream: StreamDefaults::default(),
        }
    }
}

impl ClientConfig {
    /// Load defaults, then the config file (if present), then the environment.
    pub fn load() -> Result<Self, CoreError> {
        let path = auth::get_config_path();
        let mut config = if path.exists() {
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file, filling missing keys with defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, CoreError> {
        let value = load_toml(path)?;
        Self::from_overrides(&value)
    }

    /// Parse a TOML config string, filling missing keys with defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        let value = parse_toml(content)?;
        Self::from_overrides(&value)
    }

    fn from_overrides(overrides: &Value) -> Result<Self, CoreError> {
        let mut base = serde_json::to_value(Self::default())
            .map_err(|e| CoreError::Config(format!("failed to serialize defaults: {}", e)))?;
        validate_overrides(&base, overrides, "")?;
        deep_merge(&mut base, overrides);
        serde_json::from_value(base)
            .map_err(|e| CoreError::Config(format!("invalid config: {}", e)))
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Blank values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get(auth::ENV_API_TOKEN) {
            self.api_token = Some(token);
        }
        if let Some(url) = get(ENV_API_URL) {
            self.base_url = Some(url);
        }
        if let Some(version) = get(ENV_API_VERSION) {
            self.api_version = version.parse()?;
        }
        if let Some(timeout) = get(ENV_TIMEOUT_SECS) {
            self.timeout_secs = timeout.trim().parse().map_err(|_| {
                CoreError::config(format!("{} must be an integer: {}", ENV_TIMEOUT_SECS, timeout))
            })?;
        }
        Ok(())
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_version(mut self, version: ApiVersion) -> Self {
        self.api_version = version;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_stream_defaults(mut self, stream: StreamDefaults) -> Self {
        self.stream = stream;
        self
    }

    /// The URL requests are made against.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.api_version.default_base_url())
            .to_string()
    }

    /// Check values that would only fail later at request time.
    pub fn validate(&self) -> Result<(), CoreError> {
        url::Url::parse(&self.resolved_base_url())?;
        if self.timeout_secs == 0 {
            return Err(CoreError::config("timeout_secs must be greater than zero"));
        }
        if self.stream.poll_interval_ms == 0 {
            return Err(CoreError::config("stream.poll_interval_ms must be greater than zero"));
        }
        Ok(())
    }
}

// =============================================================================
// TOML Parsing
// =============================================================================

/// Load a TOML file and convert to JSON Value.
pub fn load_toml(path: &Path) -> Result<Value, CoreError> {
    let content = fs::read_to_string(path)
        .map_err(|e| CoreError::Config(format!("failed to read TOML file: {}", e)))?;

    parse_toml(&content)
}

/// Parse a TOML string to JSON Value.
pub fn parse_toml(content: &str) -> Result<Value, CoreError> {
    let toml_value: toml::Value = toml::from_str(content)
        .map_err(|e| CoreError::Config(format!("failed to parse TOML: {}", e)))?;

    toml_to_json(toml_value)
}

fn toml_to_json(toml: toml::Value) -> Result<Value, CoreError> {
    match toml {
        toml::Value::String(s) => Ok(Value::String(s)),
        toml::Value::Integer(i) => Ok(Value::Number(i.into())),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| CoreError::Config("invalid float value".to_string())),
        toml::Value::Boolean(b) => Ok(Value::Bool(b)),
        toml::Value::Datetime(dt) => Ok(Value::String(dt.to_string())),
        toml::Value::Array(arr) => {
            let json_arr: Result<Vec<Value>, CoreError> = arr.into_iter().map(toml_to_json).collect();
            Ok(Value::Array(json_arr?))
        }
        toml::Value::Table(table) => {
            let mut map = serde_json::Map::new();
            for (k, v) in table {
                map.insert(k, toml_to_json(v)?);
            }
            Ok(Value::Object(map))
        }
    }
}

// =============================================================================
// Deep Merge
// =============================================================================

/// Deep merge two JSON values.
///
/// For objects, keys from `overrides` replace or add to `base`.
/// For other types, `overrides` completely replaces `base`.
pub fn deep_merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, override_val) in override_map {
                if let Some(base_val) = base_map.get_mut(key) {
                    deep_merge(base_val, override_val);
                } else {
                    base_map.insert(key.clone(), override_val.clone());
                }
            }
        }
        (base, overrides) => {
            *base = overrides.clone();
        }
    }
}

/// Reject override keys that do not exist in the base config.
///
/// Catches typos such as `timeout_sec` in a config file. Keys whose base
/// value is `null` (unset optionals) accept any override.
pub fn validate_overrides(base: &Value, overrides: &Value, path: &str) -> Result<(), CoreError> {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, override_val) in override_map {
                let key_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };

                match base_map.get(key) {
                    Some(base_val) => validate_overrides(base_val, override_val, &key_path)?,
                    None => {
                        return Err(CoreError::Config(format!(
                            "unknown config key: {}",
                            key_path
                        )))
                    }
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_version, ApiVersion::V2);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.resolved_base_url(), "https://api.loadimpact.com/v2/");
        assert_eq!(config.stream.grace_polls, 5);
        assert_eq!(config.stream.poll_interval_ms, 3000);
        assert!(config.stream.propagate_errors);
        assert!(config.user_agent.starts_with("LoadImpactRustSDK/"));
    }

    #[test]
    fn test_from_toml_merges_onto_defaults() {
        let toml = r#"
            api_version = "v3"
            api_token = "abc"

            [stream]
            grace_polls = 2
        "#;

        let config = ClientConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.api_version, ApiVersion::V3);
        assert_eq!(config.api_token.as_deref(), Some("abc"));
        assert_eq!(config.resolved_base_url(), "https://api.loadimpact.com/v3/");
        assert_eq!(config.stream.grace_polls, 2);
        assert_eq!(config.stream.poll_interval_ms, 3000);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ClientConfig::from_toml_str("timeout_sec = 5").unwrap_err();
        assert!(err.to_string().contains("timeout_sec"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = ClientConfig::from_toml_str("api_token = \"file\"").unwrap();
        let env: HashMap<&str, &str> = [
            ("LOADIMPACT_API_TOKEN", "env-token"),
            ("LOADIMPACT_API_VERSION", "3"),
            ("LOADIMPACT_TIMEOUT_SECS", "12"),
            ("LOADIMPACT_API_URL", "  "),
        ]
        .into_iter()
        .collect();

        config
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api_token.as_deref(), Some("env-token"));
        assert_eq!(config.api_version, ApiVersion::V3);
        assert_eq!(config.timeout_secs, 12);
        assert_eq!(config.base_url, None);
    }

    #[test]
    fn test_bad_env_timeout() {
        let mut config = ClientConfig::default();
        let result = config.apply_env_from(|k| {
            (k == ENV_TIMEOUT_SECS).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_builder_wins() {
        let config = ClientConfig::from_toml_str("base_url = \"https://file.example/v2/\"")
            .unwrap()
            .with_base_url("http://localhost:9000/")
            .with_timeout_secs(5);
        assert_eq!(config.resolved_base_url(), "http://localhost:9000/");
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn test_validate() {
        assert!(ClientConfig::default().validate().is_ok());
        assert!(ClientConfig::default().with_timeout_secs(0).validate().is_err());
        assert!(matches!(
            ClientConfig::default().with_base_url("not a url").validate(),
            Err(CoreError::UrlParse(_))
        ));
    }

    #[test]
    fn test_api_version_parse() {
        assert_eq!("V2".parse::<ApiVersion>().unwrap(), ApiVersion::V2);
        assert_eq!("3".parse::<ApiVersion>().unwrap(), ApiVersion::V3);
        assert!("4".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn test_deep_merge_objects() {
        let mut base = json!({"a": 1, "b": {"c": 2, "d": 3}});
        deep_merge(&mut base, &json!({"b": {"c": 99}, "e": 4}));

        assert_eq!(base["a"], 1);
        assert_eq!(base["b"]["c"], 99);
        assert_eq!(base["b"]["d"], 3);
        assert_eq!(base["e"], 4);
    }
}
