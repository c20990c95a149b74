//! API token resolution.
//!
//! Tokens come from an explicit argument, the `LOADIMPACT_API_TOKEN`
//! environment variable, or the `api_token` key of
//! `~/.loadimpact/config.toml`, in that order. The last two are folded into
//! `ClientConfig` when it is loaded.

use crate::config::ClientConfig;
use crate::errors::CoreError;
use std::env;
use std::path::PathBuf;

/// Default config directory name
pub const CONFIG_DIR: &str = ".loadimpact";

/// Default config file name
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable holding the API token
pub const ENV_API_TOKEN: &str = "LOADIMPACT_API_TOKEN";

/// Environment variable overriding the config file location
pub const ENV_CONFIG_PATH: &str = "LOADIMPACT_CONFIG";

/// Get the default config directory path (~/.loadimpact).
pub fn get_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

/// Get the config file path: `LOADIMPACT_CONFIG` if set, else
/// `~/.loadimpact/config.toml`.
pub fn get_config_path() -> PathBuf {
    env::var(ENV_CONFIG_PATH)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| get_config_dir().join(CONFIG_FILE))
}

/// Resolve the token to authenticate with.
///
/// An explicit, non-blank token wins; otherwise the one already resolved into
/// `config` (file or environment) is used.
pub fn resolve_api_token(explicit: Option<&str>, config: &ClientConfig) -> Result<String, CoreError> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }
    config
        .api_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(CoreError::MissingApiToken)
}

/// Mask a token for display (shows the first 4 chars + "...").
pub fn mask_token(token: &str) -> String {
    let count = token.chars().count();
    if count <= 8 {
        "*".repeat(count)
    } else {
        let head: String = token.chars().take(4).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("short"), "*****");
        assert_eq!(mask_token("0123456789abcdef"), "0123...");
        assert_eq!(mask_token(""), "");
    }

    #[test]
    fn test_resolve_prefers_explicit() {
        let config = ClientConfig::default().with_api_token("from-config");
        assert_eq!(
            resolve_api_token(Some("explicit"), &config).unwrap(),
            "explicit"
        );
        assert_eq!(resolve_api_token(Some("  "), &config).unwrap(), "from-config");
        assert_eq!(resolve_api_token(None, &config).unwrap(), "from-config");
    }

    #[test]
    fn test_resolve_missing_token() {
        let config = ClientConfig::default();
        assert!(matches!(
            resolve_api_token(None, &config),
            Err(CoreError::MissingApiToken)
        ));
    }
}
