//! Core error types for the Load Impact SDK.
//!
//! A single `CoreError` enum covers transport failures, non-2xx API
//! responses, response parse failures and local validation. HTTP responses
//! are classified by status code so callers can tell e.g. a rejected abort
//! (409) from an expired token (401).

use crate::http::HttpError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of an HTTP error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    Conflict,
    Gone,
    /// The API signals rate limiting with the non-standard 427 status.
    RateLimit,
    /// Any other 4xx.
    Client,
    /// Any 5xx.
    Server,
    /// Anything else outside 2xx.
    Other,
}

impl HttpErrorKind {
    /// Classify a status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => HttpErrorKind::BadRequest,
            401 => HttpErrorKind::Unauthorized,
            403 => HttpErrorKind::Forbidden,
            404 => HttpErrorKind::NotFound,
            405 => HttpErrorKind::MethodNotAllowed,
            409 => HttpErrorKind::Conflict,
            410 => HttpErrorKind::Gone,
            427 => HttpErrorKind::RateLimit,
            400..=499 => HttpErrorKind::Client,
            500..=599 => HttpErrorKind::Server,
            _ => HttpErrorKind::Other,
        }
    }
}

/// HTTP error details for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorInfo {
    /// HTTP status code (e.g., 404, 500)
    pub status: u16,
    /// Request URL
    pub url: String,
    /// Error message
    pub message: String,
    /// First 200 chars of response body (for debugging)
    pub body_snippet: Option<String>,
}

impl HttpErrorInfo {
    pub fn kind(&self) -> HttpErrorKind {
        HttpErrorKind::from_status(self.status)
    }
}

impl std::fmt::Display for HttpErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {} for {}: {}", self.status, self.url, self.message)?;
        if let Some(ref snippet) = self.body_snippet {
            let truncated: String = snippet.chars().take(200).collect();
            write!(f, " | body[0:200]={}", truncated)?;
        }
        Ok(())
    }
}

/// Unified error enum for all Load Impact core errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid input provided
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// URL parsing failed
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// HTTP request failed (network layer)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP response error (4xx/5xx)
    #[error("{0}")]
    HttpResponse(HttpErrorInfo),

    /// No API token could be resolved
    #[error(
        "an API token must be given explicitly, in the config file, or via the LOADIMPACT_API_TOKEN environment variable"
    )]
    MissingApiToken,

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Timeout error
    #[error("timeout: {0}")]
    Timeout(String),

    /// Response could not be parsed into the expected shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Create an HTTP response error.
    pub fn http_response(status: u16, url: &str, message: &str, body: Option<&str>) -> Self {
        CoreError::HttpResponse(HttpErrorInfo {
            status,
            url: url.to_string(),
            message: message.to_string(),
            body_snippet: body.map(|s| s.chars().take(200).collect()),
        })
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        CoreError::InvalidInput(message.into())
    }

    /// Create a protocol (response parse) error.
    pub fn protocol(message: impl Into<String>) -> Self {
        CoreError::Protocol(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        CoreError::Timeout(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        CoreError::Config(message.into())
    }

    /// True for failures of the call itself rather than of its content:
    /// network errors, non-2xx responses and timeouts.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CoreError::Http(_) | CoreError::HttpResponse(_) | CoreError::Timeout(_)
        )
    }

    /// Get HTTP status code if this is an HTTP error.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            CoreError::HttpResponse(info) => Some(info.status),
            CoreError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Get the HTTP error classification if this is an HTTP error.
    pub fn http_kind(&self) -> Option<HttpErrorKind> {
        self.http_status().map(HttpErrorKind::from_status)
    }
}

impl From<HttpError> for CoreError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request(e) if e.is_timeout() => CoreError::Timeout(e.to_string()),
            HttpError::Request(e) => CoreError::Http(e),
            HttpError::Response(detail) => CoreError::HttpResponse(HttpErrorInfo {
                status: detail.status,
                url: detail.url,
                message: detail.message,
                body_snippet: detail.body_snippet,
            }),
            HttpError::InvalidUrl(msg) => CoreError::InvalidInput(msg),
            HttpError::JsonParse(msg) => CoreError::Protocol(msg),
        }
    }
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = CoreError::http_response(404, "https://api.example.com/tests/1", "not found", None);
        let msg = format!("{}", err);
        assert!(msg.contains("404"));
        assert!(msg.contains("api.example.com"));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(HttpErrorKind::from_status(409), HttpErrorKind::Conflict);
        assert_eq!(HttpErrorKind::from_status(427), HttpErrorKind::RateLimit);
        assert_eq!(HttpErrorKind::from_status(418), HttpErrorKind::Client);
        assert_eq!(HttpErrorKind::from_status(503), HttpErrorKind::Server);
        assert_eq!(HttpErrorKind::from_status(302), HttpErrorKind::Other);
    }

    #[test]
    fn test_transport_vs_protocol() {
        assert!(CoreError::http_response(502, "u", "bad gateway", None).is_transport());
        assert!(CoreError::timeout("slow").is_transport());
        assert!(!CoreError::protocol("not an object").is_transport());
        assert!(!CoreError::invalid_input("x").is_transport());
    }

    #[test]
    fn test_http_kind() {
        let err = CoreError::http_response(409, "https://api.example.com", "conflict", None);
        assert_eq!(err.http_status(), Some(409));
        assert_eq!(err.http_kind(), Some(HttpErrorKind::Conflict));
        assert_eq!(CoreError::MissingApiToken.http_kind(), None);
    }
}
