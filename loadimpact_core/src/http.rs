//! HTTP client for Load Impact API calls.
//!
//! This module provides an async HTTP client with API-token (HTTP basic)
//! authentication, SDK identification headers, and status-code aware error
//! handling.

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Max idle connections kept per host.
pub const DEFAULT_POOL_SIZE: usize = 20;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Header identifying the SDK to the API, next to `User-Agent`.
const AGENT_HEADER: &str = "X-Load-Impact-Agent";

/// HTTP error details.
#[derive(Debug, Clone)]
pub struct HttpErrorDetail {
    pub status: u16,
    pub url: String,
    pub message: String,
    pub body_snippet: Option<String>,
}

impl std::fmt::Display for HttpErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {} for {}: {}", self.status, self.url, self.message)?;
        if let Some(ref snippet) = self.body_snippet {
            let truncated: String = snippet.chars().take(200).collect();
            write!(f, " | body[0:200]={}", truncated)?;
        }
        Ok(())
    }
}

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0} (is_connect={}, is_timeout={})", .0.is_connect(), .0.is_timeout())]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Response(HttpErrorDetail),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("json parse error: {0}")]
    JsonParse(String),
}

impl HttpError {
    /// Create an HTTP error from a response.
    pub fn from_response(status: u16, url: &str, body: Option<&str>) -> Self {
        let body_snippet = body.map(|s| s.chars().take(1024).collect());
        HttpError::Response(HttpErrorDetail {
            status,
            url: url.to_string(),
            message: "request_failed".to_string(),
            body_snippet,
        })
    }

    /// Get the HTTP status code, if available.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Response(detail) => Some(detail.status),
            HttpError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Async HTTP client for the Load Impact API.
///
/// Every request carries the API token as the HTTP basic-auth user name
/// with an empty password.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::new("https://api.loadimpact.com/v2/", "token", 30)?;
/// let test: Value = client.get("tests/42", None).await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpClient {
    /// Create a new HTTP client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL for the API, including the version segment
    /// * `api_token` - Load Impact API token
    /// * `timeout_secs` - Request timeout in seconds
    pub fn new(base_url: &str, api_token: &str, timeout_secs: u64) -> Result<Self, HttpError> {
        Self::with_user_agent(base_url, api_token, timeout_secs, &default_user_agent())
    }

    /// Create a new HTTP client with a custom user agent.
    pub fn with_user_agent(
        base_url: &str,
        api_token: &str,
        timeout_secs: u64,
        user_agent: &str,
    ) -> Result<Self, HttpError> {
        if base_url.trim().is_empty() {
            return Err(HttpError::InvalidUrl("empty base url".to_string()));
        }

        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(user_agent)
            .map_err(|_| HttpError::InvalidUrl("invalid user agent characters".to_string()))?;
        headers.insert(USER_AGENT, agent.clone());
        headers.insert(AGENT_HEADER, agent);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(DEFAULT_POOL_SIZE)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(HttpError::Request)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert a relative path to an absolute URL.
    fn abs_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.api_token, Some(""))
    }

    /// Make a GET request.
    ///
    /// # Arguments
    ///
    /// * `path` - API path (relative or absolute)
    /// * `params` - Optional query parameters
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&[(&str, &str)]>,
    ) -> Result<T, HttpError> {
        let url = self.abs_url(path);
        let mut req = self.request(Method::GET, &url);
        if let Some(p) = params {
            req = req.query(p);
        }
        let (status, body) = self.send(req, &url).await?;
        parse_json(status, &url, &body)
    }

    /// Make a GET request returning raw JSON Value.
    pub async fn get_json(
        &self,
        path: &str,
        params: Option<&[(&str, &str)]>,
    ) -> Result<Value, HttpError> {
        self.get(path, params).await
    }

    /// Make a POST request with JSON body.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, HttpError> {
        let url = self.abs_url(path);
        let req = self.request(Method::POST, &url).json(body);
        let (status, bytes) = self.send(req, &url).await?;
        parse_json(status, &url, &bytes)
    }

    /// Make a body-less POST request, ignoring any response body on success.
    pub async fn post_empty(&self, path: &str) -> Result<(), HttpError> {
        let url = self.abs_url(path);
        let req = self.request(Method::POST, &url);
        let (status, bytes) = self.send(req, &url).await?;
        check_status(status, &url, &bytes)
    }

    async fn send(&self, req: RequestBuilder, url: &str) -> Result<(u16, Vec<u8>), HttpError> {
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        debug!(url = %url, status, "load impact api response");
        let body = resp.bytes().await?;
        Ok((status, body.to_vec()))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// `LoadImpactRustSDK/<version>`.
pub fn default_user_agent() -> String {
    format!("LoadImpactRustSDK/{}", env!("CARGO_PKG_VERSION"))
}

fn check_status(status: u16, url: &str, body: &[u8]) -> Result<(), HttpError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    let text = String::from_utf8_lossy(body);
    Err(HttpError::from_response(
        status,
        url,
        if text.trim().is_empty() { None } else { Some(&text) },
    ))
}

fn parse_json<T: DeserializeOwned>(status: u16, url: &str, body: &[u8]) -> Result<T, HttpError> {
    check_status(status, url, body)?;
    serde_json::from_slice(body).map_err(|e| {
        let text = String::from_utf8_lossy(body);
        let head: String = text.chars().take(100).collect();
        HttpError::JsonParse(format!("{}: {}", e, head))
    })
}
