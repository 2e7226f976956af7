//! HTTP client for the projectdesk API
//!
//! Request/response types, error classification, retry with exponential
//! backoff, and the reqwest-backed [`ApiClient`]. The stores never talk to
//! reqwest directly; they go through the [`HttpTransport`] trait so tests can
//! substitute a mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// =============================================================================
// Error Types
// =============================================================================

/// API error with HTTP status and message
///
/// Status `0` is reserved for failures that never produced an HTTP response
/// (connection refused, timeout, undecodable body).
///
/// # Examples
/// ```
/// use api_client::http::ApiError;
///
/// let error = ApiError::new(404, "NotFound", "Project not found");
/// assert_eq!(error.status(), 404);
/// assert!(!error.is_network_error());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code
    status: u16,
    /// Error code (e.g., "InvalidRequest", "NotFound")
    error: String,
    /// Human-readable error message
    message: String,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: u16, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: message.into(),
        }
    }

    /// Error for a request that never reached the server
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(0, "NetworkError", message)
    }

    /// Error for a response body that could not be decoded
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(0, "ParseError", message)
    }

    /// Get the HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the error code
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this is a transient, network-related failure worth retrying
    ///
    /// Parse errors share status `0` but are not transient.
    pub fn is_network_error(&self) -> bool {
        match self.status {
            0 => self.error != "ParseError",
            408 | 425 | 429 | 500 | 502 | 503 | 504 | 522 | 524 => true,
            _ => false,
        }
    }

    /// Check if the server rejected the credentials
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, 401 | 403)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API error {}: {} - {}", self.status, self.error, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Configuration errors raised while reading the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to a value that could not be parsed
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        /// Environment variable name
        key: String,
        /// The rejected value
        value: String,
    },
}

// =============================================================================
// Request Types
// =============================================================================

/// HTTP method for API requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
}

impl HttpMethod {
    /// Method name as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A request against the API, relative to the configured base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Path below the base URL (e.g., "/v1/projects")
    pub path: String,
    /// Query parameters
    pub params: HashMap<String, String>,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Request body (for POST/PUT)
    pub body: Option<Vec<u8>>,
    /// Encoding type (e.g., "application/json")
    pub encoding: Option<String>,
}

impl ApiRequest {
    fn with_method(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: HashMap::new(),
            headers: HashMap::new(),
            body: None,
            encoding: None,
        }
    }

    /// Create a new GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::with_method(HttpMethod::Get, path)
    }

    /// Create a new POST request
    pub fn post(path: impl Into<String>) -> Self {
        Self::with_method(HttpMethod::Post, path)
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the request body from JSON
    pub fn json_body<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        self.body = Some(body);
        self.encoding = Some("application/json".to_string());
        Ok(self)
    }

    /// Decode the body back into JSON, if there is one
    pub fn body_json(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// API response with status, headers and decoded body
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response data
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Create a new response
    pub fn new(status: u16, headers: HashMap<String, String>, data: T) -> Self {
        Self { status, headers, data }
    }

    /// Shorthand for a response without headers
    pub fn with_status(status: u16, data: T) -> Self {
        Self::new(status, HashMap::new(), data)
    }

    /// Get a header value
    pub fn header(&self, key: &str) -> Option<&String> {
        self.headers.get(key)
    }

    /// Check if the response is successful (2xx status)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Standard error body returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error code
    pub error: String,
    /// Error message
    pub message: String,
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Default API base URL used when none is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Configuration for [`ApiClient`]
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL every request path is joined onto
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Custom headers to include in all requests
    pub default_headers: HashMap<String, String>,
    /// Retries for GET requests failing with a network error
    pub max_retries: usize,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("projectdesk/{}", env!("CARGO_PKG_VERSION")),
            default_headers: HashMap::new(),
            max_retries: 2,
        }
    }
}

impl ApiClientConfig {
    /// Create a new config with a base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Build a config from `PROJECTDESK_API_URL`, `PROJECTDESK_TIMEOUT_SECS`
    /// and `PROJECTDESK_MAX_RETRIES`, falling back to defaults for unset keys
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("PROJECTDESK_API_URL") {
            config.base_url = url;
        }

        if let Some(raw) = lookup("PROJECTDESK_TIMEOUT_SECS") {
            let secs = raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "PROJECTDESK_TIMEOUT_SECS".to_string(),
                value: raw.clone(),
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("PROJECTDESK_MAX_RETRIES") {
            config.max_retries = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PROJECTDESK_MAX_RETRIES".to_string(),
                value: raw.clone(),
            })?;
        }

        Ok(config)
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a default header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set the number of GET retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Join a request path onto the base URL
    ///
    /// Leading and trailing slashes are normalized so `v1/users` and
    /// `/v1/users` resolve to the same URL.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}


// =============================================================================
// Retry Logic with Exponential Backoff
// =============================================================================

use std::future::Future;
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set the initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    fn calculate_delay(&self, attempt: usize) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

/// Retry an async operation while `should_retry` accepts the error
///
/// Returns the last error once `max_retries` extra attempts have failed.
pub async fn retry<F, Fut, T, E>(
    config: RetryConfig,
    should_retry: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempts += 1;

                if !should_retry(&err) || attempts > config.max_retries {
                    return Err(err);
                }

                sleep(config.calculate_delay(attempts - 1)).await;
            }
        }
    }
}

/// Retry only [`ApiError::is_network_error`] failures
pub async fn network_retry<F, Fut, T>(max_retries: usize, operation: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let config = RetryConfig::new(max_retries);
    retry(config, |err: &ApiError| err.is_network_error(), operation).await
}


// =============================================================================
// Transport Seam
// =============================================================================

/// Anything that can execute an [`ApiRequest`] and hand back a JSON body
///
/// Non-2xx responses must surface as `Err(ApiError)`; 2xx responses of any
/// kind (including 204) come back as `Ok` with their status intact.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute a request
    async fn execute(&self, request: ApiRequest)
        -> Result<ApiResponse<serde_json::Value>, ApiError>;
}

// =============================================================================
// Client Implementation
// =============================================================================

use reqwest::{Client as ReqwestClient, Response as ReqwestResponse};

/// reqwest-backed client for the projectdesk API
///
/// # Examples
/// ```no_run
/// use api_client::http::{ApiClient, ApiClientConfig, ApiRequest};
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ApiClient::new(ApiClientConfig::new("https://api.example.com"))?;
///     let response = client
///         .send::<serde_json::Value>(ApiRequest::get("/v1/projects"))
///         .await?;
///     println!("{} projects", response.data.as_array().map_or(0, Vec::len));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: ReqwestClient,
    config: ApiClientConfig,
}

impl ApiClient {
    /// Create a new client
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiError> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ApiError::network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Send a request and decode the body as `T`
    ///
    /// GET requests are retried on network errors up to
    /// [`ApiClientConfig::max_retries`]; other methods are sent once.
    pub async fn send<T>(&self, request: ApiRequest) -> Result<ApiResponse<T>, ApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        if request.method == HttpMethod::Get && self.config.max_retries > 0 {
            network_retry(self.config.max_retries, || {
                self.execute_request(request.clone())
            })
            .await
        } else {
            self.execute_request(request).await
        }
    }

    async fn execute_request<T>(&self, request: ApiRequest) -> Result<ApiResponse<T>, ApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = self.config.url_for(&request.path);

        let mut req = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };

        if !request.params.is_empty() {
            req = req.query(&request.params);
        }

        for (key, value) in &self.config.default_headers {
            req = req.header(key, value);
        }

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = &request.body {
            if let Some(encoding) = &request.encoding {
                req = req.header("Content-Type", encoding);
            }
            req = req.body(body.clone());
        }

        tracing::debug!(method = request.method.as_str(), %url, "sending request");

        let response = req
            .send()
            .await
            .map_err(|e| ApiError::network(format!("Request failed: {}", e)))?;

        self.parse_response(response).await
    }

    async fn parse_response<T>(&self, response: ReqwestResponse) -> Result<ApiResponse<T>, ApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status().as_u16();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                headers.insert(key.to_string(), value_str.to_string());
            }
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::debug!(status, "request failed");

            return Err(match serde_json::from_str::<ApiErrorResponse>(&error_body) {
                Ok(error_response) => {
                    ApiError::new(status, error_response.error, error_response.message)
                }
                Err(_) => ApiError::new(status, "Unknown", format!("HTTP {}: {}", status, error_body)),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::parse(format!("Failed to read response: {}", e)))?;

        // 204 and friends carry no body
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };

        let data: T = serde_json::from_str(body)
            .map_err(|e| ApiError::parse(format!("Failed to parse JSON: {}", e)))?;

        Ok(ApiResponse::new(status, headers, data))
    }

    /// Get the client configuration
    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

#[async_trait]
impl HttpTransport for ApiClient {
    async fn execute(
        &self,
        request: ApiRequest,
    ) -> Result<ApiResponse<serde_json::Value>, ApiError> {
        self.send(request).await
    }
}
