//! projectdesk API client
//!
//! This crate provides the HTTP collaborator used by the application stores:
//! request and response types, error classification, retry logic, and a
//! reqwest-backed client behind the [`HttpTransport`] seam.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod http;

pub use http::{
    ApiClient, ApiClientConfig, ApiError, ApiRequest, ApiResponse, ConfigError, HttpMethod,
    HttpTransport,
};

/// Result type for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
