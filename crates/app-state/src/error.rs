//! Store error types

use api_client::ApiError;
use storage::CookieError;

/// Errors surfaced by store actions
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The API call failed or returned a non-2xx status
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Cookie storage failed
    #[error("Cookie error: {0}")]
    Cookie(#[from] CookieError),

    /// A request or response body did not match the expected shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `on_login` was handed an empty token
    #[error("Cannot login with no authToken")]
    MissingAuthToken,

    /// A forced verification found no token to verify
    #[error("You are not signed in. Please sign in.")]
    NotSignedIn,
}

impl StoreError {
    /// Whether retrying later could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Api(e) if e.is_network_error())
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
