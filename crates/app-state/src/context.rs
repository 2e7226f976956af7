//! Capabilities shared by the stores

use api_client::HttpTransport;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use storage::{Clock, CookieStore, SystemClock};

use crate::error::Result;

/// The collaborators a store is allowed to touch
///
/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct StoreContext {
    /// HTTP collaborator
    pub http: Arc<dyn HttpTransport>,
    /// Cookie jar
    pub cookies: Arc<dyn CookieStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl StoreContext {
    /// Bundle the three capabilities
    pub fn new(
        http: Arc<dyn HttpTransport>,
        cookies: Arc<dyn CookieStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { http, cookies, clock }
    }

    /// Same as [`StoreContext::new`] on the system clock
    pub fn with_system_clock(http: Arc<dyn HttpTransport>, cookies: Arc<dyn CookieStore>) -> Self {
        Self::new(http, cookies, Arc::new(SystemClock))
    }
}

/// Decode a JSON response body into `T`
pub(crate) fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Escape a value for use as a single path segment
pub(crate) fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
