//! Cookie storage
//!
//! A small browser-style cookie jar: named string values with an optional
//! expiry counted in days. Cookies set without an expiry are session cookies
//! and live as long as the jar does.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};

/// Cookie storage error types
#[derive(Debug, Error)]
pub enum CookieError {
    /// Sled database error
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cookie operations
pub type Result<T> = std::result::Result<T, CookieError>;

/// Options applied when writing a cookie
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CookieOptions {
    /// Lifetime in days; `None` makes it a session cookie
    pub expires: Option<u32>,
}

impl CookieOptions {
    /// A cookie that disappears with the session
    pub fn session() -> Self {
        Self { expires: None }
    }

    /// A cookie that expires after `days`
    pub fn days(days: u32) -> Self {
        Self { expires: Some(days) }
    }

    /// Absolute expiry for a cookie written at `now`
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires.map(|days| now + Duration::days(i64::from(days)))
    }
}

/// Cookie jar used by the auth store
///
/// Reads never fail: a missing or expired cookie is simply `None`.
pub trait CookieStore: Send + Sync {
    /// Read a cookie value
    fn get(&self, name: &str) -> Option<String>;

    /// Write a cookie, replacing any previous value and expiry
    fn set(&self, name: &str, value: &str, options: CookieOptions) -> Result<()>;

    /// Delete a cookie
    fn remove(&self, name: &str) -> Result<()>;
}

/// A stored cookie value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    /// Cookie value
    pub value: String,
    /// When the cookie stops being readable; `None` for session cookies
    pub expires_at: Option<DateTime<Utc>>,
}

impl CookieRecord {
    /// Whether the cookie has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cookie jar
pub struct MemoryCookieStore {
    cookies: RwLock<HashMap<String, CookieRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCookieStore {
    /// Create an empty jar on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty jar that reads time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            cookies: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Expiry of a live cookie, if it has one
    pub fn expires_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.record(name).and_then(|record| record.expires_at)
    }

    /// The full record of a live cookie
    pub fn record(&self, name: &str) -> Option<CookieRecord> {
        let now = self.clock.now();
        let mut cookies = self.cookies.write();

        match cookies.get(name) {
            Some(record) if record.is_expired(now) => {
                cookies.remove(name);
                None
            }
            Some(record) => Some(record.clone()),
            None => None,
        }
    }

    /// Number of stored cookies, expired ones included
    pub fn len(&self) -> usize {
        self.cookies.read().len()
    }

    /// Whether the jar holds nothing
    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }
}

impl Default for MemoryCookieStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        self.record(name).map(|record| record.value)
    }

    fn set(&self, name: &str, value: &str, options: CookieOptions) -> Result<()> {
        let record = CookieRecord {
            value: value.to_string(),
            expires_at: options.expires_at(self.clock.now()),
        };
        self.cookies.write().insert(name.to_string(), record);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.cookies.write().remove(name);
        Ok(())
    }
}
