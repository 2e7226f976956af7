//! Persistent cookie jar backed by sled
//!
//! Cookies written with an expiry survive process restarts the way browser
//! cookies do. Session cookies are held in memory only and vanish with the
//! process.

use parking_lot::RwLock;
use sled::Db;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::cookies::{CookieOptions, CookieRecord, CookieStore, Result};

/// Key prefix for persisted cookies
const COOKIE_PREFIX: &str = "cookie:";

/// Persistent cookie jar configuration
#[derive(Debug, Clone)]
pub struct KvCookieConfig {
    /// Database path
    pub path: String,
    /// Cache capacity in bytes
    pub cache_capacity: u64,
    /// Flush interval in milliseconds (None for flush on every write)
    pub flush_every_ms: Option<u64>,
}

impl Default for KvCookieConfig {
    fn default() -> Self {
        Self {
            path: "projectdesk_cookies.db".to_string(),
            cache_capacity: 1024 * 1024,
            flush_every_ms: None,
        }
    }
}

impl KvCookieConfig {
    /// Create a new configuration with a custom path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set cache capacity in bytes
    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Set flush interval in milliseconds
    pub fn flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }
}

/// Cookie jar persisted with sled
pub struct KvCookieStore {
    db: Arc<Db>,
    session: RwLock<HashMap<String, String>>,
    clock: Arc<dyn Clock>,
    flush_on_write: bool,
}

impl KvCookieStore {
    /// Open (or create) the jar described by `config`
    pub fn open(config: KvCookieConfig) -> Result<Self> {
        let db_config = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity)
            .flush_every_ms(config.flush_every_ms);

        let db = db_config.open()?;
        tracing::debug!(path = %config.path, "opened cookie jar");

        Ok(Self::from_db(db, config.flush_every_ms.is_none()))
    }

    /// Create a temporary jar (for testing)
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::from_db(db, false))
    }

    fn from_db(db: Db, flush_on_write: bool) -> Self {
        Self {
            db: Arc::new(db),
            session: RwLock::new(HashMap::new()),
            clock: Arc::new(SystemClock),
            flush_on_write,
        }
    }

    /// Read time from `clock` instead of the system clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn key(name: &str) -> String {
        format!("{}{}", COOKIE_PREFIX, name)
    }

    fn persisted(&self, name: &str) -> Result<Option<CookieRecord>> {
        let key = Self::key(name);

        let Some(bytes) = self.db.get(key.as_bytes())? else {
            return Ok(None);
        };

        let record: CookieRecord = serde_json::from_slice(&bytes)?;
        if record.is_expired(self.clock.now()) {
            self.db.remove(key.as_bytes())?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Full record of a live cookie from either tier
    pub fn record(&self, name: &str) -> Result<Option<CookieRecord>> {
        if let Some(value) = self.session.read().get(name) {
            return Ok(Some(CookieRecord {
                value: value.clone(),
                expires_at: None,
            }));
        }
        self.persisted(name)
    }

    /// Drop every expired persisted cookie, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut removed = 0;

        for item in self.db.scan_prefix(COOKIE_PREFIX.as_bytes()) {
            let (key, bytes) = item?;
            let record: CookieRecord = serde_json::from_slice(&bytes)?;
            if record.is_expired(now) {
                self.db.remove(key)?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn maybe_flush(&self) -> Result<()> {
        if self.flush_on_write {
            self.flush()?;
        }
        Ok(())
    }
}

impl CookieStore for KvCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        match self.record(name) {
            Ok(record) => record.map(|record| record.value),
            Err(e) => {
                tracing::warn!(cookie = name, "failed to read cookie: {}", e);
                None
            }
        }
    }

    fn set(&self, name: &str, value: &str, options: CookieOptions) -> Result<()> {
        let key = Self::key(name);

        match options.expires_at(self.clock.now()) {
            Some(expires_at) => {
                self.session.write().remove(name);
                let record = CookieRecord {
                    value: value.to_string(),
                    expires_at: Some(expires_at),
                };
                self.db.insert(key.as_bytes(), serde_json::to_vec(&record)?)?;
            }
            None => {
                self.db.remove(key.as_bytes())?;
                self.session.write().insert(name.to_string(), value.to_string());
            }
        }

        self.maybe_flush()
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.session.write().remove(name);
        self.db.remove(Self::key(name).as_bytes())?;
        self.maybe_flush()
    }
}
