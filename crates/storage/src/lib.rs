//! Storage layer for projectdesk
//!
//! This crate provides the cookie jars the auth store persists its token in
//! and the clock used for cookie expiry.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod cookies;
pub mod kv;

pub use clock::{Clock, FixedClock, SystemClock};
pub use cookies::{CookieError, CookieOptions, CookieRecord, CookieStore, MemoryCookieStore};
pub use kv::{KvCookieConfig, KvCookieStore};
