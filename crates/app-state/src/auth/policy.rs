//! Decisions the auth store makes about cookies and failed verification
//!
//! Both are pure functions of their inputs so they can be checked without a
//! store, an HTTP mock or a cookie jar.

use storage::{CookieError, CookieOptions, CookieStore};

use crate::error::StoreError;

/// Cookie holding the auth token
pub const AUTH_TOKEN_COOKIE: &str = "_auth_token";

/// Cookie marking a "remember me" login
pub const REMEMBER_COOKIE: &str = "_remember";

/// Lifetime of remembered cookies, in days
pub const COOKIE_EXPIRE_DAYS: u32 = 30;

/// What happens to the `_remember` cookie on login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RememberCookie {
    /// Write `"true"` with the remembered lifetime
    Write,
    /// Delete it
    Remove,
    /// Leave it as it is
    Untouched,
}

/// Cookie writes performed by a successful login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePlan {
    /// Treatment of `_remember`
    pub remember_cookie: RememberCookie,
    /// Options for writing `_auth_token`
    pub auth_token: CookieOptions,
}

impl CookiePlan {
    /// Decide the cookie writes for a login
    ///
    /// | `remember`  | `_remember` present | `_remember`        | `_auth_token` |
    /// |-------------|---------------------|--------------------|---------------|
    /// | `Some(true)`  | any               | write, 30 days     | 30 days       |
    /// | `Some(false)` | any               | remove             | session       |
    /// | `None`        | yes               | rewrite, 30 days   | 30 days       |
    /// | `None`        | no                | untouched          | session       |
    pub fn for_login(remember: Option<bool>, remember_cookie_present: bool) -> Self {
        match (remember, remember_cookie_present) {
            (Some(true), _) | (None, true) => Self {
                remember_cookie: RememberCookie::Write,
                auth_token: CookieOptions::days(COOKIE_EXPIRE_DAYS),
            },
            (Some(false), _) => Self {
                remember_cookie: RememberCookie::Remove,
                auth_token: CookieOptions::session(),
            },
            (None, false) => Self {
                remember_cookie: RememberCookie::Untouched,
                auth_token: CookieOptions::session(),
            },
        }
    }

    /// Carry out the plan against a cookie jar
    pub fn apply(&self, cookies: &dyn CookieStore, auth_token: &str) -> Result<(), CookieError> {
        match self.remember_cookie {
            RememberCookie::Write => {
                cookies.set(REMEMBER_COOKIE, "true", CookieOptions::days(COOKIE_EXPIRE_DAYS))?
            }
            RememberCookie::Remove => cookies.remove(REMEMBER_COOKIE)?,
            RememberCookie::Untouched => {}
        }

        cookies.set(AUTH_TOKEN_COOKIE, auth_token, self.auth_token)
    }
}

/// Whether a failed `verify_user` should end the session
///
/// Forced checks report the failure and leave the session alone. Unforced
/// checks log out, except when the failure looks transient: a dropped
/// connection says nothing about whether the token is still good.
pub fn should_logout_after_verify_failure(force_check: bool, error: &StoreError) -> bool {
    !force_check && !error.is_transient()
}
