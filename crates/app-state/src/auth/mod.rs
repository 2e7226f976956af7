//! Authentication session store
//!
//! Holds who is signed in and whether the server has confirmed it, and
//! drives the login, logout, verification and password-reset flows against
//! the API. Every state change goes through one of the four mutations so the
//! derived `ui.is_admin` flag cannot drift from `current_user`.
//!
//! # Example
//!
//! ```rust,no_run
//! use app_state::auth::{AuthStore, Credentials};
//! use app_state::StoreContext;
//!
//! async fn sign_in(ctx: StoreContext) -> app_state::Result<()> {
//!     let auth = AuthStore::new(ctx);
//!     auth.login(&Credentials::new("ada@example.com", "hunter2").remember(true))
//!         .await?;
//!     assert!(auth.is_authenticated());
//!     Ok(())
//! }
//! ```

pub mod policy;

use api_client::{ApiRequest, ApiResponse};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{decode, segment, StoreContext};
use crate::error::{Result, StoreError};
use policy::{should_logout_after_verify_failure, CookiePlan, AUTH_TOKEN_COOKIE, REMEMBER_COOKIE};

/// Role identifier reserved for administrators
pub const ADMIN_ROLE_ID: i64 = 1;

const LOGIN_PATH: &str = "/v1/auth/login";
const LOGOUT_PATH: &str = "/v1/auth/logout";
const FORGOT_PATH: &str = "/v1/auth/forgot";
const SIGNUP_PATH: &str = "/v1/auth/signup";
const USERS_PATH: &str = "/v1/users";

// =============================================================================
// State
// =============================================================================

/// The signed-in user as returned by the API
///
/// Only the role and the embedded token mean anything to the store; every
/// other attribute is carried through untouched for the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Role identifier; [`ADMIN_ROLE_ID`] marks an administrator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role_id: Option<i64>,

    /// Token the server may embed in the user record
    #[serde(default, rename = "auth_token", skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Remaining attributes
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, Value>,
}

impl User {
    /// Create a user with a role and no other attributes
    pub fn with_role(user_role_id: i64) -> Self {
        Self {
            user_role_id: Some(user_role_id),
            ..Default::default()
        }
    }

    /// Whether this user holds the admin role
    pub fn is_admin(&self) -> bool {
        self.user_role_id == Some(ADMIN_ROLE_ID)
    }
}

/// Flags derived for the rendering layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUi {
    /// Recomputed on every `set_user`
    pub is_admin: bool,
}

/// Authentication session state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The signed-in user, if known
    pub current_user: Option<User>,
    /// Confirmed with the server at least once this session
    pub verified: bool,
    /// A token is currently held
    pub authenticated: bool,
    /// Opaque credential; empty when absent
    pub auth_token: String,
    /// Derived UI flags
    pub ui: SessionUi,
}

/// Login credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
    /// "Remember me"; absent means "keep whatever was decided before"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<bool>,
}

impl Credentials {
    /// Credentials without a remember preference
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            remember: None,
        }
    }

    /// Set the remember preference
    pub fn remember(mut self, remember: bool) -> Self {
        self.remember = Some(remember);
        self
    }
}

/// Options for [`AuthStore::on_login`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoginOptions {
    /// "Remember me" as chosen on the login form
    pub remember: Option<bool>,
}

/// Parameters for [`AuthStore::reset_password`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetPasswordParams {
    /// The new password
    pub password: String,
    /// The reset token from the email link
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct CurrentUserResponse {
    user: User,
    #[serde(default)]
    session: Option<SessionToken>,
}

#[derive(Debug, Deserialize)]
struct SessionToken {
    #[serde(default)]
    auth_token: Option<String>,
}

fn auth_token_of(body: &Value) -> String {
    body.get("auth_token")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

// =============================================================================
// Store
// =============================================================================

/// Authentication store: session state plus the actions that change it
pub struct AuthStore {
    state: RwLock<Session>,
    ctx: StoreContext,
}

impl AuthStore {
    /// Create a store with an empty session
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            state: RwLock::new(Session::default()),
            ctx,
        }
    }

    /// Copy of the current session
    pub fn snapshot(&self) -> Session {
        self.state.read().clone()
    }

    /// The signed-in user
    pub fn current_user(&self) -> Option<User> {
        self.state.read().current_user.clone()
    }

    /// Whether the current user is an administrator
    pub fn is_admin(&self) -> bool {
        self.state.read().ui.is_admin
    }

    /// Whether a token is held
    pub fn is_authenticated(&self) -> bool {
        self.state.read().authenticated
    }

    /// Whether the session was confirmed with the server
    pub fn is_verified(&self) -> bool {
        self.state.read().verified
    }

    /// The held token, empty when absent
    pub fn auth_token(&self) -> String {
        self.state.read().auth_token.clone()
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Replace the current user and recompute `ui.is_admin`
    pub fn set_user(&self, user: Option<User>) {
        let mut state = self.state.write();
        state.ui.is_admin = user.as_ref().is_some_and(User::is_admin);
        state.current_user = user;
        tracing::debug!(mutation = "set_user", is_admin = state.ui.is_admin);
    }

    /// Replace `verified`
    pub fn set_verified(&self, verified: bool) {
        self.state.write().verified = verified;
        tracing::debug!(mutation = "set_verified", verified);
    }

    /// Replace `authenticated`
    pub fn set_authenticated(&self, authenticated: bool) {
        self.state.write().authenticated = authenticated;
        tracing::debug!(mutation = "set_authenticated", authenticated);
    }

    /// Replace the held token
    pub fn set_auth_token(&self, token: impl Into<String>) {
        self.state.write().auth_token = token.into();
        tracing::debug!(mutation = "set_auth_token");
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// Sign in with credentials and return the raw response body
    pub async fn login(&self, credentials: &Credentials) -> Result<Value> {
        let request = ApiRequest::post(LOGIN_PATH).json_body(credentials)?;
        let response = self.ctx.http.execute(request).await?;

        self.on_login(
            &auth_token_of(&response.data),
            LoginOptions {
                remember: credentials.remember,
            },
        )?;

        tracing::info!(remember = ?credentials.remember, "logged in");
        Ok(response.data)
    }

    /// Sign out on the server, then drop the local session
    ///
    /// `verified` is left alone.
    pub async fn logout(&self) -> Result<()> {
        self.ctx.http.execute(ApiRequest::post(LOGOUT_PATH)).await?;
        self.clear_session()?;

        tracing::info!("logged out");
        Ok(())
    }

    /// Drop the local session without telling the server
    pub fn clear_session(&self) -> Result<()> {
        self.set_user(None);
        self.ctx.cookies.remove(AUTH_TOKEN_COOKIE)?;
        self.set_authenticated(false);
        self.set_auth_token("");
        Ok(())
    }

    /// Record a freshly issued token and persist it per [`CookiePlan`]
    ///
    /// Fails before touching any state when `auth_token` is empty.
    pub fn on_login(&self, auth_token: &str, options: LoginOptions) -> Result<()> {
        if auth_token.is_empty() {
            return Err(StoreError::MissingAuthToken);
        }

        self.set_verified(true);
        self.set_authenticated(true);
        self.set_auth_token(auth_token);

        let remember_cookie_present = self
            .ctx
            .cookies
            .get(REMEMBER_COOKIE)
            .is_some_and(|value| !value.is_empty());

        CookiePlan::for_login(options.remember, remember_cookie_present)
            .apply(self.ctx.cookies.as_ref(), auth_token)?;

        Ok(())
    }

    /// Confirm the session with the server and refresh the current user
    ///
    /// When no token is held, one is seeded from the `_auth_token` cookie.
    /// With `force_check` and still no token, this fails with
    /// [`StoreError::NotSignedIn`] without calling the API. With `set_cookie`
    /// the token is sent along so the server can set its own cookie.
    ///
    /// On failure the session may be logged out, per
    /// [`should_logout_after_verify_failure`]; the original error is returned
    /// either way.
    pub async fn verify_user(&self, force_check: bool, set_cookie: bool) -> Result<()> {
        if !self.is_authenticated() {
            let token = self.ctx.cookies.get(AUTH_TOKEN_COOKIE).unwrap_or_default();
            let authenticated = !token.is_empty();
            self.set_auth_token(token);
            self.set_authenticated(authenticated);
        }

        if !self.is_authenticated() && force_check {
            return Err(StoreError::NotSignedIn);
        }

        match self.refresh_current_user(set_cookie).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if should_logout_after_verify_failure(force_check, &err) {
                    tracing::info!("verification failed, ending session: {}", err);
                    if let Err(logout_err) = self.logout().await {
                        tracing::warn!("logout after failed verification failed: {}", logout_err);
                        if let Err(clear_err) = self.clear_session() {
                            tracing::warn!("could not clear session: {}", clear_err);
                        }
                    }
                }
                Err(err)
            }
        }
    }

    async fn refresh_current_user(&self, set_cookie: bool) -> Result<()> {
        let mut request =
            ApiRequest::get(USERS_PATH).param("_", self.ctx.clock.now().timestamp().to_string());

        if set_cookie {
            request = request
                .param("auth_token", self.auth_token())
                .param("setCookie", "true");
        }

        let response = self.ctx.http.execute(request).await?;
        let body: CurrentUserResponse = decode(response.data)?;

        let token = non_empty(body.session.and_then(|s| s.auth_token))
            .or_else(|| non_empty(body.user.auth_token.clone()))
            .unwrap_or_else(|| self.auth_token());

        self.set_user(Some(body.user));
        self.on_login(&token, LoginOptions::default())
    }

    /// Verify once per session; later calls return immediately
    pub async fn verify(&self) -> Result<()> {
        if self.is_verified() {
            return Ok(());
        }
        self.verify_user(false, false).await
    }

    /// Confirm an email address and sign in with the token it yields
    pub async fn verify_user_email(&self, token: &str) -> Result<()> {
        let request = ApiRequest::post(format!("/v1/auth/verify/{}", segment(token)));
        let response = self.ctx.http.execute(request).await?;

        self.on_login(&auth_token_of(&response.data), LoginOptions::default())
    }

    /// Ask for a password-reset email
    pub async fn forgot_password(&self, email: &str) -> Result<ApiResponse<Value>> {
        let request = ApiRequest::post(FORGOT_PATH).json_body(&serde_json::json!({ "email": email }))?;
        Ok(self.ctx.http.execute(request).await?)
    }

    /// Set a new password using a reset token
    pub async fn reset_password(&self, params: &ResetPasswordParams) -> Result<ApiResponse<Value>> {
        let request = ApiRequest::post(format!("/v1/auth/reset/{}", segment(&params.token)))
            .json_body(&serde_json::json!({ "password": params.password }))?;
        Ok(self.ctx.http.execute(request).await?)
    }

    /// Look up what a reset token refers to
    pub async fn get_reset_token_info(&self, token: &str) -> Result<ApiResponse<Value>> {
        let request = ApiRequest::get(format!("/v1/auth/reset/{}", segment(token)));
        Ok(self.ctx.http.execute(request).await?)
    }

    /// Create an account and return the response body
    pub async fn sign_up<T>(&self, data: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let request = ApiRequest::post(SIGNUP_PATH).json_body(data)?;
        Ok(self.ctx.http.execute(request).await?.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, reply, MockTransport, NOW};
    use api_client::{ApiError, HttpMethod};
    use chrono::Duration;
    use serde_json::json;
    use storage::{Clock, CookieOptions, CookieStore};

    fn is_call(request: &ApiRequest, method: HttpMethod, path: &str) -> bool {
        request.method == method && request.path == path
    }

    fn expect_logout(transport: &mut MockTransport) {
        transport
            .expect_execute()
            .withf(|r| is_call(r, HttpMethod::Post, LOGOUT_PATH))
            .times(1)
            .returning(|_| reply(200, Value::Null));
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    #[test]
    fn test_set_user_derives_admin_flag() {
        let store = AuthStore::new(harness(MockTransport::new()).ctx);

        store.set_user(Some(User::with_role(ADMIN_ROLE_ID)));
        assert!(store.is_admin());

        store.set_user(Some(User::with_role(2)));
        assert!(!store.is_admin());

        store.set_user(Some(User::with_role(ADMIN_ROLE_ID)));
        store.set_user(Some(User::default()));
        assert!(!store.is_admin());

        store.set_user(None);
        assert!(!store.is_admin());
        assert_eq!(store.current_user(), None);
    }

    #[test]
    fn test_user_keeps_unknown_attributes() {
        let user: User = serde_json::from_value(json!({
            "userRoleId": 1,
            "auth_token": "embedded",
            "name": "Ada"
        }))
        .unwrap();

        assert!(user.is_admin());
        assert_eq!(user.auth_token.as_deref(), Some("embedded"));
        assert_eq!(user.attributes["name"], "Ada");
    }

    // -------------------------------------------------------------------------
    // on_login
    // -------------------------------------------------------------------------

    #[test]
    fn test_on_login_rejects_empty_token_before_mutating() {
        let h = harness(MockTransport::new());
        let store = AuthStore::new(h.ctx.clone());

        let result = store.on_login("", LoginOptions { remember: Some(true) });

        assert!(matches!(result, Err(StoreError::MissingAuthToken)));
        assert_eq!(store.snapshot(), Session::default());
        assert!(h.cookies.is_empty());
    }

    #[test]
    fn test_on_login_remembered() {
        let h = harness(MockTransport::new());
        let store = AuthStore::new(h.ctx.clone());

        store
            .on_login("tok123", LoginOptions { remember: Some(true) })
            .unwrap();

        let session = store.snapshot();
        assert!(session.verified);
        assert!(session.authenticated);
        assert_eq!(session.auth_token, "tok123");

        let in_thirty_days = h.clock.now() + Duration::days(30);
        assert_eq!(h.cookies.get(REMEMBER_COOKIE), Some("true".to_string()));
        assert_eq!(h.cookies.expires_at(REMEMBER_COOKIE), Some(in_thirty_days));
        assert_eq!(h.cookies.get(AUTH_TOKEN_COOKIE), Some("tok123".to_string()));
        assert_eq!(h.cookies.expires_at(AUTH_TOKEN_COOKIE), Some(in_thirty_days));
    }

    #[test]
    fn test_on_login_without_preference_is_session_only() {
        let h = harness(MockTransport::new());
        let store = AuthStore::new(h.ctx.clone());

        store.on_login("tok", LoginOptions::default()).unwrap();

        assert_eq!(h.cookies.get(REMEMBER_COOKIE), None);
        assert_eq!(h.cookies.get(AUTH_TOKEN_COOKIE), Some("tok".to_string()));
        assert_eq!(h.cookies.expires_at(AUTH_TOKEN_COOKIE), None);
    }

    #[test]
    fn test_on_login_honours_existing_remember_cookie() {
        let h = harness(MockTransport::new());
        h.cookies
            .set(REMEMBER_COOKIE, "true", CookieOptions::days(1))
            .unwrap();
        let store = AuthStore::new(h.ctx.clone());

        store.on_login("tok", LoginOptions::default()).unwrap();

        let in_thirty_days = h.clock.now() + Duration::days(30);
        assert_eq!(h.cookies.expires_at(REMEMBER_COOKIE), Some(in_thirty_days));
        assert_eq!(h.cookies.expires_at(AUTH_TOKEN_COOKIE), Some(in_thirty_days));
    }

    // -------------------------------------------------------------------------
    // login / logout
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_posts_credentials_and_returns_body() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                is_call(r, HttpMethod::Post, LOGIN_PATH)
                    && r.body_json()
                        == Some(json!({
                            "email": "ada@example.com",
                            "password": "hunter2",
                            "remember": false
                        }))
            })
            .times(1)
            .returning(|_| reply(200, json!({ "auth_token": "tok", "expires": 3600 })));

        let h = harness(transport);
        let store = AuthStore::new(h.ctx.clone());

        let body = store
            .login(&Credentials::new("ada@example.com", "hunter2").remember(false))
            .await
            .unwrap();

        assert_eq!(body, json!({ "auth_token": "tok", "expires": 3600 }));
        assert!(store.is_authenticated());
        assert!(store.is_verified());
        assert_eq!(store.auth_token(), "tok");
        assert_eq!(h.cookies.expires_at(AUTH_TOKEN_COOKIE), None);
    }

    #[tokio::test]
    async fn test_login_without_token_in_response_fails() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .returning(|_| reply(200, json!({})));

        let store = AuthStore::new(harness(transport).ctx);
        let result = store.login(&Credentials::new("a@b.c", "pw")).await;

        assert!(matches!(result, Err(StoreError::MissingAuthToken)));
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_propagates_api_rejection() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .returning(|_| Err(ApiError::new(401, "Unauthorized", "Invalid email or password")));

        let store = AuthStore::new(harness(transport).ctx);
        let err = store.login(&Credentials::new("a@b.c", "pw")).await.unwrap_err();

        match err {
            StoreError::Api(e) => assert_eq!(e.message(), "Invalid email or password"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_logout_clears_session_but_not_verified() {
        let mut transport = MockTransport::new();
        expect_logout(&mut transport);

        let h = harness(transport);
        let store = AuthStore::new(h.ctx.clone());
        store.set_user(Some(User::with_role(ADMIN_ROLE_ID)));
        store.on_login("tok", LoginOptions { remember: Some(true) }).unwrap();

        store.logout().await.unwrap();

        let session = store.snapshot();
        assert_eq!(session.current_user, None);
        assert!(!session.authenticated);
        assert_eq!(session.auth_token, "");
        assert!(!session.ui.is_admin);
        assert!(session.verified);
        assert_eq!(h.cookies.get(AUTH_TOKEN_COOKIE), None);
        assert_eq!(h.cookies.get(REMEMBER_COOKIE), Some("true".to_string()));
    }

    #[tokio::test]
    async fn test_failed_logout_keeps_session() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .returning(|_| Err(ApiError::network("connection refused")));

        let h = harness(transport);
        let store = AuthStore::new(h.ctx.clone());
        store.on_login("tok", LoginOptions::default()).unwrap();

        assert!(store.logout().await.is_err());
        assert!(store.is_authenticated());
        assert_eq!(h.cookies.get(AUTH_TOKEN_COOKIE), Some("tok".to_string()));
    }

    // -------------------------------------------------------------------------
    // verify / verify_user
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_verify_is_a_no_op_once_verified() {
        let mut transport = MockTransport::new();
        transport.expect_execute().never();

        let store = AuthStore::new(harness(transport).ctx);
        store.set_verified(true);

        store.verify().await.unwrap();
    }

    #[tokio::test]
    async fn test_forced_verify_without_cookie_is_not_signed_in() {
        let mut transport = MockTransport::new();
        transport.expect_execute().never();

        let store = AuthStore::new(harness(transport).ctx);
        let err = store.verify_user(true, false).await.unwrap_err();

        assert!(matches!(err, StoreError::NotSignedIn));
        assert_eq!(err.to_string(), "You are not signed in. Please sign in.");
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_verify_user_seeds_token_from_cookie() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                is_call(r, HttpMethod::Get, USERS_PATH)
                    && r.params.get("_") == Some(&NOW.to_string())
                    && !r.params.contains_key("auth_token")
                    && !r.params.contains_key("setCookie")
            })
            .times(1)
            .returning(|_| {
                reply(
                    200,
                    json!({
                        "user": { "userRoleId": 1, "name": "Ada" },
                        "session": { "auth_token": "fresh" }
                    }),
                )
            });

        let h = harness(transport);
        h.cookies
            .set(AUTH_TOKEN_COOKIE, "stored", CookieOptions::session())
            .unwrap();
        let store = AuthStore::new(h.ctx.clone());

        store.verify_user(true, false).await.unwrap();

        let session = store.snapshot();
        assert!(session.verified);
        assert!(session.authenticated);
        assert!(session.ui.is_admin);
        assert_eq!(session.auth_token, "fresh");
        assert_eq!(h.cookies.get(AUTH_TOKEN_COOKIE), Some("fresh".to_string()));
    }

    #[tokio::test]
    async fn test_verify_user_with_set_cookie_sends_token() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                r.params.get("auth_token") == Some(&"stored".to_string())
                    && r.params.get("setCookie") == Some(&"true".to_string())
            })
            .times(1)
            .returning(|_| reply(200, json!({ "user": { "userRoleId": 3 } })));

        let h = harness(transport);
        h.cookies
            .set(AUTH_TOKEN_COOKIE, "stored", CookieOptions::session())
            .unwrap();
        let store = AuthStore::new(h.ctx.clone());

        store.verify_user(false, true).await.unwrap();

        assert!(!store.is_admin());
        assert_eq!(store.auth_token(), "stored");
    }

    #[tokio::test]
    async fn test_verify_user_falls_back_to_embedded_token() {
        let mut transport = MockTransport::new();
        transport.expect_execute().returning(|_| {
            reply(200, json!({ "user": { "userRoleId": 2, "auth_token": "embedded" } }))
        });

        let store = AuthStore::new(harness(transport).ctx);
        store.verify().await.unwrap();

        assert_eq!(store.auth_token(), "embedded");
        assert!(store.is_verified());
    }

    #[tokio::test]
    async fn test_unforced_rejection_logs_out() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| is_call(r, HttpMethod::Get, USERS_PATH))
            .times(1)
            .returning(|_| Err(ApiError::new(401, "Unauthorized", "Token expired")));
        expect_logout(&mut transport);

        let h = harness(transport);
        h.cookies
            .set(AUTH_TOKEN_COOKIE, "stale", CookieOptions::session())
            .unwrap();
        let store = AuthStore::new(h.ctx.clone());

        let err = store.verify_user(false, false).await.unwrap_err();

        assert!(matches!(err, StoreError::Api(ref e) if e.status() == 401));
        assert!(!store.is_authenticated());
        assert_eq!(store.auth_token(), "");
        assert_eq!(h.cookies.get(AUTH_TOKEN_COOKIE), None);
    }

    #[tokio::test]
    async fn test_unforced_network_failure_keeps_session() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| is_call(r, HttpMethod::Get, USERS_PATH))
            .times(1)
            .returning(|_| Err(ApiError::network("connection reset")));

        let h = harness(transport);
        h.cookies
            .set(AUTH_TOKEN_COOKIE, "tok", CookieOptions::session())
            .unwrap();
        let store = AuthStore::new(h.ctx.clone());

        assert!(store.verify_user(false, false).await.is_err());
        assert!(store.is_authenticated());
        assert_eq!(h.cookies.get(AUTH_TOKEN_COOKIE), Some("tok".to_string()));
    }

    #[tokio::test]
    async fn test_forced_rejection_does_not_log_out() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| is_call(r, HttpMethod::Get, USERS_PATH))
            .times(1)
            .returning(|_| Err(ApiError::new(401, "Unauthorized", "Token expired")));

        let h = harness(transport);
        h.cookies
            .set(AUTH_TOKEN_COOKIE, "tok", CookieOptions::session())
            .unwrap();
        let store = AuthStore::new(h.ctx.clone());

        assert!(store.verify_user(true, false).await.is_err());
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn test_session_cleared_locally_when_logout_also_fails() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| is_call(r, HttpMethod::Get, USERS_PATH))
            .returning(|_| Err(ApiError::new(401, "Unauthorized", "Token expired")));
        transport
            .expect_execute()
            .withf(|r| is_call(r, HttpMethod::Post, LOGOUT_PATH))
            .returning(|_| Err(ApiError::new(401, "Unauthorized", "Token expired")));

        let h = harness(transport);
        h.cookies
            .set(AUTH_TOKEN_COOKIE, "stale", CookieOptions::session())
            .unwrap();
        let store = AuthStore::new(h.ctx.clone());

        let err = store.verify_user(false, false).await.unwrap_err();

        assert!(matches!(err, StoreError::Api(_)));
        assert!(!store.is_authenticated());
        assert_eq!(h.cookies.get(AUTH_TOKEN_COOKIE), None);
    }

    // -------------------------------------------------------------------------
    // Email verification and password flows
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_verify_user_email_signs_in() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| is_call(r, HttpMethod::Post, "/v1/auth/verify/abc"))
            .times(1)
            .returning(|_| reply(200, json!({ "auth_token": "verified-tok" })));

        let store = AuthStore::new(harness(transport).ctx);
        store.verify_user_email("abc").await.unwrap();

        assert!(store.is_authenticated());
        assert_eq!(store.auth_token(), "verified-tok");
    }

    #[tokio::test]
    async fn test_forgot_password_posts_email() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                is_call(r, HttpMethod::Post, FORGOT_PATH)
                    && r.body_json() == Some(json!({ "email": "ada@example.com" }))
            })
            .times(1)
            .returning(|_| reply(204, Value::Null));

        let store = AuthStore::new(harness(transport).ctx);
        let response = store.forgot_password("ada@example.com").await.unwrap();

        assert_eq!(response.status, 204);
        assert_eq!(store.snapshot(), Session::default());
    }

    #[tokio::test]
    async fn test_reset_password_targets_token_path() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                is_call(r, HttpMethod::Post, "/v1/auth/reset/a%2Fb")
                    && r.body_json() == Some(json!({ "password": "n3w" }))
            })
            .times(1)
            .returning(|_| reply(200, json!({ "ok": true })));

        let store = AuthStore::new(harness(transport).ctx);
        let params = ResetPasswordParams {
            password: "n3w".to_string(),
            token: "a/b".to_string(),
        };

        store.reset_password(&params).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_password_defaults_to_empty_fields() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                is_call(r, HttpMethod::Post, "/v1/auth/reset/")
                    && r.body_json() == Some(json!({ "password": "" }))
            })
            .times(1)
            .returning(|_| Err(ApiError::new(404, "NotFound", "Unknown token")));

        let store = AuthStore::new(harness(transport).ctx);
        let err = store
            .reset_password(&ResetPasswordParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Api(ref e) if e.status() == 404));
    }

    #[tokio::test]
    async fn test_get_reset_token_info() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| is_call(r, HttpMethod::Get, "/v1/auth/reset/tok"))
            .times(1)
            .returning(|_| reply(200, json!({ "email": "ada@example.com" })));

        let store = AuthStore::new(harness(transport).ctx);
        let response = store.get_reset_token_info("tok").await.unwrap();

        assert_eq!(response.data["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_sign_up_returns_body_without_touching_session() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                is_call(r, HttpMethod::Post, SIGNUP_PATH)
                    && r.body_json() == Some(json!({ "email": "new@example.com", "name": "New" }))
            })
            .times(1)
            .returning(|_| reply(201, json!({ "id": 42 })));

        let store = AuthStore::new(harness(transport).ctx);
        let body = store
            .sign_up(&json!({ "email": "new@example.com", "name": "New" }))
            .await
            .unwrap();

        assert_eq!(body, json!({ "id": 42 }));
        assert!(!store.is_authenticated());
    }
}
