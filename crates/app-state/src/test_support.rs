//! Shared fixtures for store unit tests

use api_client::{ApiError, ApiRequest, ApiResponse, HttpTransport};
use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;
use std::sync::Arc;
use storage::{FixedClock, MemoryCookieStore};

use crate::context::StoreContext;

/// 2023-11-14T22:13:20Z
pub const NOW: i64 = 1_700_000_000;

mock! {
    pub Transport {}

    #[async_trait]
    impl HttpTransport for Transport {
        async fn execute(
            &self,
            request: ApiRequest,
        ) -> std::result::Result<ApiResponse<Value>, ApiError>;
    }
}

/// Everything a store test needs to inspect after an action
pub struct Harness {
    pub ctx: StoreContext,
    pub cookies: Arc<MemoryCookieStore>,
    pub clock: Arc<FixedClock>,
}

/// Build a context around `transport` with a fresh jar and a pinned clock
pub fn harness(transport: MockTransport) -> Harness {
    let clock = Arc::new(FixedClock::at_timestamp(NOW));
    let cookies = Arc::new(MemoryCookieStore::with_clock(clock.clone()));
    let ctx = StoreContext::new(Arc::new(transport), cookies.clone(), clock.clone());

    Harness { ctx, cookies, clock }
}

/// A successful response carrying `body`
pub fn reply(status: u16, body: Value) -> std::result::Result<ApiResponse<Value>, ApiError> {
    Ok(ApiResponse::with_status(status, body))
}
