//! Shared helpers for driving the contact router in tests.

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::FixedOffset;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use contact_intake::rate_limit::RateLimiter;
use contact_intake::sheets::{SheetRow, SubmissionStore, UpstreamError};
use contact_intake::state::AppState;

/// Store that remembers every row it was asked to append.
#[derive(Default)]
pub struct RecordingStore {
    pub rows: Mutex<Vec<SheetRow>>,
    pub fail: bool,
}

impl RecordingStore {
    #[allow(dead_code)]
    pub fn failing() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn rows(&self) -> Vec<SheetRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionStore for RecordingStore {
    async fn append(&self, row: &SheetRow) -> Result<(), UpstreamError> {
        self.rows.lock().unwrap().push(row.clone());
        if self.fail {
            return Err(UpstreamError::Status {
                stage: "append",
                status: 403,
                body: "The caller does not have permission".into(),
            });
        }
        Ok(())
    }
}

pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(330 * 60).unwrap()
}

pub fn app_with(store: Option<Arc<RecordingStore>>, limit: u32, window: Duration) -> Router {
    let store = store.map(|s| s as Arc<dyn SubmissionStore>);
    let state = Arc::new(AppState {
        store,
        rate_limiter: Arc::new(RateLimiter::in_memory(limit, window)),
        utc_offset: ist(),
    });
    contact_intake::app(state)
}

#[allow(dead_code)]
pub fn app(store: Arc<RecordingStore>) -> Router {
    app_with(Some(store), 5, Duration::from_secs(60))
}

/// POSTs a raw body to /api/contact from the given forwarded-for address.
pub async fn post_raw(
    app: &Router,
    body: &str,
    ip: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut req = Request::post("/api/contact").header("content-type", "application/json");
    if let Some(ip) = ip {
        req = req.header("x-forwarded-for", ip);
    }
    let req = req.body(Body::from(body.to_string())).unwrap();

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub async fn post_json(
    app: &Router,
    body: serde_json::Value,
    ip: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    post_raw(app, &body.to_string(), ip).await
}
