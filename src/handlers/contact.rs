use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ContactError;
use crate::metrics::{
    CONFIG_FAILURES, RATE_LIMITED, REQUEST_TOTAL, SUBMISSIONS_STORED, UPSTREAM_FAILURES,
    UPSTREAM_LATENCY, VALIDATION_FAILURES,
};
use crate::models::{ContactRequest, MessageResponse, SubmissionRecord};
use crate::rate_limit::client_identifier;
use crate::sheets::SheetRow;
use crate::state::AppState;

pub async fn contact_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ContactRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ContactError> {
    REQUEST_TOTAL.inc();

    let client = client_identifier(&headers);

    // counts every attempt, whatever happens afterwards
    if !state.rate_limiter.check(&client).await {
        RATE_LIMITED.inc();
        tracing::warn!(client = %client, "Rate limit exceeded");
        return Err(ContactError::RateLimited);
    }

    let Some(store) = state.store.as_ref() else {
        CONFIG_FAILURES.inc();
        tracing::error!("Missing Google Sheets configuration");
        return Err(ContactError::Configuration);
    };

    let record = payload
        .map_err(|rejection| {
            tracing::debug!(client = %client, error = %rejection, "Unreadable contact payload");
            ContactError::Validation("Invalid request body")
        })
        .and_then(|Json(req)| SubmissionRecord::from_request(&req))
        .inspect_err(|_| VALIDATION_FAILURES.inc())?;

    let row = SheetRow::new(record, Utc::now(), state.utc_offset);

    let start_time = Instant::now();
    let result = store.append(&row).await;
    UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

    if let Err(e) = result {
        UPSTREAM_FAILURES.inc();
        tracing::error!(client = %client, error = %e, "Error submitting form");
        return Err(e.into());
    }

    SUBMISSIONS_STORED.inc();
    tracing::info!(client = %client, kind = %row.record.kind, "Contact submission stored");

    Ok(Json(MessageResponse {
        message: "Form submitted successfully".to_string(),
    }))
}
