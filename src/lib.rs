//! Contact form intake service.
//!
//! Accepts contact and meeting-request submissions over HTTP, rate limits
//! them per client, validates and sanitizes the fields, and appends one row
//! per submission to a Google Sheet.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod sanitize;
pub mod sheets;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{contact_handler, health_handler, metrics_handler};
use crate::state::AppState;

// creating the router with routes
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/contact", post(contact_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
