use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::models::ErrorResponse;
use crate::sheets::UpstreamError;

/// Every way a contact submission can fail, mapped to a status at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("validation failed: {0}")]
    Validation(&'static str),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("spreadsheet credentials are not configured")]
    Configuration,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ContactError {
    pub fn status(&self) -> StatusCode {
        match self {
            ContactError::Validation(_) => StatusCode::BAD_REQUEST,
            ContactError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ContactError::Configuration | ContactError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    // What the caller is allowed to see
    pub fn public_message(&self) -> &'static str {
        match self {
            ContactError::Validation(msg) => msg,
            ContactError::RateLimited => "Too many requests. Please try again later.",
            ContactError::Configuration => "Server configuration error",
            ContactError::Upstream(_) => "Failed to submit form. Please try again.",
        }
    }
}

impl IntoResponse for ContactError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.public_message().to_string(),
        });

        (self.status(), body).into_response()
    }
}
