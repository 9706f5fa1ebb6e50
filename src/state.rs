use chrono::FixedOffset;
use std::sync::Arc;
use crate::rate_limit::RateLimiter;
use crate::sheets::SubmissionStore;
// app's shared state

pub struct AppState {
    pub store: Option<Arc<dyn SubmissionStore>>, // None when credentials are missing
    pub rate_limiter: Arc<RateLimiter>,
    pub utc_offset: FixedOffset, // zone of the row timestamp
}
