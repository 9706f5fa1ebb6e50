use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("contact_requests_total", "Total number of contact requests").unwrap();
    pub static ref SUBMISSIONS_STORED: Counter = register_counter!(
        "contact_submissions_stored_total",
        "Submissions appended to the sheet"
    )
    .unwrap();
    pub static ref RATE_LIMITED: Counter = register_counter!(
        "contact_rate_limited_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref VALIDATION_FAILURES: Counter = register_counter!(
        "contact_validation_failures_total",
        "Requests rejected as invalid"
    )
    .unwrap();
    pub static ref CONFIG_FAILURES: Counter = register_counter!(
        "contact_configuration_failures_total",
        "Requests failed for missing credentials"
    )
    .unwrap();
    pub static ref UPSTREAM_FAILURES: Counter =
        register_counter!("contact_upstream_failures_total", "Failed appends to the sheet")
            .unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "contact_upstream_latency_seconds",
        "Latency of the spreadsheet append in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_KEYS: Gauge = register_gauge!(
        "contact_rate_limit_keys",
        "Client identifiers tracked by the local rate limiter"
    )
    .unwrap();
}
