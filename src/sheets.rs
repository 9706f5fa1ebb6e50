//! Append-only client for the Google Sheets v4 REST API.
//!
//! Authenticates as a service account: a signed RS256 assertion is exchanged
//! for an OAuth access token, which is cached until shortly before it expires.
//! Rows always go to the first sheet of the spreadsheet and are laid out
//! according to that sheet's header row. A sheet without a header row gets
//! [`DEFAULT_HEADERS`] written to row 1 before the first append.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::SheetsCredentials;
use crate::models::SubmissionRecord;

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const APPEND_QUERY: &str = "valueInputOption=RAW&insertDataOption=INSERT_ROWS";

pub const DEFAULT_HEADERS: [&str; 10] = [
    "Timestamp", "Name", "Email", "Phone", "Company", "Service", "Date", "Time", "Message", "Type",
];

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("failed to sign service account assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("request to Google failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("header row names none of the form columns: {0:?}")]
    UnknownHeaders(Vec<String>),

    #[error("{stage} returned HTTP {status}: {body}")]
    Status {
        stage: &'static str,
        status: u16,
        body: String,
    },
}

/// Where accepted submissions are written.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn append(&self, row: &SheetRow) -> Result<(), UpstreamError>;
}

/// One row: the submission plus the server-side timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub timestamp: String,
    pub record: SubmissionRecord,
}

impl SheetRow {
    pub fn new(record: SubmissionRecord, now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            timestamp: format_timestamp(now, offset),
            record,
        }
    }

    pub fn value(&self, header: &str) -> &str {
        let r = &self.record;
        match header.trim() {
            "Timestamp" => &self.timestamp,
            "Name" => &r.name,
            "Email" => &r.email,
            "Phone" => &r.phone,
            "Company" => &r.company,
            "Service" => &r.service,
            "Date" => &r.date,
            "Time" => &r.time,
            "Message" => &r.message,
            "Type" => &r.kind,
            _ => "",
        }
    }

    /// Cells in the order of `headers`, or `None` when no header is a form column.
    pub fn cells<S: AsRef<str>>(&self, headers: &[S]) -> Option<Vec<String>> {
        let known = headers
            .iter()
            .any(|h| DEFAULT_HEADERS.contains(&h.as_ref().trim()));
        if !known {
            return None;
        }

        Some(
            headers
                .iter()
                .map(|h| self.value(h.as_ref()).to_string())
                .collect(),
        )
    }
}

// en-IN style, e.g. "19/10/2026, 3:04:05 pm"
pub fn format_timestamp(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset)
        .format("%-d/%-m/%Y, %-I:%M:%S %P")
        .to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS as u64
}

#[derive(Deserialize, Default)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Serialize)]
struct RowBody<'a, T: Serialize> {
    values: [&'a [T]; 1],
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct GoogleSheetsStore {
    client: reqwest::Client,
    credentials: SheetsCredentials,
    token_url: String,
    api_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleSheetsStore {
    pub fn new(
        client: reqwest::Client,
        credentials: SheetsCredentials,
        token_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            credentials,
            token_url: token_url.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    fn assertion(&self) -> Result<String, UpstreamError> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.credentials.client_email,
            scope: SCOPE,
            aud: &self.token_url,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())?;

        Ok(jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }

    // Cached token, or a fresh one from the token endpoint
    async fn access_token(&self) -> Result<String, UpstreamError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.assertion()?;
        let res = self
            .client
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let res = check_status(res, "token exchange").await?;
        let body: TokenResponse = res.json().await?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        tracing::debug!(expires_in = body.expires_in, "Obtained Google access token");

        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(body.access_token)
    }

    async fn header_row(&self, token: &str) -> Result<Vec<String>, UpstreamError> {
        let url = format!(
            "{}/v4/spreadsheets/{}/values/1:1",
            self.api_url, self.credentials.sheet_id
        );
        let res = self.client.get(url).bearer_auth(token).send().await?;
        let res = check_status(res, "header read").await?;
        let range: ValueRange = res.json().await?;

        Ok(range.values.into_iter().next().unwrap_or_default())
    }

    async fn write_default_headers(&self, token: &str) -> Result<(), UpstreamError> {
        let url = format!(
            "{}/v4/spreadsheets/{}/values/1:1?valueInputOption=RAW",
            self.api_url, self.credentials.sheet_id
        );
        let res = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&RowBody { values: [DEFAULT_HEADERS.as_slice()] })
            .send()
            .await?;
        check_status(res, "header write").await?;

        tracing::info!("Wrote default header row to empty sheet");
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for GoogleSheetsStore {
    async fn append(&self, row: &SheetRow) -> Result<(), UpstreamError> {
        let token = self.access_token().await?;
        let mut headers = self.header_row(&token).await?;

        // otherwise the first submission would land in row 1 and become the header
        if headers.iter().all(|h| h.trim().is_empty()) {
            self.write_default_headers(&token).await?;
            headers = DEFAULT_HEADERS.iter().map(|h| h.to_string()).collect();
        }

        let cells = row
            .cells(&headers)
            .ok_or_else(|| UpstreamError::UnknownHeaders(headers.clone()))?;

        let url = format!(
            "{}/v4/spreadsheets/{}/values/A1:append?{}",
            self.api_url, self.credentials.sheet_id, APPEND_QUERY
        );
        let res = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&RowBody { values: [cells.as_slice()] })
            .send()
            .await?;
        check_status(res, "append").await?;

        Ok(())
    }
}

async fn check_status(
    res: reqwest::Response,
    stage: &'static str,
) -> Result<reqwest::Response, UpstreamError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        stage,
        status: status.as_u16(),
        body,
    })
}
