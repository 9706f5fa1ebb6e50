use chrono::FixedOffset;
use clap::Parser;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "contact-intake")]
#[command(about = "Contact form intake service forwarding submissions to Google Sheets")]
pub struct Args {
    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 5)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_WINDOW_SECS", default_value_t = 60)]
    pub rate_window: u64,

    // How often expired rate limit entries are dropped, in seconds
    #[arg(long, env = "RATE_LIMIT_SWEEP_SECS", default_value_t = 300)]
    pub sweep_interval: u64,

    // Shared counter store, e.g. "redis://127.0.0.1:6379"
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    // Timeout for each call to Google, in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    pub upstream_timeout: u64,

    // Offset used for the row timestamp (330 = Asia/Kolkata)
    #[arg(
        long,
        env = "TIMESTAMP_UTC_OFFSET_MINUTES",
        default_value_t = 330,
        allow_negative_numbers = true
    )]
    pub utc_offset_minutes: i32,

    #[arg(long, env = "GOOGLE_TOKEN_URL", default_value = "https://oauth2.googleapis.com/token")]
    pub token_url: String,

    #[arg(long, env = "GOOGLE_SHEETS_API_URL", default_value = "https://sheets.googleapis.com")]
    pub sheets_api_url: String,

    // Secrets, environment only
    #[arg(skip = std::env::var("GOOGLE_SERVICE_ACCOUNT_EMAIL").ok())]
    pub service_account_email: Option<String>,

    #[arg(skip = std::env::var("GOOGLE_PRIVATE_KEY").ok())]
    pub private_key: Option<String>,

    #[arg(skip = std::env::var("GOOGLE_SHEET_ID").ok())]
    pub sheet_id: Option<String>,
}

/// Service account credentials plus the target spreadsheet.
#[derive(Clone)]
pub struct SheetsCredentials {
    pub client_email: String,
    pub private_key: String,
    pub sheet_id: String,
}

// Keep the private key out of logs
impl std::fmt::Debug for SheetsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsCredentials")
            .field("client_email", &self.client_email)
            .field("sheet_id", &self.sheet_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid UTC offset: {0} minutes")]
    InvalidUtcOffset(i32),
}

impl Args {
    /// All three secrets, or `None` when any is missing or blank.
    pub fn sheets_credentials(&self) -> Option<SheetsCredentials> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(SheetsCredentials {
            client_email: present(&self.service_account_email)?,
            // keys pasted into .env files carry literal "\n" sequences
            private_key: present(&self.private_key)?.replace("\\n", "\n"),
            sheet_id: present(&self.sheet_id)?,
        })
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidUtcOffset(self.utc_offset_minutes))
    }
}
