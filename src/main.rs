use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contact_intake::config::Args;
use contact_intake::rate_limit::{RateLimiter, sweeper};
use contact_intake::sheets::{GoogleSheetsStore, SubmissionStore};
use contact_intake::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional, real environment wins
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contact_intake=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let utc_offset = args.utc_offset()?;
    let rate_window = Duration::from_secs(args.rate_window);

    let rate_limiter = Arc::new(match &args.redis_url {
        Some(url) => {
            tracing::info!("Using Redis for shared rate limit counters");
            let client = redis::Client::open(url.as_str())?;
            RateLimiter::with_redis(client, args.rate_limit, rate_window)
        }
        None => RateLimiter::in_memory(args.rate_limit, rate_window),
    });

    let store: Option<Arc<dyn SubmissionStore>> = match args.sheets_credentials() {
        Some(credentials) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(args.upstream_timeout))
                .build()?;
            tracing::info!(
                sheet = %credentials.sheet_id,
                "Forwarding submissions to Google Sheets"
            );
            let sheets: Arc<dyn SubmissionStore> = Arc::new(GoogleSheetsStore::new(
                client,
                credentials,
                args.token_url.clone(),
                args.sheets_api_url.clone(),
            ));
            Some(sheets)
        }
        None => {
            tracing::warn!(
                "GOOGLE_SERVICE_ACCOUNT_EMAIL, GOOGLE_PRIVATE_KEY or GOOGLE_SHEET_ID missing; \
                 every submission will fail with a configuration error"
            );
            None
        }
    };

    let state = Arc::new(AppState {
        store,
        rate_limiter: Arc::clone(&rate_limiter),
        utc_offset,
    });

    tokio::spawn(sweeper(rate_limiter, Duration::from_secs(args.sweep_interval.max(1))));

    let app = contact_intake::app(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Contact intake listening on http://{}", addr);
    tracing::info!(
        "Rate limit: {} requests per {} seconds",
        args.rate_limit, args.rate_window
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
