//! followtide binary entry point

use followtide::atproto::XrpcClient;
use followtide::config::{self, LedgerBackend};
use followtide::data::{CsvLedgerStore, Database};
use followtide::error::AppError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Initialize metrics
/// 3. Load configuration from file and environment
/// 4. Log in to the remote service
/// 5. Open the ledger store
/// 6. Run one reconciliation cycle
#[tokio::main]
async fn main() {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("FOLLOWTIDE__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "followtide=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "followtide=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting followtide...");

    // 2. Initialize metrics
    followtide::metrics::init_metrics();

    let outcome = run().await;

    followtide::metrics::log_summary();

    if let Err(error) = outcome {
        tracing::error!(kind = error.kind(), %error, "Run failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // 3. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        service_url = %config.remote.service_url,
        backend = ?config.ledger.backend,
        testing = config.policy.testing_mode,
        "Configuration loaded"
    );

    // 4. Log in
    let client = XrpcClient::login(&config.remote).await?;

    // 5-6. Open the ledger store and run
    let result = match config.ledger.backend {
        LedgerBackend::Csv => {
            let store = CsvLedgerStore::new(&config.ledger.directory);
            followtide::run_once(&client, &store, &config).await
        }
        LedgerBackend::Sqlite => {
            let store = Database::connect(&config.ledger.sqlite_path).await?;
            tracing::info!(path = %config.ledger.sqlite_path.display(), "Database connected");
            followtide::run_once(&client, &store, &config).await
        }
    };

    if let Some(path) = &config.metrics.textfile_path {
        match followtide::metrics::write_textfile(path) {
            Ok(()) => tracing::info!(path = %path.display(), "Metrics written"),
            Err(error) => tracing::warn!(path = %path.display(), %error, "Failed to write metrics"),
        }
    }

    result.map(|_| ())
}
