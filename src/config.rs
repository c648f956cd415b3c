//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use chrono::Weekday;
use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub policy: PolicyConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Remote social-graph service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// PDS / entryway base URL (e.g., "https://bsky.social")
    pub service_url: String,
    /// Account handle or email used to log in
    pub username: String,
    /// App password
    pub password: String,
    /// Per-request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// Accounts requested per listing page (default: 100)
    pub page_limit: u32,
}

/// Reconciliation policy knobs
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Upper bound on follows issued per run (default: 2000)
    pub max_follows_per_run: usize,
    /// Minimum seconds between consecutive mutation calls (default: 3)
    pub mutation_interval_seconds: u64,
    /// Days an engine follow is kept before it may be removed (default: 1)
    pub retention_days: f64,
    /// Day of week on which everything eligible is removed (default: "sat")
    ///
    /// Empty string disables the purge day.
    #[serde(default)]
    pub purge_day: String,
    /// Retention applied on the purge day (default: 0.0001)
    pub purge_retention_days: f64,
    /// Whether new follows are made on the purge day (default: false)
    pub follow_on_purge_day: bool,
    /// Bounds pagination and batch sizes for fast runs
    pub testing_mode: bool,
}

impl PolicyConfig {
    /// Parsed purge day, if one is configured
    pub fn purge_weekday(&self) -> crate::error::Result<Option<Weekday>> {
        let trimmed = self.purge_day.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed.parse::<Weekday>().map(Some).map_err(|_| {
            crate::error::AppError::Config(format!(
                "policy.purge_day must be a weekday name, got {trimmed:?}"
            ))
        })
    }
}

/// Ledger storage backend selector
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Csv,
    Sqlite,
}

/// Ledger storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Which store holds the ledgers
    #[serde(default)]
    pub backend: LedgerBackend,
    /// Directory holding the CSV ledger files
    pub directory: PathBuf,
    /// SQLite database file for the sqlite backend
    pub sqlite_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

/// Metrics export configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsConfig {
    /// Write Prometheus text exposition here at the end of a run
    pub textfile_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FOLLOWTIDE__*)
    /// 5. BLUESKY_USERNAME / BLUESKY_PASSWORD
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> crate::error::Result<Self> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("remote.service_url", "https://bsky.social")?
            .set_default("remote.username", "")?
            .set_default("remote.password", "")?
            .set_default("remote.timeout_seconds", 30)?
            .set_default("remote.page_limit", 100)?
            .set_default("policy.max_follows_per_run", 2000)?
            .set_default("policy.mutation_interval_seconds", 3)?
            .set_default("policy.retention_days", 1.0)?
            .set_default("policy.purge_day", "sat")?
            .set_default("policy.purge_retention_days", 0.0001)?
            .set_default("policy.follow_on_purge_day", false)?
            .set_default("policy.testing_mode", false)?
            .set_default("ledger.backend", "csv")?
            .set_default("ledger.directory", ".")?
            .set_default("ledger.sqlite_path", "followtide.db")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FOLLOWTIDE")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("remote.username", std::env::var("BLUESKY_USERNAME").ok())?
            .set_override_option("remote.password", std::env::var("BLUESKY_PASSWORD").ok())?
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.remote.username.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "remote.username is required (set BLUESKY_USERNAME)".to_string(),
            ));
        }

        if self.remote.password.is_empty() {
            return Err(crate::error::AppError::Config(
                "remote.password is required (set BLUESKY_PASSWORD)".to_string(),
            ));
        }

        if url::Url::parse(&self.remote.service_url).is_err() {
            return Err(crate::error::AppError::Config(format!(
                "remote.service_url is not a valid URL: {}",
                self.remote.service_url
            )));
        }

        if self.remote.page_limit == 0 || self.remote.page_limit > 100 {
            return Err(crate::error::AppError::Config(
                "remote.page_limit must be between 1 and 100".to_string(),
            ));
        }

        if self.policy.retention_days < 0.0 || self.policy.purge_retention_days < 0.0 {
            return Err(crate::error::AppError::Config(
                "policy retention values must not be negative".to_string(),
            ));
        }

        self.policy.purge_weekday()?;

        Ok(())
    }
}
