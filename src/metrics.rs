//! Prometheus metrics registry and instruments.
//!
//! Runs are one-shot, so instead of a scrape endpoint the registry is
//! summarized in the log and optionally written as a node-exporter
//! textfile at the end of a run.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::path::Path;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Mutation Metrics
    pub static ref MUTATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("followtide_mutations_total", "Total number of follow/unfollow attempts"),
        &["direction", "result"]
    ).expect("metric can be created");

    // Fetch Metrics
    pub static ref FETCH_PAGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("followtide_fetch_pages_total", "Total number of listing pages fetched"),
        &["relationship"]
    ).expect("metric can be created");
    pub static ref FETCH_RETRIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("followtide_fetch_retries_total", "Total number of listing pages retried after a timeout"),
        &["relationship"]
    ).expect("metric can be created");

    // Ledger Metrics
    pub static ref LEDGER_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("followtide_ledger_errors_total", "Total number of ledger read/write failures"),
        &["ledger", "operation"]
    ).expect("metric can be created");

    // Graph Metrics
    pub static ref FOLLOWERS_TOTAL: IntGauge = IntGauge::new(
        "followtide_followers_total",
        "Accounts following the operator"
    ).expect("metric can be created");
    pub static ref FOLLOWING_TOTAL: IntGauge = IntGauge::new(
        "followtide_following_total",
        "Accounts the operator follows"
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(MUTATIONS_TOTAL.clone()))
        .expect("MUTATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FETCH_PAGES_TOTAL.clone()))
        .expect("FETCH_PAGES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FETCH_RETRIES_TOTAL.clone()))
        .expect("FETCH_RETRIES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(LEDGER_ERRORS_TOTAL.clone()))
        .expect("LEDGER_ERRORS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FOLLOWERS_TOTAL.clone()))
        .expect("FOLLOWERS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FOLLOWING_TOTAL.clone()))
        .expect("FOLLOWING_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Encode the registry in Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    TextEncoder::new().encode_to_string(&REGISTRY.gather())
}

/// Write the registry to a textfile-collector file
///
/// Writes to a sibling temp file first so a scraper never sees a partial file.
pub fn write_textfile(path: &Path) -> crate::error::Result<()> {
    let rendered = render().map_err(|e| crate::error::AppError::Internal(e.into()))?;

    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(directory)?;
    let temp = tempfile::NamedTempFile::new_in(directory)?;
    std::fs::write(temp.path(), rendered)?;
    temp.persist(path)
        .map_err(|e| crate::error::AppError::Io(e.error))?;
    Ok(())
}

/// Log one line per mutation series
pub fn log_summary() {
    for direction in ["follow", "unfollow"] {
        let succeeded = MUTATIONS_TOTAL
            .with_label_values(&[direction, "success"])
            .get();
        let failed = MUTATIONS_TOTAL
            .with_label_values(&[direction, "failure"])
            .get();
        tracing::info!(direction, succeeded, failed, "Mutation summary");
    }
    tracing::info!(
        followers = FOLLOWERS_TOTAL.get(),
        following = FOLLOWING_TOTAL.get(),
        "Graph summary"
    );
}
