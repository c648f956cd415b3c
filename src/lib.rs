//! followtide - Bluesky follow-graph reconciliation engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Reconciliation policy (retention, purge day)             │
//! │  - Candidate selection from seed accounts                   │
//! │  - Rate-limited mutation applier                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Remote Layer (XRPC)                        │
//! │  - Session login / refresh                                  │
//! │  - Paginated follower/follow listings                       │
//! │  - Follow record create/delete                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - CSV ledgers / SQLite (sqlx)                              │
//! │  - In-memory graph snapshot                                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `atproto`: Remote boundary, XRPC client, pagination, rate limiting
//! - `service`: Reconciliation logic
//! - `data`: Ledger store backends and graph snapshot
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod atproto;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use atproto::XrpcClient;
use data::LedgerStore;
use service::{Operator, Reconciler, RunReport};

/// Run one reconciliation cycle for the logged-in account
///
/// # Steps
/// 1. Resolve the operator from the session
/// 2. Build the reconciler (policy validation)
/// 3. Snapshot, decide and apply
///
/// # Errors
/// Returns error if the policy is invalid or the snapshot cannot be built
pub async fn run_once<L: LedgerStore>(
    client: &XrpcClient,
    store: &L,
    config: &config::AppConfig,
) -> Result<RunReport, error::AppError> {
    use chrono::Datelike;

    let session = client.session().await;
    let operator = Operator {
        handle: session.handle,
        did: session.did,
    };

    let reconciler = Reconciler::new(client, store, config)?;
    // Purge day follows the operator's local calendar
    let weekday = chrono::Local::now().weekday();
    let report = reconciler
        .run_cycle(&operator, chrono::Utc::now(), weekday)
        .await?;

    tracing::info!(
        handle = %operator.handle,
        unfollowed = report.unfollowed.len(),
        followed = report.followed.len(),
        light_day = report.light_day,
        "Reconciliation cycle completed"
    );
    Ok(report)
}
