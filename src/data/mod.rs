//! Data layer module
//!
//! Handles all persistence and in-memory graph state:
//! - Ledger store trait with CSV and SQLite backends
//! - Graph snapshot (volatile, rebuilt each run)

mod csv_store;
mod database;
mod ledger;
mod models;
mod snapshot;

pub use csv_store::CsvLedgerStore;
pub use database::Database;
pub use ledger::{LedgerStore, load_entries, load_handles};
pub use models::*;
pub use snapshot::GraphSnapshot;
