//! Ledger store abstraction
//!
//! Ledgers are the engine's memory across runs. Backends only need to
//! provide whole-table reads, handle-deduplicated appends, handle-based
//! removal and full rewrites. Every mutation must be durable before the
//! call returns, and a store that does not exist yet reads as empty.

use std::collections::HashSet;

use super::models::{Ledger, LedgerEntry};
use crate::error::AppError;

/// Durable ledger storage
#[allow(async_fn_in_trait)]
pub trait LedgerStore {
    /// Read every row of a ledger in stored order
    async fn read_all(&self, ledger: Ledger) -> Result<Vec<LedgerEntry>, AppError>;

    /// Read the set of handles present in a ledger
    async fn read_handles(&self, ledger: Ledger) -> Result<HashSet<String>, AppError> {
        Ok(self
            .read_all(ledger)
            .await?
            .into_iter()
            .map(|entry| entry.handle)
            .collect())
    }

    /// Insert rows whose handle is not yet in the ledger
    ///
    /// # Returns
    /// Number of rows actually written
    async fn append_if_absent(
        &self,
        ledger: Ledger,
        records: &[LedgerEntry],
    ) -> Result<usize, AppError>;

    /// Drop every row whose handle is in `handles`
    ///
    /// # Returns
    /// Number of rows removed
    async fn remove_by_handle(
        &self,
        ledger: Ledger,
        handles: &HashSet<String>,
    ) -> Result<usize, AppError>;

    /// Replace the whole ledger with `records`
    async fn replace_all(&self, ledger: Ledger, records: &[LedgerEntry]) -> Result<(), AppError>;
}

/// Read a ledger, logging and returning an empty result on failure
pub async fn load_entries<L: LedgerStore>(store: &L, ledger: Ledger) -> Vec<LedgerEntry> {
    match store.read_all(ledger).await {
        Ok(entries) => entries,
        Err(error) => {
            tracing::error!(%ledger, %error, "Failed to read ledger; treating it as empty");
            crate::metrics::LEDGER_ERRORS_TOTAL
                .with_label_values(&[ledger.as_str(), "read"])
                .inc();
            Vec::new()
        }
    }
}

/// Read a ledger's handles, logging and returning an empty set on failure
pub async fn load_handles<L: LedgerStore>(store: &L, ledger: Ledger) -> HashSet<String> {
    match store.read_handles(ledger).await {
        Ok(handles) => handles,
        Err(error) => {
            tracing::error!(%ledger, %error, "Failed to read ledger handles; treating it as empty");
            crate::metrics::LEDGER_ERRORS_TOTAL
                .with_label_values(&[ledger.as_str(), "read"])
                .inc();
            HashSet::new()
        }
    }
}

/// Deduplicate rows by handle, keeping the first occurrence
pub(crate) fn unique_by_handle<'a>(
    existing: &HashSet<String>,
    records: &'a [LedgerEntry],
) -> Vec<&'a LedgerEntry> {
    let mut seen = existing.clone();
    records
        .iter()
        .filter(|record| seen.insert(record.handle.clone()))
        .collect()
}
