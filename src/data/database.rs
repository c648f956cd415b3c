//! SQLite ledger backend
//!
//! All ledgers live in one `ledger_entries` table keyed by
//! `(ledger, handle)`. Curated ledgers (do-not-remove, manual-remove,
//! followback sources) are edited with any SQLite client.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use std::path::Path;

use super::ledger::LedgerStore;
use super::models::{Ledger, LedgerEntry};
use crate::error::AppError;

/// Bound parameters per `IN (...)` batch
const DELETE_BATCH_SIZE: usize = 500;

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    handle: String,
    display_name: String,
    did: String,
    follows_me: bool,
    added_at: Option<DateTime<Utc>>,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        Self {
            handle: row.handle,
            display_name: row.display_name,
            did: row.did,
            follows_me: row.follows_me,
            added_at: row.added_at,
        }
    }
}

/// Database connection pool wrapper
pub struct Database {
    pool: Pool<Sqlite>,
}

async fn insert_entry<'c, E>(executor: E, ledger: Ledger, entry: &LedgerEntry) -> Result<u64, AppError>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT OR IGNORE INTO ledger_entries (ledger, handle, display_name, did, follows_me, added_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(ledger.as_str())
    .bind(&entry.handle)
    .bind(&entry.display_name)
    .bind(&entry.did)
    .bind(entry.follows_me)
    .bind(entry.added_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Ledger database connected and migrated");

        Ok(Self { pool })
    }

    /// Count rows in a ledger
    pub async fn count(&self, ledger: Ledger) -> Result<i64, AppError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ledger_entries WHERE ledger = ?")
                .bind(ledger.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

impl LedgerStore for Database {
    async fn read_all(&self, ledger: Ledger) -> Result<Vec<LedgerEntry>, AppError> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            "SELECT handle, display_name, did, follows_me, added_at FROM ledger_entries WHERE ledger = ? ORDER BY id",
        )
        .bind(ledger.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }

    async fn read_handles(&self, ledger: Ledger) -> Result<HashSet<String>, AppError> {
        let handles = sqlx::query_scalar::<_, String>(
            "SELECT handle FROM ledger_entries WHERE ledger = ?",
        )
        .bind(ledger.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(handles.into_iter().collect())
    }

    async fn append_if_absent(
        &self,
        ledger: Ledger,
        records: &[LedgerEntry],
    ) -> Result<usize, AppError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for entry in records {
            inserted += insert_entry(&mut *tx, ledger, entry).await?;
        }
        tx.commit().await?;

        Ok(inserted as usize)
    }

    async fn remove_by_handle(
        &self,
        ledger: Ledger,
        handles: &HashSet<String>,
    ) -> Result<usize, AppError> {
        if handles.is_empty() {
            return Ok(0);
        }

        let handles: Vec<&String> = handles.iter().collect();
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for chunk in handles.chunks(DELETE_BATCH_SIZE) {
            let mut query_builder =
                QueryBuilder::<Sqlite>::new("DELETE FROM ledger_entries WHERE ledger = ");
            query_builder.push_bind(ledger.as_str());
            query_builder.push(" AND handle IN (");
            {
                let mut separated = query_builder.separated(", ");
                for handle in chunk {
                    separated.push_bind(handle.as_str());
                }
            }
            query_builder.push(")");

            removed += query_builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(removed as usize)
    }

    async fn replace_all(&self, ledger: Ledger, records: &[LedgerEntry]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM ledger_entries WHERE ledger = ?")
            .bind(ledger.as_str())
            .execute(&mut *tx)
            .await?;
        for entry in records {
            insert_entry(&mut *tx, ledger, entry).await?;
        }
        tx.commit().await?;

        Ok(())
    }
}
