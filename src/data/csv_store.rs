//! CSV ledger backend
//!
//! One delimited file per ledger with a header row. The layout matches the
//! files operators already curate by hand (`Handle, Display Name, DID,
//! Follows Me[, Add Date]`). Appends keep whatever column order the existing
//! file uses; rewrites go through a temp file in the same directory and are
//! renamed into place.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use super::ledger::{LedgerStore, unique_by_handle};
use super::models::{Ledger, LedgerEntry, format_flag, format_ledger_timestamp};
use crate::error::AppError;

const HANDLE_COLUMN: &str = "Handle";
const BASE_COLUMNS: [&str; 4] = ["Handle", "Display Name", "DID", "Follows Me"];
const TIMESTAMP_COLUMN: &str = "Add Date";

/// Ledger store backed by a directory of CSV files
#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    directory: PathBuf,
}

fn default_headers(ledger: Ledger) -> StringRecord {
    let mut headers = StringRecord::from(BASE_COLUMNS.to_vec());
    if ledger.has_timestamp() {
        headers.push_field(TIMESTAMP_COLUMN);
    }
    headers
}

fn column_value(entry: &LedgerEntry, column: &str) -> String {
    match column {
        "Handle" => entry.handle.clone(),
        "Display Name" => entry.display_name.clone(),
        "DID" => entry.did.clone(),
        "Follows Me" => format_flag(entry.follows_me).to_string(),
        "Add Date" => entry
            .added_at
            .as_ref()
            .map(format_ledger_timestamp)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn entry_record(headers: &StringRecord, entry: &LedgerEntry) -> StringRecord {
    headers
        .iter()
        .map(|column| column_value(entry, column))
        .collect()
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.flexible(true).trim(csv::Trim::All);
    builder
}

/// Open a ledger file, mapping "does not exist" to `None`
fn open_existing(path: &Path) -> Result<Option<File>, AppError> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(AppError::LedgerIo(format!(
            "failed to open {}: {}",
            path.display(),
            error
        ))),
    }
}

/// Write headers and rows to `path` via a synced temp file and rename
fn write_atomically(
    path: &Path,
    headers: &StringRecord,
    rows: impl IntoIterator<Item = StringRecord>,
) -> Result<(), AppError> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(directory)?;

    let temp = tempfile::NamedTempFile::new_in(directory)?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file());
        writer.write_record(headers)?;
        for row in rows {
            writer.write_record(&row)?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|error| {
        AppError::LedgerIo(format!(
            "failed to replace {}: {}",
            path.display(),
            error.error
        ))
    })?;

    Ok(())
}

impl CsvLedgerStore {
    /// Create a store rooted at `directory`
    ///
    /// The directory is created lazily on first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Path of the file backing `ledger`
    pub fn path_for(&self, ledger: Ledger) -> PathBuf {
        self.directory.join(ledger.file_name())
    }

    fn read_raw(&self, ledger: Ledger) -> Result<Option<(StringRecord, Vec<StringRecord>)>, AppError> {
        let path = self.path_for(ledger);
        let Some(file) = open_existing(&path)? else {
            return Ok(None);
        };

        let mut reader = reader_builder().from_reader(file);
        let headers = reader.headers()?.clone();
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Some((headers, rows)))
    }
}

impl LedgerStore for CsvLedgerStore {
    async fn read_all(&self, ledger: Ledger) -> Result<Vec<LedgerEntry>, AppError> {
        let path = self.path_for(ledger);
        let Some(file) = open_existing(&path)? else {
            tracing::debug!(%ledger, path = %path.display(), "Ledger file missing; treating as empty");
            return Ok(Vec::new());
        };

        let mut reader = reader_builder().from_reader(file);
        let mut entries = Vec::new();
        for row in reader.deserialize::<LedgerEntry>() {
            let entry = row?;
            if entry.handle.is_empty() {
                continue;
            }
            entries.push(entry);
        }

        Ok(entries)
    }

    async fn append_if_absent(
        &self,
        ledger: Ledger,
        records: &[LedgerEntry],
    ) -> Result<usize, AppError> {
        let path = self.path_for(ledger);
        let existing = self.read_raw(ledger)?;

        let (headers, existing_handles, needs_header) = match &existing {
            Some((headers, rows)) if !headers.is_empty() => {
                let handle_index = headers
                    .iter()
                    .position(|column| column == HANDLE_COLUMN)
                    .ok_or_else(|| {
                        AppError::LedgerIo(format!(
                            "{} has no {} column",
                            path.display(),
                            HANDLE_COLUMN
                        ))
                    })?;
                let handles: HashSet<String> = rows
                    .iter()
                    .filter_map(|row| row.get(handle_index))
                    .map(str::to_string)
                    .collect();
                (headers.clone(), handles, false)
            }
            _ => (default_headers(ledger), HashSet::new(), true),
        };

        let fresh = unique_by_handle(&existing_handles, records);
        if fresh.is_empty() {
            tracing::debug!(%ledger, "No new rows to append");
            return Ok(0);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if needs_header {
            // An existing but empty file gets its header rewritten from scratch.
            file.set_len(0)?;
        }
        {
            let mut writer = csv::Writer::from_writer(&file);
            if needs_header {
                writer.write_record(&headers)?;
            }
            for entry in &fresh {
                writer.write_record(&entry_record(&headers, entry))?;
            }
            writer.flush()?;
        }
        file.sync_all()?;

        tracing::debug!(%ledger, added = fresh.len(), "Appended ledger rows");
        Ok(fresh.len())
    }

    async fn remove_by_handle(
        &self,
        ledger: Ledger,
        handles: &HashSet<String>,
    ) -> Result<usize, AppError> {
        let path = self.path_for(ledger);
        let Some((headers, rows)) = self.read_raw(ledger)? else {
            return Ok(0);
        };
        let Some(handle_index) = headers.iter().position(|column| column == HANDLE_COLUMN) else {
            return Err(AppError::LedgerIo(format!(
                "{} has no {} column",
                path.display(),
                HANDLE_COLUMN
            )));
        };

        let before = rows.len();
        let remaining: Vec<StringRecord> = rows
            .into_iter()
            .filter(|row| {
                row.get(handle_index)
                    .map(|handle| !handles.contains(handle))
                    .unwrap_or(true)
            })
            .collect();
        let removed = before - remaining.len();

        if removed == 0 {
            return Ok(0);
        }

        write_atomically(&path, &headers, remaining)?;
        tracing::debug!(%ledger, removed, "Removed ledger rows");
        Ok(removed)
    }

    async fn replace_all(&self, ledger: Ledger, records: &[LedgerEntry]) -> Result<(), AppError> {
        let headers = default_headers(ledger);
        let rows: Vec<StringRecord> = records
            .iter()
            .map(|entry| entry_record(&headers, entry))
            .collect();
        write_atomically(&self.path_for(ledger), &headers, rows)?;
        tracing::debug!(%ledger, rows = records.len(), "Rewrote ledger");
        Ok(())
    }
}
