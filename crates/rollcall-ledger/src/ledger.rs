//! CSV-backed attendance store.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Ledger column headers, in file order.
const HEADERS: [&str; 4] = ["Roll No", "Name", "Date", "Time"];

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger {path} has header {found:?}, expected {expected:?}")]
    MalformedHeader {
        path: PathBuf,
        found: Vec<String>,
        expected: Vec<String>,
    },
}

/// One attendance row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "Roll No")]
    pub roll_no: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Time")]
    pub time: NaiveTime,
}

/// Append-only attendance store backed by a CSV file.
///
/// The file is parsed once at open to build an in-memory set of
/// `(roll_no, date)` keys, making duplicate checks O(1). Every append
/// flushes before returning; a crash mid-session loses at most the
/// in-flight row.
pub struct Ledger {
    path: PathBuf,
    seen: HashSet<(String, NaiveDate)>,
}

impl Ledger {
    /// Open an existing ledger file, or create a fresh one with a header
    /// row. Existing files must carry the exact expected header.
    pub fn open(path: &Path) -> Result<Ledger, LedgerError> {
        let mut seen = HashSet::new();

        if path.exists() {
            let records = Self::read_records(path)?;
            for record in &records {
                seen.insert((record.roll_no.clone(), record.date));
            }
            tracing::info!(
                path = %path.display(),
                rows = records.len(),
                "opened attendance ledger"
            );
        } else {
            let mut writer = csv::Writer::from_path(path)?;
            writer.write_record(HEADERS)?;
            writer.flush()?;
            tracing::info!(path = %path.display(), "created attendance ledger");
        }

        Ok(Ledger {
            path: path.to_path_buf(),
            seen,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a row for this person on this calendar date already exists.
    pub fn has_record(&self, roll_no: &str, date: NaiveDate) -> bool {
        self.seen.contains(&(roll_no.to_string(), date))
    }

    /// Append one record and flush it to disk.
    ///
    /// Callers must check [`has_record`](Self::has_record) first; the
    /// [`Recorder`](crate::Recorder) wraps both into the one atomic-enough
    /// sequence this single-writer design needs.
    pub fn append(&mut self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;

        self.seen.insert((record.roll_no.clone(), record.date));
        tracing::debug!(
            roll_no = %record.roll_no,
            date = %record.date,
            "appended attendance row"
        );
        Ok(())
    }

    /// Read every record from a ledger file.
    ///
    /// Used at open to rebuild the duplicate-check set, and by `history`
    /// to print rows. A malformed header or row is a hard error.
    pub fn read_records(path: &Path) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut reader = csv::Reader::from_path(path)?;

        let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if found != HEADERS {
            return Err(LedgerError::MalformedHeader {
                path: path.to_path_buf(),
                found,
                expected: HEADERS.iter().map(|h| h.to_string()).collect(),
            });
        }

        reader
            .deserialize()
            .collect::<Result<Vec<AttendanceRecord>, csv::Error>>()
            .map_err(LedgerError::from)
    }
}
