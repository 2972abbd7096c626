//! Append-only operation journal.
//!
//! # Format
//!
//! One JSON object per line (`journal.jsonl` inside the batch directory).
//! Every operation is written twice under the same sequence number: first
//! with outcome `pending` before the file is touched, then with `ok` or
//! `failed` once the move has been attempted. Lines are never rewritten.
//! Readers fold lines by sequence number, the last line winning, so an
//! operation interrupted by a crash shows up as `pending`.
//!
//! Every append reopens the file, writes one line and syncs it before
//! returning, so a journal removed mid-batch fails the next write instead of
//! writing to an unlinked file. A move is never attempted unless its pending
//! line was durably recorded.
//!
//! Paths are stored as JSON strings when they are valid UTF-8 and as raw
//! OS units (`{"unix": [..]}` or `{"wide": [..]}`) otherwise.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the journal inside a batch directory.
pub const JOURNAL_FILE: &str = "journal.jsonl";

/// What an operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Copy moved into the batch
    Quarantine,
    /// File moved back out of the batch
    Restore,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quarantine => write!(f, "quarantine"),
            Self::Restore => write!(f, "restore"),
        }
    }
}

/// State of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Recorded, not yet attempted (or the process died mid-move)
    Pending,
    /// Completed
    Ok,
    /// Attempted and failed; see `reason`
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ok => write!(f, "ok"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Batch this operation belongs to
    pub batch_id: String,
    /// Sequence number, strictly increasing within the batch
    pub seq: u64,
    /// Quarantine or restore
    pub action: Action,
    /// Where the file was moved from
    #[serde(with = "path_repr")]
    pub source: PathBuf,
    /// Where the file was moved to
    #[serde(with = "path_repr")]
    pub destination: PathBuf,
    /// When this line was written
    pub timestamp: DateTime<Utc>,
    /// Pending, ok or failed
    pub outcome: Outcome,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// For restores: the quarantine sequence number being reversed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_seq: Option<u64>,
    /// File size in bytes, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Content digest (hex), when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Errors raised by the journal.
#[derive(Error, Debug)]
pub enum JournalError {
    /// A line could not be durably written. Fatal for the batch.
    #[error("Failed to write journal {path}: {source}")]
    WriteFailed {
        /// Journal path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The journal could not be opened or read.
    #[error("Failed to read journal {path}: {source}")]
    ReadFailed {
        /// Journal path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A complete line did not parse.
    #[error("Corrupt journal {path} at line {line}: {message}")]
    Corrupt {
        /// Journal path
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// Parser message
        message: String,
    },

    /// A record could not be encoded.
    #[error("Failed to encode journal record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A journal line written with outcome `pending`, awaiting resolution.
#[derive(Debug, Clone)]
#[must_use = "a pending entry must be resolved"]
pub struct PendingEntry {
    record: OperationRecord,
}

impl PendingEntry {
    /// Sequence number of the entry.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.record.seq
    }

    /// The pending record.
    #[must_use]
    pub fn record(&self) -> &OperationRecord {
        &self.record
    }
}

/// Details of an operation about to be attempted.
#[derive(Debug, Clone)]
pub struct NewOperation {
    /// Quarantine or restore
    pub action: Action,
    /// Source path
    pub source: PathBuf,
    /// Destination path
    pub destination: PathBuf,
    /// Reversed quarantine sequence (restores only)
    pub origin_seq: Option<u64>,
    /// File size, when known
    pub size: Option<u64>,
    /// Digest hex, when known
    pub digest: Option<String>,
}

/// Writer side of a batch journal.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    batch_id: String,
    next_seq: u64,
}

impl Journal {
    /// Open (creating if needed) the journal at `path` for appending.
    ///
    /// Sequence numbering continues after the highest number already
    /// present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or an existing journal
    /// is corrupt.
    pub fn open(path: &Path, batch_id: &str) -> Result<Self, JournalError> {
        let existing = if path.exists() {
            drop_torn_tail(path)?;
            read_lines(path)?
        } else {
            Vec::new()
        };
        let next_seq = existing.iter().map(|r| r.seq + 1).max().unwrap_or(1);

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| JournalError::WriteFailed {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            batch_id: batch_id.to_string(),
            next_seq,
        })
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence number the next operation will get.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Durably record an operation as pending.
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if the line could not be written and synced.
    /// The sequence number is not consumed in that case.
    pub fn begin(&mut self, op: NewOperation) -> Result<PendingEntry, JournalError> {
        let record = OperationRecord {
            batch_id: self.batch_id.clone(),
            seq: self.next_seq,
            action: op.action,
            source: op.source,
            destination: op.destination,
            timestamp: Utc::now(),
            outcome: Outcome::Pending,
            reason: None,
            origin_seq: op.origin_seq,
            size: op.size,
            digest: op.digest,
        };
        self.append(&record)?;
        self.next_seq += 1;
        Ok(PendingEntry { record })
    }

    /// Record the outcome of a pending operation.
    ///
    /// `destination` replaces the pending destination when the final path
    /// differs (e.g. a restore that had to be renamed).
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if the line could not be written and synced.
    pub fn resolve(
        &mut self,
        pending: PendingEntry,
        result: Result<PathBuf, String>,
    ) -> Result<OperationRecord, JournalError> {
        let mut record = pending.record;
        record.timestamp = Utc::now();
        match result {
            Ok(destination) => {
                record.destination = destination;
                record.outcome = Outcome::Ok;
            }
            Err(reason) => {
                record.outcome = Outcome::Failed;
                record.reason = Some(reason);
            }
        }
        self.append(&record)?;
        Ok(record)
    }

    fn append(&mut self, record: &OperationRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let write_failed = |source| JournalError::WriteFailed {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(write_failed)?;
        file.write_all(line.as_bytes()).map_err(write_failed)?;
        file.sync_data().map_err(write_failed)?;
        Ok(())
    }
}

mod path_repr {
    use std::ffi::OsString;
    use std::path::{Path, PathBuf};

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Unix { unix: Vec<u8> },
        Wide { wide: Vec<u16> },
    }

    pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
        match path.to_str() {
            Some(text) => serializer.serialize_str(text),
            None => raw(path).serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
        let os = match Repr::deserialize(deserializer)? {
            Repr::Text(text) => OsString::from(text),
            Repr::Unix { unix } => from_unix(unix).map_err(serde::de::Error::custom)?,
            Repr::Wide { wide } => from_wide(&wide).map_err(serde::de::Error::custom)?,
        };
        Ok(PathBuf::from(os))
    }

    #[cfg(unix)]
    fn raw(path: &Path) -> Repr {
        use std::os::unix::ffi::OsStrExt;
        Repr::Unix {
            unix: path.as_os_str().as_bytes().to_vec(),
        }
    }

    #[cfg(windows)]
    fn raw(path: &Path) -> Repr {
        use std::os::windows::ffi::OsStrExt;
        Repr::Wide {
            wide: path.as_os_str().encode_wide().collect(),
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn raw(path: &Path) -> Repr {
        Repr::Text(path.to_string_lossy().into_owned())
    }

    #[cfg(unix)]
    fn from_unix(bytes: Vec<u8>) -> Result<OsString, &'static str> {
        use std::os::unix::ffi::OsStringExt;
        Ok(OsString::from_vec(bytes))
    }

    #[cfg(not(unix))]
    fn from_unix(_bytes: Vec<u8>) -> Result<OsString, &'static str> {
        Err("path was recorded on a Unix system")
    }

    #[cfg(windows)]
    fn from_wide(wide: &[u16]) -> Result<OsString, &'static str> {
        use std::os::windows::ffi::OsStringExt;
        Ok(OsString::from_wide(wide))
    }

    #[cfg(not(windows))]
    fn from_wide(_wide: &[u16]) -> Result<OsString, &'static str> {
        Err("path was recorded on a Windows system")
    }
}

/// Cut a final line that lacks its newline so new appends start clean.
fn drop_torn_tail(path: &Path) -> Result<(), JournalError> {
    let bytes = std::fs::read(path).map_err(|source| JournalError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }
    let keep = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    log::warn!(
        "Dropping {} byte torn tail of {}",
        bytes.len() - keep,
        path.display()
    );
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_len(keep as u64))
        .map_err(|source| JournalError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse every complete line of a journal, in file order.
///
/// A final line without a trailing newline that fails to parse is treated
/// as a torn write and skipped.
fn read_lines(path: &Path) -> Result<Vec<OperationRecord>, JournalError> {
    let read_failed = |source| JournalError::ReadFailed {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_failed)?;
    let mut reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut buf = String::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        let n = reader.read_line(&mut buf).map_err(read_failed)?;
        if n == 0 {
            break;
        }
        line_no += 1;
        let complete = buf.ends_with('\n');
        let text = buf.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<OperationRecord>(text) {
            Ok(record) => records.push(record),
            Err(e) if !complete => {
                log::warn!(
                    "Ignoring torn last line {} of {}: {}",
                    line_no,
                    path.display(),
                    e
                );
            }
            Err(e) => {
                return Err(JournalError::Corrupt {
                    path: path.to_path_buf(),
                    line: line_no,
                    message: e.to_string(),
                })
            }
        }
    }
    Ok(records)
}

/// Read a journal and fold it to one record per sequence number.
///
/// Returned records are sorted by sequence number; each carries the latest
/// state written for it.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a complete line is
/// corrupt.
pub fn read_journal(path: &Path) -> Result<Vec<OperationRecord>, JournalError> {
    let mut folded: BTreeMap<u64, OperationRecord> = BTreeMap::new();
    for record in read_lines(path)? {
        folded.insert(record.seq, record);
    }
    Ok(folded.into_values().collect())
}

/// Read every raw line of a journal, including superseded pending lines.
///
/// # Errors
///
/// Same as [`read_journal`].
pub fn read_journal_raw(path: &Path) -> Result<Vec<OperationRecord>, JournalError> {
    read_lines(path)
}
