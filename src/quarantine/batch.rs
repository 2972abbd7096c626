//! Batch directories.
//!
//! A batch is one quarantine run:
//!
//! ```text
//! <quarantine root>/
//!   2026-10-16_14-03-22/
//!     journal.jsonl   structured journal (authoritative)
//!     actions.log     plain-text mirror
//!     files/          quarantined copies
//!     .sealed         present once the run has completed
//! ```
//!
//! Batch IDs are the local creation time; a numeric suffix is added when
//! two batches are created within the same second.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use thiserror::Error;

use super::actionlog::{ActionLog, ACTION_LOG_FILE};
use super::journal::{read_journal, Action, Journal, JournalError, Outcome, JOURNAL_FILE};

/// Subdirectory holding quarantined files.
pub const FILES_DIR: &str = "files";

const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const STAMP_LEN: usize = "YYYY-MM-DD_HH-MM-SS".len();

/// Marker written when a batch is sealed.
pub const SEALED_MARKER: &str = ".sealed";

/// Errors raised while creating or opening batches.
#[derive(Error, Debug)]
pub enum BatchError {
    /// The batch directory could not be created.
    #[error("Failed to create batch directory {path}: {source}")]
    CreateFailed {
        /// Directory path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The directory has no journal.
    #[error("Not a quarantine batch (no journal.jsonl): {0}")]
    NotABatch(PathBuf),

    /// The quarantine root could not be listed.
    #[error("Failed to list {path}: {source}")]
    ListFailed {
        /// Directory path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Journal failure.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// An open batch with its journal and action log.
#[derive(Debug)]
pub struct Batch {
    id: String,
    dir: PathBuf,
    journal: Journal,
    log: ActionLog,
    sealed: bool,
}

impl Batch {
    /// Create a new batch under `root`.
    ///
    /// # Errors
    ///
    /// Returns `CreateFailed` if the directories cannot be created, or a
    /// journal error if the journal cannot be opened.
    pub fn create(root: &Path) -> Result<Self, BatchError> {
        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        let mut id = stamp.clone();
        let mut n = 1;
        while root.join(&id).exists() {
            n += 1;
            id = format!("{}_{}", stamp, n);
        }

        let dir = root.join(&id);
        let files = dir.join(FILES_DIR);
        std::fs::create_dir_all(&files).map_err(|source| BatchError::CreateFailed {
            path: files.clone(),
            source,
        })?;

        let journal = Journal::open(&dir.join(JOURNAL_FILE), &id)?;
        let mut log = ActionLog::open(&dir.join(ACTION_LOG_FILE)).map_err(|source| {
            BatchError::CreateFailed {
                path: dir.join(ACTION_LOG_FILE),
                source,
            }
        })?;
        log.note(&format!("Batch {} started", id));
        log::info!("Created quarantine batch {}", dir.display());

        Ok(Self {
            id,
            dir,
            journal,
            log,
            sealed: false,
        })
    }

    /// Open an existing batch directory.
    ///
    /// # Errors
    ///
    /// Returns `NotABatch` if the directory holds no journal.
    pub fn open(dir: &Path) -> Result<Self, BatchError> {
        let journal_path = dir.join(JOURNAL_FILE);
        if !journal_path.is_file() {
            return Err(BatchError::NotABatch(dir.to_path_buf()));
        }
        let id = batch_id_of(dir);
        let journal = Journal::open(&journal_path, &id)?;
        let log = ActionLog::open(&dir.join(ACTION_LOG_FILE)).map_err(|source| {
            BatchError::CreateFailed {
                path: dir.join(ACTION_LOG_FILE),
                source,
            }
        })?;
        Ok(Self {
            id,
            dir: dir.to_path_buf(),
            journal,
            log,
            sealed: dir.join(SEALED_MARKER).exists(),
        })
    }

    /// Batch identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Batch directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding quarantined files.
    #[must_use]
    pub fn files_dir(&self) -> PathBuf {
        self.dir.join(FILES_DIR)
    }

    /// Whether the batch has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// The journal writer.
    pub fn journal_mut(&mut self) -> &mut Journal {
        &mut self.journal
    }

    /// The action log.
    pub fn log_mut(&mut self) -> &mut ActionLog {
        &mut self.log
    }

    /// Journal and action log together.
    pub fn writers(&mut self) -> (&mut Journal, &mut ActionLog) {
        (&mut self.journal, &mut self.log)
    }

    /// Refuse further quarantine operations.
    ///
    /// Restores may still be appended by undo.
    ///
    /// # Errors
    ///
    /// Returns `CreateFailed` if the marker cannot be written.
    pub fn seal(&mut self) -> Result<(), BatchError> {
        if self.sealed {
            return Ok(());
        }
        let marker = self.dir.join(SEALED_MARKER);
        std::fs::write(&marker, format!("{}\n", Local::now().to_rfc3339())).map_err(
            |source| BatchError::CreateFailed {
                path: marker.clone(),
                source,
            },
        )?;
        self.sealed = true;
        self.log.note(&format!("Batch {} sealed", self.id));
        log::info!("Sealed quarantine batch {}", self.id);
        Ok(())
    }
}

fn batch_id_of(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Summary of a batch, derived from its journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStatus {
    /// Batch identifier
    pub id: String,
    /// Batch directory
    pub dir: PathBuf,
    /// Whether the batch is sealed
    pub sealed: bool,
    /// Quarantine entries with outcome ok
    pub quarantined: usize,
    /// Quarantine entries with outcome failed
    pub failed: usize,
    /// Quarantine entries left pending
    pub pending: usize,
    /// Quarantine entries reversed by a successful restore
    pub restored: usize,
    /// Restore attempts that failed
    pub restore_failed: usize,
}

impl BatchStatus {
    /// Every successful quarantine has been restored.
    #[must_use]
    pub fn fully_restored(&self) -> bool {
        self.quarantined > 0 && self.restored >= self.quarantined
    }

    /// Short state label.
    #[must_use]
    pub fn state(&self) -> &'static str {
        if self.fully_restored() {
            "restored"
        } else if self.restored > 0 {
            "partially restored"
        } else if self.pending > 0 {
            "incomplete"
        } else if self.sealed {
            "sealed"
        } else {
            "open"
        }
    }
}

/// Summarize one batch directory.
///
/// # Errors
///
/// Returns `NotABatch` if there is no journal, or a journal error.
pub fn inspect(dir: &Path) -> Result<BatchStatus, BatchError> {
    let journal_path = dir.join(JOURNAL_FILE);
    if !journal_path.is_file() {
        return Err(BatchError::NotABatch(dir.to_path_buf()));
    }
    let records = read_journal(&journal_path)?;

    let restored: HashSet<u64> = records
        .iter()
        .filter(|r| r.action == Action::Restore && r.outcome == Outcome::Ok)
        .filter_map(|r| r.origin_seq)
        .collect();

    let mut status = BatchStatus {
        id: batch_id_of(dir),
        dir: dir.to_path_buf(),
        sealed: dir.join(SEALED_MARKER).exists(),
        quarantined: 0,
        failed: 0,
        pending: 0,
        restored: 0,
        restore_failed: 0,
    };
    for record in &records {
        match (record.action, record.outcome) {
            (Action::Quarantine, Outcome::Ok) => status.quarantined += 1,
            (Action::Quarantine, Outcome::Failed) => status.failed += 1,
            (Action::Quarantine, Outcome::Pending) => status.pending += 1,
            (Action::Restore, Outcome::Failed) => status.restore_failed += 1,
            (Action::Restore, _) => {}
        }
        if record.action == Action::Quarantine && restored.contains(&record.seq) {
            status.restored += 1;
        }
    }
    Ok(status)
}

/// Creation order of batch ids: the timestamp, then the `_N` counter
/// added when several batches start within one second.
fn creation_key(dir: &Path) -> (String, u32) {
    let name = batch_id_of(dir);
    match name.rsplit_once('_') {
        Some((stamp, n)) if stamp.len() == STAMP_LEN => match n.parse() {
            Ok(n) => (stamp.to_string(), n),
            Err(_) => (name, 1),
        },
        _ => (name, 1),
    }
}

/// Batch directories under `root`, oldest first.
fn batch_dirs(root: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(root).map_err(|source| BatchError::ListFailed {
        path: root.to_path_buf(),
        source,
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.join(JOURNAL_FILE).is_file())
        .collect();
    dirs.sort_by_cached_key(|d| creation_key(d));
    Ok(dirs)
}

/// List every batch under a quarantine root, oldest first.
///
/// Subdirectories without a journal are ignored. A missing root yields an
/// empty list.
///
/// # Errors
///
/// Returns `ListFailed` if the root cannot be read, or a journal error.
pub fn list_batches(root: &Path) -> Result<Vec<BatchStatus>, BatchError> {
    batch_dirs(root)?.iter().map(|d| inspect(d)).collect()
}

/// The most recently created batch under `root`, if any.
///
/// # Errors
///
/// Returns `ListFailed` if the root cannot be read.
pub fn latest_batch(root: &Path) -> Result<Option<PathBuf>, BatchError> {
    Ok(batch_dirs(root)?.pop())
}
