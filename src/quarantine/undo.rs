//! Undo engine: restore a batch from its journal.
//!
//! # Overview
//!
//! Restores every successful quarantine entry of a batch, latest first, to
//! the path it was taken from. Each restore is itself journaled as a
//! `restore` entry pointing back at the quarantine sequence it reverses
//! (`origin_seq`), so rerunning undo skips work already done.
//!
//! - If the original path is occupied, the file is restored next to it as
//!   `stem (restored N).ext`; existing files are never replaced.
//! - A quarantine entry left `pending` by a crash is restored when the file
//!   sits at the quarantine destination and not at its source. Otherwise it
//!   is reported as unresolved.
//! - Restore failures are recorded one by one; the rest of the batch is
//!   still processed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use super::batch::{Batch, BatchError};
use super::journal::{
    read_journal, Action, JournalError, NewOperation, OperationRecord, Outcome, JOURNAL_FILE,
};
use super::relocate::{AutoRelocator, Relocator};
use super::{free_path, SuffixStyle};
use crate::progress::{Phase, ProgressListener, ProgressTracker};

/// Errors that stop an undo run.
#[derive(Error, Debug)]
pub enum UndoError {
    /// The batch could not be opened.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The journal could not be read or appended to.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Outcome of an undo run.
#[derive(Debug, Clone, Default)]
pub struct UndoReport {
    /// Batch identifier
    pub batch_id: String,
    /// Successful restores, in the order performed
    pub restored: Vec<OperationRecord>,
    /// Failed restores
    pub failed: Vec<OperationRecord>,
    /// Quarantine entries already restored by an earlier run
    pub already_restored: usize,
    /// Pending quarantine entries that could not be resolved
    pub unresolved: Vec<OperationRecord>,
    /// Restores that landed on a `(restored N)` path
    pub renamed: usize,
}

impl UndoReport {
    /// Whether every restore attempted in this run succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.unresolved.is_empty()
    }
}

/// Replays batch journals in reverse.
#[derive(Clone)]
pub struct UndoEngine {
    relocator: Arc<dyn Relocator>,
    listeners: Vec<Arc<dyn ProgressListener>>,
}

impl std::fmt::Debug for UndoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoEngine")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for UndoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoEngine {
    /// Engine with automatic relocation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            relocator: Arc::new(AutoRelocator),
            listeners: Vec::new(),
        }
    }

    /// Set the relocator.
    #[must_use]
    pub fn with_relocator(mut self, relocator: Arc<dyn Relocator>) -> Self {
        self.relocator = relocator;
        self
    }

    /// Add a progress listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Restore every quarantined file of the batch in `batch_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be opened or the journal cannot
    /// be read or written. Per-file restore failures are listed in the
    /// report instead.
    pub fn undo(&self, batch_dir: &Path) -> Result<UndoReport, UndoError> {
        let mut batch = Batch::open(batch_dir)?;
        let records = read_journal(&batch.dir().join(JOURNAL_FILE))?;
        let mut report = UndoReport {
            batch_id: batch.id().to_string(),
            ..UndoReport::default()
        };

        let done = completed_restores(&records);
        let mut todo: Vec<&OperationRecord> = Vec::new();
        for record in records.iter().filter(|r| r.action == Action::Quarantine) {
            if done.contains(&record.seq) {
                report.already_restored += 1;
                continue;
            }
            match record.outcome {
                Outcome::Ok => todo.push(record),
                Outcome::Pending if was_moved(record) => {
                    log::info!(
                        "Recovering interrupted quarantine #{} of {}",
                        record.seq,
                        record.source.display()
                    );
                    todo.push(record);
                }
                Outcome::Pending => {
                    log::warn!(
                        "Unresolved pending entry #{} for {}",
                        record.seq,
                        record.source.display()
                    );
                    report.unresolved.push(record.clone());
                }
                Outcome::Failed => {}
            }
        }
        todo.sort_by(|a, b| b.seq.cmp(&a.seq));

        batch
            .log_mut()
            .note(&format!("Undo started: {} file(s) to restore", todo.len()));
        let tracker = ProgressTracker::start(Phase::Restore, todo.len(), self.listeners.clone());
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        for entry in todo {
            let target = free_path(&entry.source, SuffixStyle::Restored, |p| {
                claimed.contains(p) || std::fs::symlink_metadata(p).is_ok()
            });
            claimed.insert(target.clone());

            let (journal, action_log) = batch.writers();
            let pending = journal.begin(NewOperation {
                action: Action::Restore,
                source: entry.destination.clone(),
                destination: target.clone(),
                origin_seq: Some(entry.seq),
                size: entry.size,
                digest: entry.digest.clone(),
            })?;

            let record = match self.relocator.relocate(&entry.destination, &target) {
                Ok(()) => {
                    if target != entry.source {
                        report.renamed += 1;
                        log::info!(
                            "{} is occupied, restored as {}",
                            entry.source.display(),
                            target.display()
                        );
                    }
                    journal.resolve(pending, Ok(target))?
                }
                Err(e) => {
                    log::warn!("Failed to restore {}: {}", entry.source.display(), e);
                    journal.resolve(pending, Err(e.to_string()))?
                }
            };
            action_log.record(&record);

            let failed = record.outcome == Outcome::Failed;
            tracker.advance(&entry.source.to_string_lossy(), failed);
            if failed {
                report.failed.push(record);
            } else {
                report.restored.push(record);
            }
        }
        tracker.finish(false);

        batch.log_mut().note(&format!(
            "Undo finished: {} restored, {} failed, {} already restored",
            report.restored.len(),
            report.failed.len(),
            report.already_restored
        ));
        log::info!(
            "Undo of batch {}: {} restored, {} failed",
            report.batch_id,
            report.restored.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

/// Quarantine sequence numbers already reversed.
///
/// A restore left pending counts as done when its file is at the restore
/// target and gone from quarantine.
fn completed_restores(records: &[OperationRecord]) -> HashSet<u64> {
    records
        .iter()
        .filter(|r| r.action == Action::Restore)
        .filter(|r| match r.outcome {
            Outcome::Ok => true,
            Outcome::Pending => was_moved(r),
            Outcome::Failed => false,
        })
        .filter_map(|r| r.origin_seq)
        .collect()
}

/// The file sits at the record's destination and no longer at its source.
fn was_moved(record: &OperationRecord) -> bool {
    record.destination.exists() && !record.source.exists()
}
