//! Quarantine transaction manager.
//!
//! # Overview
//!
//! [`QuarantineManager::quarantine`] moves approved copies into a new batch,
//! one file at a time and in the order given. For every file:
//!
//! 1. pick a destination inside `files/` that no file on disk or earlier in
//!    the batch occupies (`name (N).ext` on collision)
//! 2. durably journal the operation as `pending`
//! 3. relocate the file
//! 4. journal the outcome and mirror it to the action log
//!
//! A failed move is recorded and the run continues; earlier moves are never
//! rolled back. A journal write failure stops the run immediately, since a
//! move whose record cannot be written could not be undone.
//!
//! # Example
//!
//! ```no_run
//! use dupeguard::quarantine::{QuarantineConfig, QuarantineItem, QuarantineManager};
//! use std::path::PathBuf;
//!
//! let manager = QuarantineManager::new(QuarantineConfig::new(PathBuf::from("/q")));
//! let items = vec![QuarantineItem::new(PathBuf::from("/data/B/doc.txt"))];
//! let report = manager.quarantine(&items).unwrap();
//! println!("{} moved, {} failed", report.moved.len(), report.failed.len());
//! ```

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::batch::{Batch, BatchError};
use super::journal::{Action, JournalError, NewOperation, OperationRecord};
use super::relocate::{AutoRelocator, Relocator};
use super::{free_path, SuffixStyle};
use crate::duplicates::DuplicateGroup;
use crate::progress::{Phase, ProgressListener, ProgressTracker};
use crate::scanner::{hash_to_hex, Hash};

/// How quarantined files are arranged inside `files/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// All files side by side, disambiguated by suffix
    #[default]
    Flat,
    /// The source's absolute directory structure is recreated
    Mirror,
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Mirror => write!(f, "mirror"),
        }
    }
}

/// A file approved for quarantine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineItem {
    /// File to move
    pub path: PathBuf,
    /// Size, recorded in the journal when known
    pub size: Option<u64>,
    /// Digest, recorded in the journal when known
    pub digest: Option<Hash>,
}

impl QuarantineItem {
    /// Item for a bare path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            size: None,
            digest: None,
        }
    }

    /// Every copy in `groups`, in group order then member order.
    #[must_use]
    pub fn from_groups(groups: &[DuplicateGroup]) -> Vec<Self> {
        groups
            .iter()
            .flat_map(|group| {
                group.copies().map(move |member| Self {
                    path: member.record.path.clone(),
                    size: Some(member.record.size),
                    digest: Some(group.digest),
                })
            })
            .collect()
    }
}

/// Configuration for a quarantine run.
#[derive(Clone)]
pub struct QuarantineConfig {
    /// Directory holding batch directories.
    pub root: PathBuf,
    /// Arrangement inside `files/`.
    pub layout: Layout,
    /// Move implementation.
    pub relocator: Arc<dyn Relocator>,
    /// Cooperative cancellation flag, checked between moves.
    pub cancel_flag: Option<Arc<AtomicBool>>,
    /// Progress listeners.
    pub listeners: Vec<Arc<dyn ProgressListener>>,
}

impl std::fmt::Debug for QuarantineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuarantineConfig")
            .field("root", &self.root)
            .field("layout", &self.layout)
            .field("cancel_flag", &self.cancel_flag)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl QuarantineConfig {
    /// Configuration with the flat layout and automatic relocation.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            layout: Layout::Flat,
            relocator: Arc::new(AutoRelocator),
            cancel_flag: None,
            listeners: Vec::new(),
        }
    }

    /// Set the layout.
    #[must_use]
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the relocator.
    #[must_use]
    pub fn with_relocator(mut self, relocator: Arc<dyn Relocator>) -> Self {
        self.relocator = relocator;
        self
    }

    /// Set the cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    /// Add a progress listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Errors that stop a quarantine run.
#[derive(Error, Debug)]
pub enum QuarantineError {
    /// The quarantine root cannot be created or written.
    #[error("Quarantine root {path} is unavailable: {source}")]
    RootUnavailable {
        /// Root path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The batch could not be created or sealed.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// A journal write failed; no further moves were attempted.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Outcome of a quarantine run.
#[derive(Debug, Clone, Default)]
pub struct QuarantineReport {
    /// Batch identifier, if a batch was created
    pub batch_id: Option<String>,
    /// Batch directory, if a batch was created
    pub batch_dir: Option<PathBuf>,
    /// Successful moves
    pub moved: Vec<OperationRecord>,
    /// Failed moves
    pub failed: Vec<OperationRecord>,
    /// Items not attempted because of cancellation
    pub skipped: usize,
    /// Bytes moved, for items whose size was known
    pub bytes_moved: u64,
    /// Whether cancellation stopped the run
    pub interrupted: bool,
}

impl QuarantineReport {
    /// Whether any move failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Moves approved copies into batch directories.
#[derive(Debug)]
pub struct QuarantineManager {
    config: QuarantineConfig,
}

impl QuarantineManager {
    /// Create a manager.
    #[must_use]
    pub fn new(config: QuarantineConfig) -> Self {
        Self { config }
    }

    /// Configured quarantine root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Quarantine `items` into a new batch.
    ///
    /// No batch is created when `items` is empty. Repeated paths are
    /// quarantined once.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is unusable, the batch cannot be
    /// created, or a journal write fails. Per-file move failures are not
    /// errors; they are listed in the report.
    pub fn quarantine(&self, items: &[QuarantineItem]) -> Result<QuarantineReport, QuarantineError> {
        let mut report = QuarantineReport::default();

        let mut seen = HashSet::new();
        let items: Vec<&QuarantineItem> = items.iter().filter(|i| seen.insert(&i.path)).collect();
        if items.is_empty() {
            log::info!("Nothing to quarantine");
            return Ok(report);
        }

        std::fs::create_dir_all(&self.config.root).map_err(|source| {
            QuarantineError::RootUnavailable {
                path: self.config.root.clone(),
                source,
            }
        })?;

        let mut batch = Batch::create(&self.config.root)?;
        report.batch_id = Some(batch.id().to_string());
        report.batch_dir = Some(batch.dir().to_path_buf());

        let tracker = ProgressTracker::start(
            Phase::Quarantine,
            items.len(),
            self.config.listeners.clone(),
        );
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        for (index, item) in items.iter().enumerate() {
            if self.config.is_cancelled() {
                report.skipped = items.len() - index;
                report.interrupted = true;
                log::info!("Quarantine cancelled, {} item(s) skipped", report.skipped);
                break;
            }

            let preferred = self.preferred_destination(&batch.files_dir(), &item.path);
            let destination = free_path(&preferred, SuffixStyle::Numbered, |p| {
                claimed.contains(p) || std::fs::symlink_metadata(p).is_ok()
            });
            claimed.insert(destination.clone());

            let (journal, action_log) = batch.writers();
            let pending = journal.begin(NewOperation {
                action: Action::Quarantine,
                source: item.path.clone(),
                destination: destination.clone(),
                origin_seq: None,
                size: item.size,
                digest: item.digest.as_ref().map(hash_to_hex),
            })?;

            let result = self.config.relocator.relocate(&item.path, &destination);
            let display = item.path.to_string_lossy().into_owned();
            let record = match result {
                Ok(()) => {
                    log::debug!(
                        "Quarantined {} -> {}",
                        item.path.display(),
                        destination.display()
                    );
                    journal.resolve(pending, Ok(destination))?
                }
                Err(e) => {
                    log::warn!("Failed to quarantine {}: {}", item.path.display(), e);
                    journal.resolve(pending, Err(e.to_string()))?
                }
            };
            action_log.record(&record);

            let failed = record.reason.is_some();
            tracker.advance(&display, failed);
            if failed {
                report.failed.push(record);
            } else {
                report.bytes_moved += item.size.unwrap_or(0);
                report.moved.push(record);
            }
        }

        tracker.finish(report.interrupted);
        let batch_id = batch.id().to_string();
        batch.log_mut().note(&format!(
            "Batch {} finished: {} moved, {} failed, {} skipped",
            batch_id,
            report.moved.len(),
            report.failed.len(),
            report.skipped
        ));
        batch.seal()?;

        log::info!(
            "Quarantine batch {}: {} moved, {} failed",
            batch_id,
            report.moved.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn preferred_destination(&self, files_dir: &Path, source: &Path) -> PathBuf {
        match self.config.layout {
            Layout::Flat => {
                let name = source
                    .file_name()
                    .map_or_else(|| "unnamed".into(), std::ffi::OsStr::to_os_string);
                files_dir.join(name)
            }
            Layout::Mirror => files_dir.join(mirror_relative(source)),
        }
    }
}

/// Relative form of an absolute path, for recreating it under a directory.
///
/// Root and prefix components are dropped (a Windows drive `C:` becomes the
/// directory `C`); `..` and `.` components are skipped.
#[must_use]
pub fn mirror_relative(path: &Path) -> PathBuf {
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                let text = prefix.as_os_str().to_string_lossy();
                let cleaned: String = text
                    .chars()
                    .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
                    .collect();
                if !cleaned.is_empty() {
                    relative.push(cleaned);
                }
            }
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::CurDir | Component::ParentDir => {}
        }
    }
    relative
}
