//! Parallel hashing pipeline.
//!
//! # Overview
//!
//! [`HashPipeline`] digests every candidate on a bounded rayon pool sized to
//! the available CPU parallelism. Each worker takes one file and finishes it
//! before taking the next. Completion order is arbitrary; results are sorted
//! by path before they are returned, so grouping never depends on timing.
//!
//! # Failures and cancellation
//!
//! - A file that cannot be read becomes a [`HashFailure`] and is excluded
//!   from the hashed set. The pipeline keeps going.
//! - A fingerprint failure is only a warning; the digest is kept.
//! - The cancellation flag is checked before each file starts. Files that
//!   are already being read run to completion and their digests are kept.
//!
//! # Example
//!
//! ```no_run
//! use dupeguard::scanner::{FileRecord, HashPipeline, PipelineConfig};
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let files = vec![FileRecord::new(PathBuf::from("/tmp/a.txt"), 3, SystemTime::now())];
//! let outcome = HashPipeline::new(PipelineConfig::default()).run(files);
//! println!("{} hashed, {} failed", outcome.hashed.len(), outcome.failures.len());
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::perceptual::{Fingerprint, FingerprintStrategy};
use super::{FileRecord, Hash, HashError, Hasher};
use crate::progress::{Phase, ProgressListener, ProgressTracker};

/// Threshold for logging large files.
const LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Configuration for the hashing pipeline.
#[derive(Clone, Default)]
pub struct PipelineConfig {
    /// Worker count. `0` uses the available CPU parallelism.
    pub workers: usize,
    /// Digest-only or digest plus perceptual fingerprint.
    pub strategy: FingerprintStrategy,
    /// Cooperative cancellation flag.
    pub cancel_flag: Option<Arc<AtomicBool>>,
    /// Progress listeners.
    pub listeners: Vec<Arc<dyn ProgressListener>>,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("workers", &self.workers)
            .field("strategy", &self.strategy)
            .field("cancel_flag", &self.cancel_flag)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl PipelineConfig {
    /// Set the worker count (`0` = available parallelism).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the fingerprint strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: FingerprintStrategy) -> Self {
        self.strategy = strategy;
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

    /// Effective number of workers.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// A successfully digested file.
#[derive(Debug, Clone)]
pub struct HashedFile {
    /// The enumerated record
    pub record: FileRecord,
    /// BLAKE3 content digest
    pub digest: Hash,
    /// Perceptual fingerprint, when the strategy applied and succeeded
    pub fingerprint: Option<Fingerprint>,
}

/// A file excluded from grouping because it could not be read.
#[derive(Debug, Clone)]
pub struct HashFailure {
    /// The record that failed
    pub record: FileRecord,
    /// Why it failed
    pub error: HashError,
}

/// Result of a pipeline run.
#[derive(Debug, Default)]
pub struct HashOutcome {
    /// Digested files, sorted by path
    pub hashed: Vec<HashedFile>,
    /// Unreadable files, sorted by path
    pub failures: Vec<HashFailure>,
    /// Non-fatal fingerprint problems (path, message)
    pub fingerprint_warnings: Vec<(PathBuf, String)>,
    /// Files never started because of cancellation
    pub skipped: usize,
    /// Total bytes digested
    pub bytes_hashed: u64,
    /// Whether cancellation stopped the run early
    pub interrupted: bool,
}

enum Unit {
    Hashed(HashedFile, Option<String>),
    Failed(HashFailure),
    Skipped,
}

/// Bounded, cancellable hashing pipeline.
#[derive(Debug)]
pub struct HashPipeline {
    config: PipelineConfig,
    hasher: Hasher,
}

impl HashPipeline {
    /// Create a pipeline with the given configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            hasher: Hasher::new(),
        }
    }

    /// Replace the hasher (e.g. a different chunk size).
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Digest (and optionally fingerprint) every candidate.
    #[must_use]
    pub fn run(&self, files: Vec<FileRecord>) -> HashOutcome {
        let tracker = ProgressTracker::start(
            Phase::Hashing,
            files.len(),
            self.config.listeners.clone(),
        );

        if files.is_empty() {
            tracker.finish(false);
            return HashOutcome::default();
        }

        let workers = self.config.effective_workers();
        log::info!("Hashing {} files with {} workers", files.len(), workers);

        let work = || -> Vec<Unit> {
            files
                .into_par_iter()
                .with_max_len(1)
                .map(|record| self.process(record, &tracker))
                .collect()
        };

        let units = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("dupeguard-hash-{i}"))
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(e) => {
                log::warn!(
                    "Failed to create hashing pool ({}), using global pool with {} threads",
                    e,
                    rayon::current_num_threads()
                );
                work()
            }
        };

        let mut outcome = HashOutcome::default();
        for unit in units {
            match unit {
                Unit::Hashed(file, warning) => {
                    if let Some(message) = warning {
                        outcome
                            .fingerprint_warnings
                            .push((file.record.path.clone(), message));
                    }
                    outcome.bytes_hashed += file.record.size;
                    outcome.hashed.push(file);
                }
                Unit::Failed(failure) => outcome.failures.push(failure),
                Unit::Skipped => outcome.skipped += 1,
            }
        }
        outcome.interrupted = outcome.skipped > 0;
        outcome.hashed.sort_by(|a, b| a.record.path.cmp(&b.record.path));
        outcome.failures.sort_by(|a, b| a.record.path.cmp(&b.record.path));
        outcome.fingerprint_warnings.sort();

        tracker.finish(outcome.interrupted);

        log::info!(
            "Hashing complete: {} hashed, {} failed, {} skipped",
            outcome.hashed.len(),
            outcome.failures.len(),
            outcome.skipped
        );

        outcome
    }

    fn process(&self, record: FileRecord, tracker: &ProgressTracker) -> Unit {
        if self.config.is_cancelled() {
            log::trace!("Cancelled before start: {}", record.path.display());
            return Unit::Skipped;
        }

        if record.size > LARGE_FILE_THRESHOLD {
            log::debug!(
                "Hashing large file ({} MB): {}",
                record.size / (1024 * 1024),
                record.path.display()
            );
        }

        let display = record.path.to_string_lossy().into_owned();
        let digest = match self.hasher.full_hash(&record.path) {
            Ok(digest) => digest,
            Err(error) => {
                log::warn!("Skipping unreadable file: {}", error);
                tracker.advance(&display, true);
                return Unit::Failed(HashFailure { record, error });
            }
        };

        let (fingerprint, warning) = match self.config.strategy.fingerprint(&record.path) {
            None => (None, None),
            Some(Ok(fp)) => (Some(fp), None),
            Some(Err(e)) => {
                log::warn!("No perceptual fingerprint: {}", e);
                (None, Some(e.to_string()))
            }
        };

        tracker.advance(&display, false);
        Unit::Hashed(
            HashedFile {
                record,
                digest,
                fingerprint,
            },
            warning,
        )
    }
}
