//! Scan orchestration: enumerate, hash, classify.
//!
//! # Overview
//!
//! [`DuplicateFinder`] runs the whole detection pass:
//! 1. **Walk** every root and collect candidate records
//! 2. **Size pre-filter**: a file whose size no other candidate shares cannot
//!    have an exact duplicate, so it is only hashed when it is eligible for a
//!    perceptual fingerprint
//! 3. **Hash** the remaining candidates on the parallel pipeline
//! 4. **Classify** into exact groups and, optionally, similarity clusters
//!
//! Per-file problems become [`ScanWarning`]s; they never abort the scan.
//!
//! # Example
//!
//! ```no_run
//! use dupeguard::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::{Path, PathBuf};
//!
//! let finder = DuplicateFinder::new(FinderConfig::default().with_workers(4));
//! let report = finder.find_duplicates(&[PathBuf::from("/some/path")]).unwrap();
//!
//! println!("Found {} duplicate groups", report.summary.duplicate_groups);
//! println!("Duplicate size: {}", report.summary.duplicate_size_display());
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use serde::Serialize;

use super::groups::{classify, total_duplicate_size, DuplicateGroup, NamePolicy};
use super::similarity::{cluster_similar, SimilarityCluster};
use crate::progress::ProgressListener;
use crate::scanner::{
    FileRecord, FingerprintStrategy, HashPipeline, PipelineConfig, ScanError, Walker,
    WalkerConfig,
};

/// Configuration for the duplicate finder.
#[derive(Clone, Default)]
pub struct FinderConfig {
    /// Enumeration filters.
    pub walker_config: WalkerConfig,
    /// Hashing workers (`0` = available parallelism).
    pub workers: usize,
    /// Digest-only or digest plus perceptual fingerprint.
    pub strategy: FingerprintStrategy,
    /// Hamming distance threshold for similarity clusters.
    pub similarity_threshold: u32,
    /// Name comparison policy for exact grouping.
    pub name_policy: NamePolicy,
    /// Cooperative cancellation flag.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Progress listeners for the hashing phase.
    pub listeners: Vec<Arc<dyn ProgressListener>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("walker_config", &self.walker_config)
            .field("workers", &self.workers)
            .field("strategy", &self.strategy)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("name_policy", &self.name_policy)
            .field("shutdown_flag", &self.shutdown_flag)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl FinderConfig {
    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set the hashing worker count.
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

    /// Set the similarity threshold.
    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: u32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the name comparison policy.
    #[must_use]
    pub fn with_name_policy(mut self, policy: NamePolicy) -> Self {
        self.name_policy = policy;
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Add a progress listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Kind of a per-file warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Could not be enumerated
    Enumeration,
    /// Could not be read for hashing; excluded from grouping
    Unreadable,
    /// Perceptual fingerprint failed; digest still used
    Fingerprint,
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enumeration => write!(f, "enumeration"),
            Self::Unreadable => write!(f, "unreadable"),
            Self::Fingerprint => write!(f, "fingerprint"),
        }
    }
}

/// A per-file problem surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    /// Path the warning is about
    pub path: PathBuf,
    /// What went wrong
    pub kind: WarningKind,
    /// Human-readable detail
    pub message: String,
}

/// Statistics from a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    /// Files accepted by the enumerator
    pub total_files: usize,
    /// Total size of accepted files
    pub total_size: u64,
    /// Files skipped by the size pre-filter
    pub eliminated_by_size: usize,
    /// Files successfully hashed
    pub hashed_files: usize,
    /// Exact duplicate groups
    pub duplicate_groups: usize,
    /// Copy-flagged members across all groups
    pub duplicate_files: usize,
    /// Bytes held by copies, each path counted once
    pub total_duplicate_size: u64,
    /// Similarity clusters found
    pub similarity_clusters: usize,
    /// Wall-clock duration
    pub scan_duration: Duration,
    /// Whether cancellation cut the hashing phase short
    pub interrupted: bool,
}

impl ScanSummary {
    /// Duplicate size as a human-readable string.
    #[must_use]
    pub fn duplicate_size_display(&self) -> String {
        ByteSize(self.total_duplicate_size).to_string()
    }

    /// Total size as a human-readable string.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        ByteSize(self.total_size).to_string()
    }
}

/// Everything a scan produces.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Exact duplicate groups
    pub groups: Vec<DuplicateGroup>,
    /// Advisory similarity clusters
    pub clusters: Vec<SimilarityCluster>,
    /// Per-file warnings, ordered by path
    pub warnings: Vec<ScanWarning>,
    /// Statistics
    pub summary: ScanSummary,
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The scan was interrupted before hashing began.
    #[error("Scan interrupted by user")]
    Interrupted,

    /// A root does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A root is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// No roots were given.
    #[error("No scan roots given")]
    NoRoots,

    /// A root could not be opened or a filter could not be compiled.
    #[error(transparent)]
    ScanError(ScanError),
}

impl From<ScanError> for FinderError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::NotFound(p) => Self::PathNotFound(p),
            ScanError::NotADirectory(p) => Self::NotADirectory(p),
            other => Self::ScanError(other),
        }
    }
}

/// Duplicate finder that orchestrates enumeration, hashing and grouping.
#[derive(Debug)]
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a new duplicate finder.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Create a finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    fn file_identity(&self, path: &Path) -> PathBuf {
        if self.config.walker_config.follow_symlinks {
            std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
        } else {
            path.to_path_buf()
        }
    }

    /// Scan `roots` for duplicates.
    ///
    /// Cancellation during hashing still returns `Ok`, with groups built from
    /// the digests computed so far and `summary.interrupted` set.
    ///
    /// # Errors
    ///
    /// Returns `FinderError` if a root is missing or not a directory, a name
    /// mask is invalid, or cancellation arrives before hashing starts.
    pub fn find_duplicates(&self, roots: &[PathBuf]) -> Result<ScanReport, FinderError> {
        if roots.is_empty() {
            return Err(FinderError::NoRoots);
        }
        let start_time = Instant::now();

        let walkers = roots
            .iter()
            .map(|root| {
                let mut walker = Walker::new(root, self.config.walker_config.clone())?;
                if let Some(flag) = &self.config.shutdown_flag {
                    walker = walker.with_shutdown_flag(flag.clone());
                }
                Ok(walker)
            })
            .collect::<Result<Vec<_>, FinderError>>()?;

        let mut records = Vec::new();
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();

        for walker in &walkers {
            log::info!("Walking {}", walker.root().display());
            for result in walker.walk() {
                match result {
                    Ok(record) => {
                        // Overlapping roots, or symlinks when followed, can
                        // reach one file twice.
                        if seen.insert(self.file_identity(&record.path)) {
                            records.push(record);
                        }
                    }
                    Err(e) => warnings.push(enumeration_warning(&e)),
                }
            }
        }

        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        let mut report = self.find_duplicates_in(records);
        warnings.append(&mut report.warnings);
        warnings.sort_by(|a, b| a.path.cmp(&b.path));
        report.warnings = warnings;
        report.summary.scan_duration = start_time.elapsed();

        log::info!(
            "Scan complete in {:.2?}: {} groups, {} copies, {}",
            report.summary.scan_duration,
            report.summary.duplicate_groups,
            report.summary.duplicate_files,
            report.summary.duplicate_size_display()
        );
        Ok(report)
    }

    /// Hash and classify records that were enumerated elsewhere.
    #[must_use]
    pub fn find_duplicates_in(&self, records: Vec<FileRecord>) -> ScanReport {
        let start_time = Instant::now();
        let mut summary = ScanSummary {
            total_files: records.len(),
            total_size: records.iter().map(|r| r.size).sum(),
            ..ScanSummary::default()
        };

        let (candidates, eliminated) = self.size_prefilter(records);
        summary.eliminated_by_size = eliminated;
        log::info!(
            "Size pre-filter: {} candidates, {} eliminated",
            candidates.len(),
            eliminated
        );

        let mut pipeline_config = PipelineConfig::default()
            .with_workers(self.config.workers)
            .with_strategy(self.config.strategy.clone());
        if let Some(flag) = &self.config.shutdown_flag {
            pipeline_config = pipeline_config.with_cancel_flag(flag.clone());
        }
        for listener in &self.config.listeners {
            pipeline_config = pipeline_config.with_listener(listener.clone());
        }

        let outcome = HashPipeline::new(pipeline_config).run(candidates);

        let mut warnings: Vec<ScanWarning> = outcome
            .failures
            .iter()
            .map(|f| ScanWarning {
                path: f.record.path.clone(),
                kind: WarningKind::Unreadable,
                message: f.error.to_string(),
            })
            .collect();
        warnings.extend(
            outcome
                .fingerprint_warnings
                .iter()
                .map(|(path, message)| ScanWarning {
                    path: path.clone(),
                    kind: WarningKind::Fingerprint,
                    message: message.clone(),
                }),
        );
        warnings.sort_by(|a, b| a.path.cmp(&b.path));

        let groups = classify(&outcome.hashed, self.config.name_policy);
        let clusters = if self.config.strategy.is_perceptual() {
            cluster_similar(&outcome.hashed, self.config.similarity_threshold)
        } else {
            Vec::new()
        };

        summary.hashed_files = outcome.hashed.len();
        summary.duplicate_groups = groups.len();
        summary.duplicate_files = groups.iter().map(|g| g.copies().count()).sum();
        summary.total_duplicate_size = total_duplicate_size(&groups);
        summary.similarity_clusters = clusters.len();
        summary.interrupted = outcome.interrupted;
        summary.scan_duration = start_time.elapsed();

        ScanReport {
            groups,
            clusters,
            warnings,
            summary,
        }
    }

    /// Drop records that cannot take part in any group.
    fn size_prefilter(&self, records: Vec<FileRecord>) -> (Vec<FileRecord>, usize) {
        let mut by_size: HashMap<u64, usize> = HashMap::new();
        for record in &records {
            *by_size.entry(record.size).or_default() += 1;
        }

        let total = records.len();
        let kept: Vec<FileRecord> = records
            .into_iter()
            .filter(|r| {
                by_size.get(&r.size).copied().unwrap_or(0) > 1
                    || self.config.strategy.wants_fingerprint(&r.path)
            })
            .collect();
        let eliminated = total - kept.len();
        (kept, eliminated)
    }
}

fn enumeration_warning(err: &ScanError) -> ScanWarning {
    let path = match err {
        ScanError::PermissionDenied(p) | ScanError::NotFound(p) | ScanError::NotADirectory(p) => {
            p.clone()
        }
        ScanError::Io { path, .. } => path.clone(),
        ScanError::InvalidPattern { .. } => PathBuf::new(),
    };
    ScanWarning {
        path,
        kind: WarningKind::Enumeration,
        message: err.to_string(),
    }
}
