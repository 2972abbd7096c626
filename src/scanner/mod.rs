//! Scanner module for file enumeration and content fingerprinting.
//!
//! This module provides functionality for:
//! - Directory walking with name/extension/size filters using jwalk
//! - Streaming BLAKE3 content digests
//! - Perceptual fingerprints for images and video
//! - The parallel hashing pipeline that ties them together
//!
//! # Architecture
//!
//! - [`walker`]: Directory traversal and candidate discovery
//! - [`hasher`]: BLAKE3 file hashing (streaming, fixed-size chunks)
//! - [`perceptual`]: Image/video fingerprints compared by Hamming distance
//! - [`pipeline`]: Bounded worker pool with progress and cancellation
//!
//! # Example
//!
//! ```no_run
//! use dupeguard::scanner::{HashPipeline, PipelineConfig, Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default().with_min_size(1024)).unwrap();
//! let records = walker.walk().filter_map(Result::ok).collect();
//!
//! let outcome = HashPipeline::new(PipelineConfig::default()).run(records);
//! println!("{} hashed, {} unreadable", outcome.hashed.len(), outcome.failures.len());
//! ```

pub mod hasher;
pub mod perceptual;
pub mod pipeline;
pub mod walker;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use hasher::{hash_to_hex, hex_to_hash, Hash, Hasher, CHUNK_SIZE};
pub use perceptual::{
    Capabilities, Fingerprint, FingerprintStrategy, MediaKind, PerceptualAlgorithm,
    PerceptualError, PerceptualHasher,
};
pub use pipeline::{HashFailure, HashOutcome, HashPipeline, HashedFile, PipelineConfig};
pub use walker::Walker;

/// A candidate file produced by the enumerator.
///
/// Identity is the path. The record itself is never mutated; hashing wraps
/// it into a [`HashedFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Creation time of the parent directory (modification time when the
    /// platform cannot report a birth time)
    pub dir_created: SystemTime,
    /// File name as found on disk
    pub name: String,
}

impl FileRecord {
    /// Create a new FileRecord. The name is taken from the last path component.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, dir_created: SystemTime) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            size,
            dir_created,
            name,
        }
    }

    /// Lowercased extension including the leading dot (e.g. `.png`).
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }
}

/// Lowercased extension of a path, including the leading dot.
#[must_use]
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
}

/// Creation time of a directory, falling back to its modification time.
///
/// Returns `UNIX_EPOCH` if neither is available so that unreadable parents
/// sort first rather than aborting the scan.
#[must_use]
pub fn directory_created(dir: &Path) -> SystemTime {
    match std::fs::metadata(dir) {
        Ok(meta) => meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH),
        Err(e) => {
            log::debug!("Cannot stat directory {}: {}", dir.display(), e);
            SystemTime::UNIX_EPOCH
        }
    }
}

/// Configuration for directory walking.
///
/// Name masks are glob patterns matched against the file name only.
/// Extensions are compared case-insensitively and may be given with or
/// without the leading dot.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links. When false, symlinked files are skipped.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Minimum file size to include (in bytes).
    pub min_size: Option<u64>,

    /// If non-empty, a file name must match at least one of these globs.
    pub include_names: Vec<String>,

    /// A file name matching any of these globs is skipped.
    pub exclude_names: Vec<String>,

    /// If non-empty, only these extensions are accepted.
    pub include_exts: Vec<String>,

    /// Extensions that are always skipped.
    pub exclude_exts: Vec<String>,
}

impl WalkerConfig {
    /// Set the minimum file size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = Some(min_size);
        self
    }

    /// Set the include name masks.
    #[must_use]
    pub fn with_include_names(mut self, patterns: Vec<String>) -> Self {
        self.include_names = patterns;
        self
    }

    /// Set the exclude name masks.
    #[must_use]
    pub fn with_exclude_names(mut self, patterns: Vec<String>) -> Self {
        self.exclude_names = patterns;
        self
    }

    /// Set the accepted extensions.
    #[must_use]
    pub fn with_include_exts(mut self, exts: Vec<String>) -> Self {
        self.include_exts = exts;
        self
    }

    /// Set the rejected extensions.
    #[must_use]
    pub fn with_exclude_exts(mut self, exts: Vec<String>) -> Self {
        self.exclude_exts = exts;
        self
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A name mask could not be compiled.
    #[error("Invalid name pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Matcher error message
        message: String,
    },

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// A file that could not be read while hashing (`UnreadableFile`).
#[derive(thiserror::Error, Debug, Clone)]
pub enum HashError {
    /// The file vanished between enumeration and hashing.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Any other read failure (locked, I/O error).
    #[error("I/O error for {path}: {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error message
        message: String,
    },
}

impl HashError {
    /// Classify an I/O error raised while reading `path`.
    #[must_use]
    pub fn from_io(path: &Path, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }

    /// The path that failed.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::Io { path: p, .. } => p,
        }
    }
}
