//! Directory walker using jwalk for parallel traversal.
//!
//! # Overview
//!
//! [`Walker`] enumerates one root and yields a [`FileRecord`] for every
//! regular file that passes the configured filters. Children are sorted by
//! name, so the output order is stable across runs.
//!
//! # Filters
//!
//! - Minimum size
//! - Include/exclude name masks (glob syntax, matched on the file name only)
//! - Include/exclude extension lists (case-insensitive, dot optional)
//! - Hidden entries (optional)
//! - Symbolic links are skipped unless `follow_symlinks` is set
//!
//! # Example
//!
//! ```no_run
//! use dupeguard::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig::default()
//!     .with_include_exts(vec!["jpg".to_string(), "png".to_string()])
//!     .with_exclude_names(vec!["*.thumb.*".to_string()]);
//!
//! let walker = Walker::new(Path::new("/home/user/Pictures"), config).unwrap();
//! let total: u64 = walker.walk().filter_map(Result::ok).map(|f| f.size).sum();
//! println!("{} bytes of images", total);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use globset::Glob;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::{directory_created, extension_of, FileRecord, ScanError, WalkerConfig};

/// Compiled name masks.
#[derive(Debug)]
struct NameMasks {
    include: Option<Gitignore>,
    exclude: Option<Gitignore>,
}

impl NameMasks {
    fn compile(root: &Path, config: &WalkerConfig) -> Result<Self, ScanError> {
        Ok(Self {
            include: build_matcher(root, &config.include_names)?,
            exclude: build_matcher(root, &config.exclude_names)?,
        })
    }

    fn accepts(&self, name: &str) -> bool {
        let name = Path::new(name);
        if let Some(include) = &self.include {
            if !include.matched(name, false).is_ignore() {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.matched(name, false).is_ignore() {
                return false;
            }
        }
        true
    }
}

pub(crate) fn build_matcher(root: &Path, patterns: &[String]) -> Result<Option<Gitignore>, ScanError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        // add_line tolerates malformed globs such as an unclosed `[`.
        let glob = pattern.trim_start_matches('!').trim_matches('/');
        Glob::new(glob).map_err(|e| ScanError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder
            .add_line(None, pattern)
            .map_err(|e| ScanError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
    }
    let matcher = builder.build().map_err(|e| ScanError::InvalidPattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })?;
    Ok(Some(matcher))
}

/// Normalize an extension filter entry to `.ext` lowercase.
fn normalize_ext(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.').to_lowercase();
    format!(".{}", trimmed)
}

/// Directory walker for one root.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    masks: NameMasks,
    include_exts: Vec<String>,
    exclude_exts: Vec<String>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a walker for `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist, is not a directory, or a
    /// name mask cannot be compiled.
    pub fn new(path: &Path, config: WalkerConfig) -> Result<Self, ScanError> {
        let meta = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ScanError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                ScanError::PermissionDenied(path.to_path_buf())
            }
            _ => ScanError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        if !meta.is_dir() {
            return Err(ScanError::NotADirectory(path.to_path_buf()));
        }
        // Records carry absolute, symlink-free paths so two spellings of one
        // root cannot yield the same file twice.
        let root = std::fs::canonicalize(path).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let masks = NameMasks::compile(&root, &config)?;
        let include_exts = config.include_exts.iter().map(|e| normalize_ext(e)).collect();
        let exclude_exts = config.exclude_exts.iter().map(|e| normalize_ext(e)).collect();

        Ok(Self {
            root,
            config,
            masks,
            include_exts,
            exclude_exts,
            shutdown_flag: None,
        })
    }

    /// Stop yielding entries once `flag` becomes true.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Root being walked.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn passes_ext_filter(&self, path: &Path) -> bool {
        let ext = extension_of(path);
        if !self.include_exts.is_empty() {
            match &ext {
                Some(e) if self.include_exts.contains(e) => {}
                _ => return false,
            }
        }
        match &ext {
            Some(e) => !self.exclude_exts.contains(e),
            None => true,
        }
    }

    /// Walk the tree, yielding candidate records.
    ///
    /// Per-entry errors are yielded as [`ScanError`] values and do not stop
    /// iteration.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(|_depth, _path, _state, children| {
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        // Parent creation times, looked up once per directory.
        let mut dir_times: HashMap<PathBuf, SystemTime> = HashMap::new();

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        return None;
                    }
                    let path = entry.path();

                    if file_type.is_symlink() && !self.config.follow_symlinks {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }

                    let metadata = match std::fs::metadata(&path) {
                        Ok(m) => m,
                        Err(e) => return Some(Err(self.io_error(&path, e))),
                    };
                    if !metadata.is_file() {
                        return None;
                    }

                    let size = metadata.len();
                    if self.config.min_size.is_some_and(|min| size < min) {
                        log::trace!("Below minimum size ({}): {}", size, path.display());
                        return None;
                    }

                    let name = entry.file_name().to_string_lossy();
                    if !self.masks.accepts(&name) {
                        log::trace!("Rejected by name mask: {}", path.display());
                        return None;
                    }
                    if !self.passes_ext_filter(&path) {
                        log::trace!("Rejected by extension filter: {}", path.display());
                        return None;
                    }

                    let parent = path.parent().unwrap_or(&self.root).to_path_buf();
                    let dir_created = *dir_times
                        .entry(parent)
                        .or_insert_with_key(|dir| directory_created(dir));

                    Some(Ok(FileRecord::new(path, size, dir_created)))
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }))
                }
            }
        })
    }

    fn io_error(&self, path: &Path, error: std::io::Error) -> ScanError {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                log::warn!("Permission denied: {}", path.display());
                ScanError::PermissionDenied(path.to_path_buf())
            }
            std::io::ErrorKind::NotFound => {
                log::debug!("Vanished during scan: {}", path.display());
                ScanError::NotFound(path.to_path_buf())
            }
            _ => {
                log::warn!("I/O error for {}: {}", path.display(), error);
                ScanError::Io {
                    path: path.to_path_buf(),
                    source: error,
                }
            }
        }
    }
}
