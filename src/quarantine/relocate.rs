//! Moving files between locations.
//!
//! Quarantine and undo call a single [`Relocator::relocate`] operation.
//! [`AutoRelocator`] renames within a volume and falls back to
//! copy-then-delete when the rename fails because source and destination
//! live on different devices.
//!
//! No implementation ever overwrites an existing destination.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// A failed move (`MoveFailed`).
#[derive(Error, Debug)]
pub enum RelocateError {
    /// The file to move does not exist.
    #[error("Source not found: {0}")]
    SourceMissing(PathBuf),

    /// Something already exists at the destination.
    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// Permission was denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Copy succeeded but the copied size differs from the source.
    #[error("Copy of {path} is incomplete ({copied} of {expected} bytes)")]
    IncompleteCopy {
        /// Source path
        path: PathBuf,
        /// Bytes expected
        expected: u64,
        /// Bytes written
        copied: u64,
    },

    /// Any other I/O failure.
    #[error("Failed to move {source_path} to {destination}: {error}")]
    Io {
        /// Source path
        source_path: PathBuf,
        /// Destination path
        destination: PathBuf,
        /// The underlying I/O error
        #[source]
        error: std::io::Error,
    },
}

impl RelocateError {
    fn from_io(src: &Path, dst: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            ErrorKind::NotFound if !src.exists() => Self::SourceMissing(src.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(src.to_path_buf()),
            ErrorKind::AlreadyExists => Self::DestinationExists(dst.to_path_buf()),
            _ => Self::Io {
                source_path: src.to_path_buf(),
                destination: dst.to_path_buf(),
                error,
            },
        }
    }
}

/// Moves a file from `src` to `dst`.
pub trait Relocator: Send + Sync {
    /// Move `src` to `dst`, creating `dst`'s parent directories.
    ///
    /// # Errors
    ///
    /// Returns a [`RelocateError`] if the source is missing, the destination
    /// exists, or the move fails. On error the source is left in place.
    fn relocate(&self, src: &Path, dst: &Path) -> Result<(), RelocateError>;
}

fn check_paths(src: &Path, dst: &Path) -> Result<(), RelocateError> {
    if std::fs::symlink_metadata(src).is_err() {
        return Err(RelocateError::SourceMissing(src.to_path_buf()));
    }
    if std::fs::symlink_metadata(dst).is_ok() {
        return Err(RelocateError::DestinationExists(dst.to_path_buf()));
    }
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RelocateError::from_io(src, dst, e))?;
    }
    Ok(())
}

/// Same-volume rename.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameRelocator;

impl Relocator for RenameRelocator {
    fn relocate(&self, src: &Path, dst: &Path) -> Result<(), RelocateError> {
        check_paths(src, dst)?;
        std::fs::rename(src, dst).map_err(|e| RelocateError::from_io(src, dst, e))
    }
}

/// Copy to the destination, verify, then delete the source.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyDeleteRelocator;

impl Relocator for CopyDeleteRelocator {
    fn relocate(&self, src: &Path, dst: &Path) -> Result<(), RelocateError> {
        check_paths(src, dst)?;
        copy_then_delete(src, dst)
    }
}

fn copy_then_delete(src: &Path, dst: &Path) -> Result<(), RelocateError> {
    let expected = std::fs::metadata(src)
        .map_err(|e| RelocateError::from_io(src, dst, e))?
        .len();
    let copied = match std::fs::copy(src, dst) {
        Ok(n) => n,
        Err(e) => {
            let _ = std::fs::remove_file(dst);
            return Err(RelocateError::from_io(src, dst, e));
        }
    };
    if copied != expected {
        let _ = std::fs::remove_file(dst);
        return Err(RelocateError::IncompleteCopy {
            path: src.to_path_buf(),
            expected,
            copied,
        });
    }
    if let Err(e) = std::fs::remove_file(src) {
        // Leave exactly one copy behind.
        let _ = std::fs::remove_file(dst);
        return Err(RelocateError::from_io(src, dst, e));
    }
    Ok(())
}

/// Whether a rename failed because the paths are on different devices.
#[must_use]
pub fn is_cross_device_error(err: &std::io::Error) -> bool {
    match err.raw_os_error() {
        Some(18) if cfg!(unix) => true,    // EXDEV
        Some(17) if cfg!(windows) => true, // ERROR_NOT_SAME_DEVICE
        _ => false,
    }
}

/// Rename, falling back to copy-then-delete across devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoRelocator;

impl Relocator for AutoRelocator {
    fn relocate(&self, src: &Path, dst: &Path) -> Result<(), RelocateError> {
        check_paths(src, dst)?;
        match std::fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(e) if is_cross_device_error(&e) => {
                log::debug!(
                    "Cross-device move, copying {} to {}",
                    src.display(),
                    dst.display()
                );
                copy_then_delete(src, dst)
            }
            Err(e) => Err(RelocateError::from_io(src, dst, e)),
        }
    }
}
