//! Reversible quarantine: batches, journal, relocation and undo.
//!
//! # Architecture
//!
//! - [`journal`]: append-only, crash-detectable operation journal
//! - [`actionlog`]: plain-text mirror for operators
//! - [`batch`]: batch directories, sealing, listing and inspection
//! - [`relocate`]: rename or copy-then-delete behind one operation
//! - [`manager`]: moves approved copies into a batch
//! - [`undo`]: restores a batch in reverse order
//!
//! # Collision naming
//!
//! Destinations never overwrite anything. When the preferred path is taken
//! the first free `stem (N).ext` is used for quarantine, and the first free
//! `stem (restored N).ext` for undo, with N counting from 1.

pub mod actionlog;
pub mod batch;
pub mod journal;
pub mod manager;
pub mod relocate;
pub mod undo;

use std::path::{Path, PathBuf};

pub use actionlog::ActionLog;
pub use batch::{inspect, latest_batch, list_batches, Batch, BatchError, BatchStatus};
pub use journal::{read_journal, Action, Journal, JournalError, OperationRecord, Outcome};
pub use manager::{Layout, QuarantineConfig, QuarantineError, QuarantineItem, QuarantineManager, QuarantineReport};
pub use relocate::{AutoRelocator, CopyDeleteRelocator, RelocateError, Relocator, RenameRelocator};
pub use undo::{UndoEngine, UndoError, UndoReport};

/// Suffix scheme used when a destination is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixStyle {
    /// `stem (N).ext`
    Numbered,
    /// `stem (restored N).ext`
    Restored,
}

impl SuffixStyle {
    fn label(self, n: u32) -> String {
        match self {
            Self::Numbered => format!("({})", n),
            Self::Restored => format!("(restored {})", n),
        }
    }
}

/// Name `path` would have with suffix number `n`.
#[must_use]
pub fn suffixed(path: &Path, style: SuffixStyle, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{} {}.{}", stem, style.label(n), ext.to_string_lossy()),
        None => format!("{} {}", stem, style.label(n)),
    };
    path.with_file_name(name)
}

/// `preferred` if free, otherwise the first free suffixed variant.
pub fn free_path(
    preferred: &Path,
    style: SuffixStyle,
    is_taken: impl Fn(&Path) -> bool,
) -> PathBuf {
    if !is_taken(preferred) {
        return preferred.to_path_buf();
    }
    let mut n = 1;
    loop {
        let candidate = suffixed(preferred, style, n);
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_suffixed() {
        let p = Path::new("/q/files/doc.txt");
        assert_eq!(
            suffixed(p, SuffixStyle::Numbered, 2),
            PathBuf::from("/q/files/doc (2).txt")
        );
        assert_eq!(
            suffixed(p, SuffixStyle::Restored, 1),
            PathBuf::from("/q/files/doc (restored 1).txt")
        );
        assert_eq!(
            suffixed(Path::new("/q/README"), SuffixStyle::Numbered, 1),
            PathBuf::from("/q/README (1)")
        );
        assert_eq!(
            suffixed(Path::new("/q/archive.tar.gz"), SuffixStyle::Numbered, 1),
            PathBuf::from("/q/archive.tar (1).gz")
        );
    }

    #[test]
    fn test_free_path_skips_taken() {
        let taken: HashSet<PathBuf> = [
            PathBuf::from("/q/doc.txt"),
            PathBuf::from("/q/doc (1).txt"),
        ]
        .into_iter()
        .collect();
        let free = free_path(Path::new("/q/doc.txt"), SuffixStyle::Numbered, |p| {
            taken.contains(p)
        });
        assert_eq!(free, PathBuf::from("/q/doc (2).txt"));

        let free = free_path(Path::new("/q/new.txt"), SuffixStyle::Numbered, |p| {
            taken.contains(p)
        });
        assert_eq!(free, PathBuf::from("/q/new.txt"));
    }
}
