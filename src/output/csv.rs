//! CSV export of scan results.
//!
//! One row per file. Exact groups come first, then similarity clusters.
//!
//! # Columns
//!
//! - `group`: 1-based index, numbered separately for each kind
//! - `kind`: `exact` or `similar`
//! - `role`: `original`, `copy`, or `similar` for cluster members
//! - `path`: absolute path
//! - `size`: size in bytes
//! - `digest`: BLAKE3 digest (hex); empty for cluster members
//!
//! # Example
//!
//! ```no_run
//! use dupeguard::duplicates::DuplicateFinder;
//! use dupeguard::output::csv::CsvOutput;
//! use std::path::PathBuf;
//!
//! let report = DuplicateFinder::with_defaults()
//!     .find_duplicates(&[PathBuf::from(".")])
//!     .unwrap();
//! CsvOutput::new(&report.groups, &report.clusters)
//!     .write_to(std::io::stdout())
//!     .unwrap();
//! ```

use std::io;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::duplicates::{DuplicateGroup, SimilarityCluster};

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    group: usize,
    kind: &'static str,
    role: String,
    path: String,
    size: u64,
    digest: &'a str,
}

/// CSV output formatter.
#[derive(Debug)]
pub struct CsvOutput<'a> {
    groups: &'a [DuplicateGroup],
    clusters: &'a [SimilarityCluster],
}

impl<'a> CsvOutput<'a> {
    /// Create a formatter over groups and clusters.
    #[must_use]
    pub fn new(groups: &'a [DuplicateGroup], clusters: &'a [SimilarityCluster]) -> Self {
        Self { groups, clusters }
    }

    /// Write the CSV to `writer`.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        for (idx, group) in self.groups.iter().enumerate() {
            let digest = group.digest_hex();
            for member in &group.members {
                csv_writer.serialize(CsvRow {
                    group: idx + 1,
                    kind: "exact",
                    role: member.role.to_string(),
                    path: member.record.path.to_string_lossy().into_owned(),
                    size: member.record.size,
                    digest: &digest,
                })?;
            }
        }

        for (idx, cluster) in self.clusters.iter().enumerate() {
            for member in &cluster.members {
                csv_writer.serialize(CsvRow {
                    group: idx + 1,
                    kind: "similar",
                    role: "similar".to_string(),
                    path: member.path.to_string_lossy().into_owned(),
                    size: member.size,
                    digest: "",
                })?;
            }
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Write the CSV to a file, replacing it.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if the file cannot be created or written.
    pub fn write_file(&self, path: &Path) -> Result<(), CsvOutputError> {
        let file = std::fs::File::create(path)?;
        self.write_to(io::BufWriter::new(file))
    }

    /// Render the CSV as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
