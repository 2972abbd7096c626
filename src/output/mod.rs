//! Output formatters for scan, quarantine and undo results.
//!
//! - [`csv`]: tabular export for spreadsheets
//! - [`summary`]: plain-text report for the terminal
//!
//! # Example
//!
//! ```no_run
//! use dupeguard::duplicates::DuplicateFinder;
//! use dupeguard::output::SummaryOutput;
//! use std::path::PathBuf;
//!
//! let report = DuplicateFinder::with_defaults()
//!     .find_duplicates(&[PathBuf::from(".")])
//!     .unwrap();
//! print!("{}", SummaryOutput::new(&report).render());
//! ```

pub mod csv;
pub mod summary;

pub use csv::{CsvOutput, CsvOutputError};
pub use summary::{batches_text, quarantine_text, undo_text, SummaryOutput};
