//! Plain-text action log for operators.
//!
//! Mirrors every journal resolution plus batch lifecycle notes. Not read
//! back by the program; undo relies on the journal alone.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};

use super::journal::{OperationRecord, Outcome};

/// File name of the action log inside a batch directory.
pub const ACTION_LOG_FILE: &str = "actions.log";

/// Append-only human-readable log.
#[derive(Debug)]
pub struct ActionLog {
    path: PathBuf,
    file: File,
}

impl ActionLog {
    /// Open (creating if needed) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a free-form note.
    pub fn note(&mut self, message: &str) {
        let line = format!("[{}] {}\n", now(), message);
        self.write_line(&line);
    }

    /// Append a line describing a journal record.
    pub fn record(&mut self, record: &OperationRecord) {
        self.write_line(&format_record(record));
    }

    fn write_line(&mut self, line: &str) {
        // The log is informational; the journal already holds the truth.
        if let Err(e) = self
            .file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
        {
            log::warn!("Failed to write action log {}: {}", self.path.display(), e);
        }
    }
}

fn now() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Render one record as a log line.
#[must_use]
pub fn format_record(record: &OperationRecord) -> String {
    let when = record
        .timestamp
        .with_timezone(&Local)
        .to_rfc3339_opts(SecondsFormat::Secs, false);
    let mut line = format!(
        "[{}] #{} {} {}: {} -> {}",
        when,
        record.seq,
        record.action.to_string().to_uppercase(),
        record.outcome,
        record.source.display(),
        record.destination.display()
    );
    if let Some(size) = record.size {
        line.push_str(&format!(" | {} bytes", size));
    }
    if let Some(digest) = &record.digest {
        line.push_str(&format!(" | {}", digest));
    }
    if let Some(origin) = record.origin_seq {
        line.push_str(&format!(" | reverses #{}", origin));
    }
    if record.outcome == Outcome::Failed {
        if let Some(reason) = &record.reason {
            line.push_str(&format!(" | {}", reason));
        }
    }
    line.push('\n');
    line
}
