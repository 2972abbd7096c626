//! Plain-text rendering of scan, quarantine and undo results.

use std::fmt::Write as _;
use std::io;

use bytesize::ByteSize;

use crate::duplicates::ScanReport;
use crate::quarantine::{BatchStatus, QuarantineReport, UndoReport};

/// Text summary of a scan.
#[derive(Debug)]
pub struct SummaryOutput<'a> {
    report: &'a ScanReport,
    show_groups: bool,
}

impl<'a> SummaryOutput<'a> {
    /// Summarize `report`. Groups are listed by default.
    #[must_use]
    pub fn new(report: &'a ScanReport) -> Self {
        Self {
            report,
            show_groups: true,
        }
    }

    /// Only print totals and warnings.
    #[must_use]
    pub fn totals_only(mut self) -> Self {
        self.show_groups = false;
        self
    }

    /// Render to a string.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let summary = &self.report.summary;

        if self.show_groups {
            for (idx, group) in self.report.groups.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "Group {} ({}, {} files, {})",
                    idx + 1,
                    group.name_key,
                    group.len(),
                    ByteSize(group.size)
                );
                for member in &group.members {
                    let _ = writeln!(out, "  [{}] {}", member.role, member.record.path.display());
                }
            }
            for (idx, cluster) in self.report.clusters.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "Similar {} ({} files, distance <= {})",
                    idx + 1,
                    cluster.members.len(),
                    cluster.max_distance
                );
                for member in &cluster.members {
                    let _ = writeln!(out, "  {}", member.path.display());
                }
            }
            if !self.report.groups.is_empty() || !self.report.clusters.is_empty() {
                out.push('\n');
            }
        }

        let _ = writeln!(
            out,
            "Scanned {} files ({}) in {:.2}s",
            summary.total_files,
            summary.total_size_display(),
            summary.scan_duration.as_secs_f64()
        );
        let _ = writeln!(
            out,
            "{} duplicate groups, {} copies, {} reclaimable",
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.duplicate_size_display()
        );
        if summary.similarity_clusters > 0 {
            let _ = writeln!(out, "{} similarity clusters", summary.similarity_clusters);
        }
        if summary.interrupted {
            let _ = writeln!(out, "Scan interrupted; results are partial");
        }

        if !self.report.warnings.is_empty() {
            let _ = writeln!(out, "{} warnings:", self.report.warnings.len());
            for warning in &self.report.warnings {
                let _ = writeln!(
                    out,
                    "  {} {}: {}",
                    warning.kind,
                    warning.path.display(),
                    warning.message
                );
            }
        }

        out
    }

    /// Write the rendered summary to `writer`.
    ///
    /// # Errors
    ///
    /// Returns the writer's I/O error.
    pub fn write_to<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(self.render().as_bytes())
    }
}

/// One-paragraph description of a quarantine run.
#[must_use]
pub fn quarantine_text(report: &QuarantineReport) -> String {
    let mut out = String::new();
    match &report.batch_dir {
        Some(dir) => {
            let _ = writeln!(
                out,
                "Quarantined {} files ({}) into {}",
                report.moved.len(),
                ByteSize(report.bytes_moved),
                dir.display()
            );
        }
        None => {
            let _ = writeln!(out, "Nothing was quarantined");
        }
    }
    if !report.failed.is_empty() {
        let _ = writeln!(out, "{} moves failed:", report.failed.len());
        for record in &report.failed {
            let _ = writeln!(
                out,
                "  {}: {}",
                record.source.display(),
                record.reason.as_deref().unwrap_or("unknown error")
            );
        }
    }
    if report.skipped > 0 {
        let _ = writeln!(out, "{} files not attempted", report.skipped);
    }
    if report.interrupted {
        let _ = writeln!(out, "Quarantine interrupted");
    }
    out
}

/// One-paragraph description of an undo run.
#[must_use]
pub fn undo_text(report: &UndoReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Batch {}: {} restored, {} failed, {} already restored",
        report.batch_id,
        report.restored.len(),
        report.failed.len(),
        report.already_restored
    );
    if report.renamed > 0 {
        let _ = writeln!(
            out,
            "{} files restored under a new name because the original path was taken",
            report.renamed
        );
    }
    for record in &report.failed {
        let _ = writeln!(
            out,
            "  failed {} -> {}: {}",
            record.source.display(),
            record.destination.display(),
            record.reason.as_deref().unwrap_or("unknown error")
        );
    }
    for record in &report.unresolved {
        let _ = writeln!(
            out,
            "  unresolved #{} {} -> {}",
            record.seq,
            record.source.display(),
            record.destination.display()
        );
    }
    out
}

/// Table of batches under a quarantine root.
#[must_use]
pub fn batches_text(batches: &[BatchStatus]) -> String {
    if batches.is_empty() {
        return "No batches found\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<24} {:>6} {:>6} {:>8} {:>9}  STATE",
        "BATCH", "MOVED", "FAILED", "PENDING", "RESTORED"
    );
    for batch in batches {
        let _ = writeln!(
            out,
            "{:<24} {:>6} {:>6} {:>8} {:>9}  {}",
            batch.id,
            batch.quarantined,
            batch.failed,
            batch.pending,
            batch.restored,
            batch.state()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::{ScanSummary, ScanWarning, WarningKind};
    use std::path::PathBuf;

    #[test]
    fn test_summary_totals_and_warnings() {
        let report = ScanReport {
            warnings: vec![ScanWarning {
                path: PathBuf::from("/locked.bin"),
                kind: WarningKind::Unreadable,
                message: "Permission denied".to_string(),
            }],
            summary: ScanSummary {
                total_files: 3,
                duplicate_groups: 1,
                duplicate_files: 1,
                total_duplicate_size: 2048,
                ..ScanSummary::default()
            },
            ..ScanReport::default()
        };

        let text = SummaryOutput::new(&report).totals_only().render();
        assert!(text.contains("Scanned 3 files"));
        assert!(text.contains("1 duplicate groups, 1 copies"));
        assert!(text.contains("1 warnings:"));
        assert!(text.contains("unreadable /locked.bin: Permission denied"));
        assert!(!text.contains("interrupted"));
    }

    #[test]
    fn test_batches_text_empty() {
        assert_eq!(batches_text(&[]), "No batches found\n");
    }

    #[test]
    fn test_batches_text_row() {
        let status = BatchStatus {
            id: "2026-01-02_03-04-05".to_string(),
            dir: PathBuf::from("/q/2026-01-02_03-04-05"),
            sealed: true,
            quarantined: 2,
            failed: 0,
            pending: 0,
            restored: 2,
            restore_failed: 0,
        };
        let text = batches_text(&[status]);
        assert!(text.lines().nth(1).is_some_and(|l| l.starts_with("2026-01-02_03-04-05")));
        assert!(text.contains("restored"));
    }
}
