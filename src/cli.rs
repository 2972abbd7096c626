//! Command-line interface definitions for dupeguard.
//!
//! Global options (verbosity, config file, error format) apply to every
//! subcommand. Scan options left unset fall through to the configuration
//! file and environment.
//!
//! # Example
//!
//! ```bash
//! # Report duplicates under two roots
//! dupeguard scan ~/Pictures ~/Backup
//!
//! # Export a CSV report and quarantine copies without prompting
//! dupeguard scan ~/Pictures --csv report.csv --quarantine --yes
//!
//! # Restore a batch, or the newest one when none is named
//! dupeguard undo ~/Duplicate_Quarantine/2026-10-16_09-30-00
//! dupeguard undo
//!
//! # List batches under the default quarantine root
//! dupeguard batches
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::quarantine::Layout;
use crate::scanner::PerceptualAlgorithm;

/// Duplicate file finder with reversible, journaled quarantine.
///
/// Files are duplicates when both their name and BLAKE3 digest match. One
/// original per group is kept; copies can be moved into a quarantine batch
/// and restored later with `undo`.
#[derive(Debug, Parser)]
#[command(name = "dupeguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan directories for duplicate files
    Scan(ScanArgs),
    /// Restore every file of a quarantine batch
    Undo(UndoArgs),
    /// List quarantine batches and their status
    Batches(BatchesArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directories to scan
    #[arg(value_name = "ROOT", required = true)]
    pub roots: Vec<PathBuf>,

    /// Minimum file size to consider (e.g., 1KB, 1MB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Only consider file names matching this glob (repeatable)
    #[arg(long = "include", value_name = "GLOB")]
    pub include_names: Vec<String>,

    /// Skip file names matching this glob (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude_names: Vec<String>,

    /// Only consider these extensions (repeatable, case-insensitive)
    #[arg(long = "ext", value_name = "EXT")]
    pub include_exts: Vec<String>,

    /// Skip these extensions (repeatable, case-insensitive)
    #[arg(long = "exclude-ext", value_name = "EXT")]
    pub exclude_exts: Vec<String>,

    /// Follow symbolic links during scan
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Compare file names case-sensitively
    #[arg(long)]
    pub case_sensitive: bool,

    /// Number of hashing workers (0 = available parallelism)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Also cluster visually similar images and videos
    #[arg(long)]
    pub similar: bool,

    /// Maximum Hamming distance for similar media
    #[arg(long, value_name = "N")]
    pub similar_threshold: Option<u32>,

    /// Perceptual hash algorithm
    #[arg(long, value_enum, value_name = "ALGORITHM")]
    pub algorithm: Option<AlgorithmArg>,

    /// Write a CSV report to this path
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,

    /// Move every copy into a new quarantine batch
    #[arg(long)]
    pub quarantine: bool,

    /// Quarantine root directory
    #[arg(long, value_name = "DIR")]
    pub quarantine_root: Option<PathBuf>,

    /// Arrangement of files inside a batch
    #[arg(long, value_enum, value_name = "LAYOUT")]
    pub layout: Option<LayoutArg>,

    /// Skip the confirmation prompt before quarantining
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the undo subcommand.
#[derive(Debug, Args)]
pub struct UndoArgs {
    /// Batch directory to restore (defaults to the newest batch)
    #[arg(value_name = "BATCH_DIR")]
    pub batch_dir: Option<PathBuf>,

    /// Quarantine root searched for the newest batch
    #[arg(long, value_name = "DIR", conflicts_with = "batch_dir")]
    pub quarantine_root: Option<PathBuf>,
}

/// Arguments for the batches subcommand.
#[derive(Debug, Args)]
pub struct BatchesArgs {
    /// Quarantine root (defaults to the configured root)
    #[arg(value_name = "ROOT")]
    pub root: Option<PathBuf>,
}

/// Perceptual hash algorithm selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmArg {
    /// Average hash
    Ahash,
    /// Difference hash
    Dhash,
    /// DCT hash
    Phash,
}

impl From<AlgorithmArg> for PerceptualAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Ahash => Self::Ahash,
            AlgorithmArg::Dhash => Self::Dhash,
            AlgorithmArg::Phash => Self::Phash,
        }
    }
}

/// Batch layout selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// All files side by side
    Flat,
    /// Recreate the source directory structure
    Mirror,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Flat => Self::Flat,
            LayoutArg::Mirror => Self::Mirror,
        }
    }
}

const SIZE_UNITS: &[(&str, u64)] = &[
    ("", 1),
    ("b", 1),
    ("k", 1_000),
    ("kb", 1_000),
    ("kib", 1 << 10),
    ("m", 1_000_000),
    ("mb", 1_000_000),
    ("mib", 1 << 20),
    ("g", 1_000_000_000),
    ("gb", 1_000_000_000),
    ("gib", 1 << 30),
    ("t", 1_000_000_000_000),
    ("tb", 1_000_000_000_000),
    ("tib", 1 << 40),
];

/// Parse a size such as `512`, `4KiB` or `1.5MB` into bytes.
///
/// Units are case-insensitive; decimal (KB, MB, ...) and binary (KiB,
/// MiB, ...) units are both accepted.
///
/// ```
/// use dupeguard::cli::parse_size;
///
/// assert_eq!(parse_size("4KiB").unwrap(), 4096);
/// assert_eq!(parse_size("2mb").unwrap(), 2_000_000);
/// ```
///
/// # Errors
///
/// Returns a message naming the offending part when the number or unit
/// cannot be read.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let text = input.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    if number.is_empty() {
        return Err(format!("'{text}' does not start with a number"));
    }

    let unit = unit.trim().to_ascii_lowercase();
    let factor = SIZE_UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, factor)| *factor)
        .ok_or_else(|| format!("unknown size unit '{unit}'"))?;

    match number.split_once('.') {
        None => number
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(factor))
            .ok_or_else(|| format!("size '{text}' is out of range")),
        Some(_) => {
            let value: f64 = number
                .parse()
                .map_err(|_| format!("'{number}' is not a number"))?;
            Ok((value * factor as f64).round() as u64)
        }
    }
}
