//! dupeguard - duplicate file finder with reversible quarantine
//!
//! Files are duplicates when their normalized name and BLAKE3 digest both
//! match. One original per group is chosen deterministically; copies can be
//! moved into a journaled quarantine batch and restored with `undo`.
//! Visually similar media can be clustered for manual review.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod quarantine;
pub mod scanner;
pub mod signal;

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytesize::ByteSize;

use crate::cli::{BatchesArgs, Cli, Commands, ScanArgs, UndoArgs};
use crate::config::Config;
use crate::duplicates::{DuplicateFinder, FinderConfig, ScanReport};
use crate::error::ExitCode;
use crate::output::{CsvOutput, SummaryOutput};
use crate::progress::{LogListener, ProgressListener, TerminalProgress};
use crate::quarantine::{
    latest_batch, list_batches, QuarantineConfig, QuarantineItem, QuarantineManager, UndoEngine,
};
use crate::scanner::Capabilities;

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns an error for invalid configuration, unusable roots, journal
/// failures, or a scan interrupted before hashing.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Scan(args) => run_scan(config_path, cli.quiet, args),
        Commands::Undo(args) => run_undo(config_path, cli.quiet, args),
        Commands::Batches(args) => run_batches(config_path, args),
    }
}

fn listeners(quiet: bool) -> Vec<Arc<dyn ProgressListener>> {
    let mut listeners: Vec<Arc<dyn ProgressListener>> = vec![Arc::new(LogListener)];
    if !quiet && std::io::stderr().is_terminal() {
        listeners.push(Arc::new(TerminalProgress::new()));
    }
    listeners
}

fn run_scan(config_path: Option<&Path>, quiet: bool, args: &ScanArgs) -> Result<ExitCode> {
    let config =
        Config::load_for_scan(config_path, args).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    let quarantine_root = if args.quarantine {
        Some(
            config
                .prepare_quarantine_root(&args.roots)
                .context("Invalid configuration")?,
        )
    } else {
        None
    };
    log::debug!("Effective configuration: {:?}", config);

    let handler = signal::install_handler().context("Failed to install Ctrl+C handler")?;
    let capabilities = if config.perceptual.enabled {
        Capabilities::detect()
    } else {
        Capabilities::images_only()
    };

    let mut finder_config = FinderConfig::default()
        .with_walker_config(config.walker_config())
        .with_workers(config.workers)
        .with_strategy(config.strategy(capabilities))
        .with_similarity_threshold(config.perceptual.effective_threshold())
        .with_name_policy(config.name_policy())
        .with_shutdown_flag(handler.get_flag());
    for listener in listeners(quiet) {
        finder_config = finder_config.with_listener(listener);
    }

    let report = DuplicateFinder::new(finder_config).find_duplicates(&args.roots)?;

    if !quiet {
        SummaryOutput::new(&report)
            .write_to(std::io::stdout().lock())
            .context("Failed to write summary")?;
    }
    if let Some(path) = &args.csv {
        CsvOutput::new(&report.groups, &report.clusters)
            .write_file(path)
            .with_context(|| format!("Failed to write CSV report to {}", path.display()))?;
        log::info!("CSV report written to {}", path.display());
    }

    if report.summary.interrupted {
        return Ok(ExitCode::Interrupted);
    }

    let mut partial = !report.warnings.is_empty();
    if let Some(root) = quarantine_root {
        if !report.groups.is_empty() {
            if !args.yes && !confirm(&report, &root)? {
                log::info!("Quarantine declined");
                return Ok(scan_exit_code(&report, partial));
            }
            let manager = quarantine_manager(&config, root, &handler, quiet);
            let outcome = manager
                .quarantine(&QuarantineItem::from_groups(&report.groups))
                .context("Quarantine stopped")?;
            if !quiet {
                print!("{}", output::quarantine_text(&outcome));
            }
            if outcome.interrupted {
                return Ok(ExitCode::Interrupted);
            }
            partial |= outcome.has_failures();
        }
    }

    Ok(scan_exit_code(&report, partial))
}

fn quarantine_manager(
    config: &Config,
    root: PathBuf,
    handler: &signal::ShutdownHandler,
    quiet: bool,
) -> QuarantineManager {
    let mut quarantine_config = QuarantineConfig::new(root)
        .with_layout(config.layout)
        .with_cancel_flag(handler.get_flag());
    for listener in listeners(quiet) {
        quarantine_config = quarantine_config.with_listener(listener);
    }
    QuarantineManager::new(quarantine_config)
}

fn scan_exit_code(report: &ScanReport, partial: bool) -> ExitCode {
    if partial {
        ExitCode::PartialSuccess
    } else if report.groups.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    }
}

fn confirm(report: &ScanReport, root: &Path) -> Result<bool> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        bail!("Refusing to quarantine without confirmation; pass --yes");
    }
    let mut stderr = std::io::stderr();
    write!(
        stderr,
        "Move {} copies ({}) into {}? [y/N] ",
        report.summary.duplicate_files,
        ByteSize(report.summary.total_duplicate_size),
        root.display()
    )?;
    stderr.flush()?;

    let mut answer = String::new();
    stdin.lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn run_undo(config_path: Option<&Path>, quiet: bool, args: &UndoArgs) -> Result<ExitCode> {
    let batch_dir = match &args.batch_dir {
        Some(dir) => dir.clone(),
        None => {
            let root = quarantine_root(config_path, args.quarantine_root.as_ref())?;
            latest_batch(&root)
                .with_context(|| format!("Failed to list batches in {}", root.display()))?
                .with_context(|| format!("No quarantine batches under {}", root.display()))?
        }
    };
    log::info!("Undoing batch {}", batch_dir.display());

    let mut engine = UndoEngine::new();
    for listener in listeners(quiet) {
        engine = engine.with_listener(listener);
    }
    let report = engine
        .undo(&batch_dir)
        .with_context(|| format!("Failed to undo batch {}", batch_dir.display()))?;

    if !quiet {
        print!("{}", output::undo_text(&report));
    }
    Ok(if report.is_complete() {
        ExitCode::Success
    } else {
        ExitCode::PartialSuccess
    })
}

fn quarantine_root(config_path: Option<&Path>, given: Option<&PathBuf>) -> Result<PathBuf> {
    match given {
        Some(root) => Ok(root.clone()),
        None => Ok(Config::load(config_path)
            .context("Failed to load configuration")?
            .quarantine_root),
    }
}

fn run_batches(config_path: Option<&Path>, args: &BatchesArgs) -> Result<ExitCode> {
    let root = quarantine_root(config_path, args.root.as_ref())?;
    let batches = list_batches(&root)
        .with_context(|| format!("Failed to list batches in {}", root.display()))?;
    print!("{}", output::batches_text(&batches));
    Ok(ExitCode::Success)
}
