//! Progress events and listeners.
//!
//! Long-running stages publish [`ProgressEvent`]s through a
//! [`ProgressTracker`]. Any number of [`ProgressListener`]s can subscribe:
//! the terminal bar in [`TerminalProgress`], the log, or a test harness via
//! [`RecordingListener`]. There is no global progress state.
//!
//! # Ordering
//!
//! The tracker serialises completions, so listeners observe a strictly
//! increasing `completed` count and a non-decreasing percentage, even when
//! completions arrive from many worker threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Stage that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Content hashing and fingerprinting
    Hashing,
    /// Moving copies into quarantine
    Quarantine,
    /// Restoring a batch
    Restore,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hashing => write!(f, "Hashing"),
            Self::Quarantine => write!(f, "Quarantining"),
            Self::Restore => write!(f, "Restoring"),
        }
    }
}

/// A single progress notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A phase started with `total` units of work.
    Started {
        /// Phase
        phase: Phase,
        /// Units of work
        total: usize,
    },
    /// One unit finished, successfully or not.
    Advanced {
        /// Phase
        phase: Phase,
        /// Units finished so far (1-based)
        completed: usize,
        /// Units of work
        total: usize,
        /// `completed / total` as a percentage
        percent: f64,
        /// File that just finished
        path: String,
        /// Whether the unit failed
        failed: bool,
    },
    /// The phase stopped early because cancellation was requested.
    Cancelled {
        /// Phase
        phase: Phase,
        /// Units finished before stopping
        completed: usize,
        /// Units of work
        total: usize,
    },
    /// Every unit finished.
    Finished {
        /// Phase
        phase: Phase,
        /// Units of work
        total: usize,
    },
}

impl ProgressEvent {
    /// Percentage carried by this event, if any.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        match self {
            Self::Started { .. } => Some(0.0),
            Self::Advanced { percent, .. } => Some(*percent),
            Self::Cancelled { .. } => None,
            Self::Finished { .. } => Some(100.0),
        }
    }
}

/// Receiver of progress events.
pub trait ProgressListener: Send + Sync {
    /// Called for every event, in order.
    fn on_event(&self, event: &ProgressEvent);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes events for one phase to a set of listeners.
pub struct ProgressTracker {
    phase: Phase,
    total: usize,
    completed: Mutex<usize>,
    listeners: Vec<Arc<dyn ProgressListener>>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("phase", &self.phase)
            .field("total", &self.total)
            .field("completed", &*lock(&self.completed))
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ProgressTracker {
    /// Create a tracker and announce the phase.
    #[must_use]
    pub fn start(phase: Phase, total: usize, listeners: Vec<Arc<dyn ProgressListener>>) -> Self {
        let tracker = Self {
            phase,
            total,
            completed: Mutex::new(0),
            listeners,
        };
        tracker.emit(&ProgressEvent::Started { phase, total });
        tracker
    }

    fn emit(&self, event: &ProgressEvent) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }

    /// Record one finished unit.
    pub fn advance(&self, path: &str, failed: bool) {
        let mut completed = lock(&self.completed);
        *completed = (*completed + 1).min(self.total);
        let percent = if self.total == 0 {
            100.0
        } else {
            *completed as f64 * 100.0 / self.total as f64
        };
        // Emitting under the lock keeps listeners' view ordered.
        self.emit(&ProgressEvent::Advanced {
            phase: self.phase,
            completed: *completed,
            total: self.total,
            percent,
            path: path.to_string(),
            failed,
        });
    }

    /// Number of units finished so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        *lock(&self.completed)
    }

    /// Close the phase: `Finished` if everything completed, `Cancelled` otherwise.
    pub fn finish(self, cancelled: bool) {
        let completed = self.completed();
        if cancelled && completed < self.total {
            self.emit(&ProgressEvent::Cancelled {
                phase: self.phase,
                completed,
                total: self.total,
            });
        } else {
            self.emit(&ProgressEvent::Finished {
                phase: self.phase,
                total: self.total,
            });
        }
    }
}

/// Listener that stores every event; handy for tests and post-run reports.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingListener {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }
}

impl ProgressListener for RecordingListener {
    fn on_event(&self, event: &ProgressEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Listener that forwards failures and phase boundaries to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl ProgressListener for LogListener {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { phase, total } => {
                log::debug!("{}: {} item(s)", phase, total);
            }
            ProgressEvent::Advanced {
                phase,
                completed,
                total,
                path,
                ..
            } => {
                log::trace!("{} {}/{}: {}", phase, completed, total, path);
            }
            ProgressEvent::Cancelled {
                phase,
                completed,
                total,
            } => {
                log::info!("{} cancelled after {}/{}", phase, completed, total);
            }
            ProgressEvent::Finished { phase, total } => {
                log::debug!("{} complete: {} item(s)", phase, total);
            }
        }
    }
}

/// Terminal progress bar using indicatif.
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    /// Create a terminal progress listener.
    ///
    /// # Examples
    ///
    /// ```
    /// use dupeguard::progress::TerminalProgress;
    ///
    /// let progress = TerminalProgress::new();
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressListener for TerminalProgress {
    fn on_event(&self, event: &ProgressEvent) {
        let mut slot = lock(&self.bar);
        match event {
            ProgressEvent::Started { phase, total } => {
                let pb = ProgressBar::new(*total as u64);
                pb.set_style(Self::style());
                pb.set_message(phase.to_string());
                pb.enable_steady_tick(Duration::from_millis(120));
                *slot = Some(pb);
            }
            ProgressEvent::Advanced {
                completed, path, ..
            } => {
                if let Some(pb) = slot.as_ref() {
                    pb.set_position(*completed as u64);
                    pb.set_message(truncate_path(path, 30));
                }
            }
            ProgressEvent::Cancelled { phase, .. } => {
                if let Some(pb) = slot.take() {
                    pb.abandon_with_message(format!("{} cancelled", phase));
                }
            }
            ProgressEvent::Finished { phase, .. } => {
                if let Some(pb) = slot.take() {
                    pb.finish_with_message(format!("{} complete", phase));
                }
            }
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let count = file_name.chars().count();
    if count >= max_len {
        let tail: String = file_name.chars().skip(count + 3 - max_len).collect();
        return format!("...{}", tail);
    }

    format!(".../{}", file_name)
}
