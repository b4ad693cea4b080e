//! Progress notification boundary.
//!
//! Downloads and copies report "advanced by N of total T" through a
//! [`ProgressSink`]. The console implementation prints a single updating
//! line; rendering richer bars is left to other sinks.

use std::cell::Cell;
use std::io::Write;

/// Receives progress for one transfer at a time.
pub trait ProgressSink {
    /// A new transfer begins. `total` is the expected byte count, if known.
    fn start(&self, label: &str, total: Option<u64>);
    /// `delta` more bytes were transferred.
    fn advance(&self, delta: u64);
    /// The current transfer completed.
    fn finish(&self);
}

/// Progress snapshot with human-readable formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: u64,
    pub total: Option<u64>,
    pub percent: Option<u8>,
}

impl Progress {
    pub fn new(done: u64, total: Option<u64>) -> Self {
        let percent = total.map(|t| {
            if t > 0 {
                ((done.min(t) * 100) / t) as u8
            } else {
                100
            }
        });
        Self {
            done,
            total,
            percent,
        }
    }

    /// Format as human-readable string
    pub fn display(&self) -> String {
        let done_mb = self.done as f64 / (1024.0 * 1024.0);
        match (self.total, self.percent) {
            (Some(total), Some(pct)) => {
                let total_mb = total as f64 / (1024.0 * 1024.0);
                format!("{:.1}/{:.1} MB ({}%)", done_mb, total_mb, pct)
            }
            _ => format!("{:.1} MB", done_mb),
        }
    }
}

/// Prints progress to stdout, redrawing the line each time the percentage
/// changes (or every 64 MB when the total is unknown).
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    done: Cell<u64>,
    total: Cell<Option<u64>>,
    last_mark: Cell<u64>,
}

const UNKNOWN_TOTAL_STEP: u64 = 64 * 1024 * 1024;

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for ConsoleProgress {
    fn start(&self, label: &str, total: Option<u64>) {
        self.done.set(0);
        self.total.set(total);
        self.last_mark.set(0);
        println!("  {}", label);
    }

    fn advance(&self, delta: u64) {
        let done = self.done.get() + delta;
        self.done.set(done);

        let progress = Progress::new(done, self.total.get());
        let mark = match progress.percent {
            Some(pct) => u64::from(pct),
            None => done / UNKNOWN_TOTAL_STEP,
        };
        if mark > self.last_mark.get() {
            print!("\r    {}", progress.display());
            std::io::stdout().flush().ok();
            self.last_mark.set(mark);
        }
    }

    fn finish(&self) {
        let progress = Progress::new(self.done.get(), self.total.get());
        println!("\r    {} done", progress.display());
    }
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn start(&self, _label: &str, _total: Option<u64>) {}
    fn advance(&self, _delta: u64) {}
    fn finish(&self) {}
}
