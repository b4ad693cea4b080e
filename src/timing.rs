//! Step timing.

use std::time::{Duration, Instant};

/// Measures one pipeline step and prints its duration when finished.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    /// Start a new timer for the named step.
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Print `[1.2s] <step>` (or minutes for long steps) and return the
    /// elapsed time.
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        println!("  {} {}", format_elapsed(elapsed), self.name);
        elapsed
    }
}

/// `[12.3s]`, or `[2.5m]` from one minute on.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        format!("[{:.1}m]", secs / 60.0)
    } else {
        format!("[{:.1}s]", secs)
    }
}
