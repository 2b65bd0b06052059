//! The read-only start-time handle every stage measures elapsed time from.

use std::time::{Duration, Instant};

/// Start instant of one pipeline run.
///
/// Copied into each stage at construction so elapsed-time logging has no
/// global state.
#[derive(Debug, Clone, Copy)]
pub struct PipelineClock {
    started: Instant,
}

impl PipelineClock {
    /// Starts a clock at the current instant.
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Returns the instant the clock started.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started
    }

    /// Returns time since start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns whole seconds since start.
    #[must_use]
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed().as_secs()
    }

    /// Returns whole milliseconds since start.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for PipelineClock {
    fn default() -> Self {
        Self::start()
    }
}
