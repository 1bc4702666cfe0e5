//! Log throttling for background loops.
//!
//! Heartbeats and queue maintenance run for the life of the process; when
//! Redis is down they would otherwise log the same error every tick.

use tracing::{debug, warn};

/// Counts consecutive failures of a repeating operation.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Reset after a success.
    pub fn record_success(&mut self) {
        if self.suppressed {
            debug!(
                "Operation recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Returns `true` if this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            return true;
        }
        if !self.suppressed {
            self.suppressed = true;
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
        }
        false
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}
