//! Scheduler configuration.

use std::time::Duration;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often enabled automations are reloaded and timers reconciled
    pub sync_interval: Duration,
    /// Fire times further out than this are left for a later sync
    pub arm_horizon: chrono::Duration,
    /// An armed timer within this distance of the computed time is kept
    pub rearm_tolerance: chrono::Duration,
    /// How often the posting sweep runs in the scheduler process
    pub sweep_interval: Duration,
    /// Delay before a fire that hit a store error runs again
    pub fire_retry_delay: chrono::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(600),
            arm_horizon: chrono::Duration::days(8),
            rearm_tolerance: chrono::Duration::seconds(60),
            sweep_interval: Duration::from_secs(60),
            fire_retry_delay: chrono::Duration::minutes(2),
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            sync_interval: Duration::from_secs(
                std::env::var("SCHEDULER_SYNC_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("POSTER_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            ..Self::default()
        }
    }
}
