//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent generations
    pub max_concurrent_jobs: usize,
    /// Root for per-job work directories
    pub work_dir: PathBuf,
    /// How often an active job's lease is refreshed
    pub heartbeat_interval: Duration,
    /// How often delayed jobs are promoted and stalled jobs recovered
    pub maintenance_interval: Duration,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Hard cap on one ffmpeg render
    pub render_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            work_dir: PathBuf::from("/tmp/reel"),
            heartbeat_interval: Duration::from_secs(30),
            maintenance_interval: Duration::from_secs(15),
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(120),
            render_timeout_secs: 900,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            maintenance_interval: Duration::from_secs(
                std::env::var("WORKER_MAINTENANCE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            poll_interval: Duration::from_millis(
                std::env::var("WORKER_POLL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            render_timeout_secs: std::env::var("WORKER_RENDER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.render_timeout_secs),
        }
    }
}
