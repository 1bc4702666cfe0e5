//! Redis-backed generation job queue.
//!
//! This crate provides:
//! - Enqueue deduplicated by video id (one in-flight job per video)
//! - Lease-based consumption with heartbeat and stall recovery
//! - Exponential backoff retries and bounded completed/failed history

pub mod error;
pub mod job;
pub mod queue;
pub mod retry;
pub mod sink;

pub use error::{QueueError, QueueResult};
pub use job::{EnqueueOutcome, JobState, LeasedJob, QueueCounts};
pub use queue::{JobQueue, QueueConfig};
pub use retry::{RetryDecision, RetryPolicy};
pub use sink::JobSink;

#[cfg(any(test, feature = "memory"))]
pub use sink::MemoryJobSink;
