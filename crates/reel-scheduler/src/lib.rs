//! Automation scheduler.
//!
//! One in-process timer per enabled automation, armed for the next
//! configured wall-clock time in the automation's own timezone. When a
//! timer fires the scheduler writes a script, creates the video record and
//! hands a generation job to the queue.

pub mod config;
pub mod error;
pub mod next_fire;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use next_fire::{compute_next_fire_time, LOOKAHEAD_DAYS};
pub use scheduler::{FireOutcome, Scheduler, SyncReport};
