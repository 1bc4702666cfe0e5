//! Video generation worker.
//!
//! This crate provides:
//! - The generation pipeline (script, speech, images, assembly, upload)
//! - Job executor with lease heartbeats and stall recovery
//! - Manual retry of failed videos
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod manual;
pub mod pipeline;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use manual::{job_from_video, retry_video};
pub use pipeline::{GenerationOutcome, GenerationPipeline};
