//! Shared data models for the AutoReel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Automations and their posting schedule
//! - Video records and the generation lifecycle
//! - Per-platform posting entries and claim decisions
//! - Generation job payloads
//! - Output encoding configuration

pub mod automation;
pub mod encoding;
pub mod error;
pub mod job;
pub mod platform;
pub mod utils;
pub mod video;

// Re-export common types
pub use automation::{ArtStyle, Automation, FireTime, Frequency, ProviderOverrides};
pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use job::GenerationJob;
pub use platform::{
    claim_decision, ClaimDecision, Platform, PlatformCredentials, PlatformEntry, PostOutcome,
};
pub use utils::truncate_message;
pub use video::{GenerationStage, GenerationUpdate, Scene, VideoId, VideoRecord, VideoStatus};
