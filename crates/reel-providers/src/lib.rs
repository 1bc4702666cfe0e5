//! Content provider contracts.
//!
//! Script, speech and image generation are black boxes to the pipeline. The
//! traits here are what the scheduler and worker call; [`GatewayClient`]
//! implements all three against an HTTP provider gateway that fans out to
//! the configured backends.

pub mod download;
pub mod error;
pub mod gateway;
pub mod retry;
pub mod timing;
pub mod types;

use async_trait::async_trait;

pub use download::{download_to, fetch_asset};
pub use error::{ProviderError, ProviderResult};
pub use gateway::{GatewayClient, GatewayConfig};
pub use retry::{retry_async, RetryConfig};
pub use timing::{estimate_scene_timings, SceneTiming};
pub use types::{GeneratedScript, ImageRequest, ImageSet, ScriptInput, SpeechOutput, SpeechRequest};

#[async_trait]
pub trait ScriptProvider: Send + Sync {
    async fn generate_script(&self, input: &ScriptInput) -> ProviderResult<GeneratedScript>;
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Narrate the script. The output carries one timing per scene.
    async fn generate_speech(&self, request: &SpeechRequest) -> ProviderResult<SpeechOutput>;
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// One image per scene, in scene order. Fails if any scene fails.
    async fn generate_images(&self, request: &ImageRequest) -> ProviderResult<ImageSet>;
}
