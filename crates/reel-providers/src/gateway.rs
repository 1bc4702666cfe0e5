//! HTTP adapter for the provider gateway.
//!
//! The gateway exposes one JSON endpoint per capability and returns media
//! as URLs, which are downloaded into the job's work directory:
//!
//! - `POST /v1/script` → `{title, description, hashtags, scenes}`
//! - `POST /v1/speech` → `{audio_url, duration_ms, scene_timings?}`
//! - `POST /v1/image`  → `{image_url}` (one call per scene)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::download::download_to;
use crate::error::{ProviderError, ProviderResult};
use crate::retry::{retry_async, RetryConfig};
use crate::timing::{estimate_scene_timings, SceneTiming};
use crate::types::{GeneratedScript, ImageRequest, ImageSet, ScriptInput, SpeechOutput, SpeechRequest};
use crate::{ImageProvider, ScriptProvider, SpeechProvider};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Per request
    pub timeout: Duration,
    /// Attempts per scene image
    pub image_attempts: u32,
    pub image_retry_delay: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: Duration::from_secs(180),
            image_attempts: 3,
            image_retry_delay: Duration::from_secs(2),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let base_url = std::env::var("PROVIDER_GATEWAY_URL")
            .map_err(|_| ProviderError::config("PROVIDER_GATEWAY_URL not set"))?;
        let mut config = Self::new(base_url);
        config.api_key = std::env::var("PROVIDER_GATEWAY_API_KEY").ok().filter(|k| !k.is_empty());
        if let Some(secs) = std::env::var("PROVIDER_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = std::env::var("PROVIDER_IMAGE_ATTEMPTS").ok().and_then(|s| s.parse().ok()) {
            config.image_attempts = attempts;
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct SpeechBody<'a> {
    text: &'a str,
    scenes: Vec<&'a str>,
    voice_id: &'a str,
    language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    audio_url: String,
    duration_ms: u64,
    #[serde(default)]
    scene_timings: Option<Vec<SceneTiming>>,
}

#[derive(Debug, Serialize)]
struct ImageBody<'a> {
    prompt: &'a str,
    style_prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'a str>,
    aspect_ratio: &'static str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    image_url: String,
}

/// Provider gateway client implementing all three provider traits.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("reel-providers/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    async fn post_json<B, R>(&self, kind: &'static str, path: &str, body: &B) -> ProviderResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, path);
        let mut request = self.http.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let start = Instant::now();
        let result = async {
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    message: text.chars().take(300).collect(),
                });
            }
            serde_json::from_str::<R>(&text)
                .map_err(|e| ProviderError::invalid_response(format!("{} response: {}", kind, e)))
        }
        .await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!("reel_provider_requests_total", "kind" => kind, "outcome" => outcome).increment(1);
        histogram!("reel_provider_request_seconds", "kind" => kind).record(start.elapsed().as_secs_f64());
        result
    }
}

#[async_trait]
impl ScriptProvider for GatewayClient {
    async fn generate_script(&self, input: &ScriptInput) -> ProviderResult<GeneratedScript> {
        let script: GeneratedScript = self.post_json("script", "/v1/script", input).await?;
        if script.scenes.is_empty() {
            return Err(ProviderError::invalid_response("script has no scenes"));
        }
        if script.title.trim().is_empty() {
            return Err(ProviderError::invalid_response("script has no title"));
        }
        info!(niche = %input.niche, scenes = script.scenes.len(), "Generated script: {}", script.title);
        Ok(script)
    }
}

#[async_trait]
impl SpeechProvider for GatewayClient {
    async fn generate_speech(&self, request: &SpeechRequest) -> ProviderResult<SpeechOutput> {
        let body = SpeechBody {
            text: &request.script,
            scenes: request.scenes.iter().map(|s| s.text.as_str()).collect(),
            voice_id: &request.voice_id,
            language: &request.language,
            provider: request.provider.as_deref(),
        };
        let response: SpeechResponse = self.post_json("speech", "/v1/speech", &body).await?;
        if response.duration_ms == 0 {
            return Err(ProviderError::invalid_response("speech has zero duration"));
        }

        let audio_path = request.work_dir.join("narration.mp3");
        download_to(&self.http, &response.audio_url, &audio_path).await?;

        let scene_timings = match response.scene_timings {
            Some(timings) if timings.len() == request.scenes.len() => timings,
            reported => {
                if let Some(timings) = reported {
                    warn!(
                        reported = timings.len(),
                        scenes = request.scenes.len(),
                        "Speech timings do not match scenes, estimating"
                    );
                }
                let texts: Vec<&str> = request.scenes.iter().map(|s| s.text.as_str()).collect();
                estimate_scene_timings(&texts, response.duration_ms)
            }
        };

        debug!(duration_ms = response.duration_ms, "Narration ready at {}", audio_path.display());
        Ok(SpeechOutput {
            audio_path,
            duration_ms: response.duration_ms,
            scene_timings,
        })
    }
}

#[async_trait]
impl ImageProvider for GatewayClient {
    async fn generate_images(&self, request: &ImageRequest) -> ProviderResult<ImageSet> {
        let tmp_dir = request.work_dir.join("images");
        tokio::fs::create_dir_all(&tmp_dir).await?;

        let mut image_paths = Vec::with_capacity(request.prompts.len());
        for (index, prompt) in request.prompts.iter().enumerate() {
            let dest = tmp_dir.join(format!("scene_{:02}.png", index));
            let body = ImageBody {
                prompt,
                style_prompt: &request.style_prompt,
                negative_prompt: request.negative_prompt.as_deref(),
                provider: request.provider.as_deref(),
                aspect_ratio: "9:16",
            };
            let retry = RetryConfig::new(format!("image for scene {}", index + 1))
                .with_max_attempts(self.config.image_attempts)
                .with_base_delay(self.config.image_retry_delay);

            retry_async(&retry, || async {
                let response: ImageResponse = self.post_json("image", "/v1/image", &body).await?;
                download_to(&self.http, &response.image_url, &dest).await
            })
            .await?;
            image_paths.push(dest);
        }

        info!(count = image_paths.len(), "Generated scene images");
        Ok(ImageSet { image_paths, tmp_dir })
    }
}
