//! HTTP adapter for the publishing gateway.
//!
//! The gateway holds the per-platform upload flows; this client hands it the
//! user's credentials and the video:
//!
//! - `POST /v1/{platform}/upload`  multipart `video` + caption fields → `{post_id, url}`
//! - `POST /v1/{platform}/comment` JSON `{post_id, text}` → `{comment_id}`

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use reel_models::{Platform, PlatformCredentials};

use crate::error::{PosterError, PosterResult};
use crate::publisher::{CommentResult, PlatformPublisher, PostMetadata, UploadResult};

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Per request; uploads can be slow
    pub timeout: Duration,
}

impl PublisherConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_env() -> PosterResult<Self> {
        let base_url = std::env::var("PUBLISHER_GATEWAY_URL")
            .map_err(|_| PosterError::config("PUBLISHER_GATEWAY_URL not set"))?;
        let mut config = Self::new(base_url);
        config.api_key = std::env::var("PUBLISHER_GATEWAY_API_KEY").ok().filter(|k| !k.is_empty());
        if let Some(secs) = std::env::var("PUBLISHER_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct CommentBody<'a> {
    access_token: &'a str,
    account_id: &'a str,
    post_id: &'a str,
    text: &'a str,
}

#[derive(Clone)]
pub struct GatewayPublisher {
    http: Client,
    config: PublisherConfig,
}

impl GatewayPublisher {
    pub fn new(config: PublisherConfig) -> PosterResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("reel-poster/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> PosterResult<Self> {
        Self::new(PublisherConfig::from_env()?)
    }

    fn endpoint(&self, platform: Platform, action: &str) -> String {
        format!("{}/v1/{}/{}", self.config.base_url, platform.as_str(), action)
    }

    async fn fetch_video(&self, video_url: &str) -> PosterResult<Vec<u8>> {
        let response = self.http.get(video_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PosterError::MissingMedia(format!("{} returned {}", video_url, status.as_u16())));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(PosterError::MissingMedia(format!("{} is empty", video_url)));
        }
        debug!(bytes = bytes.len(), "Fetched video for upload");
        Ok(bytes.to_vec())
    }

    async fn send<R: DeserializeOwned>(
        &self,
        platform: Platform,
        kind: &'static str,
        request: RequestBuilder,
    ) -> PosterResult<R> {
        let request = match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };

        let start = Instant::now();
        let result = async {
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                return Err(PosterError::platform(
                    platform,
                    status.as_u16(),
                    text.chars().take(300).collect::<String>(),
                ));
            }
            serde_json::from_str::<R>(&text)
                .map_err(|e| PosterError::invalid_response(format!("{} {} response: {}", platform, kind, e)))
        }
        .await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!(
            "reel_publisher_requests_total",
            "platform" => platform.as_str(),
            "kind" => kind,
            "outcome" => outcome
        )
        .increment(1);
        histogram!("reel_publisher_request_seconds", "kind" => kind).record(start.elapsed().as_secs_f64());
        result
    }
}

#[async_trait]
impl PlatformPublisher for GatewayPublisher {
    async fn upload(
        &self,
        credentials: &PlatformCredentials,
        video_url: &str,
        metadata: &PostMetadata,
    ) -> PosterResult<UploadResult> {
        let video = self.fetch_video(video_url).await?;
        let part = Part::bytes(video).file_name("video.mp4").mime_str("video/mp4")?;
        let form = Form::new()
            .part("video", part)
            .text("access_token", credentials.access_token.clone())
            .text("account_id", credentials.account_id.clone())
            .text("title", metadata.title.clone())
            .text("description", metadata.description.clone())
            .text("hashtags", metadata.hashtags.join(" "));

        let platform = credentials.platform;
        let request = self.http.post(self.endpoint(platform, "upload")).multipart(form);
        let result: UploadResult = self.send(platform, "upload", request).await?;
        info!(platform = %platform, post_id = ?result.post_id, "Uploaded video");
        Ok(result)
    }

    async fn post_comment(
        &self,
        credentials: &PlatformCredentials,
        post_id: &str,
        text: &str,
    ) -> PosterResult<CommentResult> {
        let platform = credentials.platform;
        let body = CommentBody {
            access_token: &credentials.access_token,
            account_id: &credentials.account_id,
            post_id,
            text,
        };
        let request = self.http.post(self.endpoint(platform, "comment")).json(&body);
        self.send(platform, "comment", request).await
    }
}
