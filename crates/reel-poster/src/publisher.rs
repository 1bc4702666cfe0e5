//! Platform publishing contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use reel_models::{PlatformCredentials, VideoRecord};

use crate::error::PosterResult;

/// Caption fields sent with an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostMetadata {
    pub title: String,
    pub description: String,
    pub hashtags: Vec<String>,
}

impl PostMetadata {
    pub fn for_video(video: &VideoRecord) -> Self {
        Self {
            title: video.title.clone(),
            description: video.description.clone(),
            hashtags: video.hashtags.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadResult {
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommentResult {
    #[serde(default)]
    pub comment_id: Option<String>,
}

/// One adapter per deployment, dispatching on `credentials.platform`.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// Publish the video at `video_url`.
    async fn upload(
        &self,
        credentials: &PlatformCredentials,
        video_url: &str,
        metadata: &PostMetadata,
    ) -> PosterResult<UploadResult>;

    async fn post_comment(
        &self,
        credentials: &PlatformCredentials,
        post_id: &str,
        text: &str,
    ) -> PosterResult<CommentResult>;
}
