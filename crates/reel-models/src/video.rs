//! Video records and the generation lifecycle.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ModelError;
use crate::platform::{Platform, PlatformEntry, PostOutcome};

/// Unique identifier for a generated video. Also the queue job id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Video lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    /// Created and waiting for a worker
    #[default]
    Queued,
    /// A worker is running the generation stages
    Generating,
    /// Generated and uploaded; ready for posting
    Ready,
    /// Generation failed
    Failed,
    /// Waiting for manual review before posting
    Review,
    /// Published to at least one platform
    Posted,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Queued => "QUEUED",
            VideoStatus::Generating => "GENERATING",
            VideoStatus::Ready => "READY",
            VideoStatus::Failed => "FAILED",
            VideoStatus::Review => "REVIEW",
            VideoStatus::Posted => "POSTED",
        }
    }

    /// Queued or generating. A series with such a video must not get another.
    pub fn is_unfinished(&self) -> bool {
        matches!(self, VideoStatus::Queued | VideoStatus::Generating)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(VideoStatus::Queued),
            "GENERATING" => Ok(VideoStatus::Generating),
            "READY" => Ok(VideoStatus::Ready),
            "FAILED" => Ok(VideoStatus::Failed),
            "REVIEW" => Ok(VideoStatus::Review),
            "POSTED" => Ok(VideoStatus::Posted),
            _ => Err(ModelError::UnknownStatus(s.to_string())),
        }
    }
}

/// Generation stage. Only meaningful while the video is `GENERATING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStage {
    Script,
    Tts,
    Images,
    Assembly,
    Uploading,
}

impl GenerationStage {
    /// Stages in execution order.
    pub const ORDER: [GenerationStage; 5] = [
        GenerationStage::Script,
        GenerationStage::Tts,
        GenerationStage::Images,
        GenerationStage::Assembly,
        GenerationStage::Uploading,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStage::Script => "SCRIPT",
            GenerationStage::Tts => "TTS",
            GenerationStage::Images => "IMAGES",
            GenerationStage::Assembly => "ASSEMBLY",
            GenerationStage::Uploading => "UPLOADING",
        }
    }
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GenerationStage {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GenerationStage::ORDER
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ModelError::UnknownStage(s.to_string()))
    }
}

/// One narrated scene of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Narration text
    pub text: String,
    /// Prompt for the scene image
    pub visual_description: String,
}

/// A lifecycle write produced by the generation worker.
///
/// Every variant maps to exactly one `(status, stage)` pair so a write can
/// never leave a stage on a video that is not generating.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationUpdate {
    Stage(GenerationStage),
    Ready { video_url: String, duration_ms: u64 },
    Failed { error: String },
}

impl GenerationUpdate {
    pub fn status(&self) -> VideoStatus {
        match self {
            GenerationUpdate::Stage(_) => VideoStatus::Generating,
            GenerationUpdate::Ready { .. } => VideoStatus::Ready,
            GenerationUpdate::Failed { .. } => VideoStatus::Failed,
        }
    }

    pub fn stage(&self) -> Option<GenerationStage> {
        match self {
            GenerationUpdate::Stage(stage) => Some(*stage),
            _ => None,
        }
    }
}

/// A generated (or in-progress) video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoRecord {
    pub id: VideoId,

    pub user_id: String,

    pub series_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub hashtags: Vec<String>,

    /// Target length in seconds
    #[serde(default)]
    pub duration_seconds: u32,

    #[serde(default)]
    pub script: String,

    #[serde(default)]
    pub scenes: Vec<Scene>,

    #[serde(default)]
    pub status: VideoStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_stage: Option<GenerationStage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Length of the rendered video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Snapshot of the automation's platforms at creation time
    #[serde(default)]
    pub target_platforms: Vec<Platform>,

    #[serde(skip)]
    #[schemars(skip)]
    pub posted_platforms: Vec<PlatformEntry>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    /// New `QUEUED` record.
    pub fn new(id: VideoId, user_id: impl Into<String>, series_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            series_id: series_id.into(),
            automation_id: None,
            title: String::new(),
            description: String::new(),
            hashtags: Vec::new(),
            duration_seconds: 0,
            script: String::new(),
            scenes: Vec::new(),
            status: VideoStatus::Queued,
            generation_stage: None,
            video_url: None,
            duration_ms: None,
            error_message: None,
            target_platforms: Vec::new(),
            posted_platforms: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_automation(mut self, automation_id: impl Into<String>) -> Self {
        self.automation_id = Some(automation_id.into());
        self
    }

    pub fn with_content(
        mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        hashtags: Vec<String>,
    ) -> Self {
        self.title = title.into();
        self.description = description.into();
        self.hashtags = hashtags;
        self
    }

    pub fn with_script(mut self, script: impl Into<String>, scenes: Vec<Scene>) -> Self {
        self.script = script.into();
        self.scenes = scenes;
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.target_platforms = platforms;
        self
    }

    /// Apply a generation update in place.
    pub fn apply(&mut self, update: &GenerationUpdate, now: DateTime<Utc>) {
        self.status = update.status();
        self.generation_stage = update.stage();
        match update {
            GenerationUpdate::Stage(_) => {}
            GenerationUpdate::Ready { video_url, duration_ms } => {
                self.video_url = Some(video_url.clone());
                self.duration_ms = Some(*duration_ms);
                self.error_message = None;
            }
            GenerationUpdate::Failed { error } => {
                self.error_message = Some(error.clone());
            }
        }
        self.updated_at = now;
    }

    /// `generation_stage` is set only while `GENERATING`.
    pub fn stage_is_consistent(&self) -> bool {
        self.generation_stage.is_none() || self.status == VideoStatus::Generating
    }

    /// Target platforms the posting sweep should still attempt: never tried,
    /// past a cooldown wait, or claimed by a poster that has gone silent.
    pub fn pending_platforms(&self, now: DateTime<Utc>, stale_after: Duration) -> Vec<Platform> {
        self.target_platforms
            .iter()
            .copied()
            .filter(|platform| {
                match self.posted_platforms.iter().find(|e| e.platform == *platform) {
                    None => true,
                    Some(entry) => entry.is_retry_due(now) || entry.is_stale_upload(now, stale_after),
                }
            })
            .collect()
    }

    /// Whether any platform has a successful post.
    pub fn has_successful_post(&self) -> bool {
        self.posted_platforms
            .iter()
            .any(|e| matches!(e.outcome, PostOutcome::Posted { .. }))
    }
}
