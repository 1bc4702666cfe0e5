//! Generation job payload.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::automation::Automation;
use crate::video::{Scene, VideoId};

/// Everything a worker needs to generate one video.
///
/// The payload is self-contained: re-running it never re-reads the
/// automation, so a later edit to the automation does not change a retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationJob {
    /// Video being generated. Also the queue job id.
    pub video_id: VideoId,

    pub user_id: String,

    pub series_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,

    pub title: String,

    pub script: String,

    pub scenes: Vec<Scene>,

    pub art_style_prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    pub voice_id: String,

    pub language: String,

    /// Target length in seconds
    pub duration_seconds: u32,

    #[serde(default)]
    pub niche: String,

    #[serde(default)]
    pub tone: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_provider: Option<String>,

    /// Local path or URL of a background music track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_path: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(video_id: VideoId, user_id: impl Into<String>, series_id: impl Into<String>) -> Self {
        Self {
            video_id,
            user_id: user_id.into(),
            series_id: series_id.into(),
            automation_id: None,
            title: String::new(),
            script: String::new(),
            scenes: Vec::new(),
            art_style_prompt: String::new(),
            negative_prompt: None,
            voice_id: String::new(),
            language: "en".to_string(),
            duration_seconds: 30,
            niche: String::new(),
            tone: String::new(),
            llm_provider: None,
            tts_provider: None,
            image_provider: None,
            music_path: None,
            created_at: Utc::now(),
        }
    }

    /// Queue job id.
    pub fn job_id(&self) -> &str {
        self.video_id.as_str()
    }

    pub fn with_automation(mut self, automation_id: impl Into<String>) -> Self {
        self.automation_id = Some(automation_id.into());
        self
    }

    pub fn with_script(mut self, title: impl Into<String>, script: impl Into<String>, scenes: Vec<Scene>) -> Self {
        self.title = title.into();
        self.script = script.into();
        self.scenes = scenes;
        self
    }

    pub fn with_art_style(mut self, prompt: impl Into<String>, negative_prompt: Option<String>) -> Self {
        self.art_style_prompt = prompt.into();
        self.negative_prompt = negative_prompt;
        self
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>, language: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self.language = language.into();
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_mood(mut self, niche: impl Into<String>, tone: impl Into<String>) -> Self {
        self.niche = niche.into();
        self.tone = tone.into();
        self
    }

    pub fn with_providers(mut self, llm: Option<String>, tts: Option<String>, image: Option<String>) -> Self {
        self.llm_provider = llm;
        self.tts_provider = tts;
        self.image_provider = image;
        self
    }

    pub fn with_music(mut self, music_path: Option<String>) -> Self {
        self.music_path = music_path;
        self
    }

    /// Job carrying every generation setting of `automation`. The script
    /// still has to be attached with [`GenerationJob::with_script`].
    pub fn for_automation(video_id: VideoId, automation: &Automation) -> Self {
        Self::new(video_id, automation.user_id.clone(), automation.series_id.clone())
            .with_automation(automation.id.clone())
            .with_art_style(
                automation.art_style.prompt.clone(),
                automation.art_style.negative_prompt.clone(),
            )
            .with_voice(automation.voice_id.clone(), automation.language.clone())
            .with_duration(automation.duration_seconds)
            .with_mood(automation.niche.clone(), automation.tone.clone())
            .with_providers(
                automation.providers.llm.clone(),
                automation.providers.tts.clone(),
                automation.providers.image.clone(),
            )
            .with_music(automation.music_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_video_id() {
        let job = GenerationJob::new(VideoId::from("vid-42"), "user", "series");
        assert_eq!(job.job_id(), "vid-42");
    }

    #[test]
    fn test_payload_omits_empty_overrides() {
        let job = GenerationJob::new(VideoId::from("vid-1"), "user", "series")
            .with_voice("narrator", "hi")
            .with_providers(None, Some("elevenlabs".into()), None);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["video_id"], "vid-1");
        assert_eq!(value["language"], "hi");
        assert_eq!(value["tts_provider"], "elevenlabs");
        assert!(value.get("llm_provider").is_none());
        assert!(value.get("music_path").is_none());
    }

    #[test]
    fn test_for_automation_copies_settings() {
        let automation: Automation = serde_json::from_value(serde_json::json!({
            "id": "auto-1",
            "user_id": "user-1",
            "series_id": "series-1",
            "niche": "horror",
            "tone": "suspenseful",
            "art_style": {"name": "noir", "prompt": "film noir", "negative_prompt": "text"},
            "voice_id": "narrator",
            "language": "es",
            "duration_seconds": 45,
            "providers": {"tts": "elevenlabs"},
            "music_path": "music/dark.mp3",
            "post_times": "09:00",
        }))
        .unwrap();

        let job = GenerationJob::for_automation(VideoId::from("vid-9"), &automation);
        assert_eq!(job.automation_id.as_deref(), Some("auto-1"));
        assert_eq!(job.user_id, "user-1");
        assert_eq!(job.art_style_prompt, "film noir");
        assert_eq!(job.negative_prompt.as_deref(), Some("text"));
        assert_eq!(job.language, "es");
        assert_eq!(job.duration_seconds, 45);
        assert_eq!(job.tone, "suspenseful");
        assert_eq!(job.tts_provider.as_deref(), Some("elevenlabs"));
        assert_eq!(job.music_path.as_deref(), Some("music/dark.mp3"));
        assert!(job.scenes.is_empty());
    }
}
