//! Request and response shapes of the provider contract.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use reel_models::{Automation, Scene};

use crate::timing::SceneTiming;

/// What the script generator needs to know.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptInput {
    pub niche: String,
    pub tone: String,
    pub language: String,
    pub duration_seconds: u32,
    pub art_style: String,
    /// Backend override, e.g. "gemini"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ScriptInput {
    pub fn for_automation(automation: &Automation) -> Self {
        Self {
            niche: automation.niche.clone(),
            tone: automation.tone.clone(),
            language: automation.language.clone(),
            duration_seconds: automation.duration_seconds,
            art_style: automation.art_style.name.clone(),
            provider: automation.providers.llm.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedScript {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub scenes: Vec<Scene>,
}

impl GeneratedScript {
    /// Full narration: scene texts joined by spaces.
    pub fn narration(&self) -> String {
        self.scenes
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub script: String,
    pub scenes: Vec<Scene>,
    pub voice_id: String,
    pub language: String,
    pub provider: Option<String>,
    /// Where the audio file is written
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOutput {
    pub audio_path: PathBuf,
    pub duration_ms: u64,
    /// One per scene, contiguous
    pub scene_timings: Vec<SceneTiming>,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Visual description per scene
    pub prompts: Vec<String>,
    pub style_prompt: String,
    pub negative_prompt: Option<String>,
    pub provider: Option<String>,
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSet {
    /// One per scene, in order
    pub image_paths: Vec<PathBuf>,
    /// Directory holding the images; removed with the job's work dir
    pub tmp_dir: PathBuf,
}
