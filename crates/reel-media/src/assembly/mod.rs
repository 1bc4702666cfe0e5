//! Single-pass scene assembly.
//!
//! Turns timed scene images, a narration track and optional music into one
//! captioned vertical video with a single FFmpeg invocation and a single
//! filter graph. No per-scene intermediates are written.

mod audio;
mod captions;
mod style;
mod subtitles;
mod timeline;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use reel_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::has_audio_stream;

pub use audio::MusicBed;
pub use captions::{captions_for_scene, chunk_text, split_phrases, Caption, ScriptFamily};
pub use style::{CaptionCategory, CaptionStyle};
pub use subtitles::render_ass;
pub use timeline::{crossfade_ms, MotionProfile, SceneSlot, Timeline};

/// Default wall-clock limit for one assembly.
const DEFAULT_TIMEOUT_SECS: u64 = 900;

/// A scene image placed on the narration timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedScene {
    /// Narration text shown as captions
    pub text: String,
    pub image_path: PathBuf,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Everything needed to render one video.
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub scenes: Vec<TimedScene>,
    pub narration_path: PathBuf,
    /// Length of the narration track
    pub narration_ms: u64,
    pub music_path: Option<PathBuf>,
    pub niche: String,
    pub tone: String,
    /// Scratch directory for the subtitle file
    pub work_dir: PathBuf,
    pub output_path: PathBuf,
}

/// A rendered video.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledVideo {
    pub path: PathBuf,
    pub duration_ms: u64,
    pub caption_count: usize,
    pub music_used: bool,
}

/// Renders scene images and narration into a finished video.
#[async_trait]
pub trait VideoAssembler: Send + Sync {
    async fn assemble(&self, request: &AssemblyRequest) -> MediaResult<AssembledVideo>;
}

/// [`VideoAssembler`] backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegAssembler {
    encoding: EncodingConfig,
    runner: FfmpegRunner,
    fonts_dir: Option<PathBuf>,
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Fully planned render, ready to turn into a command.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub timeline: Timeline,
    pub captions: Vec<Caption>,
    pub style: CaptionStyle,
    pub category: CaptionCategory,
}

impl FfmpegAssembler {
    pub fn new() -> Self {
        Self {
            encoding: EncodingConfig::default(),
            runner: FfmpegRunner::new().with_timeout(DEFAULT_TIMEOUT_SECS),
            fonts_dir: None,
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = FfmpegRunner::new().with_timeout(secs);
        self
    }

    /// Directory with the caption fonts, passed to libass.
    pub fn with_fonts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fonts_dir = Some(dir.into());
        self
    }

    /// Plan pacing and captions for a request.
    pub fn plan(&self, request: &AssemblyRequest) -> RenderPlan {
        let bounds: Vec<(u64, u64)> = request.scenes.iter().map(|s| (s.start_ms, s.end_ms)).collect();
        let timeline = Timeline::plan(&bounds, request.narration_ms);

        let narration: Vec<&str> = request.scenes.iter().map(|s| s.text.as_str()).collect();
        let family = ScriptFamily::detect(&narration.join(" "));
        let category = CaptionCategory::classify(&request.niche, &request.tone);
        let style = CaptionStyle::lookup(category, family);

        let captions = timeline
            .slots
            .iter()
            .zip(&request.scenes)
            .flat_map(|(slot, scene)| captions_for_scene(&scene.text, slot.start_ms, slot.duration_ms, family))
            .collect();

        RenderPlan {
            timeline,
            captions,
            style,
            category,
        }
    }

    /// Build the single FFmpeg invocation.
    ///
    /// Inputs: scene images `0..n`, narration `n`, looped music `n + 1`.
    pub fn build_command(
        &self,
        request: &AssemblyRequest,
        plan: &RenderPlan,
        subtitles_path: &Path,
        music: Option<&Path>,
    ) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(&request.output_path);
        for scene in &request.scenes {
            cmd = cmd.input(&scene.image_path);
        }

        let narration_index = cmd.input_count();
        cmd = cmd.input(&request.narration_path);

        let bed = match music {
            Some(path) => {
                let input_index = cmd.input_count();
                cmd = cmd.input_with_args(["-stream_loop", "-1"], path);
                Some(MusicBed {
                    input_index,
                    volume: plan.category.music_volume(),
                })
            }
            None => None,
        };

        let mut filters = plan.timeline.video_filters(&self.encoding, "vbase");
        filters.push(self.subtitle_filter(subtitles_path, "vbase", "vout"));
        filters.extend(audio::audio_filters(narration_index, bed, plan.timeline.total_ms, "aout"));

        cmd.filter_complex(filters.join(";"))
            .map("[vout]")
            .map("[aout]")
            .output_args(self.encoding.to_ffmpeg_args())
            .output_arg("-t")
            .output_arg(timeline::secs(plan.timeline.total_ms))
    }

    fn subtitle_filter(&self, path: &Path, input: &str, output: &str) -> String {
        let file = subtitles::escape_filter_path(&path.to_string_lossy());
        match &self.fonts_dir {
            Some(dir) => format!(
                "[{input}]ass=filename='{file}':fontsdir='{}'[{output}]",
                subtitles::escape_filter_path(&dir.to_string_lossy())
            ),
            None => format!("[{input}]ass=filename='{file}'[{output}]"),
        }
    }

    fn validate(request: &AssemblyRequest) -> MediaResult<()> {
        if request.scenes.is_empty() {
            return Err(MediaError::invalid_input("no scenes to assemble"));
        }
        if !request.narration_path.exists() {
            return Err(MediaError::FileNotFound(request.narration_path.clone()));
        }
        for scene in &request.scenes {
            if !scene.image_path.exists() {
                return Err(MediaError::FileNotFound(scene.image_path.clone()));
            }
        }
        Ok(())
    }

    /// Music input to use, or `None` when it is missing or silent.
    async fn usable_music(path: Option<&Path>) -> Option<PathBuf> {
        let path = path?;
        if !path.exists() {
            warn!(music = %path.display(), "Music file not found, rendering narration only");
            return None;
        }
        match has_audio_stream(path).await {
            Ok(true) => Some(path.to_path_buf()),
            Ok(false) => {
                info!(music = %path.display(), "Music has no audio stream, skipping background music");
                None
            }
            Err(e) => {
                warn!(music = %path.display(), "Could not probe music, skipping: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl VideoAssembler for FfmpegAssembler {
    async fn assemble(&self, request: &AssemblyRequest) -> MediaResult<AssembledVideo> {
        Self::validate(request)?;
        let started = Instant::now();

        let plan = self.plan(request);
        tokio::fs::create_dir_all(&request.work_dir).await?;
        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let subtitles_path = request.work_dir.join("captions.ass");
        let ass = render_ass(&plan.captions, &plan.style, self.encoding.width, self.encoding.height);
        tokio::fs::write(&subtitles_path, ass).await?;

        let music = Self::usable_music(request.music_path.as_deref()).await;
        let cmd = self.build_command(request, &plan, &subtitles_path, music.as_deref());

        info!(
            scenes = request.scenes.len(),
            captions = plan.captions.len(),
            duration_ms = plan.timeline.total_ms,
            music = music.is_some(),
            category = ?plan.category,
            "Assembling video"
        );

        let total_ms = plan.timeline.total_ms as i64;
        self.runner
            .run_with_progress(&cmd, move |p| {
                debug!("Assembly progress: {:.0}%", p.percentage(total_ms));
            })
            .await?;

        if !request.output_path.exists() {
            return Err(MediaError::internal("FFmpeg finished without writing the output file"));
        }

        metrics::histogram!("reel_assembly_duration_seconds").record(started.elapsed().as_secs_f64());

        Ok(AssembledVideo {
            path: request.output_path.clone(),
            duration_ms: plan.timeline.total_ms,
            caption_count: plan.captions.len(),
            music_used: music.is_some(),
        })
    }
}
