//! FFmpeg CLI wrapper and video assembly.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - FFprobe stream inspection
//! - The single-pass scene assembler (motion, crossfades, captions, music)

pub mod assembly;
pub mod command;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod progress;

pub use assembly::{
    AssembledVideo, AssemblyRequest, CaptionCategory, FfmpegAssembler, TimedScene, VideoAssembler,
};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, remove_dir_quietly};
pub use probe::{get_duration, has_audio_stream, probe_media, MediaInfo};
pub use progress::FfmpegProgress;
