//! FFmpeg `-progress` parsing.

/// Snapshot of an encode in progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Frames written so far
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Set on the final `progress=end` block
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Percentage of `total_duration_ms` encoded, capped at 100.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }

    /// Feed one `key=value` line. Returns a snapshot at the end of each block.
    pub fn update(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // out_time_ms is in microseconds despite its name
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(Ok(speed)) = value.strip_suffix('x').map(|s| s.trim().parse()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }
}

/// `key=value` lines belong to the progress stream, everything else is log output.
pub(crate) fn is_progress_line(line: &str) -> bool {
    let line = line.trim();
    match line.split_once('=') {
        Some((key, _)) => !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        None => false,
    }
}
