//! Scene pacing: durations, motion profiles and crossfade offsets.
//!
//! Every clip but the last is rendered `fade` longer than its slot so the
//! crossfade into the next clip eats the overlap. The xfade for join `i`
//! starts at the sum of slot durations `0..=i`, which keeps the rendered
//! video exactly as long as the narration.

use reel_models::EncodingConfig;

/// Nominal crossfade between scenes.
pub const CROSSFADE_MS: u64 = 180;
/// Floor for a scene slot so zoompan always has frames to work with.
pub const MIN_SCENE_MS: u64 = 500;
/// Images are upscaled by this factor before zoompan to avoid jitter.
const OVERSCAN: u32 = 2;

/// Camera motion applied to a still image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionProfile {
    /// Opening scene: quick push in to grab attention
    HookZoomIn,
    /// Closing scene: pull back out
    ResolveZoomOut,
    PanRight,
    PanLeft,
    DriftUp,
    SlowZoomIn,
}

const INTERIOR_CYCLE: [MotionProfile; 4] = [
    MotionProfile::PanRight,
    MotionProfile::PanLeft,
    MotionProfile::DriftUp,
    MotionProfile::SlowZoomIn,
];

impl MotionProfile {
    /// Profile for scene `index` of `count`.
    pub fn for_scene(index: usize, count: usize) -> Self {
        if index == 0 {
            MotionProfile::HookZoomIn
        } else if index + 1 == count {
            MotionProfile::ResolveZoomOut
        } else {
            INTERIOR_CYCLE[(index - 1) % INTERIOR_CYCLE.len()]
        }
    }

    /// zoompan `z`, `x`, `y` expressions over `frames` output frames.
    fn expressions(&self, frames: u32) -> (String, String, String) {
        let span = frames.saturating_sub(1).max(1);
        let center_x = "iw/2-(iw/zoom/2)".to_string();
        let center_y = "ih/2-(ih/zoom/2)".to_string();
        match self {
            MotionProfile::HookZoomIn => (
                format!("min(1.0+0.18*on/{span},1.18)"),
                center_x,
                center_y,
            ),
            MotionProfile::ResolveZoomOut => (
                format!("max(1.15-0.15*on/{span},1.0)"),
                center_x,
                center_y,
            ),
            MotionProfile::SlowZoomIn => (format!("1.0+0.08*on/{span}"), center_x, center_y),
            MotionProfile::PanRight => (
                "1.12".to_string(),
                format!("(iw-iw/zoom)*on/{span}"),
                center_y,
            ),
            MotionProfile::PanLeft => (
                "1.12".to_string(),
                format!("(iw-iw/zoom)*(1-on/{span})"),
                center_y,
            ),
            MotionProfile::DriftUp => (
                "1.12".to_string(),
                center_x,
                format!("(ih-ih/zoom)*(1-on/{span})"),
            ),
        }
    }
}

/// One scene's place in the output timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSlot {
    pub index: usize,
    pub start_ms: u64,
    pub duration_ms: u64,
    /// Crossfade into the next scene (0 for the last)
    pub fade_out_ms: u64,
    pub motion: MotionProfile,
}

impl SceneSlot {
    /// Rendered clip length, including the overlap consumed by the fade.
    pub fn clip_ms(&self) -> u64 {
        self.duration_ms + self.fade_out_ms
    }
}

/// Planned output timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub slots: Vec<SceneSlot>,
    pub total_ms: u64,
}

/// Crossfade for a join between two scenes.
pub fn crossfade_ms(a_ms: u64, b_ms: u64) -> u64 {
    CROSSFADE_MS.min(a_ms.min(b_ms) / 4)
}

impl Timeline {
    /// Plan slots from `(start_ms, end_ms)` narration bounds.
    ///
    /// Slot `i` runs from the start of scene `i` to the start of scene
    /// `i + 1`, so pauses between narrated lines stay on the preceding
    /// image. The first slot starts at zero and the last one stretches to
    /// the end of the narration.
    pub fn plan(bounds: &[(u64, u64)], narration_ms: u64) -> Timeline {
        let count = bounds.len();
        let mut durations = Vec::with_capacity(count);
        for i in 0..count {
            let from = if i == 0 { 0 } else { bounds[i].0 };
            let to = if i + 1 < count {
                bounds[i + 1].0
            } else {
                bounds[i].1.max(narration_ms)
            };
            durations.push(to.saturating_sub(from).max(MIN_SCENE_MS));
        }

        let mut slots = Vec::with_capacity(count);
        let mut start_ms = 0;
        for (i, &duration_ms) in durations.iter().enumerate() {
            let fade_out_ms = durations
                .get(i + 1)
                .map(|&next| crossfade_ms(duration_ms, next))
                .unwrap_or(0);
            slots.push(SceneSlot {
                index: i,
                start_ms,
                duration_ms,
                fade_out_ms,
                motion: MotionProfile::for_scene(i, count),
            });
            start_ms += duration_ms;
        }

        Timeline {
            slots,
            total_ms: start_ms,
        }
    }

    /// xfade offset for the join between slot `i` and `i + 1`.
    pub fn xfade_offset_ms(&self, i: usize) -> u64 {
        self.slots[..=i].iter().map(|s| s.duration_ms).sum()
    }

    /// Filter chains rendering each image and crossfading them into `out_label`.
    ///
    /// Image `i` is expected at input index `i`.
    pub fn video_filters(&self, encoding: &EncodingConfig, out_label: &str) -> Vec<String> {
        let mut filters: Vec<String> = self
            .slots
            .iter()
            .map(|slot| scene_filter(slot, encoding))
            .collect();

        if self.slots.len() == 1 {
            filters.push(format!("[s0]null[{out_label}]"));
            return filters;
        }

        let mut previous = "s0".to_string();
        for i in 0..self.slots.len() - 1 {
            let label = if i + 2 == self.slots.len() {
                out_label.to_string()
            } else {
                format!("x{}", i + 1)
            };
            filters.push(format!(
                "[{previous}][s{next}]xfade=transition=fade:duration={fade}:offset={offset}[{label}]",
                next = i + 1,
                fade = secs(self.slots[i].fade_out_ms),
                offset = secs(self.xfade_offset_ms(i)),
            ));
            previous = label;
        }
        filters
    }
}

fn scene_filter(slot: &SceneSlot, encoding: &EncodingConfig) -> String {
    let frames = ((slot.clip_ms() * encoding.fps as u64).div_ceil(1000)).max(1) as u32;
    let (z, x, y) = slot.motion.expressions(frames);
    let (w, h) = (encoding.width, encoding.height);
    format!(
        "[{i}:v]scale={ow}:{oh}:force_original_aspect_ratio=increase,crop={ow}:{oh},setsar=1,\
zoompan=z='{z}':x='{x}':y='{y}':d={frames}:s={w}x{h}:fps={fps},\
trim=duration={dur},setpts=PTS-STARTPTS,format=yuv420p[s{i}]",
        i = slot.index,
        ow = w * OVERSCAN,
        oh = h * OVERSCAN,
        fps = encoding.fps,
        dur = secs(slot.clip_ms()),
    )
}

pub(crate) fn secs(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_assignment() {
        assert_eq!(MotionProfile::for_scene(0, 1), MotionProfile::HookZoomIn);
        assert_eq!(MotionProfile::for_scene(0, 6), MotionProfile::HookZoomIn);
        assert_eq!(MotionProfile::for_scene(1, 6), MotionProfile::PanRight);
        assert_eq!(MotionProfile::for_scene(2, 6), MotionProfile::PanLeft);
        assert_eq!(MotionProfile::for_scene(3, 6), MotionProfile::DriftUp);
        assert_eq!(MotionProfile::for_scene(4, 6), MotionProfile::SlowZoomIn);
        assert_eq!(MotionProfile::for_scene(5, 6), MotionProfile::ResolveZoomOut);
        assert_eq!(MotionProfile::for_scene(5, 7), MotionProfile::PanRight);
    }

    #[test]
    fn test_crossfade_clamped_to_quarter_of_shorter_scene() {
        assert_eq!(crossfade_ms(4000, 5000), 180);
        assert_eq!(crossfade_ms(600, 5000), 150);
        assert_eq!(crossfade_ms(5000, 500), 125);
    }

    #[test]
    fn test_plan_totals_match_narration() {
        let bounds = [(0, 4000), (4000, 9000), (9000, 14_500)];
        let timeline = Timeline::plan(&bounds, 15_000);

        let durations: Vec<u64> = timeline.slots.iter().map(|s| s.duration_ms).collect();
        assert_eq!(durations, vec![4000, 5000, 6000]);
        assert_eq!(timeline.total_ms, 15_000);
        assert_eq!(timeline.slots[2].start_ms, 9000);
        assert_eq!(timeline.slots[2].fade_out_ms, 0);
        assert_eq!(timeline.xfade_offset_ms(0), 4000);
        assert_eq!(timeline.xfade_offset_ms(1), 9000);
    }

    #[test]
    fn test_plan_absorbs_gaps_and_leading_silence() {
        let bounds = [(300, 2000), (2400, 5000)];
        let timeline = Timeline::plan(&bounds, 5200);
        assert_eq!(timeline.slots[0].duration_ms, 2400);
        assert_eq!(timeline.slots[1].duration_ms, 2800);
        assert_eq!(timeline.total_ms, 5200);
    }

    #[test]
    fn test_video_filters_chain() {
        let timeline = Timeline::plan(&[(0, 3000), (3000, 6000), (6000, 9000)], 9000);
        let filters = timeline.video_filters(&EncodingConfig::default(), "vbase");

        assert_eq!(filters.len(), 5);
        assert!(filters[0].starts_with("[0:v]scale=2160:3840"));
        assert!(filters[0].contains("s=1080x1920:fps=30"));
        assert!(filters[0].ends_with("[s0]"));
        assert_eq!(
            filters[3],
            "[s0][s1]xfade=transition=fade:duration=0.180:offset=3.000[x1]"
        );
        assert_eq!(
            filters[4],
            "[x1][s2]xfade=transition=fade:duration=0.180:offset=6.000[vbase]"
        );
    }

    #[test]
    fn test_single_scene_passthrough() {
        let timeline = Timeline::plan(&[(0, 2000)], 2500);
        let filters = timeline.video_filters(&EncodingConfig::default(), "vbase");
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1], "[s0]null[vbase]");
        assert_eq!(timeline.total_ms, 2500);
        assert_eq!(timeline.slots[0].motion, MotionProfile::HookZoomIn);
    }
}
