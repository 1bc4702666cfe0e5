//! Scene timing estimation for speech backends that do not report it.

use serde::{Deserialize, Serialize};

/// Where one scene sits in the narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneTiming {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl SceneTiming {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Split `total_ms` across scenes in proportion to their character count.
///
/// Timings are contiguous, start at 0 and end exactly at `total_ms`. Empty
/// scenes still get one character's worth so every scene is visible.
pub fn estimate_scene_timings<S: AsRef<str>>(texts: &[S], total_ms: u64) -> Vec<SceneTiming> {
    if texts.is_empty() {
        return Vec::new();
    }
    let weights: Vec<u64> = texts
        .iter()
        .map(|t| t.as_ref().trim().chars().count().max(1) as u64)
        .collect();
    let total_weight: u64 = weights.iter().sum();

    let mut timings = Vec::with_capacity(texts.len());
    let mut consumed_weight = 0;
    let mut start_ms = 0;
    for (i, weight) in weights.iter().enumerate() {
        consumed_weight += weight;
        let end_ms = if i + 1 == weights.len() {
            total_ms
        } else {
            total_ms * consumed_weight / total_weight
        };
        timings.push(SceneTiming { start_ms, end_ms });
        start_ms = end_ms;
    }
    timings
}
