//! Narration and background music mixing.

use super::timeline::secs;

/// Looped music input and its gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicBed {
    pub input_index: usize,
    pub volume: f32,
}

/// Audio filter chains ending in `out_label`.
///
/// Narration is padded or trimmed to `total_ms`. With music, the bed is
/// trimmed to the same length, scaled, ducked under the narration with a
/// sidechain compressor, and mixed without renormalizing the narration.
pub fn audio_filters(narration_index: usize, music: Option<MusicBed>, total_ms: u64, out_label: &str) -> Vec<String> {
    let total = secs(total_ms);
    let narration = format!("[{narration_index}:a]apad,atrim=0:{total},asetpts=PTS-STARTPTS");

    let Some(bed) = music else {
        return vec![format!("{narration}[{out_label}]")];
    };

    vec![
        format!("{narration},asplit=2[narr][key]"),
        format!(
            "[{}:a]atrim=0:{total},asetpts=PTS-STARTPTS,volume={:.2}[bed]",
            bed.input_index, bed.volume
        ),
        "[bed][key]sidechaincompress=threshold=0.03:ratio=6:attack=15:release=350[ducked]".to_string(),
        format!("[narr][ducked]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[{out_label}]"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narration_only() {
        let filters = audio_filters(3, None, 12_500, "aout");
        assert_eq!(filters, vec!["[3:a]apad,atrim=0:12.500,asetpts=PTS-STARTPTS[aout]"]);
    }

    #[test]
    fn test_music_is_ducked_and_mixed() {
        let bed = MusicBed {
            input_index: 4,
            volume: 0.18,
        };
        let filters = audio_filters(3, Some(bed), 30_000, "aout");
        assert_eq!(filters.len(), 4);
        assert!(filters[0].ends_with("asplit=2[narr][key]"));
        assert_eq!(filters[1], "[4:a]atrim=0:30.000,asetpts=PTS-STARTPTS,volume=0.18[bed]");
        assert!(filters[2].starts_with("[bed][key]sidechaincompress"));
        assert!(filters[3].contains("duration=first"));
        assert!(filters[3].ends_with("[aout]"));
    }
}
