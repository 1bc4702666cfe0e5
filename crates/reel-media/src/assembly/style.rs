//! Caption look and music level per content category.

use super::captions::ScriptFamily;

/// Coarse mood of a video, derived from its niche and tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionCategory {
    Horror,
    Energetic,
    Calm,
    Neutral,
}

const HORROR_KEYWORDS: &[&str] = &[
    "horror", "scary", "creepy", "dark", "mystery", "crime", "paranormal", "thriller", "suspense",
];
const ENERGETIC_KEYWORDS: &[&str] = &[
    "motivation", "fitness", "sport", "hype", "energetic", "exciting", "funny", "comedy", "facts",
];
const CALM_KEYWORDS: &[&str] = &[
    "calm", "relax", "sleep", "meditation", "nature", "history", "philosophy", "soothing", "stoic",
];

impl CaptionCategory {
    /// Classify by tone first, then niche.
    pub fn classify(niche: &str, tone: &str) -> Self {
        [tone, niche]
            .iter()
            .find_map(|text| Self::from_keywords(&text.to_lowercase()))
            .unwrap_or(CaptionCategory::Neutral)
    }

    fn from_keywords(text: &str) -> Option<Self> {
        let hit = |words: &[&str]| words.iter().any(|w| text.contains(w));
        if hit(HORROR_KEYWORDS) {
            Some(CaptionCategory::Horror)
        } else if hit(ENERGETIC_KEYWORDS) {
            Some(CaptionCategory::Energetic)
        } else if hit(CALM_KEYWORDS) {
            Some(CaptionCategory::Calm)
        } else {
            None
        }
    }

    /// Background music gain before ducking.
    pub fn music_volume(&self) -> f32 {
        match self {
            CaptionCategory::Horror => 0.18,
            CaptionCategory::Energetic => 0.22,
            CaptionCategory::Calm => 0.14,
            CaptionCategory::Neutral => 0.16,
        }
    }
}

/// ASS style fields for burned-in captions.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub font_name: String,
    pub font_size: u32,
    /// `&HAABBGGRR`
    pub primary_colour: &'static str,
    pub outline_colour: &'static str,
    pub back_colour: &'static str,
    pub bold: bool,
    pub outline: f32,
    pub shadow: f32,
    /// Distance from the bottom edge
    pub margin_v: u32,
    pub uppercase: bool,
}

impl CaptionStyle {
    /// Style for a category, with a font that can render `family`.
    pub fn lookup(category: CaptionCategory, family: ScriptFamily) -> Self {
        let mut style = match category {
            CaptionCategory::Horror => CaptionStyle {
                font_name: "Oswald".to_string(),
                font_size: 80,
                primary_colour: "&H00F0F0F0",
                outline_colour: "&H00000000",
                back_colour: "&H80000000",
                bold: true,
                outline: 5.0,
                shadow: 2.0,
                margin_v: 520,
                uppercase: true,
            },
            CaptionCategory::Energetic => CaptionStyle {
                font_name: "Montserrat".to_string(),
                font_size: 88,
                primary_colour: "&H0000E5FF",
                outline_colour: "&H00000000",
                back_colour: "&H00000000",
                bold: true,
                outline: 6.0,
                shadow: 0.0,
                margin_v: 560,
                uppercase: true,
            },
            CaptionCategory::Calm => CaptionStyle {
                font_name: "Lora".to_string(),
                font_size: 70,
                primary_colour: "&H00FFFFFF",
                outline_colour: "&H00303030",
                back_colour: "&H60000000",
                bold: false,
                outline: 3.0,
                shadow: 1.0,
                margin_v: 480,
                uppercase: false,
            },
            CaptionCategory::Neutral => CaptionStyle {
                font_name: "Montserrat".to_string(),
                font_size: 76,
                primary_colour: "&H00FFFFFF",
                outline_colour: "&H00000000",
                back_colour: "&H80000000",
                bold: true,
                outline: 5.0,
                shadow: 1.0,
                margin_v: 500,
                uppercase: false,
            },
        };

        if let Some(font) = family.font_override() {
            style.font_name = font.to_string();
        }
        style.uppercase &= family.has_case();
        style
    }
}
