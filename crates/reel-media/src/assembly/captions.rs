//! Caption chunking and timing.

/// Shortest time a caption stays on screen.
pub const MIN_CAPTION_MS: u64 = 400;
/// Longest time a caption stays on screen.
pub const MAX_CAPTION_MS: u64 = 4500;

/// Writing system of the narration, used for chunk limits and fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFamily {
    Latin,
    Cyrillic,
    Greek,
    Devanagari,
    Arabic,
    Hebrew,
    Thai,
    Cjk,
}

/// How far a single caption may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLimit {
    Words(usize),
    Chars(usize),
}

impl ScriptFamily {
    fn of_char(c: char) -> Option<ScriptFamily> {
        let family = match c as u32 {
            0x0400..=0x04FF => ScriptFamily::Cyrillic,
            0x0370..=0x03FF => ScriptFamily::Greek,
            0x0900..=0x097F => ScriptFamily::Devanagari,
            0x0600..=0x06FF | 0x0750..=0x077F => ScriptFamily::Arabic,
            0x0590..=0x05FF => ScriptFamily::Hebrew,
            0x0E00..=0x0E7F => ScriptFamily::Thai,
            0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF => ScriptFamily::Cjk,
            _ if c.is_alphabetic() => ScriptFamily::Latin,
            _ => return None,
        };
        Some(family)
    }

    /// Dominant script among the letters of `text`. Defaults to Latin.
    pub fn detect(text: &str) -> ScriptFamily {
        const FAMILIES: [ScriptFamily; 8] = [
            ScriptFamily::Latin,
            ScriptFamily::Cyrillic,
            ScriptFamily::Greek,
            ScriptFamily::Devanagari,
            ScriptFamily::Arabic,
            ScriptFamily::Hebrew,
            ScriptFamily::Thai,
            ScriptFamily::Cjk,
        ];
        let mut counts = [0usize; FAMILIES.len()];
        for family in text.chars().filter_map(ScriptFamily::of_char) {
            if let Some(slot) = FAMILIES.iter().position(|f| *f == family) {
                counts[slot] += 1;
            }
        }
        counts
            .iter()
            .enumerate()
            .filter(|(_, &n)| n > 0)
            .max_by_key(|(i, &n)| (n, usize::MAX - i))
            .map(|(i, _)| FAMILIES[i])
            .unwrap_or(ScriptFamily::Latin)
    }

    pub fn chunk_limit(&self) -> ChunkLimit {
        match self {
            ScriptFamily::Latin | ScriptFamily::Cyrillic | ScriptFamily::Greek => ChunkLimit::Words(5),
            ScriptFamily::Devanagari | ScriptFamily::Arabic | ScriptFamily::Hebrew | ScriptFamily::Thai => {
                ChunkLimit::Words(4)
            }
            ScriptFamily::Cjk => ChunkLimit::Chars(12),
        }
    }

    /// Font able to render this script, when the style's own font may not.
    pub fn font_override(&self) -> Option<&'static str> {
        match self {
            ScriptFamily::Latin => None,
            ScriptFamily::Cyrillic | ScriptFamily::Greek => Some("Noto Sans"),
            ScriptFamily::Devanagari => Some("Noto Sans Devanagari"),
            ScriptFamily::Arabic => Some("Noto Sans Arabic"),
            ScriptFamily::Hebrew => Some("Noto Sans Hebrew"),
            ScriptFamily::Thai => Some("Noto Sans Thai"),
            ScriptFamily::Cjk => Some("Noto Sans CJK SC"),
        }
    }

    /// Whether upper-casing changes anything for this script.
    pub fn has_case(&self) -> bool {
        matches!(self, ScriptFamily::Latin | ScriptFamily::Cyrillic | ScriptFamily::Greek)
    }
}

/// One timed caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Caption {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Punctuation that ends a phrase only when followed by whitespace.
fn is_spaced_break(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ',' | ';' | ':' | '…')
}

/// Punctuation that always ends a phrase (scripts without spaces after it).
fn is_hard_break(c: char) -> bool {
    matches!(
        c,
        '。' | '！' | '？' | '，' | '、' | '；' | '：' | '।' | '॥' | '،' | '؛' | '؟'
    )
}

/// Split narration into phrases at punctuation, keeping the punctuation
/// with the phrase it ends.
pub fn split_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let ends = is_hard_break(c)
            || (is_spaced_break(c) && chars.peek().map_or(true, |n| n.is_whitespace()));
        if ends {
            // Keep runs like "?!" or "..." together.
            while let Some(&n) = chars.peek() {
                if is_spaced_break(n) || is_hard_break(n) {
                    current.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            push_trimmed(&mut phrases, &mut current);
        }
    }
    push_trimmed(&mut phrases, &mut current);
    phrases
}

fn push_trimmed(phrases: &mut Vec<String>, current: &mut String) {
    let phrase = current.trim();
    if !phrase.is_empty() {
        phrases.push(phrase.to_string());
    }
    current.clear();
}

/// Split `items` into the fewest pieces of at most `limit`, as evenly as possible.
fn balanced_split<T: Clone>(items: &[T], limit: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let limit = limit.max(1);
    let pieces = items.len().div_ceil(limit);
    let base = items.len() / pieces;
    let extra = items.len() % pieces;

    let mut out = Vec::with_capacity(pieces);
    let mut offset = 0;
    for i in 0..pieces {
        let len = base + usize::from(i < extra);
        out.push(items[offset..offset + len].to_vec());
        offset += len;
    }
    out
}

/// Break narration into on-screen chunks.
pub fn chunk_text(text: &str, family: ScriptFamily) -> Vec<String> {
    split_phrases(text)
        .into_iter()
        .flat_map(|phrase| match family.chunk_limit() {
            ChunkLimit::Words(limit) => {
                let words: Vec<&str> = phrase.split_whitespace().collect();
                balanced_split(&words, limit)
                    .into_iter()
                    .map(|piece| piece.join(" "))
                    .collect::<Vec<_>>()
            }
            ChunkLimit::Chars(limit) => {
                let chars: Vec<char> = phrase.chars().filter(|c| !c.is_whitespace()).collect();
                balanced_split(&chars, limit)
                    .into_iter()
                    .map(|piece| piece.into_iter().collect())
                    .collect::<Vec<_>>()
            }
        })
        .collect()
}

/// Merge neighbouring chunks until each can be shown for [`MIN_CAPTION_MS`].
fn fit_chunks(chunks: &[String], scene_ms: u64, separator: &str) -> Vec<String> {
    let capacity = ((scene_ms / MIN_CAPTION_MS) as usize).max(1);
    if chunks.len() <= capacity {
        return chunks.to_vec();
    }
    balanced_split(chunks, chunks.len().div_ceil(capacity))
        .into_iter()
        .map(|group| group.join(separator))
        .collect()
}

/// Lay chunks out across a scene, each lasting in proportion to its length.
///
/// Durations are clamped to [`MIN_CAPTION_MS`, `MAX_CAPTION_MS`] and never run
/// past the end of the scene. Every chunk is shown: when the scene is too short
/// for all of them, neighbours are merged first, and each chunk leaves enough
/// room for the ones after it.
pub fn time_chunks(chunks: &[String], scene_start_ms: u64, scene_ms: u64) -> Vec<Caption> {
    layout_chunks(&fit_chunks(chunks, scene_ms, " "), scene_start_ms, scene_ms)
}

fn layout_chunks(chunks: &[String], scene_start_ms: u64, scene_ms: u64) -> Vec<Caption> {
    let lengths: Vec<u64> = chunks.iter().map(|c| c.chars().count() as u64).collect();
    let total: u64 = lengths.iter().sum();
    if total == 0 || scene_ms == 0 {
        return Vec::new();
    }

    let scene_end = scene_start_ms + scene_ms;
    let mut captions = Vec::with_capacity(chunks.len());
    let mut cursor = scene_start_ms;

    for (i, (chunk, len)) in chunks.iter().zip(lengths).enumerate() {
        let after = (chunks.len() - i - 1) as u64;
        let latest_end = scene_end.saturating_sub(after * MIN_CAPTION_MS).max(cursor);
        let share = (scene_ms * len + total / 2) / total;
        let duration = share.clamp(MIN_CAPTION_MS, MAX_CAPTION_MS);
        let end = if after == 0 {
            (cursor + duration).min(scene_end)
        } else {
            (cursor + duration).min(latest_end)
        };
        captions.push(Caption {
            text: chunk.clone(),
            start_ms: cursor,
            end_ms: end,
        });
        cursor = end;
    }
    captions
}

/// Chunk and time one scene's narration.
pub fn captions_for_scene(text: &str, scene_start_ms: u64, scene_ms: u64, family: ScriptFamily) -> Vec<Caption> {
    let separator = match family.chunk_limit() {
        ChunkLimit::Chars(_) => "",
        ChunkLimit::Words(_) => " ",
    };
    let chunks = fit_chunks(&chunk_text(text, family), scene_ms, separator);
    layout_chunks(&chunks, scene_start_ms, scene_ms)
}
