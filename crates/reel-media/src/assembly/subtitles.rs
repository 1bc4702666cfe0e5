//! ASS subtitle rendering for burned-in captions.

use std::fmt::Write as _;

use super::captions::Caption;
use super::style::CaptionStyle;

/// ASS timestamp `H:MM:SS.cc`.
fn ass_time(ms: u64) -> String {
    let cs = ms / 10;
    format!(
        "{}:{:02}:{:02}.{:02}",
        cs / 360_000,
        (cs / 6000) % 60,
        (cs / 100) % 60,
        cs % 100
    )
}

/// Neutralize override blocks and line breaks in caption text.
fn escape_text(text: &str) -> String {
    text.replace('\\', "/")
        .replace('{', "(")
        .replace('}', ")")
        .replace(['\n', '\r'], " ")
}

/// Render a complete `.ass` document.
pub fn render_ass(captions: &[Caption], style: &CaptionStyle, width: u32, height: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[Script Info]");
    let _ = writeln!(out, "ScriptType: v4.00+");
    let _ = writeln!(out, "PlayResX: {width}");
    let _ = writeln!(out, "PlayResY: {height}");
    let _ = writeln!(out, "WrapStyle: 0");
    let _ = writeln!(out, "ScaledBorderAndShadow: yes");
    let _ = writeln!(out);
    let _ = writeln!(out, "[V4+ Styles]");
    let _ = writeln!(
        out,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, \
Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, \
Alignment, MarginL, MarginR, MarginV, Encoding"
    );
    let _ = writeln!(
        out,
        "Style: Caption,{font},{size},{primary},&H000000FF,{outline_colour},{back},{bold},0,0,0,100,100,0,0,1,{outline:.1},{shadow:.1},2,80,80,{margin_v},1",
        font = style.font_name,
        size = style.font_size,
        primary = style.primary_colour,
        outline_colour = style.outline_colour,
        back = style.back_colour,
        bold = if style.bold { -1 } else { 0 },
        outline = style.outline,
        shadow = style.shadow,
        margin_v = style.margin_v,
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "[Events]");
    let _ = writeln!(
        out,
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
    );

    for caption in captions {
        let text = if style.uppercase {
            caption.text.to_uppercase()
        } else {
            caption.text.clone()
        };
        let _ = writeln!(
            out,
            "Dialogue: 0,{},{},Caption,,0,0,0,,{}",
            ass_time(caption.start_ms),
            ass_time(caption.end_ms),
            escape_text(&text)
        );
    }
    out
}

/// Escape a path for use inside a quoted filter option.
pub(crate) fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "\\\\").replace('\'', "\\'").replace(':', "\\:")
}
