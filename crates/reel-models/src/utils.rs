//! Small shared helpers.

/// Default bound for user-visible error detail.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Truncate `message` to at most `max_chars` characters, appending an
/// ellipsis when anything was cut. Always splits on a char boundary.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = trimmed.chars().take(keep).collect();
    out.push_str("...");
    out
}
