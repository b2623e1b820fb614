//! Cleaning tmux output and spotting approval dialogs in it.

mod ansi;
mod prompt;

pub use ansi::{collapse_whitespace, strip_ansi};
pub use prompt::{
    extract_prompt, is_destructive_prompt, parse_output, ParsedOutput, PromptInfo, PromptMatcher,
    DEFAULT_DESTRUCTIVE_KEYWORDS, DEFAULT_SELECT_GLYPHS,
};

/// Shorten `text` to at most `max` characters, marking the cut with "...".
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Hard cut at `max` characters, never splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
