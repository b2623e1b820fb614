use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// CSI (`ESC [ ... letter`), OSC (`ESC ] ... BEL` or `ESC ] ... ESC \`) and
/// charset selection (`ESC ( X`).
static RE_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[a-zA-Z]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][AB012]")
        .unwrap()
});

/// Remove terminal escape sequences, leaving every visible character alone.
///
/// Removal is repeated until nothing matches, so a sequence that only forms
/// once an inner one is gone is removed too and the result is a fixed point.
pub fn strip_ansi(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = match RE_ESCAPE.replace_all(&current, "") {
            Cow::Borrowed(_) => None,
            Cow::Owned(next) => Some(next),
        };
        match next {
            Some(next) => current = next,
            None => return current,
        }
    }
}

/// Right-trim every line and squeeze blank runs down to a single blank line.
///
/// Leading whitespace is kept because option indentation matters to the
/// prompt detector. Leading and trailing blank lines are dropped.
pub fn collapse_whitespace<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());

    for line in lines {
        let trimmed = line.as_ref().trim_end();
        if trimmed.is_empty() {
            if matches!(out.last(), Some(prev) if !prev.is_empty()) {
                out.push(String::new());
            }
        } else {
            out.push(trimmed.to_string());
        }
    }

    while matches!(out.last(), Some(last) if last.is_empty()) {
        out.pop();
    }

    out
}
