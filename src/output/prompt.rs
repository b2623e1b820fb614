use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{collapse_whitespace, strip_ansi, truncate_with_ellipsis};
use crate::error::{MonitorError, Result};

/// Glyphs Claude-style CLIs draw in front of the highlighted option.
pub const DEFAULT_SELECT_GLYPHS: &[&str] = &[">", "❯"];

/// Words that make a question unsafe to approve without a human.
pub const DEFAULT_DESTRUCTIVE_KEYWORDS: &[&str] = &[
    "delete",
    "remove",
    "overwrite",
    "drop",
    "destroy",
    "erase",
    "truncate",
    "wipe",
    "purge",
    "reset",
    "force",
    "rm -",
];

const MAX_OPTION_CHARS: usize = 60;

static RE_QUESTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Do you want to (.+?)\?").unwrap());

static DEFAULT_MATCHER: Lazy<PromptMatcher> = Lazy::new(PromptMatcher::default);

/// An interactive approval dialog found in pane output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInfo {
    pub question: String,
    pub options: Vec<String>,
    pub selected_index: usize,
}

/// Cleaned pane output, trimmed so a pending prompt stays visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    pub raw_lines: Vec<String>,
    pub clean_lines: Vec<String>,
    pub prompt: Option<PromptInfo>,
}

/// Where a prompt sits inside the scanned lines.
struct PromptSpan {
    prompt: PromptInfo,
    question_line: usize,
    last_option_line: usize,
}

/// Compiled prompt patterns for one glyph set and keyword list.
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    option: Regex,
    selected: Option<Regex>,
    destructive_keywords: Vec<String>,
}

impl PromptMatcher {
    /// Build a matcher for the given cursor glyphs.
    ///
    /// `extra_keywords` extend the built-in destructive list; they can never
    /// shrink it.
    pub fn new<G, K>(glyphs: &[G], extra_keywords: &[K]) -> Result<Self>
    where
        G: AsRef<str>,
        K: AsRef<str>,
    {
        let alternation = glyphs
            .iter()
            .map(|g| g.as_ref().trim())
            .filter(|g| !g.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");

        let (option, selected) = if alternation.is_empty() {
            (Regex::new(r"^\s*(\d+)\.\s+(.+)$")?, None)
        } else {
            (
                Regex::new(&format!(r"^\s*(?:{alternation})?\s*(\d+)\.\s+(.+)$"))?,
                Some(Regex::new(&format!(r"^\s*(?:{alternation})\s*(\d+)\."))?),
            )
        };

        let mut destructive_keywords: Vec<String> = DEFAULT_DESTRUCTIVE_KEYWORDS
            .iter()
            .map(|k| k.to_string())
            .collect();
        for keyword in extra_keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !destructive_keywords.contains(&keyword) {
                destructive_keywords.push(keyword);
            }
        }

        Ok(Self {
            option,
            selected,
            destructive_keywords,
        })
    }

    /// Find a question plus numbered options in `lines`.
    pub fn extract_prompt<S: AsRef<str>>(&self, lines: &[S]) -> Option<PromptInfo> {
        self.scan(lines).map(|span| span.prompt)
    }

    fn scan<S: AsRef<str>>(&self, lines: &[S]) -> Option<PromptSpan> {
        let mut question: Option<(String, usize)> = None;
        let mut options = Vec::new();
        let mut last_option_line = 0;
        let mut selected_index = 0;

        for (idx, line) in lines.iter().enumerate() {
            let line = line.as_ref();

            if let Some(caps) = RE_QUESTION.captures(line.trim_start()) {
                question = Some((format!("Do you want to {}?", &caps[1]), idx));
            }

            if let Some(caps) = self.option.captures(line) {
                options.push(truncate_with_ellipsis(caps[2].trim(), MAX_OPTION_CHARS));
                last_option_line = idx;
            }

            if let Some(caps) = self.selected.as_ref().and_then(|re| re.captures(line)) {
                if let Ok(n) = caps[1].parse::<usize>() {
                    selected_index = n.saturating_sub(1);
                }
            }
        }

        let (question, question_line) = question?;
        if options.is_empty() {
            return None;
        }

        Some(PromptSpan {
            prompt: PromptInfo {
                question,
                options,
                selected_index,
            },
            question_line,
            last_option_line,
        })
    }

    /// Whether approving `prompt` could destroy something.
    pub fn is_destructive(&self, prompt: &PromptInfo) -> bool {
        let question = prompt.question.to_lowercase();
        self.destructive_keywords
            .iter()
            .any(|keyword| question.contains(keyword.as_str()))
    }

    /// Clean `raw` and keep `max_lines` lines, preferring the prompt if any.
    pub fn parse_output(&self, raw: &str, max_lines: usize) -> Result<ParsedOutput> {
        if max_lines == 0 {
            return Err(MonitorError::InvalidMaxLines);
        }

        let raw_lines: Vec<String> = raw.lines().map(str::to_string).collect();
        let stripped = strip_ansi(raw);
        let clean = collapse_whitespace(&stripped.lines().collect::<Vec<_>>());

        let span = self.scan(&clean);
        let tail_start = clean.len().saturating_sub(max_lines);

        let start = match &span {
            Some(span) if span.question_line < tail_start => {
                // Keep the question in view unless that pushes the last option out.
                let last_option_floor = (span.last_option_line + 1).saturating_sub(max_lines);
                span.question_line.max(last_option_floor)
            }
            _ => tail_start,
        };
        let end = (start + max_lines).min(clean.len());

        Ok(ParsedOutput {
            raw_lines,
            clean_lines: clean[start..end].to_vec(),
            prompt: span.map(|s| s.prompt),
        })
    }
}

impl Default for PromptMatcher {
    fn default() -> Self {
        let no_extra: &[&str] = &[];
        Self::new(DEFAULT_SELECT_GLYPHS, no_extra).unwrap()
    }
}

/// Find a question plus numbered options using the default glyph set.
pub fn extract_prompt<S: AsRef<str>>(lines: &[S]) -> Option<PromptInfo> {
    DEFAULT_MATCHER.extract_prompt(lines)
}

/// Whether `prompt` mentions a destructive action, per the built-in keywords.
pub fn is_destructive_prompt(prompt: &PromptInfo) -> bool {
    DEFAULT_MATCHER.is_destructive(prompt)
}

/// Strip, collapse and window `raw` so a pending prompt stays visible.
pub fn parse_output(raw: &str, max_lines: usize) -> Result<ParsedOutput> {
    DEFAULT_MATCHER.parse_output(raw, max_lines)
}
