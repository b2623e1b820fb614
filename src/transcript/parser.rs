use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::types::{
    CommandExecution, ErrorEvent, ErrorKind, FileOpKind, PromptKind, SessionMetrics, UserPrompt,
};
use crate::output::truncate_chars;

/// Tools the agent CLI knows about. Longer names come first so `TodoWrite`
/// is not counted as `Write`.
const KNOWN_TOOLS: &[&str] = &[
    "TodoWrite",
    "NotebookEdit",
    "AskUserQuestion",
    "WebFetch",
    "WebSearch",
    "Read",
    "Write",
    "Edit",
    "Bash",
    "Grep",
    "Glob",
    "Task",
    "mcp__",
];

/// Words that show up after a bullet glyph but are never tool names.
const NOT_TOOLS: &[&str] = &["if", "for", "while", "def", "class", "fn", "let"];

const PATH_FALSE_POSITIVES: &[&str] = &["...", "e.g.", "i.e.", "etc.", "vs."];

const COMMAND_NOISE: &[&str] = &["---", "===", "```", "\"\"\""];

const MAX_PROMPT_CHARS: usize = 500;
const MAX_ERROR_CHARS: usize = 200;
const HEADER_LINES: usize = 10;

static KNOWN_TOOLS_LOWER: Lazy<Vec<(&'static str, String)>> = Lazy::new(|| {
    KNOWN_TOOLS
        .iter()
        .map(|tool| (*tool, tool.to_lowercase()))
        .collect()
});

static RE_TIMESTAMP_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(\d{4}-\d{2}-\d{2}[T ][0-9:.]+(?:Z|[+-]\d{2}:?\d{2})?)\]\s*").unwrap()
});

static RE_TOOL_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[⏺●]\s+(\w+)(?:\(|\s*$)|╭.*?(\w+).*?╮").unwrap());

static RE_READ: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:read|reading)(?:\s+file)?(?:\s+|\()["'`]?([^\s"'`()]+)"#).unwrap()
});

static RE_WRITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:write|writing|wrote)(?:\s+to)?(?:\s+file)?(?:\s+|\()["'`]?([^\s"'`()]+)"#)
        .unwrap()
});

static RE_EDIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?:edit|editing|edited|update|updated)(?:\s+file)?(?:\s+|\()["'`]?([^\s"'`()]+)"#,
    )
    .unwrap()
});

static RE_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\$|❯)\s+(.+)$|Running:\s*(.+)$|Command:\s*(.+)$|Bash\((.+)\)\s*$").unwrap()
});

static RE_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:error|failed|failure|exception)[\s:]+(.+)").unwrap());

static RE_USER_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^>\s+(.+)$").unwrap());
static RE_SLASH_COMMAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/[\w:-]+").unwrap());
static RE_FILE_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[\w./\-]+").unwrap());
static RE_INTERRUPTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"Interrupted").unwrap());

/// Numbered option of an approval dialog, once the cursor glyph is gone.
static RE_DIALOG_OPTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s").unwrap());

/// Lines that start with `> ` but are printed by the CLI, not typed.
static SYSTEM_PROMPT_LINES: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        // skill loading
        Regex::new(r#"^The\s+"[\w-]+"\s+skill\s+is\s+loading"#).unwrap(),
        // slash command running
        Regex::new(r"^/[\w:-]+\s+is\s+running").unwrap(),
    ]
});

type Extractor = fn(&str, Option<DateTime<Utc>>, &mut SessionMetrics);

/// Run on every line that is not a user prompt, in this order. Categories
/// are independent: one line can feed several of them.
const EXTRACTORS: &[Extractor] = &[
    extract_tool_calls,
    extract_file_operations,
    extract_commands,
    extract_errors,
];

/// Parse a captured session log into structured metrics.
///
/// Never fails: text that matches nothing just yields fewer events.
pub fn parse_session_log(content: &str, task_id: &str) -> SessionMetrics {
    let session_id = format!("{}_{}", task_id, Local::now().format("%Y%m%d%H%M%S"));
    let mut metrics = SessionMetrics::new(session_id, task_id.to_string());

    metrics.ended_at = content
        .lines()
        .take(HEADER_LINES)
        .filter_map(|line| line.trim_start().strip_prefix("# Captured at:"))
        .find_map(|ts| parse_timestamp(ts.trim()));

    let mut last_seen = None;
    let mut prompt_order = 0;

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (timestamp, line) = split_timestamp(line);
        if line.is_empty() {
            continue;
        }
        if timestamp.is_some() {
            metrics.started_at = metrics.started_at.or(timestamp);
            last_seen = timestamp;
        }

        if let Some(prompt) = extract_user_prompt(line, prompt_order, timestamp) {
            metrics.user_prompts.push(prompt);
            prompt_order += 1;
            continue;
        }

        for extract in EXTRACTORS {
            extract(line, timestamp, &mut metrics);
        }
    }

    metrics.ended_at = metrics.ended_at.or(last_seen);
    metrics.finalize();
    metrics
}

/// Parse a log file written by [`super::write_transcript`].
///
/// The task id is taken from the file name (`<task>_<date>_<time>.log`).
/// Returns `None` if the file can't be read.
pub fn parse_session_file(path: &Path) -> Option<SessionMetrics> {
    let stem = path.file_stem()?.to_string_lossy().into_owned();
    let task_id = stem.rsplitn(3, '_').last().unwrap_or("unknown").to_string();

    match std::fs::read(path) {
        Ok(bytes) => Some(parse_session_log(&String::from_utf8_lossy(&bytes), &task_id)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read session log");
            None
        }
    }
}

/// Heuristic check that a captured token is a file path and not prose.
pub fn is_valid_filepath(path: &str) -> bool {
    if path.chars().count() < 3 {
        return false;
    }
    if !path.contains('.') && !path.starts_with('/') {
        return false;
    }
    let lower = path.to_lowercase();
    !PATH_FALSE_POSITIVES.iter().any(|fp| lower.contains(fp))
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Peel a leading `[timestamp]` off a line.
fn split_timestamp(line: &str) -> (Option<DateTime<Utc>>, &str) {
    let Some(caps) = RE_TIMESTAMP_PREFIX.captures(line) else {
        return (None, line);
    };
    match parse_timestamp(&caps[1]) {
        Some(ts) => (Some(ts), line[caps[0].len()..].trim()),
        None => (None, line),
    }
}

fn extract_user_prompt(
    line: &str,
    order: usize,
    timestamp: Option<DateTime<Utc>>,
) -> Option<UserPrompt> {
    let caps = RE_USER_PROMPT.captures(line)?;
    let text = caps[1].trim();
    if text.is_empty()
        || RE_DIALOG_OPTION.is_match(text)
        || SYSTEM_PROMPT_LINES.iter().any(|re| re.is_match(text))
    {
        return None;
    }

    let prompt_type = if RE_SLASH_COMMAND.is_match(text) {
        PromptKind::Command
    } else if RE_FILE_REFERENCE.is_match(text) {
        PromptKind::FileReference
    } else if RE_INTERRUPTED.is_match(line) {
        PromptKind::Interrupt
    } else {
        PromptKind::Message
    };

    Some(UserPrompt {
        prompt: truncate_chars(text, MAX_PROMPT_CHARS),
        prompt_type,
        timestamp,
        order,
    })
}

fn extract_tool_calls(line: &str, timestamp: Option<DateTime<Utc>>, metrics: &mut SessionMetrics) {
    if let Some(caps) = RE_TOOL_START.captures(line) {
        let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(name) = name {
            let lower = name.to_lowercase();
            if !NOT_TOOLS.contains(&lower.as_str()) {
                metrics.record_tool(name, timestamp);
                return;
            }
        }
    }

    let lower = line.to_lowercase();
    if let Some((tool, _)) = KNOWN_TOOLS_LOWER
        .iter()
        .find(|(_, needle)| lower.contains(needle.as_str()))
    {
        metrics.record_tool(tool, timestamp);
    }
}

fn extract_file_operations(
    line: &str,
    timestamp: Option<DateTime<Utc>>,
    metrics: &mut SessionMetrics,
) {
    let families: [(&Regex, FileOpKind); 3] = [
        (&RE_READ, FileOpKind::Read),
        (&RE_WRITE, FileOpKind::Write),
        (&RE_EDIT, FileOpKind::Edit),
    ];

    for (pattern, kind) in families {
        let Some(caps) = pattern.captures(line) else {
            continue;
        };
        let path = caps[1].trim_end_matches(['.', ',', ';', ':']);
        if is_valid_filepath(path) {
            metrics.record_file(kind, path, timestamp);
        }
    }
}

fn extract_commands(line: &str, timestamp: Option<DateTime<Utc>>, metrics: &mut SessionMetrics) {
    let Some(caps) = RE_COMMAND.captures(line) else {
        return;
    };
    let Some(command) = (1..=4).find_map(|i| caps.get(i)).map(|m| m.as_str().trim()) else {
        return;
    };

    if command.chars().count() <= 2 || command.starts_with('#') {
        return;
    }
    // `❯ 1. Yes` is the dialog cursor, not a shell prompt.
    if RE_DIALOG_OPTION.is_match(command) {
        return;
    }
    if COMMAND_NOISE.iter().any(|noise| command.contains(noise)) {
        return;
    }

    metrics.commands.push(CommandExecution {
        command: command.to_string(),
        timestamp,
    });
}

fn extract_errors(line: &str, timestamp: Option<DateTime<Utc>>, metrics: &mut SessionMetrics) {
    let Some(caps) = RE_ERROR.captures(line) else {
        return;
    };
    let message = caps[1].trim();
    if message.chars().count() <= 5 {
        return;
    }

    metrics.errors.push(ErrorEvent {
        error_type: classify_error(line),
        message: truncate_chars(message, MAX_ERROR_CHARS),
        timestamp,
    });
}

fn classify_error(line: &str) -> ErrorKind {
    let lower = line.to_lowercase();
    if lower.contains("permission") {
        ErrorKind::Permission
    } else if lower.contains("not found") {
        ErrorKind::NotFound
    } else if lower.contains("syntax") {
        ErrorKind::Syntax
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ErrorKind::Timeout
    } else if lower.contains("connection") {
        ErrorKind::Connection
    } else {
        ErrorKind::Unknown
    }
}
