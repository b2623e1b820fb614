use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::output::truncate_with_ellipsis;

/// Health of an agent session.
///
/// Variants are declared most-urgent first, so the derived ordering is the
/// dashboard sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Output contains an error and nothing newer says otherwise
    Error,
    /// Agent is blocked on a question or confirmation
    Waiting,
    /// Agent is sitting at its prompt
    Idle,
    /// Agent is processing (the interrupt hint is on screen)
    Active,
    /// The tmux session is gone
    Exited,
}

impl HealthState {
    pub fn icon(self) -> &'static str {
        match self {
            HealthState::Active => "🟢",
            HealthState::Idle => "🟡",
            HealthState::Waiting => "🟠",
            HealthState::Exited => "🔴",
            HealthState::Error => "⚠️",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HealthState::Active => "active",
            HealthState::Idle => "idle",
            HealthState::Waiting => "waiting",
            HealthState::Exited => "exited",
            HealthState::Error => "error",
        }
    }

    /// Sort key: 0 for errors through 4 for exited sessions.
    pub fn priority(self) -> u8 {
        self as u8
    }

    /// Icon plus upper-cased label, e.g. "🟠 WAITING".
    pub fn display(self, include_label: bool) -> String {
        if include_label {
            format!("{} {}", self.icon(), self.label().to_uppercase())
        } else {
            self.icon().to_string()
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the multiplexer told us about one session this cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCapture {
    pub exists: bool,
    /// Normalised lines, oldest first
    pub recent_output: Vec<String>,
}

/// Result of classifying one capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub health: HealthState,
    pub warnings: Vec<String>,
    pub last_meaningful_line: Option<String>,
}

/// Lines from the bottom of the pane that take part in classification.
pub const HEALTH_WINDOW_LINES: usize = 20;

const PREVIEW_CHARS: usize = 60;

static RE_ACTIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)esc to interrupt").unwrap());

static RE_WAITING_INPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\? |\[Y/n\]|\[y/N\]|press enter|do you want|would you like|continue\?|proceed\?)",
    )
    .unwrap()
});

static RE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(error:|Error:|ERROR|failed|Failed|FAILED|exception|Exception|traceback|Traceback)")
        .unwrap()
});

/// Checked top to bottom; the first hit decides the state.
static RULES: Lazy<[(&'static Regex, HealthState, Option<&'static str>); 3]> = Lazy::new(|| {
    [
        (&*RE_ACTIVE, HealthState::Active, None),
        (&*RE_WAITING_INPUT, HealthState::Waiting, Some("Detected input prompt")),
        (&*RE_ERROR, HealthState::Error, Some("Error detected in output")),
    ]
});

/// Classify a window of pane text. Falls through to `Idle`.
pub fn classify_window(window: &str) -> (HealthState, Option<&'static str>) {
    RULES
        .iter()
        .find(|(pattern, _, _)| pattern.is_match(window))
        .map(|(_, health, warning)| (*health, *warning))
        .unwrap_or((HealthState::Idle, None))
}

/// Work out the health of a session from its most recent output.
pub fn detect_health(capture: &SessionCapture) -> HealthReport {
    if !capture.exists {
        return HealthReport {
            health: HealthState::Exited,
            warnings: vec!["Session not found".to_string()],
            last_meaningful_line: None,
        };
    }

    let last_meaningful_line = capture
        .recent_output
        .iter()
        .rev()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .map(|line| truncate_with_ellipsis(line, PREVIEW_CHARS));

    let start = capture.recent_output.len().saturating_sub(HEALTH_WINDOW_LINES);
    let window = capture.recent_output[start..].join("\n");
    let (health, warning) = classify_window(&window);

    HealthReport {
        health,
        warnings: warning.map(str::to_string).into_iter().collect(),
        last_meaningful_line,
    }
}
