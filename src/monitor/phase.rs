//! Workflow phase hints inferred from what is running in a task's session.
//!
//! Only the early, observable steps advance on their own: the workspace
//! appearing, an agent starting up, and a reviewer joining in a second pane.

use tracing::{info, warn};

use super::health::SessionCapture;
use super::status::AgentStatus;
use crate::tasks::{TaskRecord, TaskStore};

pub const PHASE_AGENT_CREATED: &str = "agent_created";
pub const PHASE_INITIALIZATION: &str = "initialization";
pub const PHASE_AGENT_REVIEW: &str = "agent_review";

/// Output that means an agent CLI is up in the pane. Matched lowercase.
pub const AGENT_INDICATORS: &[&str] = &[
    "claude",
    "anthropic",
    "codex",
    "aider",
    "cursor",
    "model:",
    "assistant:",
    "using tool",
    "running:",
];

/// Output that means a review agent is at work. Matched lowercase.
pub const REVIEW_INDICATORS: &[&str] = &[
    "code-reviewer",
    "superpowers:code-reviewer",
    "code review",
    "reviewing code",
    "reviewing",
    "review complete",
    "analysis complete",
    "review",
];

const AGENT_SCAN_LINES: usize = 100;
const REVIEW_SCAN_LINES: usize = 50;
const MIN_REVIEW_PANES: usize = 2;

/// What the session looks like, as far as phases are concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseSignals {
    pub session_exists: bool,
    pub agent_running: bool,
    pub review_running: bool,
}

fn tail_contains_any(lines: &[String], take: usize, needles: &[&str]) -> bool {
    let start = lines.len().saturating_sub(take);
    let text = lines[start..].join("\n").to_lowercase();
    needles.iter().any(|needle| text.contains(needle))
}

/// Classify a capture against the agent and review indicator tables.
///
/// A review needs a second pane; when tmux can't report panes
/// (`pane_count == None`) the output alone decides.
pub fn detect_phase_signals(capture: &SessionCapture, pane_count: Option<usize>) -> PhaseSignals {
    if !capture.exists {
        return PhaseSignals::default();
    }

    let lines = &capture.recent_output;
    let enough_panes = pane_count.map_or(true, |n| n >= MIN_REVIEW_PANES);

    PhaseSignals {
        session_exists: true,
        agent_running: tail_contains_any(lines, AGENT_SCAN_LINES, AGENT_INDICATORS),
        review_running: enough_panes
            && tail_contains_any(lines, REVIEW_SCAN_LINES, REVIEW_INDICATORS),
    }
}

/// The phase `task` should move to, if any. Advances one step at a time.
pub fn suggest_next_phase(task: &TaskRecord, signals: &PhaseSignals) -> Option<&'static str> {
    let current = task.phase.as_deref()?;
    if !signals.session_exists {
        return None;
    }

    match current {
        "preparation" | "registered" if task.workspace_ready() => Some(PHASE_AGENT_CREATED),
        PHASE_AGENT_CREATED if signals.agent_running => Some(PHASE_INITIALIZATION),
        PHASE_INITIALIZATION | "implementation" if signals.review_running => {
            Some(PHASE_AGENT_REVIEW)
        }
        _ => None,
    }
}

/// Write every suggested phase back to `store`.
///
/// Returns `(task_id, phase)` for the tasks the store actually moved.
/// A store that can't persist phases moves nothing.
pub async fn advance_phases<S: TaskStore>(
    store: &S,
    statuses: &[AgentStatus],
) -> Vec<(String, String)> {
    let mut advanced = Vec::new();

    for status in statuses {
        let Some(next) = status.suggested_phase.as_deref() else {
            continue;
        };
        match store.update_phase(&status.task_id, next).await {
            Ok(true) => {
                info!(task = %status.task_id, phase = next, "phase advanced");
                advanced.push((status.task_id.clone(), next.to_string()));
            }
            Ok(false) => {}
            Err(e) => warn!(task = %status.task_id, error = %e, "could not update phase"),
        }
    }

    advanced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::StaticTaskStore;

    fn capture(lines: &[&str]) -> SessionCapture {
        SessionCapture {
            exists: true,
            recent_output: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn task_in(phase: &str) -> TaskRecord {
        TaskRecord {
            task_id: "t".to_string(),
            tmux_session: Some("s".to_string()),
            phase: Some(phase.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_agent_indicators() {
        let signals = detect_phase_signals(&capture(&["$ claude --resume", "Welcome"]), Some(1));
        assert!(signals.agent_running);
        assert!(!signals.review_running);

        let signals = detect_phase_signals(&capture(&["$ ls", "Cargo.toml"]), Some(1));
        assert!(!signals.agent_running);
    }

    #[test]
    fn test_review_needs_second_pane() {
        let lines = ["Launching superpowers:code-reviewer"];
        assert!(!detect_phase_signals(&capture(&lines), Some(1)).review_running);
        assert!(detect_phase_signals(&capture(&lines), Some(2)).review_running);
        assert!(detect_phase_signals(&capture(&lines), None).review_running);
    }

    #[test]
    fn test_review_only_looks_at_recent_lines() {
        let mut lines = vec!["Review complete"];
        lines.extend(std::iter::repeat("building").take(REVIEW_SCAN_LINES));
        assert!(!detect_phase_signals(&capture(&lines), Some(2)).review_running);
    }

    #[test]
    fn test_missing_session_gives_no_signals() {
        let signals = detect_phase_signals(&SessionCapture::default(), Some(3));
        assert_eq!(signals, PhaseSignals::default());
        assert_eq!(suggest_next_phase(&task_in(PHASE_AGENT_CREATED), &signals), None);
    }

    #[test]
    fn test_phase_transitions() {
        let agent = PhaseSignals {
            session_exists: true,
            agent_running: true,
            review_running: false,
        };
        let review = PhaseSignals {
            review_running: true,
            ..agent
        };

        assert_eq!(
            suggest_next_phase(&task_in(PHASE_AGENT_CREATED), &agent),
            Some(PHASE_INITIALIZATION)
        );
        assert_eq!(suggest_next_phase(&task_in(PHASE_INITIALIZATION), &agent), None);
        assert_eq!(
            suggest_next_phase(&task_in("implementation"), &review),
            Some(PHASE_AGENT_REVIEW)
        );
        assert_eq!(suggest_next_phase(&task_in(PHASE_AGENT_REVIEW), &review), None);
        assert_eq!(suggest_next_phase(&task_in("done"), &review), None);

        let mut no_phase = task_in("x");
        no_phase.phase = None;
        assert_eq!(suggest_next_phase(&no_phase, &review), None);
    }

    #[test]
    fn test_agent_created_needs_workspace() {
        let signals = PhaseSignals {
            session_exists: true,
            ..Default::default()
        };
        let mut task = task_in("registered");
        assert_eq!(suggest_next_phase(&task, &signals), None);

        let dir = tempfile::tempdir().unwrap();
        task.git_branch = Some("feature/auth".to_string());
        task.worktree_path = Some(dir.path().to_path_buf());
        assert_eq!(suggest_next_phase(&task, &signals), Some(PHASE_AGENT_CREATED));

        task.worktree_path = Some(dir.path().join("missing"));
        assert_eq!(suggest_next_phase(&task, &signals), None);
    }

    #[tokio::test]
    async fn test_advance_phases_writes_to_store() {
        let store = StaticTaskStore::new(vec![task_in(PHASE_AGENT_CREATED)]);
        let mut status = AgentStatus::from_task(&task_in(PHASE_AGENT_CREATED), "s");
        status.suggested_phase = Some(PHASE_INITIALIZATION.to_string());

        let advanced = advance_phases(&store, &[status]).await;
        assert_eq!(advanced, vec![("t".to_string(), PHASE_INITIALIZATION.to_string())]);

        let tasks = store.tasks_with_sessions().await.unwrap();
        assert_eq!(tasks[0].phase.as_deref(), Some(PHASE_INITIALIZATION));
    }
}
