use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use super::health::{detect_health, HealthState, SessionCapture, HEALTH_WINDOW_LINES};
use super::phase::{detect_phase_signals, suggest_next_phase};
use crate::error::Result;
use crate::output::{collapse_whitespace, strip_ansi, PromptInfo, PromptMatcher};
use crate::tasks::{TaskRecord, TaskStore};
use crate::tmux::Multiplexer;

/// Everything the dashboard and notifier need to know about one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStatus {
    pub task_id: String,
    pub tmux_session: String,
    pub health: HealthState,
    pub warnings: Vec<String>,
    pub process_running: bool,
    /// Last non-blank line, at most 60 characters
    pub last_output_preview: String,
    pub recent_output: Vec<String>,
    /// Only set while the dialog is on screen and the agent is waiting on it
    pub prompt: Option<PromptInfo>,
    pub task_title: String,
    pub task_phase: Option<String>,
    /// Phase the session's output says the task has reached
    pub suggested_phase: Option<String>,
    pub elapsed: Option<Duration>,
    pub notes: Option<String>,
}

impl AgentStatus {
    /// An exited status carrying the task's metadata.
    pub(crate) fn from_task(task: &TaskRecord, session: &str) -> Self {
        Self {
            task_id: task.task_id.clone(),
            tmux_session: session.to_string(),
            health: HealthState::Exited,
            warnings: Vec::new(),
            process_running: false,
            last_output_preview: String::new(),
            recent_output: Vec::new(),
            prompt: None,
            task_title: task.title.clone(),
            task_phase: task.phase.clone(),
            suggested_phase: None,
            elapsed: task.elapsed,
            notes: task.notes.clone(),
        }
    }

    /// Status for a task whose check blew up; rendered instead of dropped.
    fn degraded(task: &TaskRecord, session: &str, reason: String) -> Self {
        Self {
            warnings: vec![reason],
            ..Self::from_task(task, session)
        }
    }
}

/// Knobs for building statuses.
#[derive(Debug, Clone)]
pub struct StatusOptions {
    /// Scrollback lines to capture per session
    pub capture_lines: usize,
    pub matcher: PromptMatcher,
}

impl Default for StatusOptions {
    fn default() -> Self {
        Self {
            capture_lines: 100,
            matcher: PromptMatcher::default(),
        }
    }
}

/// Capture, clean and classify one task's session.
///
/// Health is judged on the bottom of the pane. A dialog further up the
/// scrollback has already been answered and is not reported.
pub async fn get_agent_status<M: Multiplexer>(
    mux: &M,
    task: &TaskRecord,
    session: &str,
    options: &StatusOptions,
) -> Result<AgentStatus> {
    let exists = mux.session_exists(session).await;
    let (raw, pane_count) = if exists {
        let raw = mux
            .capture(session, options.capture_lines)
            .await
            .unwrap_or_default();
        (raw, mux.pane_count(session).await)
    } else {
        (String::new(), None)
    };

    let parsed = options.matcher.parse_output(&raw, options.capture_lines)?;

    // capture-pane returns the visible pane on top of the requested history.
    let stripped = strip_ansi(&raw);
    let clean = collapse_whitespace(&stripped.lines().collect::<Vec<_>>());
    let tail_start = clean.len().saturating_sub(options.capture_lines);
    let capture = SessionCapture {
        exists,
        recent_output: clean[tail_start..].to_vec(),
    };

    let report = detect_health(&capture);
    let signals = detect_phase_signals(&capture, pane_count);
    debug!(task = %task.task_id, health = %report.health, "classified");

    let window_start = capture.recent_output.len().saturating_sub(HEALTH_WINDOW_LINES);
    let prompt = if report.health == HealthState::Waiting {
        options
            .matcher
            .extract_prompt(&capture.recent_output[window_start..])
    } else {
        None
    };
    let recent_output = if prompt.is_some() {
        parsed.clean_lines
    } else {
        capture.recent_output
    };

    Ok(AgentStatus {
        health: report.health,
        warnings: report.warnings,
        process_running: exists,
        last_output_preview: report.last_meaningful_line.unwrap_or_default(),
        recent_output,
        prompt,
        suggested_phase: suggest_next_phase(task, &signals).map(str::to_string),
        ..AgentStatus::from_task(task, session)
    })
}

/// Statuses for every task with a session, most urgent first.
///
/// A failure for one task is logged and shows up as a degraded `Exited`
/// entry; only a failing task store aborts the batch.
pub async fn get_all_agent_statuses<M, S>(
    mux: &M,
    store: &S,
    options: &StatusOptions,
) -> Result<Vec<AgentStatus>>
where
    M: Multiplexer,
    S: TaskStore,
{
    let tasks = store.tasks_with_sessions().await?;
    let mut statuses = Vec::with_capacity(tasks.len());

    for task in &tasks {
        let Some(session) = task.tmux_session.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };

        match get_agent_status(mux, task, session, options).await {
            Ok(status) => statuses.push(status),
            Err(e) => {
                warn!(task = %task.task_id, error = %e, "status check failed");
                statuses.push(AgentStatus::degraded(
                    task,
                    session,
                    format!("Status check failed: {e}"),
                ));
            }
        }
    }

    statuses.sort_by_key(|s| s.health);
    Ok(statuses)
}

/// Human-readable elapsed time: `45s`, `3m`, `3m 20s`, `2h 5m`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        let (minutes, secs) = (seconds / 60, seconds % 60);
        if secs > 0 {
            format!("{minutes}m {secs}s")
        } else {
            format!("{minutes}m")
        }
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{approve_all, ApproveSummary};
    use crate::tasks::StaticTaskStore;
    use crate::tmux::fake::FakeMux;

    fn task(id: &str, session: Option<&str>) -> TaskRecord {
        TaskRecord {
            task_id: id.to_string(),
            tmux_session: session.map(str::to_string),
            title: format!("Task {id}"),
            phase: Some("implementation".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_agent_status_with_prompt() {
        let mux = FakeMux::default().with_session(
            "s1",
            "\x1b[1mWorking on auth\x1b[0m\n Do you want to create test_auth.py?\n > 1. Yes\n   2. No\n",
        );
        let status = get_agent_status(&mux, &task("t1", Some("s1")), "s1", &StatusOptions::default())
            .await
            .unwrap();

        assert_eq!(status.health, HealthState::Waiting);
        assert!(status.process_running);
        assert_eq!(status.last_output_preview, "2. No");
        assert_eq!(status.recent_output[0], "Working on auth");
        let prompt = status.prompt.unwrap();
        assert_eq!(prompt.question, "Do you want to create test_auth.py?");
        assert_eq!(status.task_title, "Task t1");
        assert_eq!(status.task_phase.as_deref(), Some("implementation"));
    }

    /// An answered dialog, then `filler` lines of build output, then `bottom`.
    fn scrolled_capture(filler: usize, bottom: &str) -> String {
        let mut raw = String::from(" Do you want to create old.py?\n > 1. Yes\n   2. No\n");
        for i in 0..filler {
            raw.push_str(&format!("compiling crate {i}\n"));
        }
        raw.push_str(bottom);
        raw
    }

    #[tokio::test]
    async fn test_health_uses_pane_tail_not_old_dialog() {
        let raw = scrolled_capture(130, "✻ Thinking… (esc to interrupt)\n");
        let mux = FakeMux::default().with_session("s", &raw);
        let status = get_agent_status(&mux, &task("t", Some("s")), "s", &StatusOptions::default())
            .await
            .unwrap();

        assert_eq!(status.health, HealthState::Active);
        assert_eq!(status.prompt, None);
        assert_eq!(status.last_output_preview, "✻ Thinking… (esc to interrupt)");
        assert_eq!(status.recent_output.len(), 100);
        assert_eq!(
            status.recent_output.last().map(String::as_str),
            Some("✻ Thinking… (esc to interrupt)")
        );
    }

    #[tokio::test]
    async fn test_stale_dialog_is_never_approved() {
        let raw = scrolled_capture(130, "Which module next? Still deciding\n");
        let mux = FakeMux::default().with_session("s", &raw);
        let agents = vec![
            get_agent_status(&mux, &task("t", Some("s")), "s", &StatusOptions::default())
                .await
                .unwrap(),
        ];

        assert_eq!(agents[0].health, HealthState::Waiting);
        assert_eq!(agents[0].prompt, None);

        let summary = approve_all(&mux, &agents, &PromptMatcher::default()).await;
        assert_eq!(summary, ApproveSummary::default());
        assert!(mux.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_current_dialog_wins_over_old_one() {
        let raw = scrolled_capture(
            130,
            " Do you want to create new.py?\n > 1. Yes\n   2. No\n",
        );
        let mux = FakeMux::default().with_session("s", &raw);
        let status = get_agent_status(&mux, &task("t", Some("s")), "s", &StatusOptions::default())
            .await
            .unwrap();

        assert_eq!(status.health, HealthState::Waiting);
        assert_eq!(
            status.prompt.map(|p| p.question).as_deref(),
            Some("Do you want to create new.py?")
        );
    }

    #[tokio::test]
    async fn test_phase_suggested_from_output() {
        let mux = FakeMux::default()
            .with_session("s", "$ claude\nWelcome to Claude Code\n>")
            .with_session("r", "Dispatching code-reviewer\nreviewing src/auth.rs")
            .with_panes("r", 2);

        let mut created = task("a", Some("s"));
        created.phase = Some("agent_created".to_string());
        let status = get_agent_status(&mux, &created, "s", &StatusOptions::default())
            .await
            .unwrap();
        assert_eq!(status.suggested_phase.as_deref(), Some("initialization"));

        let status = get_agent_status(&mux, &task("b", Some("r")), "r", &StatusOptions::default())
            .await
            .unwrap();
        assert_eq!(status.suggested_phase.as_deref(), Some("agent_review"));

        let status = get_agent_status(&mux, &created, "gone", &StatusOptions::default())
            .await
            .unwrap();
        assert_eq!(status.suggested_phase, None);
    }

    #[tokio::test]
    async fn test_missing_session_is_exited() {
        let mux = FakeMux::default();
        let status = get_agent_status(&mux, &task("t1", Some("gone")), "gone", &StatusOptions::default())
            .await
            .unwrap();
        assert_eq!(status.health, HealthState::Exited);
        assert!(!status.process_running);
        assert_eq!(status.warnings, vec!["Session not found"]);
    }

    #[tokio::test]
    async fn test_all_statuses_sorted_and_filtered() {
        let mux = FakeMux::default()
            .with_session("busy", "✻ Thinking… (esc to interrupt)")
            .with_session("stuck", "Traceback (most recent call last):")
            .with_session("asking", "Proceed? [Y/n]");
        let store = StaticTaskStore::new(vec![
            task("active", Some("busy")),
            task("no-session", None),
            task("gone", Some("missing")),
            task("errored", Some("stuck")),
            task("waiting", Some("asking")),
        ]);

        let statuses = get_all_agent_statuses(&mux, &store, &StatusOptions::default())
            .await
            .unwrap();
        let order: Vec<_> = statuses.iter().map(|s| s.task_id.as_str()).collect();
        assert_eq!(order, vec!["errored", "waiting", "active", "gone"]);
    }

    #[tokio::test]
    async fn test_failed_task_does_not_abort_batch() {
        let mux = FakeMux::default()
            .with_session("a", "idle prompt")
            .with_session("b", "idle prompt");
        let store = StaticTaskStore::new(vec![task("a", Some("a")), task("b", Some("b"))]);
        let options = StatusOptions {
            capture_lines: 0,
            ..Default::default()
        };

        let statuses = get_all_agent_statuses(&mux, &store, &options).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| s.health == HealthState::Exited));
        assert!(statuses[0].warnings[0].starts_with("Status check failed"));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(45)), "45s");
        assert_eq!(format_elapsed(Duration::from_secs(180)), "3m");
        assert_eq!(format_elapsed(Duration::from_secs(200)), "3m 20s");
        assert_eq!(format_elapsed(Duration::from_secs(7500)), "2h 5m");
    }
}
