//! Where the monitor learns which tasks exist and which tmux session each
//! one runs in.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::tmux::{TmuxClient, TmuxSession};

/// One task as seen by the monitor. Everything but the id is pass-through
/// metadata for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    #[serde(default)]
    pub tmux_session: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(skip)]
    pub elapsed: Option<Duration>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub worktree_path: Option<PathBuf>,
}

impl TaskRecord {
    /// A branch is named and its worktree exists on disk.
    pub fn workspace_ready(&self) -> bool {
        self.git_branch.as_deref().is_some_and(|b| !b.is_empty())
            && self.worktree_path.as_deref().is_some_and(|p| p.is_dir())
    }
}

/// Source of tasks to supervise.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All tasks that currently have a tmux session assigned.
    async fn tasks_with_sessions(&self) -> Result<Vec<TaskRecord>>;

    /// Record a new workflow phase. `Ok(false)` when the store doesn't track
    /// phases or doesn't know the task.
    async fn update_phase(&self, _task_id: &str, _phase: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Treats every live tmux session as a task named after the session.
#[derive(Debug, Clone, Default)]
pub struct SessionTaskStore {
    client: TmuxClient,
    prefix: Option<String>,
}

impl SessionTaskStore {
    pub fn new(client: TmuxClient) -> Self {
        Self {
            client,
            prefix: None,
        }
    }

    /// Only pick up sessions whose name starts with `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn to_task(&self, session: TmuxSession, now: u64) -> Option<TaskRecord> {
        if let Some(prefix) = &self.prefix {
            if !session.name.starts_with(prefix.as_str()) {
                return None;
            }
        }

        let elapsed = (session.created_at > 0 && now >= session.created_at)
            .then(|| Duration::from_secs(now - session.created_at));
        let notes = (session.attached_clients > 0)
            .then(|| format!("{} client(s) attached", session.attached_clients));

        Some(TaskRecord {
            task_id: session.name.clone(),
            tmux_session: Some(session.name.clone()),
            phase: None,
            title: session.name,
            elapsed,
            notes,
            ..Default::default()
        })
    }
}

#[async_trait]
impl TaskStore for SessionTaskStore {
    async fn tasks_with_sessions(&self) -> Result<Vec<TaskRecord>> {
        let sessions = self
            .client
            .list_sessions()
            .await
            .map_err(|e| MonitorError::TaskStore(format!("{e:#}")))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(sessions
            .into_iter()
            .filter_map(|session| self.to_task(session, now))
            .collect())
    }
}

/// A fixed task list, typically from the `[[tasks]]` table in the config.
/// Phase changes are kept in memory only.
#[derive(Debug, Clone, Default)]
pub struct StaticTaskStore {
    tasks: Arc<RwLock<Vec<TaskRecord>>>,
}

impl StaticTaskStore {
    pub fn new(tasks: Vec<TaskRecord>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(tasks)),
        }
    }
}

#[async_trait]
impl TaskStore for StaticTaskStore {
    async fn tasks_with_sessions(&self) -> Result<Vec<TaskRecord>> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        Ok(tasks
            .iter()
            .filter(|t| t.tmux_session.as_deref().is_some_and(|s| !s.is_empty()))
            .cloned()
            .collect())
    }

    async fn update_phase(&self, task_id: &str, phase: &str) -> Result<bool> {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let Some(task) = tasks.iter_mut().find(|t| t.task_id == task_id) else {
            return Ok(false);
        };
        if task.phase.as_deref() == Some(phase) {
            return Ok(false);
        }
        task.phase = Some(phase.to_string());
        Ok(true)
    }
}

/// The store picked at startup.
#[derive(Debug, Clone)]
pub enum AnyTaskStore {
    Sessions(SessionTaskStore),
    Static(StaticTaskStore),
}

#[async_trait]
impl TaskStore for AnyTaskStore {
    async fn tasks_with_sessions(&self) -> Result<Vec<TaskRecord>> {
        match self {
            AnyTaskStore::Sessions(store) => store.tasks_with_sessions().await,
            AnyTaskStore::Static(store) => store.tasks_with_sessions().await,
        }
    }

    async fn update_phase(&self, task_id: &str, phase: &str) -> Result<bool> {
        match self {
            AnyTaskStore::Sessions(store) => store.update_phase(task_id, phase).await,
            AnyTaskStore::Static(store) => store.update_phase(task_id, phase).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str, created_at: u64, attached: usize) -> TmuxSession {
        TmuxSession {
            id: "$1".to_string(),
            name: name.to_string(),
            created_at,
            attached_clients: attached,
        }
    }

    #[test]
    fn test_session_becomes_task() {
        let store = SessionTaskStore::default();
        let task = store.to_task(session("auth-fix", 1000, 2), 1090).unwrap();
        assert_eq!(task.task_id, "auth-fix");
        assert_eq!(task.tmux_session.as_deref(), Some("auth-fix"));
        assert_eq!(task.elapsed, Some(Duration::from_secs(90)));
        assert_eq!(task.notes.as_deref(), Some("2 client(s) attached"));
    }

    #[test]
    fn test_prefix_filter() {
        let store = SessionTaskStore::default().with_prefix("agent-");
        assert!(store.to_task(session("scratch", 0, 0), 10).is_none());
        let task = store.to_task(session("agent-1", 0, 0), 10).unwrap();
        assert_eq!(task.elapsed, None);
        assert_eq!(task.notes, None);
    }

    #[tokio::test]
    async fn test_static_store_skips_tasks_without_session() {
        let store = StaticTaskStore::new(vec![
            TaskRecord {
                task_id: "a".to_string(),
                tmux_session: Some("agent-a".to_string()),
                ..Default::default()
            },
            TaskRecord {
                task_id: "b".to_string(),
                ..Default::default()
            },
            TaskRecord {
                task_id: "c".to_string(),
                tmux_session: Some(String::new()),
                ..Default::default()
            },
        ]);
        let tasks = store.tasks_with_sessions().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_id, "a");
    }

    #[tokio::test]
    async fn test_static_store_updates_phase() {
        let store = StaticTaskStore::new(vec![TaskRecord {
            task_id: "a".to_string(),
            tmux_session: Some("agent-a".to_string()),
            phase: Some("agent_created".to_string()),
            ..Default::default()
        }]);

        assert!(store.update_phase("a", "initialization").await.unwrap());
        assert!(!store.update_phase("a", "initialization").await.unwrap());
        assert!(!store.update_phase("nope", "initialization").await.unwrap());

        let tasks = store.tasks_with_sessions().await.unwrap();
        assert_eq!(tasks[0].phase.as_deref(), Some("initialization"));

        let sessions = AnyTaskStore::Sessions(SessionTaskStore::default());
        assert!(!sessions.update_phase("a", "initialization").await.unwrap());
    }
}
