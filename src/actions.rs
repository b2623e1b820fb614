use crossterm::event::KeyEvent;

use agentwatch::monitor::AgentStatus;

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// Fresh statuses from the poller, most urgent first
    StatusesUpdated(Vec<AgentStatus>),
    /// Something worth telling the user
    Notice(String),
    /// An error occurred
    Error(String),
    /// Attach to a tmux session
    AttachSession(String),
    /// Create a new session
    CreateSession(String),
    /// Kill a session
    KillSession(String),
    /// Accept the pending prompt of one task
    ApproveAgent(String),
    /// Accept every non-destructive pending prompt
    ApproveAll,
}
