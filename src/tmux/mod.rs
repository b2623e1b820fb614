mod client;
mod tail;

pub use client::TmuxClient;
pub use tail::tail_session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Represents a tmux session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmuxSession {
    /// Session ID (e.g., "$0")
    pub id: String,
    /// Session name
    pub name: String,
    /// Unix timestamp when session was created
    pub created_at: u64,
    /// Number of attached clients
    pub attached_clients: usize,
}

/// The subset of a terminal multiplexer the monitor needs.
///
/// Implementations fail softly: a missing session, a timeout or a non-zero
/// exit all come back as `None` / `false`, never as an error, so one stuck
/// session can't stall a polling cycle.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Last `max_lines` lines of the session's active pane.
    async fn capture(&self, session: &str, max_lines: usize) -> Option<String>;

    async fn session_exists(&self, session: &str) -> bool;

    /// Type `text` into the session, optionally followed by Enter.
    async fn send_keys(&self, session: &str, text: &str, press_enter: bool) -> bool;

    /// Panes in the session's current window, or `None` if tmux won't say.
    async fn pane_count(&self, session: &str) -> Option<usize>;
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::Multiplexer;

    /// In-memory multiplexer for tests. Each session holds a queue of
    /// captures; the last one repeats once the queue is drained.
    #[derive(Default)]
    pub struct FakeMux {
        captures: Mutex<HashMap<String, VecDeque<Option<String>>>>,
        pub sent: Mutex<Vec<(String, String, bool)>>,
        panes: HashMap<String, usize>,
        refuse_keys: bool,
    }

    impl FakeMux {
        pub fn with_session(self, session: &str, output: &str) -> Self {
            self.with_captures(session, vec![Some(output.to_string())])
        }

        pub fn with_panes(mut self, session: &str, panes: usize) -> Self {
            self.panes.insert(session.to_string(), panes);
            self
        }

        pub fn refusing_keys(mut self) -> Self {
            self.refuse_keys = true;
            self
        }

        pub fn with_captures(self, session: &str, captures: Vec<Option<String>>) -> Self {
            self.captures
                .lock()
                .unwrap()
                .insert(session.to_string(), captures.into());
            self
        }
    }

    #[async_trait]
    impl Multiplexer for FakeMux {
        async fn capture(&self, session: &str, _max_lines: usize) -> Option<String> {
            let mut captures = self.captures.lock().unwrap();
            let queue = captures.get_mut(session)?;
            if queue.len() > 1 {
                queue.pop_front().flatten()
            } else {
                queue.front().cloned().flatten()
            }
        }

        async fn session_exists(&self, session: &str) -> bool {
            self.captures.lock().unwrap().contains_key(session)
        }

        async fn send_keys(&self, session: &str, text: &str, press_enter: bool) -> bool {
            if self.refuse_keys {
                return false;
            }
            self.sent
                .lock()
                .unwrap()
                .push((session.to_string(), text.to_string(), press_enter));
            true
        }

        async fn pane_count(&self, session: &str) -> Option<usize> {
            if !self.session_exists(session).await {
                return None;
            }
            Some(self.panes.get(session).copied().unwrap_or(1))
        }
    }
}
