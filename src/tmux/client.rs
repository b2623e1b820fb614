use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{Multiplexer, TmuxSession};

/// Client for interacting with tmux via CLI
#[derive(Debug, Clone)]
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
    /// Hard limit for any single tmux invocation
    timeout: Duration,
}

impl TmuxClient {
    pub fn new() -> Self {
        Self {
            tmux_path: "tmux".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run tmux with `args`, giving up after the configured timeout.
    ///
    /// Returns `None` when tmux can't be spawned or doesn't finish in time.
    async fn run(&self, args: &[&str]) -> Option<Output> {
        let child = Command::new(&self.tmux_path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => Some(output),
            Ok(Err(e)) => {
                debug!(?args, error = %e, "tmux failed to run");
                None
            }
            Err(_) => {
                debug!(?args, timeout = ?self.timeout, "tmux timed out");
                None
            }
        }
    }

    /// Check if tmux server is running
    pub async fn is_server_running(&self) -> bool {
        self.run(&["list-sessions"])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// List all tmux sessions
    pub async fn list_sessions(&self) -> Result<Vec<TmuxSession>> {
        // Format: session_id|session_name|session_created|session_attached
        let output = self
            .run(&[
                "list-sessions",
                "-F",
                "#{session_id}|#{session_name}|#{session_created}|#{session_attached}",
            ])
            .await
            .context("Failed to execute tmux list-sessions")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("no sessions") {
                return Ok(Vec::new());
            }
            anyhow::bail!("tmux list-sessions failed: {}", stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_session_line).collect())
    }

    /// Create a detached session
    pub async fn create_session(&self, name: &str) -> Result<TmuxSession> {
        let output = self
            .run(&["new-session", "-d", "-s", name])
            .await
            .context("Failed to create tmux session")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to create session: {}", stderr);
        }

        let sessions = self.list_sessions().await?;
        sessions
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| anyhow::anyhow!("Session created but not found"))
    }

    /// Kill a session
    pub async fn kill_session(&self, session: &str) -> Result<()> {
        let output = self
            .run(&["kill-session", "-t", session])
            .await
            .context("Failed to kill tmux session")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to kill session: {}", stderr);
        }

        Ok(())
    }

    /// Get the command to attach to a session (for external execution)
    pub fn attach_command(&self, session: &str) -> Vec<String> {
        vec![
            self.tmux_path.clone(),
            "attach-session".to_string(),
            "-t".to_string(),
            session.to_string(),
        ]
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Multiplexer for TmuxClient {
    async fn capture(&self, session: &str, max_lines: usize) -> Option<String> {
        let start = format!("-{}", max_lines);
        let output = self
            .run(&["capture-pane", "-p", "-t", session, "-S", &start])
            .await?;

        if !output.status.success() {
            debug!(session, "capture-pane exited with {}", output.status);
            return None;
        }

        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn session_exists(&self, session: &str) -> bool {
        self.run(&["has-session", "-t", session])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn send_keys(&self, session: &str, text: &str, press_enter: bool) -> bool {
        let mut args = vec!["send-keys", "-t", session, "-l", text];
        let typed = self
            .run(&args)
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);

        if !typed || !press_enter {
            return typed;
        }

        args = vec!["send-keys", "-t", session, "Enter"];
        self.run(&args)
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn pane_count(&self, session: &str) -> Option<usize> {
        let output = self
            .run(&["list-panes", "-t", session, "-F", "#{pane_index}"])
            .await?;
        if !output.status.success() {
            return None;
        }
        Some(count_panes(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn count_panes(stdout: &str) -> usize {
    stdout.lines().filter(|line| !line.trim().is_empty()).count()
}

fn parse_session_line(line: &str) -> Option<TmuxSession> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 4 {
        return None;
    }

    Some(TmuxSession {
        id: parts[0].to_string(),
        name: parts[1].to_string(),
        created_at: parts[2].parse().unwrap_or(0),
        attached_clients: parts[3].parse().unwrap_or(0),
    })
}
