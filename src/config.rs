use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MonitorError, Result};
use crate::monitor::StatusOptions;
use crate::output::{PromptMatcher, DEFAULT_SELECT_GLYPHS};
use crate::tasks::{AnyTaskStore, SessionTaskStore, StaticTaskStore, TaskRecord};
use crate::tmux::TmuxClient;

/// Settings read from `~/.agentwatch/config.toml`. Every field has a default,
/// so an empty or missing file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_interval_ms: u64,
    pub capture_lines: usize,
    pub capture_timeout_ms: u64,
    /// Output lines shown per agent by `status`
    pub preview_lines: usize,
    pub notifications: bool,
    pub select_glyphs: Vec<String>,
    /// Added to the built-in destructive keywords
    pub extra_destructive_keywords: Vec<String>,
    /// Where `capture` writes transcripts and `analyze` looks by default
    pub log_dir: Option<PathBuf>,
    pub session_prefix: Option<String>,
    /// Fixed task list; replaces the one-task-per-session store when set
    pub tasks: Vec<TaskRecord>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            capture_lines: 100,
            capture_timeout_ms: 5000,
            preview_lines: 3,
            notifications: true,
            select_glyphs: DEFAULT_SELECT_GLYPHS.iter().map(|g| g.to_string()).collect(),
            extra_destructive_keywords: Vec::new(),
            log_dir: None,
            session_prefix: None,
            tasks: Vec::new(),
        }
    }
}

/// `~/.agentwatch`, home of the config, logs and transcripts.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentwatch")
}

pub fn default_config_path() -> PathBuf {
    data_dir().join("config.toml")
}

impl Config {
    /// Load from `path`, or the default location when `None`. A missing file
    /// yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(MonitorError::Config {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Ok(toml::from_str(&raw)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms.max(1))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("logs"))
    }

    pub fn prompt_matcher(&self) -> Result<PromptMatcher> {
        PromptMatcher::new(&self.select_glyphs[..], &self.extra_destructive_keywords[..])
    }

    pub fn status_options(&self) -> Result<StatusOptions> {
        Ok(StatusOptions {
            capture_lines: self.capture_lines.max(1),
            matcher: self.prompt_matcher()?,
        })
    }

    pub fn tmux_client(&self) -> TmuxClient {
        TmuxClient::new().with_timeout(self.capture_timeout())
    }

    pub fn task_store(&self, client: TmuxClient) -> AnyTaskStore {
        if !self.tasks.is_empty() {
            return AnyTaskStore::Static(StaticTaskStore::new(self.tasks.clone()));
        }
        let store = SessionTaskStore::new(client);
        match &self.session_prefix {
            Some(prefix) => AnyTaskStore::Sessions(store.with_prefix(prefix.clone())),
            None => AnyTaskStore::Sessions(store),
        }
    }
}
