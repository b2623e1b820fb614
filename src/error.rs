use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the library side of agentwatch.
///
/// Transient tmux failures never show up here: captures that time out or fail
/// are reported as "no output" by the [`crate::tmux::Multiplexer`] contract.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A caller asked for a zero-line window.
    #[error("max_lines must be at least 1")]
    InvalidMaxLines,

    #[error("failed to read config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("task store: {0}")]
    TaskStore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
