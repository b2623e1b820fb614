use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tool invocation seen in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOpKind {
    Read,
    Write,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperation {
    pub operation: FileOpKind,
    pub file_path: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExecution {
    pub command: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Coarse error category, sniffed from keywords on the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Permission,
    NotFound,
    Syntax,
    Timeout,
    Connection,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub error_type: ErrorKind,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Free-form instruction
    Message,
    /// Slash command such as `/clear`
    Command,
    /// Mentions a file with `@path`
    FileReference,
    /// Typed after interrupting the agent
    Interrupt,
}

/// Something the human typed into the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPrompt {
    pub prompt: String,
    pub prompt_type: PromptKind,
    pub timestamp: Option<DateTime<Utc>>,
    /// Position among the accepted prompts, starting at 0
    pub order: usize,
}

/// Everything extracted from one transcript.
///
/// Built by a single pass of the parser and read-only afterwards; the
/// `total_*` fields and deduplicated file lists are filled in when the pass
/// finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub task_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    pub total_tool_calls: usize,
    pub total_file_operations: usize,
    pub total_commands: usize,
    pub total_errors: usize,
    pub total_user_prompts: usize,

    pub tool_counts: BTreeMap<String, usize>,

    pub files_read: Vec<String>,
    pub files_written: Vec<String>,
    pub files_edited: Vec<String>,

    pub tool_calls: Vec<ToolCall>,
    pub file_operations: Vec<FileOperation>,
    pub commands: Vec<CommandExecution>,
    pub errors: Vec<ErrorEvent>,
    pub user_prompts: Vec<UserPrompt>,
}

impl SessionMetrics {
    pub(crate) fn new(session_id: String, task_id: String) -> Self {
        Self {
            session_id,
            task_id,
            ..Default::default()
        }
    }

    pub(crate) fn record_tool(&mut self, tool_name: &str, timestamp: Option<DateTime<Utc>>) {
        *self.tool_counts.entry(tool_name.to_string()).or_insert(0) += 1;
        self.tool_calls.push(ToolCall {
            tool_name: tool_name.to_string(),
            timestamp,
        });
    }

    pub(crate) fn record_file(
        &mut self,
        operation: FileOpKind,
        file_path: &str,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let set = match operation {
            FileOpKind::Read => &mut self.files_read,
            FileOpKind::Write => &mut self.files_written,
            FileOpKind::Edit => &mut self.files_edited,
        };
        set.push(file_path.to_string());
        self.file_operations.push(FileOperation {
            operation,
            file_path: file_path.to_string(),
            timestamp,
        });
    }

    /// Compute totals and deduplicate the file lists.
    pub(crate) fn finalize(&mut self) {
        self.total_tool_calls = self.tool_calls.len();
        self.total_file_operations = self.file_operations.len();
        self.total_commands = self.commands.len();
        self.total_errors = self.errors.len();
        self.total_user_prompts = self.user_prompts.len();

        for files in [
            &mut self.files_read,
            &mut self.files_written,
            &mut self.files_edited,
        ] {
            files.sort();
            files.dedup();
        }
    }
}
