//! Structured events pulled out of captured agent sessions.

mod aggregate;
mod parser;
mod store;
mod types;

pub use aggregate::{get_aggregate_metrics, AggregateMetrics};
pub use parser::{is_valid_filepath, parse_session_file, parse_session_log};
pub use store::{
    collect_session_files, write_transcript, JsonlMetricsSink, MetricsSink, MetricsSource,
};
pub use types::{
    CommandExecution, ErrorEvent, ErrorKind, FileOpKind, FileOperation, PromptKind,
    SessionMetrics, ToolCall, UserPrompt,
};
