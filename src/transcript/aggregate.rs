use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::types::SessionMetrics;

/// Totals across many sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub session_count: usize,
    pub total_tool_calls: usize,
    pub total_file_operations: usize,
    pub total_commands: usize,
    pub total_errors: usize,
    pub total_user_prompts: usize,
    pub tool_breakdown: BTreeMap<String, usize>,
    pub unique_files_read: usize,
    pub unique_files_written: usize,
    pub unique_files_edited: usize,
    /// Errors per tool call; 0.0 when no tools ran.
    pub error_rate: f64,
}

pub fn get_aggregate_metrics(sessions: &[SessionMetrics]) -> AggregateMetrics {
    if sessions.is_empty() {
        return AggregateMetrics::default();
    }

    let mut agg = AggregateMetrics {
        session_count: sessions.len(),
        ..Default::default()
    };
    let mut read = BTreeSet::new();
    let mut written = BTreeSet::new();
    let mut edited = BTreeSet::new();

    for session in sessions {
        agg.total_tool_calls += session.total_tool_calls;
        agg.total_file_operations += session.total_file_operations;
        agg.total_commands += session.total_commands;
        agg.total_errors += session.total_errors;
        agg.total_user_prompts += session.total_user_prompts;

        for (tool, count) in &session.tool_counts {
            *agg.tool_breakdown.entry(tool.clone()).or_insert(0) += count;
        }

        read.extend(session.files_read.iter().map(String::as_str));
        written.extend(session.files_written.iter().map(String::as_str));
        edited.extend(session.files_edited.iter().map(String::as_str));
    }

    agg.unique_files_read = read.len();
    agg.unique_files_written = written.len();
    agg.unique_files_edited = edited.len();
    agg.error_rate = agg.total_errors as f64 / agg.total_tool_calls.max(1) as f64;
    agg
}
