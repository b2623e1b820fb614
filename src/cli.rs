//! Command line interface and the one-shot commands.
//!
//! `watch` (the dashboard) lives in `main`; everything here runs once,
//! prints to stdout and exits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::warn;

use agentwatch::config::Config;
use agentwatch::monitor::{
    approve_all, format_elapsed, get_all_agent_statuses, plan_approvals, AgentStatus,
};
use agentwatch::output::{collapse_whitespace, strip_ansi};
use agentwatch::tmux::{tail_session, Multiplexer, TmuxClient};
use agentwatch::transcript::{
    collect_session_files, get_aggregate_metrics, parse_session_file, write_transcript,
    AggregateMetrics, JsonlMetricsSink, MetricsSink, MetricsSource, SessionMetrics,
};

#[derive(Parser, Debug)]
#[command(name = "agentwatch")]
#[command(version, about = "Watch terminal coding agents running in tmux")]
pub struct Cli {
    /// Config file (default: ~/.agentwatch/config.toml)
    #[arg(long, env = "AGENTWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Don't show desktop notifications
    #[arg(long, global = true)]
    pub no_notify: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Live dashboard (the default)
    Watch,
    /// Print the health of every agent once
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Follow a session's output
    Tail {
        session: String,
        /// Lines captured per poll
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
    /// Save a session's scrollback as a transcript for `analyze`
    Capture {
        session: String,
        /// Task id for the file name (default: the session name)
        #[arg(long)]
        task: Option<String>,
        #[arg(short = 'n', long, default_value_t = 5000)]
        lines: usize,
        /// Output directory (default: log_dir from the config)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Summarise captured transcripts
    Analyze {
        /// Directory to scan (default: log_dir from the config)
        dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
        /// Also append per-session metrics to this JSON-lines file
        #[arg(long)]
        sink: Option<PathBuf>,
    },
    /// Answer "Yes" to every pending prompt that isn't destructive
    ApproveAll {
        /// Only show what would be approved
        #[arg(long)]
        dry_run: bool,
    },
}

async fn collect_statuses(config: &Config, client: &TmuxClient) -> Result<Vec<AgentStatus>> {
    let store = config.task_store(client.clone());
    let options = config.status_options()?;
    get_all_agent_statuses(client, &store, &options)
        .await
        .context("Failed to collect agent statuses")
}

/// Configured tasks are still listed (as exited) without a tmux server;
/// the session-backed store has nothing to show.
fn listable_without_server(config: &Config) -> bool {
    !config.tasks.is_empty()
}

pub async fn status(config: &Config, json: bool) -> Result<()> {
    let client = config.tmux_client();
    if !client.is_server_running().await {
        if !listable_without_server(config) {
            println!("tmux server is not running");
            return Ok(());
        }
        warn!("tmux server is not running");
    }

    let agents = collect_statuses(config, &client).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    if agents.is_empty() {
        println!("No agents found");
        return Ok(());
    }

    for agent in &agents {
        let elapsed = agent
            .elapsed
            .map(|e| format!(" [{}]", format_elapsed(e)))
            .unwrap_or_default();
        println!(
            "{} {} ({}){}",
            agent.health.display(true),
            agent.task_id,
            agent.tmux_session,
            elapsed
        );
        for warning in &agent.warnings {
            println!("    ! {warning}");
        }
        if let (Some(phase), Some(next)) = (&agent.task_phase, &agent.suggested_phase) {
            println!("    » phase {phase} → {next}");
        }
        if let Some(prompt) = &agent.prompt {
            println!("    ? {}", prompt.question);
            for (i, option) in prompt.options.iter().enumerate() {
                let marker = if i == prompt.selected_index { '❯' } else { ' ' };
                println!("    {marker} {}. {option}", i + 1);
            }
        } else {
            let start = agent.recent_output.len().saturating_sub(config.preview_lines);
            for line in &agent.recent_output[start..] {
                println!("    │ {line}");
            }
        }
    }
    Ok(())
}

pub async fn tail(config: &Config, session: &str, lines: usize) -> Result<()> {
    let client = config.tmux_client();
    if !client.session_exists(session).await {
        anyhow::bail!("tmux session '{}' not found", session);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = async move {
        while let Some(line) = rx.recv().await {
            println!("{line}");
        }
    };

    tokio::join!(
        tail_session(&client, session, lines.max(1), config.poll_interval(), tx),
        printer
    );
    Ok(())
}

pub async fn capture(
    config: &Config,
    session: &str,
    task: Option<&str>,
    lines: usize,
    dir: Option<PathBuf>,
) -> Result<()> {
    let client = config.tmux_client();
    if !client.session_exists(session).await {
        anyhow::bail!("tmux session '{}' not found", session);
    }

    let raw = client
        .capture(session, lines.max(1))
        .await
        .with_context(|| format!("No output captured from '{session}'"))?;
    let stripped = strip_ansi(&raw);
    let clean_lines: Vec<&str> = stripped.lines().collect();
    let content = collapse_whitespace(&clean_lines).join("\n");

    let dir = dir.unwrap_or_else(|| config.log_dir());
    let path = write_transcript(&dir, task.unwrap_or(session), &content, Local::now())
        .context("Failed to write transcript")?;
    println!("{}", path.display());
    Ok(())
}

pub fn analyze(
    config: &Config,
    dir: Option<PathBuf>,
    json: bool,
    sink: Option<PathBuf>,
) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.log_dir());
    let files = collect_session_files(&dir);

    let sessions: Vec<(PathBuf, SessionMetrics)> = files
        .into_iter()
        .filter_map(|path| parse_session_file(&path).map(|m| (path, m)))
        .collect();

    if let Some(sink_path) = sink {
        let mut sink = JsonlMetricsSink::open(&sink_path)
            .with_context(|| format!("Failed to open {}", sink_path.display()))?;
        for (path, metrics) in &sessions {
            sink.store(metrics, &MetricsSource::new(metrics, Some(path.as_path())))?;
        }
    }

    let metrics: Vec<SessionMetrics> = sessions.into_iter().map(|(_, m)| m).collect();
    let aggregate = get_aggregate_metrics(&metrics);

    if json {
        println!("{}", serde_json::to_string_pretty(&aggregate)?);
    } else {
        print_aggregate(&dir, &aggregate, &metrics);
    }
    Ok(())
}

fn print_aggregate(dir: &std::path::Path, agg: &AggregateMetrics, sessions: &[SessionMetrics]) {
    if agg.session_count == 0 {
        println!("No transcripts found in {}", dir.display());
        return;
    }

    println!("Sessions:        {}", agg.session_count);
    println!("Tool calls:      {}", agg.total_tool_calls);
    println!("File operations: {}", agg.total_file_operations);
    println!(
        "Files:           {} read, {} written, {} edited",
        agg.unique_files_read, agg.unique_files_written, agg.unique_files_edited
    );
    println!("Commands:        {}", agg.total_commands);
    println!("User prompts:    {}", agg.total_user_prompts);
    println!(
        "Errors:          {} ({:.1}% of tool calls)",
        agg.total_errors,
        agg.error_rate * 100.0
    );

    let mut tools: Vec<_> = agg.tool_breakdown.iter().collect();
    tools.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    if !tools.is_empty() {
        println!();
        println!("Top tools:");
        for (tool, count) in tools.into_iter().take(10) {
            println!("  {count:>6}  {tool}");
        }
    }

    println!();
    for session in sessions {
        println!(
            "  {}: {} tools, {} prompts, {} errors",
            session.task_id,
            session.total_tool_calls,
            session.total_user_prompts,
            session.total_errors
        );
    }
}

pub async fn approve(config: &Config, dry_run: bool) -> Result<()> {
    let client = config.tmux_client();
    let agents = collect_statuses(config, &client).await?;
    let matcher = config.prompt_matcher()?;

    if dry_run {
        let plan = plan_approvals(&agents, &matcher);
        if plan.is_empty() {
            println!("No agents are waiting on a prompt");
        }
        for decision in plan {
            let verdict = if decision.approve { "approve" } else { "skip   " };
            println!("{verdict} {}: {}", decision.task_id, decision.question);
        }
        return Ok(());
    }

    let summary = approve_all(&client, &agents, &matcher).await;
    println!(
        "Approved {}, skipped {} destructive, {} failed",
        summary.approved, summary.skipped, summary.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::try_parse_from(["agentwatch"]).unwrap();
        assert_eq!(cli.command, None);
        assert!(!cli.no_notify);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["agentwatch", "status", "--json", "--no-notify"]).unwrap();
        assert_eq!(cli.command, Some(Command::Status { json: true }));
        assert!(cli.no_notify);
    }

    #[test]
    fn test_capture_args() {
        let cli =
            Cli::try_parse_from(["agentwatch", "capture", "agent-1", "--task", "auth", "-n", "200"])
                .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Capture {
                session: "agent-1".to_string(),
                task: Some("auth".to_string()),
                lines: 200,
                dir: None,
            })
        );
    }

    #[test]
    fn test_approve_all_dry_run() {
        let cli = Cli::try_parse_from(["agentwatch", "approve-all", "--dry-run"]).unwrap();
        assert_eq!(cli.command, Some(Command::ApproveAll { dry_run: true }));
    }

    #[test]
    fn test_configured_tasks_listed_without_server() {
        assert!(!listable_without_server(&Config::default()));

        let config = Config {
            tasks: vec![agentwatch::tasks::TaskRecord {
                task_id: "auth".to_string(),
                tmux_session: Some("agent-auth".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(listable_without_server(&config));
    }

    #[tokio::test]
    async fn test_status_without_server_shows_configured_tasks() {
        let config = Config {
            tasks: vec![agentwatch::tasks::TaskRecord {
                task_id: "auth".to_string(),
                tmux_session: Some("agentwatch-test-no-such-session".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let client = config.tmux_client();

        let agents = collect_statuses(&config, &client).await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].task_id, "auth");
        assert_eq!(agents[0].health, agentwatch::monitor::HealthState::Exited);
    }

    #[test]
    fn test_analyze_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        analyze(&config, Some(dir.path().to_path_buf()), true, None).unwrap();
    }
}
