use std::fs::OpenOptions;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use agentwatch::config::{self, Config};
use agentwatch::monitor::{
    advance_phases, approve_agent, approve_all, get_all_agent_statuses, DesktopNotifier,
    NotificationEngine, Notifier, NullNotifier,
};

mod actions;
mod app;
mod cli;

use actions::Action;
use app::App;
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.clone().unwrap_or(Command::Watch);

    init_tracing(command == Command::Watch)?;

    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;

    match command {
        Command::Watch => {
            let notify = config.notifications && !cli.no_notify;
            run_dashboard(config, notify).await
        }
        Command::Status { json } => cli::status(&config, json).await,
        Command::Tail { session, lines } => cli::tail(&config, &session, lines).await,
        Command::Capture {
            session,
            task,
            lines,
            dir,
        } => cli::capture(&config, &session, task.as_deref(), lines, dir).await,
        Command::Analyze { dir, json, sink } => cli::analyze(&config, dir, json, sink),
        Command::ApproveAll { dry_run } => cli::approve(&config, dry_run).await,
    }
}

/// The dashboard owns the terminal, so its logs go to a file. One-shot
/// commands log to stderr.
fn init_tracing(to_file: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if to_file {
        let dir = config::data_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("agentwatch.log"))
            .context("Failed to open log file")?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Poll every agent on the configured interval, feed the notification
/// engine, advance task phases and hand the statuses to the UI.
fn spawn_poller(config: Config, notify: bool, tx: mpsc::UnboundedSender<Action>) {
    tokio::spawn(async move {
        let options = match config.status_options() {
            Ok(options) => options,
            Err(e) => {
                let _ = tx.send(Action::Error(format!("Config: {}", e)));
                return;
            }
        };
        let client = config.tmux_client();
        let store = config.task_store(client.clone());

        let notifier: Box<dyn Notifier + Send> = if notify {
            Box::new(DesktopNotifier::new())
        } else {
            Box::new(NullNotifier)
        };
        let mut engine = NotificationEngine::new(notifier);

        let mut ticker = tokio::time::interval(config.poll_interval());
        loop {
            ticker.tick().await;

            let action = match get_all_agent_statuses(&client, &store, &options).await {
                Ok(statuses) => {
                    // Desktop notifications block on the session bus.
                    let sent = tokio::task::block_in_place(|| {
                        engine.check_and_notify_state_changes(&statuses)
                    });
                    if let Some(latest) = sent.last() {
                        let notice = format!("{}: {}", latest.title, latest.kind.message());
                        if tx.send(Action::Notice(notice)).is_err() {
                            break;
                        }
                    }
                    for (task_id, phase) in advance_phases(&store, &statuses).await {
                        let notice = format!("{task_id}: phase is now {phase}");
                        if tx.send(Action::Notice(notice)).is_err() {
                            break;
                        }
                    }
                    Action::StatusesUpdated(statuses)
                }
                Err(e) => {
                    error!(error = %e, "could not list tasks");
                    Action::Error(format!("Tasks: {}", e))
                }
            };

            if tx.send(action).is_err() {
                break;
            }
        }
    });
}

async fn run_dashboard(config: Config, notify: bool) -> Result<()> {
    info!(notify, poll_ms = config.poll_interval_ms, "starting dashboard");

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    let tmux_client = config.tmux_client();
    let mut app = App::new(config.prompt_matcher()?);

    // Initialize terminal
    let mut terminal = ratatui::init();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind == KeyEventKind::Press && input_tx.send(Action::KeyPress(key)).is_err()
                    {
                        break;
                    }
                }
            }
        }
    });

    spawn_poller(config, notify, tx.clone());

    // Main event loop
    let result = loop {
        terminal.draw(|f| app.render(f))?;

        for pending_action in app.take_pending_actions() {
            match pending_action {
                Action::AttachSession(ref session) => {
                    // Suspend TUI and attach to session
                    ratatui::restore();

                    let cmd = tmux_client.attach_command(session);
                    let status = std::process::Command::new(&cmd[0])
                        .args(&cmd[1..])
                        .stdin(Stdio::inherit())
                        .stdout(Stdio::inherit())
                        .stderr(Stdio::inherit())
                        .status();

                    // Resume TUI
                    terminal = ratatui::init();

                    if let Err(e) = status {
                        app.error(format!("Failed to attach: {}", e));
                    }
                }
                Action::CreateSession(ref name) => match tmux_client.create_session(name).await {
                    Ok(_) => app.info(format!("Session '{}' created", name)),
                    Err(e) => app.error(format!("Failed to create: {}", e)),
                },
                Action::KillSession(ref session) => {
                    match tmux_client.kill_session(session).await {
                        Ok(_) => app.info(format!("Session '{}' killed", session)),
                        Err(e) => app.error(format!("Failed to kill: {}", e)),
                    }
                }
                Action::ApproveAgent(ref session) => {
                    if approve_agent(&tmux_client, session).await {
                        info!(session = %session, "approved from dashboard");
                        app.info(format!("Approved prompt in '{}'", session));
                    } else {
                        app.error(format!("Could not send keys to '{}'", session));
                    }
                }
                Action::ApproveAll => {
                    let summary = approve_all(&tmux_client, &app.agents, app.matcher()).await;
                    app.info(format!(
                        "Approved {}, skipped {} destructive, {} failed",
                        summary.approved, summary.skipped, summary.failed
                    ));
                }
                _ => {}
            }
        }

        let Some(action) = rx.recv().await else {
            break Ok(());
        };
        match app.handle_action(action) {
            Ok(true) => break Ok(()),
            Ok(false) => {}
            Err(e) => break Err(e),
        }
    };

    // Restore terminal
    ratatui::restore();
    result
}
