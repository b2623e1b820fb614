use anyhow::Result;
use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use agentwatch::monitor::{format_elapsed, AgentStatus, HealthState};
use agentwatch::output::{PromptInfo, PromptMatcher};

use crate::actions::Action;

/// Theme colors inspired by Claude Code
pub struct Theme {
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87), // Claude orange
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

impl Theme {
    fn health(&self, health: HealthState) -> Color {
        match health {
            HealthState::Active => self.success,
            HealthState::Idle => self.warning,
            HealthState::Waiting => self.accent,
            HealthState::Exited => self.dim,
            HealthState::Error => self.error,
        }
    }
}

/// Input mode for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Creating,
    ConfirmingKill,
    /// The selected prompt looks destructive; ask before answering it
    ConfirmingApprove,
}

/// Footer message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Info(String),
    Error(String),
}

/// Main application state
pub struct App {
    /// Agents, most urgent first
    pub agents: Vec<AgentStatus>,
    pub list_state: ListState,
    pub message: Option<Message>,
    pub theme: Theme,
    pub input_mode: InputMode,
    pub input_buffer: String,
    pub pending_actions: Vec<Action>,
    pub last_update: Option<DateTime<Local>>,
    matcher: PromptMatcher,
}

impl App {
    pub fn new(matcher: PromptMatcher) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            agents: Vec::new(),
            list_state,
            message: None,
            theme: Theme::default(),
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            pending_actions: Vec::new(),
            last_update: None,
            matcher,
        }
    }

    pub fn selected_agent(&self) -> Option<&AgentStatus> {
        self.list_state.selected().and_then(|i| self.agents.get(i))
    }

    pub fn matcher(&self) -> &PromptMatcher {
        &self.matcher
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.message = Some(Message::Info(text.into()));
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.message = Some(Message::Error(text.into()));
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            Action::StatusesUpdated(agents) => {
                self.update_agents(agents);
                Ok(false)
            }
            Action::Notice(msg) => {
                self.info(msg);
                Ok(false)
            }
            Action::Error(msg) => {
                self.error(msg);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Replace the agent list, keeping the cursor on the same task even
    /// when the order changes.
    fn update_agents(&mut self, agents: Vec<AgentStatus>) {
        let selected_task = self.selected_agent().map(|a| a.task_id.clone());
        self.agents = agents;
        self.last_update = Some(Local::now());

        if self.agents.is_empty() {
            self.list_state.select(Some(0));
            return;
        }

        let index = selected_task
            .and_then(|id| self.agents.iter().position(|a| a.task_id == id))
            .or(self.list_state.selected())
            .unwrap_or(0)
            .min(self.agents.len() - 1);
        self.list_state.select(Some(index));
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if self.message.is_some() && self.input_mode == InputMode::Normal {
            self.message = None;
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Creating => self.handle_creating_key(key),
            InputMode::ConfirmingKill | InputMode::ConfirmingApprove => {
                self.handle_confirming_key(key)
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('j') | KeyCode::Down => self.next_agent(),
            KeyCode::Char('k') | KeyCode::Up => self.previous_agent(),
            KeyCode::Enter => {
                if let Some(agent) = self.selected_agent() {
                    self.pending_actions
                        .push(Action::AttachSession(agent.tmux_session.clone()));
                }
            }
            KeyCode::Char('a') => self.request_approve(),
            KeyCode::Char('A') => self.pending_actions.push(Action::ApproveAll),
            KeyCode::Char('n') => {
                self.input_mode = InputMode::Creating;
                self.input_buffer.clear();
            }
            KeyCode::Char('d') => {
                if self.selected_agent().is_some() {
                    self.input_mode = InputMode::ConfirmingKill;
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn request_approve(&mut self) {
        let Some(agent) = self.selected_agent() else {
            return;
        };
        let pending = match (&agent.prompt, agent.health) {
            (Some(prompt), HealthState::Waiting) => prompt,
            _ => {
                self.info("Nothing to approve");
                return;
            }
        };

        if self.matcher.is_destructive(pending) {
            self.input_mode = InputMode::ConfirmingApprove;
        } else {
            let session = agent.tmux_session.clone();
            self.pending_actions.push(Action::ApproveAgent(session));
        }
    }

    fn handle_creating_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Enter => {
                if !self.input_buffer.is_empty() {
                    let name = std::mem::take(&mut self.input_buffer);
                    self.pending_actions.push(Action::CreateSession(name));
                }
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Esc => {
                self.input_buffer.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char(c) => {
                // tmux session names can't contain '.' or ':'
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    self.input_buffer.push(c);
                }
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_confirming_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Some(agent) = self.selected_agent() {
                    let session = agent.tmux_session.clone();
                    let action = match self.input_mode {
                        InputMode::ConfirmingApprove => Action::ApproveAgent(session),
                        _ => Action::KillSession(session),
                    };
                    self.pending_actions.push(action);
                }
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
            }
            _ => {}
        }
        Ok(false)
    }

    fn next_agent(&mut self) {
        if self.agents.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) if i + 1 < self.agents.len() => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    fn previous_agent(&mut self) {
        if self.agents.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(0) | None => self.agents.len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Main content
                Constraint::Length(3), // Footer/status
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        self.render_footer(frame, chunks[2]);

        match self.input_mode {
            InputMode::Creating => self.render_create_dialog(frame),
            InputMode::ConfirmingKill => self.render_kill_dialog(frame),
            InputMode::ConfirmingApprove => self.render_approve_dialog(frame),
            InputMode::Normal => {}
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let waiting = self
            .agents
            .iter()
            .filter(|a| a.health == HealthState::Waiting)
            .count();
        let updated = self
            .last_update
            .map(|t| format!(" │ updated {}", t.format("%H:%M:%S")))
            .unwrap_or_default();

        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " agentwatch ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(
                    "│ {} agents │ {} waiting{}",
                    self.agents.len(),
                    waiting,
                    updated
                ),
                Style::default().fg(self.theme.dim),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(40), // Agent list
                Constraint::Percentage(60), // Detail pane
            ])
            .split(area);

        self.render_agent_list(frame, chunks[0]);
        self.render_detail_pane(frame, chunks[1]);
    }

    fn render_agent_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.agents.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No agents found. Press 'n' to start a session.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.agents
                .iter()
                .map(|agent| {
                    let color = self.theme.health(agent.health);
                    let mut spans = vec![
                        Span::raw(format!("{} ", agent.health.icon())),
                        Span::styled(agent.task_id.clone(), Style::default().fg(self.theme.fg)),
                        Span::styled(
                            format!(" {}", agent.health.label()),
                            Style::default().fg(color),
                        ),
                    ];
                    if let Some(elapsed) = agent.elapsed {
                        spans.push(Span::styled(
                            format!(" {}", format_elapsed(elapsed)),
                            Style::default().fg(self.theme.dim),
                        ));
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Agents ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn field<'a>(&self, name: &'a str, value: String, color: Color) -> Line<'a> {
        Line::from(vec![
            Span::styled(name, Style::default().fg(self.theme.dim)),
            Span::styled(value, Style::default().fg(color)),
        ])
    }

    fn prompt_lines(&self, prompt: &PromptInfo) -> Vec<Line<'static>> {
        let mut lines = vec![Line::from(Span::styled(
            prompt.question.clone(),
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD),
        ))];
        for (i, option) in prompt.options.iter().enumerate() {
            let (marker, style) = if i == prompt.selected_index {
                ("❯ ", Style::default().fg(self.theme.fg).add_modifier(Modifier::BOLD))
            } else {
                ("  ", Style::default().fg(self.theme.dim))
            };
            lines.push(Line::from(Span::styled(
                format!("{marker}{}. {option}", i + 1),
                style,
            )));
        }
        if self.matcher.is_destructive(prompt) {
            lines.push(Line::from(Span::styled(
                "Destructive: approve-all will skip this prompt",
                Style::default().fg(self.theme.error),
            )));
        }
        lines
    }

    fn render_detail_pane(&self, frame: &mut Frame, area: Rect) {
        let Some(agent) = self.selected_agent() else {
            let content = vec![
                Line::from(Span::styled(
                    "No agent selected",
                    Style::default().fg(self.theme.dim),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Press 'n' to create a new session",
                    Style::default().fg(self.theme.dim),
                )),
            ];
            let detail = Paragraph::new(content).block(self.detail_block());
            frame.render_widget(detail, area);
            return;
        };

        let mut content = vec![
            self.field("Task: ", agent.task_id.clone(), self.theme.fg),
            self.field("Session: ", agent.tmux_session.clone(), self.theme.fg),
            self.field(
                "Health: ",
                agent.health.display(true),
                self.theme.health(agent.health),
            ),
        ];
        if !agent.task_title.is_empty() && agent.task_title != agent.task_id {
            content.push(self.field("Title: ", agent.task_title.clone(), self.theme.fg));
        }
        if let Some(phase) = &agent.task_phase {
            let phase = match &agent.suggested_phase {
                Some(next) => format!("{phase} → {next}"),
                None => phase.clone(),
            };
            content.push(self.field("Phase: ", phase, self.theme.fg));
        }
        if let Some(elapsed) = agent.elapsed {
            content.push(self.field("Elapsed: ", format_elapsed(elapsed), self.theme.fg));
        }
        if let Some(notes) = &agent.notes {
            content.push(self.field("Notes: ", notes.clone(), self.theme.dim));
        }
        for warning in &agent.warnings {
            content.push(Line::from(Span::styled(
                format!("! {warning}"),
                Style::default().fg(self.theme.warning),
            )));
        }

        if let Some(prompt) = &agent.prompt {
            content.push(Line::from(""));
            content.extend(self.prompt_lines(prompt));
        }

        content.push(Line::from(""));
        content.push(Line::from(Span::styled(
            "Recent output",
            Style::default().fg(self.theme.dim),
        )));

        // Borders take two rows.
        let room = (area.height as usize).saturating_sub(content.len() + 2);
        let start = agent.recent_output.len().saturating_sub(room);
        let output_style = Style::default().fg(self.theme.fg);
        content.extend(
            agent.recent_output[start..]
                .iter()
                .map(|line| Line::from(Span::styled(line.clone(), output_style))),
        );

        let detail = Paragraph::new(content)
            .block(self.detail_block())
            .wrap(Wrap { trim: false });
        frame.render_widget(detail, area);
    }

    fn detail_block(&self) -> Block<'static> {
        Block::default()
            .title(" Details ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.dim))
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = " q: Quit │ j/k: Navigate │ Enter: Attach │ a: Approve │ A: Approve all │ n: New │ d: Kill ";

        let content = match &self.message {
            Some(Message::Info(msg)) => Line::from(Span::styled(
                format!(" {msg} "),
                Style::default().fg(self.theme.success),
            )),
            Some(Message::Error(msg)) => Line::from(Span::styled(
                format!(" {msg} "),
                Style::default().fg(self.theme.error),
            )),
            None => Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim))),
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }

    fn render_dialog(&self, frame: &mut Frame, title: &str, border: Color, text: Vec<Line>) {
        let area = centered_rect(50, 20, frame.area());

        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(title.to_string())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border));

        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), inner);
    }

    fn render_create_dialog(&self, frame: &mut Frame) {
        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                "Enter session name:",
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                format!("▶ {}_", self.input_buffer),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press Enter to create, Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];
        self.render_dialog(frame, " Create New Session ", self.theme.accent, text);
    }

    fn render_kill_dialog(&self, frame: &mut Frame) {
        let session = self
            .selected_agent()
            .map(|a| a.tmux_session.as_str())
            .unwrap_or("unknown");

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("Kill session '{session}'?"),
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "The agent running in it will be terminated.",
                Style::default().fg(self.theme.warning),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press 'y' to confirm, 'n' or Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];
        self.render_dialog(frame, " Confirm Kill ", self.theme.error, text);
    }

    fn render_approve_dialog(&self, frame: &mut Frame) {
        let question = self
            .selected_agent()
            .and_then(|a| a.prompt.as_ref())
            .map(|p| p.question.clone())
            .unwrap_or_default();

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(question, Style::default().fg(self.theme.fg))),
            Line::from(""),
            Line::from(Span::styled(
                "This prompt looks destructive.",
                Style::default().fg(self.theme.error),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press 'y' to approve anyway, 'n' or Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];
        self.render_dialog(frame, " Confirm Approval ", self.theme.error, text);
    }
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> Action {
        Action::KeyPress(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn agent(task_id: &str, health: HealthState, question: Option<&str>) -> AgentStatus {
        AgentStatus {
            task_id: task_id.to_string(),
            tmux_session: format!("tmux-{task_id}"),
            health,
            warnings: Vec::new(),
            process_running: true,
            last_output_preview: String::new(),
            recent_output: Vec::new(),
            prompt: question.map(|q| PromptInfo {
                question: q.to_string(),
                options: vec!["Yes".to_string(), "No".to_string()],
                selected_index: 0,
            }),
            task_title: String::new(),
            task_phase: None,
            suggested_phase: None,
            elapsed: None,
            notes: None,
        }
    }

    fn app_with(agents: Vec<AgentStatus>) -> App {
        let mut app = App::new(PromptMatcher::default());
        app.handle_action(Action::StatusesUpdated(agents)).unwrap();
        app
    }

    #[test]
    fn test_selection_follows_task_across_reorder() {
        let mut app = app_with(vec![
            agent("a", HealthState::Active, None),
            agent("b", HealthState::Idle, None),
        ]);
        app.handle_action(key(KeyCode::Char('j'))).unwrap();
        assert_eq!(app.selected_agent().unwrap().task_id, "b");

        app.handle_action(Action::StatusesUpdated(vec![
            agent("b", HealthState::Waiting, Some("Do you want to run ls?")),
            agent("a", HealthState::Active, None),
        ]))
        .unwrap();
        assert_eq!(app.selected_agent().unwrap().task_id, "b");
    }

    #[test]
    fn test_approve_safe_prompt_queues_action() {
        let mut app = app_with(vec![agent(
            "a",
            HealthState::Waiting,
            Some("Do you want to create notes.md?"),
        )]);
        app.handle_action(key(KeyCode::Char('a'))).unwrap();

        let actions = app.take_pending_actions();
        assert!(matches!(&actions[..], [Action::ApproveAgent(s)] if s == "tmux-a"));
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn test_approve_destructive_prompt_needs_confirmation() {
        let mut app = app_with(vec![agent(
            "a",
            HealthState::Waiting,
            Some("Do you want to delete dist/?"),
        )]);
        app.handle_action(key(KeyCode::Char('a'))).unwrap();
        assert_eq!(app.input_mode, InputMode::ConfirmingApprove);
        assert!(app.take_pending_actions().is_empty());

        app.handle_action(key(KeyCode::Char('y'))).unwrap();
        let actions = app.take_pending_actions();
        assert!(matches!(&actions[..], [Action::ApproveAgent(s)] if s == "tmux-a"));
    }

    #[test]
    fn test_approve_without_prompt_is_a_notice() {
        let mut app = app_with(vec![agent("a", HealthState::Idle, None)]);
        app.handle_action(key(KeyCode::Char('a'))).unwrap();
        assert!(app.take_pending_actions().is_empty());
        assert_eq!(app.message, Some(Message::Info("Nothing to approve".to_string())));
    }

    #[test]
    fn test_kill_confirm_and_cancel() {
        let mut app = app_with(vec![agent("a", HealthState::Idle, None)]);

        app.handle_action(key(KeyCode::Char('d'))).unwrap();
        app.handle_action(key(KeyCode::Esc)).unwrap();
        assert!(app.take_pending_actions().is_empty());

        app.handle_action(key(KeyCode::Char('d'))).unwrap();
        app.handle_action(key(KeyCode::Char('y'))).unwrap();
        let actions = app.take_pending_actions();
        assert!(matches!(&actions[..], [Action::KillSession(s)] if s == "tmux-a"));
    }

    #[test]
    fn test_create_session_filters_name() {
        let mut app = app_with(Vec::new());
        app.handle_action(key(KeyCode::Char('n'))).unwrap();
        for c in "my.agent-1".chars() {
            app.handle_action(key(KeyCode::Char(c))).unwrap();
        }
        app.handle_action(key(KeyCode::Enter)).unwrap();

        let actions = app.take_pending_actions();
        assert!(matches!(&actions[..], [Action::CreateSession(s)] if s == "myagent-1"));
    }

    #[test]
    fn test_quit_keys() {
        let mut app = app_with(Vec::new());
        assert!(app.handle_action(key(KeyCode::Char('q'))).unwrap());

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(app.handle_action(Action::KeyPress(ctrl_c)).unwrap());
    }
}
