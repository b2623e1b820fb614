use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use super::health::HealthState;
use super::status::AgentStatus;

/// Something that can put a message in front of the user.
///
/// Delivery is best-effort: return `false` when the message could not be
/// shown, never panic.
pub trait Notifier {
    fn notify(&self, title: &str, body: &str, play_sound: bool) -> bool;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, title: &str, body: &str, play_sound: bool) -> bool {
        (**self).notify(title, body, play_sound)
    }
}

/// Desktop notifications through the platform notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            app_name: "agentwatch".to_string(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str, play_sound: bool) -> bool {
        let mut notification = notify_rust::Notification::new();
        notification.appname(&self.app_name).summary(title).body(body);
        if play_sound {
            notification.sound_name("message-new-instant");
        }

        match notification.show() {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "desktop notification not shown");
                false
            }
        }
    }
}

/// Drops every notification. Used with `--no-notify`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _title: &str, _body: &str, _play_sound: bool) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Waiting,
    Error,
    Exited,
    Resumed,
}

impl NotificationKind {
    /// Which notification, if any, a transition deserves.
    pub fn for_transition(previous: HealthState, current: HealthState) -> Option<Self> {
        match (previous, current) {
            (prev, cur) if prev == cur => None,
            (_, HealthState::Waiting) => Some(Self::Waiting),
            (_, HealthState::Error) => Some(Self::Error),
            (_, HealthState::Exited) => Some(Self::Exited),
            (HealthState::Idle | HealthState::Waiting, HealthState::Active) => Some(Self::Resumed),
            _ => None,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Waiting => "Agent is waiting for input",
            Self::Error => "Agent encountered an error",
            Self::Exited => "Agent session has exited",
            Self::Resumed => "Agent resumed working",
        }
    }

    /// Resumed work is good news and stays silent.
    pub fn play_sound(self) -> bool {
        !matches!(self, Self::Resumed)
    }
}

/// One notification decided by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub task_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub play_sound: bool,
}

/// Last observed health per task.
#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    last: HashMap<String, HealthState>,
}

impl NotificationState {
    pub fn get(&self, task_id: &str) -> Option<HealthState> {
        self.last.get(task_id).copied()
    }

    /// Record `health`, returning what was there before.
    pub fn record(&mut self, task_id: &str, health: HealthState) -> Option<HealthState> {
        self.last.insert(task_id.to_string(), health)
    }

    /// Forget every task not in `live`.
    pub fn retain_only(&mut self, live: &HashSet<&str>) {
        self.last.retain(|task_id, _| live.contains(task_id.as_str()));
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

/// Turns health transitions between polls into notifications.
///
/// Owns its [`NotificationState`]; feed it one batch per polling cycle from a
/// single task (wrap it in a mutex if several threads poll).
pub struct NotificationEngine<N: Notifier> {
    notifier: N,
    state: NotificationState,
}

impl<N: Notifier> NotificationEngine<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            state: NotificationState::default(),
        }
    }

    pub fn state(&self) -> &NotificationState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Compare `statuses` with the previous batch and notify on changes.
    ///
    /// The first sighting of a task only records it. Tasks missing from this
    /// batch are forgotten afterwards.
    pub fn check_and_notify_state_changes(&mut self, statuses: &[AgentStatus]) -> Vec<Notification> {
        let mut sent = Vec::new();

        for status in statuses {
            let Some(previous) = self.state.record(&status.task_id, status.health) else {
                continue;
            };

            let Some(kind) = NotificationKind::for_transition(previous, status.health) else {
                continue;
            };

            info!(
                task = %status.task_id,
                from = %previous,
                to = %status.health,
                "agent state changed"
            );

            let notification = build_notification(status, kind);
            if !self.notifier.notify(
                &notification.title,
                &notification.body,
                notification.play_sound,
            ) {
                debug!(task = %status.task_id, "notification could not be displayed");
            }
            sent.push(notification);
        }

        let live: HashSet<&str> = statuses.iter().map(|s| s.task_id.as_str()).collect();
        self.state.retain_only(&live);

        sent
    }
}

fn build_notification(status: &AgentStatus, kind: NotificationKind) -> Notification {
    let title = format!("{} {}", status.health.icon(), status.task_id);
    let body = match &status.prompt {
        Some(prompt) if kind == NotificationKind::Waiting => {
            format!("{}\n{}", kind.message(), prompt.question)
        }
        _ if !status.last_output_preview.is_empty() => {
            format!("{}\n{}", kind.message(), status.last_output_preview)
        }
        _ => kind.message().to_string(),
    };

    Notification {
        task_id: status.task_id.clone(),
        kind,
        title,
        body,
        play_sound: kind.play_sound(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Records every call; can be told to fail.
    #[derive(Clone, Default)]
    struct RecordingNotifier {
        calls: Rc<RefCell<Vec<(String, bool)>>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, _title: &str, body: &str, play_sound: bool) -> bool {
            self.calls.borrow_mut().push((body.to_string(), play_sound));
            !self.fail
        }
    }

    fn status(task_id: &str, health: HealthState) -> AgentStatus {
        AgentStatus {
            task_id: task_id.to_string(),
            tmux_session: format!("tmux-{task_id}"),
            health,
            warnings: Vec::new(),
            process_running: true,
            last_output_preview: String::new(),
            recent_output: Vec::new(),
            prompt: None,
            task_title: String::new(),
            task_phase: None,
            suggested_phase: None,
            elapsed: None,
            notes: None,
        }
    }

    #[test]
    fn test_first_observation_is_silent() {
        let notifier = RecordingNotifier::default();
        let mut engine = NotificationEngine::new(notifier.clone());

        let sent = engine.check_and_notify_state_changes(&[status("t1", HealthState::Waiting)]);
        assert!(sent.is_empty());
        assert!(notifier.calls.borrow().is_empty());
        assert_eq!(engine.state().get("t1"), Some(HealthState::Waiting));
    }

    #[test]
    fn test_idle_to_waiting_notifies_once() {
        let notifier = RecordingNotifier::default();
        let mut engine = NotificationEngine::new(notifier.clone());

        engine.check_and_notify_state_changes(&[status("t1", HealthState::Idle)]);
        let sent = engine.check_and_notify_state_changes(&[status("t1", HealthState::Waiting)]);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::Waiting);
        assert_eq!(sent[0].body, "Agent is waiting for input");
        assert!(sent[0].play_sound);

        let again = engine.check_and_notify_state_changes(&[status("t1", HealthState::Waiting)]);
        assert!(again.is_empty());
        assert_eq!(notifier.calls.borrow().len(), 1);
    }

    #[test]
    fn test_waiting_to_active_is_silent_resume() {
        let mut engine = NotificationEngine::new(NullNotifier);
        engine.check_and_notify_state_changes(&[status("t1", HealthState::Waiting)]);
        let sent = engine.check_and_notify_state_changes(&[status("t1", HealthState::Active)]);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::Resumed);
        assert!(!sent[0].play_sound);
    }

    #[test]
    fn test_other_transitions_update_state_quietly() {
        let mut engine = NotificationEngine::new(NullNotifier);
        engine.check_and_notify_state_changes(&[status("t1", HealthState::Error)]);
        assert!(engine
            .check_and_notify_state_changes(&[status("t1", HealthState::Active)])
            .is_empty());
        assert!(engine
            .check_and_notify_state_changes(&[status("t1", HealthState::Idle)])
            .is_empty());
        assert_eq!(engine.state().get("t1"), Some(HealthState::Idle));
    }

    #[test]
    fn test_error_and_exit_notifications() {
        let mut engine = NotificationEngine::new(NullNotifier);
        engine.check_and_notify_state_changes(&[
            status("a", HealthState::Active),
            status("b", HealthState::Idle),
        ]);
        let sent = engine.check_and_notify_state_changes(&[
            status("a", HealthState::Error),
            status("b", HealthState::Exited),
        ]);
        let kinds: Vec<_> = sent.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::Error, NotificationKind::Exited]);
    }

    #[test]
    fn test_removed_task_is_pruned() {
        let mut engine = NotificationEngine::new(NullNotifier);
        engine.check_and_notify_state_changes(&[
            status("a", HealthState::Idle),
            status("b", HealthState::Idle),
        ]);
        assert_eq!(engine.state().len(), 2);

        engine.check_and_notify_state_changes(&[status("a", HealthState::Idle)]);
        assert_eq!(engine.state().len(), 1);
        assert_eq!(engine.state().get("b"), None);

        // Coming back counts as a first sighting again.
        let sent = engine.check_and_notify_state_changes(&[
            status("a", HealthState::Idle),
            status("b", HealthState::Waiting),
        ]);
        assert!(sent.is_empty());
    }

    #[test]
    fn test_failed_delivery_still_updates_state() {
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let mut engine = NotificationEngine::new(notifier);
        engine.check_and_notify_state_changes(&[status("t1", HealthState::Idle)]);
        let sent = engine.check_and_notify_state_changes(&[status("t1", HealthState::Error)]);
        assert_eq!(sent.len(), 1);
        assert_eq!(engine.state().get("t1"), Some(HealthState::Error));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut engine = NotificationEngine::new(NullNotifier);
        engine.check_and_notify_state_changes(&[status("t1", HealthState::Idle)]);
        engine.reset();
        assert!(engine.state().is_empty());
        assert!(engine
            .check_and_notify_state_changes(&[status("t1", HealthState::Waiting)])
            .is_empty());
    }

    #[test]
    fn test_waiting_body_includes_question() {
        let mut waiting = status("t1", HealthState::Waiting);
        waiting.prompt = Some(crate::output::PromptInfo {
            question: "Do you want to run npm test?".to_string(),
            options: vec!["Yes".to_string()],
            selected_index: 0,
        });
        let notification = build_notification(&waiting, NotificationKind::Waiting);
        assert_eq!(
            notification.body,
            "Agent is waiting for input\nDo you want to run npm test?"
        );
        assert_eq!(notification.title, "🟠 t1");
    }
}
