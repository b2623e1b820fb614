//! Per-agent health, workflow phase hints, state-change notifications and
//! bulk approval.

mod approve;
mod health;
mod notify;
mod phase;
mod status;

pub use approve::{
    approve_agent, approve_all, plan_approvals, ApprovalDecision, ApproveSummary,
};
pub use health::{
    classify_window, detect_health, HealthReport, HealthState, SessionCapture, HEALTH_WINDOW_LINES,
};
pub use notify::{
    DesktopNotifier, Notification, NotificationEngine, NotificationKind, NotificationState,
    Notifier, NullNotifier,
};
pub use phase::{
    advance_phases, detect_phase_signals, suggest_next_phase, PhaseSignals, AGENT_INDICATORS,
    REVIEW_INDICATORS,
};
pub use status::{
    format_elapsed, get_agent_status, get_all_agent_statuses, AgentStatus, StatusOptions,
};
