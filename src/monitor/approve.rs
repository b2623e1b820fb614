use serde::Serialize;
use tracing::{info, warn};

use super::health::HealthState;
use super::status::AgentStatus;
use crate::output::PromptMatcher;
use crate::tmux::Multiplexer;

/// Keys sent to accept a prompt: option 1 is always the plain "Yes".
const APPROVE_KEYS: &str = "1";

/// What approve-all will do for one waiting agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalDecision {
    pub task_id: String,
    pub tmux_session: String,
    pub question: String,
    pub approve: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApproveSummary {
    pub approved: usize,
    /// Destructive prompts left for a human
    pub skipped: usize,
    /// Approvals tmux refused to deliver
    pub failed: usize,
}

/// Decide, without touching tmux, which waiting prompts are safe to accept.
///
/// Only agents that are `Waiting` and carry a detected prompt are
/// considered; anything destructive is marked for skipping.
pub fn plan_approvals(agents: &[AgentStatus], matcher: &PromptMatcher) -> Vec<ApprovalDecision> {
    agents
        .iter()
        .filter(|agent| agent.health == HealthState::Waiting)
        .filter_map(|agent| {
            let prompt = agent.prompt.as_ref()?;
            Some(ApprovalDecision {
                task_id: agent.task_id.clone(),
                tmux_session: agent.tmux_session.clone(),
                question: prompt.question.clone(),
                approve: !matcher.is_destructive(prompt),
            })
        })
        .collect()
}

/// Answer "Yes" to the prompt pending in `session`.
pub async fn approve_agent<M: Multiplexer>(mux: &M, session: &str) -> bool {
    mux.send_keys(session, APPROVE_KEYS, true).await
}

/// Accept every safe pending prompt in one go. Human-invoked only.
pub async fn approve_all<M: Multiplexer>(
    mux: &M,
    agents: &[AgentStatus],
    matcher: &PromptMatcher,
) -> ApproveSummary {
    let mut summary = ApproveSummary::default();

    for decision in plan_approvals(agents, matcher) {
        if !decision.approve {
            info!(task = %decision.task_id, question = %decision.question, "skipping destructive prompt");
            summary.skipped += 1;
            continue;
        }

        if approve_agent(mux, &decision.tmux_session).await {
            info!(task = %decision.task_id, "approved");
            summary.approved += 1;
        } else {
            warn!(task = %decision.task_id, "could not send approval");
            summary.failed += 1;
        }
    }

    summary
}
