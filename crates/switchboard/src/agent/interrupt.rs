//! Tool batch classification, approval gating, and suspension/resumption.
//!
//! A batch runs inline only if every call is in the active agent's safe set.
//! Otherwise nothing runs: the batch is captured in an [`InterruptPoint`],
//! persisted, and the turn suspends until a human supplies an
//! [`ApprovalDecision`].
//!
//! The decision is written onto the interrupt before any call runs, and each
//! approved call is marked dispatched before it executes. A resume that
//! finds a recorded decision finishes that decision instead of applying a
//! new one, and never runs a dispatched call twice.

use super::definition::{AgentDefinition, AgentId};
use super::events::{EventHandler, OrchestratorEvent};
use crate::tools::ToolSet;
use crate::{Message, ToolCall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a tool batch must be handled for a given agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchClass {
    AutoExecute,
    /// `gated` lists the call names outside the safe set, in batch order.
    RequiresApproval { gated: Vec<String> },
}

pub fn classify_batch(agent: &AgentDefinition, calls: &[ToolCall]) -> BatchClass {
    let gated: Vec<String> = calls
        .iter()
        .filter(|c| !agent.is_safe(&c.name))
        .map(|c| c.name.clone())
        .collect();
    if gated.is_empty() {
        BatchClass::AutoExecute
    } else {
        BatchClass::RequiresApproval { gated }
    }
}

/// A suspended tool batch awaiting a human decision. Consumed exactly once.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InterruptPoint {
    pub agent_id: AgentId,
    pub pending_calls: Vec<ToolCall>,
    pub created_at: DateTime<Utc>,
    /// Set once a resume has accepted a decision. Later resumes finish this
    /// decision and ignore their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<ApprovalDecision>,
    /// Ids of approved calls that were started.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dispatched: Vec<String>,
}

impl InterruptPoint {
    pub fn new(agent_id: AgentId, pending_calls: Vec<ToolCall>) -> Self {
        Self {
            agent_id,
            pending_calls,
            created_at: Utc::now(),
            decision: None,
            dispatched: Vec::new(),
        }
    }

    pub fn was_dispatched(&self, call_id: &str) -> bool {
        self.dispatched.iter().any(|id| id == call_id)
    }
}

/// A human verdict on a pending batch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Reject { reason: String },
}

impl ApprovalDecision {
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject {
            reason: reason.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approve)
    }
}

/// Execute `calls` sequentially, in order, producing one Tool-result message
/// per call. Failures become error-bearing results under the same call id.
pub async fn execute_batch(
    tools: &ToolSet,
    calls: &[ToolCall],
    events: &dyn EventHandler,
) -> Vec<Message> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        results.push(execute_call(tools, call, events).await);
    }
    results
}

/// Execute one call. A failure becomes an error-bearing result.
pub async fn execute_call(tools: &ToolSet, call: &ToolCall, events: &dyn EventHandler) -> Message {
    events.on_event(&OrchestratorEvent::ToolExecuting {
        name: &call.name,
        call_id: &call.id,
    });

    let (content, is_error) = match tools.execute(&call.name, &call.args_json()).await {
        Ok(text) => (text, false),
        Err(e) => (format!("Error: {e}. Please fix your mistakes."), true),
    };

    events.on_event(&OrchestratorEvent::ToolResult {
        name: &call.name,
        call_id: &call.id,
        result: &content,
        is_error,
    });
    Message::tool_result(&call.id, content)
}

/// Result for an approved call that was started but whose result was never
/// saved. The call is not run again.
pub fn interrupted_call_message(call: &ToolCall) -> Message {
    Message::tool_result(
        &call.id,
        format!(
            "Error: '{}' was started earlier but its result was lost when processing \
             stopped. It was not run again. Check whether it took effect before retrying.",
            call.name
        ),
    )
}

/// Synthetic results for a rejected batch. By default only the first pending
/// call is answered; with `each` set, every pending call gets its own result.
pub fn rejection_messages(point: &InterruptPoint, reason: &str, each: bool) -> Vec<Message> {
    let content = format!(
        "API call denied by user. Reasoning: '{reason}'. \
         Continue assisting, accounting for the user's input."
    );
    let take = if each { point.pending_calls.len() } else { 1 };
    point
        .pending_calls
        .iter()
        .take(take)
        .map(|call| Message::tool_result(&call.id, content.clone()))
        .collect()
}
