//! [`EventHandler`] that forwards orchestrator events to WebSocket clients.
//!
//! [`WebBroadcastHandler`] converts the borrowed [`OrchestratorEvent`] values
//! into owned [`WsEvent`]s and publishes them on a
//! `tokio::sync::broadcast` channel. Nothing blocks: when no client is
//! connected the send simply fails and the event is dropped.

use serde::Serialize;
use switchboard::ToolCall;
use switchboard::agent::{EventHandler, OrchestratorEvent};
use switchboard::tools::truncate_result;
use tokio::sync::broadcast;

/// Maximum tool result size sent over WebSocket. Full results stay in the
/// persisted conversation.
const MAX_WS_TOOL_RESULT_CHARS: usize = 8 * 1024;

/// A message pushed to WebSocket clients, tagged on `type`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    TurnStarted {
        conversation_id: String,
        agent: String,
    },
    Resumed {
        conversation_id: String,
        agent: String,
        approved: bool,
    },
    Delegated {
        from: String,
        to: String,
        depth: usize,
    },
    DelegationRefused {
        from: String,
        to: String,
    },
    Escalated {
        from: String,
        to: String,
    },
    ToolExecuting {
        name: String,
        call_id: String,
    },
    ToolResult {
        name: String,
        call_id: String,
        result: String,
        is_error: bool,
    },
    ApprovalRequired {
        conversation_id: String,
        agent: String,
        pending: Vec<ToolCall>,
    },
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    TurnFinished {
        conversation_id: String,
        awaiting_approval: bool,
        steps: u32,
    },
}

impl WsEvent {
    /// Owned form of `event`, or `None` for events not worth a push.
    pub fn from_event(event: &OrchestratorEvent<'_>) -> Option<Self> {
        let ws = match event {
            OrchestratorEvent::TurnStarted {
                conversation_id,
                agent,
            } => WsEvent::TurnStarted {
                conversation_id: conversation_id.to_string(),
                agent: agent.to_string(),
            },
            OrchestratorEvent::Resumed {
                conversation_id,
                agent,
                approved,
            } => WsEvent::Resumed {
                conversation_id: conversation_id.to_string(),
                agent: agent.to_string(),
                approved: *approved,
            },
            OrchestratorEvent::Delegated { from, to, depth } => WsEvent::Delegated {
                from: from.to_string(),
                to: to.to_string(),
                depth: *depth,
            },
            OrchestratorEvent::DelegationRefused { from, to, .. } => WsEvent::DelegationRefused {
                from: from.to_string(),
                to: to.to_string(),
            },
            OrchestratorEvent::Escalated { from, to } => WsEvent::Escalated {
                from: from.to_string(),
                to: to.to_string(),
            },
            OrchestratorEvent::ToolExecuting { name, call_id } => WsEvent::ToolExecuting {
                name: name.to_string(),
                call_id: call_id.to_string(),
            },
            OrchestratorEvent::ToolResult {
                name,
                call_id,
                result,
                is_error,
            } => WsEvent::ToolResult {
                name: name.to_string(),
                call_id: call_id.to_string(),
                result: truncate_result(result.to_string(), MAX_WS_TOOL_RESULT_CHARS),
                is_error: *is_error,
            },
            OrchestratorEvent::ApprovalRequired {
                conversation_id,
                agent,
                pending,
            } => WsEvent::ApprovalRequired {
                conversation_id: conversation_id.to_string(),
                agent: agent.to_string(),
                pending: pending.to_vec(),
            },
            OrchestratorEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => WsEvent::TokenUsage {
                prompt_tokens: *prompt_tokens,
                completion_tokens: *completion_tokens,
            },
            OrchestratorEvent::TurnFinished {
                conversation_id,
                awaiting_approval,
                steps,
            } => WsEvent::TurnFinished {
                conversation_id: conversation_id.to_string(),
                awaiting_approval: *awaiting_approval,
                steps: *steps,
            },
            _ => return None,
        };
        Some(ws)
    }
}

/// Publishes orchestrator events to every subscribed WebSocket client.
pub struct WebBroadcastHandler {
    tx: broadcast::Sender<WsEvent>,
}

impl WebBroadcastHandler {
    pub fn new(tx: broadcast::Sender<WsEvent>) -> Self {
        Self { tx }
    }
}

impl EventHandler for WebBroadcastHandler {
    fn on_event(&self, event: &OrchestratorEvent<'_>) {
        if let Some(ws) = WsEvent::from_event(event) {
            let _ = self.tx.send(ws);
        }
    }
}
