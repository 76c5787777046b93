//! Per-agent routing: translate a model response into a control-flow decision.
//!
//! Precedence, highest first:
//!
//! 1. No tool calls: [`RouteDecision::Terminal`].
//! 2. Any call to the agent's escalation tool: [`RouteDecision::Escalate`]
//!    (first such call wins, remaining calls are discarded).
//! 3. The *first* call names a hand-off tool: [`RouteDecision::Delegate`].
//! 4. Any call names a tool no agent declares: [`RouteDecision::UnknownTool`].
//! 5. Otherwise the whole set is a [`RouteDecision::ToolBatch`].

use super::definition::{AgentDefinition, AgentId, AgentRegistry};
use crate::{Message, ToolCall};

#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// The agent answered in text; the turn ends.
    Terminal,
    /// Hand control to `target`.
    Delegate { target: AgentId, call: ToolCall },
    /// Return control to the parent agent.
    Escalate { call: ToolCall },
    /// Execute (or gate) these domain tool calls, in order.
    ToolBatch(Vec<ToolCall>),
    /// The model invented a tool name. Configuration fault.
    UnknownTool { call: ToolCall },
}

impl RouteDecision {
    /// Short label for logs and events.
    pub fn label(&self) -> &'static str {
        match self {
            RouteDecision::Terminal => "terminal",
            RouteDecision::Delegate { .. } => "delegate",
            RouteDecision::Escalate { .. } => "escalate",
            RouteDecision::ToolBatch(_) => "tool_batch",
            RouteDecision::UnknownTool { .. } => "unknown_tool",
        }
    }
}

/// Classify the latest assistant message for the active `agent`.
pub fn classify(agent: &AgentDefinition, registry: &AgentRegistry, msg: &Message) -> RouteDecision {
    let Some(first) = msg.tool_calls.first() else {
        return RouteDecision::Terminal;
    };

    if let Some(call) = msg
        .tool_calls
        .iter()
        .find(|c| c.name == agent.escalation_tool_name)
    {
        return RouteDecision::Escalate { call: call.clone() };
    }

    if let Some(target) = registry.handoff_target(&first.name) {
        return RouteDecision::Delegate {
            target: target.id.clone(),
            call: first.clone(),
        };
    }

    if let Some(call) = msg
        .tool_calls
        .iter()
        .find(|c| !registry.is_known_tool(&c.name))
    {
        return RouteDecision::UnknownTool { call: call.clone() };
    }

    RouteDecision::ToolBatch(msg.tool_calls.clone())
}
