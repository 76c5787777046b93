//! Hand-off (push) and escalation (pop) transitions, and the pseudo-tools
//! the model calls to trigger them.
//!
//! Both transitions are same-turn and synchronous. Neither touches token
//! counters. Each appends exactly one Tool-result notice correlated with the
//! triggering call; any other calls in the same assistant message are
//! discarded without results.

use super::definition::{AgentDefinition, AgentId};
use super::state::ConversationState;
use crate::{Message, ToolCall, ToolDef, json_schema_for};
use schemars::JsonSchema;
use serde::Deserialize;

/// Arguments of a hand-off tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct HandoffArgs {
    /// What the user needs from the specialist, in one or two sentences.
    pub request: String,
}

/// Arguments of the escalation tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct EscalationArgs {
    /// Set when the user's task should be abandoned rather than completed.
    #[serde(default)]
    pub cancel: bool,
    /// Why control is being returned.
    #[serde(default)]
    pub reason: String,
}

pub fn handoff_tool_def(target: &AgentDefinition) -> ToolDef {
    let description = if target.description.is_empty() {
        format!("Transfer the conversation to the {} assistant.", target.id)
    } else {
        format!(
            "Transfer the conversation to the {} assistant. {}",
            target.id, target.description
        )
    };
    ToolDef::new(
        target.handoff_tool_name(),
        description,
        json_schema_for::<HandoffArgs>(),
    )
}

pub fn escalation_tool_def(agent: &AgentDefinition) -> ToolDef {
    ToolDef::new(
        agent.escalation_tool_name.clone(),
        "Mark the current task as completed and/or escalate control of the dialog \
         to the parent assistant, who can re-route based on the user's needs.",
        json_schema_for::<EscalationArgs>(),
    )
}

/// Result of a delegation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delegation {
    Pushed { depth: usize },
    Refused { max_depth: usize },
}

/// Push `target` onto the stack unless that would exceed `max_depth`.
/// A refusal is recorded as an error Tool-result under the hand-off call id.
pub fn delegate(
    state: &mut ConversationState,
    target: &AgentDefinition,
    call: &ToolCall,
    max_depth: usize,
) -> Delegation {
    if state.dialog_stack.depth() >= max_depth {
        state.append(Message::tool_result(
            &call.id,
            format!(
                "Error: cannot transfer to the {} assistant, the maximum delegation depth \
                 ({max_depth}) has been reached. Please fix your mistakes and continue \
                 assisting the user yourself.",
                target.id
            ),
        ));
        return Delegation::Refused { max_depth };
    }
    let notice = state.dialog_stack.push(target, &call.id);
    state.append(notice);
    Delegation::Pushed {
        depth: state.dialog_stack.depth(),
    }
}

/// Pop the stack and record the resumption notice. Returns the agent that
/// is now active.
pub fn escalate(state: &mut ConversationState, call: &ToolCall) -> AgentId {
    let notice = state.dialog_stack.pop(&call.id);
    state.append(notice);
    state.active_agent()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageRole;
    use serde_json::json;

    fn shop() -> AgentDefinition {
        AgentDefinition::new("shop", "Shop").with_description("Buys and cancels orders.")
    }

    #[test]
    fn handoff_def_uses_target_name_and_description() {
        let def = handoff_tool_def(&shop());
        assert_eq!(def.name(), "to_shop");
        assert!(def.function.description.contains("Buys and cancels"));
        assert_eq!(def.function.parameters["type"], "object");
    }

    #[test]
    fn escalation_def_uses_configured_name() {
        let agent = shop().with_escalation_tool("done");
        assert_eq!(escalation_tool_def(&agent).name(), "done");
    }

    #[test]
    fn delegate_pushes_and_appends_notice() {
        let mut state = ConversationState::new();
        let call = ToolCall::new("c1", "to_shop", json!({"request": "buy"}));
        assert_eq!(
            delegate(&mut state, &shop(), &call, 4),
            Delegation::Pushed { depth: 1 }
        );
        assert_eq!(state.active_agent().as_str(), "shop");
        let last = state.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn delegate_refuses_at_depth_bound() {
        let mut state = ConversationState::new();
        let call = ToolCall::new("c1", "to_shop", json!({}));
        delegate(&mut state, &shop(), &call, 1);
        let call2 = ToolCall::new("c2", "to_shop", json!({}));
        assert_eq!(
            delegate(&mut state, &shop(), &call2, 1),
            Delegation::Refused { max_depth: 1 }
        );
        assert_eq!(state.dialog_stack.depth(), 1);
        let last = state.messages.last().unwrap();
        assert!(last.content.starts_with("Error:"));
        assert_eq!(last.tool_call_id.as_deref(), Some("c2"));
    }

    #[test]
    fn escalate_pops_to_parent_without_touching_tokens() {
        let mut state = ConversationState::new();
        state.prompt_token_count = 40;
        delegate(
            &mut state,
            &shop(),
            &ToolCall::new("c1", "to_shop", json!({})),
            4,
        );
        let now = escalate(
            &mut state,
            &ToolCall::new("c2", "complete_or_escalate", json!({})),
        );
        assert!(now.is_root());
        assert_eq!(state.prompt_token_count, 40);
        assert!(state.messages.last().unwrap().content.contains("host assistant"));
    }
}
