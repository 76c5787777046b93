//! The dialog stack: a LIFO of agents that currently hold the conversation.
//!
//! The top of the stack is the active agent. An empty stack means the root
//! dispatcher is active. [`DialogStack::push`] and [`DialogStack::pop`] are
//! the only mutators, and each returns the notice message that records the
//! transition in the conversation log.

use super::definition::{AgentDefinition, AgentId};
use crate::Message;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct DialogStack(Vec<AgentId>);

impl DialogStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active agent: the stack top, or root when empty.
    pub fn current(&self) -> AgentId {
        self.0.last().cloned().unwrap_or_else(AgentId::root)
    }

    /// The agent that becomes active after a pop.
    pub fn parent(&self) -> AgentId {
        match self.0.len() {
            0 | 1 => AgentId::root(),
            n => self.0[n - 2].clone(),
        }
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn agents(&self) -> &[AgentId] {
        &self.0
    }

    /// Make `agent` active. Returns the hand-off notice, correlated with the
    /// delegating tool call.
    pub fn push(&mut self, agent: &AgentDefinition, call_id: &str) -> Message {
        self.0.push(agent.id.clone());
        Message::tool_result(call_id, handoff_notice(agent))
    }

    /// Return control to the parent. Popping an empty stack changes nothing
    /// but still yields a notice addressed to root.
    pub fn pop(&mut self, call_id: &str) -> Message {
        self.0.pop();
        Message::tool_result(call_id, resumption_notice(&self.current()))
    }

    /// Cut the stack at the first agent `known` rejects, so control falls
    /// back to the deepest known ancestor. Returns the removed agents.
    pub fn truncate_unknown(&mut self, known: impl Fn(&AgentId) -> bool) -> Vec<AgentId> {
        match self.0.iter().position(|id| !known(id)) {
            Some(at) => self.0.split_off(at),
            None => Vec::new(),
        }
    }
}

fn handoff_notice(agent: &AgentDefinition) -> String {
    format!(
        "The assistant is now the {id} assistant. Reflect on the above conversation \
         between the host assistant and the user. The user's intent is unsatisfied. \
         Use the provided tools to assist the user. Remember, you are the {id} assistant, \
         and an action is not complete until the appropriate tool has been invoked \
         successfully. If the user changes their mind or needs help with other tasks, \
         call {escalation} to let the host assistant take control.",
        id = agent.id,
        escalation = agent.escalation_tool_name,
    )
}

fn resumption_notice(now_active: &AgentId) -> String {
    let who = if now_active.is_root() {
        "host".to_string()
    } else {
        now_active.to_string()
    };
    format!(
        "Resuming dialog with the {who} assistant. Please reflect on the past \
         conversation and assist the user as needed."
    )
}
