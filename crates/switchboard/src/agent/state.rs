//! Per-conversation state and its persisted snapshot.
//!
//! [`ConversationState`] is owned by exactly one conversation id. The message
//! log is append-only; [`append`](ConversationState::append) assigns stable
//! ids and ignores duplicates. The phase of the orchestration state machine is
//! derived from the stack and the pending interrupt, never stored separately.

use super::definition::AgentId;
use super::interrupt::InterruptPoint;
use super::stack::DialogStack;
use crate::{Message, MessageRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current on-disk snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub dialog_stack: DialogStack,
    pub prompt_token_count: u64,
    pub completion_token_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<InterruptPoint>,
}

/// Where a conversation sits in the orchestration state machine between steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationPhase {
    Root,
    Delegated(AgentId),
    AwaitingApproval(AgentId),
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, assigning the next sequential id if it has none.
    ///
    /// Returns `false` (and changes nothing) when a message with the same id
    /// is already in the log.
    pub fn append(&mut self, mut message: Message) -> bool {
        if message.id.is_empty() {
            message.id = self.next_message_id();
        } else if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    fn next_message_id(&self) -> String {
        let mut n = self.messages.len() + 1;
        loop {
            let id = format!("msg-{n:06}");
            if !self.messages.iter().any(|m| m.id == id) {
                return id;
            }
            n += 1;
        }
    }

    pub fn active_agent(&self) -> AgentId {
        self.dialog_stack.current()
    }

    pub fn phase(&self) -> ConversationPhase {
        if let Some(point) = &self.interrupt {
            return ConversationPhase::AwaitingApproval(point.agent_id.clone());
        }
        if self.dialog_stack.is_empty() {
            ConversationPhase::Root
        } else {
            ConversationPhase::Delegated(self.dialog_stack.current())
        }
    }

    pub fn is_awaiting_approval(&self) -> bool {
        self.interrupt.is_some()
    }

    /// Whether the log already answers `call_id`.
    pub fn has_tool_result(&self, call_id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.role == MessageRole::Tool && m.tool_call_id.as_deref() == Some(call_id))
    }

    /// Index just past the assistant message that issued `call_id`.
    pub(crate) fn after_call(&self, call_id: &str) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|m| m.tool_calls.iter().any(|c| c.id == call_id))
            .map(|i| i + 1)
    }
}

/// Durable, versioned wrapper written to a [`CheckpointStore`](super::checkpoint::CheckpointStore).
///
/// `version` is the file format; `revision` counts writes to this
/// conversation and starts at 1.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationSnapshot {
    pub version: u32,
    #[serde(default)]
    pub revision: u64,
    pub conversation_id: String,
    pub saved_at: DateTime<Utc>,
    pub state: ConversationState,
}

impl ConversationSnapshot {
    pub fn new(conversation_id: impl Into<String>, state: ConversationState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            revision: 1,
            conversation_id: conversation_id.into(),
            saved_at: Utc::now(),
            state,
        }
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }
}
