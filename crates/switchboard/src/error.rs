//! Error types for the orchestration engine.
//!
//! Two families: [`OrchestratorError`] is returned to callers of the turn
//! entry points; [`ModelInvocationError`] is produced by the model-invocation
//! seam and drives retry decisions. Tool failures are not errors at this
//! level: they become Tool-result messages in the log.

use crate::agent::definition::AgentId;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`Orchestrator`](crate::agent::orchestrator::Orchestrator)
/// operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The operation is not valid in the conversation's current phase.
    /// No state was changed.
    #[error("conversation '{conversation_id}' is in an invalid state: {reason}")]
    InvalidState {
        conversation_id: String,
        reason: String,
    },

    /// An agent id the registry does not know. Persisted stacks that name a
    /// removed agent are cut back to their deepest known ancestor on load, so
    /// this only surfaces for registry lookups made outside a turn.
    #[error("unknown agent '{0}'")]
    UnknownAgent(AgentId),

    /// The checkpoint backend failed to read or write a snapshot.
    #[error("checkpoint store error: {0}")]
    Store(String),

    /// Another writer saved this conversation since it was loaded. The
    /// write was discarded.
    #[error(
        "conversation '{conversation_id}' was modified concurrently \
         (expected revision {expected}, found {found})"
    )]
    Conflict {
        conversation_id: String,
        expected: u64,
        found: u64,
    },

    /// Invalid agent registry or configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl OrchestratorError {
    pub(crate) fn invalid_state(conversation_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            conversation_id: conversation_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure of a single model invocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelInvocationError {
    /// The invocation exceeded its bounded wait.
    #[error("model invocation timed out after {0:?}")]
    Timeout(Duration),

    /// Rate limits, 5xx responses, dropped connections.
    #[error("transient model failure: {0}")]
    Transient(String),

    /// Bad requests, auth failures, unparseable responses.
    #[error("permanent model failure: {0}")]
    Permanent(String),
}

impl ModelInvocationError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }
}
