//! Convenience re-exports for common `switchboard` types.
//!
//! ```ignore
//! use switchboard::prelude::*;
//! ```
//!
//! Covers the orchestrator and its collaborators, message constructors,
//! the [`Tool`] trait with [`ToolSet`], and event handlers. Router and
//! trimmer internals stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    Message, MessageRole, ModelInvocationError, OrchestratorError, ToolCall, ToolDef,
    json_schema_for,
};

// ── Orchestration ───────────────────────────────────────────────────
pub use crate::agent::{
    AgentDefinition, AgentId, AgentRegistry, ApprovalDecision, CheckpointStore,
    CompositeEventHandler, ConversationSnapshot, EventHandler, FileCheckpointStore,
    FnEventHandler, LoggingHandler, MemoryCheckpointStore, NoopHandler, Orchestrator,
    OrchestratorConfig, OrchestratorEvent, TurnEnding, TurnOutcome,
};

// ── Models ──────────────────────────────────────────────────────────
pub use crate::api::{ModelInvoker, OpenRouterModel, RetryConfig};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{FnTool, Tool, ToolFuture, ToolSet, parse_tool_args};
