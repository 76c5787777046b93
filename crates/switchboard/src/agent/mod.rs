//! Orchestration: agents, routing, approval gating, and the turn loop.
//!
//! - [`definition`]: [`AgentDefinition`] and the validated [`AgentRegistry`].
//! - [`stack`]: [`DialogStack`] of active agents with push/pop notices.
//! - [`router`]: classifies each model response into a [`RouteDecision`].
//! - [`handoff`]: delegation and escalation transitions and their pseudo-tools.
//! - [`interrupt`]: batch gating, [`InterruptPoint`], [`ApprovalDecision`].
//! - [`state`]: [`ConversationState`] and the versioned [`ConversationSnapshot`].
//! - [`checkpoint`]: [`CheckpointStore`] backends (memory, JSON files).
//! - [`events`]: [`OrchestratorEvent`] and observer handlers.
//! - [`config`]: [`OrchestratorConfig`] limits and knobs.
//! - [`orchestrator`]: [`Orchestrator`] with `submit` and `resume`.

pub mod checkpoint;
pub mod config;
pub mod definition;
pub mod events;
pub mod handoff;
pub mod interrupt;
pub mod orchestrator;
pub mod router;
pub mod stack;
pub mod state;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::OrchestratorConfig;
pub use definition::{AgentDefinition, AgentId, AgentRegistry};
pub use events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    OrchestratorEvent,
};
pub use interrupt::{ApprovalDecision, InterruptPoint};
pub use orchestrator::{Orchestrator, TurnEnding, TurnOutcome};
pub use router::RouteDecision;
pub use stack::DialogStack;
pub use state::{ConversationPhase, ConversationSnapshot, ConversationState};
