//! Events and observers for the [`Orchestrator`](super::orchestrator::Orchestrator).
//!
//! The orchestrator reports every state transition through
//! [`OrchestratorEvent`] values. Callers implement [`EventHandler`] to observe
//! them for logging, rendering, or metrics. Observation is passive: approval
//! decisions flow through [`Orchestrator::resume`](super::orchestrator::Orchestrator::resume),
//! never through a handler.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use super::definition::AgentId;
use crate::ToolCall;
use tracing::{debug, info, trace, warn};

// ── Events ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum OrchestratorEvent<'a> {
    /// A user message was accepted and a turn is starting.
    TurnStarted {
        conversation_id: &'a str,
        agent: &'a AgentId,
    },
    /// An approval decision was accepted and the turn is continuing.
    Resumed {
        conversation_id: &'a str,
        agent: &'a AgentId,
        approved: bool,
    },
    /// The model for `agent` is being invoked with `message_count` input messages.
    ModelInvoked {
        agent: &'a AgentId,
        step: u32,
        message_count: usize,
    },
    /// A model invocation failed and will be retried after `delay_ms`.
    ModelRetry {
        attempt: u32,
        max_retries: u32,
        delay_ms: u64,
        error: &'a str,
    },
    /// Tokens charged for one successful invocation.
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    Delegated {
        from: &'a AgentId,
        to: &'a AgentId,
        depth: usize,
    },
    /// A hand-off was refused because the stack is at its depth bound.
    DelegationRefused {
        from: &'a AgentId,
        to: &'a AgentId,
        max_depth: usize,
    },
    Escalated {
        from: &'a AgentId,
        to: &'a AgentId,
    },
    ToolExecuting {
        name: &'a str,
        call_id: &'a str,
    },
    ToolResult {
        name: &'a str,
        call_id: &'a str,
        result: &'a str,
        is_error: bool,
    },
    /// A batch contains sensitive calls; the turn is suspending.
    ApprovalRequired {
        conversation_id: &'a str,
        agent: &'a AgentId,
        pending: &'a [ToolCall],
    },
    CheckpointSaved {
        conversation_id: &'a str,
        message_count: usize,
    },
    StepLimitReached {
        max_steps: u32,
    },
    TurnFinished {
        conversation_id: &'a str,
        awaiting_approval: bool,
        steps: u32,
    },
}

// ── Handlers ───────────────────────────────────────────────────────

/// Observer for orchestrator events. The default implementation ignores
/// everything.
///
/// # Example
///
/// ```ignore
/// struct PrintTools;
///
/// impl EventHandler for PrintTools {
///     fn on_event(&self, event: &OrchestratorEvent<'_>) {
///         if let OrchestratorEvent::ToolResult { name, result, .. } = event {
///             println!("[{name}] {result}");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &OrchestratorEvent<'_>) {
        let _ = event;
    }
}

/// A no-op event handler.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&OrchestratorEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&OrchestratorEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&OrchestratorEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &OrchestratorEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches each event to every inner handler, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(my_metrics_handler);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &OrchestratorEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &OrchestratorEvent<'_>) {
        match event {
            OrchestratorEvent::TurnStarted {
                conversation_id,
                agent,
            } => {
                info!("[{conversation_id}] turn started at agent {agent}");
            }
            OrchestratorEvent::Resumed {
                conversation_id,
                agent,
                approved,
            } => {
                let verdict = if *approved { "approved" } else { "rejected" };
                info!("[{conversation_id}] resumed at agent {agent} ({verdict})");
            }
            OrchestratorEvent::ModelInvoked {
                agent,
                step,
                message_count,
            } => {
                debug!("step {step}: invoking model for {agent} with {message_count} message(s)");
            }
            OrchestratorEvent::ModelRetry {
                attempt,
                max_retries,
                delay_ms,
                error,
            } => {
                warn!("Model call failed ({attempt}/{max_retries}), retrying in {delay_ms}ms: {error}");
            }
            OrchestratorEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                debug!("Tokens: prompt={prompt_tokens}, completion={completion_tokens}");
            }
            OrchestratorEvent::Delegated { from, to, depth } => {
                info!("{from} -> {to} (depth {depth})");
            }
            OrchestratorEvent::DelegationRefused {
                from,
                to,
                max_depth,
            } => {
                warn!("{from} tried to delegate to {to} beyond max depth {max_depth}");
            }
            OrchestratorEvent::Escalated { from, to } => {
                info!("{from} escalated back to {to}");
            }
            OrchestratorEvent::ToolExecuting { name, call_id } => {
                debug!("Executing tool: {name} ({call_id})");
            }
            OrchestratorEvent::ToolResult {
                name,
                result,
                is_error,
                ..
            } => {
                if *is_error {
                    warn!("Tool {name} failed: {result}");
                } else {
                    debug!("Tool {name} result: {} bytes", result.len());
                    trace!("Tool {name} result: {result}");
                }
            }
            OrchestratorEvent::ApprovalRequired {
                conversation_id,
                agent,
                pending,
            } => {
                let names: Vec<&str> = pending.iter().map(|c| c.name.as_str()).collect();
                info!(
                    "[{conversation_id}] {agent} awaiting approval for: {}",
                    names.join(", ")
                );
            }
            OrchestratorEvent::CheckpointSaved {
                conversation_id,
                message_count,
            } => {
                trace!("[{conversation_id}] checkpoint saved ({message_count} messages)");
            }
            OrchestratorEvent::StepLimitReached { max_steps } => {
                warn!("Turn hit step limit ({max_steps})");
            }
            OrchestratorEvent::TurnFinished {
                conversation_id,
                awaiting_approval,
                steps,
            } => {
                if *awaiting_approval {
                    info!("[{conversation_id}] turn suspended after {steps} step(s)");
                } else {
                    info!("[{conversation_id}] turn finished after {steps} step(s)");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn composite_dispatches_to_all_handlers() {
        let count = Arc::new(AtomicUsize::new(0));
        let a = count.clone();
        let b = count.clone();
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            }))
            .with(LoggingHandler)
            .with_if(false, NoopHandler)
            .with(FnEventHandler::new(move |_| {
                b.fetch_add(10, Ordering::SeqCst);
            }));

        handler.on_event(&OrchestratorEvent::StepLimitReached { max_steps: 3 });
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn fn_handler_sees_event_fields() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = FnEventHandler::new(move |event| {
            if let OrchestratorEvent::ToolResult { call_id, .. } = event {
                sink.lock().unwrap().push(call_id.to_string());
            }
        });
        handler.on_event(&OrchestratorEvent::ToolResult {
            name: "search",
            call_id: "c7",
            result: "ok",
            is_error: false,
        });
        assert_eq!(*seen.lock().unwrap(), vec!["c7".to_string()]);
    }
}
