//! The orchestration loop: the per-turn state machine tying routing,
//! delegation, tool gating, accounting, and checkpointing together.
//!
//! A turn starts with [`Orchestrator::submit`] (a new user message) or
//! [`Orchestrator::resume`] (a human verdict on a pending tool batch). Each
//! step of the turn:
//!
//! 1. Resolves the active agent (stack top, or root).
//! 2. Builds the model input: rendered prompt + trimmed history.
//! 3. Invokes the model with retry. Exhaustion appends an apology and ends
//!    the turn.
//! 4. Charges tokens for the successful invocation and appends the reply.
//! 5. Routes the reply: end the turn, push, pop, run safe tools inline, or
//!    suspend on a sensitive batch.
//! 6. Persists the conversation.
//!
//! Steps for one conversation id are serialized by a per-id async lock;
//! different ids run fully concurrently. Every write carries the next
//! snapshot revision, so a writer in another process that saved the same
//! conversation in the meantime surfaces as [`OrchestratorError::Conflict`]
//! instead of being overwritten.

use super::checkpoint::CheckpointStore;
use super::config::OrchestratorConfig;
use super::definition::{AgentDefinition, AgentId, AgentRegistry};
use super::events::{EventHandler, LoggingHandler, OrchestratorEvent};
use super::handoff::{self, Delegation};
use super::interrupt::{
    ApprovalDecision, BatchClass, InterruptPoint, classify_batch, execute_batch, execute_call,
    interrupted_call_message, rejection_messages,
};
use super::router::{self, RouteDecision};
use super::state::{ConversationSnapshot, ConversationState};
use crate::api::model::ModelInvoker;
use crate::api::pricing::pricing_for_model;
use crate::api::retry::retry_with_backoff;
use crate::context::tokens::TokenAccountant;
use crate::context::trimmer::HistoryTrimmer;
use crate::error::{ModelInvocationError, OrchestratorError};
use crate::tools::ToolSet;
use crate::{Message, MessageRole, ToolCall, ToolDef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

const STEP_LIMIT_MESSAGE: &str = "I wasn't able to finish this request within the allowed \
     number of steps. Please rephrase it or break it into smaller requests.";

// ── Outcome ────────────────────────────────────────────────────────

/// How a turn stopped.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnEnding {
    Terminal,
    AwaitingApproval,
}

/// Result of [`Orchestrator::submit`] or [`Orchestrator::resume`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TurnOutcome {
    pub conversation_id: String,
    /// Messages added to the log during this turn, in order.
    pub appended_messages: Vec<Message>,
    pub ending_state: TurnEnding,
    pub active_agent: AgentId,
    pub dialog_stack: Vec<AgentId>,
    /// Calls awaiting a decision. Empty unless `ending_state` is
    /// [`TurnEnding::AwaitingApproval`].
    pub pending_calls: Vec<ToolCall>,
    pub prompt_token_count: u64,
    pub completion_token_count: u64,
    pub estimated_cost_usd: f64,
}

impl TurnOutcome {
    /// Text of the last assistant message appended this turn, if any.
    pub fn last_reply(&self) -> Option<&str> {
        self.appended_messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant && !m.content.is_empty())
            .map(|m| m.content.as_str())
    }
}

// ── Per-conversation locks ─────────────────────────────────────────

#[derive(Default)]
struct ConversationLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    fn handle(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop locks nobody holds or waits on.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(conversation_id.to_string())
            .or_default()
            .clone()
    }
}

// ── Orchestrator ───────────────────────────────────────────────────

/// The turn entry point. Collaborators are injected already constructed and
/// shared read-only across all conversations.
///
/// ```ignore
/// let orchestrator = Orchestrator::new(model, tools, registry, store)
///     .with_config(OrchestratorConfig::default().with_max_steps_per_turn(10))
///     .with_event_handler(LoggingHandler);
///
/// let outcome = orchestrator.submit("conv-1", "cancel order A-17").await?;
/// ```
pub struct Orchestrator {
    model: Arc<dyn ModelInvoker>,
    tools: Arc<ToolSet>,
    registry: Arc<AgentRegistry>,
    store: Arc<dyn CheckpointStore>,
    config: OrchestratorConfig,
    events: Arc<dyn EventHandler>,
    trimmer: HistoryTrimmer,
    accountant: TokenAccountant,
    locks: ConversationLocks,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ModelInvoker>,
        tools: Arc<ToolSet>,
        registry: Arc<AgentRegistry>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        for name in registry.tool_names() {
            if !tools.contains(&name) {
                warn!("Tool '{name}' is declared by an agent but not registered in the tool set");
            }
        }
        let config = OrchestratorConfig::default();
        Self {
            model,
            tools,
            registry,
            store,
            trimmer: HistoryTrimmer::new(config.history_window),
            accountant: TokenAccountant::new(config.token_costs.clone()),
            config,
            events: Arc::new(LoggingHandler),
            locks: ConversationLocks::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.trimmer = HistoryTrimmer::new(config.history_window);
        self.accountant = TokenAccountant::new(config.token_costs.clone());
        self.config = config;
        self
    }

    /// Replace the default [`LoggingHandler`].
    pub fn with_event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.events = Arc::new(handler);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Append a user message and run the turn to a stable point.
    ///
    /// Fails with [`OrchestratorError::InvalidState`], changing nothing, while
    /// the conversation is awaiting approval.
    pub async fn submit(
        &self,
        conversation_id: &str,
        user_text: &str,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let lock = self.locks.handle(conversation_id);
        let _guard = lock.lock().await;

        let (mut state, mut revision) = self.load(conversation_id).await?;
        if let Some(point) = &state.interrupt {
            return Err(OrchestratorError::invalid_state(
                conversation_id,
                format!(
                    "awaiting approval for {} pending call(s); resume first",
                    point.pending_calls.len()
                ),
            ));
        }

        let start = state.messages.len();
        state.append(Message::human(user_text));
        self.persist(conversation_id, &state, &mut revision).await?;

        let agent = state.active_agent();
        self.events.on_event(&OrchestratorEvent::TurnStarted {
            conversation_id,
            agent: &agent,
        });
        self.run_turn(conversation_id, &mut state, &mut revision, start)
            .await
    }

    /// Apply a human decision to the pending tool batch and continue the turn.
    ///
    /// Fails with [`OrchestratorError::InvalidState`], changing nothing, when
    /// the conversation is not awaiting approval.
    ///
    /// The decision is saved on the interrupt before anything runs. If an
    /// earlier resume saved a decision but did not finish, that decision is
    /// completed and `decision` is ignored. Approved calls that already have
    /// a result are skipped, and a call that was started without a saved
    /// result is answered with an error instead of being run again.
    pub async fn resume(
        &self,
        conversation_id: &str,
        decision: ApprovalDecision,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let lock = self.locks.handle(conversation_id);
        let _guard = lock.lock().await;

        let (mut state, mut revision) = self.load(conversation_id).await?;
        let Some(mut point) = state.interrupt.clone() else {
            return Err(OrchestratorError::invalid_state(
                conversation_id,
                "not awaiting approval",
            ));
        };

        let decision = match point.decision.clone() {
            Some(recorded) => {
                if recorded != decision {
                    warn!(
                        "[{conversation_id}] Finishing the decision recorded by an interrupted \
                         resume; the new decision is ignored"
                    );
                }
                recorded
            }
            None => {
                point.decision = Some(decision.clone());
                state.interrupt = Some(point.clone());
                self.persist(conversation_id, &state, &mut revision).await?;
                decision
            }
        };

        self.events.on_event(&OrchestratorEvent::Resumed {
            conversation_id,
            agent: &point.agent_id,
            approved: decision.is_approved(),
        });

        let start = point
            .pending_calls
            .first()
            .and_then(|call| state.after_call(&call.id))
            .unwrap_or(state.messages.len());
        match &decision {
            ApprovalDecision::Approve => {
                self.run_approved(conversation_id, &mut state, &mut revision, &mut point)
                    .await?;
            }
            ApprovalDecision::Reject { reason } => {
                let each = self.config.reject_each_pending_call;
                for msg in rejection_messages(&point, reason, each) {
                    let answered = msg
                        .tool_call_id
                        .as_deref()
                        .is_some_and(|id| state.has_tool_result(id));
                    if !answered {
                        state.append(msg);
                    }
                }
            }
        }
        state.interrupt = None;
        self.persist(conversation_id, &state, &mut revision).await?;

        self.run_turn(conversation_id, &mut state, &mut revision, start)
            .await
    }

    /// The last persisted snapshot of a conversation.
    pub async fn snapshot(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSnapshot>, OrchestratorError> {
        self.store.get(conversation_id).await
    }

    /// Run the approved batch in order. Each call is marked dispatched, and
    /// that mark saved, before it executes.
    async fn run_approved(
        &self,
        conversation_id: &str,
        state: &mut ConversationState,
        revision: &mut u64,
        point: &mut InterruptPoint,
    ) -> Result<(), OrchestratorError> {
        for call in point.pending_calls.clone() {
            if state.has_tool_result(&call.id) {
                continue;
            }
            if point.was_dispatched(&call.id) {
                warn!(
                    "[{conversation_id}] '{}' ({}) was started before an interruption; \
                     not running it again",
                    call.name, call.id
                );
                state.append(interrupted_call_message(&call));
                continue;
            }
            point.dispatched.push(call.id.clone());
            state.interrupt = Some(point.clone());
            self.persist(conversation_id, state, revision).await?;
            state.append(execute_call(&self.tools, &call, self.events.as_ref()).await);
        }
        Ok(())
    }

    // ── Turn loop ──────────────────────────────────────────────────

    async fn run_turn(
        &self,
        conversation_id: &str,
        state: &mut ConversationState,
        revision: &mut u64,
        start: usize,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let mut steps = 0u32;
        let ending = loop {
            let ending = if steps >= self.config.max_steps_per_turn {
                self.events.on_event(&OrchestratorEvent::StepLimitReached {
                    max_steps: self.config.max_steps_per_turn,
                });
                let agent = state.active_agent();
                state.append(Message::assistant_text(STEP_LIMIT_MESSAGE).with_name(agent.as_str()));
                Some(TurnEnding::Terminal)
            } else {
                steps += 1;
                self.step(conversation_id, state, steps).await?
            };

            self.persist(conversation_id, state, revision).await?;
            if let Some(ending) = ending {
                break ending;
            }
        };

        self.events.on_event(&OrchestratorEvent::TurnFinished {
            conversation_id,
            awaiting_approval: ending == TurnEnding::AwaitingApproval,
            steps,
        });
        Ok(self.outcome(conversation_id, state, start, ending))
    }

    /// One model invocation and the transition it triggers. `None` means the
    /// turn continues.
    async fn step(
        &self,
        conversation_id: &str,
        state: &mut ConversationState,
        step: u32,
    ) -> Result<Option<TurnEnding>, OrchestratorError> {
        let agent_id = state.active_agent();
        let agent = self.registry.resolve(&agent_id)?;

        let window = self.model_input(agent, &state.messages);
        let tools = self.tool_schemas(agent);
        self.events.on_event(&OrchestratorEvent::ModelInvoked {
            agent: &agent_id,
            step,
            message_count: window.len(),
        });

        let mut reply = match self.invoke_model(&window, &tools).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Model invocation failed for {agent_id}: {e}");
                state.append(
                    Message::assistant_text(&self.config.apology_message)
                        .with_name(agent_id.as_str()),
                );
                return Ok(Some(TurnEnding::Terminal));
            }
        };
        reply.role = MessageRole::Assistant;
        reply.id.clear();
        reply.tool_call_id = None;
        reply.name = None;

        let charge = self.accountant.charge(state, &window, &reply);
        self.events.on_event(&OrchestratorEvent::TokenUsage {
            prompt_tokens: charge.prompt_tokens,
            completion_tokens: charge.completion_tokens,
        });

        let decision = router::classify(agent, &self.registry, &reply);
        debug!("{agent_id}: {} ({} call(s))", decision.label(), reply.tool_calls.len());
        state.append(reply.with_name(agent_id.as_str()));

        let ending = match decision {
            RouteDecision::Terminal => Some(TurnEnding::Terminal),
            RouteDecision::Escalate { call } => {
                let now_active = handoff::escalate(state, &call);
                self.events.on_event(&OrchestratorEvent::Escalated {
                    from: &agent_id,
                    to: &now_active,
                });
                None
            }
            RouteDecision::Delegate { target, call } => {
                let target_def = self.registry.resolve(&target)?;
                match handoff::delegate(state, target_def, &call, self.config.max_stack_depth) {
                    Delegation::Pushed { depth } => {
                        self.events.on_event(&OrchestratorEvent::Delegated {
                            from: &agent_id,
                            to: &target,
                            depth,
                        });
                    }
                    Delegation::Refused { max_depth } => {
                        self.events.on_event(&OrchestratorEvent::DelegationRefused {
                            from: &agent_id,
                            to: &target,
                            max_depth,
                        });
                    }
                }
                None
            }
            RouteDecision::UnknownTool { call } => {
                warn!("{agent_id} requested unregistered tool '{}'", call.name);
                state.append(
                    Message::assistant_text(format!(
                        "Configuration error: the assistant requested a tool named '{}', \
                         which is not registered. The request could not be completed.",
                        call.name
                    ))
                    .with_name(agent_id.as_str()),
                );
                Some(TurnEnding::Terminal)
            }
            RouteDecision::ToolBatch(calls) => match classify_batch(agent, &calls) {
                BatchClass::AutoExecute => {
                    for msg in execute_batch(&self.tools, &calls, self.events.as_ref()).await {
                        state.append(msg);
                    }
                    None
                }
                BatchClass::RequiresApproval { gated } => {
                    info!(
                        "[{conversation_id}] {agent_id} batch gated on: {}",
                        gated.join(", ")
                    );
                    let point = InterruptPoint::new(agent_id.clone(), calls);
                    self.events.on_event(&OrchestratorEvent::ApprovalRequired {
                        conversation_id,
                        agent: &agent_id,
                        pending: &point.pending_calls,
                    });
                    state.interrupt = Some(point);
                    Some(TurnEnding::AwaitingApproval)
                }
            },
        };
        Ok(ending)
    }

    fn model_input(&self, agent: &AgentDefinition, log: &[Message]) -> Vec<Message> {
        let mut input = Vec::with_capacity(log.len() + 1);
        input.push(Message::system(agent.render_prompt()));
        input.extend_from_slice(log);
        self.trimmer.window(&input)
    }

    /// Domain tools the agent owns, hand-offs to every other specialist,
    /// and (below root) the escalation tool.
    fn tool_schemas(&self, agent: &AgentDefinition) -> Vec<ToolDef> {
        let mut defs = self.tools.definitions_for(agent.domain_tools());
        defs.extend(
            self.registry
                .delegation_targets(&agent.id)
                .map(handoff::handoff_tool_def),
        );
        if !agent.id.is_root() {
            defs.push(handoff::escalation_tool_def(agent));
        }
        defs
    }

    async fn invoke_model(
        &self,
        window: &[Message],
        tools: &[ToolDef],
    ) -> Result<Message, ModelInvocationError> {
        let events = self.events.clone();
        let max_retries = self.config.retry.max_retries;
        retry_with_backoff(
            &self.config.retry,
            self.config.model_timeout,
            |attempt, delay, err| {
                let error = err.to_string();
                events.on_event(&OrchestratorEvent::ModelRetry {
                    attempt,
                    max_retries,
                    delay_ms: delay.as_millis() as u64,
                    error: &error,
                });
            },
            || self.model.invoke(window, tools),
        )
        .await
    }

    // ── Persistence ────────────────────────────────────────────────

    /// The stored state and its revision (0 for a new conversation).
    async fn load(
        &self,
        conversation_id: &str,
    ) -> Result<(ConversationState, u64), OrchestratorError> {
        let Some(snapshot) = self.store.get(conversation_id).await? else {
            return Ok((ConversationState::default(), 0));
        };
        let mut state = snapshot.state;
        let removed = state
            .dialog_stack
            .truncate_unknown(|id| self.registry.get(id).is_some());
        if let Some(first) = removed.first() {
            warn!(
                "[{conversation_id}] Agent '{first}' is no longer registered; \
                 returning control to {}",
                state.active_agent()
            );
        }
        Ok((state, snapshot.revision))
    }

    /// Save `state` as the next revision. `revision` advances only when the
    /// store accepts the write.
    async fn persist(
        &self,
        conversation_id: &str,
        state: &ConversationState,
        revision: &mut u64,
    ) -> Result<(), OrchestratorError> {
        let next = *revision + 1;
        let snapshot = ConversationSnapshot::new(conversation_id, state.clone()).with_revision(next);
        self.store.put(conversation_id, &snapshot).await?;
        *revision = next;
        self.events.on_event(&OrchestratorEvent::CheckpointSaved {
            conversation_id,
            message_count: state.messages.len(),
        });
        Ok(())
    }

    fn outcome(
        &self,
        conversation_id: &str,
        state: &ConversationState,
        start: usize,
        ending: TurnEnding,
    ) -> TurnOutcome {
        let pricing = pricing_for_model(self.model.model_name());
        TurnOutcome {
            conversation_id: conversation_id.to_string(),
            appended_messages: state.messages.get(start..).unwrap_or_default().to_vec(),
            ending_state: ending,
            active_agent: state.active_agent(),
            dialog_stack: state.dialog_stack.agents().to_vec(),
            pending_calls: state
                .interrupt
                .as_ref()
                .map(|p| p.pending_calls.clone())
                .unwrap_or_default(),
            prompt_token_count: state.prompt_token_count,
            completion_token_count: state.completion_token_count,
            estimated_cost_usd: pricing
                .estimate_cost(state.prompt_token_count, state.completion_token_count),
        }
    }
}
