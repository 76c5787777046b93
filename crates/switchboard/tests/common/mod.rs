//! Shared fixtures: a three-agent registry, recording tools, and an
//! orchestrator wired to a scripted model.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use switchboard::agent::{CheckpointStore, ConversationSnapshot};
use switchboard::prelude::*;
use switchboard::testing::ScriptedModel;

pub fn registry() -> AgentRegistry {
    AgentRegistry::new(vec![
        AgentDefinition::new("root", "You are the host."),
        AgentDefinition::new("shop", "You are the shop assistant.")
            .with_description("Searches products and handles orders.")
            .with_safe_tools(["search_products", "check_order_status"])
            .with_sensitive_tools(["order_purchase", "cancel_order"]),
        AgentDefinition::new("billing", "You handle billing questions.")
            .with_description("Refunds and invoices."),
    ])
    .unwrap()
}

/// Tool names in execution order.
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

fn recording_tool(
    name: &'static str,
    log: ExecutionLog,
    result: Result<&'static str, &'static str>,
) -> FnTool {
    FnTool::new(
        ToolDef::new(name, format!("The {name} tool."), json!({"type": "object"})),
        move |_: Value| {
            log.lock().unwrap().push(name.to_string());
            async move { result.map(str::to_string).map_err(str::to_string) }
        },
    )
}

pub fn tools(log: ExecutionLog) -> ToolSet {
    ToolSet::new()
        .with(recording_tool("search_products", log.clone(), Ok("P-100 | Pixel 9 | $799")))
        .with(recording_tool(
            "check_order_status",
            log.clone(),
            Err("order database offline"),
        ))
        .with(recording_tool("order_purchase", log.clone(), Ok("Order A-1 placed.")))
        .with(recording_tool("cancel_order", log, Ok("Order A-1 cancelled.")))
}

pub struct Fixture {
    pub model: Arc<ScriptedModel>,
    pub store: Arc<dyn CheckpointStore>,
    pub executed: ExecutionLog,
    pub orchestrator: Orchestrator,
}

impl Fixture {
    pub fn new(model: ScriptedModel) -> Self {
        Self::with(model, test_config(), Arc::new(MemoryCheckpointStore::new()))
    }

    pub fn with_config(model: ScriptedModel, config: OrchestratorConfig) -> Self {
        Self::with(model, config, Arc::new(MemoryCheckpointStore::new()))
    }

    pub fn with(
        model: ScriptedModel,
        config: OrchestratorConfig,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let model = Arc::new(model);
        let executed = ExecutionLog::default();
        let orchestrator = Orchestrator::new(
            model.clone(),
            Arc::new(tools(executed.clone())),
            Arc::new(registry()),
            store.clone(),
        )
        .with_config(config)
        .with_event_handler(NoopHandler);
        Self {
            model,
            store,
            executed,
            orchestrator,
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub async fn state(&self, conversation_id: &str) -> switchboard::agent::ConversationState {
        self.orchestrator
            .snapshot(conversation_id)
            .await
            .unwrap()
            .expect("conversation exists")
            .state
    }
}

/// A memory store that fails one chosen `put` and then recovers.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryCheckpointStore,
    /// Puts still allowed to succeed before the failure.
    fail_after: Mutex<Option<usize>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `ok_puts` more writes through, then fail the next one.
    pub fn fail_put_after(&self, ok_puts: usize) {
        *self.fail_after.lock().unwrap() = Some(ok_puts);
    }
}

#[async_trait]
impl CheckpointStore for FlakyStore {
    async fn put(
        &self,
        conversation_id: &str,
        snapshot: &ConversationSnapshot,
    ) -> Result<(), OrchestratorError> {
        {
            let mut fail_after = self.fail_after.lock().unwrap();
            match *fail_after {
                Some(0) => {
                    *fail_after = None;
                    return Err(OrchestratorError::Store("disk hiccup".into()));
                }
                Some(n) => *fail_after = Some(n - 1),
                None => {}
            }
        }
        self.inner.put(conversation_id, snapshot).await
    }

    async fn get(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSnapshot>, OrchestratorError> {
        self.inner.get(conversation_id).await
    }
}

/// Default config with retries that never sleep.
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig::default().with_retry(RetryConfig::immediate(2))
}

pub fn call(id: &str, name: &str) -> ToolCall {
    ToolCall::new(id, name, json!({}))
}

pub fn handoff(id: &str, target: &str) -> ToolCall {
    ToolCall::new(id, format!("to_{target}"), json!({"request": "help the user"}))
}

pub fn escalate(id: &str) -> ToolCall {
    ToolCall::new(id, "complete_or_escalate", json!({"reason": "done"}))
}

pub fn names(defs: &[ToolDef]) -> Vec<String> {
    defs.iter().map(|d| d.name().to_string()).collect()
}
