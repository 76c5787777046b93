//! Hierarchical conversational orchestration engine.
//!
//! `switchboard` routes a stream of user messages among a root dispatcher and
//! specialized sub-agents. The core abstraction is the
//! [`Orchestrator`](agent::orchestrator::Orchestrator): per turn it asks the
//! active agent's model for a response, classifies that response into a
//! control-flow decision, and either ends the turn, hands control to another
//! agent, returns control to the parent, executes safe tools inline, or
//! suspends until a human approves a side-effecting tool batch.
//!
//! Conversation state is checkpointed after every mutation, so a process can
//! restart while an approval is pending and later call
//! [`Orchestrator::resume()`](agent::orchestrator::Orchestrator::resume)
//! without losing anything.
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use switchboard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = OpenRouterModel::new(std::env::var("OPENROUTER_KEY")?, "openai/gpt-4o-mini")?;
//!     let registry = AgentRegistry::new(vec![
//!         AgentDefinition::new("root", "You are the host assistant. Time: {time}."),
//!         AgentDefinition::new("shop", "You handle purchases.")
//!             .with_safe_tools(["search_products"])
//!             .with_sensitive_tools(["order_purchase"]),
//!     ])?;
//!     let tools = ToolSet::new().with(my_search_tool()).with(my_order_tool());
//!
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(model),
//!         Arc::new(tools),
//!         Arc::new(registry),
//!         Arc::new(MemoryCheckpointStore::new()),
//!     );
//!
//!     let outcome = orchestrator.submit("conv-1", "I want to buy a phone").await?;
//!     if outcome.ending_state == TurnEnding::AwaitingApproval {
//!         orchestrator.resume("conv-1", ApprovalDecision::Approve).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | Agent registry, dialog stack, router, interrupt controller, orchestration loop, checkpoints, events |
//! | [`context`] | Model-input history trimming and token accounting |
//! | [`api`] | Model invocation seam, OpenRouter adapter, retry with backoff, pricing |
//! | [`tools`] | [`Tool`](tools::Tool) trait and [`ToolSet`](tools::ToolSet) dispatch |
//! | [`demo`] | A small shop domain (agents + tools) used by the binaries |
//! | [`testing`] | Scripted model for tests and examples |

pub mod agent;
pub mod api;
pub mod context;
pub mod demo;
pub mod error;
pub mod prelude;
pub mod testing;
pub mod tools;

pub use error::{ModelInvocationError, OrchestratorError};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. Used to describe tool parameters to the model.
///
/// # Example
///
/// ```
/// use switchboard::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct LookupArgs {
///     order_id: String,
/// }
///
/// let schema = json_schema_for::<LookupArgs>();
/// assert_eq!(schema["type"], "object");
/// ```
pub fn json_schema_for<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Author of a message in the conversation log.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Human,
    Assistant,
    Tool,
}

impl MessageRole {
    /// Label used when the role itself is counted as text.
    pub fn label(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::Human => "human",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A tool invocation requested by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    /// Build a call. Non-object `args` values are replaced by an empty map.
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// Arguments serialized as a compact JSON object string.
    pub fn args_json(&self) -> String {
        serde_json::to_string(&self.args).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A message in the conversation log.
///
/// `id` is assigned when the message is appended to a
/// [`ConversationState`](agent::state::ConversationState) and is used for
/// deduplication. Tool results carry the id of the call they answer in
/// `tool_call_id`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            name: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Human, content)
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::with_role(MessageRole::Assistant, content)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::with_role(MessageRole::Tool, content)
        }
    }

    /// Attach a name (builder pattern).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach an explicit id (builder pattern).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ── Tool definitions ───────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool schema offered to the model (OpenAI function-calling shape).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}
