//! [`ModelInvoker`] backed by the OpenRouter chat completions API.
//!
//! Translates between the engine's [`Message`] log and the OpenAI-compatible
//! wire format: `human` becomes `user`, tool-call arguments travel as JSON
//! strings, and assistant tool calls that never received a result (calls
//! discarded by routing) are stripped so the provider sees a well-formed
//! transcript.

use super::model::ModelInvoker;
use super::retry::is_transient_status;
use crate::error::ModelInvocationError;
use crate::{Message, MessageRole, ToolCall, ToolDef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDef],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

fn no_tools(tools: &&[ToolDef]) -> bool {
    tools.is_empty()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: WireMessage,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

// ── Conversion ─────────────────────────────────────────────────────

fn wire_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::Human => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn to_wire(messages: &[Message]) -> Vec<WireMessage> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    messages
        .iter()
        .map(|m| {
            let calls: Vec<WireToolCall> = m
                .tool_calls
                .iter()
                .filter(|c| answered.contains(c.id.as_str()))
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    call_type: function_type(),
                    function: WireFunction {
                        name: c.name.clone(),
                        arguments: c.args_json(),
                    },
                })
                .collect();
            WireMessage {
                role: wire_role(m.role).to_string(),
                content: Some(m.content.clone()),
                tool_calls: (!calls.is_empty()).then_some(calls),
                tool_call_id: m.tool_call_id.clone(),
            }
        })
        .collect()
}

fn from_wire(msg: WireMessage) -> Message {
    let calls = msg
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| {
            let args = if c.function.arguments.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&c.function.arguments) {
                    Ok(Value::Object(map)) => map,
                    _ => {
                        warn!(
                            "Tool call {} has non-object arguments; passing none",
                            c.function.name
                        );
                        Map::new()
                    }
                }
            };
            ToolCall {
                id: c.id,
                name: c.function.name,
                args,
            }
        })
        .collect();
    Message::assistant_tool_calls(msg.content.unwrap_or_default(), calls)
}

// ── Client ─────────────────────────────────────────────────────────

/// Async client for the OpenRouter chat completions API.
pub struct OpenRouterModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OpenRouterModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("switchboard/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            url: OPENROUTER_URL.to_string(),
            max_tokens: None,
            temperature: None,
        })
    }

    /// Read the key from `OPENROUTER_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self, String> {
        let key = std::env::var("OPENROUTER_KEY")
            .map_err(|_| "OPENROUTER_KEY not set".to_string())?;
        Self::new(key, model)
    }

    /// Point at another OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl ModelInvoker for OpenRouterModel {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolDef],
    ) -> Result<Message, ModelInvocationError> {
        let body = ChatRequest {
            model: &self.model,
            messages: to_wire(messages),
            tools,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        debug!(
            "LLM request: model={}, messages={}, tools={}",
            self.model,
            body.messages.len(),
            tools.len()
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelInvocationError::Timeout(start.elapsed())
                } else {
                    ModelInvocationError::Transient(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ModelInvocationError::Transient(format!("failed to read response: {e}")))?;
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );
        trace!("LLM response body: {text}");

        if !status.is_success() {
            let detail = format!("OpenRouter API HTTP {status}: {text}");
            return Err(if is_transient_status(status.as_u16()) {
                ModelInvocationError::Transient(detail)
            } else {
                ModelInvocationError::Permanent(detail)
            });
        }

        let parsed: RawChatResponse = serde_json::from_str(&text).map_err(|e| {
            ModelInvocationError::Permanent(format!("failed to parse response: {e}"))
        })?;
        if let Some(err) = parsed.error {
            return Err(ModelInvocationError::Transient(format!(
                "OpenRouter API error: {}",
                err.message
            )));
        }

        parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .map(|c| from_wire(c.message))
            .ok_or_else(|| ModelInvocationError::Transient("response had no choices".into()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
