//! A deterministic [`ModelInvoker`] for tests and offline demos.
//!
//! [`ScriptedModel`] replays a queue of canned replies (or failures) in order
//! and records every request it receives, so tests can assert on exactly what
//! the orchestrator sent: the trimmed window, the system prompt, and the tool
//! schemas offered to the active agent.
//!
//! ```ignore
//! let model = ScriptedModel::new()
//!     .reply_tool_calls(vec![ToolCall::new("c1", "to_shop", json!({"request": "buy"}))])
//!     .reply_text("Which phone would you like?");
//! ```

use crate::api::model::ModelInvoker;
use crate::error::ModelInvocationError;
use crate::{Message, ToolCall, ToolDef};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// One recorded invocation: the message window and the offered tools.
pub type RecordedRequest = (Vec<Message>, Vec<ToolDef>);

#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Message, ModelInvocationError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain-text assistant reply.
    pub fn reply_text(self, text: impl Into<String>) -> Self {
        self.push(Ok(Message::assistant_text(text)))
    }

    /// Queue an assistant reply that requests `calls`.
    pub fn reply_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(Ok(Message::assistant_tool_calls("", calls)))
    }

    /// Queue a failed invocation.
    pub fn fail(self, error: ModelInvocationError) -> Self {
        self.push(Err(error))
    }

    /// Sleep before answering each invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, reply: Result<Message, ModelInvocationError>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedModel {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolDef],
    ) -> Result<Message, ModelInvocationError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((messages.to_vec(), tools.to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(ModelInvocationError::Permanent(
                    "scripted model has no replies left".into(),
                ))
            })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replays_in_order_and_records_requests() {
        let model = ScriptedModel::new()
            .reply_tool_calls(vec![ToolCall::new("c1", "to_shop", json!({}))])
            .reply_text("done");

        let first = model.invoke(&[Message::human("hi")], &[]).await.unwrap();
        assert_eq!(first.tool_calls[0].name, "to_shop");
        let second = model.invoke(&[], &[]).await.unwrap();
        assert_eq!(second.content, "done");

        assert_eq!(model.invocation_count(), 2);
        assert_eq!(model.requests()[0].0[0].content, "hi");
        assert_eq!(model.remaining(), 0);
    }

    #[tokio::test]
    async fn exhausted_script_fails_permanently() {
        let model = ScriptedModel::new();
        let err = model.invoke(&[], &[]).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
