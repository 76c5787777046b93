//! The model-invocation seam.
//!
//! The orchestrator never talks to a provider directly. It hands an ordered
//! message window and the active agent's tool schemas to a [`ModelInvoker`]
//! and gets back one assistant message. Wire formats live entirely in the
//! adapters ([`OpenRouterModel`](super::openrouter::OpenRouterModel),
//! [`ScriptedModel`](crate::testing::ScriptedModel)).

use crate::error::ModelInvocationError;
use crate::{Message, ToolDef};
use async_trait::async_trait;

#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Produce the next assistant message for `messages`, optionally calling
    /// any of `tools`.
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolDef],
    ) -> Result<Message, ModelInvocationError>;

    /// Model identifier, used for pricing lookups and logs.
    fn model_name(&self) -> &str;
}
