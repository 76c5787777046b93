//! Token accounting: estimate the cost of each model invocation and
//! accumulate it into the conversation's counters.
//!
//! Costs are estimated from character counts, the same way the context
//! budget estimator works, so accounting is deterministic and independent of
//! any provider's tokenizer. Every invocation is charged exactly once, and
//! only when it returns a usable response.

use crate::Message;
use crate::agent::state::ConversationState;

/// Default characters per token (conservative estimate for English text).
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Parameters of the cost estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenCostModel {
    /// Fixed cost of every invocation (reply priming).
    pub base_per_call: u64,
    /// Framing overhead of each message.
    pub per_message: u64,
    /// Extra overhead when a message carries a `name`.
    pub per_name: u64,
    pub chars_per_token: f64,
}

impl Default for TokenCostModel {
    fn default() -> Self {
        Self {
            base_per_call: 3,
            per_message: 3,
            per_name: 1,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenCostModel {
    /// Estimated tokens for a piece of text. Empty text costs nothing.
    pub fn text_tokens(&self, text: &str) -> u64 {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        let cpt = if self.chars_per_token > 0.0 {
            self.chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        (chars as f64 / cpt).ceil() as u64
    }

    /// Cost of one message: framing, content, role label, optional name, and
    /// any tool calls it carries.
    pub fn message_tokens(&self, msg: &Message) -> u64 {
        let mut total = self.per_message
            + self.text_tokens(&msg.content)
            + self.text_tokens(msg.role.label());
        if let Some(name) = &msg.name {
            total += self.per_name + self.text_tokens(name);
        }
        for call in &msg.tool_calls {
            total += self.text_tokens(&call.name) + self.text_tokens(&call.args_json());
        }
        total
    }

    /// Cost of an outbound (trimmed) message set.
    pub fn prompt_cost(&self, messages: &[Message]) -> u64 {
        self.base_per_call
            + messages
                .iter()
                .map(|m| self.message_tokens(m))
                .sum::<u64>()
    }

    /// Cost of the single returned message.
    pub fn completion_cost(&self, reply: &Message) -> u64 {
        self.message_tokens(reply)
    }
}

/// Applies a [`TokenCostModel`] to a conversation's counters.
#[derive(Debug, Clone, Default)]
pub struct TokenAccountant {
    model: TokenCostModel,
}

/// What one successful invocation was charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charge {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenAccountant {
    pub fn new(model: TokenCostModel) -> Self {
        Self { model }
    }

    pub fn cost_model(&self) -> &TokenCostModel {
        &self.model
    }

    /// Charge one successful invocation: `sent` is the exact model input,
    /// `reply` the message it returned. Counters only grow.
    pub fn charge(&self, state: &mut ConversationState, sent: &[Message], reply: &Message) -> Charge {
        let charge = Charge {
            prompt_tokens: self.model.prompt_cost(sent),
            completion_tokens: self.model.completion_cost(reply),
        };
        state.prompt_token_count = state.prompt_token_count.saturating_add(charge.prompt_tokens);
        state.completion_token_count = state
            .completion_token_count
            .saturating_add(charge.completion_tokens);
        charge
    }
}
