//! Configuration for the [`Orchestrator`](super::orchestrator::Orchestrator).
//!
//! ```ignore
//! let config = OrchestratorConfig::default()
//!     .with_max_steps_per_turn(10)
//!     .with_history_window(30)
//!     .with_retry(RetryConfig::with_retries(5));
//! ```

use crate::api::retry::RetryConfig;
use crate::context::tokens::TokenCostModel;
use crate::context::trimmer::DEFAULT_HISTORY_WINDOW;
use std::time::Duration;

pub const DEFAULT_MAX_STEPS_PER_TURN: u32 = 25;
pub const DEFAULT_MAX_STACK_DEPTH: usize = 8;
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_APOLOGY: &str = "Sorry, I'm having trouble reaching the assistant service \
     right now. Please try again in a moment.";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model invocations allowed in one turn before it is forced to end.
    pub max_steps_per_turn: u32,
    /// Deepest allowed dialog stack. Hand-offs beyond it are refused.
    pub max_stack_depth: usize,
    /// Non-system messages sent to the model per invocation.
    pub history_window: usize,
    pub retry: RetryConfig,
    /// Bounded wait for each model attempt.
    pub model_timeout: Duration,
    pub token_costs: TokenCostModel,
    /// Answer every pending call on rejection instead of only the first.
    pub reject_each_pending_call: bool,
    /// Assistant message appended when the model cannot be reached.
    pub apology_message: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps_per_turn: DEFAULT_MAX_STEPS_PER_TURN,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            history_window: DEFAULT_HISTORY_WINDOW,
            retry: RetryConfig::default(),
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            token_costs: TokenCostModel::default(),
            reject_each_pending_call: false,
            apology_message: DEFAULT_APOLOGY.to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// A zero step cap is treated as one.
    pub fn with_max_steps_per_turn(mut self, steps: u32) -> Self {
        self.max_steps_per_turn = steps.max(1);
        self
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    pub fn with_history_window(mut self, messages: usize) -> Self {
        self.history_window = messages;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_token_costs(mut self, costs: TokenCostModel) -> Self {
        self.token_costs = costs;
        self
    }

    pub fn with_reject_each_pending_call(mut self, each: bool) -> Self {
        self.reject_each_pending_call = each;
        self
    }

    pub fn with_apology_message(mut self, message: impl Into<String>) -> Self {
        self.apology_message = message.into();
        self
    }
}
