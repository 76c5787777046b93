//! Model interaction layer: the invocation seam, the OpenRouter adapter,
//! retry, and pricing.
//!
//! - [`model`]: [`ModelInvoker`] trait, the only way the orchestrator reaches
//!   a model.
//! - [`openrouter`]: [`OpenRouterModel`], OpenAI-compatible HTTP adapter.
//! - [`retry`]: exponential backoff with jitter and per-attempt timeouts.
//!   Permanent failures are never retried.
//! - [`pricing`]: per-model USD rates for turn cost estimates.

pub mod model;
pub mod openrouter;
pub mod pricing;
pub mod retry;

pub use model::ModelInvoker;
pub use openrouter::OpenRouterModel;
pub use pricing::{ModelPricing, pricing_for_model};
pub use retry::{RetryConfig, retry_with_backoff};
