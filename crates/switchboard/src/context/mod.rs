//! Model-input context: history trimming and token accounting.
//!
//! - [`trimmer`]: [`HistoryTrimmer`] builds the bounded, boundary-correct
//!   message window sent to the model.
//! - [`tokens`]: [`TokenCostModel`] estimates per-invocation cost and
//!   [`TokenAccountant`] folds it into the conversation counters.

pub mod tokens;
pub mod trimmer;

pub use tokens::{Charge, DEFAULT_CHARS_PER_TOKEN, TokenAccountant, TokenCostModel};
pub use trimmer::{DEFAULT_HISTORY_WINDOW, HistoryTrimmer};
