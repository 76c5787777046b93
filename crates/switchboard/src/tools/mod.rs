//! Tool abstractions for agent function-calling.
//!
//! Every domain capability (searching a catalog, placing an order) is a
//! [`Tool`] trait implementor. Tools are collected into a [`ToolSet`] which
//! handles dispatch, validation, truncation, timeouts, and panic isolation.
//!
//! Whether a tool runs inline or waits for human approval is not a property
//! of the tool: it is decided per agent by the
//! [`AgentDefinition`](crate::agent::definition::AgentDefinition) safe and
//! sensitive sets.

pub mod core;

pub use core::{
    DEFAULT_MAX_RESULT_CHARS, DEFAULT_TOOL_TIMEOUT, FnTool, Tool, ToolFuture, ToolSet,
    parse_tool_args, truncate_result, validate_tool_arguments,
};
