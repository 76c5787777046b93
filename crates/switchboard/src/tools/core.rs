//! Tool abstraction for agent function-calling.
//!
//! The [`Tool`] trait defines the interface every domain tool implements: a
//! static API definition (name, description, JSON schema) and an async
//! `execute` method. Tools are collected into a [`ToolSet`] which handles
//! dispatch, argument validation, timeouts, panic isolation, and result
//! truncation.
//!
//! Tool failures are reported as `Err(String)`. They never abort a turn: the
//! orchestrator turns them into error-bearing Tool-result messages.

use crate::ToolDef;
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Maximum size (in characters) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_CHARS: usize = 30_000;

/// Default timeout for tool execution (60 seconds).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool that an agent can invoke via function-calling.
///
/// # Example
///
/// ```ignore
/// struct CheckOrder { orders: Arc<OrderBook> }
///
/// impl Tool for CheckOrder {
///     fn definition(&self) -> ToolDef { /* ... */ }
///
///     fn execute(&self, arguments: &str) -> ToolFuture<'_> {
///         let arguments = arguments.to_string();
///         Box::pin(async move {
///             let args: CheckArgs = parse_tool_args(&arguments)?;
///             self.orders.status(&args.order_id)
///         })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition offered to the model.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    ///
    /// Uses a boxed future so that the trait is dyn-compatible.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    fn name(&self) -> String {
        self.definition().function.name.clone()
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// A collection of tools dispatched by name.
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with(search_products_tool(catalog.clone()))
///     .with(order_purchase_tool(orders.clone()))
///     .with_arg_validation(true)
///     .with_default_timeout(Some(Duration::from_secs(30)));
/// ```
pub struct ToolSet {
    tools: HashMap<String, Box<dyn Tool>>,
    max_result_chars: usize,
    /// Whether to validate tool arguments against JSON Schema before execution.
    validate_args: bool,
    /// `None` disables timeouts.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("max_result_chars", &self.max_result_chars)
            .finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            max_result_chars: DEFAULT_MAX_RESULT_CHARS,
            validate_args: false,
            default_timeout: Some(DEFAULT_TOOL_TIMEOUT),
        }
    }

    pub fn with_max_result_chars(mut self, max: usize) -> Self {
        self.max_result_chars = max;
        self
    }

    /// Enable JSON Schema argument validation before tool execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions for the named tools, in the order given. Names with no
    /// registered tool are skipped.
    pub fn definitions_for<'a, I>(&self, names: I) -> Vec<ToolDef>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter_map(|name| self.tools.get(name).map(|t| t.definition()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call by name.
    ///
    /// Unknown names, invalid arguments, timeouts, tool errors and tool
    /// panics all come back as `Err` with a message the model can read.
    /// Successful output is truncated to the configured size.
    pub async fn execute(&self, name: &str, arguments: &str) -> Result<String, String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| format!("unknown tool '{name}'"))?;

        if self.validate_args {
            validate_tool_arguments(tool.as_ref(), arguments)?;
        }

        log_tool_call(name, arguments);
        let start = Instant::now();

        let guarded = AssertUnwindSafe(tool.execute(arguments)).catch_unwind();
        let outcome = match self.default_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(r) => r,
                Err(_) => {
                    info!(
                        "Tool {name} timed out after {:.1}s",
                        start.elapsed().as_secs_f64()
                    );
                    return Err(format!(
                        "tool '{name}' timed out after {:.0} seconds",
                        limit.as_secs_f64()
                    ));
                }
            },
            None => guarded.await,
        };

        let result = match outcome {
            Ok(r) => r,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("Tool {name} panicked: {detail}");
                return Err(format!("tool '{name}' crashed: {detail}"));
            }
        };

        debug!(
            "Tool {name} completed in {:.0}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        if let Ok(text) = &result {
            let preview: String = text.chars().take(300).collect();
            trace!("Tool {name} result preview: {preview}");
        }

        result.map(|text| truncate_result(text, self.max_result_chars))
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

// ── FnTool ────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler = Box<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>> + Send + Sync,
>;

/// A closure-based tool that auto-parses arguments and delegates to a handler.
///
/// Use [`FnTool`] for tools whose state can be captured by a cloned `Arc`.
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct SearchArgs {
///     /// Free-text product query.
///     query: String,
/// }
///
/// let tool = FnTool::new(
///     ToolDef::new("search_products", "Search the catalog", json_schema_for::<SearchArgs>()),
///     move |args: SearchArgs| {
///         let catalog = catalog.clone();
///         async move { Ok(catalog.search(&args.query)) }
///     },
/// );
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    /// The handler receives arguments of type `A`, deserialized from the raw
    /// JSON string. Parse failures are reported as tool errors.
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let erased = move |raw: String| -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>> {
            match parse_tool_args::<A>(&raw) {
                Ok(args) => Box::pin(handler(args)),
                Err(e) => Box::pin(async move { Err(e) }),
            }
        };

        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        (self.handler)(arguments.to_string())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate tool arguments against the tool's declared JSON Schema.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Result<(), String> {
    let args_value: serde_json::Value = serde_json::from_str(arguments)
        .map_err(|e| format!("invalid JSON arguments for tool '{}': {e}", tool.name()))?;

    let schema = tool.definition().function.parameters;

    // An invalid schema is the tool author's problem, not the model's.
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return Ok(());
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "argument validation failed for tool '{}':\n{}",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {arguments}");
}

/// Truncate a string to at most `max` characters, appending a notice if trimmed.
pub fn truncate_result(s: String, max: usize) -> String {
    let total = s.chars().count();
    if total > max {
        let head: String = s.chars().take(max).collect();
        format!("{head}...\n[truncated: {total} chars total]")
    } else {
        s
    }
}

/// Parse raw JSON arguments into a typed struct.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, String> {
    serde_json::from_str(arguments).map_err(|e| format!("invalid tool arguments: {e}"))
}
