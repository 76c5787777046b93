//! Agent definitions and the static agent registry.
//!
//! An [`AgentDefinition`] names an agent, its prompt template, and the tools
//! it may call, partitioned into `safe_tools` (executed inline) and
//! `sensitive_tools` (gated behind human approval). The [`AgentRegistry`] is
//! built once at startup, validated, and then shared read-only by every
//! conversation.
//!
//! # Loading from JSON
//!
//! ```json
//! {
//!   "agents": [
//!     { "id": "root", "prompt": "You are the host assistant. Time: {time}." },
//!     {
//!       "id": "shop",
//!       "prompt": "You handle purchases.",
//!       "description": "Buys, tracks, and cancels orders.",
//!       "safe_tools": ["search_products"],
//!       "sensitive_tools": ["order_purchase", "cancel_order"]
//!     }
//!   ]
//! }
//! ```

use crate::error::OrchestratorError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Default name of the tool an agent calls to return control to its parent.
pub const DEFAULT_ESCALATION_TOOL: &str = "complete_or_escalate";

/// Identifier of the root dispatcher agent.
pub const ROOT_AGENT_ID: &str = "root";

// ── AgentId ────────────────────────────────────────────────────────

/// Identifier of an agent in the registry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The root sentinel, active whenever the dialog stack is empty.
    pub fn root() -> Self {
        Self(ROOT_AGENT_ID.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_AGENT_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ── AgentDefinition ────────────────────────────────────────────────

fn default_escalation_tool() -> String {
    DEFAULT_ESCALATION_TOOL.to_string()
}

/// Static description of one agent.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AgentDefinition {
    pub id: AgentId,
    /// Prompt template. `{time}` and `{agent}` are expanded on every model call.
    pub prompt: String,
    /// One-line summary shown to other agents in the hand-off tool description.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub safe_tools: BTreeSet<String>,
    #[serde(default)]
    pub sensitive_tools: BTreeSet<String>,
    #[serde(default = "default_escalation_tool")]
    pub escalation_tool_name: String,
    /// Name of the tool other agents call to delegate to this one.
    /// Defaults to `to_{id}`.
    #[serde(default)]
    pub handoff_tool: Option<String>,
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(id),
            prompt: prompt.into(),
            description: String::new(),
            safe_tools: BTreeSet::new(),
            sensitive_tools: BTreeSet::new(),
            escalation_tool_name: default_escalation_tool(),
            handoff_tool: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_safe_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.safe_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn with_sensitive_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn with_escalation_tool(mut self, name: impl Into<String>) -> Self {
        self.escalation_tool_name = name.into();
        self
    }

    pub fn with_handoff_tool(mut self, name: impl Into<String>) -> Self {
        self.handoff_tool = Some(name.into());
        self
    }

    /// The tool name other agents use to delegate to this agent.
    pub fn handoff_tool_name(&self) -> String {
        self.handoff_tool
            .clone()
            .unwrap_or_else(|| format!("to_{}", self.id))
    }

    pub fn is_safe(&self, tool_name: &str) -> bool {
        self.safe_tools.contains(tool_name)
    }

    /// Names of every domain tool this agent may call (safe and sensitive).
    pub fn domain_tools(&self) -> impl Iterator<Item = &String> {
        self.safe_tools.iter().chain(self.sensitive_tools.iter())
    }

    /// Expand `{time}` and `{agent}` in the prompt template.
    pub fn render_prompt(&self) -> String {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.prompt
            .replace("{time}", &now)
            .replace("{agent}", self.id.as_str())
    }
}

// ── AgentRegistry ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct RegistryFile {
    agents: Vec<AgentDefinition>,
}

/// Validated, immutable set of agents. Exactly one agent has the id
/// [`ROOT_AGENT_ID`].
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<AgentDefinition>,
    by_id: HashMap<AgentId, usize>,
    by_handoff: HashMap<String, AgentId>,
    known_tools: HashSet<String>,
}

impl AgentRegistry {
    /// Build and validate a registry.
    pub fn new(agents: Vec<AgentDefinition>) -> Result<Self, OrchestratorError> {
        let mut by_id = HashMap::new();
        let mut by_handoff = HashMap::new();
        let mut known_tools = HashSet::new();

        for (idx, agent) in agents.iter().enumerate() {
            if agent.id.as_str().is_empty() {
                return Err(OrchestratorError::Config("agent id must not be empty".into()));
            }
            if by_id.insert(agent.id.clone(), idx).is_some() {
                return Err(OrchestratorError::Config(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
            if let Some(overlap) = agent.safe_tools.intersection(&agent.sensitive_tools).next() {
                return Err(OrchestratorError::Config(format!(
                    "agent '{}' lists tool '{overlap}' as both safe and sensitive",
                    agent.id
                )));
            }
            // Root is the stack bottom; nothing delegates to it.
            if !agent.id.is_root() {
                let handoff = agent.handoff_tool_name();
                if let Some(other) = by_handoff.insert(handoff.clone(), agent.id.clone()) {
                    return Err(OrchestratorError::Config(format!(
                        "hand-off tool '{handoff}' is claimed by both '{other}' and '{}'",
                        agent.id
                    )));
                }
            }
            known_tools.extend(agent.domain_tools().cloned());
            known_tools.insert(agent.escalation_tool_name.clone());
        }

        if !by_id.contains_key(&AgentId::root()) {
            return Err(OrchestratorError::Config(format!(
                "registry has no '{ROOT_AGENT_ID}' agent"
            )));
        }

        // A domain tool must not shadow a hand-off name, otherwise routing is ambiguous.
        if let Some(clash) = by_handoff.keys().find(|h| known_tools.contains(*h)) {
            return Err(OrchestratorError::Config(format!(
                "hand-off tool '{clash}' collides with a domain or escalation tool"
            )));
        }
        known_tools.extend(by_handoff.keys().cloned());

        Ok(Self {
            agents,
            by_id,
            by_handoff,
            known_tools,
        })
    }

    /// Parse a registry from a JSON document of the form `{"agents": [...]}`.
    pub fn from_json_str(json: &str) -> Result<Self, OrchestratorError> {
        let file: RegistryFile = serde_json::from_str(json)
            .map_err(|e| OrchestratorError::Config(format!("invalid agent registry JSON: {e}")))?;
        Self::new(file.agents)
    }

    /// Load a registry from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn root(&self) -> &AgentDefinition {
        // Presence of root is checked in `new`.
        &self.agents[self.by_id[&AgentId::root()]]
    }

    pub fn get(&self, id: &AgentId) -> Option<&AgentDefinition> {
        self.by_id.get(id).map(|&idx| &self.agents[idx])
    }

    /// Like [`get`](Self::get), but a miss is an [`OrchestratorError::UnknownAgent`].
    pub fn resolve(&self, id: &AgentId) -> Result<&AgentDefinition, OrchestratorError> {
        self.get(id)
            .ok_or_else(|| OrchestratorError::UnknownAgent(id.clone()))
    }

    /// The agent a hand-off tool name delegates to, if any.
    pub fn handoff_target(&self, tool_name: &str) -> Option<&AgentDefinition> {
        self.by_handoff.get(tool_name).and_then(|id| self.get(id))
    }

    /// Agents that `from` may delegate to: every non-root agent except itself.
    pub fn delegation_targets<'a>(
        &'a self,
        from: &'a AgentId,
    ) -> impl Iterator<Item = &'a AgentDefinition> + 'a {
        self.agents
            .iter()
            .filter(move |a| !a.id.is_root() && &a.id != from)
    }

    /// Whether any agent in the registry declares this tool name.
    pub fn is_known_tool(&self, tool_name: &str) -> bool {
        self.known_tools.contains(tool_name)
    }

    pub fn agents(&self) -> &[AgentDefinition] {
        &self.agents
    }

    /// Every domain tool name referenced by some agent, sorted.
    pub fn tool_names(&self) -> BTreeSet<String> {
        self.agents
            .iter()
            .flat_map(|a| a.domain_tools().cloned())
            .collect()
    }
}
