//! REST endpoint handlers.
//!
//! Every conversation operation maps one-to-one onto an
//! [`Orchestrator`] call. Turn outcomes and snapshots are returned as JSON.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use switchboard::agent::{ApprovalDecision, ConversationSnapshot, Orchestrator, TurnOutcome};
use switchboard::OrchestratorError;
use tracing::warn;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

// ── Errors ─────────────────────────────────────────────────────────

/// JSON error body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::InvalidState { .. } | OrchestratorError::Conflict { .. } => {
                StatusCode::CONFLICT
            }
            OrchestratorError::UnknownAgent(_)
            | OrchestratorError::Store(_)
            | OrchestratorError::Config(_) => {
                warn!("Request failed: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Body {
            error: String,
        }
        (self.status, Json(Body { error: self.message })).into_response()
    }
}

// ── Handlers ───────────────────────────────────────────────────────

/// Request body for POST /api/conversations/{id}/messages.
#[derive(Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// POST /api/conversations/{id}/messages — Submit a user message.
///
/// Runs the turn to a stable point and returns the [`TurnOutcome`].
/// 409 while the conversation is awaiting approval.
pub async fn post_message(
    State(app): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let outcome = app.orchestrator.submit(&conversation_id, &body.text).await?;
    Ok(Json(outcome))
}

/// POST /api/conversations/{id}/resume — Approve or reject the pending batch.
///
/// Body: `{"decision": "approve"}` or `{"decision": "reject", "reason": "..."}`.
/// 409 when nothing is pending.
pub async fn post_resume(
    State(app): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(decision): Json<ApprovalDecision>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let outcome = app.orchestrator.resume(&conversation_id, decision).await?;
    Ok(Json(outcome))
}

/// GET /api/conversations/{id} — Latest persisted snapshot. 404 if unknown.
pub async fn get_conversation(
    State(app): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationSnapshot>, ApiError> {
    app.orchestrator
        .snapshot(&conversation_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no conversation '{conversation_id}'")))
}

/// One agent as listed by GET /api/agents.
#[derive(Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub description: String,
    pub handoff_tool: Option<String>,
    pub safe_tools: Vec<String>,
    pub sensitive_tools: Vec<String>,
}

/// GET /api/agents — The registry, for clients that render routing.
pub async fn get_agents(State(app): State<AppState>) -> Json<Vec<AgentSummary>> {
    let agents = app
        .orchestrator
        .registry()
        .agents()
        .iter()
        .map(|a| AgentSummary {
            id: a.id.to_string(),
            description: a.description.clone(),
            handoff_tool: (!a.id.is_root()).then(|| a.handoff_tool_name()),
            safe_tools: a.safe_tools.iter().cloned().collect(),
            sensitive_tools: a.sensitive_tools.iter().cloned().collect(),
        })
        .collect();
    Json(agents)
}

/// GET /api/health
pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
