//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use switchboard::agent::Orchestrator;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::api::{self, AppState};
use crate::broadcast::WsEvent;
use crate::ws::{self, WsState};

/// Build the full axum router.
///
/// - WebSocket event stream at `/ws`
/// - REST API at `/api/*`
pub fn build_router(
    orchestrator: Arc<Orchestrator>,
    broadcast_tx: broadcast::Sender<WsEvent>,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .with_state(WsState { broadcast_tx });

    let api_routes = Router::new()
        .route("/api/health", get(api::health))
        .route("/api/agents", get(api::get_agents))
        .route("/api/conversations/{id}", get(api::get_conversation))
        .route("/api/conversations/{id}/messages", post(api::post_message))
        .route("/api/conversations/{id}/resume", post(api::post_resume))
        .with_state(AppState { orchestrator });

    Router::new().merge(ws_routes).merge(api_routes).layer(cors)
}

/// Bind `bind_addr`, serve `router` on a background task, and return the
/// bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Web server stopped: {e}");
        }
    });

    Ok(addr)
}
