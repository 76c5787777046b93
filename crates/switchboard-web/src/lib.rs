//! HTTP surface for switchboard conversations.
//!
//! `switchboard-web` exposes an [`Orchestrator`] over a small REST API and
//! streams orchestrator events to WebSocket clients.
//!
//! # Quick start
//!
//! ```ignore
//! use switchboard_web::{WebBroadcastHandler, WebConfig, spawn_web};
//!
//! let (events_tx, _) = tokio::sync::broadcast::channel(256);
//! let orchestrator = Arc::new(
//!     Orchestrator::new(model, tools, registry, store)
//!         .with_event_handler(WebBroadcastHandler::new(events_tx.clone())),
//! );
//! let addr = spawn_web(orchestrator, events_tx, WebConfig::default()).await?;
//! println!("API: http://{addr}/api");
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `POST` | `/api/conversations/{id}/messages` | `{"text": "..."}` | turn outcome, 409 while awaiting approval |
//! | `POST` | `/api/conversations/{id}/resume` | `{"decision": "approve"}` or `{"decision": "reject", "reason": "..."}` | turn outcome, 409 if nothing is pending |
//! | `GET` | `/api/conversations/{id}` | | snapshot, 404 if unknown |
//! | `GET` | `/api/agents` | | registry summary |
//! | `GET` | `/ws` | | WebSocket event stream |

mod api;
pub mod broadcast;
mod server;
mod ws;

pub use broadcast::{WebBroadcastHandler, WsEvent};
pub use server::build_router;

use std::net::SocketAddr;
use std::sync::Arc;

use switchboard::agent::Orchestrator;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// Pass the same `events_tx` to a [`WebBroadcastHandler`] on the
/// orchestrator so WebSocket clients see its events. The server runs until
/// the Tokio runtime shuts down.
pub async fn spawn_web(
    orchestrator: Arc<Orchestrator>,
    events_tx: tokio::sync::broadcast::Sender<WsEvent>,
    config: WebConfig,
) -> std::io::Result<SocketAddr> {
    let router = server::build_router(orchestrator, events_tx);
    server::start_server(router, config.bind_addr).await
}
