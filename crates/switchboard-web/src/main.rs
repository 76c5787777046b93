//! Serve switchboard conversations over HTTP.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run -p switchboard-web
//! OPENROUTER_KEY=sk-... cargo run -p switchboard-web -- --port 8080 --state-dir /var/lib/switchboard
//! ```
//!
//! ```bash
//! curl -X POST localhost:3001/api/conversations/alice/messages \
//!      -H 'content-type: application/json' -d '{"text": "I want a phone"}'
//! curl -X POST localhost:3001/api/conversations/alice/resume \
//!      -H 'content-type: application/json' -d '{"decision": "approve"}'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use switchboard::demo::{SharedOrders, demo_registry, demo_tools};
use switchboard::prelude::*;
use switchboard_web::{WebBroadcastHandler, WebConfig, WsEvent, spawn_web};
use tracing_subscriber::EnvFilter;

/// HTTP server for switchboard conversations.
#[derive(Parser)]
#[command(about = "Hierarchical multi-agent chat over HTTP")]
struct Args {
    /// LLM model to use.
    #[arg(long, default_value = "openai/gpt-4o-mini")]
    model: String,

    /// Port for the HTTP server.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Directory for conversation checkpoints.
    #[arg(long, default_value = ".switchboard")]
    state_dir: PathBuf,

    /// Agent registry JSON file. Defaults to the built-in shop agents.
    #[arg(long)]
    agents: Option<PathBuf>,

    /// Model calls allowed per turn.
    #[arg(long, default_value_t = 25)]
    max_steps: u32,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("switchboard=info,switchboard_web=info")),
        )
        .init();

    let registry = match &args.agents {
        Some(path) => AgentRegistry::from_json_file(path),
        None => demo_registry(),
    }
    .map_err(|e| e.to_string())?;
    let tools = if args.agents.is_none() {
        demo_tools(SharedOrders::default())
    } else {
        ToolSet::new()
    };
    let model = OpenRouterModel::from_env(&args.model)?;
    let store = FileCheckpointStore::new(&args.state_dir).map_err(|e| e.to_string())?;

    let (events_tx, _) = tokio::sync::broadcast::channel::<WsEvent>(256);
    let events = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(WebBroadcastHandler::new(events_tx.clone()));

    let orchestrator = Orchestrator::new(
        Arc::new(model),
        Arc::new(tools),
        Arc::new(registry),
        Arc::new(store),
    )
    .with_config(OrchestratorConfig::default().with_max_steps_per_turn(args.max_steps))
    .with_event_handler(events);

    let config = WebConfig {
        bind_addr: ([127, 0, 0, 1], args.port).into(),
    };
    let addr = spawn_web(Arc::new(orchestrator), events_tx, config)
        .await
        .map_err(|e| format!("failed to bind: {e}"))?;
    println!("API: http://{addr}/api");
    println!("Events: ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for ctrl-c: {e}"))?;
    Ok(())
}
