//! Drive switchboard conversations from a terminal.
//!
//! Conversations are checkpointed under `--state-dir`, so a chat can be
//! interrupted while a tool batch awaits approval and picked up again later
//! (even from another process) with `resume`.
//!
//! # Examples
//!
//! ```sh
//! # Interactive chat with the built-in shop agents
//! OPENROUTER_KEY=sk-... switchboard chat --conversation alice
//!
//! # One message, then exit
//! switchboard send alice "Cancel order A-1"
//!
//! # Approve or reject a pending batch
//! switchboard resume alice --approve
//! switchboard resume alice --reject "wrong order"
//!
//! # Inspect the persisted conversation
//! switchboard show alice
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use switchboard::agent::OrchestratorEvent;
use switchboard::demo::{SharedOrders, demo_registry, demo_tools};
use switchboard::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Hierarchical multi-agent chat with approval-gated tools.
#[derive(Parser)]
#[command(name = "switchboard")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CommonArgs {
    /// Agent registry JSON file (`{"agents": [...]}`). Defaults to the
    /// built-in shop agents.
    #[arg(long, global = true)]
    agents: Option<PathBuf>,

    /// Directory for conversation checkpoints
    #[arg(long, global = true, default_value = ".switchboard")]
    state_dir: PathBuf,

    /// Model to use
    #[arg(long, global = true, default_value = "openai/gpt-4o-mini")]
    model: String,

    /// Non-system messages sent to the model per call
    #[arg(long, global = true, default_value_t = 20)]
    history_window: usize,

    /// Model calls allowed per turn
    #[arg(long, global = true, default_value_t = 25)]
    max_steps: u32,

    /// Deepest allowed delegation stack
    #[arg(long, global = true, default_value_t = 8)]
    max_depth: usize,

    /// Answer every pending call on rejection, not just the first
    #[arg(long, global = true)]
    reject_each: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat. Type `y` to approve a pending batch, anything else
    /// to reject it with that text as the reason.
    Chat {
        #[arg(long, default_value = "default")]
        conversation: String,
    },
    /// Submit one message and print the outcome.
    Send { conversation: String, text: String },
    /// Decide on the pending tool batch of a conversation.
    Resume {
        conversation: String,
        #[arg(long, conflicts_with = "reject")]
        approve: bool,
        #[arg(long)]
        reject: Option<String>,
    },
    /// Print the persisted snapshot as JSON.
    Show { conversation: String },
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    init_tracing(cli.common.verbose);

    let orchestrator = build_orchestrator(&cli.common)?;

    match cli.command {
        Command::Chat { conversation } => chat(&orchestrator, &conversation).await,
        Command::Send { conversation, text } => {
            let outcome = orchestrator
                .submit(&conversation, &text)
                .await
                .map_err(|e| e.to_string())?;
            print_outcome(&outcome);
            Ok(())
        }
        Command::Resume {
            conversation,
            approve,
            reject,
        } => {
            let decision = match (approve, reject) {
                (true, _) => ApprovalDecision::Approve,
                (false, Some(reason)) => ApprovalDecision::reject(reason),
                (false, None) => return Err("pass --approve or --reject <reason>".into()),
            };
            let outcome = orchestrator
                .resume(&conversation, decision)
                .await
                .map_err(|e| e.to_string())?;
            print_outcome(&outcome);
            Ok(())
        }
        Command::Show { conversation } => {
            let snapshot = orchestrator
                .snapshot(&conversation)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("no conversation '{conversation}'"))?;
            let json = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
            println!("{json}");
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "switchboard=info",
        1 => "switchboard=debug",
        _ => "switchboard=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_orchestrator(args: &CommonArgs) -> Result<Orchestrator, String> {
    let registry = match &args.agents {
        Some(path) => AgentRegistry::from_json_file(path),
        None => demo_registry(),
    }
    .map_err(|e| e.to_string())?;

    // Custom registries get no tools; their calls surface as tool errors.
    let tools = if args.agents.is_none() {
        demo_tools(SharedOrders::default())
    } else {
        ToolSet::new()
    };

    let model = OpenRouterModel::from_env(&args.model)?;
    let store = FileCheckpointStore::new(&args.state_dir).map_err(|e| e.to_string())?;

    let config = OrchestratorConfig::default()
        .with_history_window(args.history_window)
        .with_max_steps_per_turn(args.max_steps)
        .with_max_stack_depth(args.max_depth)
        .with_reject_each_pending_call(args.reject_each);

    let events = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(FnEventHandler::new(|event: &OrchestratorEvent<'_>| match event {
            OrchestratorEvent::ToolExecuting { name, .. } => eprintln!("  [tool] {name}"),
            OrchestratorEvent::Delegated { to, .. } => eprintln!("  [-> {to}]"),
            OrchestratorEvent::Escalated { to, .. } => eprintln!("  [<- {to}]"),
            _ => {}
        }));

    Ok(Orchestrator::new(
        Arc::new(model),
        Arc::new(tools),
        Arc::new(registry),
        Arc::new(store),
    )
    .with_config(config)
    .with_event_handler(events))
}

async fn chat(orchestrator: &Orchestrator, conversation: &str) -> Result<(), String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut awaiting = orchestrator
        .snapshot(conversation)
        .await
        .map_err(|e| e.to_string())?
        .is_some_and(|s| s.state.is_awaiting_approval());
    if awaiting {
        println!("A tool batch is awaiting approval. Type y to approve, or a reason to reject.");
    }

    loop {
        eprint!("{}> ", if awaiting { "approve?" } else { "you" });
        let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? else {
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            return Ok(());
        }

        let result = if awaiting {
            let decision = if line.eq_ignore_ascii_case("y") {
                ApprovalDecision::Approve
            } else {
                ApprovalDecision::reject(line)
            };
            orchestrator.resume(conversation, decision).await
        } else {
            orchestrator.submit(conversation, line).await
        };

        match result {
            Ok(outcome) => {
                awaiting = outcome.ending_state == TurnEnding::AwaitingApproval;
                print_outcome(&outcome);
            }
            Err(e) => eprintln!("Error: {e}"),
        }
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    if let Some(reply) = outcome.last_reply() {
        println!("{}: {reply}", outcome.active_agent);
    }
    if outcome.ending_state == TurnEnding::AwaitingApproval {
        println!("Pending tool calls (approval required):");
        for call in &outcome.pending_calls {
            println!("  {} {}", call.name, call.args_json());
        }
    }
    eprintln!(
        "  [tokens: {} prompt, {} completion, ~${:.4}]",
        outcome.prompt_token_count, outcome.completion_token_count, outcome.estimated_cost_usd
    );
}
