use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use conductor_core::{
    default_builtins, CallContext, CancellationToken, CapabilityRegistry, ConnectionRegistry,
    ConnectionStatus, FileConfigStorage, GenaiCompletionService, Logger, Orchestrator,
    ProviderModelConfig, RmcpConnector, RuntimeSettings, StepStatus, TracingLogger,
};
use conductor_core::capabilities::RemoteToolSource;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Parser)]
#[command(name = "conductor", version, about = "Tool server manager and query orchestrator")]
struct Cli {
    /// Server config file (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to every configured server and print its status
    Servers,
    /// Print the namespaced tool union
    Tools,
    /// Answer a query with the available capabilities
    Ask {
        query: String,
        /// Model, optionally provider-prefixed (e.g. openai/gpt-4o-mini)
        #[arg(long, env = "CONDUCTOR_MODEL", default_value = DEFAULT_MODEL)]
        model: String,
        /// Caller identity used to select saved workflows
        #[arg(long)]
        user: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let is_debug = env::var("CONDUCTOR_DEBUG").is_ok();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_debug {
            EnvFilter::new("conductor=debug,info")
        } else {
            EnvFilter::new("conductor=info,warn")
        }
    });

    let fmt_layer = fmt::layer()
        .with_target(is_debug)
        .with_file(is_debug)
        .with_line_number(is_debug)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new());
    let settings = RuntimeSettings::from_env();
    let path = cli.config.unwrap_or_else(FileConfigStorage::default_path);
    let storage = Arc::new(
        FileConfigStorage::new(&path)
            .with_settings(&settings)
            .with_logger(Arc::clone(&logger)),
    );
    let connections = ConnectionRegistry::new(
        storage,
        Arc::new(RmcpConnector::new(Arc::clone(&logger))),
        settings.clone(),
        Arc::clone(&logger),
    );
    tracing::debug!(target: "conductor", "using server config {}", path.display());

    let outcome = match cli.command {
        Command::Servers => handle_servers(&connections).await,
        Command::Tools => handle_tools(&connections).await,
        Command::Ask { query, model, user, json } => {
            handle_ask(&connections, &settings, Arc::clone(&logger), &query, model, user, json).await
        }
    };

    connections.shutdown().await;
    outcome
}

async fn handle_servers(connections: &Arc<ConnectionRegistry>) -> anyhow::Result<()> {
    connections.init().await;
    let clients = connections.get_clients().await;
    if clients.is_empty() {
        println!("No servers configured");
        return Ok(());
    }

    println!("{:<24} {:<8} {:<14} {}", "Name", "Type", "Status", "Tools");
    for client in clients {
        let status = match client.status {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Disconnected => "disconnected",
        };
        let tools: Vec<&str> = client.tools.iter().map(|t| t.name.as_str()).collect();
        println!(
            "{:<24} {:<8} {:<14} {}",
            client.name,
            client.config.transport(),
            status,
            tools.join(", ")
        );
        if let Some(error) = client.error {
            println!("{:<24} error: {}", "", error);
        }
    }
    Ok(())
}

async fn handle_tools(connections: &Arc<ConnectionRegistry>) -> anyhow::Result<()> {
    let tools = connections.tools().await;
    if tools.is_empty() {
        println!("No tools available");
        return Ok(());
    }
    for tool in tools {
        println!("{:<40} {}", tool.id, tool.tool.description);
    }
    Ok(())
}

async fn handle_ask(
    connections: &Arc<ConnectionRegistry>,
    settings: &RuntimeSettings,
    logger: Arc<dyn Logger>,
    query: &str,
    model: String,
    user: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let completion = Arc::new(GenaiCompletionService::new(
        ProviderModelConfig::new(model),
        Arc::clone(&logger),
    ));

    let capabilities = default_builtins().into_iter().fold(
        CapabilityRegistry::from_settings(settings)
            .with_remote_tools(Arc::clone(connections) as Arc<dyn RemoteToolSource>)
            .with_logger(Arc::clone(&logger)),
        |registry, tool| registry.with_builtin(tool),
    );
    let orchestrator = Orchestrator::new(Arc::new(capabilities), completion).with_logger(logger);

    let cancel = CancellationToken::new();
    let ctx = match user {
        Some(user) => CallContext::for_user(user),
        None => CallContext::new(),
    }
    .with_cancel(cancel.clone());

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = orchestrator.orchestrate(query, &ctx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}\n", result.final_response);
    println!("Plan ({} steps, confidence {:.2}):", result.plan.steps.len(), result.plan.confidence);
    for step in &result.plan.steps {
        let status = match step.status {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        let target = step.capability_id.as_deref().unwrap_or("-");
        println!("  {:<8} {:<10} {:<32} {}", step.id, status, target, step.description);
        if let Some(error) = &step.error {
            println!("  {:<8} error: {}", "", error);
        }
    }
    println!("Took {:?}", result.execution_time);
    Ok(())
}
