mod app;
mod config;
mod controller;
mod error;
mod events;
mod host;
mod llm;
mod logging;
mod markdown;
mod storage;
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use events::ConversationId;
use host::LocalHost;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chatdesk")]
#[command(version)]
#[command(about = "Chat with an LLM across multiple conversations", long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override where conversations and logs are stored
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the model used for replies
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved conversations, most recent first
    List,
    /// Print one conversation
    Show { id: String },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    Ok(config)
}

async fn list_conversations(host: &LocalHost) -> Result<()> {
    let controller = app::load_controller(host).await;

    if controller.is_empty() {
        println!("📭 No conversations yet. Run 'chatdesk' to start one!");
        return Ok(());
    }

    println!("💬 Your conversations:\n");
    for summary in controller.summaries() {
        let created = summary
            .id
            .created_at()
            .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let turns = controller.turns(&summary.id).map_or(0, <[_]>::len);
        println!("  {}  {}  {:<20}  ({} messages)", summary.id, created, summary.title, turns);
    }

    Ok(())
}

async fn show_conversation(host: &LocalHost, id: &str) -> Result<()> {
    let controller = app::load_controller(host).await;
    let id = ConversationId::from(id);

    let Some(turns) = controller.turns(&id) else {
        println!("❌ Conversation '{id}' not found.");
        println!("Run 'chatdesk list' to see saved conversations.");
        return Ok(());
    };

    for turn in turns {
        println!("## {}\n", turn.role.display_name());
        println!("{}\n", turn.content);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let _guard = logging::init_tracing(&config.log_dir()).context("Failed to initialize logging")?;
    tracing::info!(model = %config.model, data_dir = %config.data_dir.display(), "Starting chatdesk");

    let host = LocalHost::new(&config).context("Failed to create host")?;
    host.store()
        .ensure_directories()
        .context("Failed to create data directory")?;
    tracing::debug!(path = %host.store().path().display(), "Conversation store ready");

    match cli.command {
        None => app::run(Arc::new(host)).await,
        Some(Commands::List) => list_conversations(&host).await,
        Some(Commands::Show { id }) => show_conversation(&host, &id).await,
    }
}
