// Dealcoach Engine
// Main entry point for the dealcoach binary

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use dealcoach_engine::cli::{Cli, Command};
use dealcoach_engine::config::Config;
use dealcoach_engine::db::Database;
use dealcoach_engine::handlers::{
    handle_chat, handle_end_call, handle_report, handle_reset, handle_state, OutputFormat,
};
use dealcoach_engine::llm::workers_ai::WorkersAiBackend;
use dealcoach_engine::service::CoachService;
use dealcoach_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    tracing::info!("Dealcoach Engine v{}", env!("CARGO_PKG_VERSION"));

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Re-initialize telemetry with CLI or config-driven log level
    // (only takes effect if RUST_LOG env var is not set)
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    // Wire up storage, backend, and the service facade
    let db = Database::new(&config.db_path()?).await?;
    let backend = Arc::new(WorkersAiBackend::from_config(&config.llm)?);
    let service = CoachService::new(
        backend,
        Arc::new(db.sessions()),
        Arc::new(db.checkpoints()),
        config.retry_policy(),
    );

    let poll_timeout = Duration::from_secs(config.finalize.poll_timeout_secs);

    let result = match cli.command {
        Command::Chat { session, message } => {
            handle_chat(&service, &session, &message, format).await
        }

        Command::State { session } => handle_state(&service, &session, format).await,

        Command::Reset { session } => handle_reset(&service, &session).await,

        Command::EndCall { session } => {
            handle_end_call(&service, &session, poll_timeout, format).await
        }

        Command::Report {
            session,
            timeout_secs,
        } => {
            let timeout = timeout_secs.map(Duration::from_secs).unwrap_or(poll_timeout);
            handle_report(&service, &session, timeout, format).await
        }
    };

    // Checkpoint the WAL before exit so all writes land in the main file
    db.close().await?;

    result
}
