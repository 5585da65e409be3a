use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use grammar_tutor::{
    config::{Config, LogFormat},
    gemini::{list_available_candidates, GeminiClient},
    quiz::QuestionBank,
    server::{AppState, McpServer},
    storage::SqliteStorage,
};

/// Korean spelling tutor served over MCP
#[derive(Debug, Parser)]
#[command(name = "grammar-tutor", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve MCP requests on stdin/stdout (default)
    Serve,
    /// Discover and print the ranked model candidates
    Models,
    /// Print the question bank summary per category
    Bank,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Models => print_models(&config).await,
        Command::Bank => print_bank(&config),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Grammar tutor server starting..."
    );

    if !config.gemini.has_api_key() {
        info!("GOOGLE_API_KEY not configured; chat tools will report a configuration error");
    }

    let bank = match QuestionBank::from_config(&config.tutor) {
        Ok(b) => {
            info!(questions = b.len(), "Question bank loaded");
            b
        }
        Err(e) => {
            error!(error = %e, "Failed to load question bank");
            return Err(e.into());
        }
    };

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let gemini = match GeminiClient::new(&config.gemini, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.gemini.base_url, "Gemini client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Gemini client");
            return Err(e.into());
        }
    };

    let state = Arc::new(AppState::new(config, storage, gemini, bank));
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn print_models(config: &Config) -> anyhow::Result<()> {
    config.gemini.require_api_key()?;

    let client = GeminiClient::new(&config.gemini, config.request.clone())?;
    let candidates = list_available_candidates(&client, &config.gemini.api_versions).await;

    for (rank, candidate) in candidates.iter().enumerate() {
        println!("{:>2}. {}", rank + 1, candidate);
    }
    Ok(())
}

fn print_bank(config: &Config) -> anyhow::Result<()> {
    let bank = QuestionBank::from_config(&config.tutor)?;

    println!("{} questions", bank.len());
    for (category, count) in bank.count_by_category() {
        println!("  {:<10} {}", category.label(), count);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // stdout carries the protocol, so logs always go to stderr
    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
