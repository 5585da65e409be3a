//! # Grammar Tutor
//!
//! A Korean spelling tutor served over the Model Context Protocol (MCP).
//!
//! ## Features
//!
//! - **Quiz progression**: fresh questions without repeats until the bank is
//!   exhausted, a tombstoned retry queue for wrong answers, and stable
//!   per-session choice ordering
//! - **Grammar rules**: five rule families (데/대, 이에요/예요, 어떡해/어떻게,
//!   되/돼, 안/않) with keyword search
//! - **AI tutor chat**: Gemini generation that walks ranked model candidates,
//!   streaming first, and turns total failure into a readable diagnostic
//! - **Sessions**: per-learner state persisted in SQLite between calls
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → McpServer → TutorEngine → quiz / gemini
//!                   ↓
//!             SQLite (sessions)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use grammar_tutor::{Config, AppState, McpServer};
//! use grammar_tutor::gemini::GeminiClient;
//! use grammar_tutor::quiz::QuestionBank;
//! use grammar_tutor::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let gemini = GeminiClient::new(&config.gemini, config.request.clone())?;
//!     let bank = QuestionBank::from_config(&config.tutor)?;
//!     let state = Arc::new(AppState::new(config, storage, gemini, bank));
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Generative language API client, discovery and model fallback.
pub mod gemini;
/// System prompts for the AI tutor.
pub mod prompts;
/// Question bank, grammar rules and quiz progression.
pub mod quiz;
/// MCP server implementation and request handling.
pub mod server;
/// Per-learner session state.
pub mod session;
/// SQLite session persistence.
pub mod storage;
/// Event-driven tutor engine.
pub mod tutor;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
