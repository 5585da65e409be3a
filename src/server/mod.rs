//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - the stdio JSON-RPC server
//! - tool call routing into the tutor engine
//! - shared application state

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::quiz::QuestionBank;
use crate::storage::SqliteStorage;
use crate::tutor::TutorEngine;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub storage: SqliteStorage,
    pub engine: TutorEngine,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: Config,
        storage: SqliteStorage,
        gemini: GeminiClient,
        bank: QuestionBank,
    ) -> Self {
        tracing::info!(
            questions = bank.len(),
            api_key_configured = config.gemini.has_api_key(),
            api_versions = ?config.gemini.api_versions,
            "AppState initializing"
        );

        let engine = TutorEngine::new(&config, bank, gemini);
        Self {
            config,
            storage,
            engine,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
