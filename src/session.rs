//! Per-session tutor state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gemini::ModelCandidate;
use crate::quiz::QuizProgress;

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of the tutor conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Everything the tutor remembers about one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    /// Seeds answer-choice shuffling for this session.
    pub seed: u64,
    pub quiz: QuizProgress,
    pub transcript: Vec<ChatTurn>,
    /// Ranked model candidates, discovered on first chat.
    #[serde(default)]
    pub model_candidates: Option<Vec<ModelCandidate>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Create a new session with a random id and seed.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Create a new session under a caller-chosen id.
    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            seed: rand::random(),
            quiz: QuizProgress::new(),
            transcript: Vec::new(),
            model_candidates: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fix the shuffle seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Mark the session as modified.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// The last `n` transcript turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> &[ChatTurn] {
        let start = self.transcript.len().saturating_sub(n);
        &self.transcript[start..]
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
