use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gemini error: {0}")]
    Gemini(#[from] GeminiError),

    #[error("Quiz error: {0}")]
    Quiz(#[from] QuizError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Corrupt session state for {session_id}: {message}")]
    CorruptState { session_id: String, message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Generative language API errors
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("API key not configured: {message}")]
    Config { message: String },

    #[error("Model not found (404): {message}")]
    NotFound { message: String },

    #[error("Permission denied ({status}): {message}")]
    Forbidden { status: u16, message: String },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Coarse failure classes used by the model fallback loop.
///
/// Not-found and forbidden both advance to the next transport or candidate;
/// they only differ in the diagnostic shown after every option is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Missing or placeholder credential. Never retried.
    Configuration,
    /// The model or API version does not exist for this key.
    NotFound,
    /// The key is not allowed to use the model.
    Forbidden,
    /// Timeouts, malformed bodies and any other HTTP failure.
    Other,
}

impl GeminiError {
    /// Classify the error for fallback purposes.
    pub fn class(&self) -> FailureClass {
        match self {
            GeminiError::Config { .. } => FailureClass::Configuration,
            GeminiError::NotFound { .. } => FailureClass::NotFound,
            GeminiError::Forbidden { .. } => FailureClass::Forbidden,
            GeminiError::Api { .. }
            | GeminiError::InvalidResponse { .. }
            | GeminiError::Timeout { .. }
            | GeminiError::Http(_) => FailureClass::Other,
        }
    }

    /// Whether the fallback loop may move on to another transport or candidate.
    pub fn is_retryable(&self) -> bool {
        self.class() != FailureClass::Configuration
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Configuration => write!(f, "configuration"),
            FailureClass::NotFound => write!(f, "not_found"),
            FailureClass::Forbidden => write!(f, "forbidden"),
            FailureClass::Other => write!(f, "other"),
        }
    }
}

/// Quiz progression errors
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("Question bank is empty")]
    EmptyBank,

    #[error("Invalid question bank entry {index}: {reason}")]
    InvalidBank { index: usize, reason: String },

    #[error("Unknown question: {question_id}")]
    UnknownQuestion { question_id: u32 },

    #[error("Question {question_id} is not the current question")]
    StaleQuestion { question_id: u32 },

    #[error("No question is currently being asked")]
    NoActiveQuestion,

    #[error("There are no mistakes to retry")]
    NoMistakes,
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tool-specific errors with structured details
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Session error: {0}")]
    Session(String),
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for generative API operations
pub type GeminiResult<T> = Result<T, GeminiError>;

/// Result type alias for quiz operations
pub type QuizResult<T> = Result<T, QuizError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
