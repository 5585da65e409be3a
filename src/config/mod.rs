use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Placeholder values shipped in sample `.env` files. Treated as "not configured".
pub const PLACEHOLDER_API_KEYS: &[&str] = &[
    "여기에 실제 구글 API 키를 입력하세요",
    "your-api-key",
    "YOUR_API_KEY",
    "changeme",
];

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub generation: GenerationSettings,
    pub tutor: TutorConfig,
}

/// Generative language API configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Raw API key as found in the environment (may be a placeholder).
    pub api_key: Option<String>,
    pub base_url: String,
    /// API versions queried during model discovery, in order.
    pub api_versions: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Timeout for a single generation attempt.
    pub timeout_ms: u64,
    /// Timeout for model listing calls.
    pub discovery_timeout_ms: u64,
}

/// Sampling parameters sent with every generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

/// Tutor behaviour configuration
#[derive(Debug, Clone)]
pub struct TutorConfig {
    /// Number of most recent transcript turns sent as chat context.
    pub chat_history_turns: usize,
    /// Optional JSON file replacing the built-in question bank.
    pub question_bank_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let gemini = GeminiConfig {
            api_key: env::var("GOOGLE_API_KEY").ok(),
            base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            api_versions: parse_list(
                &env::var("GEMINI_API_VERSIONS").unwrap_or_else(|_| "v1beta,v1".to_string()),
            ),
        };

        if gemini.api_versions.is_empty() {
            return Err(AppError::Config {
                message: "GEMINI_API_VERSIONS must name at least one API version".to_string(),
            });
        }

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/tutor.db".to_string()),
            ),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", 30000),
            discovery_timeout_ms: parse_env("DISCOVERY_TIMEOUT_MS", 10000),
        };

        let defaults = GenerationSettings::default();
        let generation = GenerationSettings {
            temperature: parse_env("GENERATION_TEMPERATURE", defaults.temperature),
            top_p: parse_env("GENERATION_TOP_P", defaults.top_p),
            top_k: parse_env("GENERATION_TOP_K", defaults.top_k),
            max_output_tokens: parse_env(
                "GENERATION_MAX_OUTPUT_TOKENS",
                defaults.max_output_tokens,
            ),
        };

        let tutor = TutorConfig {
            chat_history_turns: parse_env("CHAT_HISTORY_TURNS", TutorConfig::default().chat_history_turns),
            question_bank_path: env::var("QUESTION_BANK_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        };

        Ok(Config {
            gemini,
            database,
            logging,
            request,
            generation,
            tutor,
        })
    }
}

impl GeminiConfig {
    /// The usable API key, or a configuration error when it is missing or a placeholder.
    pub fn require_api_key(&self) -> Result<&str, AppError> {
        match self.api_key.as_deref().map(str::trim) {
            None | Some("") => Err(AppError::Config {
                message: "GOOGLE_API_KEY is not set. Add it to your .env file".to_string(),
            }),
            Some(key) if PLACEHOLDER_API_KEYS.contains(&key) => Err(AppError::Config {
                message: "GOOGLE_API_KEY still holds the sample placeholder value".to_string(),
            }),
            Some(key) => Ok(key),
        }
    }

    /// Whether a real API key is present.
    pub fn has_api_key(&self) -> bool {
        self.require_api_key().is_ok()
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_versions: vec!["v1beta".to_string(), "v1".to_string()],
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/tutor.db"),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            chat_history_turns: 10,
            question_bank_path: None,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            discovery_timeout_ms: 10000,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 2048,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini_with_key(key: Option<&str>) -> GeminiConfig {
        GeminiConfig {
            api_key: key.map(String::from),
            ..GeminiConfig::default()
        }
    }

    #[test]
    fn test_require_api_key_missing() {
        let config = gemini_with_key(None);
        let err = config.require_api_key().unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_require_api_key_blank() {
        let config = gemini_with_key(Some("   "));
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_require_api_key_placeholder() {
        let config = gemini_with_key(Some("여기에 실제 구글 API 키를 입력하세요"));
        let err = config.require_api_key().unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn test_require_api_key_trims_value() {
        let config = gemini_with_key(Some("  real-key \n"));
        assert_eq!(config.require_api_key().unwrap(), "real-key");
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("v1beta, v1"), vec!["v1beta", "v1"]);
        assert_eq!(parse_list(" ,v1,, "), vec!["v1"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_defaults() {
        let request = RequestConfig::default();
        assert_eq!(request.timeout_ms, 30000);
        assert_eq!(request.discovery_timeout_ms, 10000);

        let generation = GenerationSettings::default();
        assert_eq!(generation.top_k, 40);
        assert_eq!(generation.max_output_tokens, 2048);
    }
}
