use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::stream::{text_fragments, FragmentStream};
use super::types::{GenerateContentRequest, GenerateContentResponse, ListModelsResponse, ModelCandidate, ModelInfo};
use crate::config::{GeminiConfig, RequestConfig};
use crate::error::{GeminiError, GeminiResult};

/// Upper bound on listing pages followed during discovery
const MAX_MODEL_PAGES: usize = 5;

/// The two ways of asking one candidate for a completion.
///
/// The fallback loop only talks to this trait, so it can be driven by a
/// scripted transport in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    /// Open a streaming generation; fragments arrive lazily.
    async fn stream(
        &self,
        candidate: &ModelCandidate,
        request: &GenerateContentRequest,
    ) -> GeminiResult<FragmentStream>;

    /// Perform one blocking generation and return the whole text.
    async fn generate(
        &self,
        candidate: &ModelCandidate,
        request: &GenerateContentRequest,
    ) -> GeminiResult<String>;
}

/// Client for the generative language HTTP API
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_config: RequestConfig,
}

impl GeminiClient {
    /// Create a new client. A missing API key is not an error here; every
    /// remote call checks it instead.
    pub fn new(config: &GeminiConfig, request_config: RequestConfig) -> GeminiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(GeminiError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.require_api_key().ok().map(String::from),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a usable API key is configured
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> GeminiResult<&str> {
        self.api_key.as_deref().ok_or_else(|| GeminiError::Config {
            message: "GOOGLE_API_KEY is missing or a placeholder".to_string(),
        })
    }

    fn generation_url(&self, candidate: &ModelCandidate, method: &str) -> String {
        format!(
            "{}/{}/models/{}:{}",
            self.base_url, candidate.api_version, candidate.model_name, method
        )
    }

    /// List every model visible to this key under one API version
    pub async fn list_models(&self, api_version: &str) -> GeminiResult<Vec<ModelInfo>> {
        let api_key = self.api_key()?;
        let url = format!("{}/{}/models", self.base_url, api_version);
        let timeout_ms = self.request_config.discovery_timeout_ms;

        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_MODEL_PAGES {
            let mut query = vec![("key", api_key.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .client
                .get(&url)
                .query(&query)
                .timeout(Duration::from_millis(timeout_ms))
                .send()
                .await
                .map_err(|e| map_send_error(e, timeout_ms))?;

            let page: ListModelsResponse = check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| GeminiError::InvalidResponse {
                    message: format!("Failed to parse model list: {}", e),
                })?;

            models.extend(page.models);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(api_version = %api_version, count = models.len(), "Listed models");
        Ok(models)
    }

    /// Non-streaming `generateContent` call
    pub async fn generate_content(
        &self,
        candidate: &ModelCandidate,
        request: &GenerateContentRequest,
    ) -> GeminiResult<String> {
        let api_key = self.api_key()?;
        let url = self.generation_url(candidate, "generateContent");
        let request = request.for_api_version(&candidate.api_version);
        let start = Instant::now();

        debug!(
            candidate = %candidate,
            turns = request.contents.len(),
            "Calling generateContent"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&*request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.request_config.timeout_ms))?;

        let body: GenerateContentResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| GeminiError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })?;

        let text = body
            .text()
            .ok_or_else(|| GeminiError::InvalidResponse {
                message: "Response has no candidates[0].content.parts[0].text".to_string(),
            })?
            .to_string();

        info!(
            candidate = %candidate,
            latency_ms = start.elapsed().as_millis(),
            chars = text.chars().count(),
            "generateContent succeeded"
        );

        Ok(text)
    }

    /// Streaming `streamGenerateContent?alt=sse` call.
    ///
    /// Returns once response headers arrived with a success status; text is
    /// decoded lazily from the body.
    pub async fn stream_generate_content(
        &self,
        candidate: &ModelCandidate,
        request: &GenerateContentRequest,
    ) -> GeminiResult<FragmentStream> {
        let api_key = self.api_key()?;
        let url = self.generation_url(candidate, "streamGenerateContent");
        let request = request.for_api_version(&candidate.api_version);

        debug!(candidate = %candidate, "Calling streamGenerateContent");

        let response = self
            .client
            .post(&url)
            .query(&[("alt", "sse"), ("key", api_key)])
            .json(&*request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.request_config.timeout_ms))?;

        let response = check_status(response).await?;
        Ok(text_fragments(
            Box::pin(response.bytes_stream()),
            map_body_error,
        ))
    }
}

#[async_trait]
impl GenerationTransport for GeminiClient {
    async fn stream(
        &self,
        candidate: &ModelCandidate,
        request: &GenerateContentRequest,
    ) -> GeminiResult<FragmentStream> {
        self.stream_generate_content(candidate, request).await
    }

    async fn generate(
        &self,
        candidate: &ModelCandidate,
        request: &GenerateContentRequest,
    ) -> GeminiResult<String> {
        self.generate_content(candidate, request).await
    }
}

/// Map non-success statuses onto the fallback error classes
async fn check_status(response: Response) -> GeminiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "Generative API returned an error status");

    Err(match status {
        StatusCode::NOT_FOUND => GeminiError::NotFound { message },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GeminiError::Forbidden {
            status: status.as_u16(),
            message,
        },
        _ => GeminiError::Api {
            status: status.as_u16(),
            message,
        },
    })
}

fn map_send_error(e: reqwest::Error, timeout_ms: u64) -> GeminiError {
    if e.is_timeout() {
        GeminiError::Timeout { timeout_ms }
    } else {
        GeminiError::Http(e)
    }
}

fn map_body_error(e: reqwest::Error) -> GeminiError {
    if e.is_timeout() {
        GeminiError::InvalidResponse {
            message: "Stream timed out".to_string(),
        }
    } else {
        GeminiError::Http(e)
    }
}
