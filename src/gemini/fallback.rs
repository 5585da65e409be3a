//! Ranked model fallback with streaming → non-streaming transport fallback.
//!
//! Each call walks a small per-request state machine:
//!
//! ```text
//! TryStreaming(i) ──ok──▶ Streaming(i) ──text…──▶ done
//!      │ err                  │ err / no text
//!      ▼                      ▼
//! TryNonStreaming(i) ──ok──▶ done
//!      │ err
//!      ▼
//! NextCandidate(i) ──▶ TryStreaming(i+1) … ──▶ Exhausted ──▶ diagnostic fragment
//! ```
//!
//! The first success wins. Exhaustive failure is reported as a single text
//! fragment rather than an error, so callers can render it like any reply.

use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use super::client::GenerationTransport;
use super::stream::FragmentStream;
use super::types::{GenerateContentRequest, ModelCandidate, TransportKind};
use crate::error::{FailureClass, GeminiError};

/// A piece of response text and where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub text: String,
    pub origin: FragmentOrigin,
}

/// Source of a fragment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentOrigin {
    /// Produced by a model.
    Model {
        candidate: ModelCandidate,
        transport: TransportKind,
    },
    /// Every option failed; the text explains why.
    Diagnostic { class: Option<FailureClass> },
}

/// One failed transport attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FailedAttempt {
    pub candidate: ModelCandidate,
    pub transport: TransportKind,
    pub class: FailureClass,
    pub message: String,
}

/// Collected result of a whole fallback run
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub text: String,
    /// Candidate and transport that answered, `None` for a diagnostic.
    pub answered_by: Option<(ModelCandidate, TransportKind)>,
}

impl GenerationOutcome {
    pub fn is_diagnostic(&self) -> bool {
        self.answered_by.is_none()
    }
}

impl Fragment {
    fn model(text: String, candidate: &ModelCandidate, transport: TransportKind) -> Self {
        Self {
            text,
            origin: FragmentOrigin::Model {
                candidate: candidate.clone(),
                transport,
            },
        }
    }

    pub fn is_diagnostic(&self) -> bool {
        matches!(self.origin, FragmentOrigin::Diagnostic { .. })
    }
}

enum FallbackState {
    TryStreaming { index: usize },
    Streaming {
        index: usize,
        stream: FragmentStream,
        yielded: bool,
    },
    TryNonStreaming { index: usize },
    NextCandidate { index: usize },
    Exhausted,
    Done,
}

struct FallbackRun<'a, T: ?Sized> {
    transport: &'a T,
    request: &'a GenerateContentRequest,
    candidates: &'a [ModelCandidate],
    state: FallbackState,
    failures: Vec<FailedAttempt>,
}

impl<'a, T: GenerationTransport + ?Sized> FallbackRun<'a, T> {
    /// Advance until the next fragment is available or the run is over.
    async fn step(&mut self) -> Option<Fragment> {
        let (transport, request, candidates) = (self.transport, self.request, self.candidates);

        loop {
            match std::mem::replace(&mut self.state, FallbackState::Done) {
                FallbackState::TryStreaming { index } => {
                    let Some(candidate) = candidates.get(index) else {
                        self.state = FallbackState::Exhausted;
                        continue;
                    };
                    self.state = match transport.stream(candidate, request).await {
                        Ok(stream) => FallbackState::Streaming {
                            index,
                            stream,
                            yielded: false,
                        },
                        Err(e) => self.fail(candidate, index, TransportKind::Streaming, e),
                    };
                }
                FallbackState::Streaming {
                    index,
                    mut stream,
                    yielded,
                } => {
                    let candidate = &candidates[index];
                    match stream.next().await {
                        Some(Ok(text)) => {
                            self.state = FallbackState::Streaming {
                                index,
                                stream,
                                yielded: true,
                            };
                            return Some(Fragment::model(text, candidate, TransportKind::Streaming));
                        }
                        Some(Err(e)) if yielded => {
                            // Text already reached the caller; replaying through
                            // another transport would duplicate it.
                            warn!(candidate = %candidate, error = %e, "Stream broke after partial output");
                            return None;
                        }
                        Some(Err(e)) => {
                            self.state = self.fail(candidate, index, TransportKind::Streaming, e);
                        }
                        None if yielded => {
                            info!(candidate = %candidate, transport = "streaming", "Generation succeeded");
                            return None;
                        }
                        None => {
                            let e = GeminiError::InvalidResponse {
                                message: "Stream ended without any text".to_string(),
                            };
                            self.state = self.fail(candidate, index, TransportKind::Streaming, e);
                        }
                    }
                }
                FallbackState::TryNonStreaming { index } => {
                    let candidate = &candidates[index];
                    match transport.generate(candidate, request).await {
                        Ok(text) => {
                            info!(candidate = %candidate, transport = "non_streaming", "Generation succeeded");
                            return Some(Fragment::model(text, candidate, TransportKind::NonStreaming));
                        }
                        Err(e) => {
                            self.state = self.fail(candidate, index, TransportKind::NonStreaming, e);
                        }
                    }
                }
                FallbackState::NextCandidate { index } => {
                    self.state = if index + 1 < candidates.len() {
                        FallbackState::TryStreaming { index: index + 1 }
                    } else {
                        FallbackState::Exhausted
                    };
                }
                FallbackState::Exhausted => {
                    let class = self.failures.last().map(|f| f.class);
                    warn!(
                        attempts = self.failures.len(),
                        last_class = ?class,
                        "All model candidates failed"
                    );
                    return Some(Fragment {
                        text: render_diagnostic(&self.failures, candidates),
                        origin: FragmentOrigin::Diagnostic { class },
                    });
                }
                FallbackState::Done => return None,
            }
        }
    }

    /// Record a failure and pick the next state.
    fn fail(
        &mut self,
        candidate: &ModelCandidate,
        index: usize,
        transport: TransportKind,
        error: GeminiError,
    ) -> FallbackState {
        let class = error.class();
        warn!(
            candidate = %candidate,
            transport = %transport,
            class = %class,
            error = %error,
            "Generation attempt failed"
        );
        self.failures.push(FailedAttempt {
            candidate: candidate.clone(),
            transport,
            class,
            message: error.to_string(),
        });

        if !error.is_retryable() {
            return FallbackState::Exhausted;
        }
        match transport {
            TransportKind::Streaming => FallbackState::TryNonStreaming { index },
            TransportKind::NonStreaming => FallbackState::NextCandidate { index },
        }
    }
}

/// Runs generation requests across a ranked candidate list
#[derive(Clone)]
pub struct FallbackGenerator<T> {
    transport: T,
}

impl<T: GenerationTransport> FallbackGenerator<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Get the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Lazily generate a response. The stream is finite and not restartable;
    /// each call opens fresh connections.
    pub fn generate<'a>(
        &'a self,
        request: &'a GenerateContentRequest,
        candidates: &'a [ModelCandidate],
    ) -> BoxStream<'a, Fragment> {
        let run = FallbackRun {
            transport: &self.transport,
            request,
            candidates,
            state: FallbackState::TryStreaming { index: 0 },
            failures: Vec::new(),
        };

        stream::unfold(run, |mut run| async move {
            let fragment = run.step().await?;
            Some((fragment, run))
        })
        .boxed()
    }

    /// Generate and concatenate every fragment
    pub async fn generate_text(
        &self,
        request: &GenerateContentRequest,
        candidates: &[ModelCandidate],
    ) -> GenerationOutcome {
        let mut fragments = self.generate(request, candidates);
        let mut text = String::new();
        let mut answered_by = None;

        while let Some(fragment) = fragments.next().await {
            text.push_str(&fragment.text);
            answered_by = match fragment.origin {
                FragmentOrigin::Model {
                    candidate,
                    transport,
                } => Some((candidate, transport)),
                FragmentOrigin::Diagnostic { .. } => None,
            };
        }

        GenerationOutcome { text, answered_by }
    }
}

/// Explain an exhaustive failure, naming the last failure class and every
/// attempted candidate.
pub fn render_diagnostic(failures: &[FailedAttempt], candidates: &[ModelCandidate]) -> String {
    let Some(last) = failures.last() else {
        return "사용할 수 있는 모델 후보가 없어요. 모델 목록을 새로고침해 주세요.".to_string();
    };

    let (headline, hint) = match last.class {
        FailureClass::Configuration => (
            "구글 API 키가 설정되지 않았어요.".to_string(),
            ".env 파일의 GOOGLE_API_KEY 값을 확인해 주세요.",
        ),
        FailureClass::NotFound => (
            "모든 API 버전과 모델 조합을 시도했지만 찾을 수 없어요 (404 Not Found).".to_string(),
            "Google Cloud Console에서 Generative Language API가 활성화되어 있는지 확인해 주세요.",
        ),
        FailureClass::Forbidden => (
            "API 키에 모델 사용 권한이 없어요 (403 Forbidden).".to_string(),
            "API 키가 유효한지, Gemini API가 활성화되어 있는지 확인해 주세요.",
        ),
        FailureClass::Other => (
            format!("요청 중 오류가 발생했어요: {}", last.message),
            "API 키와 네트워크 연결을 확인해 주세요.",
        ),
    };

    let mut attempted: Vec<&ModelCandidate> = Vec::new();
    for failure in failures {
        if !attempted.contains(&&failure.candidate) {
            attempted.push(&failure.candidate);
        }
    }

    let mut text = format!("{}\n{}\n\n시도한 조합:", headline, hint);
    for candidate in &attempted {
        text.push_str(&format!("\n- {}", candidate));
    }
    let untried = candidates.len().saturating_sub(attempted.len());
    if untried > 0 {
        text.push_str(&format!("\n(시도하지 않은 후보 {}개)", untried));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::client::MockGenerationTransport;
    use crate::gemini::types::Content;

    fn candidates() -> Vec<ModelCandidate> {
        vec![ModelCandidate::new("v1", "m1"), ModelCandidate::new("v2", "m2")]
    }

    fn request() -> GenerateContentRequest {
        GenerateContentRequest::new(vec![Content::user("질문")])
    }

    fn text_stream(parts: &[&str]) -> FragmentStream {
        let items: Vec<Result<String, GeminiError>> =
            parts.iter().map(|p| Ok(p.to_string())).collect();
        stream::iter(items).boxed()
    }

    fn not_found() -> GeminiError {
        GeminiError::NotFound {
            message: "no such model".to_string(),
        }
    }

    fn forbidden() -> GeminiError {
        GeminiError::Forbidden {
            status: 403,
            message: "permission denied".to_string(),
        }
    }

    #[tokio::test]
    async fn test_streaming_success_never_uses_non_streaming() {
        let mut mock = MockGenerationTransport::new();
        mock.expect_stream()
            .withf(|c, _| c.model_name == "m1")
            .times(1)
            .returning(|_, _| Ok(text_stream(&["안", "녕"])));
        mock.expect_generate().times(0);

        let generator = FallbackGenerator::new(mock);
        let (request, candidates) = (request(), candidates());
        let fragments: Vec<Fragment> = generator.generate(&request, &candidates).collect().await;

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "안");
        assert_eq!(fragments[1].text, "녕");
        assert!(fragments.iter().all(|f| !f.is_diagnostic()));
    }

    #[tokio::test]
    async fn test_first_success_wins_after_streaming_not_found() {
        let mut mock = MockGenerationTransport::new();
        mock.expect_stream()
            .withf(|c, _| c.model_name == "m1")
            .times(1)
            .returning(|_, _| Err(not_found()));
        mock.expect_generate()
            .withf(|c, _| c.model_name == "m1")
            .times(1)
            .returning(|_, _| Ok("전체 답변".to_string()));
        mock.expect_stream()
            .withf(|c, _| c.model_name == "m2")
            .times(0);
        mock.expect_generate()
            .withf(|c, _| c.model_name == "m2")
            .times(0);

        let generator = FallbackGenerator::new(mock);
        let (request, candidates) = (request(), candidates());
        let fragments: Vec<Fragment> = generator.generate(&request, &candidates).collect().await;

        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "전체 답변");
        assert_eq!(
            fragments[0].origin,
            FragmentOrigin::Model {
                candidate: ModelCandidate::new("v1", "m1"),
                transport: TransportKind::NonStreaming,
            }
        );
    }

    #[tokio::test]
    async fn test_exhaustive_forbidden_yields_single_diagnostic() {
        let mut mock = MockGenerationTransport::new();
        mock.expect_stream().times(2).returning(|_, _| Err(forbidden()));
        mock.expect_generate().times(2).returning(|_, _| Err(forbidden()));

        let generator = FallbackGenerator::new(mock);
        let (request, candidates) = (request(), candidates());
        let fragments: Vec<Fragment> = generator.generate(&request, &candidates).collect().await;

        assert_eq!(fragments.len(), 1);
        let diagnostic = &fragments[0];
        assert_eq!(
            diagnostic.origin,
            FragmentOrigin::Diagnostic {
                class: Some(FailureClass::Forbidden)
            }
        );
        assert!(diagnostic.text.contains("403"));
        assert!(diagnostic.text.contains("v1/m1"));
        assert!(diagnostic.text.contains("v2/m2"));
    }

    #[tokio::test]
    async fn test_empty_stream_falls_back_to_non_streaming() {
        let mut mock = MockGenerationTransport::new();
        mock.expect_stream()
            .times(1)
            .returning(|_, _| Ok(text_stream(&[])));
        mock.expect_generate()
            .times(1)
            .returning(|_, _| Ok("fallback".to_string()));

        let generator = FallbackGenerator::new(mock);
        let (request, candidates) = (request(), candidates());
        let outcome = generator.generate_text(&request, &candidates).await;

        assert_eq!(outcome.text, "fallback");
        assert_eq!(
            outcome.answered_by,
            Some((ModelCandidate::new("v1", "m1"), TransportKind::NonStreaming))
        );
    }

    #[tokio::test]
    async fn test_stream_error_after_output_does_not_fall_back() {
        let mut mock = MockGenerationTransport::new();
        mock.expect_stream().times(1).returning(|_, _| {
            let items: Vec<Result<String, GeminiError>> = vec![
                Ok("부분".to_string()),
                Err(GeminiError::InvalidResponse {
                    message: "reset".to_string(),
                }),
            ];
            Ok(stream::iter(items).boxed())
        });
        mock.expect_generate().times(0);

        let generator = FallbackGenerator::new(mock);
        let (request, candidates) = (request(), candidates());
        let outcome = generator.generate_text(&request, &candidates).await;

        assert_eq!(outcome.text, "부분");
        assert!(!outcome.is_diagnostic());
    }

    #[tokio::test]
    async fn test_configuration_error_stops_immediately() {
        let mut mock = MockGenerationTransport::new();
        mock.expect_stream().times(1).returning(|_, _| {
            Err(GeminiError::Config {
                message: "missing".to_string(),
            })
        });
        mock.expect_generate().times(0);

        let generator = FallbackGenerator::new(mock);
        let (request, candidates) = (request(), candidates());
        let fragments: Vec<Fragment> = generator.generate(&request, &candidates).collect().await;

        assert_eq!(fragments.len(), 1);
        assert_eq!(
            fragments[0].origin,
            FragmentOrigin::Diagnostic {
                class: Some(FailureClass::Configuration)
            }
        );
        assert!(fragments[0].text.contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn test_no_candidates_yields_diagnostic() {
        let generator = FallbackGenerator::new(MockGenerationTransport::new());
        let request = request();

        let outcome = tokio_test::block_on(generator.generate_text(&request, &[]));

        assert!(outcome.is_diagnostic());
        assert!(outcome.text.contains("모델 후보"));
    }

    #[tokio::test]
    async fn test_mixed_failures_report_last_class() {
        let mut mock = MockGenerationTransport::new();
        mock.expect_stream().times(2).returning(|_, _| Err(not_found()));
        mock.expect_generate()
            .withf(|c, _| c.model_name == "m1")
            .times(1)
            .returning(|_, _| Err(not_found()));
        mock.expect_generate()
            .withf(|c, _| c.model_name == "m2")
            .times(1)
            .returning(|_, _| {
                Err(GeminiError::Api {
                    status: 500,
                    message: "internal".to_string(),
                })
            });

        let generator = FallbackGenerator::new(mock);
        let (request, candidates) = (request(), candidates());
        let outcome = generator.generate_text(&request, &candidates).await;

        assert!(outcome.is_diagnostic());
        assert!(outcome.text.contains("500"));
        assert!(outcome.text.contains("v1/m1"));
    }

    #[test]
    fn test_render_diagnostic_deduplicates_candidates() {
        let candidate = ModelCandidate::new("v1beta", "gemini-pro");
        let failures = vec![
            FailedAttempt {
                candidate: candidate.clone(),
                transport: TransportKind::Streaming,
                class: FailureClass::NotFound,
                message: "a".to_string(),
            },
            FailedAttempt {
                candidate: candidate.clone(),
                transport: TransportKind::NonStreaming,
                class: FailureClass::NotFound,
                message: "b".to_string(),
            },
        ];

        let text = render_diagnostic(&failures, &[candidate]);
        assert!(text.contains("404"));
        assert_eq!(text.matches("v1beta/gemini-pro").count(), 1);
    }
}
