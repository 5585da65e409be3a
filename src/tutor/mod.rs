//! Event-driven tutor engine.
//!
//! Every interaction is a [`UserAction`] applied to a [`SessionState`]; the
//! engine mutates the state and answers with a list of [`RenderCommand`]s
//! that any front end can display.

mod chat;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Config, GeminiConfig, GenerationSettings};
use crate::error::{AppResult, QuizError};
use crate::gemini::{FallbackGenerator, GeminiClient, ModelCandidate};
use crate::quiz::{
    answer_choices, ChoiceStyle, GrammarRule, QuestionBank, QuestionId, RuleBook, RuleCategory,
};
use crate::session::{ChatRole, SessionState};

pub use chat::{build_chat_request, merge_turns};

/// Something the learner did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserAction {
    NextQuestion {
        #[serde(default)]
        style: ChoiceStyle,
    },
    SubmitAnswer {
        question_id: u32,
        answer: String,
    },
    StartRetry,
    StopRetry,
    ResetQuiz,
    ShowStats,
    ShowMistakes,
    ClearMistakes,
    SearchRules {
        term: String,
    },
    ShowRules {
        #[serde(default)]
        category: Option<RuleCategory>,
    },
    Chat {
        message: String,
    },
    ExplainMistake,
    ShowModels {
        #[serde(default)]
        refresh: bool,
    },
}

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Something to show the learner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderCommand {
    Question {
        question_id: QuestionId,
        prompt: String,
        category: RuleCategory,
        choices: Vec<String>,
        is_retry: bool,
    },
    Feedback {
        is_correct: bool,
        chosen_answer: String,
        correct_answer: String,
        message: String,
        rules: Vec<GrammarRule>,
    },
    Markdown {
        text: String,
    },
    Notice {
        level: NoticeLevel,
        text: String,
    },
    Table {
        title: String,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    ChatMessage {
        role: ChatRole,
        text: String,
        /// `version/model` that produced the text.
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        /// Set when the text explains why no model answered.
        diagnostic: bool,
    },
}

impl RenderCommand {
    fn notice(level: NoticeLevel, text: impl Into<String>) -> Self {
        RenderCommand::Notice {
            level,
            text: text.into(),
        }
    }
}

/// Applies actions to sessions.
#[derive(Clone)]
pub struct TutorEngine {
    bank: QuestionBank,
    rules: RuleBook,
    gemini_config: GeminiConfig,
    generation: GenerationSettings,
    chat_history_turns: usize,
    generator: FallbackGenerator<GeminiClient>,
}

impl TutorEngine {
    pub fn new(config: &Config, bank: QuestionBank, client: GeminiClient) -> Self {
        Self {
            bank,
            rules: RuleBook::builtin(),
            gemini_config: config.gemini.clone(),
            generation: config.generation.clone(),
            chat_history_turns: config.tutor.chat_history_turns,
            generator: FallbackGenerator::new(client),
        }
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    /// Apply one action to the session.
    pub async fn handle(
        &self,
        action: UserAction,
        state: &mut SessionState,
    ) -> AppResult<Vec<RenderCommand>> {
        debug!(session_id = %state.id, action = ?action, "Handling action");

        let commands = match action {
            UserAction::NextQuestion { style } => self.next_question(state, style)?,
            UserAction::SubmitAnswer {
                question_id,
                answer,
            } => self.submit_answer(state, QuestionId(question_id), &answer)?,
            UserAction::StartRetry => self.start_retry(state)?,
            UserAction::StopRetry => {
                state.quiz.stop_retry();
                vec![RenderCommand::notice(
                    NoticeLevel::Info,
                    "오답 복습을 멈췄어요. 새 문제로 돌아갈게요.",
                )]
            }
            UserAction::ResetQuiz => {
                state.quiz.reset();
                vec![RenderCommand::notice(NoticeLevel::Info, "퀴즈 기록을 모두 지웠어요.")]
            }
            UserAction::ShowStats => vec![self.stats(state)],
            UserAction::ShowMistakes => self.mistakes(state),
            UserAction::ClearMistakes => {
                state.quiz.clear_mistakes();
                vec![RenderCommand::notice(NoticeLevel::Info, "오답 노트를 비웠어요.")]
            }
            UserAction::SearchRules { term } => self.search_rules(&term),
            UserAction::ShowRules { category } => self.show_rules(category),
            UserAction::Chat { message } => chat::respond(self, state, &message).await?,
            UserAction::ExplainMistake => chat::explain_last_mistake(self, state).await?,
            UserAction::ShowModels { refresh } => chat::show_models(self, state, refresh).await?,
        };

        state.touch();
        Ok(commands)
    }

    fn next_question(
        &self,
        state: &mut SessionState,
        style: ChoiceStyle,
    ) -> AppResult<Vec<RenderCommand>> {
        let presented = state.quiz.next_question(&self.bank, &mut rand::thread_rng())?;

        let mut commands = Vec::new();
        if presented.retry_completed {
            commands.push(RenderCommand::notice(
                NoticeLevel::Success,
                "오답 복습을 모두 마쳤어요! 이제 새 문제를 풀어 봐요.",
            ));
        }

        let question = presented.question;
        commands.push(RenderCommand::Question {
            question_id: question.id,
            choices: answer_choices(&question, state.seed, style),
            prompt: question.prompt,
            category: question.category,
            is_retry: presented.is_retry,
        });
        Ok(commands)
    }

    fn submit_answer(
        &self,
        state: &mut SessionState,
        question_id: QuestionId,
        answer: &str,
    ) -> AppResult<Vec<RenderCommand>> {
        let record = state.quiz.submit_answer(question_id, answer)?;

        info!(
            session_id = %state.id,
            question_id = %question_id,
            is_correct = record.is_correct,
            "Answer judged"
        );

        let message = if record.is_correct {
            "정답이에요! 🎉".to_string()
        } else {
            format!(
                "아쉬워요. 정답은 '{}'입니다. 다음엔 꼭 맞힐 수 있을 거예요! 💪",
                record.question.correct_answer
            )
        };

        let rules = if record.is_correct {
            Vec::new()
        } else {
            self.rules
                .for_category(record.question.category)
                .into_iter()
                .cloned()
                .collect()
        };

        Ok(vec![RenderCommand::Feedback {
            is_correct: record.is_correct,
            chosen_answer: record.chosen_answer,
            correct_answer: record.question.correct_answer,
            message,
            rules,
        }])
    }

    fn start_retry(&self, state: &mut SessionState) -> AppResult<Vec<RenderCommand>> {
        match state.quiz.start_retry() {
            Ok(()) => {
                let pending = state.quiz.incorrect.live_count();
                let mut commands = vec![RenderCommand::notice(
                    NoticeLevel::Info,
                    format!("틀린 문제 {}개를 다시 풀어 봐요.", pending),
                )];
                commands.extend(self.next_question(state, ChoiceStyle::Quiz)?);
                Ok(commands)
            }
            Err(QuizError::NoMistakes) => Ok(vec![RenderCommand::notice(
                NoticeLevel::Warning,
                "다시 풀 오답이 없어요. 먼저 퀴즈를 풀어 보세요!",
            )]),
            Err(e) => Err(e.into()),
        }
    }

    fn stats(&self, state: &SessionState) -> RenderCommand {
        let stats = state.quiz.stats;
        let text = if stats.total == 0 {
            "아직 푼 퀴즈가 없어요. 첫 문제를 풀어 볼까요?".to_string()
        } else {
            format!(
                "**푼 퀴즈 수**: {}개\n**맞힌 개수**: {}개\n**정답률**: {:.1}%\n**성장 단계**: {}\n**남은 오답**: {}개",
                stats.total,
                stats.correct,
                stats.accuracy(),
                stats.growth_stage().label(),
                state.quiz.incorrect.live_count(),
            )
        };
        RenderCommand::Markdown { text }
    }

    fn mistakes(&self, state: &SessionState) -> Vec<RenderCommand> {
        if state.quiz.history.is_empty() {
            return vec![RenderCommand::notice(
                NoticeLevel::Info,
                "아직 기록된 오답이 없어요.",
            )];
        }

        let rows = state
            .quiz
            .history
            .iter()
            .map(|r| {
                vec![
                    r.question.prompt.clone(),
                    r.chosen_answer.clone(),
                    r.question.correct_answer.clone(),
                    r.question.category.label().to_string(),
                ]
            })
            .collect();

        let counts = state
            .quiz
            .mistakes_by_category()
            .into_iter()
            .map(|(category, count)| vec![category.label().to_string(), count.to_string()])
            .collect();

        vec![
            RenderCommand::Table {
                title: "오답 노트".to_string(),
                headers: vec![
                    "문제".to_string(),
                    "고른 답".to_string(),
                    "정답".to_string(),
                    "유형".to_string(),
                ],
                rows,
            },
            RenderCommand::Table {
                title: "자주 틀리는 유형".to_string(),
                headers: vec!["유형".to_string(), "틀린 횟수".to_string()],
                rows: counts,
            },
        ]
    }

    fn search_rules(&self, term: &str) -> Vec<RenderCommand> {
        let found = self.rules.search(term);
        if found.is_empty() {
            return vec![RenderCommand::notice(
                NoticeLevel::Info,
                format!("'{}'에 대한 규칙을 찾지 못했어요.", term.trim()),
            )];
        }
        vec![RenderCommand::Markdown {
            text: render_rules(&found),
        }]
    }

    fn show_rules(&self, category: Option<RuleCategory>) -> Vec<RenderCommand> {
        let rules: Vec<&GrammarRule> = match category {
            Some(category) => self.rules.for_category(category),
            None => self.rules.rules().iter().collect(),
        };
        vec![RenderCommand::Markdown {
            text: render_rules(&rules),
        }]
    }

    fn candidates_table(candidates: &[ModelCandidate]) -> RenderCommand {
        RenderCommand::Table {
            title: "사용할 모델 후보".to_string(),
            headers: vec![
                "순위".to_string(),
                "API 버전".to_string(),
                "모델".to_string(),
            ],
            rows: candidates
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    vec![
                        (i + 1).to_string(),
                        c.api_version.clone(),
                        c.model_name.clone(),
                    ]
                })
                .collect(),
        }
    }
}

fn render_rules(rules: &[&GrammarRule]) -> String {
    rules
        .iter()
        .map(|rule| {
            format!(
                "### [{}] {}\n{}\n- ❌ {}\n- ⭕ {}",
                rule.category.label(),
                rule.principle,
                rule.explanation,
                rule.wrong_example,
                rule.correct_example
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use crate::quiz::{Question, QuestionId};

    fn engine_with_bank(bank: QuestionBank) -> TutorEngine {
        let config = Config::default();
        let client = GeminiClient::new(&config.gemini, RequestConfig::default()).unwrap();
        TutorEngine::new(&config, bank, client)
    }

    fn single_question_bank() -> QuestionBank {
        QuestionBank::from_questions(vec![Question {
            id: QuestionId(1),
            prompt: "오늘은 밥을 ___ 먹었어요.".to_string(),
            correct_answer: "안".to_string(),
            distractors: vec!["않".to_string()],
            category: RuleCategory::AnAnh,
        }])
    }

    #[tokio::test]
    async fn test_next_question_renders_choices() {
        let engine = engine_with_bank(single_question_bank());
        let mut state = SessionState::with_id("s1").with_seed(3);

        let commands = engine
            .handle(
                UserAction::NextQuestion {
                    style: ChoiceStyle::Chat,
                },
                &mut state,
            )
            .await
            .unwrap();

        match &commands[0] {
            RenderCommand::Question {
                question_id,
                choices,
                is_retry,
                ..
            } => {
                assert_eq!(*question_id, QuestionId(1));
                assert_eq!(choices.len(), 3);
                assert!(!is_retry);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_answer_feedback_includes_rules() {
        let engine = engine_with_bank(single_question_bank());
        let mut state = SessionState::with_id("s1");

        engine
            .handle(UserAction::NextQuestion { style: ChoiceStyle::Quiz }, &mut state)
            .await
            .unwrap();
        let commands = engine
            .handle(
                UserAction::SubmitAnswer {
                    question_id: 1,
                    answer: "않".to_string(),
                },
                &mut state,
            )
            .await
            .unwrap();

        match &commands[0] {
            RenderCommand::Feedback {
                is_correct, rules, ..
            } => {
                assert!(!is_correct);
                assert!(!rules.is_empty());
                assert!(rules.iter().all(|r| r.category == RuleCategory::AnAnh));
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(state.quiz.incorrect.live_count(), 1);
    }

    #[tokio::test]
    async fn test_start_retry_without_mistakes_is_a_warning() {
        let engine = engine_with_bank(single_question_bank());
        let mut state = SessionState::with_id("s1");

        let commands = engine.handle(UserAction::StartRetry, &mut state).await.unwrap();
        assert!(matches!(
            commands[0],
            RenderCommand::Notice {
                level: NoticeLevel::Warning,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_submit_without_question_fails() {
        let engine = engine_with_bank(single_question_bank());
        let mut state = SessionState::with_id("s1");

        let result = engine
            .handle(
                UserAction::SubmitAnswer {
                    question_id: 1,
                    answer: "안".to_string(),
                },
                &mut state,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_search_rules_unknown_term() {
        let engine = engine_with_bank(QuestionBank::builtin());
        let mut state = SessionState::with_id("s1");

        let commands = engine
            .handle(
                UserAction::SearchRules {
                    term: "zzz".to_string(),
                },
                &mut state,
            )
            .await
            .unwrap();
        assert!(matches!(commands[0], RenderCommand::Notice { .. }));
    }

    #[tokio::test]
    async fn test_show_rules_for_category() {
        let engine = engine_with_bank(QuestionBank::builtin());
        let mut state = SessionState::with_id("s1");

        let commands = engine
            .handle(
                UserAction::ShowRules {
                    category: Some(RuleCategory::IeyoYeyo),
                },
                &mut state,
            )
            .await
            .unwrap();
        match &commands[0] {
            RenderCommand::Markdown { text } => {
                assert!(text.contains("이에요/예요"));
                assert!(!text.contains("[안/않]"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_action_deserialization() {
        let action: UserAction =
            serde_json::from_str(r#"{"action": "submit_answer", "question_id": 3, "answer": "돼"}"#)
                .unwrap();
        assert_eq!(
            action,
            UserAction::SubmitAnswer {
                question_id: 3,
                answer: "돼".to_string()
            }
        );

        let action: UserAction = serde_json::from_str(r#"{"action": "next_question"}"#).unwrap();
        assert_eq!(
            action,
            UserAction::NextQuestion {
                style: ChoiceStyle::Quiz
            }
        );
    }

    #[test]
    fn test_render_command_serialization() {
        let value = serde_json::to_value(RenderCommand::notice(NoticeLevel::Warning, "x")).unwrap();
        assert_eq!(value["type"], "notice");
        assert_eq!(value["level"], "warning");
    }
}
