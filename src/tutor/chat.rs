//! Chat, mistake explanations and model listing.

use tracing::{info, warn};

use super::{NoticeLevel, RenderCommand, TutorEngine};
use crate::config::GenerationSettings;
use crate::error::{AppResult, ToolError};
use crate::gemini::{
    list_available_candidates, Content, GenerateContentRequest, GenerationConfig,
    GenerationOutcome, ModelCandidate, Role,
};
use crate::prompts::{mistake_explanation_message, MISTAKE_EXPLANATION_PROMPT, TUTOR_SYSTEM_PROMPT};
use crate::session::{ChatRole, ChatTurn, SessionState};

/// Convert transcript turns into API contents, merging consecutive turns of
/// the same role. Leading assistant turns are dropped so the conversation
/// starts with the user.
pub fn merge_turns(turns: &[ChatTurn]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::new();

    for turn in turns
        .iter()
        .skip_while(|t| t.role == ChatRole::Assistant)
    {
        let role = match turn.role {
            ChatRole::User => Role::User,
            ChatRole::Assistant => Role::Model,
        };

        match contents.last_mut() {
            Some(last) if last.role == Some(role) => {
                if let Some(part) = last.parts.last_mut() {
                    part.text.push_str("\n\n");
                    part.text.push_str(&turn.text);
                }
            }
            _ => contents.push(match role {
                Role::User => Content::user(turn.text.clone()),
                Role::Model => Content::model(turn.text.clone()),
            }),
        }
    }

    contents
}

/// Build the chat payload from recent turns.
pub fn build_chat_request(turns: &[ChatTurn], settings: &GenerationSettings) -> GenerateContentRequest {
    GenerateContentRequest::new(merge_turns(turns))
        .with_system_instruction(TUTOR_SYSTEM_PROMPT)
        .with_generation_config(GenerationConfig::from(settings))
}

/// Cached candidates, discovering them on first use.
async fn ensure_candidates(
    engine: &TutorEngine,
    state: &mut SessionState,
    refresh: bool,
) -> AppResult<Vec<ModelCandidate>> {
    engine.gemini_config.require_api_key()?;

    if !refresh {
        if let Some(candidates) = &state.model_candidates {
            return Ok(candidates.clone());
        }
    }

    let candidates = list_available_candidates(
        engine.generator.transport(),
        &engine.gemini_config.api_versions,
    )
    .await;
    info!(session_id = %state.id, count = candidates.len(), "Model candidates cached");
    state.model_candidates = Some(candidates.clone());
    Ok(candidates)
}

fn chat_message(outcome: GenerationOutcome) -> RenderCommand {
    RenderCommand::ChatMessage {
        role: ChatRole::Assistant,
        diagnostic: outcome.is_diagnostic(),
        model: outcome
            .answered_by
            .map(|(candidate, _)| candidate.to_string()),
        text: outcome.text,
    }
}

pub(super) async fn respond(
    engine: &TutorEngine,
    state: &mut SessionState,
    message: &str,
) -> AppResult<Vec<RenderCommand>> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ToolError::Validation {
            field: "message".to_string(),
            reason: "cannot be empty".to_string(),
        }
        .into());
    }

    let candidates = ensure_candidates(engine, state, false).await?;

    state.transcript.push(ChatTurn::user(message));
    let request = build_chat_request(
        state.recent_turns(engine.chat_history_turns),
        &engine.generation,
    );

    let outcome = engine.generator.generate_text(&request, &candidates).await;
    if outcome.is_diagnostic() {
        // The failed question is dropped so a retry starts clean.
        state.transcript.pop();
        warn!(session_id = %state.id, "Chat reply is a diagnostic, not recorded");
    } else {
        state.transcript.push(ChatTurn::assistant(outcome.text.clone()));
    }

    Ok(vec![chat_message(outcome)])
}

pub(super) async fn explain_last_mistake(
    engine: &TutorEngine,
    state: &mut SessionState,
) -> AppResult<Vec<RenderCommand>> {
    let Some(record) = state.quiz.last_mistake().cloned() else {
        return Ok(vec![RenderCommand::notice(
            NoticeLevel::Info,
            "설명할 오답이 없어요. 먼저 퀴즈를 풀어 보세요!",
        )]);
    };

    let candidates = ensure_candidates(engine, state, false).await?;

    let rules = engine.rules.for_category(record.question.category);
    let request = GenerateContentRequest::new(vec![Content::user(mistake_explanation_message(
        &record, &rules,
    ))])
    .with_system_instruction(MISTAKE_EXPLANATION_PROMPT)
    .with_generation_config(GenerationConfig::from(&engine.generation));

    let outcome = engine.generator.generate_text(&request, &candidates).await;
    Ok(vec![chat_message(outcome)])
}

pub(super) async fn show_models(
    engine: &TutorEngine,
    state: &mut SessionState,
    refresh: bool,
) -> AppResult<Vec<RenderCommand>> {
    let candidates = ensure_candidates(engine, state, refresh).await?;
    Ok(vec![TutorEngine::candidates_table(&candidates)])
}
