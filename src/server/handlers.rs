use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{info, warn};

use super::SharedState;
use crate::error::{McpError, McpResult, ToolError};
use crate::quiz::{ChoiceStyle, RuleCategory};
use crate::session::SessionState;
use crate::storage::Storage;
use crate::tutor::UserAction;

/// Arguments accepted by the tutor tools. Each tool reads the fields it needs.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolArgs {
    session_id: Option<String>,
    style: Option<ChoiceStyle>,
    question_id: Option<u32>,
    answer: Option<String>,
    stop: bool,
    clear: bool,
    term: Option<String>,
    category: Option<RuleCategory>,
    message: Option<String>,
    refresh: bool,
}

/// Route tool calls to the tutor engine
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    let args: ToolArgs = parse_arguments(tool_name, arguments)?;
    let action = to_action(tool_name, &args)?;
    let start = Instant::now();

    let result = run_action(state, args.session_id, action).await;

    match &result {
        Ok(_) => info!(
            tool = %tool_name,
            latency_ms = start.elapsed().as_millis(),
            "Tool call completed"
        ),
        Err(e) => warn!(tool = %tool_name, error = %e, "Tool call failed"),
    }
    result
}

fn to_action(tool_name: &str, args: &ToolArgs) -> McpResult<UserAction> {
    let action = match tool_name {
        "tutor_quiz_next" => UserAction::NextQuestion {
            style: args.style.unwrap_or_default(),
        },
        "tutor_quiz_answer" => UserAction::SubmitAnswer {
            question_id: require(tool_name, "question_id", args.question_id)?,
            answer: require(tool_name, "answer", args.answer.clone())?,
        },
        "tutor_quiz_retry" if args.stop => UserAction::StopRetry,
        "tutor_quiz_retry" => UserAction::StartRetry,
        "tutor_quiz_reset" => UserAction::ResetQuiz,
        "tutor_stats" => UserAction::ShowStats,
        "tutor_mistakes" if args.clear => UserAction::ClearMistakes,
        "tutor_mistakes" => UserAction::ShowMistakes,
        "tutor_rules" => match &args.term {
            Some(term) if !term.trim().is_empty() => UserAction::SearchRules { term: term.clone() },
            _ => UserAction::ShowRules {
                category: args.category,
            },
        },
        "tutor_chat" => UserAction::Chat {
            message: require(tool_name, "message", args.message.clone())?,
        },
        "tutor_explain" => UserAction::ExplainMistake,
        "tutor_models" => UserAction::ShowModels {
            refresh: args.refresh,
        },
        _ => {
            return Err(McpError::UnknownTool {
                tool_name: tool_name.to_string(),
            })
        }
    };
    Ok(action)
}

/// Load the session (or start one), apply the action and persist the result.
async fn run_action(
    state: &SharedState,
    session_id: Option<String>,
    action: UserAction,
) -> McpResult<Value> {
    let mut session = load_or_create_session(state, session_id).await?;

    let commands = state
        .engine
        .handle(action, &mut session)
        .await
        .map_err(McpError::from)?;

    state
        .storage
        .save_session(&session)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: format!("Failed to save session: {}", e),
        })?;

    Ok(json!({
        "session_id": session.id,
        "commands": commands,
    }))
}

async fn load_or_create_session(
    state: &SharedState,
    session_id: Option<String>,
) -> McpResult<SessionState> {
    let Some(id) = session_id.filter(|id| !id.trim().is_empty()) else {
        let session = SessionState::new();
        info!(session_id = %session.id, "New session started");
        return Ok(session);
    };

    let stored = state
        .storage
        .get_session(&id)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: ToolError::Session(e.to_string()).to_string(),
        })?;

    Ok(stored.unwrap_or_else(|| {
        info!(session_id = %id, "Unknown session id, starting it fresh");
        SessionState::with_id(id)
    }))
}

fn require<T>(tool_name: &str, field: &str, value: Option<T>) -> McpResult<T> {
    value.ok_or_else(|| McpError::InvalidParameters {
        tool_name: tool_name.to_string(),
        message: ToolError::Validation {
            field: field.to_string(),
            reason: "is required".to_string(),
        }
        .to_string(),
    })
}

/// Parse tool arguments. Missing arguments mean "all defaults".
fn parse_arguments<T: serde::de::DeserializeOwned + Default>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(Value::Null) | None => Ok(T::default()),
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> ToolArgs {
        parse_arguments("test", Some(value)).unwrap()
    }

    #[test]
    fn test_missing_arguments_default() {
        let args: ToolArgs = parse_arguments("tutor_stats", None).unwrap();
        assert!(args.session_id.is_none());
        assert!(!args.refresh);
    }

    #[test]
    fn test_invalid_argument_types() {
        let result: McpResult<ToolArgs> =
            parse_arguments("tutor_quiz_answer", Some(json!({"question_id": "three"})));
        assert!(matches!(result, Err(McpError::InvalidParameters { .. })));
    }

    #[test]
    fn test_answer_requires_fields() {
        let err = to_action("tutor_quiz_answer", &args(json!({"question_id": 1}))).unwrap_err();
        assert!(err.to_string().contains("answer"));
    }

    #[test]
    fn test_retry_and_mistakes_flags() {
        assert_eq!(
            to_action("tutor_quiz_retry", &args(json!({"stop": true}))).unwrap(),
            UserAction::StopRetry
        );
        assert_eq!(
            to_action("tutor_quiz_retry", &ToolArgs::default()).unwrap(),
            UserAction::StartRetry
        );
        assert_eq!(
            to_action("tutor_mistakes", &args(json!({"clear": true}))).unwrap(),
            UserAction::ClearMistakes
        );
    }

    #[test]
    fn test_rules_prefers_search_term() {
        assert_eq!(
            to_action("tutor_rules", &args(json!({"term": "돼", "category": "an_anh"}))).unwrap(),
            UserAction::SearchRules {
                term: "돼".to_string()
            }
        );
        assert_eq!(
            to_action("tutor_rules", &args(json!({"category": "an_anh"}))).unwrap(),
            UserAction::ShowRules {
                category: Some(RuleCategory::AnAnh)
            }
        );
    }

    #[test]
    fn test_unknown_tool() {
        let err = to_action("tutor_homework", &ToolArgs::default()).unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
    }
}
