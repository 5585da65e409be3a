//! Centralized prompt definitions for the tutor
//!
//! System instructions and prompt builders sent to the generation API.

use crate::quiz::{AttemptRecord, GrammarRule};

/// System instruction for free-form tutoring chat.
pub const TUTOR_SYSTEM_PROMPT: &str = r#"당신은 초등학생을 돕는 친절한 한국어 맞춤법 선생님입니다.

다루는 규칙:
- 데/대 (직접 겪은 일 vs 전해 들은 일)
- 이에요/예요 (받침 유무, '아니에요')
- 어떡해/어떻게 (감탄 vs 방법)
- 되/돼 ('되어'의 준말)
- 안/않 (부사 vs '-지 않다')

Guidelines:
- 짧고 쉬운 문장으로, 존댓말로 대답하세요
- 틀린 표현과 맞는 표현을 예문으로 나란히 보여 주세요
- 규칙의 이름보다 바꿔 보기 요령(예: '해'를 넣어 보기)을 먼저 알려 주세요
- 맞춤법과 관계없는 질문에는 정중히 맞춤법 이야기로 돌아오세요
- 확실하지 않은 내용은 지어내지 마세요"#;

/// System instruction for explaining a wrong quiz answer.
pub const MISTAKE_EXPLANATION_PROMPT: &str = r#"You are a patient Korean spelling tutor for children.

A learner answered a multiple-choice spelling question incorrectly.
Explain in Korean, in at most five short sentences:
- why the chosen answer is wrong
- why the correct answer is right
- one easy trick to tell them apart next time

Do not repeat the whole question. Be encouraging."#;

/// Model turn that follows an instruction sent as a leading user turn.
pub const INSTRUCTION_ACKNOWLEDGEMENT: &str = "네, 알겠어요! 그렇게 도와줄게요.";

/// Build the user message asking why an answer was wrong.
pub fn mistake_explanation_message(record: &AttemptRecord, rules: &[&GrammarRule]) -> String {
    let mut message = format!(
        "문제: {}\n고른 답: {}\n정답: {}\n규칙 분류: {}",
        record.question.prompt,
        record.chosen_answer,
        record.question.correct_answer,
        record.question.category.label(),
    );

    if !rules.is_empty() {
        message.push_str("\n\n참고 규칙:");
        for rule in rules {
            message.push_str(&format!("\n- {}: {}", rule.principle, rule.explanation));
        }
    }

    message
}
