use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{Question, QuestionId, RuleCategory};
use crate::config::TutorConfig;
use crate::error::{AppError, AppResult, QuizError, QuizResult};

/// A question as written in a bank file, before an id is assigned.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionSpec {
    pub prompt: String,
    pub correct_answer: String,
    pub distractors: Vec<String>,
    pub category: RuleCategory,
}

/// Built-in questions: (category, prompt, correct answer, distractors)
const BUILTIN_QUESTIONS: &[(RuleCategory, &str, &str, &[&str])] = &[
    (
        RuleCategory::DeDae,
        "친구한테 들었는데, 내일 시험이 취소됐___.",
        "대",
        &["데"],
    ),
    (
        RuleCategory::DeDae,
        "어제 직접 가 봤는데 그 식당 정말 맛있___.",
        "데",
        &["대"],
    ),
    (
        RuleCategory::DeDae,
        "뉴스에서 그러는데 오늘 비가 온___.",
        "대",
        &["데"],
    ),
    (
        RuleCategory::IeyoYeyo,
        "저는 학생___.",
        "이에요",
        &["예요"],
    ),
    (
        RuleCategory::IeyoYeyo,
        "이것은 사과___.",
        "예요",
        &["이에요"],
    ),
    (
        RuleCategory::IeyoYeyo,
        "괜찮아요, 제 잘못이 ___.",
        "아니에요",
        &["아니예요"],
    ),
    (
        RuleCategory::EotteokhaeEotteoke,
        "지갑을 잃어버렸어. ___!",
        "어떡해",
        &["어떻게"],
    ),
    (
        RuleCategory::EotteokhaeEotteoke,
        "학교에 ___ 가요?",
        "어떻게",
        &["어떡해"],
    ),
    (
        RuleCategory::EotteokhaeEotteoke,
        "이 문제는 ___ 풀어야 할까?",
        "어떻게",
        &["어떡해"],
    ),
    (
        RuleCategory::DoeDwae,
        "그러면 안 ___.",
        "돼",
        &["되"],
    ),
    (
        RuleCategory::DoeDwae,
        "저는 선생님이 ___고 싶어요.",
        "되",
        &["돼"],
    ),
    (
        RuleCategory::DoeDwae,
        "여기 앉아도 ___요?",
        "돼",
        &["되"],
    ),
    (
        RuleCategory::AnAnh,
        "오늘은 밥을 ___ 먹었어요.",
        "안",
        &["않"],
    ),
    (
        RuleCategory::AnAnh,
        "숙제를 하지 ___았어요.",
        "않",
        &["안"],
    ),
    (
        RuleCategory::AnAnh,
        "그렇게 하면 ___ 돼요.",
        "안",
        &["않"],
    ),
];

/// An ordered, immutable set of questions with stable ids.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Wrap already-identified questions without validation.
    pub fn from_questions(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// The bank that ships with the tutor.
    pub fn builtin() -> Self {
        let questions = BUILTIN_QUESTIONS
            .iter()
            .zip(1u32..)
            .map(|((category, prompt, answer, distractors), id)| Question {
                id: QuestionId(id),
                prompt: (*prompt).to_string(),
                correct_answer: (*answer).to_string(),
                distractors: distractors.iter().map(|d| (*d).to_string()).collect(),
                category: *category,
            })
            .collect();
        Self { questions }
    }

    /// Validate specs and assign ids `1..=n` in file order.
    pub fn from_specs(specs: Vec<QuestionSpec>) -> QuizResult<Self> {
        if specs.is_empty() {
            return Err(QuizError::EmptyBank);
        }

        let mut questions = Vec::with_capacity(specs.len());
        for (index, spec) in specs.into_iter().enumerate() {
            validate_spec(index, &spec)?;
            questions.push(Question {
                id: QuestionId(index as u32 + 1),
                prompt: spec.prompt.trim().to_string(),
                correct_answer: spec.correct_answer.trim().to_string(),
                distractors: spec
                    .distractors
                    .iter()
                    .map(|d| d.trim().to_string())
                    .collect(),
                category: spec.category,
            });
        }

        Ok(Self { questions })
    }

    /// Parse a JSON array of question specs.
    pub fn from_json(json: &str) -> QuizResult<Self> {
        let specs: Vec<QuestionSpec> =
            serde_json::from_str(json).map_err(|e| QuizError::InvalidBank {
                index: 0,
                reason: format!("not a JSON list of questions: {}", e),
            })?;
        Self::from_specs(specs)
    }

    /// Load a bank file from disk.
    pub fn load(path: &Path) -> AppResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| AppError::Config {
            message: format!("Cannot read question bank {}: {}", path.display(), e),
        })?;
        let bank = Self::from_json(&json)?;
        info!(path = %path.display(), questions = bank.len(), "Question bank loaded");
        Ok(bank)
    }

    /// The configured bank file, or the built-in bank.
    pub fn from_config(config: &TutorConfig) -> AppResult<Self> {
        match &config.question_bank_path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn get(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Number of questions per category.
    pub fn count_by_category(&self) -> BTreeMap<RuleCategory, usize> {
        let mut counts = BTreeMap::new();
        for question in &self.questions {
            *counts.entry(question.category).or_insert(0) += 1;
        }
        counts
    }
}

fn validate_spec(index: usize, spec: &QuestionSpec) -> QuizResult<()> {
    let invalid = |reason: &str| QuizError::InvalidBank {
        index,
        reason: reason.to_string(),
    };

    if spec.prompt.trim().is_empty() {
        return Err(invalid("prompt is empty"));
    }
    let answer = spec.correct_answer.trim();
    if answer.is_empty() {
        return Err(invalid("correct_answer is empty"));
    }
    if spec.distractors.is_empty() {
        return Err(invalid("at least one distractor is required"));
    }
    if spec
        .distractors
        .iter()
        .any(|d| d.trim().is_empty() || d.trim() == answer)
    {
        return Err(invalid("distractors must be non-empty and differ from the answer"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_bank_covers_every_category() {
        let bank = QuestionBank::builtin();
        let counts = bank.count_by_category();
        for category in RuleCategory::ALL {
            assert!(counts.get(&category).copied().unwrap_or(0) > 0, "{}", category);
        }
    }

    #[test]
    fn test_builtin_bank_is_valid() {
        let bank = QuestionBank::builtin();
        for (i, question) in bank.questions().iter().enumerate() {
            assert_eq!(question.id, QuestionId(i as u32 + 1));
            assert!(!question.distractors.is_empty());
            assert!(!question.distractors.contains(&question.correct_answer));
        }
    }

    #[test]
    fn test_from_json_assigns_sequential_ids() {
        let json = r#"[
            {"prompt": "저는 학생___.", "correct_answer": "이에요", "distractors": ["예요"], "category": "ieyo_yeyo"},
            {"prompt": "안 ___.", "correct_answer": " 돼 ", "distractors": ["되"], "category": "doe_dwae"}
        ]"#;
        let bank = QuestionBank::from_json(json).unwrap();

        assert_eq!(bank.len(), 2);
        assert_eq!(bank.questions()[1].id, QuestionId(2));
        assert_eq!(bank.questions()[1].correct_answer, "돼");
        assert_eq!(bank.get(QuestionId(1)).unwrap().category, RuleCategory::IeyoYeyo);
        assert!(bank.get(QuestionId(3)).is_none());
    }

    #[test]
    fn test_from_json_rejects_missing_distractors() {
        let json = r#"[{"prompt": "p", "correct_answer": "a", "distractors": [], "category": "an_anh"}]"#;
        let err = QuestionBank::from_json(json).unwrap_err();
        assert!(matches!(err, QuizError::InvalidBank { index: 0, .. }));
    }

    #[test]
    fn test_from_json_rejects_distractor_equal_to_answer() {
        let json = r#"[
            {"prompt": "p", "correct_answer": "a", "distractors": ["b"], "category": "an_anh"},
            {"prompt": "q", "correct_answer": "a", "distractors": ["a "], "category": "an_anh"}
        ]"#;
        let err = QuestionBank::from_json(json).unwrap_err();
        assert!(matches!(err, QuizError::InvalidBank { index: 1, .. }));
    }

    #[test]
    fn test_from_json_rejects_empty_list() {
        assert!(matches!(
            QuestionBank::from_json("[]"),
            Err(QuizError::EmptyBank)
        ));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        assert!(QuestionBank::from_json("{").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"prompt": "p", "correct_answer": "안", "distractors": ["않"], "category": "an_anh"}}]"#
        )
        .unwrap();

        let bank = QuestionBank::load(file.path()).unwrap();
        assert_eq!(bank.len(), 1);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = QuestionBank::load(Path::new("/nonexistent/bank.json")).unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
    }

    #[test]
    fn test_from_config_defaults_to_builtin() {
        let bank = QuestionBank::from_config(&TutorConfig::default()).unwrap();
        assert_eq!(bank.len(), QuestionBank::builtin().len());
    }
}
