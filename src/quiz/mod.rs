//! Question bank, grammar rules and quiz progression.

mod bank;
mod progression;
mod rules;

pub use bank::{QuestionBank, QuestionSpec};
pub use progression::{
    answer_choices, pick_fresh_question, pick_retry_question, record_answer, AskedSet,
    ChoiceStyle, CurrentQuestion, GrowthStage, IncorrectEntry, IncorrectQueue,
    PresentedQuestion, QuizMode, QuizProgress, QuizStats, UNSURE_CHOICE,
};
pub use rules::{GrammarRule, RuleBook};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable question identifier, assigned sequentially when a bank is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub u32);

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The five spelling rule families covered by the tutor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// 데 (direct experience) vs 대 (hearsay)
    DeDae,
    /// 이에요 after a final consonant, 예요 after a vowel
    IeyoYeyo,
    /// 어떡해 (exclamation) vs 어떻게 (how)
    EotteokhaeEotteoke,
    /// 되 vs 돼 (되어)
    DoeDwae,
    /// 안 (adverb) vs 않 (auxiliary stem)
    AnAnh,
}

impl RuleCategory {
    /// Every category in display order.
    pub const ALL: [RuleCategory; 5] = [
        RuleCategory::DeDae,
        RuleCategory::IeyoYeyo,
        RuleCategory::EotteokhaeEotteoke,
        RuleCategory::DoeDwae,
        RuleCategory::AnAnh,
    ];

    /// Human-facing label, e.g. `데/대`.
    pub fn label(&self) -> &'static str {
        match self {
            RuleCategory::DeDae => "데/대",
            RuleCategory::IeyoYeyo => "이에요/예요",
            RuleCategory::EotteokhaeEotteoke => "어떡해/어떻게",
            RuleCategory::DoeDwae => "되/돼",
            RuleCategory::AnAnh => "안/않",
        }
    }
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleCategory::DeDae => write!(f, "de_dae"),
            RuleCategory::IeyoYeyo => write!(f, "ieyo_yeyo"),
            RuleCategory::EotteokhaeEotteoke => write!(f, "eotteokhae_eotteoke"),
            RuleCategory::DoeDwae => write!(f, "doe_dwae"),
            RuleCategory::AnAnh => write!(f, "an_anh"),
        }
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    /// Accepts either the snake_case key or the Korean label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        RuleCategory::ALL
            .into_iter()
            .find(|c| c.to_string() == s.to_lowercase() || c.label() == s)
            .ok_or_else(|| format!("Unknown rule category: {}", s))
    }
}

/// A multiple-choice spelling question. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    pub correct_answer: String,
    pub distractors: Vec<String>,
    pub category: RuleCategory,
}

/// One submitted answer. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub question: Question,
    pub chosen_answer: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}
