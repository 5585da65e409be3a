//! Quiz progression: fresh draws, the incorrect-answer retry queue and
//! answer judging.
//!
//! Fresh questions are drawn without repetition until the whole bank has been
//! seen, then the asked-set starts over. Wrong answers are queued; retry mode
//! walks the queue and tombstones an entry once it is answered correctly, so
//! queue indices stay stable while the cursor moves.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bank::QuestionBank;
use super::{AttemptRecord, Question, QuestionId, RuleCategory};
use crate::error::{QuizError, QuizResult};

/// Extra choice offered in chat style.
pub const UNSURE_CHOICE: &str = "모르겠어요";

/// Mixes the question id into the session seed.
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// A wrongly answered question waiting to be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncorrectEntry {
    pub question: Question,
    pub wrong_answer: String,
}

/// Arena of incorrect answers. Removal leaves a tombstone in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncorrectQueue {
    entries: Vec<Option<IncorrectEntry>>,
    live: usize,
}

impl IncorrectQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; returns its slot index.
    pub fn push(&mut self, entry: IncorrectEntry) -> usize {
        self.entries.push(Some(entry));
        self.live += 1;
        self.entries.len() - 1
    }

    /// Whether a live entry exists for the question.
    pub fn contains_live(&self, id: QuestionId) -> bool {
        self.position_of(id).is_some()
    }

    /// Slot of the live entry for the question.
    pub fn position_of(&self, id: QuestionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e, Some(entry) if entry.question.id == id))
    }

    /// Tombstone a slot. Returns the removed entry, `None` if already dead.
    pub fn tombstone(&mut self, index: usize) -> Option<IncorrectEntry> {
        let removed = self.entries.get_mut(index)?.take();
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    /// The live entry at `index`.
    pub fn get(&self, index: usize) -> Option<&IncorrectEntry> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.live = 0;
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of slots, dead or alive.
    pub fn slots(&self) -> usize {
        self.entries.len()
    }

    pub fn iter_live(&self) -> impl Iterator<Item = &IncorrectEntry> {
        self.entries.iter().flatten()
    }
}

/// Question ids drawn in the current cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AskedSet(BTreeSet<QuestionId>);

impl AskedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: QuestionId) -> bool {
        self.0.contains(&id)
    }

    pub fn insert(&mut self, id: QuestionId) -> bool {
        self.0.insert(id)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where the next question comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QuizMode {
    #[default]
    Fresh,
    Retry { cursor: usize },
}

/// Growth stage shown for an accuracy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Sprout,
    Tree,
    Forest,
}

impl GrowthStage {
    /// Below 30 % sprout, below 70 % tree, otherwise forest.
    pub fn for_accuracy(accuracy: f64) -> Self {
        if accuracy < 30.0 {
            GrowthStage::Sprout
        } else if accuracy < 70.0 {
            GrowthStage::Tree
        } else {
            GrowthStage::Forest
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GrowthStage::Sprout => "🌱 새싹",
            GrowthStage::Tree => "🌳 나무",
            GrowthStage::Forest => "🌲🌳 숲",
        }
    }
}

/// Running answer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizStats {
    pub correct: u32,
    pub total: u32,
}

impl QuizStats {
    pub fn record(&mut self, is_correct: bool) {
        self.total += 1;
        if is_correct {
            self.correct += 1;
        }
    }

    /// Percentage of correct answers, 0 when nothing was answered.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.correct) / f64::from(self.total) * 100.0
        }
    }

    pub fn growth_stage(&self) -> GrowthStage {
        GrowthStage::for_accuracy(self.accuracy())
    }
}

/// How answer choices are presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceStyle {
    #[default]
    Quiz,
    /// Adds an "I don't know" option.
    Chat,
}

/// Draw a question not yet asked in this cycle.
///
/// When every question has been asked the set is cleared and the whole bank
/// is eligible again.
pub fn pick_fresh_question<'b, R: Rng + ?Sized>(
    bank: &'b QuestionBank,
    asked: &mut AskedSet,
    rng: &mut R,
) -> QuizResult<&'b Question> {
    if bank.is_empty() {
        return Err(QuizError::EmptyBank);
    }

    let mut pool: Vec<&Question> = bank
        .questions()
        .iter()
        .filter(|q| !asked.contains(q.id))
        .collect();

    if pool.is_empty() {
        debug!(questions = bank.len(), "Every question asked, starting a new cycle");
        asked.clear();
        pool = bank.questions().iter().collect();
    }

    let question = *pool.choose(rng).ok_or(QuizError::EmptyBank)?;
    asked.insert(question.id);
    Ok(question)
}

/// Move `cursor` past tombstones and return the live entry under it, or
/// `None` once the queue is exhausted.
pub fn pick_retry_question<'q>(
    queue: &'q IncorrectQueue,
    cursor: &mut usize,
) -> Option<&'q IncorrectEntry> {
    while *cursor < queue.slots() {
        if let Some(entry) = queue.get(*cursor) {
            return Some(entry);
        }
        *cursor += 1;
    }
    None
}

/// Judge an answer and update the retry queue and mistake history.
///
/// Answers are compared after trimming surrounding whitespace. A mismatch is
/// logged in `history` and queued unless the question already has a live
/// entry. A match in retry mode tombstones the entry under the cursor.
pub fn record_answer(
    question: &Question,
    chosen: &str,
    mode: &QuizMode,
    queue: &mut IncorrectQueue,
    history: &mut Vec<AttemptRecord>,
) -> AttemptRecord {
    let chosen = chosen.trim();
    let is_correct = chosen == question.correct_answer.trim();

    let record = AttemptRecord {
        question: question.clone(),
        chosen_answer: chosen.to_string(),
        is_correct,
        answered_at: Utc::now(),
    };

    if !is_correct {
        history.push(record.clone());
        if !queue.contains_live(question.id) {
            queue.push(IncorrectEntry {
                question: question.clone(),
                wrong_answer: chosen.to_string(),
            });
        }
    } else if let QuizMode::Retry { cursor } = mode {
        let slot = match queue.get(*cursor) {
            Some(entry) if entry.question.id == question.id => Some(*cursor),
            _ => queue.position_of(question.id),
        };
        if let Some(slot) = slot {
            queue.tombstone(slot);
        }
    }

    record
}

/// Answer choices for a question: the correct answer and one distractor,
/// plus [`UNSURE_CHOICE`] in chat style, in a shuffled order.
///
/// The order depends only on the session seed and the question id, so the
/// same question renders identically within a session.
pub fn answer_choices(question: &Question, session_seed: u64, style: ChoiceStyle) -> Vec<String> {
    let seed = session_seed ^ u64::from(question.id.0).wrapping_mul(SEED_MIX);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut choices = vec![question.correct_answer.clone()];
    if let Some(distractor) = question.distractors.choose(&mut rng) {
        choices.push(distractor.clone());
    }
    if style == ChoiceStyle::Chat {
        choices.push(UNSURE_CHOICE.to_string());
    }
    choices.shuffle(&mut rng);
    choices
}

/// A question handed to the learner.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentedQuestion {
    pub question: Question,
    pub is_retry: bool,
    /// Retry mode ran out of mistakes just before this draw.
    pub retry_completed: bool,
}

/// The current question and whether it came from the retry queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentQuestion {
    pub question: Question,
    pub is_retry: bool,
}

/// Per-session quiz state and controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizProgress {
    pub asked: AskedSet,
    pub mode: QuizMode,
    pub incorrect: IncorrectQueue,
    /// Every wrong answer, oldest first.
    pub history: Vec<AttemptRecord>,
    pub stats: QuizStats,
    pub current: Option<CurrentQuestion>,
}

impl QuizProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Present the next question.
    ///
    /// In retry mode this is the next live mistake; when none is left the
    /// controller leaves retry mode, clears the queue and draws a fresh
    /// question instead.
    pub fn next_question<R: Rng + ?Sized>(
        &mut self,
        bank: &QuestionBank,
        rng: &mut R,
    ) -> QuizResult<PresentedQuestion> {
        let mut retry_completed = false;

        if let QuizMode::Retry { mut cursor } = self.mode {
            let entry = pick_retry_question(&self.incorrect, &mut cursor).cloned();
            match entry {
                Some(entry) => {
                    self.mode = QuizMode::Retry { cursor };
                    return Ok(self.present(entry.question, true, false));
                }
                None => {
                    debug!("Retry queue exhausted, returning to fresh questions");
                    self.mode = QuizMode::Fresh;
                    self.incorrect.clear();
                    retry_completed = true;
                }
            }
        }

        let question = pick_fresh_question(bank, &mut self.asked, rng)?.clone();
        Ok(self.present(question, false, retry_completed))
    }

    fn present(&mut self, question: Question, is_retry: bool, retry_completed: bool) -> PresentedQuestion {
        self.current = Some(CurrentQuestion {
            question: question.clone(),
            is_retry,
        });
        PresentedQuestion {
            question,
            is_retry,
            retry_completed,
        }
    }

    /// Judge an answer to the current question.
    pub fn submit_answer(&mut self, question_id: QuestionId, answer: &str) -> QuizResult<AttemptRecord> {
        let current = self.current.as_ref().ok_or(QuizError::NoActiveQuestion)?;
        if current.question.id != question_id {
            return Err(QuizError::StaleQuestion {
                question_id: question_id.0,
            });
        }

        // Only judge retry-mode semantics for a question that came from the queue.
        let mode = if current.is_retry {
            self.mode
        } else {
            QuizMode::Fresh
        };
        let record = record_answer(
            &current.question,
            answer,
            &mode,
            &mut self.incorrect,
            &mut self.history,
        );

        self.stats.record(record.is_correct);
        self.current = None;

        debug!(
            question_id = %question_id,
            is_correct = record.is_correct,
            live_mistakes = self.incorrect.live_count(),
            "Answer recorded"
        );
        Ok(record)
    }

    /// Enter retry mode. Fails when there is nothing to retry.
    pub fn start_retry(&mut self) -> QuizResult<()> {
        if self.incorrect.live_count() == 0 {
            return Err(QuizError::NoMistakes);
        }
        self.mode = QuizMode::Retry { cursor: 0 };
        self.current = None;
        Ok(())
    }

    /// Leave retry mode, keeping the remaining mistakes.
    pub fn stop_retry(&mut self) {
        self.mode = QuizMode::Fresh;
        self.current = None;
    }

    pub fn is_retrying(&self) -> bool {
        matches!(self.mode, QuizMode::Retry { .. })
    }

    /// Forget all progress.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Empty the mistake notebook and the retry queue.
    pub fn clear_mistakes(&mut self) {
        self.history.clear();
        self.incorrect.clear();
        if self.is_retrying() {
            self.mode = QuizMode::Fresh;
            self.current = None;
        }
    }

    /// Count of logged mistakes per category.
    pub fn mistakes_by_category(&self) -> BTreeMap<RuleCategory, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.history {
            *counts.entry(record.question.category).or_insert(0) += 1;
        }
        counts
    }

    /// Most recent wrong answer.
    pub fn last_mistake(&self) -> Option<&AttemptRecord> {
        self.history.last()
    }
}
