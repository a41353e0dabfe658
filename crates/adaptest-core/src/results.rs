//! Answer records produced by the validator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{QuestionType, Subject};

/// How a submitted selection relates to the correct set.
///
/// This is an analytic label only; scoring looks at `is_correct` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Selected set equals the correct set.
    Exact,
    /// Non-empty strict subset of the correct set.
    Missed,
    /// Strict superset of the correct set.
    Overselected,
    /// Overlaps the correct set but is neither a subset nor a superset.
    Mixed,
    /// No overlap at all, including an empty selection.
    Wrong,
}

impl MatchKind {
    /// Overlapping but not exact.
    pub fn is_partial(self) -> bool {
        matches!(
            self,
            MatchKind::Missed | MatchKind::Overselected | MatchKind::Mixed
        )
    }
}

/// Immutable record of one submitted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub subject: Subject,
    pub question_type: QuestionType,
    /// Difficulty of the question that was answered.
    pub difficulty: u8,
    /// Selected option indices, sorted and deduplicated.
    pub selected: Vec<usize>,
    /// Correct option indices, sorted and deduplicated.
    pub correct: Vec<usize>,
    pub is_correct: bool,
    pub match_kind: MatchKind,
    /// Either 0 or `max_points`.
    pub points: u32,
    pub max_points: u32,
    /// Time the test-taker spent on this question.
    pub time_spent_ms: u64,
    /// Planned time per question (budget / planned count).
    pub expected_ms: u64,
    /// Zero-based index of this answer in the session log.
    pub position: usize,
    /// Whether the time-pressure flag was raised when this answer arrived.
    #[serde(default)]
    pub under_pressure: bool,
    pub timestamp: DateTime<Utc>,
}

impl AnswerRecord {
    /// Actual over expected time; 1.0 when no expectation is known.
    pub fn time_ratio(&self) -> f64 {
        if self.expected_ms == 0 {
            1.0
        } else {
            self.time_spent_ms as f64 / self.expected_ms as f64
        }
    }

    pub fn is_partially_correct(&self) -> bool {
        self.match_kind.is_partial()
    }
}
