//! Core data model types for adaptest.
//!
//! Questions are immutable once a pool is loaded. The pool is the default
//! [`QuestionRepository`] the selector consults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::traits::QuestionRepository;

/// Exam subjects. Declaration order is the fixed tie-break order used by
/// the diagnostic report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    /// Logical reasoning.
    Logic,
    /// Reading comprehension and verbal reasoning.
    Reading,
    /// Arithmetic, algebra and geometry.
    Mathematics,
    /// Tables, charts and numerical data interpretation.
    DataInterpretation,
}

impl Subject {
    /// Every subject, in tie-break order.
    pub const ALL: [Subject; 4] = [
        Subject::Logic,
        Subject::Reading,
        Subject::Mathematics,
        Subject::DataInterpretation,
    ];

    /// The two quantitative subjects averaged into the problem-solving score.
    pub const QUANTITATIVE: [Subject; 2] = [Subject::Mathematics, Subject::DataInterpretation];
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Logic => write!(f, "logic"),
            Subject::Reading => write!(f, "reading"),
            Subject::Mathematics => write!(f, "mathematics"),
            Subject::DataInterpretation => write!(f, "data_interpretation"),
        }
    }
}

impl FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "logic" | "logical" => Ok(Subject::Logic),
            "reading" | "verbal" => Ok(Subject::Reading),
            "mathematics" | "math" | "maths" => Ok(Subject::Mathematics),
            "data_interpretation" | "data" => Ok(Subject::DataInterpretation),
            other => Err(format!("unknown subject: {other}")),
        }
    }
}

/// Answer format of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Exactly one correct option out of five.
    Single,
    /// One or more correct options out of eight, scored all-or-nothing.
    Multiple,
}

impl QuestionType {
    pub const ALL: [QuestionType; 2] = [QuestionType::Single, QuestionType::Multiple];

    /// Points awarded for an exact match.
    pub fn max_points(self) -> u32 {
        match self {
            QuestionType::Single => 1,
            QuestionType::Multiple => 2,
        }
    }

    /// Number of options a well-formed question of this type offers.
    pub fn option_count(self) -> usize {
        match self {
            QuestionType::Single => 5,
            QuestionType::Multiple => 8,
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::Single => write!(f, "single"),
            QuestionType::Multiple => write!(f, "multiple"),
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "single_choice" => Ok(QuestionType::Single),
            "multiple" | "multiple_choice" | "multi" => Ok(QuestionType::Multiple),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// Lowest difficulty level.
pub const MIN_DIFFICULTY: u8 = 1;
/// Highest difficulty level.
pub const MAX_DIFFICULTY: u8 = 10;

/// Clamp an arbitrary signed level into `[MIN_DIFFICULTY, MAX_DIFFICULTY]`.
pub fn clamp_difficulty(level: i32) -> u8 {
    level.clamp(MIN_DIFFICULTY as i32, MAX_DIFFICULTY as i32) as u8
}

/// A single exam question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier within a pool.
    pub id: String,
    pub subject: Subject,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Difficulty level, 1–10.
    pub difficulty: u8,
    /// Text shown to the test-taker.
    pub prompt: String,
    /// Answer options (5 for single-choice, 8 for multiple-choice).
    pub options: Vec<String>,
    /// Indices into `options` that make up the correct answer.
    pub correct: Vec<usize>,
    /// Topic tag used for content reporting.
    #[serde(default)]
    pub topic: String,
    /// Explanation shown verbatim after the answer is submitted.
    #[serde(default)]
    pub explanation: String,
    /// Whether this question is designed to provoke a common reasoning error.
    #[serde(default)]
    pub trap: bool,
    /// Questions sharing a passage must be served as one contiguous block.
    #[serde(default, rename = "passage")]
    pub passage_group: Option<String>,
}

impl Question {
    pub fn max_points(&self) -> u32 {
        self.question_type.max_points()
    }

    /// Absolute distance between this question's difficulty and `target`.
    pub fn distance_to(&self, target: u8) -> u8 {
        self.difficulty.abs_diff(target)
    }
}

/// Planned number of questions per type for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectQuota {
    pub subject: Subject,
    #[serde(default)]
    pub single: u32,
    #[serde(default)]
    pub multiple: u32,
}

impl SubjectQuota {
    pub fn new(subject: Subject, single: u32, multiple: u32) -> Self {
        Self {
            subject,
            single,
            multiple,
        }
    }

    pub fn questions(&self) -> u32 {
        self.single.saturating_add(self.multiple)
    }

    /// Point quota: one per single-choice, two per multiple-choice question.
    pub fn max_points(&self) -> u32 {
        self.single
            .saturating_mul(QuestionType::Single.max_points())
            .saturating_add(self.multiple.saturating_mul(QuestionType::Multiple.max_points()))
    }

    pub fn count_for(&self, question_type: QuestionType) -> u32 {
        match question_type {
            QuestionType::Single => self.single,
            QuestionType::Multiple => self.multiple,
        }
    }
}

/// An immutable, pre-loaded collection of questions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionPool {
    /// Unique identifier for this pool.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl QuestionPool {
    pub fn new(id: impl Into<String>, name: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            questions,
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.questions.iter().any(|q| q.id == id)
    }

    /// Append questions whose ids are not already present.
    ///
    /// Returns the number of questions actually added.
    pub fn merge(&mut self, incoming: Vec<Question>) -> usize {
        let mut added = 0;
        for question in incoming {
            if self.contains(&question.id) {
                tracing::debug!("skipping duplicate question id {}", question.id);
                continue;
            }
            self.questions.push(question);
            added += 1;
        }
        added
    }

    /// Count questions for a subject/type slot.
    pub fn count_for(&self, subject: Subject, question_type: QuestionType) -> usize {
        self.questions
            .iter()
            .filter(|q| q.subject == subject && q.question_type == question_type)
            .count()
    }
}

impl QuestionRepository for QuestionPool {
    fn questions_for(&self, subject: Subject, question_type: QuestionType) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|q| q.subject == subject && q.question_type == question_type)
            .collect()
    }
}
