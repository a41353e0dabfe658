//! Collaborator traits: the question repository and supplementary sources.
//!
//! The repository is synchronous and pre-loaded. Supplementary sources are
//! async and are implemented by the `adaptest-providers` crate; they are
//! resolved before a session starts, never during one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{Question, QuestionType, Subject, MAX_DIFFICULTY, MIN_DIFFICULTY};

// ---------------------------------------------------------------------------
// Question repository
// ---------------------------------------------------------------------------

/// Read-only access to a pre-loaded question pool.
pub trait QuestionRepository: Send + Sync {
    /// All questions for a subject/type slot, in pool order.
    fn questions_for(&self, subject: Subject, question_type: QuestionType) -> Vec<&Question>;

    /// All questions for a subject regardless of type, singles first.
    fn questions_in_subject(&self, subject: Subject) -> Vec<&Question> {
        QuestionType::ALL
            .iter()
            .flat_map(|&t| self.questions_for(subject, t))
            .collect()
    }

    /// Members of a passage group within a subject, in pool order.
    fn passage_members(&self, subject: Subject, group: &str) -> Vec<&Question> {
        self.questions_in_subject(subject)
            .into_iter()
            .filter(|q| q.passage_group.as_deref() == Some(group))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Supplementary source trait
// ---------------------------------------------------------------------------

/// A remote or on-disk source of extra questions with the pool's shape.
#[async_trait]
pub trait SupplementarySource: Send + Sync {
    /// Human-readable source name (e.g. "remote").
    fn name(&self) -> &str;

    /// Fetch up to `request.count` questions for one subject/type slot.
    async fn fetch(&self, request: &FetchRequest) -> anyhow::Result<Vec<Question>>;
}

/// Request for supplementary questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub subject: Subject,
    pub question_type: QuestionType,
    /// Maximum number of questions wanted.
    pub count: u32,
    #[serde(default = "default_min_difficulty")]
    pub min_difficulty: u8,
    #[serde(default = "default_max_difficulty")]
    pub max_difficulty: u8,
}

fn default_min_difficulty() -> u8 {
    MIN_DIFFICULTY
}

fn default_max_difficulty() -> u8 {
    MAX_DIFFICULTY
}

impl FetchRequest {
    /// A request spanning the full difficulty range.
    pub fn new(subject: Subject, question_type: QuestionType, count: u32) -> Self {
        Self {
            subject,
            question_type,
            count,
            min_difficulty: MIN_DIFFICULTY,
            max_difficulty: MAX_DIFFICULTY,
        }
    }

    /// Whether `question` belongs to the slot and range this request asks for.
    pub fn accepts(&self, question: &Question) -> bool {
        question.subject == self.subject
            && question.question_type == self.question_type
            && (self.min_difficulty..=self.max_difficulty).contains(&question.difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionPool;

    fn question(id: &str, qt: QuestionType, difficulty: u8, group: Option<&str>) -> Question {
        Question {
            id: id.into(),
            subject: Subject::Reading,
            question_type: qt,
            difficulty,
            prompt: "p".into(),
            options: vec![String::new(); qt.option_count()],
            correct: vec![0],
            topic: String::new(),
            explanation: String::new(),
            trap: false,
            passage_group: group.map(str::to_string),
        }
    }

    #[test]
    fn subject_listing_puts_singles_first() {
        let pool = QuestionPool::new(
            "p",
            "P",
            vec![
                question("m1", QuestionType::Multiple, 3, None),
                question("s1", QuestionType::Single, 3, None),
            ],
        );
        let ids: Vec<&str> = pool
            .questions_in_subject(Subject::Reading)
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert_eq!(ids, vec!["s1", "m1"]);
    }

    #[test]
    fn passage_members_are_filtered_by_group() {
        let pool = QuestionPool::new(
            "p",
            "P",
            vec![
                question("a", QuestionType::Single, 3, Some("g1")),
                question("b", QuestionType::Single, 4, Some("g2")),
                question("c", QuestionType::Single, 5, Some("g1")),
            ],
        );
        let members = pool.passage_members(Subject::Reading, "g1");
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].id, "c");
    }

    #[test]
    fn fetch_request_accepts_in_range_only() {
        let mut request = FetchRequest::new(Subject::Reading, QuestionType::Single, 3);
        request.min_difficulty = 4;
        request.max_difficulty = 6;
        assert!(request.accepts(&question("a", QuestionType::Single, 5, None)));
        assert!(!request.accepts(&question("b", QuestionType::Single, 8, None)));
        assert!(!request.accepts(&question("c", QuestionType::Multiple, 5, None)));
    }
}
