//! All-or-nothing answer validation.
//!
//! A single-choice answer is correct only when exactly one index is selected
//! and it is the correct one. A multiple-choice answer is correct only when
//! the selected set equals the correct set. Partial overlap is recorded as an
//! analytic [`MatchKind`] and never earns points.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::model::{Question, QuestionType};
use crate::results::{AnswerRecord, MatchKind};

/// One raw submission, as delivered by the outer layer.
#[derive(Debug, Clone)]
pub struct Submission<'a> {
    /// Option indices as submitted; may be empty, unordered or malformed.
    pub selected: &'a [usize],
    pub time_spent_ms: u64,
    pub expected_ms: u64,
    pub position: usize,
    pub under_pressure: bool,
    pub timestamp: DateTime<Utc>,
}

/// Classify how `selected` relates to `correct`.
pub fn classify(selected: &BTreeSet<usize>, correct: &BTreeSet<usize>) -> MatchKind {
    if selected == correct {
        return MatchKind::Exact;
    }
    if selected.is_disjoint(correct) {
        return MatchKind::Wrong;
    }
    if selected.is_subset(correct) {
        MatchKind::Missed
    } else if selected.is_superset(correct) {
        MatchKind::Overselected
    } else {
        MatchKind::Mixed
    }
}

/// Exact-match rule for a question type.
///
/// Duplicated indices make a submission malformed, so it is never correct.
pub fn is_exact_match(question_type: QuestionType, selected: &[usize], correct: &[usize]) -> bool {
    let selected_set: BTreeSet<usize> = selected.iter().copied().collect();
    let correct_set: BTreeSet<usize> = correct.iter().copied().collect();
    if selected_set.len() != selected.len() || correct_set.is_empty() {
        return false;
    }
    match question_type {
        QuestionType::Single => {
            selected.len() == 1 && correct_set.len() == 1 && selected_set == correct_set
        }
        QuestionType::Multiple => selected_set == correct_set,
    }
}

/// Judge one submission and build its immutable record.
pub fn score_answer(question: &Question, submission: &Submission<'_>) -> AnswerRecord {
    let selected: BTreeSet<usize> = submission.selected.iter().copied().collect();
    let correct: BTreeSet<usize> = question.correct.iter().copied().collect();

    let is_correct = is_exact_match(question.question_type, submission.selected, &question.correct);
    let match_kind = if is_correct {
        MatchKind::Exact
    } else {
        match classify(&selected, &correct) {
            // Set-equal but malformed (duplicates) still counts as a miss.
            MatchKind::Exact => MatchKind::Mixed,
            other => other,
        }
    };
    let max_points = question.max_points();

    AnswerRecord {
        question_id: question.id.clone(),
        subject: question.subject,
        question_type: question.question_type,
        difficulty: question.difficulty,
        selected: selected.into_iter().collect(),
        correct: correct.into_iter().collect(),
        is_correct,
        match_kind,
        points: if is_correct { max_points } else { 0 },
        max_points,
        time_spent_ms: submission.time_spent_ms,
        expected_ms: submission.expected_ms,
        position: submission.position,
        under_pressure: submission.under_pressure,
        timestamp: submission.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Subject;

    fn question(question_type: QuestionType, correct: Vec<usize>) -> Question {
        Question {
            id: "q".into(),
            subject: Subject::Logic,
            question_type,
            difficulty: 5,
            prompt: "p".into(),
            options: vec![String::new(); question_type.option_count()],
            correct,
            topic: String::new(),
            explanation: String::new(),
            trap: false,
            passage_group: None,
        }
    }

    fn submit(question: &Question, selected: &[usize]) -> AnswerRecord {
        score_answer(
            question,
            &Submission {
                selected,
                time_spent_ms: 30_000,
                expected_ms: 60_000,
                position: 0,
                under_pressure: false,
                timestamp: DateTime::<Utc>::UNIX_EPOCH,
            },
        )
    }

    #[test]
    fn single_choice_exact() {
        let q = question(QuestionType::Single, vec![2]);
        let record = submit(&q, &[2]);
        assert!(record.is_correct);
        assert_eq!(record.points, 1);
        assert_eq!(record.max_points, 1);
        assert_eq!(record.match_kind, MatchKind::Exact);
    }

    #[test]
    fn single_choice_rejects_extra_selection() {
        let q = question(QuestionType::Single, vec![2]);
        let record = submit(&q, &[2, 3]);
        assert!(!record.is_correct);
        assert_eq!(record.points, 0);
        assert_eq!(record.match_kind, MatchKind::Overselected);
    }

    #[test]
    fn multiple_choice_subset_is_partial_not_correct() {
        let q = question(QuestionType::Multiple, vec![0, 2, 4]);
        let record = submit(&q, &[0, 2]);
        assert!(!record.is_correct);
        assert_eq!(record.points, 0);
        assert_eq!(record.max_points, 2);
        assert!(record.is_partially_correct());
        assert_eq!(record.match_kind, MatchKind::Missed);
    }

    #[test]
    fn multiple_choice_order_is_irrelevant() {
        let q = question(QuestionType::Multiple, vec![0, 2, 4]);
        let record = submit(&q, &[4, 0, 2]);
        assert!(record.is_correct);
        assert_eq!(record.points, 2);
        assert_eq!(record.selected, vec![0, 2, 4]);
    }

    #[test]
    fn multiple_choice_superset_and_mixed() {
        let q = question(QuestionType::Multiple, vec![1, 3]);
        assert_eq!(submit(&q, &[1, 3, 5]).match_kind, MatchKind::Overselected);
        assert_eq!(submit(&q, &[1, 6]).match_kind, MatchKind::Mixed);
        assert_eq!(submit(&q, &[6, 7]).match_kind, MatchKind::Wrong);
    }

    #[test]
    fn empty_selection_is_wrong_without_panicking() {
        let q = question(QuestionType::Multiple, vec![1, 3]);
        let record = submit(&q, &[]);
        assert!(!record.is_correct);
        assert_eq!(record.points, 0);
        assert_eq!(record.match_kind, MatchKind::Wrong);
    }

    #[test]
    fn duplicated_indices_are_malformed() {
        let q = question(QuestionType::Single, vec![2]);
        let record = submit(&q, &[2, 2]);
        assert!(!record.is_correct);
        assert_eq!(record.points, 0);
        assert!(record.is_partially_correct());
    }

    #[test]
    fn out_of_range_index_is_just_wrong() {
        let q = question(QuestionType::Single, vec![2]);
        let record = submit(&q, &[99]);
        assert!(!record.is_correct);
        assert_eq!(record.match_kind, MatchKind::Wrong);
    }
}
