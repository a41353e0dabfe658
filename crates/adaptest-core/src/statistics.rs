//! Rolling-window and aggregate statistics over answer records.
//!
//! Every helper is total: empty inputs yield zeroes or `None`, never NaN.

use serde::{Deserialize, Serialize};

use crate::results::AnswerRecord;

/// The last `min(n, len)` records of a log.
pub fn trailing(log: &[AnswerRecord], n: usize) -> &[AnswerRecord] {
    &log[log.len().saturating_sub(n)..]
}

/// `part / whole` as a percentage; 0 when `whole` is 0.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Arithmetic mean; `None` for an empty sequence.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Percentage of correct records; 0 for an empty slice.
pub fn accuracy_pct<'a, I>(records: I) -> f64
where
    I: IntoIterator<Item = &'a AnswerRecord>,
{
    let (correct, total) = records
        .into_iter()
        .fold((0usize, 0usize), |(c, t), r| (c + usize::from(r.is_correct), t + 1));
    percentage(correct as f64, total as f64)
}

/// Statistics over a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowStats {
    /// Number of records in the window.
    pub len: usize,
    /// Fraction correct, 0.0–1.0.
    pub accuracy: f64,
    /// Mean of actual/expected time; 1.0 for an empty window.
    pub time_ratio: f64,
}

/// Compute accuracy and mean time ratio over `window`.
pub fn window_stats(window: &[AnswerRecord]) -> WindowStats {
    if window.is_empty() {
        return WindowStats {
            len: 0,
            accuracy: 0.0,
            time_ratio: 1.0,
        };
    }
    let correct = window.iter().filter(|r| r.is_correct).count();
    let time_ratio = mean(window.iter().map(AnswerRecord::time_ratio)).unwrap_or(1.0);
    WindowStats {
        len: window.len(),
        accuracy: correct as f64 / window.len() as f64,
        time_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestionType, Subject};
    use crate::results::MatchKind;
    use chrono::{DateTime, Utc};

    fn record(position: usize, correct: bool, spent: u64) -> AnswerRecord {
        AnswerRecord {
            question_id: format!("q{position}"),
            subject: Subject::Logic,
            question_type: QuestionType::Single,
            difficulty: 5,
            selected: vec![0],
            correct: vec![0],
            is_correct: correct,
            match_kind: if correct { MatchKind::Exact } else { MatchKind::Wrong },
            points: u32::from(correct),
            max_points: 1,
            time_spent_ms: spent,
            expected_ms: 1000,
            position,
            under_pressure: false,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn trailing_takes_at_most_n() {
        let log: Vec<_> = (0..4).map(|i| record(i, true, 1000)).collect();
        assert_eq!(trailing(&log, 10).len(), 4);
        let tail = trailing(&log, 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].position, 2);
    }

    #[test]
    fn percentage_of_zero_whole() {
        assert_eq!(percentage(3.0, 0.0), 0.0);
        assert!((percentage(1.0, 4.0) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(Vec::<f64>::new()), None);
        assert_eq!(mean(vec![1.0, 3.0]), Some(2.0));
    }

    #[test]
    fn window_stats_accuracy_and_ratio() {
        let window = vec![record(0, true, 500), record(1, false, 1500)];
        let stats = window_stats(&window);
        assert_eq!(stats.len, 2);
        assert!((stats.accuracy - 0.5).abs() < f64::EPSILON);
        assert!((stats.time_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_window_is_neutral() {
        let stats = window_stats(&[]);
        assert_eq!(stats.len, 0);
        assert_eq!(stats.accuracy, 0.0);
        assert_eq!(stats.time_ratio, 1.0);
        assert_eq!(accuracy_pct(&Vec::<AnswerRecord>::new()), 0.0);
    }
}
