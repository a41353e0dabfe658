//! Running performance counters.
//!
//! [`PerformanceState`] is a cache over the answer log: every field must
//! equal what [`PerformanceState::recompute`] yields for the same log.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::model::Subject;
use crate::results::AnswerRecord;
use crate::statistics::percentage;

/// Correct/total counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tally {
    pub correct: u32,
    pub total: u32,
}

impl Tally {
    fn with(self, correct: bool) -> Self {
        Self {
            correct: self.correct + u32::from(correct),
            total: self.total + 1,
        }
    }

    pub fn accuracy_pct(&self) -> f64 {
        percentage(f64::from(self.correct), f64::from(self.total))
    }
}

/// Cumulative counters plus a bounded window of recent records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceState {
    pub total_answered: u32,
    pub total_correct: u32,
    pub total_points: u32,
    /// Current run of correct answers.
    pub current_streak: u32,
    pub max_streak: u32,
    /// Current run of wrong answers.
    pub wrong_streak: u32,
    pub per_subject: BTreeMap<Subject, Tally>,
    /// Most recent records, oldest first, at most `window_size` long.
    pub window: VecDeque<AnswerRecord>,
    pub window_size: usize,
    /// Answers given without the pressure flag.
    pub normal: Tally,
    /// Answers given while the pressure flag was raised.
    pub pressure: Tally,
}

impl PerformanceState {
    pub fn new(window_size: usize) -> Self {
        Self {
            total_answered: 0,
            total_correct: 0,
            total_points: 0,
            current_streak: 0,
            max_streak: 0,
            wrong_streak: 0,
            per_subject: BTreeMap::new(),
            window: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            normal: Tally::default(),
            pressure: Tally::default(),
        }
    }

    /// Fold one record into a new state.
    pub fn apply(&self, record: &AnswerRecord) -> Self {
        let mut next = self.clone();
        let correct = record.is_correct;

        next.total_answered += 1;
        next.total_correct += u32::from(correct);
        next.total_points += record.points;

        if correct {
            next.current_streak += 1;
            next.wrong_streak = 0;
            next.max_streak = next.max_streak.max(next.current_streak);
        } else {
            next.current_streak = 0;
            next.wrong_streak += 1;
        }

        let tally = next.per_subject.entry(record.subject).or_default();
        *tally = tally.with(correct);

        if record.under_pressure {
            next.pressure = next.pressure.with(correct);
        } else {
            next.normal = next.normal.with(correct);
        }

        next.window.push_back(record.clone());
        while next.window.len() > next.window_size {
            next.window.pop_front();
        }
        next
    }

    /// Rebuild the counters from scratch.
    pub fn recompute(log: &[AnswerRecord], window_size: usize) -> Self {
        log.iter()
            .fold(Self::new(window_size), |state, record| state.apply(record))
    }

    /// Whether the cached counters match a full recompute over `log`.
    pub fn is_consistent_with(&self, log: &[AnswerRecord]) -> bool {
        *self == Self::recompute(log, self.window_size)
    }

    pub fn accuracy_pct(&self) -> f64 {
        percentage(f64::from(self.total_correct), f64::from(self.total_answered))
    }

    /// Accuracy for a subject, `None` if nothing was answered there.
    pub fn subject_accuracy(&self, subject: Subject) -> Option<f64> {
        self.per_subject
            .get(&subject)
            .filter(|t| t.total > 0)
            .map(Tally::accuracy_pct)
    }
}
