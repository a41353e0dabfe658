//! Diagnostic report types with JSON persistence.
//!
//! A [`DiagnosticReport`] is built once by [`crate::diagnostics::synthesize`]
//! and never mutated afterwards.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::Tally;
use crate::difficulty::OverloadPhase;
use crate::model::Subject;

/// The final report for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub session_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// The session ended because the time budget ran out.
    pub auto_submitted: bool,
    pub elapsed_ms: u64,
    pub time_budget_ms: u64,
    pub planned_questions: u32,
    pub answered: u32,
    pub correct: u32,
    /// Sum of points over the answer log.
    pub total_score: u32,
    /// Planned point quota; the basis for `percentage` and `grade`.
    pub max_score: u32,
    /// Maximum points of the questions actually answered.
    pub answered_max_score: u32,
    pub percentage: f64,
    pub grade: Grade,
    pub max_streak: u32,
    pub subjects: Vec<SubjectResult>,
    pub strongest_subject: Option<Subject>,
    pub weakest_subject: Option<Subject>,
    pub time_management: TimeManagement,
    pub stress: StressResponse,
    pub cognitive: CognitiveProfile,
    pub precision: McqPrecision,
    pub difficulty: DifficultySummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<BreakdownSummary>,
    pub recommendations: Vec<Recommendation>,
}

impl DiagnosticReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json_pretty()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: DiagnosticReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    pub fn subject(&self, subject: Subject) -> Option<&SubjectResult> {
        self.subjects.iter().find(|s| s.subject == subject)
    }
}

/// Results for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectResult {
    pub subject: Subject,
    pub answered: u32,
    pub correct: u32,
    pub single_score: u32,
    pub multiple_score: u32,
    pub score: u32,
    /// Planned point quota for this subject.
    pub max_score: u32,
    pub answered_max_score: u32,
    /// Accuracy over answered questions only.
    pub accuracy_pct: f64,
    pub avg_response_ms: Option<f64>,
    pub avg_difficulty: Option<f64>,
    /// Difficulty of each answered question, in order.
    pub difficulty_trace: Vec<u8>,
}

impl SubjectResult {
    /// Score over planned maximum; 0 when nothing was planned.
    pub fn score_ratio(&self) -> f64 {
        if self.max_score == 0 {
            0.0
        } else {
            f64::from(self.score) / f64::from(self.max_score)
        }
    }
}

/// Pace classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pace {
    Rushed,
    Optimal,
    Slow,
    InsufficientData,
}

impl fmt::Display for Pace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pace::Rushed => write!(f, "rushed"),
            Pace::Optimal => write!(f, "optimal"),
            Pace::Slow => write!(f, "slow"),
            Pace::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectTiming {
    pub subject: Subject,
    pub answered: u32,
    pub avg_ms: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeManagement {
    /// Budget divided by the planned question count.
    pub expected_per_question_ms: f64,
    /// Consumed time divided by answered count.
    pub actual_per_question_ms: Option<f64>,
    pub ratio: Option<f64>,
    pub pace: Pace,
    pub per_subject: Vec<SubjectTiming>,
}

/// How well accuracy held up in the last quarter of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resistance {
    High,
    Moderate,
    Low,
    InsufficientData,
}

impl fmt::Display for Resistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resistance::High => write!(f, "high"),
            Resistance::Moderate => write!(f, "moderate"),
            Resistance::Low => write!(f, "low"),
            Resistance::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResponse {
    /// Answers in the first three quarters of the log.
    pub normal_answered: u32,
    /// Answers in the last quarter of the log.
    pub pressure_answered: u32,
    pub normal_accuracy: f64,
    pub pressure_accuracy: f64,
    /// `max(0, normal - pressure)` in percentage points.
    pub accuracy_drop: f64,
    pub resistance: Resistance,
    /// Answers given without the live pressure flag.
    pub flagged_normal: Tally,
    /// Answers given while the live pressure flag was raised.
    pub flagged_pressure: Tally,
}

/// Five 0–100 sub-scores with equal weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveProfile {
    pub logical_reasoning: Option<f64>,
    pub endurance: Option<f64>,
    pub precision: Option<f64>,
    pub pattern_recognition: Option<f64>,
    pub problem_solving: Option<f64>,
    /// Weighted sum; missing sub-scores contribute 0.
    pub overall: f64,
    /// Names of sub-scores whose minimum sample was not met.
    pub insufficient_data: Vec<String>,
}

/// Dominant kind of multiple-choice mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MistakePattern {
    Overselection,
    Underselection,
    Confusion,
    OffTarget,
    NoMistakes,
    InsufficientData,
}

impl MistakePattern {
    pub fn message(self) -> &'static str {
        match self {
            MistakePattern::Overselection => {
                "Tends to select extra options; check each option independently before marking it."
            }
            MistakePattern::Underselection => {
                "Tends to stop short of the full answer; look for every option that applies."
            }
            MistakePattern::Confusion => {
                "Mixes correct and incorrect options; revisit the underlying concepts."
            }
            MistakePattern::OffTarget => {
                "Selections usually miss the correct options entirely; reread the question stem."
            }
            MistakePattern::NoMistakes => "No multiple-choice mistakes recorded.",
            MistakePattern::InsufficientData => {
                "Not enough multiple-choice answers to identify a pattern."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McqPrecision {
    pub attempts: u32,
    pub fully_correct: u32,
    pub partially_correct: u32,
    pub completely_wrong: u32,
    /// Exact-match rate in percent; `None` without attempts.
    pub exact_rate: Option<f64>,
    pub pattern: MistakePattern,
    pub pattern_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultySummary {
    pub starting: u8,
    #[serde(rename = "final")]
    pub final_level: u8,
    pub peak: u8,
    pub history: Vec<u8>,
    pub trap_injections: u32,
    /// Mean difficulty of the questions answered.
    pub avg_served: Option<f64>,
}

/// Outcome of the overload extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownSummary {
    pub phase: OverloadPhase,
    pub forced_since: Option<usize>,
    pub collapsed_at: Option<usize>,
    /// Accuracy over the answers given in the forced phase.
    pub forced_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Subject,
    Process,
    Overall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub message: String,
}

/// Letter grade from the overall percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_percentage(pct: f64) -> Self {
        match pct {
            p if p >= 95.0 => Grade::APlus,
            p if p >= 90.0 => Grade::A,
            p if p >= 80.0 => Grade::B,
            p if p >= 70.0 => Grade::C,
            p if p >= 60.0 => Grade::D,
            _ => Grade::F,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_breakpoints() {
        assert_eq!(Grade::from_percentage(100.0), Grade::APlus);
        assert_eq!(Grade::from_percentage(95.0), Grade::APlus);
        assert_eq!(Grade::from_percentage(94.9), Grade::A);
        assert_eq!(Grade::from_percentage(80.0), Grade::B);
        assert_eq!(Grade::from_percentage(79.99), Grade::C);
        assert_eq!(Grade::from_percentage(60.0), Grade::D);
        assert_eq!(Grade::from_percentage(59.0), Grade::F);
        assert_eq!(Grade::from_percentage(0.0), Grade::F);
    }

    #[test]
    fn grade_serializes_with_plus() {
        assert_eq!(serde_json::to_string(&Grade::APlus).unwrap(), "\"A+\"");
        assert_eq!(Grade::APlus.to_string(), "A+");
    }

    #[test]
    fn score_ratio_without_quota() {
        let result = SubjectResult {
            subject: Subject::Logic,
            answered: 0,
            correct: 0,
            single_score: 0,
            multiple_score: 0,
            score: 0,
            max_score: 0,
            answered_max_score: 0,
            accuracy_pct: 0.0,
            avg_response_ms: None,
            avg_difficulty: None,
            difficulty_trace: Vec::new(),
        };
        assert_eq!(result.score_ratio(), 0.0);
    }
}
