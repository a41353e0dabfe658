//! Diagnostic report synthesis.
//!
//! [`synthesize`] is a pure function over a frozen session: the complete
//! answer log, the final controller and aggregator states, elapsed time and
//! the auto-submit flag. The same inputs always produce the same report.
//! Short or aborted sessions degrade to `InsufficientData` markers instead of
//! dividing by zero.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::aggregator::PerformanceState;
use crate::difficulty::{DifficultyState, OverloadPhase};
use crate::model::{QuestionType, Subject};
use crate::report::{
    BreakdownSummary, CognitiveProfile, DiagnosticReport, DifficultySummary, Grade, McqPrecision,
    MistakePattern, Pace, Recommendation, RecommendationCategory, Resistance, StressResponse,
    SubjectResult, SubjectTiming, TimeManagement,
};
use crate::results::{AnswerRecord, MatchKind};
use crate::session::SessionConfig;
use crate::statistics::{accuracy_pct, mean, percentage};

const RUSHED_RATIO: f64 = 0.7;
const SLOW_RATIO: f64 = 1.3;
const HIGH_RESISTANCE_DROP: f64 = 5.0;
const MODERATE_RESISTANCE_DROP: f64 = 15.0;
/// Share of the log counted as the normal segment.
const NORMAL_SEGMENT_NUMERATOR: usize = 3;
const NORMAL_SEGMENT_DENOMINATOR: usize = 4;
const MIN_STRESS_SAMPLE: usize = 4;
const MIN_ENDURANCE_SAMPLE: usize = 4;
const MIN_PATTERN_SAMPLE: u32 = 3;
const PROFILE_WEIGHT: f64 = 0.2;
const WEAK_SUBJECT_ACCURACY: f64 = 60.0;
const LOW_ENDURANCE: f64 = 70.0;
const LOW_PRECISION: f64 = 50.0;

/// Frozen inputs for one synthesis.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub session_id: Uuid,
    pub config: &'a SessionConfig,
    pub log: &'a [AnswerRecord],
    pub performance: &'a PerformanceState,
    pub difficulty: &'a DifficultyState,
    pub elapsed_ms: u64,
    pub auto_submitted: bool,
    pub generated_at: DateTime<Utc>,
}

/// Build the diagnostic report for a finished session.
pub fn synthesize(input: &SynthesisInput<'_>) -> DiagnosticReport {
    let log = input.log;

    let recomputed;
    let performance = if input.performance.is_consistent_with(log) {
        input.performance
    } else {
        tracing::warn!(
            session = %input.session_id,
            "cached performance counters drifted from the answer log, using recompute"
        );
        recomputed = PerformanceState::recompute(log, input.performance.window_size);
        &recomputed
    };

    let total_score: u32 = log.iter().map(|r| r.points).sum();
    let answered_max_score: u32 = log.iter().map(|r| r.max_points).sum();
    let max_score = input.config.planned_max_points();
    let overall_pct = percentage(f64::from(total_score), f64::from(max_score));
    let grade = Grade::from_percentage(overall_pct);

    let subjects = subject_results(input.config, log);
    let (strongest_subject, weakest_subject) = extremes(&subjects);
    let time_management = time_management(input.config, log, input.elapsed_ms);
    let stress = stress_response(log, performance);
    let precision = mcq_precision(log);
    let cognitive = cognitive_profile(log, &precision);
    let difficulty = difficulty_summary(input.difficulty, log);
    let breakdown = input
        .difficulty
        .overload
        .as_ref()
        .map(|phase| breakdown_summary(phase, log));

    let mut report = DiagnosticReport {
        session_id: input.session_id,
        generated_at: input.generated_at,
        auto_submitted: input.auto_submitted,
        elapsed_ms: input.elapsed_ms,
        time_budget_ms: input.config.time_budget_ms(),
        planned_questions: input.config.planned_questions(),
        answered: performance.total_answered,
        correct: performance.total_correct,
        total_score,
        max_score,
        answered_max_score,
        percentage: overall_pct,
        grade,
        max_streak: performance.max_streak,
        subjects,
        strongest_subject,
        weakest_subject,
        time_management,
        stress,
        cognitive,
        precision,
        difficulty,
        breakdown,
        recommendations: Vec::new(),
    };
    report.recommendations = recommendations(&report);
    report
}

fn subject_results(config: &SessionConfig, log: &[AnswerRecord]) -> Vec<SubjectResult> {
    Subject::ALL
        .iter()
        .filter_map(|&subject| {
            let records: Vec<&AnswerRecord> = log.iter().filter(|r| r.subject == subject).collect();
            let quota = config.quota_for(subject);
            if records.is_empty() && quota.is_none() {
                return None;
            }
            let score_for = |t: QuestionType| -> u32 {
                records
                    .iter()
                    .filter(|r| r.question_type == t)
                    .map(|r| r.points)
                    .sum()
            };
            let single_score = score_for(QuestionType::Single);
            let multiple_score = score_for(QuestionType::Multiple);
            let answered_max_score = records.iter().map(|r| r.max_points).sum();
            Some(SubjectResult {
                subject,
                answered: records.len() as u32,
                correct: records.iter().filter(|r| r.is_correct).count() as u32,
                single_score,
                multiple_score,
                score: single_score + multiple_score,
                max_score: quota.map_or(answered_max_score, |q| q.max_points()),
                answered_max_score,
                accuracy_pct: accuracy_pct(records.iter().copied()),
                avg_response_ms: mean(records.iter().map(|r| r.time_spent_ms as f64)),
                avg_difficulty: mean(records.iter().map(|r| f64::from(r.difficulty))),
                difficulty_trace: records.iter().map(|r| r.difficulty).collect(),
            })
        })
        .collect()
}

/// Strongest and weakest subject by score ratio; earlier subjects win ties.
///
/// No subject is strongest until something scored, and none is weakest
/// until something was answered.
fn extremes(subjects: &[SubjectResult]) -> (Option<Subject>, Option<Subject>) {
    let mut strongest: Option<&SubjectResult> = None;
    let mut weakest: Option<&SubjectResult> = None;
    for result in subjects.iter().filter(|s| s.max_score > 0) {
        if strongest.map_or(true, |s| result.score_ratio() > s.score_ratio()) {
            strongest = Some(result);
        }
        if weakest.map_or(true, |w| result.score_ratio() < w.score_ratio()) {
            weakest = Some(result);
        }
    }
    let strongest = strongest.filter(|s| s.score > 0);
    let weakest = weakest.filter(|_| subjects.iter().any(|s| s.answered > 0));
    (strongest.map(|s| s.subject), weakest.map(|w| w.subject))
}

fn classify_pace(ratio: f64) -> Pace {
    if ratio < RUSHED_RATIO {
        Pace::Rushed
    } else if ratio <= SLOW_RATIO {
        Pace::Optimal
    } else {
        Pace::Slow
    }
}

fn time_management(config: &SessionConfig, log: &[AnswerRecord], elapsed_ms: u64) -> TimeManagement {
    let planned = config.planned_questions();
    let expected = if planned == 0 {
        0.0
    } else {
        config.time_budget_ms() as f64 / f64::from(planned)
    };
    let actual = if log.is_empty() {
        None
    } else {
        Some(elapsed_ms as f64 / log.len() as f64)
    };
    let ratio = actual.filter(|_| expected > 0.0).map(|a| a / expected);
    let pace = ratio.map_or(Pace::InsufficientData, classify_pace);

    let per_subject = Subject::ALL
        .iter()
        .filter_map(|&subject| {
            let spent: Vec<f64> = log
                .iter()
                .filter(|r| r.subject == subject)
                .map(|r| r.time_spent_ms as f64)
                .collect();
            let answered = spent.len() as u32;
            let avg_ms = mean(spent)?;
            Some(SubjectTiming {
                subject,
                answered,
                avg_ms,
                ratio: if expected > 0.0 { avg_ms / expected } else { 1.0 },
            })
        })
        .collect();

    TimeManagement {
        expected_per_question_ms: expected,
        actual_per_question_ms: actual,
        ratio,
        pace,
        per_subject,
    }
}

/// Split the log at the 75% mark and compare accuracy.
fn stress_response(log: &[AnswerRecord], performance: &PerformanceState) -> StressResponse {
    let split = log.len() * NORMAL_SEGMENT_NUMERATOR / NORMAL_SEGMENT_DENOMINATOR;
    let (normal, pressure) = log.split_at(split);
    let normal_accuracy = accuracy_pct(normal);
    let pressure_accuracy = accuracy_pct(pressure);
    let accuracy_drop = (normal_accuracy - pressure_accuracy).max(0.0);

    let resistance = if log.len() < MIN_STRESS_SAMPLE || normal.is_empty() || pressure.is_empty() {
        Resistance::InsufficientData
    } else if accuracy_drop < HIGH_RESISTANCE_DROP {
        Resistance::High
    } else if accuracy_drop < MODERATE_RESISTANCE_DROP {
        Resistance::Moderate
    } else {
        Resistance::Low
    };

    StressResponse {
        normal_answered: normal.len() as u32,
        pressure_answered: pressure.len() as u32,
        normal_accuracy,
        pressure_accuracy,
        accuracy_drop,
        resistance,
        flagged_normal: performance.normal,
        flagged_pressure: performance.pressure,
    }
}

fn mcq_precision(log: &[AnswerRecord]) -> McqPrecision {
    let attempts: Vec<&AnswerRecord> = log
        .iter()
        .filter(|r| r.question_type == QuestionType::Multiple)
        .collect();
    let count = |kind: MatchKind| attempts.iter().filter(|r| r.match_kind == kind).count() as u32;

    let fully_correct = attempts.iter().filter(|r| r.is_correct).count() as u32;
    let partially_correct = attempts.iter().filter(|r| r.is_partially_correct()).count() as u32;
    let total = attempts.len() as u32;
    let completely_wrong = total - fully_correct - partially_correct;

    let pattern = if total < MIN_PATTERN_SAMPLE {
        MistakePattern::InsufficientData
    } else if fully_correct == total {
        MistakePattern::NoMistakes
    } else {
        // Listed in tie-break priority.
        let candidates = [
            (MistakePattern::Overselection, count(MatchKind::Overselected)),
            (MistakePattern::Underselection, count(MatchKind::Missed)),
            (MistakePattern::Confusion, count(MatchKind::Mixed)),
            (MistakePattern::OffTarget, completely_wrong),
        ];
        let mut best = candidates[0];
        for candidate in &candidates[1..] {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }
        best.0
    };

    McqPrecision {
        attempts: total,
        fully_correct,
        partially_correct,
        completely_wrong,
        exact_rate: (total > 0).then(|| percentage(f64::from(fully_correct), f64::from(total))),
        pattern,
        pattern_message: pattern.message().to_string(),
    }
}

fn subject_accuracy(log: &[AnswerRecord], subject: Subject) -> Option<f64> {
    let records: Vec<&AnswerRecord> = log.iter().filter(|r| r.subject == subject).collect();
    (!records.is_empty()).then(|| accuracy_pct(records))
}

/// Second-half accuracy relative to the first half, capped at 100.
fn endurance(log: &[AnswerRecord]) -> Option<f64> {
    if log.len() < MIN_ENDURANCE_SAMPLE {
        return None;
    }
    let (first, second) = log.split_at(log.len() / 2);
    let first = accuracy_pct(first);
    let second = accuracy_pct(second);
    let score = if first == 0.0 {
        if second > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (second / first * 100.0).min(100.0)
    };
    Some(score)
}

fn cognitive_profile(log: &[AnswerRecord], precision: &McqPrecision) -> CognitiveProfile {
    let logical_reasoning = subject_accuracy(log, Subject::Logic);
    let endurance = endurance(log);
    let mcq = precision.exact_rate;
    let pattern_recognition = subject_accuracy(log, Subject::Reading);
    let problem_solving = mean(
        Subject::QUANTITATIVE
            .iter()
            .filter_map(|&s| subject_accuracy(log, s)),
    );

    let scores = [
        ("logical_reasoning", logical_reasoning),
        ("endurance", endurance),
        ("precision", mcq),
        ("pattern_recognition", pattern_recognition),
        ("problem_solving", problem_solving),
    ];
    let overall = scores
        .iter()
        .map(|(_, s)| s.unwrap_or(0.0) * PROFILE_WEIGHT)
        .sum();
    let insufficient_data = scores
        .iter()
        .filter(|(_, s)| s.is_none())
        .map(|(name, _)| name.to_string())
        .collect();

    CognitiveProfile {
        logical_reasoning,
        endurance,
        precision: mcq,
        pattern_recognition,
        problem_solving,
        overall,
        insufficient_data,
    }
}

fn difficulty_summary(state: &DifficultyState, log: &[AnswerRecord]) -> DifficultySummary {
    DifficultySummary {
        starting: state.starting(),
        final_level: state.current,
        peak: state.peak(),
        history: state.history.clone(),
        trap_injections: state.trap_injections,
        avg_served: mean(log.iter().map(|r| f64::from(r.difficulty))),
    }
}

fn breakdown_summary(phase: &OverloadPhase, log: &[AnswerRecord]) -> BreakdownSummary {
    let (forced_since, collapsed_at) = match *phase {
        OverloadPhase::Building { .. } => (None, None),
        OverloadPhase::Forced { since, .. } => (Some(since), None),
        OverloadPhase::Collapsed {
            since, at_position, ..
        } => (Some(since), Some(at_position)),
    };
    let forced_accuracy = forced_since.and_then(|since| {
        let end = collapsed_at.map_or(usize::MAX, |p| p + 1);
        let in_phase: Vec<&AnswerRecord> = log
            .iter()
            .filter(|r| r.position >= since && r.position < end)
            .collect();
        (!in_phase.is_empty()).then(|| accuracy_pct(in_phase))
    });
    BreakdownSummary {
        phase: phase.clone(),
        forced_since,
        collapsed_at,
        forced_accuracy,
    }
}

/// Rule-based advice: subject first, then process, then overall.
fn recommendations(report: &DiagnosticReport) -> Vec<Recommendation> {
    let mut out = Vec::new();
    let mut push = |category, message: String| out.push(Recommendation { category, message });

    if let Some(weakest) = report.weakest_subject.and_then(|s| report.subject(s)) {
        if weakest.answered == 0 {
            push(
                RecommendationCategory::Subject,
                format!(
                    "No {} questions were answered; make sure to reach every section.",
                    weakest.subject
                ),
            );
        } else if weakest.accuracy_pct < WEAK_SUBJECT_ACCURACY {
            push(
                RecommendationCategory::Subject,
                format!(
                    "Prioritise {}: {:.0}% accuracy over {} answers.",
                    weakest.subject, weakest.accuracy_pct, weakest.answered
                ),
            );
        }
    }

    if report.auto_submitted && report.answered < report.planned_questions {
        push(
            RecommendationCategory::Process,
            format!(
                "Time ran out with {} of {} questions unanswered.",
                report.planned_questions - report.answered,
                report.planned_questions
            ),
        );
    }
    match report.time_management.pace {
        Pace::Rushed => push(
            RecommendationCategory::Process,
            "You moved faster than the planned pace; use the spare time to double-check answers."
                .to_string(),
        ),
        Pace::Slow => push(
            RecommendationCategory::Process,
            "You spent longer than the planned pace per question; practise timed sets.".to_string(),
        ),
        Pace::Optimal | Pace::InsufficientData => {}
    }
    if report.stress.resistance == Resistance::Low {
        push(
            RecommendationCategory::Process,
            format!(
                "Accuracy dropped {:.0} points in the final quarter; practise under exam conditions.",
                report.stress.accuracy_drop
            ),
        );
    }
    if report.cognitive.endurance.is_some_and(|e| e < LOW_ENDURANCE) {
        push(
            RecommendationCategory::Process,
            "Accuracy fell in the second half; build stamina with full-length practice exams."
                .to_string(),
        );
    }
    if report.precision.attempts >= MIN_PATTERN_SAMPLE
        && report.precision.exact_rate.is_some_and(|r| r < LOW_PRECISION)
    {
        push(
            RecommendationCategory::Process,
            format!(
                "Only {:.0}% of multiple-choice answers were fully correct. {}",
                report.precision.exact_rate.unwrap_or(0.0),
                report.precision.pattern.message()
            ),
        );
    }

    let overall = match report.grade {
        Grade::APlus | Grade::A => "Excellent result; keep the same preparation routine.",
        Grade::B | Grade::C => "Solid result; targeted revision of weaker areas should lift it.",
        Grade::D | Grade::F => "Result below target; review fundamentals across all subjects.",
    };
    push(
        RecommendationCategory::Overall,
        format!(
            "{overall} ({:.1}%, grade {}).",
            report.percentage, report.grade
        ),
    );
    out
}
