//! Adaptive difficulty state machine.
//!
//! [`DifficultyController::transition`] is a pure function of the previous
//! state, the new answer, the full log and the remaining-time fraction.
//! Delta rules run in a fixed order and each later rule may override the
//! earlier result:
//!
//! 1. window accuracy > 85% and time ratio < 0.7 → +2; < 1.0 → +1
//! 2. window accuracy < 60% → −1; < 40% → −2
//! 3. wrong streak ≥ 3 → at most −2
//! 4. correct streak ≥ 5 → trap flag, at least +1
//!
//! The optional overload extension layers a forced high-tier phase and a
//! collapse detector on top of the same transition.

use serde::{Deserialize, Serialize};

use crate::model::{clamp_difficulty, MAX_DIFFICULTY};
use crate::results::AnswerRecord;
use crate::statistics::{trailing, window_stats, WindowStats};

/// Answers needed before the difficulty may move.
pub const MIN_SAMPLE: usize = 3;
/// Default rolling-window size.
pub const DEFAULT_WINDOW: usize = 10;
/// Remaining-time fraction below which the pressure flag is raised.
pub const PRESSURE_THRESHOLD: f64 = 0.25;

const HIGH_ACCURACY: f64 = 0.85;
const FAST_RATIO: f64 = 0.7;
const ON_PACE_RATIO: f64 = 1.0;
const LOW_ACCURACY: f64 = 0.60;
const VERY_LOW_ACCURACY: f64 = 0.40;
const WRONG_STREAK_LIMIT: u32 = 3;
const TRAP_STREAK: u32 = 5;

/// Kind of the current answer streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakKind {
    #[default]
    None,
    Correct,
    Wrong,
}

/// Controller state after each answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyState {
    /// Target difficulty for the next question, always within 1–10.
    pub current: u8,
    pub streak_kind: StreakKind,
    pub streak_len: u32,
    /// Fraction correct over the rolling window.
    pub window_accuracy: f64,
    /// Mean actual/expected time over the rolling window.
    pub window_time_ratio: f64,
    /// Prefer trap questions for the next selection.
    pub trap_pending: bool,
    /// Less than a quarter of the time budget remains.
    pub time_pressure: bool,
    /// Starting difficulty followed by one entry per answer.
    pub history: Vec<u8>,
    /// Number of transitions that raised the trap flag.
    pub trap_injections: u32,
    /// Present only when the overload extension is enabled.
    #[serde(default)]
    pub overload: Option<OverloadPhase>,
}

impl DifficultyState {
    pub fn new(start: u8) -> Self {
        let start = clamp_difficulty(i32::from(start));
        Self {
            current: start,
            streak_kind: StreakKind::None,
            streak_len: 0,
            window_accuracy: 0.0,
            window_time_ratio: 1.0,
            trap_pending: false,
            time_pressure: false,
            history: vec![start],
            trap_injections: 0,
            overload: None,
        }
    }

    pub fn correct_streak(&self) -> u32 {
        if self.streak_kind == StreakKind::Correct {
            self.streak_len
        } else {
            0
        }
    }

    pub fn wrong_streak(&self) -> u32 {
        if self.streak_kind == StreakKind::Wrong {
            self.streak_len
        } else {
            0
        }
    }

    pub fn starting(&self) -> u8 {
        self.history.first().copied().unwrap_or(self.current)
    }

    pub fn peak(&self) -> u8 {
        self.history.iter().copied().max().unwrap_or(self.current)
    }

    /// Refresh the pressure flag from a time-elapsed event.
    pub fn with_time_pressure(&self, remaining_fraction: f64) -> Self {
        Self {
            time_pressure: is_under_pressure(remaining_fraction),
            ..self.clone()
        }
    }
}

/// Pressure flag rule, shared by ticks and transitions.
pub fn is_under_pressure(remaining_fraction: f64) -> bool {
    remaining_fraction < PRESSURE_THRESHOLD
}

/// Thresholds for the overload/breakdown extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverloadConfig {
    /// Window accuracy that counts as sustained high performance.
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: f64,
    /// Minimum difficulty at which high performance counts.
    #[serde(default = "default_qualifying_difficulty")]
    pub qualifying_difficulty: u8,
    /// Consecutive qualifying transitions before the forced phase starts.
    #[serde(default = "default_sustain")]
    pub sustain_transitions: u32,
    /// Difficulty floor while forced.
    #[serde(default = "default_forced_floor")]
    pub forced_floor: u8,
    /// Answers inside the forced phase before collapse can be detected.
    #[serde(default = "default_min_phase_answers")]
    pub min_phase_answers: u32,
    /// Forced-phase accuracy below which stability has collapsed.
    #[serde(default = "default_collapse_accuracy")]
    pub collapse_accuracy: f64,
    /// Levels dropped on collapse.
    #[serde(default = "default_collapse_drop")]
    pub collapse_drop: u8,
}

fn default_high_accuracy() -> f64 {
    HIGH_ACCURACY
}
fn default_qualifying_difficulty() -> u8 {
    8
}
fn default_sustain() -> u32 {
    3
}
fn default_forced_floor() -> u8 {
    9
}
fn default_min_phase_answers() -> u32 {
    3
}
fn default_collapse_accuracy() -> f64 {
    0.5
}
fn default_collapse_drop() -> u8 {
    3
}

impl Default for OverloadConfig {
    fn default() -> Self {
        Self {
            high_accuracy: default_high_accuracy(),
            qualifying_difficulty: default_qualifying_difficulty(),
            sustain_transitions: default_sustain(),
            forced_floor: default_forced_floor(),
            min_phase_answers: default_min_phase_answers(),
            collapse_accuracy: default_collapse_accuracy(),
            collapse_drop: default_collapse_drop(),
        }
    }
}

/// Phase of the overload extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum OverloadPhase {
    /// Counting consecutive qualifying transitions.
    Building { qualifying: u32 },
    /// Difficulty pinned high since log position `since`.
    Forced { since: usize, answers: u32 },
    /// Terminal: performance broke down at `at_position`.
    Collapsed {
        since: usize,
        at_position: usize,
        peak: u8,
    },
}

/// The difficulty state machine.
#[derive(Debug, Clone)]
pub struct DifficultyController {
    window_size: usize,
    overload: Option<OverloadConfig>,
}

impl Default for DifficultyController {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl DifficultyController {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            overload: None,
        }
    }

    /// Enable the overload/breakdown extension.
    pub fn with_overload(mut self, config: OverloadConfig) -> Self {
        self.overload = Some(config);
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Initial state for a session starting at `start`.
    pub fn initial_state(&self, start: u8) -> DifficultyState {
        let mut state = DifficultyState::new(start);
        if self.overload.is_some() {
            state.overload = Some(OverloadPhase::Building { qualifying: 0 });
        }
        state
    }

    /// Compute the state that follows `record`.
    ///
    /// `log` is the full answer log with `record` as its last entry.
    pub fn transition(
        &self,
        state: &DifficultyState,
        record: &AnswerRecord,
        log: &[AnswerRecord],
        remaining_fraction: f64,
    ) -> DifficultyState {
        debug_assert!(log.last().map(|r| r.position) == Some(record.position));

        let (streak_kind, streak_len) = next_streak(state, record.is_correct);
        let stats = window_stats(trailing(log, self.window_size));
        let time_pressure = is_under_pressure(remaining_fraction);

        let mut next = DifficultyState {
            current: state.current,
            streak_kind,
            streak_len,
            window_accuracy: stats.accuracy,
            window_time_ratio: stats.time_ratio,
            trap_pending: false,
            time_pressure,
            history: state.history.clone(),
            trap_injections: state.trap_injections,
            overload: state.overload.clone(),
        };

        if log.len() < MIN_SAMPLE {
            next.history.push(next.current);
            return next;
        }

        let (delta, trap) = compute_delta(&stats, next.correct_streak(), next.wrong_streak());
        let mut level = clamp_difficulty(i32::from(state.current) + delta);

        if let (Some(config), Some(phase)) = (&self.overload, &state.overload) {
            let (phase, adjusted) = advance_overload(config, phase, &stats, record, log, state, level);
            next.overload = Some(phase);
            level = adjusted;
        }

        if trap {
            next.trap_pending = true;
            next.trap_injections += 1;
        }
        if level != state.current {
            tracing::debug!(
                from = state.current,
                to = level,
                delta,
                accuracy = stats.accuracy,
                ratio = stats.time_ratio,
                "difficulty changed"
            );
        }
        next.current = level;
        next.history.push(level);
        next
    }
}

fn next_streak(state: &DifficultyState, correct: bool) -> (StreakKind, u32) {
    match (correct, state.streak_kind) {
        (true, StreakKind::Correct) => (StreakKind::Correct, state.streak_len + 1),
        (true, _) => (StreakKind::Correct, 1),
        (false, StreakKind::Wrong) => (StreakKind::Wrong, state.streak_len + 1),
        (false, _) => (StreakKind::Wrong, 1),
    }
}

/// Apply the four delta rules in order. Returns the delta and the trap flag.
pub fn compute_delta(stats: &WindowStats, correct_streak: u32, wrong_streak: u32) -> (i32, bool) {
    let mut delta = 0;

    if stats.accuracy > HIGH_ACCURACY {
        if stats.time_ratio < FAST_RATIO {
            delta = 2;
        } else if stats.time_ratio < ON_PACE_RATIO {
            delta = 1;
        }
    }

    if stats.accuracy < VERY_LOW_ACCURACY {
        delta = -2;
    } else if stats.accuracy < LOW_ACCURACY {
        delta = -1;
    }

    if wrong_streak >= WRONG_STREAK_LIMIT {
        delta = delta.min(-2);
    }

    let trap = correct_streak >= TRAP_STREAK;
    if trap {
        delta = delta.max(1);
    }

    (delta, trap)
}

fn advance_overload(
    config: &OverloadConfig,
    phase: &OverloadPhase,
    stats: &WindowStats,
    record: &AnswerRecord,
    log: &[AnswerRecord],
    previous: &DifficultyState,
    level: u8,
) -> (OverloadPhase, u8) {
    match *phase {
        OverloadPhase::Building { qualifying } => {
            let qualifies =
                stats.accuracy > config.high_accuracy && level >= config.qualifying_difficulty;
            let qualifying = if qualifies { qualifying + 1 } else { 0 };
            if qualifying >= config.sustain_transitions {
                tracing::info!(position = record.position, "entering forced high-tier phase");
                let floor = config.forced_floor.min(MAX_DIFFICULTY);
                (
                    OverloadPhase::Forced {
                        since: record.position + 1,
                        answers: 0,
                    },
                    level.max(floor),
                )
            } else {
                (OverloadPhase::Building { qualifying }, level)
            }
        }
        OverloadPhase::Forced { since, answers } => {
            let answers = answers + 1;
            let in_phase: Vec<&AnswerRecord> = log.iter().filter(|r| r.position >= since).collect();
            let correct = in_phase.iter().filter(|r| r.is_correct).count();
            let accuracy = if in_phase.is_empty() {
                1.0
            } else {
                correct as f64 / in_phase.len() as f64
            };
            if answers >= config.min_phase_answers && accuracy < config.collapse_accuracy {
                tracing::info!(position = record.position, accuracy, "stability collapse detected");
                let dropped =
                    clamp_difficulty(i32::from(previous.current) - i32::from(config.collapse_drop));
                (
                    OverloadPhase::Collapsed {
                        since,
                        at_position: record.position,
                        peak: previous.peak(),
                    },
                    dropped,
                )
            } else {
                let floor = config.forced_floor.min(MAX_DIFFICULTY);
                (OverloadPhase::Forced { since, answers }, level.max(floor))
            }
        }
        OverloadPhase::Collapsed { .. } => (phase.clone(), level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestionType, Subject};
    use crate::results::MatchKind;
    use chrono::{DateTime, Utc};

    fn record(position: usize, correct: bool, ratio: f64) -> AnswerRecord {
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
            time_spent_ms: (ratio * 1000.0) as u64,
            expected_ms: 1000,
            position,
            under_pressure: false,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Feed `outcomes` through the controller, returning every state.
    fn run(
        controller: &DifficultyController,
        start: u8,
        outcomes: &[(bool, f64)],
    ) -> Vec<DifficultyState> {
        let mut state = controller.initial_state(start);
        let mut log = Vec::new();
        let mut states = Vec::new();
        for (i, &(correct, ratio)) in outcomes.iter().enumerate() {
            let r = record(i, correct, ratio);
            log.push(r.clone());
            state = controller.transition(&state, &r, &log, 1.0);
            states.push(state.clone());
        }
        states
    }

    #[test]
    fn holds_difficulty_until_three_answers() {
        let controller = DifficultyController::default();
        let states = run(&controller, 5, &[(true, 0.5), (true, 0.5)]);
        assert!(states.iter().all(|s| s.current == 5));
        assert_eq!(states[1].correct_streak(), 2);
        assert_eq!(states[1].history, vec![5, 5, 5]);
    }

    #[test]
    fn fast_correct_answers_climb_and_inject_traps() {
        let controller = DifficultyController::default();
        let states = run(&controller, 5, &[(true, 0.5); 5]);
        assert_eq!(states[2].current, 7);
        assert!(!states[3].trap_pending);
        assert!(states[4].trap_pending);
        assert_eq!(states[4].trap_injections, 1);
        assert_eq!(states[4].current, 10);
    }

    #[test]
    fn on_pace_high_accuracy_is_plus_one() {
        let controller = DifficultyController::default();
        let states = run(&controller, 5, &[(true, 0.9); 3]);
        assert_eq!(states[2].current, 6);
    }

    #[test]
    fn slow_high_accuracy_holds() {
        let controller = DifficultyController::default();
        let states = run(&controller, 5, &[(true, 1.2); 3]);
        assert_eq!(states[2].current, 5);
    }

    #[test]
    fn wrong_streak_forces_two_level_drop() {
        let controller = DifficultyController::default();
        let mut log: Vec<_> = (0..7).map(|i| record(i, true, 1.2)).collect();
        log.extend((7..10).map(|i| record(i, false, 1.2)));
        let mut state = DifficultyState::new(6);
        state.streak_kind = StreakKind::Wrong;
        state.streak_len = 2;

        // 70% window accuracy alone would hold the level.
        let next = controller.transition(&state, &log[9], &log, 1.0);
        assert_eq!(next.wrong_streak(), 3);
        assert!(next.current <= 4, "got {}", next.current);
    }

    #[test]
    fn very_low_accuracy_drops_two() {
        let controller = DifficultyController::default();
        let states = run(&controller, 5, &[(false, 1.0), (true, 1.0), (false, 1.0)]);
        assert_eq!(states[2].current, 3);
    }

    #[test]
    fn difficulty_never_leaves_bounds() {
        let controller = DifficultyController::default();
        let states = run(&controller, 2, &[(false, 1.0); 12]);
        assert!(states.iter().all(|s| (1..=10).contains(&s.current)));
        assert_eq!(states.last().unwrap().current, 1);

        let states = run(&controller, 9, &[(true, 0.1); 12]);
        assert!(states.iter().all(|s| (1..=10).contains(&s.current)));
        assert_eq!(states.last().unwrap().current, 10);
    }

    #[test]
    fn decrease_overrides_increase() {
        let stats = WindowStats {
            len: 10,
            accuracy: 0.3,
            time_ratio: 0.2,
        };
        assert_eq!(compute_delta(&stats, 0, 0), (-2, false));
    }

    #[test]
    fn trap_rule_floors_delta_at_plus_one() {
        let stats = WindowStats {
            len: 10,
            accuracy: 0.5,
            time_ratio: 1.0,
        };
        assert_eq!(compute_delta(&stats, 5, 0), (1, true));
    }

    #[test]
    fn pressure_flag_is_a_side_channel() {
        let controller = DifficultyController::default();
        let state = controller.initial_state(5);
        let r = record(0, true, 1.0);
        let next = controller.transition(&state, &r, std::slice::from_ref(&r), 0.2);
        assert!(next.time_pressure);
        assert_eq!(next.current, 5);
        assert!(!state.with_time_pressure(0.5).time_pressure);
        assert!(state.with_time_pressure(0.1).time_pressure);
    }

    #[test]
    fn window_only_counts_recent_answers() {
        let controller = DifficultyController::new(3);
        let mut outcomes = vec![(false, 1.0); 5];
        outcomes.extend([(true, 0.5); 3]);
        let states = run(&controller, 5, &outcomes);
        let last = states.last().unwrap();
        assert!((last.window_accuracy - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overload_forces_high_tier_then_detects_collapse() {
        let controller = DifficultyController::default().with_overload(OverloadConfig::default());
        let mut outcomes = vec![(true, 0.5); 6];
        let states = run(&controller, 8, &outcomes);
        assert!(matches!(
            states.last().unwrap().overload,
            Some(OverloadPhase::Forced { .. })
        ));
        assert!(states.last().unwrap().current >= 9);

        outcomes.extend([(false, 1.0); 3]);
        let states = run(&controller, 8, &outcomes);
        let last = states.last().unwrap();
        match &last.overload {
            Some(OverloadPhase::Collapsed { at_position, peak, .. }) => {
                assert_eq!(*at_position, 7);
                assert_eq!(*peak, 10);
            }
            other => panic!("expected collapse, got {other:?}"),
        }
        assert!(last.current <= 7);
    }

    #[test]
    fn overload_disabled_by_default() {
        let controller = DifficultyController::default();
        let states = run(&controller, 8, &[(true, 0.5); 8]);
        assert!(states.iter().all(|s| s.overload.is_none()));
    }
}
