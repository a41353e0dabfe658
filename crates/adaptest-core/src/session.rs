//! The per-session reducer.
//!
//! An [`ExamSession`] owns everything one attempt mutates: the answer log,
//! the difficulty and performance states, the used-id set and the selection
//! cursor. Each external event (submit, tick, end) is one explicit
//! transition. Once finalized, the session rejects every further submit with
//! [`EngineError::SessionClosed`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::PerformanceState;
use crate::diagnostics::{synthesize, SynthesisInput};
use crate::difficulty::{DifficultyController, DifficultyState, OverloadConfig, DEFAULT_WINDOW};
use crate::error::EngineError;
use crate::model::{Question, QuestionType, Subject, SubjectQuota, MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::report::DiagnosticReport;
use crate::results::{AnswerRecord, MatchKind};
use crate::scoring::{score_answer, Submission};
use crate::selector::{draw_batch, QuestionSelector, SelectionRequest};
use crate::traits::QuestionRepository;

/// How questions are chosen for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// One question at a time, re-targeted after every answer.
    #[default]
    Adaptive,
    /// The whole session is drawn up front against the starting difficulty.
    Batch,
}

/// Session parameters, fixed at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_total_time_secs")]
    pub total_time_secs: u64,
    #[serde(default = "default_quotas")]
    pub quotas: Vec<SubjectQuota>,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_starting_difficulty")]
    pub starting_difficulty: u8,
    #[serde(default)]
    pub mode: SelectionMode,
    /// Selection seed; OS entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub overload: Option<OverloadConfig>,
}

fn default_total_time_secs() -> u64 {
    3600
}

fn default_quotas() -> Vec<SubjectQuota> {
    Subject::ALL
        .iter()
        .map(|&subject| SubjectQuota::new(subject, 6, 3))
        .collect()
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW
}

fn default_starting_difficulty() -> u8 {
    5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_time_secs: default_total_time_secs(),
            quotas: default_quotas(),
            window_size: default_window_size(),
            starting_difficulty: default_starting_difficulty(),
            mode: SelectionMode::default(),
            seed: None,
            overload: None,
        }
    }
}

impl SessionConfig {
    pub fn planned_questions(&self) -> u32 {
        self.quotas
            .iter()
            .fold(0u32, |total, q| total.saturating_add(q.questions()))
    }

    pub fn planned_max_points(&self) -> u32 {
        self.quotas
            .iter()
            .fold(0u32, |total, q| total.saturating_add(q.max_points()))
    }

    /// Exact point total, `None` when it does not fit in a `u32`.
    fn checked_max_points(&self) -> Option<u32> {
        self.quotas.iter().try_fold(0u32, |total, q| {
            let single = q.single.checked_mul(QuestionType::Single.max_points())?;
            let multiple = q.multiple.checked_mul(QuestionType::Multiple.max_points())?;
            total.checked_add(single.checked_add(multiple)?)
        })
    }

    pub fn time_budget_ms(&self) -> u64 {
        self.total_time_secs.saturating_mul(1000)
    }

    /// Budget divided evenly over the planned questions.
    pub fn expected_ms_per_question(&self) -> u64 {
        match self.planned_questions() {
            0 => 0,
            n => self.time_budget_ms() / u64::from(n),
        }
    }

    pub fn quota_for(&self, subject: Subject) -> Option<&SubjectQuota> {
        self.quotas.iter().find(|q| q.subject == subject)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.total_time_secs == 0 {
            return Err(EngineError::InvalidConfig("time budget must be positive".into()));
        }
        if self.planned_questions() == 0 {
            return Err(EngineError::InvalidConfig("quotas plan no questions".into()));
        }
        if self.checked_max_points().is_none() {
            return Err(EngineError::InvalidConfig("quota totals overflow".into()));
        }
        if self.window_size == 0 {
            return Err(EngineError::InvalidConfig("window size must be positive".into()));
        }
        if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&self.starting_difficulty) {
            return Err(EngineError::InvalidConfig(format!(
                "starting difficulty {} is outside {MIN_DIFFICULTY}-{MAX_DIFFICULTY}",
                self.starting_difficulty
            )));
        }
        let mut seen = HashSet::new();
        for quota in &self.quotas {
            if !seen.insert(quota.subject) {
                return Err(EngineError::InvalidConfig(format!(
                    "subject {} has more than one quota",
                    quota.subject
                )));
            }
        }
        Ok(())
    }

    /// The difficulty controller these settings describe.
    pub fn controller(&self) -> DifficultyController {
        let controller = DifficultyController::new(self.window_size);
        match &self.overload {
            Some(overload) => controller.with_overload(overload.clone()),
            None => controller,
        }
    }
}

/// Immediate result of one submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerFeedback {
    pub question_id: String,
    pub is_correct: bool,
    pub match_kind: MatchKind,
    pub points: u32,
    pub max_points: u32,
    pub correct: Vec<usize>,
    /// The question's explanation, verbatim.
    pub explanation: String,
    pub next_difficulty: u8,
    pub trap_pending: bool,
    pub time_pressure: bool,
    pub remaining_ms: u64,
}

/// Countdown state after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickStatus {
    pub remaining_ms: u64,
    pub time_pressure: bool,
    pub expired: bool,
}

/// External events a session reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Submit {
        selected: Vec<usize>,
        time_spent_ms: u64,
        at: DateTime<Utc>,
    },
    Tick {
        elapsed_ms: u64,
    },
    End {
        auto_submitted: bool,
        at: DateTime<Utc>,
    },
}

/// What handling an event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Answered(AnswerFeedback),
    Ticked(TickStatus),
    Finished(Box<DiagnosticReport>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Finalized,
}

/// Adaptive-mode position in the subject plan.
#[derive(Debug, Clone, Copy, Default)]
struct PlanCursor {
    quota_index: usize,
    served_in_subject: u32,
}

/// One examination attempt.
pub struct ExamSession<R = StdRng> {
    id: Uuid,
    config: SessionConfig,
    repository: Arc<dyn QuestionRepository>,
    selector: QuestionSelector<R>,
    controller: DifficultyController,
    difficulty: DifficultyState,
    performance: PerformanceState,
    log: Vec<AnswerRecord>,
    used: HashSet<String>,
    cursor: PlanCursor,
    /// Passage-group members queued to follow the question just served.
    pending: VecDeque<Question>,
    /// Pre-drawn questions in batch mode.
    batch: Option<VecDeque<Question>>,
    current: Option<Question>,
    ticked_ms: u64,
    answered_ms: u64,
    phase: Phase,
    report: Option<DiagnosticReport>,
}

impl ExamSession<StdRng> {
    /// Start a session, seeding selection from the config or OS entropy.
    pub fn new(
        config: SessionConfig,
        repository: Arc<dyn QuestionRepository>,
    ) -> Result<Self, EngineError> {
        let selector = match config.seed {
            Some(seed) => QuestionSelector::seeded(seed),
            None => QuestionSelector::from_entropy(),
        };
        Self::with_selector(config, repository, selector)
    }
}

impl<R: Rng> ExamSession<R> {
    pub fn with_selector(
        config: SessionConfig,
        repository: Arc<dyn QuestionRepository>,
        selector: QuestionSelector<R>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let controller = config.controller();
        let difficulty = controller.initial_state(config.starting_difficulty);
        let performance = PerformanceState::new(config.window_size);

        let batch = match config.mode {
            SelectionMode::Adaptive => None,
            SelectionMode::Batch => Some(
                draw_batch(repository.as_ref(), &config.quotas, config.starting_difficulty)
                    .into_iter()
                    .cloned()
                    .collect(),
            ),
        };

        let id = Uuid::new_v4();
        tracing::info!(
            session = %id,
            mode = ?config.mode,
            planned = config.planned_questions(),
            budget_secs = config.total_time_secs,
            "session started"
        );

        Ok(Self {
            id,
            config,
            repository,
            selector,
            controller,
            difficulty,
            performance,
            log: Vec::new(),
            used: HashSet::new(),
            cursor: PlanCursor::default(),
            pending: VecDeque::new(),
            batch,
            current: None,
            ticked_ms: 0,
            answered_ms: 0,
            phase: Phase::Active,
            report: None,
        })
    }

    /// Replace the random session id.
    pub fn with_session_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn log(&self) -> &[AnswerRecord] {
        &self.log
    }

    pub fn difficulty(&self) -> &DifficultyState {
        &self.difficulty
    }

    pub fn performance(&self) -> &PerformanceState {
        &self.performance
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Finalized
    }

    pub fn report(&self) -> Option<&DiagnosticReport> {
        self.report.as_ref()
    }

    /// Consumed time: the later of the driver's clock and the summed answer times.
    pub fn elapsed_ms(&self) -> u64 {
        self.ticked_ms.max(self.answered_ms)
    }

    pub fn remaining_ms(&self) -> u64 {
        self.config.time_budget_ms().saturating_sub(self.elapsed_ms())
    }

    fn remaining_fraction(&self) -> f64 {
        let budget = self.config.time_budget_ms();
        if budget == 0 {
            0.0
        } else {
            self.remaining_ms() as f64 / budget as f64
        }
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        match self.phase {
            Phase::Active => Ok(()),
            Phase::Finalized => Err(EngineError::SessionClosed(self.id)),
        }
    }

    /// The question to show next, or `None` when the plan is complete or the
    /// time budget is spent. Repeated calls return the same question until it
    /// is answered.
    pub fn next_question(&mut self) -> Result<Option<&Question>, EngineError> {
        self.ensure_open()?;
        if self.current.is_none() && self.remaining_ms() > 0 {
            self.current = match self.batch.as_mut() {
                Some(batch) => batch.pop_front(),
                None => self.next_adaptive(),
            };
            if let Some(question) = &self.current {
                self.used.insert(question.id.clone());
            }
        }
        Ok(self.current.as_ref())
    }

    fn current_slot(&self) -> Option<(SubjectQuota, QuestionType)> {
        let quota = *self.config.quotas.get(self.cursor.quota_index)?;
        let served = self.cursor.served_in_subject;
        if served < quota.single {
            Some((quota, QuestionType::Single))
        } else if served < quota.questions() {
            Some((quota, QuestionType::Multiple))
        } else {
            None
        }
    }

    fn advance_subject(&mut self) {
        self.cursor = PlanCursor {
            quota_index: self.cursor.quota_index + 1,
            served_in_subject: 0,
        };
        self.pending.clear();
    }

    fn next_adaptive(&mut self) -> Option<Question> {
        loop {
            if self.cursor.quota_index >= self.config.quotas.len() {
                return None;
            }
            let Some((quota, question_type)) = self.current_slot() else {
                self.advance_subject();
                continue;
            };

            if let Some(question) = self.pending.pop_front() {
                self.cursor.served_in_subject += 1;
                return Some(question);
            }

            let request = SelectionRequest {
                target: self.difficulty.current,
                subject: quota.subject,
                question_type,
                prefer_trap: self.difficulty.trap_pending,
                excluded: &self.used,
            };
            match self.selector.select(self.repository.as_ref(), &request) {
                Ok(selection) => {
                    let question = selection.question.clone();
                    self.cursor.served_in_subject += 1;
                    self.queue_passage(&question, quota);
                    return Some(question);
                }
                Err(err) => {
                    tracing::info!(
                        session = %self.id,
                        subject = %quota.subject,
                        served = self.cursor.served_in_subject,
                        "{err}, advancing to next subject"
                    );
                    self.advance_subject();
                }
            }
        }
    }

    /// Queue the unused rest of a passage group behind `question`.
    fn queue_passage(&mut self, question: &Question, quota: SubjectQuota) {
        let Some(group) = question.passage_group.as_deref() else {
            return;
        };
        let room = quota
            .questions()
            .saturating_sub(self.cursor.served_in_subject) as usize;
        let members: Vec<Question> = self
            .repository
            .passage_members(question.subject, group)
            .into_iter()
            .filter(|q| q.id != question.id && !self.used.contains(&q.id))
            .take(room)
            .cloned()
            .collect();
        for member in members {
            self.used.insert(member.id.clone());
            self.pending.push_back(member);
        }
    }

    /// Judge an answer to the current question and advance every state once.
    pub fn submit(
        &mut self,
        selected: &[usize],
        time_spent_ms: u64,
        at: DateTime<Utc>,
    ) -> Result<AnswerFeedback, EngineError> {
        self.ensure_open()?;
        let question = self.current.take().ok_or(EngineError::NoActiveQuestion)?;

        let record = score_answer(
            &question,
            &Submission {
                selected,
                time_spent_ms,
                expected_ms: self.config.expected_ms_per_question(),
                position: self.log.len(),
                under_pressure: self.difficulty.time_pressure,
                timestamp: at,
            },
        );
        self.answered_ms = self.answered_ms.saturating_add(time_spent_ms);

        let feedback = AnswerFeedback {
            question_id: question.id,
            is_correct: record.is_correct,
            match_kind: record.match_kind,
            points: record.points,
            max_points: record.max_points,
            correct: record.correct.clone(),
            explanation: question.explanation,
            next_difficulty: 0,
            trap_pending: false,
            time_pressure: false,
            remaining_ms: 0,
        };

        self.performance = self.performance.apply(&record);
        self.log.push(record);
        let remaining = self.remaining_fraction();
        let last = &self.log[self.log.len() - 1];
        self.difficulty = self
            .controller
            .transition(&self.difficulty, last, &self.log, remaining);

        Ok(AnswerFeedback {
            next_difficulty: self.difficulty.current,
            trap_pending: self.difficulty.trap_pending,
            time_pressure: self.difficulty.time_pressure,
            remaining_ms: self.remaining_ms(),
            ..feedback
        })
    }

    /// Record the driver's elapsed time and refresh the pressure flag.
    pub fn tick(&mut self, elapsed_ms: u64) -> TickStatus {
        if self.phase == Phase::Active {
            self.ticked_ms = self.ticked_ms.max(elapsed_ms);
            self.difficulty = self.difficulty.with_time_pressure(self.remaining_fraction());
        }
        let remaining_ms = self.remaining_ms();
        TickStatus {
            remaining_ms,
            time_pressure: self.difficulty.time_pressure,
            expired: remaining_ms == 0,
        }
    }

    /// Finalize the session and synthesize its report exactly once.
    pub fn finish(
        &mut self,
        auto_submitted: bool,
        at: DateTime<Utc>,
    ) -> Result<DiagnosticReport, EngineError> {
        self.ensure_open()?;
        if let Some(unanswered) = self.current.take() {
            tracing::debug!(question = %unanswered.id, "discarding unanswered question");
        }
        self.phase = Phase::Finalized;

        let report = synthesize(&SynthesisInput {
            session_id: self.id,
            config: &self.config,
            log: &self.log,
            performance: &self.performance,
            difficulty: &self.difficulty,
            elapsed_ms: self.elapsed_ms(),
            auto_submitted,
            generated_at: at,
        });
        tracing::info!(
            session = %self.id,
            answered = report.answered,
            score = report.total_score,
            grade = %report.grade,
            auto_submitted,
            "session finalized"
        );
        self.report = Some(report.clone());
        Ok(report)
    }

    /// Apply one external event.
    pub fn handle(&mut self, event: SessionEvent) -> Result<SessionOutcome, EngineError> {
        match event {
            SessionEvent::Submit {
                selected,
                time_spent_ms,
                at,
            } => self
                .submit(&selected, time_spent_ms, at)
                .map(SessionOutcome::Answered),
            SessionEvent::Tick { elapsed_ms } => Ok(SessionOutcome::Ticked(self.tick(elapsed_ms))),
            SessionEvent::End { auto_submitted, at } => self
                .finish(auto_submitted, at)
                .map(|r| SessionOutcome::Finished(Box::new(r))),
        }
    }
}
