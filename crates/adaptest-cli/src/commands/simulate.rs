//! The `adaptest simulate` command.
//!
//! Drives a full session against a simulated test-taker whose chance of
//! answering correctly falls off logistically as question difficulty rises
//! above their ability.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use comfy_table::{Cell, Table};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use adaptest_core::difficulty::OverloadPhase;
use adaptest_core::engine::{ExamEngine, PrepareSummary, ProgressReporter};
use adaptest_core::model::{Question, QuestionType};
use adaptest_core::parser::load_pool;
use adaptest_core::report::{DiagnosticReport, RecommendationCategory};
use adaptest_core::traits::FetchRequest;
use adaptest_providers::{create_sources, load_config_from};

pub struct SimulateArgs {
    pub pool: PathBuf,
    pub config: Option<PathBuf>,
    pub ability: f64,
    pub pace: f64,
    pub seed: u64,
    pub json: bool,
    pub output: Option<PathBuf>,
    pub no_sources: bool,
}

/// Console progress reporter for supplementary fetches.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_fetch_start(&self, source: &str, request: &FetchRequest) {
        eprintln!(
            "  Fetching: {source} :: {} {}",
            request.subject, request.question_type
        );
    }

    fn on_fetch_complete(&self, source: &str, request: &FetchRequest, accepted: usize) {
        eprintln!(
            "  Done: {source} :: {} {} (+{accepted})",
            request.subject, request.question_type
        );
    }

    fn on_fetch_error(&self, source: &str, request: &FetchRequest, error: &str) {
        eprintln!(
            "  ERROR: {source} :: {} {}: {error}",
            request.subject, request.question_type
        );
    }

    fn on_prepare_complete(&self, summary: &PrepareSummary, elapsed: Duration) {
        eprintln!(
            "Supplementary questions: {} added, {} rejected, {} duplicates, {} failed requests ({:.1}s)\n",
            summary.added,
            summary.rejected,
            summary.duplicates,
            summary.failed_requests,
            elapsed.as_secs_f64()
        );
    }
}

/// A seeded test-taker with a fixed ability and pace.
struct SimulatedTaker {
    ability: f64,
    pace: f64,
    rng: StdRng,
}

impl SimulatedTaker {
    fn new(ability: f64, pace: f64, seed: u64) -> Self {
        Self {
            ability,
            pace,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn success_probability(&self, question: &Question, under_pressure: bool) -> f64 {
        let gap = f64::from(question.difficulty) - self.ability;
        let p = 1.0 / (1.0 + (gap / 1.5).exp());
        if under_pressure {
            p * 0.85
        } else {
            p
        }
    }

    /// Selected indices and time spent for one question.
    fn answer(
        &mut self,
        question: &Question,
        expected_ms: u64,
        under_pressure: bool,
    ) -> (Vec<usize>, u64) {
        let jitter = self.rng.random_range(0.6..1.4);
        let spent = ((expected_ms as f64) * self.pace * jitter).round().max(1.0) as u64;

        let p = self.success_probability(question, under_pressure);
        let selected = if self.rng.random_bool(p.clamp(0.0, 1.0)) {
            question.correct.clone()
        } else {
            self.wrong_answer(question)
        };
        (selected, spent)
    }

    fn wrong_answer(&mut self, question: &Question) -> Vec<usize> {
        let wrong: Vec<usize> = (0..question.options.len())
            .filter(|i| !question.correct.contains(i))
            .collect();
        if wrong.is_empty() {
            return Vec::new();
        }
        let pick_wrong = |rng: &mut StdRng| wrong[rng.random_range(0..wrong.len())];

        match question.question_type {
            QuestionType::Single => vec![pick_wrong(&mut self.rng)],
            QuestionType::Multiple => {
                let mut picked = question.correct.clone();
                match self.rng.random_range(0..3) {
                    0 => picked.push(pick_wrong(&mut self.rng)),
                    1 if picked.len() > 1 => {
                        let drop = self.rng.random_range(0..picked.len());
                        picked.remove(drop);
                    }
                    _ => {
                        let swap = self.rng.random_range(0..picked.len());
                        picked[swap] = pick_wrong(&mut self.rng);
                    }
                }
                picked.sort_unstable();
                picked
            }
        }
    }
}

pub async fn execute(args: SimulateArgs) -> Result<()> {
    anyhow::ensure!(
        (0.0..=12.0).contains(&args.ability),
        "ability must be between 0 and 12"
    );
    anyhow::ensure!(args.pace > 0.0, "pace must be positive");

    let config = load_config_from(args.config.as_deref())?;
    let mut exam = config.exam.clone();
    exam.seed.get_or_insert(args.seed);

    let base = load_pool(&args.pool)?;
    let sources = if args.no_sources {
        Vec::new()
    } else {
        create_sources(&config)?
    };
    let engine = ExamEngine::new(sources, config.engine_config());
    let prepared = engine.prepare(base, &exam, &ConsoleReporter).await?;
    let mut session = engine.start_session(&prepared, exam)?;

    eprintln!(
        "adaptest v{}: simulating {} questions ({} points) over {} questions in the pool",
        env!("CARGO_PKG_VERSION"),
        session.config().planned_questions(),
        session.config().planned_max_points(),
        prepared.pool.len()
    );

    let mut taker = SimulatedTaker::new(args.ability, args.pace, args.seed);
    let expected_ms = session.config().expected_ms_per_question();
    let started = Utc::now();
    let mut clock_ms = 0u64;
    let mut at = started;

    while let Some(question) = session.next_question()?.cloned() {
        let under_pressure = session.difficulty().time_pressure;
        let (selected, spent) = taker.answer(&question, expected_ms, under_pressure);
        clock_ms += spent;
        at = started + chrono::Duration::milliseconds(clock_ms as i64);

        let feedback = session.submit(&selected, spent, at)?;
        tracing::debug!(
            question = %feedback.question_id,
            correct = feedback.is_correct,
            next_difficulty = feedback.next_difficulty,
            "answered"
        );
        if session.tick(clock_ms).expired {
            break;
        }
    }

    let auto_submitted = session.remaining_ms() == 0;
    let report = session.finish(auto_submitted, at)?;

    if let Some(path) = &args.output {
        report.save_json(path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    if args.json {
        println!("{}", report.to_json_pretty()?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1}"))
        .unwrap_or_else(|| "-".to_string())
}

fn print_report(report: &DiagnosticReport) {
    println!(
        "Grade {}  {:.1}%  ({} / {} points)",
        report.grade, report.percentage, report.total_score, report.max_score
    );
    println!(
        "Answered {} of {} ({} correct), longest streak {}",
        report.answered, report.planned_questions, report.correct, report.max_streak
    );
    println!(
        "Time used {:.1} of {:.1} min{}",
        report.elapsed_ms as f64 / 60_000.0,
        report.time_budget_ms as f64 / 60_000.0,
        if report.auto_submitted {
            " (auto-submitted)"
        } else {
            ""
        }
    );

    let mut subjects = Table::new();
    subjects.set_header(vec![
        "Subject",
        "Answered",
        "Correct",
        "Score",
        "Max",
        "Accuracy",
        "Avg time",
        "Avg difficulty",
    ]);
    for s in &report.subjects {
        subjects.add_row(vec![
            Cell::new(s.subject),
            Cell::new(s.answered),
            Cell::new(s.correct),
            Cell::new(s.score),
            Cell::new(s.max_score),
            Cell::new(format!("{:.1}%", s.accuracy_pct)),
            Cell::new(
                s.avg_response_ms
                    .map(|ms| format!("{:.1}s", ms / 1000.0))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(
                s.avg_difficulty
                    .map(|d| format!("{d:.1}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    println!("\n{subjects}");
    if let (Some(strongest), Some(weakest)) = (report.strongest_subject, report.weakest_subject) {
        println!("Strongest: {strongest}  Weakest: {weakest}");
    }

    let tm = &report.time_management;
    println!(
        "\nPace: {} (ratio {})",
        tm.pace,
        tm.ratio
            .map(|r| format!("{r:.2}"))
            .unwrap_or_else(|| "-".to_string())
    );
    let stress = &report.stress;
    println!(
        "Stress resistance: {} (accuracy {:.1}% -> {:.1}%, drop {:.1})",
        stress.resistance, stress.normal_accuracy, stress.pressure_accuracy, stress.accuracy_drop
    );

    let cog = &report.cognitive;
    let mut profile = Table::new();
    profile.set_header(vec!["Dimension", "Score"]);
    for (name, value) in [
        ("Logical reasoning", cog.logical_reasoning),
        ("Endurance", cog.endurance),
        ("Precision", cog.precision),
        ("Pattern recognition", cog.pattern_recognition),
        ("Problem solving", cog.problem_solving),
        ("Overall", Some(cog.overall)),
    ] {
        profile.add_row(vec![Cell::new(name), Cell::new(pct(value))]);
    }
    println!("\n{profile}");

    let precision = &report.precision;
    println!(
        "Multiple choice: {} attempts, exact {}%, {}",
        precision.attempts,
        pct(precision.exact_rate),
        precision.pattern_message
    );

    let difficulty = &report.difficulty;
    println!(
        "Difficulty: start {}, final {}, peak {}, {} trap injections",
        difficulty.starting, difficulty.final_level, difficulty.peak, difficulty.trap_injections
    );
    if let Some(breakdown) = &report.breakdown {
        let phase = match breakdown.phase {
            OverloadPhase::Building { .. } => "building".to_string(),
            OverloadPhase::Forced { since, .. } => format!("forced since answer {}", since + 1),
            OverloadPhase::Collapsed { at_position, .. } => {
                format!("collapsed at answer {}", at_position + 1)
            }
        };
        println!("Overload: {phase}");
    }

    if !report.recommendations.is_empty() {
        println!("\nRecommendations:");
        for rec in &report.recommendations {
            let label = match rec.category {
                RecommendationCategory::Subject => "subject",
                RecommendationCategory::Process => "process",
                RecommendationCategory::Overall => "overall",
            };
            println!("  [{label}] {}", rec.message);
        }
    }
}
