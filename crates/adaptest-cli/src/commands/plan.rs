//! The `adaptest plan` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use adaptest_core::model::{MAX_DIFFICULTY, MIN_DIFFICULTY};
use adaptest_core::parser::load_pool;
use adaptest_core::selector::draw_batch;
use adaptest_providers::load_config_from;

pub fn execute(
    pool_path: PathBuf,
    config_path: Option<PathBuf>,
    seed_difficulty: Option<u8>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let exam = &config.exam;
    exam.validate()?;

    let seed = seed_difficulty.unwrap_or(exam.starting_difficulty);
    anyhow::ensure!(
        (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&seed),
        "seed difficulty must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY}"
    );

    let pool = load_pool(&pool_path)?;
    let drawn = draw_batch(&pool, &exam.quotas, seed);

    let mut table = Table::new();
    table.set_header(vec![
        "#",
        "Question",
        "Subject",
        "Type",
        "Difficulty",
        "Trap",
        "Passage",
    ]);
    for (i, question) in drawn.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&question.id),
            Cell::new(question.subject),
            Cell::new(question.question_type),
            Cell::new(question.difficulty),
            Cell::new(if question.trap { "yes" } else { "" }),
            Cell::new(question.passage_group.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");

    let points: u32 = drawn.iter().map(|q| q.max_points()).sum();
    println!(
        "Planned {} of {} questions ({} of {} points) around difficulty {}",
        drawn.len(),
        exam.planned_questions(),
        points,
        exam.planned_max_points(),
        seed
    );
    if drawn.len() < exam.planned_questions() as usize {
        println!("WARNING: the pool cannot fill every quota slot.");
    }

    Ok(())
}
