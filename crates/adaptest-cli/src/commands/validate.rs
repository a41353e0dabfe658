//! The `adaptest validate` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::model::{QuestionPool, QuestionType, Subject};
use adaptest_core::parser;

pub fn execute(pool_path: PathBuf) -> Result<()> {
    let pools = if pool_path.is_dir() {
        parser::load_pool_directory(&pool_path)?
    } else {
        vec![parser::parse_pool(&pool_path)?]
    };
    anyhow::ensure!(
        !pools.is_empty(),
        "no pool files found in {}",
        pool_path.display()
    );

    let mut total_warnings = 0;

    for pool in &pools {
        println!("Pool: {} ({} questions)", pool.name, pool.len());
        for (subject, counts) in coverage(pool) {
            println!(
                "  {subject}: {} single, {} multiple",
                counts[0], counts[1]
            );
        }

        let warnings = parser::validate_pool(pool);
        for w in &warnings {
            let prefix = w
                .question_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All pools valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}

/// Question counts per subject, `[single, multiple]`.
fn coverage(pool: &QuestionPool) -> BTreeMap<Subject, [usize; 2]> {
    let mut counts = BTreeMap::new();
    for question in &pool.questions {
        let slot = match question.question_type {
            QuestionType::Single => 0,
            QuestionType::Multiple => 1,
        };
        counts.entry(question.subject).or_insert([0, 0])[slot] += 1;
    }
    counts
}
