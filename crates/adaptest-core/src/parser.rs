//! TOML question-pool parser.
//!
//! Loads question pools from TOML files and directories, and validates them.
//! Structural defects that would break scoring are hard errors; softer
//! content issues are reported by [`validate_pool`] as warnings.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{Question, QuestionPool, QuestionType, Subject, MAX_DIFFICULTY, MIN_DIFFICULTY};

/// Intermediate TOML structure for parsing pool files.
#[derive(Debug, Deserialize)]
struct TomlPoolFile {
    pool: TomlPoolHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlPoolHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    subject: String,
    #[serde(rename = "type")]
    question_type: String,
    difficulty: i64,
    prompt: String,
    #[serde(default)]
    options: Vec<String>,
    correct: Vec<usize>,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    trap: bool,
    #[serde(default)]
    passage: Option<String>,
}

/// Parse a single TOML file into a `QuestionPool`.
pub fn parse_pool(path: &Path) -> Result<QuestionPool> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pool file: {}", path.display()))?;

    parse_pool_str(&content, path)
}

/// Parse a TOML string into a `QuestionPool` (useful for testing).
pub fn parse_pool_str(content: &str, source_path: &Path) -> Result<QuestionPool> {
    let parsed: TomlPoolFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let subject: Subject = q
                .subject
                .parse()
                .map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e))?;
            let question_type: QuestionType = q
                .question_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e))?;
            if !(i64::from(MIN_DIFFICULTY)..=i64::from(MAX_DIFFICULTY)).contains(&q.difficulty) {
                anyhow::bail!(
                    "question {}: difficulty {} is outside {}-{}",
                    q.id,
                    q.difficulty,
                    MIN_DIFFICULTY,
                    MAX_DIFFICULTY
                );
            }

            let question = Question {
                id: q.id,
                subject,
                question_type,
                difficulty: q.difficulty as u8,
                prompt: q.prompt,
                options: q.options,
                correct: q.correct,
                topic: q.topic,
                explanation: q.explanation,
                trap: q.trap,
                passage_group: q.passage,
            };
            if let Some(defect) = question_defect(&question) {
                anyhow::bail!("question {}: {}", question.id, defect);
            }
            Ok(question)
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("invalid question in {}", source_path.display()))?;

    Ok(QuestionPool {
        id: parsed.pool.id,
        name: parsed.pool.name,
        description: parsed.pool.description,
        questions,
    })
}

/// Describe a defect that makes a question unscoreable, if any.
pub fn question_defect(question: &Question) -> Option<String> {
    if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&question.difficulty) {
        return Some(format!("difficulty {} is out of range", question.difficulty));
    }
    if question.correct.is_empty() {
        return Some("correct answer set is empty".into());
    }
    if let Some(&index) = question.correct.iter().find(|&&i| i >= question.options.len()) {
        return Some(format!(
            "correct index {index} is out of range for {} options",
            question.options.len()
        ));
    }
    let distinct: HashSet<usize> = question.correct.iter().copied().collect();
    if distinct.len() != question.correct.len() {
        return Some("correct answer set repeats an index".into());
    }
    if question.question_type == QuestionType::Single && question.correct.len() != 1 {
        return Some(format!(
            "single-choice question has {} correct indices",
            question.correct.len()
        ));
    }
    None
}

/// Recursively load all `.toml` pool files from a directory.
pub fn load_pool_directory(dir: &Path) -> Result<Vec<QuestionPool>> {
    let mut pools = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            pools.extend(load_pool_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_pool(&path) {
                Ok(pool) => pools.push(pool),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(pools)
}

/// Load a pool file, or merge every pool under a directory into one.
pub fn load_pool(path: &Path) -> Result<QuestionPool> {
    if !path.is_dir() {
        return parse_pool(path);
    }
    let pools = load_pool_directory(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pool".to_string());
    let mut merged = QuestionPool::new(name.clone(), name, Vec::new());
    for pool in pools {
        merged.merge(pool.questions);
    }
    Ok(merged)
}

/// A warning from pool validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a pool for content issues that do not block loading.
pub fn validate_pool(pool: &QuestionPool) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for question in &pool.questions {
        if !seen_ids.insert(&question.id) {
            warnings.push(ValidationWarning {
                question_id: Some(question.id.clone()),
                message: format!("duplicate question ID: {}", question.id),
            });
        }
    }

    for question in &pool.questions {
        let expected = question.question_type.option_count();
        if question.options.len() != expected {
            warnings.push(ValidationWarning {
                question_id: Some(question.id.clone()),
                message: format!(
                    "{} question has {} options, expected {}",
                    question.question_type,
                    question.options.len(),
                    expected
                ),
            });
        }
        if question.prompt.trim().is_empty() {
            warnings.push(ValidationWarning {
                question_id: Some(question.id.clone()),
                message: "prompt is empty".into(),
            });
        }
    }

    let mut groups: HashMap<&str, Vec<&Question>> = HashMap::new();
    for question in &pool.questions {
        if let Some(group) = question.passage_group.as_deref() {
            groups.entry(group).or_default().push(question);
        }
    }
    let mut group_names: Vec<&str> = groups.keys().copied().collect();
    group_names.sort_unstable();
    for group in group_names {
        let members = &groups[group];
        let subjects: HashSet<Subject> = members.iter().map(|q| q.subject).collect();
        if subjects.len() > 1 {
            warnings.push(ValidationWarning {
                question_id: None,
                message: format!("passage group {group} spans {} subjects", subjects.len()),
            });
        }
        let types: HashSet<QuestionType> = members.iter().map(|q| q.question_type).collect();
        if types.len() > 1 {
            warnings.push(ValidationWarning {
                question_id: None,
                message: format!("passage group {group} mixes question types"),
            });
        }
    }

    if pool.questions.is_empty() {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "pool has no questions".into(),
        });
    }

    warnings
}
