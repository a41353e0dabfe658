//! On-disk pool source: TOML pools under a file or directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use adaptest_core::model::Question;
use adaptest_core::parser::load_pool;
use adaptest_core::traits::{FetchRequest, SupplementarySource};

/// Serves questions from pool files, re-read on every fetch.
pub struct DirectorySource {
    name: String,
    path: PathBuf,
}

impl DirectorySource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl SupplementarySource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Question>> {
        let path = self.path.clone();
        let pool = tokio::task::spawn_blocking(move || load_pool(&path))
            .await
            .context("pool loading task failed")??;

        let questions: Vec<Question> = pool
            .questions
            .into_iter()
            .filter(|q| request.accepts(q))
            .take(request.count as usize)
            .collect();
        tracing::debug!(
            source = %self.name,
            path = %self.path.display(),
            count = questions.len(),
            "loaded questions from disk"
        );
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptest_core::model::{QuestionType, Subject};

    const POOL: &str = r#"
[pool]
id = "extra"
name = "Extra"

[[questions]]
id = "x1"
subject = "mathematics"
type = "single"
difficulty = 3
prompt = "2 + 2?"
options = ["1", "2", "3", "4", "5"]
correct = [3]

[[questions]]
id = "x2"
subject = "mathematics"
type = "single"
difficulty = 8
prompt = "17 * 3?"
options = ["41", "51", "53", "57", "61"]
correct = [1]

[[questions]]
id = "x3"
subject = "logic"
type = "single"
difficulty = 5
prompt = "All A are B."
options = ["a", "b", "c", "d", "e"]
correct = [0]
"#;

    #[tokio::test]
    async fn filters_by_slot_range_and_count() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("extra.toml"), POOL).unwrap();
        let source = DirectorySource::new("disk", dir.path());

        let request = FetchRequest::new(Subject::Mathematics, QuestionType::Single, 5);
        let all = source.fetch(&request).await.unwrap();
        assert_eq!(all.len(), 2);

        let mut narrow = FetchRequest::new(Subject::Mathematics, QuestionType::Single, 5);
        narrow.min_difficulty = 6;
        let hard = source.fetch(&narrow).await.unwrap();
        assert_eq!(hard.len(), 1);
        assert_eq!(hard[0].id, "x2");

        let one = FetchRequest::new(Subject::Mathematics, QuestionType::Single, 1);
        assert_eq!(source.fetch(&one).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new("disk", dir.path().join("absent.toml"));
        let request = FetchRequest::new(Subject::Logic, QuestionType::Single, 1);
        assert!(source.fetch(&request).await.is_err());
    }
}
