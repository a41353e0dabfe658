//! Exam engine: supplementary pool preparation and session start.
//!
//! Supplementary questions are fetched eagerly, before any session exists,
//! with bounded concurrency. The engine never retries a failed fetch; retry
//! policy belongs to the source. Failures are logged and skipped so a
//! session can always start from the base pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::EngineError;
use crate::model::{Question, QuestionPool, QuestionType};
use crate::parser::question_defect;
use crate::session::{ExamSession, SessionConfig};
use crate::traits::{FetchRequest, QuestionRepository, SupplementarySource};

/// Configuration for supplementary preparation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent fetches.
    pub parallelism: usize,
    /// Questions requested per subject/type slot from each source.
    pub supplementary_per_type: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            supplementary_per_type: 5,
        }
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_fetch_start(&self, source: &str, request: &FetchRequest);
    fn on_fetch_complete(&self, source: &str, request: &FetchRequest, accepted: usize);
    fn on_fetch_error(&self, source: &str, request: &FetchRequest, error: &str);
    fn on_prepare_complete(&self, summary: &PrepareSummary, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_fetch_start(&self, _: &str, _: &FetchRequest) {}
    fn on_fetch_complete(&self, _: &str, _: &FetchRequest, _: usize) {}
    fn on_fetch_error(&self, _: &str, _: &FetchRequest, _: &str) {}
    fn on_prepare_complete(&self, _: &PrepareSummary, _: Duration) {}
}

/// Outcome counts of one preparation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareSummary {
    pub requests: usize,
    pub failed_requests: usize,
    pub fetched: usize,
    /// Questions rejected for defects or for not matching their request.
    pub rejected: usize,
    /// Questions whose id was already present.
    pub duplicates: usize,
    pub added: usize,
}

/// A pool ready for sessions.
#[derive(Debug, Clone)]
pub struct PreparedPool {
    pub pool: Arc<QuestionPool>,
    pub summary: PrepareSummary,
}

/// The exam engine.
pub struct ExamEngine {
    sources: Vec<Arc<dyn SupplementarySource>>,
    config: EngineConfig,
}

impl ExamEngine {
    pub fn new(sources: Vec<Arc<dyn SupplementarySource>>, config: EngineConfig) -> Self {
        Self { sources, config }
    }

    /// Engine with no supplementary sources.
    pub fn offline() -> Self {
        Self::new(Vec::new(), EngineConfig::default())
    }

    fn requests_for(&self, session: &SessionConfig) -> Vec<FetchRequest> {
        if self.config.supplementary_per_type == 0 {
            return Vec::new();
        }
        session
            .quotas
            .iter()
            .flat_map(|quota| {
                QuestionType::ALL
                    .into_iter()
                    .filter(move |&t| quota.count_for(t) > 0)
                    .map(move |t| {
                        FetchRequest::new(quota.subject, t, self.config.supplementary_per_type)
                    })
            })
            .collect()
    }

    /// Fetch supplementary questions for every planned slot and merge them
    /// into `base`.
    pub async fn prepare(
        &self,
        base: QuestionPool,
        session: &SessionConfig,
        progress: &dyn ProgressReporter,
    ) -> Result<PreparedPool> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let requests = self.requests_for(session);

        let mut futures = FuturesUnordered::new();
        let mut index = 0usize;
        for source in &self.sources {
            for request in &requests {
                let source = Arc::clone(source);
                let semaphore = Arc::clone(&semaphore);
                let request = request.clone();
                let order = index;
                index += 1;
                progress.on_fetch_start(source.name(), &request);

                futures.push(async move {
                    let outcome = async {
                        let _permit = semaphore
                            .acquire()
                            .await
                            .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                        source.fetch(&request).await
                    }
                    .await;
                    (order, source, request, outcome)
                });
            }
        }

        let mut completed = Vec::with_capacity(index);
        while let Some(done) = futures.next().await {
            completed.push(done);
        }
        // Merge in request order so the prepared pool does not depend on
        // completion order.
        completed.sort_by_key(|(order, ..)| *order);

        let mut pool = base;
        let mut summary = PrepareSummary {
            requests: completed.len(),
            ..PrepareSummary::default()
        };
        for (_, source, request, outcome) in completed {
            match outcome {
                Ok(questions) => {
                    summary.fetched += questions.len();
                    let accepted = accept(source.name(), &request, questions, &mut summary);
                    let offered = accepted.len();
                    let added = pool.merge(accepted);
                    summary.duplicates += offered - added;
                    summary.added += added;
                    progress.on_fetch_complete(source.name(), &request, added);
                }
                Err(e) => {
                    summary.failed_requests += 1;
                    tracing::warn!(
                        source = source.name(),
                        subject = %request.subject,
                        question_type = %request.question_type,
                        "supplementary fetch failed: {:#}",
                        e
                    );
                    progress.on_fetch_error(source.name(), &request, &format!("{e:#}"));
                }
            }
        }

        tracing::info!(
            added = summary.added,
            failed = summary.failed_requests,
            pool_size = pool.len(),
            "supplementary preparation complete"
        );
        progress.on_prepare_complete(&summary, start.elapsed());

        Ok(PreparedPool {
            pool: Arc::new(pool),
            summary,
        })
    }

    /// Start a session over a prepared pool.
    pub fn start_session(
        &self,
        prepared: &PreparedPool,
        config: SessionConfig,
    ) -> Result<ExamSession, EngineError> {
        let repository: Arc<dyn QuestionRepository> = prepared.pool.clone();
        ExamSession::new(config, repository)
    }
}

/// Drop questions that are malformed or outside the requested slot.
fn accept(
    source: &str,
    request: &FetchRequest,
    questions: Vec<Question>,
    summary: &mut PrepareSummary,
) -> Vec<Question> {
    questions
        .into_iter()
        .filter(|q| {
            if let Some(defect) = question_defect(q) {
                tracing::warn!(source, question = %q.id, "dropping supplementary question: {defect}");
                summary.rejected += 1;
                return false;
            }
            if !request.accepts(q) {
                tracing::warn!(source, question = %q.id, "dropping question outside requested slot");
                summary.rejected += 1;
                return false;
            }
            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Subject, SubjectQuota};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn question(id: &str, subject: Subject, question_type: QuestionType) -> Question {
        Question {
            id: id.into(),
            subject,
            question_type,
            difficulty: 5,
            prompt: "p".into(),
            options: vec![String::new(); question_type.option_count()],
            correct: vec![0],
            topic: String::new(),
            explanation: String::new(),
            trap: false,
            passage_group: None,
        }
    }

    /// Answers every request with one question for the requested slot.
    struct SlotSource {
        name: String,
        calls: AtomicU32,
    }

    #[async_trait]
    impl SupplementarySource for SlotSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, request: &FetchRequest) -> anyhow::Result<Vec<Question>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = format!("{}-{}-{}", self.name, request.subject, request.question_type);
            let mut broken = question(&format!("{id}-broken"), request.subject, request.question_type);
            broken.correct.clear();
            Ok(vec![
                question(&id, request.subject, request.question_type),
                broken,
            ])
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SupplementarySource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch(&self, _: &FetchRequest) -> anyhow::Result<Vec<Question>> {
            anyhow::bail!("connection refused")
        }
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            quotas: vec![
                SubjectQuota::new(Subject::Logic, 2, 1),
                SubjectQuota::new(Subject::Reading, 2, 0),
            ],
            seed: Some(3),
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn prepare_merges_valid_questions_and_skips_failures() {
        let source = Arc::new(SlotSource {
            name: "remote".into(),
            calls: AtomicU32::new(0),
        });
        let sources: Vec<Arc<dyn SupplementarySource>> =
            vec![source.clone(), Arc::new(FailingSource)];
        let engine = ExamEngine::new(
            sources,
            EngineConfig {
                parallelism: 2,
                supplementary_per_type: 3,
            },
        );
        let base = QuestionPool::new(
            "base",
            "Base",
            vec![question("remote-logic-single", Subject::Logic, QuestionType::Single)],
        );

        let prepared = engine
            .prepare(base, &session_config(), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        let summary = &prepared.summary;
        assert_eq!(summary.requests, 6);
        assert_eq!(summary.failed_requests, 3);
        assert_eq!(summary.fetched, 6);
        assert_eq!(summary.rejected, 3);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.added, 2);
        assert_eq!(prepared.pool.len(), 3);
        assert!(prepared.pool.contains("remote-reading-single"));
    }

    #[tokio::test]
    async fn offline_engine_keeps_base_pool() {
        let engine = ExamEngine::offline();
        let base = QuestionPool::new(
            "base",
            "Base",
            vec![question("a", Subject::Logic, QuestionType::Single)],
        );
        let prepared = engine
            .prepare(base, &session_config(), &NoopReporter)
            .await
            .unwrap();
        assert_eq!(prepared.summary, PrepareSummary::default());
        assert_eq!(prepared.pool.len(), 1);

        let mut session = engine.start_session(&prepared, session_config()).unwrap();
        assert_eq!(session.next_question().unwrap().unwrap().id, "a");
    }

    #[test]
    fn start_session_validates_config() {
        let engine = ExamEngine::offline();
        let prepared = PreparedPool {
            pool: Arc::new(QuestionPool::default()),
            summary: PrepareSummary::default(),
        };
        let config = SessionConfig {
            quotas: Vec::new(),
            ..SessionConfig::default()
        };
        assert!(matches!(
            engine.start_session(&prepared, config),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
