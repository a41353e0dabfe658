//! In-memory source for exercising the engine without a network.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use adaptest_core::model::Question;
use adaptest_core::traits::{FetchRequest, SupplementarySource};

/// Serves a fixed question list, or fails every request.
pub struct MockSource {
    name: String,
    questions: Vec<Question>,
    failure: Option<String>,
    call_count: AtomicU32,
    last_request: Mutex<Option<FetchRequest>>,
}

impl MockSource {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            name: "mock".to_string(),
            questions,
            failure: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A source whose every fetch fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<FetchRequest> {
        self.last_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl SupplementarySource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &FetchRequest) -> anyhow::Result<Vec<Question>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        if let Some(message) = &self.failure {
            anyhow::bail!("{message}");
        }

        Ok(self
            .questions
            .iter()
            .filter(|q| request.accepts(q))
            .take(request.count as usize)
            .cloned()
            .collect())
    }
}
