//! HTTP question service source.
//!
//! Fetches questions from `GET {base_url}/questions` with the slot encoded
//! in the query string. Transient failures are retried with exponential
//! backoff; permanent failures return immediately.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use adaptest_core::model::Question;
use adaptest_core::traits::{FetchRequest, SupplementarySource};

use crate::error::{from_transport, SourceError};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Supplementary source backed by a remote question service.
pub struct HttpSource {
    name: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
    max_retries: u32,
    retry_delay: Duration,
}

/// The service answers with either a bare list or a wrapped one.
#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionsPayload {
    Wrapped { questions: Vec<Question> },
    Bare(Vec<Question>),
}

impl QuestionsPayload {
    fn into_questions(self) -> Vec<Question> {
        match self {
            QuestionsPayload::Wrapped { questions } | QuestionsPayload::Bare(questions) => {
                questions
            }
        }
    }
}

impl HttpSource {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        Self::with_timeout(name, base_url, api_key, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            name: name.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout_secs,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    fn url_for(&self, request: &FetchRequest) -> String {
        format!(
            "{}/questions?subject={}&type={}&count={}&min_difficulty={}&max_difficulty={}",
            self.base_url,
            request.subject,
            request.question_type,
            request.count,
            request.min_difficulty,
            request.max_difficulty,
        )
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<Question>, SourceError> {
        let mut builder = self.client.get(url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| from_transport(&e, self.timeout_secs))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            return Err(SourceError::RateLimited { retry_after_ms });
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Unauthorized(body));
        }
        if status.as_u16() == 404 {
            return Err(SourceError::NotFound(url.to_string()));
        }
        if status.is_client_error() || status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| from_transport(&e, self.timeout_secs))?;
        let payload: QuestionsPayload = serde_json::from_str(&body)
            .map_err(|e| SourceError::InvalidPayload(e.to_string()))?;
        Ok(payload.into_questions())
    }
}

#[async_trait]
impl SupplementarySource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request), fields(source = %self.name, subject = %request.subject, question_type = %request.question_type))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Question>> {
        let url = self.url_for(request);
        let mut delay = self.retry_delay;
        let mut attempt = 0u32;

        loop {
            match self.fetch_once(&url).await {
                Ok(questions) => {
                    tracing::debug!(count = questions.len(), attempt, "fetched questions");
                    return Ok(questions);
                }
                Err(e) if e.is_permanent() || attempt >= self.max_retries => {
                    return Err(e.into());
                }
                Err(e) => {
                    let wait = retry_wait(&e, delay);
                    tracing::warn!(attempt, wait_ms = wait.as_millis() as u64, "fetch failed, retrying: {e}");
                    tokio::time::sleep(wait).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
            }
        }
    }
}

/// Server-hinted wait when present, capped at [`MAX_BACKOFF`].
fn retry_wait(error: &SourceError, backoff: Duration) -> Duration {
    error
        .retry_after_ms()
        .map(|ms| Duration::from_millis(ms).min(MAX_BACKOFF))
        .unwrap_or(backoff)
}
