use std::env;
use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::{AttemptId, ExamId, ExamResults, QuestionResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::repository::{AnswerSave, AttemptStore, StartOutcome, StoreError};

mod mapping;

use mapping::{
    ErrorBody, PreviewResponseWire, SaveAnswerRequest, StartRequest, StartResponseWire,
    SubmitResponseWire,
};

const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Which call a response belongs to; status codes mean different things per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Endpoint {
    Start,
    SaveAnswer,
    Submit,
    Preview,
}

#[derive(Clone, Debug)]
pub struct HttpStoreConfig {
    pub base_url: Url,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl HttpStoreConfig {
    /// Build a config for `base_url` with defaults for everything else.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` if the URL does not parse or cannot carry paths.
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| StoreError::Config(format!("invalid base url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "base url {base_url} cannot carry paths"
            )));
        }
        Ok(Self {
            base_url,
            api_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `EXAM_API_BASE_URL`, `EXAM_API_TOKEN` and `EXAM_API_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` when the base URL is missing or invalid.
    pub fn from_env() -> Result<Self, StoreError> {
        let base_url = env::var("EXAM_API_BASE_URL")
            .map_err(|_| StoreError::Config("EXAM_API_BASE_URL is not set".into()))?;
        let timeout = env::var("EXAM_API_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Ok(Self::new(&base_url)?
            .with_token(env::var("EXAM_API_TOKEN").ok())
            .with_timeout(Duration::from_secs(timeout)))
    }
}

/// Attempt store backed by the grading system's REST API.
#[derive(Clone)]
pub struct HttpAttemptStore {
    client: Client,
    config: HttpStoreConfig,
}

impl HttpAttemptStore {
    /// # Errors
    ///
    /// Returns `StoreError::Http` if the HTTP client cannot be built.
    pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// # Errors
    ///
    /// Returns `StoreError::Config` when the environment is incomplete.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::new(HttpStoreConfig::from_env()?)
    }

    #[must_use]
    pub fn config(&self) -> &HttpStoreConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Config("base url cannot carry paths".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        endpoint: Endpoint,
        request: RequestBuilder,
    ) -> Result<Response, StoreError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            tracing::warn!(?endpoint, error = %e, "attempt store request failed");
            StoreError::from(e)
        })?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").into());
        tracing::debug!(?endpoint, %status, %message, "attempt store rejected request");
        Err(map_status(endpoint, status, message))
    }

    async fn decode<T: DeserializeOwned>(
        endpoint: Endpoint,
        response: Response,
    ) -> Result<T, StoreError> {
        let body = response.bytes().await?;
        decode_body(&body).inspect_err(|e| {
            tracing::warn!(?endpoint, error = %e, "attempt store sent an unreadable body");
        })
    }
}

/// Translate a non-success HTTP status into the store's error taxonomy.
///
/// Only `start` checks the entry code and the exam window, so only its
/// rejections become `InvalidCode` and `ExamUnavailable`.
fn map_status(endpoint: Endpoint, status: StatusCode, message: String) -> StoreError {
    match (endpoint, status) {
        (
            Endpoint::Start,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN,
        ) => StoreError::InvalidCode(message),
        (Endpoint::Start, StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::LOCKED) => {
            StoreError::ExamUnavailable(message)
        }
        (Endpoint::Start | Endpoint::SaveAnswer | Endpoint::Submit, StatusCode::CONFLICT) => {
            StoreError::AlreadySubmitted
        }
        (_, StatusCode::NOT_FOUND) => StoreError::NotFound,
        _ => StoreError::HttpStatus(status),
    }
}

/// A 2xx body that does not match the wire format is a contract breach, not a
/// transport failure.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl AttemptStore for HttpAttemptStore {
    async fn start(&self, exam_id: &ExamId, code: &str) -> Result<StartOutcome, StoreError> {
        let url = self.endpoint(&["exams", exam_id.as_str(), "start"])?;
        let response = self
            .send(Endpoint::Start, self.client.post(url).json(&StartRequest { code }))
            .await?;
        let body: StartResponseWire = Self::decode(Endpoint::Start, response).await?;
        body.into_outcome(exam_id)
    }

    async fn save_answer(
        &self,
        attempt_id: &AttemptId,
        save: &AnswerSave,
    ) -> Result<(), StoreError> {
        let url = self.endpoint(&["attempts", attempt_id.as_str(), "answers"])?;
        self.send(
            Endpoint::SaveAnswer,
            self.client.put(url).json(&SaveAnswerRequest::from_save(save)),
        )
        .await?;
        Ok(())
    }

    async fn submit(&self, attempt_id: &AttemptId) -> Result<ExamResults, StoreError> {
        let url = self.endpoint(&["attempts", attempt_id.as_str(), "submit"])?;
        let response = self.send(Endpoint::Submit, self.client.post(url)).await?;
        let body: SubmitResponseWire = Self::decode(Endpoint::Submit, response).await?;
        Ok(body.into_results())
    }

    async fn preview(&self, exam_id: &ExamId) -> Result<Vec<QuestionResult>, StoreError> {
        let url = self.endpoint(&["exams", exam_id.as_str(), "preview"])?;
        let response = self.send(Endpoint::Preview, self.client.get(url)).await?;
        let body: PreviewResponseWire = Self::decode(Endpoint::Preview, response).await?;
        Ok(body.into_results())
    }
}
