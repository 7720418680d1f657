use async_trait::async_trait;
use exam_core::model::{
    Attempt, AttemptId, AttemptOrigin, ExamId, ExamPaper, ExamResults, QuestionId, QuestionResult,
};
use thiserror::Error;

/// Errors surfaced by attempt store adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("invalid entry code: {0}")]
    InvalidCode(String),

    #[error("exam unavailable: {0}")]
    ExamUnavailable(String),

    #[error("attempt already submitted")]
    AlreadySubmitted,

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) | StoreError::Http(_) | StoreError::Backend(_) => true,
            StoreError::HttpStatus(status) => status.is_server_error(),
            _ => false,
        }
    }
}

/// An in-progress attempt handed back by `AttemptStore::start`.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedAttempt {
    /// The exam paper with its answer key stripped.
    pub paper: ExamPaper,
    pub attempt: Attempt,
    pub origin: AttemptOrigin,
}

/// Result of a successful start call.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// A fresh or resumed attempt that can be played.
    InProgress(StartedAttempt),
    /// The attempt was submitted earlier; its results came back inline.
    AlreadySubmitted(ExamResults),
}

/// Payload of a single autosave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSave {
    pub question_id: QuestionId,
    pub value: Option<String>,
    pub current_index: usize,
}

/// Remote persistence for exam attempts.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Start or resume the attempt for `exam_id` using an entry code.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidCode` for a rejected code,
    /// `StoreError::ExamUnavailable` when the exam cannot be taken,
    /// `StoreError::AlreadySubmitted` when the attempt is closed and no results were returned,
    /// or transport errors.
    async fn start(&self, exam_id: &ExamId, code: &str) -> Result<StartOutcome, StoreError>;

    /// Persist the answer for one question together with the current position.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the save was not acknowledged.
    async fn save_answer(&self, attempt_id: &AttemptId, save: &AnswerSave)
    -> Result<(), StoreError>;

    /// Close the attempt and return graded results.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the attempt could not be submitted.
    async fn submit(&self, attempt_id: &AttemptId) -> Result<ExamResults, StoreError>;

    /// Answer-key projection of an exam. Creates no attempt.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for unknown exams, or transport errors.
    async fn preview(&self, exam_id: &ExamId) -> Result<Vec<QuestionResult>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_transport_failures() {
        assert!(StoreError::Network("reset".into()).is_transient());
        assert!(StoreError::HttpStatus(reqwest::StatusCode::BAD_GATEWAY).is_transient());
        assert!(!StoreError::HttpStatus(reqwest::StatusCode::FORBIDDEN).is_transient());
        assert!(!StoreError::InvalidCode("nope".into()).is_transient());
        assert!(!StoreError::AlreadySubmitted.is_transient());
    }
}
