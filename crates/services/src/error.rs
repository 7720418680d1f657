//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{AttemptError, ExamError};
use storage::StoreError;

use crate::sessions::SessionMode;

/// Errors emitted by exam sessions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("entry code is required")]
    EmptyCode,
    #[error("start already in progress")]
    StartInProgress,
    #[error("entry code rejected: {0}")]
    InvalidCode(String),
    #[error("exam unavailable: {0}")]
    ExamUnavailable(String),
    #[error("attempt already submitted")]
    AlreadySubmitted,
    #[error("exam has already ended")]
    AlreadyEnded,
    #[error("cannot {action} while {mode:?}")]
    InvalidState {
        action: &'static str,
        mode: SessionMode,
    },
    #[error("time is up; answers are locked")]
    TimeUp,
    #[error("submission already in progress")]
    SubmitInProgress,
    #[error("automatic submission already attempted")]
    AutoSubmitUsed,
    #[error("question has no option {0}")]
    NoSuchOption(usize),
    #[error(transparent)]
    Exam(#[from] ExamError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidCode(msg) => SessionError::InvalidCode(msg),
            StoreError::ExamUnavailable(msg) => SessionError::ExamUnavailable(msg),
            StoreError::AlreadySubmitted => SessionError::AlreadySubmitted,
            other => SessionError::Store(other),
        }
    }
}

impl SessionError {
    /// Whether the user can fix this by trying again (possibly with different input).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::EmptyCode | SessionError::InvalidCode(_) => true,
            SessionError::Store(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Message suitable for showing to the participant.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SessionError::EmptyCode => "Please enter the exam access code.".into(),
            SessionError::InvalidCode(_) => "The access code is not valid for this exam.".into(),
            SessionError::ExamUnavailable(reason) => {
                format!("This exam is not available right now ({reason}).")
            }
            SessionError::AlreadySubmitted => "You have already submitted this exam.".into(),
            SessionError::AlreadyEnded => "This exam has already ended.".into(),
            SessionError::TimeUp | SessionError::AutoSubmitUsed => {
                "Time is up. Your answers can no longer be changed.".into()
            }
            SessionError::StartInProgress => "Your exam is being opened.".into(),
            SessionError::SubmitInProgress => "Your answers are being submitted.".into(),
            SessionError::Store(err) if err.is_transient() => {
                "Network problem. Check your connection and try again.".into()
            }
            SessionError::InvalidState { .. } | SessionError::NoSuchOption(_) => {
                "That action is not available right now.".into()
            }
            _ => "Something went wrong. Please try again.".into(),
        }
    }
}
