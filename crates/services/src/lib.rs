#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod sessions;

pub use exam_core::Clock;

pub use config::SessionConfig;
pub use error::SessionError;

pub use sessions::{
    ExamSession, QuestionView, RemainingTime, SessionController, SessionMode, SessionProgress,
    SessionSnapshot, SubmitTrigger, format_remaining,
};
