use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::model::exam::{ExamPaper, Question};
use crate::model::ids::{AttemptId, ExamId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt status cannot move from {from:?} to {to:?}")]
    StatusRegression {
        from: AttemptStatus,
        to: AttemptStatus,
    },

    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),

    #[error("{value:?} is not an option of question {question}")]
    UnknownOption { question: QuestionId, value: String },
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of an attempt. Ordering follows the only legal direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Submitted,
}

impl AttemptStatus {
    /// Move to `next`. Staying put is allowed; moving backwards is not.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::StatusRegression` if `next` precedes the current status.
    pub fn advance(&mut self, next: AttemptStatus) -> Result<(), AttemptError> {
        if next < *self {
            return Err(AttemptError::StatusRegression {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    #[must_use]
    pub fn is_submitted(self) -> bool {
        matches!(self, AttemptStatus::Submitted)
    }
}

/// Whether a start call created the attempt or picked up an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOrigin {
    Fresh,
    Resumed,
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// Persisted shape of one participant's attempt as returned by the attempt store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub id: AttemptId,
    pub exam_id: ExamId,
    pub status: AttemptStatus,
    pub answers: HashMap<QuestionId, String>,
    pub current_index: usize,
    pub start_time: Option<DateTime<Utc>>,
}

impl Attempt {
    /// A brand-new attempt that has just entered `InProgress`.
    #[must_use]
    pub fn started(id: AttemptId, exam_id: ExamId, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            exam_id,
            status: AttemptStatus::InProgress,
            answers: HashMap::new(),
            current_index: 0,
            start_time: Some(start_time),
        }
    }
}

//
// ─── ANSWER SHEET ──────────────────────────────────────────────────────────────
//

/// Selected option per question, constrained to the questions of one paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSheet {
    known: HashSet<QuestionId>,
    answers: HashMap<QuestionId, String>,
}

impl AnswerSheet {
    #[must_use]
    pub fn new(paper: &ExamPaper) -> Self {
        Self {
            known: paper.questions().iter().map(|q| q.id().clone()).collect(),
            answers: HashMap::new(),
        }
    }

    /// Rebuild a sheet from persisted answers.
    ///
    /// Entries for questions outside the paper are dropped and returned so the
    /// caller can report them.
    #[must_use]
    pub fn restore(
        paper: &ExamPaper,
        persisted: HashMap<QuestionId, String>,
    ) -> (Self, Vec<QuestionId>) {
        let mut sheet = Self::new(paper);
        let mut discarded = Vec::new();
        for (question, value) in persisted {
            if sheet.known.contains(&question) {
                sheet.answers.insert(question, value);
            } else {
                discarded.push(question);
            }
        }
        discarded.sort();
        (sheet, discarded)
    }

    /// Record `value` for `question`, replacing any previous selection.
    ///
    /// Returns the previous selection, if any.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::UnknownQuestion` if the question is not on this sheet,
    /// or `AttemptError::UnknownOption` if `value` is not one of its options.
    pub fn select(
        &mut self,
        question: &Question,
        value: impl Into<String>,
    ) -> Result<Option<String>, AttemptError> {
        if !self.known.contains(question.id()) {
            return Err(AttemptError::UnknownQuestion(question.id().clone()));
        }
        let value = value.into();
        if !question.has_option(&value) {
            return Err(AttemptError::UnknownOption {
                question: question.id().clone(),
                value,
            });
        }
        Ok(self.answers.insert(question.id().clone(), value))
    }

    #[must_use]
    pub fn get(&self, question: &QuestionId) -> Option<&str> {
        self.answers.get(question).map(String::as_str)
    }

    #[must_use]
    pub fn is_answered(&self, question: &QuestionId) -> bool {
        self.answers.contains_key(question)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn as_map(&self) -> &HashMap<QuestionId, String> {
        &self.answers
    }
}
