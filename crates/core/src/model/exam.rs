use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{ExamId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("exam has no questions")]
    NoQuestions,

    #[error("question {0} has no options")]
    NoOptions(QuestionId),

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(QuestionId),

    #[error("exam duration must be > 0 minutes")]
    InvalidDuration,

    #[error("question {question} marks must be > 0")]
    InvalidMarks { question: QuestionId },
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Publication state of an exam as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExamStatus {
    Draft,
    Scheduled,
    Active,
    Ended,
}

impl ExamStatus {
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, ExamStatus::Active)
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question.
///
/// The answer key (`correct_answer`, `explanation`) is only populated for
/// previews and graded results; papers handed to a player have it stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<String>,
    marks: Option<u32>,
    correct_answer: Option<String>,
    explanation: Option<String>,
}

impl Question {
    /// Creates a question with the given ordered options.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::NoOptions` when `options` is empty.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<String>,
    ) -> Result<Self, ExamError> {
        if options.is_empty() {
            return Err(ExamError::NoOptions(id));
        }
        Ok(Self {
            id,
            text: text.into(),
            options,
            marks: None,
            correct_answer: None,
            explanation: None,
        })
    }

    /// Sets explicit marks for this question.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidMarks` for zero marks.
    pub fn with_marks(mut self, marks: u32) -> Result<Self, ExamError> {
        if marks == 0 {
            return Err(ExamError::InvalidMarks { question: self.id });
        }
        self.marks = Some(marks);
        Ok(self)
    }

    #[must_use]
    pub fn with_answer_key(
        mut self,
        correct_answer: impl Into<String>,
        explanation: Option<String>,
    ) -> Self {
        self.correct_answer = Some(correct_answer.into());
        self.explanation = explanation;
        self
    }

    /// Returns a copy with the answer key removed.
    #[must_use]
    pub fn without_answer_key(&self) -> Self {
        Self {
            correct_answer: None,
            explanation: None,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|o| o == value)
    }

    /// Marks awarded for a correct answer; defaults to 1.
    #[must_use]
    pub fn marks(&self) -> u32 {
        self.marks.unwrap_or(1)
    }

    #[must_use]
    pub fn correct_answer(&self) -> Option<&str> {
        self.correct_answer.as_deref()
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }
}

//
// ─── PAPER ─────────────────────────────────────────────────────────────────────
//

/// An exam definition as seen by a participant: metadata plus ordered questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamPaper {
    id: ExamId,
    title: String,
    duration_minutes: u32,
    status: ExamStatus,
    global_end_time: Option<DateTime<Utc>>,
    questions: Vec<Question>,
}

impl ExamPaper {
    /// Creates a validated exam paper.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::NoQuestions` for an empty paper,
    /// `ExamError::DuplicateQuestion` if two questions share an id, and
    /// `ExamError::InvalidDuration` for a zero duration.
    pub fn new(
        id: ExamId,
        title: impl Into<String>,
        duration_minutes: u32,
        status: ExamStatus,
        global_end_time: Option<DateTime<Utc>>,
        questions: Vec<Question>,
    ) -> Result<Self, ExamError> {
        if duration_minutes == 0 {
            return Err(ExamError::InvalidDuration);
        }
        if questions.is_empty() {
            return Err(ExamError::NoQuestions);
        }
        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(ExamError::DuplicateQuestion(question.id().clone()));
            }
        }

        Ok(Self {
            id,
            title: title.into(),
            duration_minutes,
            status,
            global_end_time,
            questions,
        })
    }

    #[must_use]
    pub fn id(&self) -> &ExamId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    #[must_use]
    pub fn status(&self) -> ExamStatus {
        self.status
    }

    #[must_use]
    pub fn global_end_time(&self) -> Option<DateTime<Utc>> {
        self.global_end_time
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn find(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    /// Sum of marks over all questions.
    #[must_use]
    pub fn total_marks(&self) -> u32 {
        self.questions.iter().map(Question::marks).sum()
    }

    /// Returns a copy safe to hand to a participant.
    #[must_use]
    pub fn without_answer_key(&self) -> Self {
        Self {
            questions: self
                .questions
                .iter()
                .map(Question::without_answer_key)
                .collect(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Question {id}"),
            vec!["A".into(), "B".into()],
        )
        .unwrap()
    }

    #[test]
    fn marks_default_to_one() {
        let question = q("q1");
        assert_eq!(question.marks(), 1);
        assert_eq!(question.with_marks(3).unwrap().marks(), 3);
    }

    #[test]
    fn zero_marks_rejected() {
        let err = q("q1").with_marks(0).unwrap_err();
        assert!(matches!(err, ExamError::InvalidMarks { .. }));
    }

    #[test]
    fn question_requires_options() {
        let err = Question::new(QuestionId::new("q1"), "?", Vec::new()).unwrap_err();
        assert_eq!(err, ExamError::NoOptions(QuestionId::new("q1")));
    }

    #[test]
    fn paper_rejects_duplicate_ids() {
        let err = ExamPaper::new(
            ExamId::new("e1"),
            "Exam",
            10,
            ExamStatus::Active,
            None,
            vec![q("q1"), q("q1")],
        )
        .unwrap_err();
        assert_eq!(err, ExamError::DuplicateQuestion(QuestionId::new("q1")));
    }

    #[test]
    fn paper_rejects_empty_and_zero_duration() {
        let empty = ExamPaper::new(ExamId::new("e1"), "Exam", 10, ExamStatus::Active, None, vec![]);
        assert_eq!(empty.unwrap_err(), ExamError::NoQuestions);

        let zero = ExamPaper::new(ExamId::new("e1"), "Exam", 0, ExamStatus::Active, None, vec![q("q1")]);
        assert_eq!(zero.unwrap_err(), ExamError::InvalidDuration);
    }

    #[test]
    fn stripping_answer_key_keeps_questions() {
        let paper = ExamPaper::new(
            ExamId::new("e1"),
            "Exam",
            10,
            ExamStatus::Active,
            None,
            vec![q("q1").with_answer_key("A", Some("because".into())), q("q2").with_marks(2).unwrap()],
        )
        .unwrap();

        let stripped = paper.without_answer_key();
        assert_eq!(stripped.question_count(), 2);
        assert_eq!(stripped.questions()[0].correct_answer(), None);
        assert_eq!(stripped.questions()[0].explanation(), None);
        assert_eq!(stripped.total_marks(), 3);
    }
}
