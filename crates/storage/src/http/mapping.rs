use std::collections::HashMap;

use chrono::{DateTime, Utc};
use exam_core::model::{
    Attempt, AttemptId, AttemptOrigin, AttemptStatus, ExamId, ExamPaper, ExamResults, ExamStatus,
    Question, QuestionId, QuestionResult,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::repository::{AnswerSave, StartOutcome, StartedAttempt, StoreError};

fn ser<E: core::fmt::Display>(e: E) -> StoreError {
    StoreError::Serialization(e.to_string())
}

/// Backends emit ids as either JSON strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(RawId::into_string)
}

fn opt_id_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(d)?.map(RawId::into_string))
}

pub(crate) fn parse_exam_status(s: &str) -> Result<ExamStatus, StoreError> {
    match s.to_ascii_lowercase().as_str() {
        "draft" => Ok(ExamStatus::Draft),
        "scheduled" | "upcoming" => Ok(ExamStatus::Scheduled),
        "active" | "live" | "ongoing" => Ok(ExamStatus::Active),
        "ended" | "closed" | "completed" => Ok(ExamStatus::Ended),
        _ => Err(StoreError::Serialization(format!("invalid exam status: {s}"))),
    }
}

pub(crate) fn parse_attempt_status(s: &str) -> Result<AttemptStatus, StoreError> {
    match s.to_ascii_lowercase().replace('_', "-").as_str() {
        "not-started" => Ok(AttemptStatus::NotStarted),
        "in-progress" => Ok(AttemptStatus::InProgress),
        "submitted" => Ok(AttemptStatus::Submitted),
        _ => Err(StoreError::Serialization(format!("invalid attempt status: {s}"))),
    }
}

//
// ─── REQUESTS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Serialize)]
pub(crate) struct StartRequest<'a> {
    pub code: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SaveAnswerRequest<'a> {
    pub question_id: &'a str,
    pub value: Option<&'a str>,
    pub current_index: usize,
}

impl<'a> SaveAnswerRequest<'a> {
    pub(crate) fn from_save(save: &'a AnswerSave) -> Self {
        Self {
            question_id: save.question_id.as_str(),
            value: save.value.as_deref(),
            current_index: save.current_index,
        }
    }
}

//
// ─── RESPONSES ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionWire {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(alias = "questionText")]
    text: String,
    options: Vec<String>,
    #[serde(default)]
    marks: Option<u32>,
    #[serde(default)]
    correct_answer: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExamWire {
    #[serde(deserialize_with = "id_string")]
    id: String,
    title: String,
    duration_minutes: u32,
    status: String,
    #[serde(default, alias = "endTime")]
    global_end_time: Option<DateTime<Utc>>,
    questions: Vec<QuestionWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResultWire {
    #[serde(deserialize_with = "id_string")]
    question_id: String,
    #[serde(default)]
    question_text: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    selected_answer: Option<String>,
    #[serde(default)]
    correct_answer: Option<String>,
    #[serde(default)]
    is_correct: bool,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    marks: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitResponseWire {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    results: Vec<ResultWire>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PreviewResponseWire {
    Wrapped { results: Vec<ResultWire> },
    Bare(Vec<ResultWire>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartResponseWire {
    status: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    attempt_id: Option<String>,
    #[serde(default)]
    answers: HashMap<String, String>,
    #[serde(default)]
    current_index: usize,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    resumed: Option<bool>,
    #[serde(default)]
    exam: Option<ExamWire>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    results: Option<Vec<ResultWire>>,
}

/// Error envelope used by the backend for non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(alias = "message")]
    pub error: String,
}

//
// ─── MAPPING ───────────────────────────────────────────────────────────────────
//

impl QuestionWire {
    fn into_question(self) -> Result<Question, StoreError> {
        let mut question = Question::new(QuestionId::new(self.id), self.text, self.options)
            .map_err(ser)?;
        if let Some(marks) = self.marks {
            question = question.with_marks(marks).map_err(ser)?;
        }
        if let Some(correct) = self.correct_answer {
            question = question.with_answer_key(correct, self.explanation);
        }
        Ok(question)
    }
}

impl ExamWire {
    pub(crate) fn into_paper(self) -> Result<ExamPaper, StoreError> {
        let status = parse_exam_status(&self.status)?;
        let questions = self
            .questions
            .into_iter()
            .map(QuestionWire::into_question)
            .collect::<Result<Vec<_>, _>>()?;
        ExamPaper::new(
            ExamId::new(self.id),
            self.title,
            self.duration_minutes,
            status,
            self.global_end_time,
            questions,
        )
        .map_err(ser)
    }
}

impl ResultWire {
    pub(crate) fn into_result(self) -> QuestionResult {
        QuestionResult {
            question_id: QuestionId::new(self.question_id),
            question_text: self.question_text,
            options: self.options,
            selected_answer: self.selected_answer,
            correct_answer: self.correct_answer,
            is_correct: self.is_correct,
            explanation: self.explanation,
            marks: self.marks,
        }
    }
}

impl SubmitResponseWire {
    pub(crate) fn into_results(self) -> ExamResults {
        ExamResults {
            score: self.score,
            results: self.results.into_iter().map(ResultWire::into_result).collect(),
        }
    }
}

impl PreviewResponseWire {
    pub(crate) fn into_results(self) -> Vec<QuestionResult> {
        let results = match self {
            PreviewResponseWire::Wrapped { results } | PreviewResponseWire::Bare(results) => {
                results
            }
        };
        results.into_iter().map(ResultWire::into_result).collect()
    }
}

impl StartResponseWire {
    pub(crate) fn into_outcome(self, exam_id: &ExamId) -> Result<StartOutcome, StoreError> {
        let status = parse_attempt_status(&self.status)?;
        if status.is_submitted() {
            return match self.results {
                Some(results) => Ok(StartOutcome::AlreadySubmitted(ExamResults {
                    score: self.score,
                    results: results.into_iter().map(ResultWire::into_result).collect(),
                })),
                None => Err(StoreError::AlreadySubmitted),
            };
        }

        let attempt_id = self
            .attempt_id
            .ok_or_else(|| StoreError::Serialization("start response missing attemptId".into()))?;
        let paper = self
            .exam
            .ok_or_else(|| StoreError::Serialization("start response missing exam".into()))?
            .into_paper()?
            .without_answer_key();

        // Without an explicit flag, an attempt that already carries a start
        // time is treated as resumed.
        let origin = match self.resumed {
            Some(true) => AttemptOrigin::Resumed,
            Some(false) => AttemptOrigin::Fresh,
            None if self.start_time.is_some() && status == AttemptStatus::InProgress => {
                AttemptOrigin::Resumed
            }
            None => AttemptOrigin::Fresh,
        };

        let attempt = Attempt {
            id: AttemptId::new(attempt_id),
            exam_id: exam_id.clone(),
            status: AttemptStatus::InProgress,
            answers: self
                .answers
                .into_iter()
                .map(|(k, v)| (QuestionId::new(k), v))
                .collect(),
            current_index: self.current_index,
            start_time: self.start_time,
        };

        Ok(StartOutcome::InProgress(StartedAttempt {
            paper,
            attempt,
            origin,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_IN_PROGRESS: &str = r#"{
        "status": "in-progress",
        "attemptId": 77,
        "answers": { "q1": "B" },
        "currentIndex": 1,
        "startTime": "2023-11-14T22:13:20Z",
        "exam": {
            "id": "e1",
            "title": "Databases",
            "durationMinutes": 30,
            "status": "active",
            "endTime": "2023-11-14T23:00:00Z",
            "questions": [
                { "id": "q1", "text": "Normal form?", "options": ["1NF", "2NF"], "correctAnswer": "2NF" },
                { "id": 2, "questionText": "Index type?", "options": ["B-tree", "Hash"], "marks": 2 }
            ]
        }
    }"#;

    #[test]
    fn start_response_maps_to_resumed_attempt() {
        let wire: StartResponseWire = serde_json::from_str(START_IN_PROGRESS).unwrap();
        let outcome = wire.into_outcome(&ExamId::new("e1")).unwrap();

        let StartOutcome::InProgress(started) = outcome else {
            panic!("expected in-progress outcome");
        };
        assert_eq!(started.origin, AttemptOrigin::Resumed);
        assert_eq!(started.attempt.id, AttemptId::new("77"));
        assert_eq!(started.attempt.current_index, 1);
        assert_eq!(
            started.attempt.answers.get(&QuestionId::new("q1")),
            Some(&"B".to_string())
        );
        assert_eq!(started.paper.question_count(), 2);
        assert_eq!(started.paper.questions()[1].id(), &QuestionId::new("2"));
        assert_eq!(started.paper.questions()[1].marks(), 2);
        assert!(started.paper.global_end_time().is_some());
        // Answer keys never reach the player.
        assert!(started.paper.questions()[0].correct_answer().is_none());
    }

    #[test]
    fn submitted_start_without_results_is_an_error() {
        let wire: StartResponseWire =
            serde_json::from_str(r#"{ "status": "submitted" }"#).unwrap();
        let err = wire.into_outcome(&ExamId::new("e1")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadySubmitted));
    }

    #[test]
    fn submitted_start_with_results_goes_to_review() {
        let json = r#"{
            "status": "submitted",
            "score": 3,
            "results": [
                { "questionId": "q1", "questionText": "Q", "options": ["A"], "selectedAnswer": "A",
                  "correctAnswer": "A", "isCorrect": true }
            ]
        }"#;
        let wire: StartResponseWire = serde_json::from_str(json).unwrap();
        match wire.into_outcome(&ExamId::new("e1")).unwrap() {
            StartOutcome::AlreadySubmitted(results) => {
                assert_eq!(results.score, Some(3.0));
                assert!(results.results[0].is_correct);
            }
            StartOutcome::InProgress(_) => panic!("expected results"),
        }
    }

    #[test]
    fn preview_accepts_bare_and_wrapped_lists() {
        let bare: PreviewResponseWire =
            serde_json::from_str(r#"[{ "questionId": 1, "correctAnswer": "A" }]"#).unwrap();
        let wrapped: PreviewResponseWire =
            serde_json::from_str(r#"{ "results": [{ "questionId": "1" }] }"#).unwrap();

        let bare = bare.into_results();
        assert_eq!(bare[0].question_id, QuestionId::new("1"));
        assert_eq!(bare[0].correct_answer.as_deref(), Some("A"));
        assert_eq!(wrapped.into_results().len(), 1);
    }

    #[test]
    fn unknown_statuses_are_rejected() {
        assert!(parse_exam_status("archived").is_err());
        assert_eq!(parse_attempt_status("IN_PROGRESS").unwrap(), AttemptStatus::InProgress);
    }

    #[test]
    fn save_request_uses_camel_case() {
        let save = AnswerSave {
            question_id: QuestionId::new("q3"),
            value: Some("C".into()),
            current_index: 2,
        };
        let json = serde_json::to_value(SaveAnswerRequest::from_save(&save)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "questionId": "q3", "value": "C", "currentIndex": 2 })
        );
    }
}
