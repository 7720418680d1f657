use exam_core::model::{ExamId, Question, QuestionId, QuestionResult, ScoreSummary};

use super::countdown::RemainingTime;
use super::progress::SessionProgress;
use super::state::{ExamSession, SessionMode};

/// Presentation-agnostic view of one question.
///
/// Answer-key fields are only populated in review and preview.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<String>,
    pub selected: Option<String>,
    pub correct_answer: Option<String>,
    pub is_correct: Option<bool>,
    pub explanation: Option<String>,
    pub marks: u32,
}

impl QuestionView {
    pub(crate) fn unanswered(question: &Question, selected: Option<&str>) -> Self {
        Self {
            id: question.id().clone(),
            text: question.text().to_owned(),
            options: question.options().to_vec(),
            selected: selected.map(str::to_owned),
            correct_answer: None,
            is_correct: None,
            explanation: None,
            marks: question.marks(),
        }
    }

    pub(crate) fn graded(result: &QuestionResult) -> Self {
        Self {
            id: result.question_id.clone(),
            text: result.question_text.clone(),
            options: result.options.clone(),
            selected: result.selected_answer.clone(),
            correct_answer: result.correct_answer.clone(),
            is_correct: Some(result.is_correct),
            explanation: result.explanation.clone(),
            marks: result.marks(),
        }
    }

    pub(crate) fn answer_key(result: &QuestionResult) -> Self {
        Self {
            selected: None,
            is_correct: None,
            ..Self::graded(result)
        }
    }
}

/// Everything a front end needs to draw the current screen.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub mode: SessionMode,
    pub exam_id: ExamId,
    pub title: Option<String>,
    pub index: usize,
    pub question_count: usize,
    pub question: Option<QuestionView>,
    pub progress: Option<SessionProgress>,
    pub remaining: Option<RemainingTime>,
    pub time_up: bool,
    pub score: Option<ScoreSummary>,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub(crate) fn capture(session: &ExamSession, remaining: Option<RemainingTime>) -> Self {
        Self {
            mode: session.mode(),
            exam_id: session.exam_id().clone(),
            title: session.title().map(str::to_owned),
            index: session.index(),
            question_count: session.question_count(),
            question: session.question_view(),
            progress: session.progress(),
            remaining,
            time_up: session.is_time_up(),
            score: session.score(),
            last_error: session.last_error().map(str::to_owned),
        }
    }

    /// 1-based position label, e.g. `3 / 10`.
    #[must_use]
    pub fn position_label(&self) -> String {
        if self.question_count == 0 {
            return String::new();
        }
        format!("{} / {}", self.index + 1, self.question_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> QuestionResult {
        let question = Question::new(QuestionId::new("q1"), "2+2?", vec!["3".into(), "4".into()])
            .unwrap()
            .with_answer_key("4", Some("basic arithmetic".into()));
        QuestionResult::grade(&question, Some("3"))
    }

    #[test]
    fn answer_key_view_hides_participant_fields() {
        let view = QuestionView::answer_key(&result());
        assert_eq!(view.selected, None);
        assert_eq!(view.is_correct, None);
        assert_eq!(view.correct_answer.as_deref(), Some("4"));
        assert_eq!(view.explanation.as_deref(), Some("basic arithmetic"));
    }

    #[test]
    fn graded_view_carries_outcome() {
        let view = QuestionView::graded(&result());
        assert_eq!(view.selected.as_deref(), Some("3"));
        assert_eq!(view.is_correct, Some(false));
    }

    #[test]
    fn lobby_snapshot_is_empty() {
        let session = ExamSession::lobby(ExamId::new("e1"));
        let snapshot = SessionSnapshot::capture(&session, None);
        assert_eq!(snapshot.mode, SessionMode::Lobby);
        assert!(snapshot.question.is_none());
        assert_eq!(snapshot.position_label(), "");
    }
}
