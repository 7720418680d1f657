use crate::model::exam::Question;
use crate::model::ids::QuestionId;

/// Graded outcome for one question, as returned after submission or for a preview.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub question_text: String,
    pub options: Vec<String>,
    pub selected_answer: Option<String>,
    pub correct_answer: Option<String>,
    pub is_correct: bool,
    pub explanation: Option<String>,
    pub marks: Option<u32>,
}

impl QuestionResult {
    /// Grade `selected` against the question's answer key.
    ///
    /// A question without an answer key is never counted as correct.
    #[must_use]
    pub fn grade(question: &Question, selected: Option<&str>) -> Self {
        let correct = question.correct_answer();
        let is_correct = matches!((selected, correct), (Some(s), Some(c)) if s == c);
        Self {
            question_id: question.id().clone(),
            question_text: question.text().to_owned(),
            options: question.options().to_vec(),
            selected_answer: selected.map(str::to_owned),
            correct_answer: correct.map(str::to_owned),
            is_correct,
            explanation: question.explanation().map(str::to_owned),
            marks: Some(question.marks()),
        }
    }

    /// Marks available for this question; defaults to 1.
    #[must_use]
    pub fn marks(&self) -> u32 {
        self.marks.unwrap_or(1)
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.selected_answer.is_some()
    }
}

/// Server-computed results for a submitted attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamResults {
    pub score: Option<f64>,
    pub results: Vec<QuestionResult>,
}

/// Aggregate figures for the review screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSummary {
    /// Score reported by the backend, or earned marks when it reported none.
    pub score: f64,
    pub earned_marks: u32,
    pub total_marks: u32,
    pub correct: usize,
    pub answered: usize,
    pub total: usize,
}

impl ScoreSummary {
    #[must_use]
    pub fn from_results(results: &ExamResults) -> Self {
        let mut earned_marks = 0_u32;
        let mut total_marks = 0_u32;
        let mut correct = 0;
        let mut answered = 0;

        for result in &results.results {
            total_marks = total_marks.saturating_add(result.marks());
            if result.is_correct {
                earned_marks = earned_marks.saturating_add(result.marks());
                correct += 1;
            }
            if result.is_answered() {
                answered += 1;
            }
        }

        Self {
            score: results.score.unwrap_or(f64::from(earned_marks)),
            earned_marks,
            total_marks,
            correct,
            answered,
            total: results.results.len(),
        }
    }

    /// Earned marks as a percentage of total marks, in `[0, 100]`.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_marks == 0 {
            return 0.0;
        }
        f64::from(self.earned_marks) / f64::from(self.total_marks) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, marks: u32) -> Question {
        Question::new(QuestionId::new(id), format!("Q {id}"), vec!["A".into(), "B".into()])
            .unwrap()
            .with_marks(marks)
            .unwrap()
            .with_answer_key("A", None)
    }

    #[test]
    fn grading_compares_against_answer_key() {
        let q = question("q1", 1);
        assert!(QuestionResult::grade(&q, Some("A")).is_correct);
        assert!(!QuestionResult::grade(&q, Some("B")).is_correct);
        assert!(!QuestionResult::grade(&q, None).is_correct);

        let no_key = Question::new(QuestionId::new("q2"), "?", vec!["A".into()]).unwrap();
        assert!(!QuestionResult::grade(&no_key, Some("A")).is_correct);
    }

    #[test]
    fn summary_weights_marks() {
        let results = ExamResults {
            score: None,
            results: vec![
                QuestionResult::grade(&question("q1", 2), Some("A")),
                QuestionResult::grade(&question("q2", 1), Some("B")),
                QuestionResult::grade(&question("q3", 1), None),
            ],
        };

        let summary = ScoreSummary::from_results(&results);

        assert_eq!(summary.earned_marks, 2);
        assert_eq!(summary.total_marks, 4);
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.answered, 2);
        assert_eq!(summary.total, 3);
        assert!((summary.score - 2.0).abs() < f64::EPSILON);
        assert!((summary.percentage() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reported_score_takes_precedence() {
        let results = ExamResults {
            score: Some(7.5),
            results: vec![QuestionResult::grade(&question("q1", 1), Some("A"))],
        };
        assert!((ScoreSummary::from_results(&results).score - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_results_have_zero_percentage() {
        let results = ExamResults {
            score: None,
            results: Vec::new(),
        };
        assert!(ScoreSummary::from_results(&results).percentage().abs() < f64::EPSILON);
    }
}
