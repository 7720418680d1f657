use exam_core::Clock;
use exam_core::model::{ExamError, ExamId, ExamPaper, ExamStatus, Question, QuestionId};
use storage::InMemoryAttemptStore;

pub const DEMO_CODE: &str = "DEMO";

fn question(
    id: &str,
    text: &str,
    options: &[&str],
    correct: &str,
    explanation: &str,
) -> Result<Question, ExamError> {
    Ok(Question::new(
        QuestionId::new(id),
        text,
        options.iter().map(|o| (*o).to_owned()).collect(),
    )?
    .with_answer_key(correct, Some(explanation.to_owned())))
}

/// Offline store with one short exam, unlocked with `DEMO`.
pub fn store(exam_id: &ExamId, clock: Clock) -> Result<InMemoryAttemptStore, exam_core::Error> {
    let questions = vec![
        question(
            "q1",
            "Which gas do plants absorb during photosynthesis?",
            &["Oxygen", "Carbon dioxide", "Nitrogen", "Helium"],
            "Carbon dioxide",
            "Plants take in CO2 and release O2.",
        )?,
        question(
            "q2",
            "What is 7 x 8?",
            &["54", "56", "58", "64"],
            "56",
            "7 x 8 = 56.",
        )?
        .with_marks(2)?,
        question(
            "q3",
            "Which planet is closest to the Sun?",
            &["Venus", "Earth", "Mercury", "Mars"],
            "Mercury",
            "Mercury orbits at about 0.39 AU.",
        )?,
    ];
    let paper = ExamPaper::new(
        exam_id.clone(),
        "Demo quiz",
        5,
        ExamStatus::Active,
        None,
        questions,
    )?;

    let store = InMemoryAttemptStore::new(clock);
    store.seed_exam(paper, DEMO_CODE);
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::time::fixed_clock;
    use storage::{AttemptStore, StartOutcome};

    #[tokio::test]
    async fn demo_exam_opens_with_demo_code() {
        let exam_id = ExamId::new("demo");
        let store = store(&exam_id, fixed_clock()).unwrap();

        let outcome = store.start(&exam_id, DEMO_CODE).await.unwrap();

        let StartOutcome::InProgress(started) = outcome else {
            panic!("demo exam should be playable");
        };
        assert_eq!(started.paper.question_count(), 3);
        assert_eq!(started.paper.total_marks(), 4);
    }
}
