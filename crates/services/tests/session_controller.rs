use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::Clock;
use exam_core::model::{
    Attempt, AttemptId, ExamId, ExamPaper, ExamResults, ExamStatus, Question, QuestionId,
    QuestionResult,
};
use exam_core::time::{fixed_clock, fixed_now};
use services::{SessionConfig, SessionController, SessionError, SessionMode};
use storage::{AnswerSave, AttemptStore, InMemoryAttemptStore, StartOutcome, StoreError};

const CODE: &str = "K3Y9";

fn paper(global_end: Option<DateTime<Utc>>) -> ExamPaper {
    let questions = (1..=3)
        .map(|i| {
            Question::new(
                QuestionId::new(format!("q{i}")),
                format!("Question {i}"),
                vec!["A".into(), "B".into(), "C".into()],
            )
            .unwrap()
            .with_answer_key("B", Some(format!("B is right for {i}")))
        })
        .collect();
    ExamPaper::new(
        ExamId::new("chem-101"),
        "Chemistry midterm",
        10,
        ExamStatus::Active,
        global_end,
        questions,
    )
    .unwrap()
}

fn seeded_store(global_end: Option<DateTime<Utc>>) -> InMemoryAttemptStore {
    let store = InMemoryAttemptStore::new(fixed_clock());
    store.seed_exam(paper(global_end), CODE);
    store
}

fn controller_at(store: &InMemoryAttemptStore, clock: Clock) -> SessionController {
    SessionController::new(
        Arc::new(store.clone()),
        clock,
        SessionConfig::default(),
        ExamId::new("chem-101"),
    )
}

fn controller(store: &InMemoryAttemptStore) -> SessionController {
    controller_at(store, fixed_clock())
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn valid_code_enters_play_with_full_duration() {
    let store = seeded_store(None);
    let session = controller(&store);

    session.start(CODE).await.unwrap();

    let snapshot = session.snapshot();
    assert_eq!(snapshot.mode, SessionMode::Playing);
    assert_eq!(snapshot.title.as_deref(), Some("Chemistry midterm"));
    assert_eq!(snapshot.question_count, 3);
    assert_eq!(snapshot.remaining.unwrap().seconds, 600);
    assert_eq!(snapshot.remaining.unwrap().display(), "10:00");
    let question = snapshot.question.unwrap();
    assert_eq!(question.correct_answer, None, "answer key must not reach the player");
    assert!(session.attempt_id().is_some());
}

#[tokio::test(start_paused = true)]
async fn rejected_or_empty_code_leaves_lobby_untouched() {
    let store = seeded_store(None);
    let session = controller(&store);

    let err = session.start("WRONG").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidCode(_)));
    assert_eq!(session.mode(), SessionMode::Lobby);
    assert!(session.snapshot().last_error.is_some());

    let err = session.start("   ").await.unwrap_err();
    assert!(matches!(err, SessionError::EmptyCode));
    assert_eq!(store.start_calls(), 1, "blank code must not reach the backend");

    session.start(CODE).await.unwrap();
    assert_eq!(session.mode(), SessionMode::Playing);
    assert!(session.snapshot().last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn countdown_expiry_submits_once_and_locks_answers() {
    let store = seeded_store(None);
    store.fail_next_submits(1);
    let session = controller(&store);
    session.start(CODE).await.unwrap();
    session.select("A").unwrap();

    tokio::time::sleep(Duration::from_secs(601)).await;

    assert_eq!(store.submit_calls(), 1);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.mode, SessionMode::Playing);
    assert!(snapshot.time_up);
    assert!(snapshot.remaining.unwrap().expired);
    assert!(matches!(session.select("C"), Err(SessionError::TimeUp)));

    // No second automatic attempt, but a manual retry works.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.submit_calls(), 1);
    session.submit().await.unwrap();
    assert_eq!(session.mode(), SessionMode::Review);
    assert_eq!(store.submit_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn countdown_expiry_reaches_review() {
    let store = seeded_store(None);
    let session = controller(&store);
    let mut updates = session.subscribe();
    session.start(CODE).await.unwrap();
    session.select("B").unwrap();

    let review = updates
        .wait_for(|s| s.mode == SessionMode::Review)
        .await
        .unwrap()
        .clone();

    let score = review.score.unwrap();
    assert_eq!(score.correct, 1);
    assert_eq!(score.total, 3);
    assert!(review.remaining.is_none());
    assert_eq!(store.submit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn shared_deadline_overrides_duration() {
    let store = seeded_store(Some(fixed_now() + chrono::Duration::minutes(5)));
    let session = controller_at(&store, fixed_clock().shifted(chrono::Duration::minutes(4)));

    session.start(CODE).await.unwrap();

    assert_eq!(session.snapshot().remaining.unwrap().seconds, 60);
    assert!(session.snapshot().remaining.unwrap().low);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(session.mode(), SessionMode::Review);
}

#[tokio::test(start_paused = true)]
async fn fresh_attempt_after_shared_end_is_refused() {
    let store = seeded_store(Some(fixed_now() + chrono::Duration::minutes(5)));
    let session = controller_at(&store, fixed_clock().shifted(chrono::Duration::minutes(6)));

    let err = session.start(CODE).await.unwrap_err();

    assert!(matches!(err, SessionError::AlreadyEnded));
    assert_eq!(session.mode(), SessionMode::Lobby);
    assert_eq!(store.submit_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_resume_submits_immediately_exactly_once() {
    let store = seeded_store(None);
    let mut attempt = Attempt::started(
        AttemptId::new("old"),
        ExamId::new("chem-101"),
        fixed_now() - chrono::Duration::minutes(20),
    );
    attempt.answers.insert(QuestionId::new("q2"), "B".into());
    store.seed_attempt(attempt);
    let session = controller(&store);

    session.start(CODE).await.unwrap();

    assert_eq!(session.mode(), SessionMode::Review);
    assert_eq!(store.submit_calls(), 1);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.submit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn resume_restores_answers_position_and_remaining_time() {
    let store = seeded_store(None);
    let mut attempt = Attempt::started(
        AttemptId::new("old"),
        ExamId::new("chem-101"),
        fixed_now() - chrono::Duration::minutes(7),
    );
    attempt.answers.insert(QuestionId::new("q3"), "C".into());
    attempt.current_index = 2;
    store.seed_attempt(attempt);
    let session = controller(&store);

    session.start(CODE).await.unwrap();

    let snapshot = session.snapshot();
    assert_eq!(snapshot.index, 2);
    assert_eq!(snapshot.question.unwrap().selected.as_deref(), Some("C"));
    assert_eq!(snapshot.remaining.unwrap().seconds, 180);
    assert_eq!(snapshot.progress.unwrap().unanswered, vec![0, 1]);
}

#[tokio::test(start_paused = true)]
async fn manual_submit_holds_lock_against_second_trigger() {
    let store = seeded_store(None);
    store.set_latency(Some(Duration::from_secs(2)));
    let session = controller(&store);
    session.start(CODE).await.unwrap();
    tokio::time::sleep(Duration::from_secs(599)).await;

    let mut updates = session.subscribe();
    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.submit().await })
    };
    updates
        .wait_for(|s| s.mode == SessionMode::Submitting)
        .await
        .unwrap();

    assert!(matches!(
        session.submit().await,
        Err(SessionError::SubmitInProgress)
    ));
    assert!(session.select("A").is_err());

    first.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(session.mode(), SessionMode::Review);
    assert_eq!(store.submit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn navigation_is_clamped_and_selection_survives() {
    let store = seeded_store(None);
    let session = controller(&store);
    session.start(CODE).await.unwrap();

    assert_eq!(session.back().unwrap(), 0);
    session.select_option(1).unwrap();
    assert_eq!(session.next().unwrap(), 1);
    assert_eq!(session.go_to(40).unwrap(), 2);
    assert_eq!(session.next().unwrap(), 2);
    assert_eq!(session.go_to(0).unwrap(), 0);

    let question = session.snapshot().question.unwrap();
    assert_eq!(question.selected.as_deref(), Some("B"));

    settle().await;
    let saves = store.saves();
    assert_eq!(saves.len(), 3, "every move that left a question autosaves");
    assert_eq!(
        saves[0],
        AnswerSave {
            question_id: QuestionId::new("q1"),
            value: Some("B".into()),
            current_index: 1,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn autosave_failures_do_not_interrupt_play() {
    let store = seeded_store(None);
    store.fail_saves(true);
    let session = controller(&store);
    session.start(CODE).await.unwrap();

    session.select("A").unwrap();
    session.next().unwrap();
    settle().await;

    assert_eq!(session.mode(), SessionMode::Playing);
    assert!(session.snapshot().last_error.is_none());
    assert!(store.saves().is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_flush_failure_aborts_submit() {
    let store = seeded_store(None);
    let session = controller(&store);
    session.start(CODE).await.unwrap();
    store.fail_saves(true);

    let err = session.submit().await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(store.submit_calls(), 0);
    assert_eq!(session.mode(), SessionMode::Playing);

    store.fail_saves(false);
    session.submit().await.unwrap();
    assert_eq!(session.mode(), SessionMode::Review);
}

#[tokio::test(start_paused = true)]
async fn failed_submit_is_retryable_and_keeps_answers() {
    let store = seeded_store(None);
    store.fail_next_submits(1);
    let session = controller(&store);
    session.start(CODE).await.unwrap();
    session.select("B").unwrap();

    let err = session.submit().await.unwrap_err();

    assert!(err.is_retryable());
    let snapshot = session.snapshot();
    assert_eq!(snapshot.mode, SessionMode::Playing);
    assert!(snapshot.last_error.is_some());
    assert_eq!(snapshot.question.unwrap().selected.as_deref(), Some("B"));

    session.submit().await.unwrap();
    assert_eq!(session.snapshot().score.unwrap().correct, 1);
    assert_eq!(store.submit_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn review_navigation_makes_no_backend_calls() {
    let store = seeded_store(None);
    let session = controller(&store);
    session.start(CODE).await.unwrap();
    session.select("B").unwrap();
    session.submit().await.unwrap();
    settle().await;
    let calls = (store.start_calls(), store.submit_calls(), store.saves().len());

    session.next().unwrap();
    session.go_to(9).unwrap();
    session.back().unwrap();
    settle().await;

    assert_eq!(
        (store.start_calls(), store.submit_calls(), store.saves().len()),
        calls
    );
    let snapshot = session.snapshot();
    assert_eq!(snapshot.index, 1);
    let question = snapshot.question.unwrap();
    assert_eq!(question.is_correct, Some(false));
    assert_eq!(question.correct_answer.as_deref(), Some("B"));
    assert!(matches!(
        session.select("B"),
        Err(SessionError::InvalidState { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn returning_participant_sees_results() {
    let store = seeded_store(None);
    let first = controller(&store);
    first.start(CODE).await.unwrap();
    first.submit().await.unwrap();

    let again = controller(&store);
    again.start(CODE).await.unwrap();
    assert_eq!(again.mode(), SessionMode::Review);

    store.hide_submitted_results(true);
    let hidden = controller(&store);
    assert!(matches!(
        hidden.start(CODE).await,
        Err(SessionError::AlreadySubmitted)
    ));
    assert_eq!(hidden.mode(), SessionMode::Lobby);
}

/// Loses the submit response after the backend recorded it.
struct LostResponseStore {
    inner: InMemoryAttemptStore,
}

#[async_trait]
impl AttemptStore for LostResponseStore {
    async fn start(&self, exam_id: &ExamId, code: &str) -> Result<StartOutcome, StoreError> {
        self.inner.start(exam_id, code).await
    }

    async fn save_answer(&self, attempt: &AttemptId, save: &AnswerSave) -> Result<(), StoreError> {
        self.inner.save_answer(attempt, save).await
    }

    async fn submit(&self, attempt: &AttemptId) -> Result<ExamResults, StoreError> {
        self.inner.submit(attempt).await?;
        Err(StoreError::AlreadySubmitted)
    }

    async fn preview(&self, exam_id: &ExamId) -> Result<Vec<QuestionResult>, StoreError> {
        self.inner.preview(exam_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn already_submitted_on_submit_recovers_results() {
    let store = seeded_store(None);
    let session = SessionController::new(
        Arc::new(LostResponseStore {
            inner: store.clone(),
        }),
        fixed_clock(),
        SessionConfig::default(),
        ExamId::new("chem-101"),
    );
    session.start(CODE).await.unwrap();

    session.submit().await.unwrap();

    assert_eq!(session.mode(), SessionMode::Review);
    assert_eq!(store.start_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_countdown() {
    let store = seeded_store(None);
    let session = controller(&store);
    session.start(CODE).await.unwrap();

    session.shutdown();
    tokio::time::sleep(Duration::from_secs(700)).await;

    assert_eq!(store.submit_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_failed_submit_never_rearms_countdown() {
    let store = seeded_store(None);
    store.set_latency(Some(Duration::from_secs(2)));
    store.fail_next_submits(1);
    let session = controller(&store);
    session.start(CODE).await.unwrap();
    let mut updates = session.subscribe();

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.submit().await })
    };
    updates
        .wait_for(|s| s.mode == SessionMode::Submitting)
        .await
        .unwrap();
    session.shutdown();

    assert!(pending.await.unwrap().is_err());
    assert_eq!(session.mode(), SessionMode::Playing);
    tokio::time::sleep(Duration::from_secs(700)).await;

    assert_eq!(store.submit_calls(), 1);
    assert_eq!(session.mode(), SessionMode::Playing);
    // Past the deadline answers lock, but nothing submits on its own.
    assert!(matches!(session.select("A"), Err(SessionError::TimeUp)));
    settle().await;
    assert_eq!(store.submit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_start_reaches_backend_once() {
    let store = seeded_store(None);
    store.set_latency(Some(Duration::from_secs(2)));
    let session = controller(&store);

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.start(CODE).await })
    };
    settle().await;

    assert!(matches!(
        session.start(CODE).await,
        Err(SessionError::StartInProgress)
    ));
    first.await.unwrap().unwrap();
    assert_eq!(session.mode(), SessionMode::Playing);
    assert_eq!(store.start_calls(), 1);
}

/// Grades the attempt but drops every result after the first.
struct TruncatingStore {
    inner: InMemoryAttemptStore,
}

#[async_trait]
impl AttemptStore for TruncatingStore {
    async fn start(&self, exam_id: &ExamId, code: &str) -> Result<StartOutcome, StoreError> {
        self.inner.start(exam_id, code).await
    }

    async fn save_answer(&self, attempt: &AttemptId, save: &AnswerSave) -> Result<(), StoreError> {
        self.inner.save_answer(attempt, save).await
    }

    async fn submit(&self, attempt: &AttemptId) -> Result<ExamResults, StoreError> {
        let mut results = self.inner.submit(attempt).await?;
        results.results.truncate(1);
        Ok(results)
    }

    async fn preview(&self, exam_id: &ExamId) -> Result<Vec<QuestionResult>, StoreError> {
        self.inner.preview(exam_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn short_result_list_still_reaches_review() {
    let store = seeded_store(None);
    let session = SessionController::new(
        Arc::new(TruncatingStore {
            inner: store.clone(),
        }),
        fixed_clock(),
        SessionConfig::default(),
        ExamId::new("chem-101"),
    );
    session.start(CODE).await.unwrap();
    session.select("B").unwrap();

    session.submit().await.unwrap();

    let snapshot = session.snapshot();
    assert_eq!(snapshot.mode, SessionMode::Review);
    assert_eq!(snapshot.question_count, 1);
    assert_eq!(snapshot.score.unwrap().total, 1);
    assert_eq!(session.go_to(2).unwrap(), 0);
    assert_eq!(store.submit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn preview_shows_answer_key_read_only() {
    let store = seeded_store(None);
    let session = SessionController::preview(
        Arc::new(store.clone()),
        SessionConfig::default(),
        ExamId::new("chem-101"),
    )
    .await
    .unwrap();

    assert_eq!(session.mode(), SessionMode::Preview);
    let question = session.snapshot().question.unwrap();
    assert_eq!(question.correct_answer.as_deref(), Some("B"));
    assert_eq!(question.selected, None);
    assert_eq!(session.next().unwrap(), 1);
    assert!(session.select("A").is_err());
    assert!(session.snapshot().remaining.is_none());
    assert_eq!(store.start_calls(), 0);
}
