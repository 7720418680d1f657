use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use exam_core::Clock;
use exam_core::model::{
    Attempt, AttemptId, AttemptOrigin, AttemptStatus, ExamId, ExamPaper, ExamResults, ExamStatus,
    QuestionResult,
};

use crate::repository::{AnswerSave, AttemptStore, StartOutcome, StartedAttempt, StoreError};

struct SeededExam {
    paper: ExamPaper,
    code: String,
}

struct StoredAttempt {
    attempt: Attempt,
    results: Option<ExamResults>,
}

#[derive(Default)]
struct Faults {
    fail_saves: bool,
    failing_submits: u32,
    hide_submitted_results: bool,
    latency: Option<Duration>,
}

#[derive(Default)]
struct MemoryState {
    exams: HashMap<ExamId, SeededExam>,
    // One participant per store, so attempts are keyed by exam.
    attempts: HashMap<ExamId, StoredAttempt>,
    faults: Faults,
    saves: Vec<AnswerSave>,
    start_calls: usize,
    submit_calls: usize,
}

/// In-memory attempt store for testing, demos and offline prototyping.
///
/// Grades submissions locally against the seeded answer keys and can inject
/// failures and latency to exercise the session controller's error paths.
#[derive(Clone, Default)]
pub struct InMemoryAttemptStore {
    clock: Clock,
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryAttemptStore {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Register an exam (with its answer key) behind an entry code.
    pub fn seed_exam(&self, paper: ExamPaper, code: impl Into<String>) {
        let code = code.into();
        self.with_state(|state| {
            state
                .exams
                .insert(paper.id().clone(), SeededExam { paper, code });
        });
    }

    /// Register an existing attempt, e.g. to simulate a reload mid-exam.
    pub fn seed_attempt(&self, attempt: Attempt) {
        self.with_state(|state| {
            state.attempts.insert(
                attempt.exam_id.clone(),
                StoredAttempt {
                    attempt,
                    results: None,
                },
            );
        });
    }

    /// Make every autosave fail until turned off again.
    pub fn fail_saves(&self, fail: bool) {
        self.with_state(|state| state.faults.fail_saves = fail);
    }

    /// Make the next `count` submit calls fail with a network error.
    pub fn fail_next_submits(&self, count: u32) {
        self.with_state(|state| state.faults.failing_submits = count);
    }

    /// When set, starting a submitted attempt fails instead of returning results.
    pub fn hide_submitted_results(&self, hide: bool) {
        self.with_state(|state| state.faults.hide_submitted_results = hide);
    }

    /// Delay every call by `latency` (tokio time).
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.with_state(|state| state.faults.latency = latency);
    }

    #[must_use]
    pub fn start_calls(&self) -> usize {
        self.with_state(|state| state.start_calls)
    }

    #[must_use]
    pub fn submit_calls(&self) -> usize {
        self.with_state(|state| state.submit_calls)
    }

    /// Autosaves received so far, in arrival order.
    #[must_use]
    pub fn saves(&self) -> Vec<AnswerSave> {
        self.with_state(|state| state.saves.clone())
    }

    /// Current persisted shape of the attempt for `exam_id`.
    #[must_use]
    pub fn attempt(&self, exam_id: &ExamId) -> Option<Attempt> {
        self.with_state(|state| {
            state
                .attempts
                .get(exam_id)
                .map(|stored| stored.attempt.clone())
        })
    }

    async fn delay(&self) {
        let latency = self.with_state(|state| state.faults.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn find_attempt<'a>(
    state: &'a mut MemoryState,
    attempt_id: &AttemptId,
) -> Result<(&'a ExamPaper, &'a mut StoredAttempt), StoreError> {
    let MemoryState {
        exams, attempts, ..
    } = state;
    let stored = attempts
        .values_mut()
        .find(|stored| &stored.attempt.id == attempt_id)
        .ok_or(StoreError::NotFound)?;
    let exam = exams
        .get(&stored.attempt.exam_id)
        .ok_or(StoreError::NotFound)?;
    Ok((&exam.paper, stored))
}

fn grade(paper: &ExamPaper, attempt: &Attempt) -> ExamResults {
    let results: Vec<QuestionResult> = paper
        .questions()
        .iter()
        .map(|q| QuestionResult::grade(q, attempt.answers.get(q.id()).map(String::as_str)))
        .collect();
    let score: f64 = results
        .iter()
        .filter(|r| r.is_correct)
        .map(|r| f64::from(r.marks()))
        .sum();
    ExamResults {
        score: Some(score),
        results,
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn start(&self, exam_id: &ExamId, code: &str) -> Result<StartOutcome, StoreError> {
        self.delay().await;
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;
        state.start_calls += 1;

        let exam = state
            .exams
            .get(exam_id)
            .ok_or_else(|| StoreError::ExamUnavailable(format!("exam {exam_id} not found")))?;
        if exam.code != code.trim() {
            return Err(StoreError::InvalidCode("entry code does not match".into()));
        }

        if let Some(stored) = state.attempts.get(exam_id) {
            if stored.attempt.status.is_submitted() {
                return match (&stored.results, state.faults.hide_submitted_results) {
                    (Some(results), false) => Ok(StartOutcome::AlreadySubmitted(results.clone())),
                    _ => Err(StoreError::AlreadySubmitted),
                };
            }
            if exam.paper.status() != ExamStatus::Active {
                return Err(StoreError::ExamUnavailable("exam is not active".into()));
            }
            return Ok(StartOutcome::InProgress(StartedAttempt {
                paper: exam.paper.without_answer_key(),
                attempt: stored.attempt.clone(),
                origin: AttemptOrigin::Resumed,
            }));
        }

        if exam.paper.status() != ExamStatus::Active {
            return Err(StoreError::ExamUnavailable("exam is not active".into()));
        }

        let attempt = Attempt::started(AttemptId::generate(), exam_id.clone(), now);
        let paper = exam.paper.without_answer_key();
        state.attempts.insert(
            exam_id.clone(),
            StoredAttempt {
                attempt: attempt.clone(),
                results: None,
            },
        );

        Ok(StartOutcome::InProgress(StartedAttempt {
            paper,
            attempt,
            origin: AttemptOrigin::Fresh,
        }))
    }

    async fn save_answer(
        &self,
        attempt_id: &AttemptId,
        save: &AnswerSave,
    ) -> Result<(), StoreError> {
        self.delay().await;
        let mut guard = self.lock()?;
        let state = &mut *guard;
        if state.faults.fail_saves {
            return Err(StoreError::Network("autosave dropped".into()));
        }
        state.saves.push(save.clone());

        let (paper, stored) = find_attempt(state, attempt_id)?;
        if stored.attempt.status.is_submitted() {
            return Err(StoreError::Conflict("attempt already submitted".into()));
        }
        if paper.find(&save.question_id).is_none() {
            return Err(StoreError::Conflict(format!(
                "question {} is not part of this exam",
                save.question_id
            )));
        }

        if let Some(value) = &save.value {
            stored
                .attempt
                .answers
                .insert(save.question_id.clone(), value.clone());
        }
        stored.attempt.current_index = save
            .current_index
            .min(paper.question_count().saturating_sub(1));
        Ok(())
    }

    async fn submit(&self, attempt_id: &AttemptId) -> Result<ExamResults, StoreError> {
        self.delay().await;
        let mut guard = self.lock()?;
        let state = &mut *guard;
        state.submit_calls += 1;
        if state.faults.failing_submits > 0 {
            state.faults.failing_submits -= 1;
            return Err(StoreError::Network("submit timed out".into()));
        }

        let (paper, stored) = find_attempt(state, attempt_id)?;
        if let Some(results) = &stored.results {
            // Resubmission is idempotent.
            return Ok(results.clone());
        }

        let results = grade(paper, &stored.attempt);
        stored
            .attempt
            .status
            .advance(AttemptStatus::Submitted)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        stored.results = Some(results.clone());
        Ok(results)
    }

    async fn preview(&self, exam_id: &ExamId) -> Result<Vec<QuestionResult>, StoreError> {
        self.delay().await;
        let guard = self.lock()?;
        let exam = guard.exams.get(exam_id).ok_or(StoreError::NotFound)?;
        Ok(exam
            .paper
            .questions()
            .iter()
            .map(|q| QuestionResult::grade(q, None))
            .collect())
    }
}
