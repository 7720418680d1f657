use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use exam_core::Clock;
use exam_core::model::{AttemptId, DeadlinePolicy, EntryTiming, ExamId, ExamResults};
use storage::{AttemptStore, StartOutcome, StoreError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::countdown::{RemainingTime, deadline_from};
use super::state::{ExamSession, Navigation, PendingSave, SessionMode, SubmitTrigger};
use super::view::SessionSnapshot;
use crate::config::SessionConfig;
use crate::error::SessionError;

#[derive(Default)]
struct Timer {
    deadline: Option<Instant>,
    ticker: Option<JoinHandle<()>>,
    /// Set by `shutdown`; no countdown may be armed or fire afterwards.
    shut_down: bool,
}

struct Inner {
    store: Arc<dyn AttemptStore>,
    clock: Clock,
    config: SessionConfig,
    session: Mutex<ExamSession>,
    timer: Mutex<Timer>,
    starting: AtomicBool,
    updates: watch::Sender<SessionSnapshot>,
}

/// Drives one exam session against an `AttemptStore`.
///
/// Owns the countdown task and dispatches autosaves; every state change is
/// published as a `SessionSnapshot` on a watch channel. Cloning yields another
/// handle to the same session. All methods must be called from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        store: Arc<dyn AttemptStore>,
        clock: Clock,
        config: SessionConfig,
        exam_id: ExamId,
    ) -> Self {
        Self::with_session(store, clock, config, ExamSession::lobby(exam_id))
    }

    /// Open a read-only walkthrough of the exam's answer key.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the preview cannot be fetched or is empty.
    pub async fn preview(
        store: Arc<dyn AttemptStore>,
        config: SessionConfig,
        exam_id: ExamId,
    ) -> Result<Self, SessionError> {
        let results = store.preview(&exam_id).await?;
        info!(exam_id = %exam_id, questions = results.len(), "opened exam preview");
        let session = ExamSession::preview(exam_id, results)?;
        Ok(Self::with_session(store, Clock::default(), config, session))
    }

    fn with_session(
        store: Arc<dyn AttemptStore>,
        clock: Clock,
        config: SessionConfig,
        session: ExamSession,
    ) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::capture(&session, None));
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                config,
                session: Mutex::new(session),
                timer: Mutex::new(Timer::default()),
                starting: AtomicBool::new(false),
                updates,
            }),
        }
    }

    /// Receive a snapshot after every state change and countdown tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.updates.borrow().clone()
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.inner.session().mode()
    }

    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.inner.session().exam_id().clone()
    }

    #[must_use]
    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.inner.session().attempt_id().cloned()
    }

    /// Enter the exam with an access code.
    ///
    /// Resolves the deadline and starts the countdown; an attempt whose time
    /// already ran out is submitted before this returns. An attempt that was
    /// already submitted goes straight to review.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyCode` for a blank code (no request is made),
    /// `SessionError::StartInProgress` while another start call is pending,
    /// `SessionError::AlreadyEnded` for a fresh attempt on a finished exam, and
    /// store errors for rejected codes or unreachable backends. The session
    /// stays in the lobby on every error except a failed immediate submit.
    pub async fn start(&self, code: &str) -> Result<(), SessionError> {
        self.inner.start(code).await
    }

    /// Move to the next question, autosaving the one left behind.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` in the lobby or while submitting.
    pub fn next(&self) -> Result<usize, SessionError> {
        self.inner.navigate(ExamSession::next)
    }

    /// Move to the previous question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` in the lobby or while submitting.
    pub fn back(&self) -> Result<usize, SessionError> {
        self.inner.navigate(ExamSession::back)
    }

    /// Jump to a zero-based position, clamped to the paper.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` in the lobby or while submitting.
    pub fn go_to(&self, index: usize) -> Result<usize, SessionError> {
        self.inner.navigate(|session| session.go_to(index))
    }

    /// Choose `value` for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::TimeUp` once the deadline passed, even before the
    /// countdown task has observed it.
    pub fn select(&self, value: &str) -> Result<(), SessionError> {
        self.inner.check_deadline();
        let result = self.inner.session().select(value);
        self.inner.publish();
        result.map(|_| ())
    }

    /// Choose the option at zero-based position `option`.
    ///
    /// # Errors
    ///
    /// See [`SessionController::select`]; also `SessionError::NoSuchOption`.
    pub fn select_option(&self, option: usize) -> Result<(), SessionError> {
        self.inner.check_deadline();
        let result = self.inner.session().select_option(option);
        self.inner.publish();
        result.map(|_| ())
    }

    /// Flush the current answer and submit the attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SubmitInProgress` if another submit holds the
    /// lock. On store failures the session returns to `Playing` with the error
    /// recorded and the submit can be retried.
    pub async fn submit(&self) -> Result<(), SessionError> {
        self.inner.run_submit(SubmitTrigger::Manual).await
    }

    /// Stop the countdown for good. A submit still in flight completes, but
    /// nothing restarts the countdown or submits automatically afterwards.
    /// Dropping the last handle also stops the countdown.
    pub fn shutdown(&self) {
        {
            let mut timer = self.inner.timer();
            timer.shut_down = true;
            if let Some(handle) = timer.ticker.take() {
                handle.abort();
            }
        }
        debug!(exam_id = %self.exam_id(), "session controller shut down");
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &*self.inner.session())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, ExamSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timer(&self) -> MutexGuard<'_, Timer> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deadline(&self) -> Option<Instant> {
        self.timer().deadline
    }

    fn publish(&self) {
        let remaining = self
            .deadline()
            .map(|d| RemainingTime::until(d, Instant::now(), self.config.low_time_threshold));
        let snapshot = SessionSnapshot::capture(&self.session(), remaining);
        self.updates.send_replace(snapshot);
    }

    fn record_error(&self, err: &SessionError) {
        self.session().set_error(err.user_message());
        self.publish();
    }

    // ─── Entry ─────────────────────────────────────────────────────────────────

    async fn start(self: &Arc<Self>, code: &str) -> Result<(), SessionError> {
        let code = code.trim();
        if code.is_empty() {
            let err = SessionError::EmptyCode;
            self.record_error(&err);
            return Err(err);
        }

        let (exam_id, mode) = {
            let session = self.session();
            (session.exam_id().clone(), session.mode())
        };
        if mode != SessionMode::Lobby {
            return Err(SessionError::InvalidState {
                action: "start",
                mode,
            });
        }
        let Some(_starting) = StartGuard::acquire(&self.starting) else {
            debug!(exam_id = %exam_id, "start already pending");
            return Err(SessionError::StartInProgress);
        };

        let outcome = match self.store.start(&exam_id, code).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = SessionError::from(err);
                warn!(exam_id = %exam_id, error = %err, "could not start attempt");
                self.record_error(&err);
                return Err(err);
            }
        };

        let started = match outcome {
            StartOutcome::AlreadySubmitted(results) => {
                info!(exam_id = %exam_id, "attempt already submitted; showing results");
                let entered = self.session().enter_review(results);
                if let Err(err) = entered {
                    self.record_error(&err);
                    return Err(err);
                }
                self.publish();
                return Ok(());
            }
            StartOutcome::InProgress(started) => started,
        };

        let now = self.clock.now();
        let origin = started.origin;
        let policy = DeadlinePolicy::resolve(&started.paper, &started.attempt, origin, now);
        let remaining = match policy.entry(origin, now) {
            EntryTiming::Run { remaining } => Some(remaining),
            EntryTiming::SubmitNow => None,
            EntryTiming::AlreadyEnded => {
                let err = SessionError::AlreadyEnded;
                info!(exam_id = %exam_id, ends_at = %policy.ends_at(), "exam already ended");
                self.record_error(&err);
                return Err(err);
            }
        };

        let attempt_id = started.attempt.id.clone();
        let entered = self.session().enter_play(started, code, policy);
        let discarded = match entered {
            Ok(discarded) => discarded,
            Err(err) => {
                self.record_error(&err);
                return Err(err);
            }
        };
        if !discarded.is_empty() {
            warn!(
                attempt_id = %attempt_id,
                ?discarded,
                "dropped saved answers for questions not on the paper"
            );
        }
        info!(
            exam_id = %exam_id,
            attempt_id = %attempt_id,
            ?origin,
            shared_deadline = policy.is_shared(),
            ends_at = %policy.ends_at(),
            "attempt entered play"
        );

        match remaining {
            Some(remaining) => {
                self.arm_countdown(deadline_from(remaining, Instant::now()));
                self.publish();
                Ok(())
            }
            None => {
                self.timer().deadline = Some(Instant::now());
                self.session().mark_time_up();
                self.publish();
                info!(attempt_id = %attempt_id, "time already up on resume; submitting");
                self.run_submit(SubmitTrigger::Expired).await
            }
        }
    }

    // ─── Navigation ────────────────────────────────────────────────────────────

    fn navigate(
        self: &Arc<Self>,
        step: impl FnOnce(&mut ExamSession) -> Result<Navigation, SessionError>,
    ) -> Result<usize, SessionError> {
        self.check_deadline();
        let navigation = step(&mut self.session())?;
        if let Some(pending) = navigation.autosave {
            self.spawn_autosave(pending);
        }
        self.publish();
        Ok(navigation.to)
    }

    fn spawn_autosave(&self, pending: PendingSave) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.save_answer(&pending.attempt_id, &pending.save).await {
                Ok(()) => debug!(
                    attempt_id = %pending.attempt_id,
                    question_id = %pending.save.question_id,
                    "answer autosaved"
                ),
                Err(err) => warn!(
                    attempt_id = %pending.attempt_id,
                    question_id = %pending.save.question_id,
                    error = %err,
                    "autosave failed"
                ),
            }
        });
    }

    // ─── Countdown ─────────────────────────────────────────────────────────────

    fn arm_countdown(self: &Arc<Self>, deadline: Instant) {
        let mut timer = self.timer();
        if timer.shut_down {
            debug!("controller shut down; countdown not armed");
            return;
        }
        timer.deadline = Some(deadline);
        let handle = spawn_ticker(self, deadline);
        if let Some(previous) = timer.ticker.replace(handle) {
            previous.abort();
        }
    }

    fn stop_ticker(&self) {
        if let Some(handle) = self.timer().ticker.take() {
            handle.abort();
        }
    }

    /// Lock answers if the deadline has passed, firing the automatic submit
    /// when it has not fired yet.
    fn check_deadline(self: &Arc<Self>) {
        let expired = self.deadline().is_some_and(|d| Instant::now() >= d);
        if expired {
            self.on_deadline();
        }
    }

    fn on_deadline(self: &Arc<Self>) {
        let fire = self.session().mark_time_up();
        self.publish();
        if !fire || self.timer().shut_down {
            return;
        }
        info!("time is up; submitting automatically");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = inner.run_submit(SubmitTrigger::Expired).await {
                warn!(error = %err, "automatic submission failed");
            }
        });
    }

    // ─── Submission ────────────────────────────────────────────────────────────

    async fn run_submit(self: &Arc<Self>, trigger: SubmitTrigger) -> Result<(), SessionError> {
        let ticket = self.session().begin_submit(trigger)?;
        self.stop_ticker();
        self.publish();

        let flush = ticket.flush;
        info!(attempt_id = %flush.attempt_id, ?trigger, "submitting attempt");

        if let Err(err) = self.store.save_answer(&flush.attempt_id, &flush.save).await {
            if err.is_transient() {
                warn!(error = %err, "final autosave failed; submission aborted");
                return Err(self.fail_submit(err.into()));
            }
            warn!(error = %err, "final autosave rejected; submitting anyway");
        }

        let results = match self.store.submit(&flush.attempt_id).await {
            Ok(results) => results,
            Err(StoreError::AlreadySubmitted) => match self.recover_results().await {
                Ok(results) => results,
                Err(err) => return Err(self.fail_submit(err)),
            },
            Err(err) => return Err(self.fail_submit(err.into())),
        };
        self.finish_submit(results)
    }

    /// Fetch results for an attempt the backend already considers submitted.
    async fn recover_results(&self) -> Result<ExamResults, SessionError> {
        let (exam_id, code) = {
            let session = self.session();
            (
                session.exam_id().clone(),
                session.entry_code().unwrap_or_default().to_owned(),
            )
        };
        info!(exam_id = %exam_id, "attempt already submitted; fetching results");
        match self.store.start(&exam_id, &code).await? {
            StartOutcome::AlreadySubmitted(results) => Ok(results),
            StartOutcome::InProgress(_) => Err(SessionError::Store(StoreError::Conflict(
                "attempt reported as submitted is still in progress".into(),
            ))),
        }
    }

    fn fail_submit(self: &Arc<Self>, err: SessionError) -> SessionError {
        warn!(error = %err, retryable = err.is_retryable(), "submission failed");
        let resume_countdown = match self.session().submit_failed(err.user_message()) {
            Ok(resume) => resume,
            Err(state) => {
                debug!(error = %state, "submission failure after session moved on");
                false
            }
        };
        if resume_countdown {
            if let Some(deadline) = self.deadline() {
                self.arm_countdown(deadline);
            }
        }
        self.publish();
        err
    }

    fn finish_submit(&self, results: ExamResults) -> Result<(), SessionError> {
        let expected = self.session().question_count();
        if results.results.len() != expected {
            warn!(
                expected,
                received = results.results.len(),
                "result count differs from question count"
            );
        }
        let summary_score = results.score;
        self.session().submit_succeeded(results)?;
        self.timer().deadline = None;
        self.publish();
        info!(score = ?summary_score, "attempt submitted");
        Ok(())
    }
}

/// Holds the pending-start flag; cleared on every exit from `start`.
struct StartGuard<'a>(&'a AtomicBool);

impl<'a> StartGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let timer = self.timer.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timer.ticker.take() {
            handle.abort();
        }
    }
}

fn spawn_ticker(inner: &Arc<Inner>, deadline: Instant) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let period = inner.config.tick;
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.publish();
                }
                () = time::sleep_until(deadline) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_deadline();
                    }
                    break;
                }
            }
        }
    })
}
