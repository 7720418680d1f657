use std::fmt;

use exam_core::model::{
    AnswerSheet, AttemptId, DeadlinePolicy, ExamError, ExamId, ExamPaper, ExamResults,
    QuestionId, QuestionResult, ScoreSummary,
};
use storage::{AnswerSave, StartedAttempt};

use super::progress::SessionProgress;
use super::view::QuestionView;
use crate::error::SessionError;

//
// ─── PUBLIC LABELS ─────────────────────────────────────────────────────────────
//

/// Externally visible mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Lobby,
    Playing,
    /// Submit call in flight; every further submit trigger is refused.
    Submitting,
    Review,
    Preview,
}

/// What initiated a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    /// The participant confirmed the submit action.
    Manual,
    /// The countdown reached zero.
    Expired,
}

/// Autosave that should be dispatched for a question just left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    pub attempt_id: AttemptId,
    pub save: AnswerSave,
}

/// Outcome of a Next/Back/jump action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub from: usize,
    pub to: usize,
    pub autosave: Option<PendingSave>,
}

/// Issued when a session enters `Submitting`; holds the final flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitTicket {
    pub trigger: SubmitTrigger,
    pub flush: PendingSave,
}

//
// ─── PHASES ────────────────────────────────────────────────────────────────────
//

struct PlayState {
    paper: ExamPaper,
    attempt_id: AttemptId,
    entry_code: String,
    sheet: AnswerSheet,
    index: usize,
    policy: DeadlinePolicy,
    time_up: bool,
    auto_submit_fired: bool,
}

impl PlayState {
    fn pending_save(&self, question_index: usize) -> Option<PendingSave> {
        let question = self.paper.question(question_index)?;
        Some(PendingSave {
            attempt_id: self.attempt_id.clone(),
            save: AnswerSave {
                question_id: question.id().clone(),
                value: self.sheet.get(question.id()).map(str::to_owned),
                current_index: self.index,
            },
        })
    }
}

struct ReviewState {
    title: Option<String>,
    results: ExamResults,
    summary: ScoreSummary,
    index: usize,
}

struct PreviewState {
    results: Vec<QuestionResult>,
    index: usize,
}

enum Phase {
    Lobby,
    Playing(PlayState),
    Submitting(PlayState),
    Review(ReviewState),
    Preview(PreviewState),
}

impl Phase {
    fn mode(&self) -> SessionMode {
        match self {
            Phase::Lobby => SessionMode::Lobby,
            Phase::Playing(_) => SessionMode::Playing,
            Phase::Submitting(_) => SessionMode::Submitting,
            Phase::Review(_) => SessionMode::Review,
            Phase::Preview(_) => SessionMode::Preview,
        }
    }
}

fn clamp(target: usize, count: usize) -> usize {
    target.min(count.saturating_sub(1))
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// State machine for one exam attempt (or one preview).
///
/// Pure and synchronous: network calls, timers and autosave dispatch belong to
/// `SessionController`. Every operation is checked against the current phase,
/// so answering in review or submitting twice is rejected instead of ignored.
pub struct ExamSession {
    exam_id: ExamId,
    phase: Phase,
    last_error: Option<String>,
}

impl ExamSession {
    /// A session waiting for an entry code.
    #[must_use]
    pub fn lobby(exam_id: ExamId) -> Self {
        Self {
            exam_id,
            phase: Phase::Lobby,
            last_error: None,
        }
    }

    /// A read-only walkthrough of an exam's answer key.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Exam` if there is nothing to preview.
    pub fn preview(exam_id: ExamId, results: Vec<QuestionResult>) -> Result<Self, SessionError> {
        if results.is_empty() {
            return Err(ExamError::NoQuestions.into());
        }
        Ok(Self {
            exam_id,
            phase: Phase::Preview(PreviewState { results, index: 0 }),
            last_error: None,
        })
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.phase.mode()
    }

    #[must_use]
    pub fn exam_id(&self) -> &ExamId {
        &self.exam_id
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidState {
            action,
            mode: self.mode(),
        }
    }

    // ─── Transitions ───────────────────────────────────────────────────────────

    /// `Lobby → Playing` with a started attempt and its resolved deadline policy.
    ///
    /// Returns the ids of persisted answers that were dropped because their
    /// questions are not on the paper.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside the lobby.
    pub fn enter_play(
        &mut self,
        started: StartedAttempt,
        entry_code: &str,
        policy: DeadlinePolicy,
    ) -> Result<Vec<QuestionId>, SessionError> {
        if !matches!(self.phase, Phase::Lobby) {
            return Err(self.invalid("start"));
        }
        let StartedAttempt { paper, attempt, .. } = started;
        let (sheet, discarded) = AnswerSheet::restore(&paper, attempt.answers);
        let index = clamp(attempt.current_index, paper.question_count());

        self.phase = Phase::Playing(PlayState {
            paper,
            attempt_id: attempt.id,
            entry_code: entry_code.to_owned(),
            sheet,
            index,
            policy,
            time_up: false,
            auto_submit_fired: false,
        });
        self.last_error = None;
        Ok(discarded)
    }

    /// Show graded results, from the lobby (already submitted) or after a submit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` from any other phase.
    pub fn enter_review(&mut self, results: ExamResults) -> Result<(), SessionError> {
        let title = match &self.phase {
            Phase::Lobby => None,
            Phase::Submitting(play) => Some(play.paper.title().to_owned()),
            _ => return Err(self.invalid("show results")),
        };
        let summary = ScoreSummary::from_results(&results);
        self.phase = Phase::Review(ReviewState {
            title,
            results,
            summary,
            index: 0,
        });
        self.last_error = None;
        Ok(())
    }

    /// `Playing → Submitting`. This is the submission lock: once taken, every
    /// other submit trigger fails until the call resolves.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SubmitInProgress` if a submit is already in flight,
    /// `SessionError::AutoSubmitUsed` if an expiry already fired once, or
    /// `SessionError::InvalidState` outside `Playing`.
    pub fn begin_submit(&mut self, trigger: SubmitTrigger) -> Result<SubmitTicket, SessionError> {
        let mode = self.mode();
        let play = match &mut self.phase {
            Phase::Playing(play) => play,
            Phase::Submitting(_) => return Err(SessionError::SubmitInProgress),
            _ => {
                return Err(SessionError::InvalidState {
                    action: "submit",
                    mode,
                });
            }
        };
        if trigger == SubmitTrigger::Expired {
            if play.auto_submit_fired {
                return Err(SessionError::AutoSubmitUsed);
            }
            play.auto_submit_fired = true;
            play.time_up = true;
        }
        let flush = play
            .pending_save(play.index)
            .ok_or(ExamError::NoQuestions)?;

        self.phase = match std::mem::replace(&mut self.phase, Phase::Lobby) {
            Phase::Playing(play) => Phase::Submitting(play),
            other => other,
        };
        self.last_error = None;
        Ok(SubmitTicket { trigger, flush })
    }

    /// `Submitting → Playing` after a failed submit call.
    ///
    /// Returns `true` when the countdown may keep driving an automatic submit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless a submit is in flight.
    pub fn submit_failed(&mut self, message: impl Into<String>) -> Result<bool, SessionError> {
        let play = match std::mem::replace(&mut self.phase, Phase::Lobby) {
            Phase::Submitting(play) => play,
            other => {
                self.phase = other;
                return Err(self.invalid("fail a submission"));
            }
        };
        let countdown_live = !play.auto_submit_fired;
        self.phase = Phase::Playing(play);
        self.last_error = Some(message.into());
        Ok(countdown_live)
    }

    /// `Submitting → Review` with the server's results.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless a submit is in flight.
    pub fn submit_succeeded(&mut self, results: ExamResults) -> Result<(), SessionError> {
        if !matches!(self.phase, Phase::Submitting(_)) {
            return Err(self.invalid("complete a submission"));
        }
        self.enter_review(results)
    }

    /// Lock answers because the deadline passed.
    ///
    /// Returns `true` if an automatic submit should now fire.
    pub fn mark_time_up(&mut self) -> bool {
        match &mut self.phase {
            Phase::Playing(play) => {
                play.time_up = true;
                !play.auto_submit_fired
            }
            _ => false,
        }
    }

    // ─── Navigation ────────────────────────────────────────────────────────────

    /// Move forward one question. Autosaves the question left behind.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` in the lobby or while submitting.
    pub fn next(&mut self) -> Result<Navigation, SessionError> {
        let target = self.index().saturating_add(1);
        self.navigate("go to the next question", target, true)
    }

    /// Move back one question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` in the lobby or while submitting.
    pub fn back(&mut self) -> Result<Navigation, SessionError> {
        let target = self.index().saturating_sub(1);
        self.navigate("go to the previous question", target, false)
    }

    /// Jump to `target` (clamped). Autosaves the question left behind.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` in the lobby or while submitting.
    pub fn go_to(&mut self, target: usize) -> Result<Navigation, SessionError> {
        self.navigate("jump to a question", target, true)
    }

    fn navigate(
        &mut self,
        action: &'static str,
        target: usize,
        save_on_leave: bool,
    ) -> Result<Navigation, SessionError> {
        let mode = self.mode();
        let (from, to, autosave) = match &mut self.phase {
            Phase::Playing(play) => {
                let from = play.index;
                play.index = clamp(target, play.paper.question_count());
                let moved = play.index != from;
                let autosave = if save_on_leave && moved && !play.time_up {
                    play.pending_save(from)
                } else {
                    None
                };
                (from, play.index, autosave)
            }
            Phase::Review(review) => {
                let from = review.index;
                review.index = clamp(target, review.results.results.len());
                (from, review.index, None)
            }
            Phase::Preview(preview) => {
                let from = preview.index;
                preview.index = clamp(target, preview.results.len());
                (from, preview.index, None)
            }
            Phase::Lobby | Phase::Submitting(_) => {
                return Err(SessionError::InvalidState { action, mode });
            }
        };
        Ok(Navigation { from, to, autosave })
    }

    // ─── Answers ───────────────────────────────────────────────────────────────

    /// Select `value` for the current question, replacing any earlier choice.
    ///
    /// Returns the previous selection.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::TimeUp` once the deadline passed,
    /// `SessionError::Attempt` for values that are not options, and
    /// `SessionError::InvalidState` outside `Playing`.
    pub fn select(&mut self, value: &str) -> Result<Option<String>, SessionError> {
        let mode = self.mode();
        let Phase::Playing(play) = &mut self.phase else {
            return Err(SessionError::InvalidState {
                action: "select an answer",
                mode,
            });
        };
        if play.time_up {
            return Err(SessionError::TimeUp);
        }
        let question = play
            .paper
            .question(play.index)
            .ok_or(ExamError::NoQuestions)?;
        Ok(play.sheet.select(question, value)?)
    }

    /// Select the option at zero-based `option` on the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoSuchOption` for an out-of-range option and
    /// everything `select` returns.
    pub fn select_option(&mut self, option: usize) -> Result<Option<String>, SessionError> {
        let value = match &self.phase {
            Phase::Playing(play) => play
                .paper
                .question(play.index)
                .and_then(|q| q.options().get(option))
                .cloned()
                .ok_or(SessionError::NoSuchOption(option))?,
            _ => return Err(self.invalid("select an answer")),
        };
        self.select(&value)
    }

    // ─── Read access ───────────────────────────────────────────────────────────

    /// Current zero-based position (0 in the lobby).
    #[must_use]
    pub fn index(&self) -> usize {
        match &self.phase {
            Phase::Playing(play) | Phase::Submitting(play) => play.index,
            Phase::Review(review) => review.index,
            Phase::Preview(preview) => preview.index,
            Phase::Lobby => 0,
        }
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        match &self.phase {
            Phase::Playing(play) | Phase::Submitting(play) => play.paper.question_count(),
            Phase::Review(review) => review.results.results.len(),
            Phase::Preview(preview) => preview.results.len(),
            Phase::Lobby => 0,
        }
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match &self.phase {
            Phase::Playing(play) | Phase::Submitting(play) => Some(play.paper.title()),
            Phase::Review(review) => review.title.as_deref(),
            Phase::Lobby | Phase::Preview(_) => None,
        }
    }

    #[must_use]
    pub fn attempt_id(&self) -> Option<&AttemptId> {
        match &self.phase {
            Phase::Playing(play) | Phase::Submitting(play) => Some(&play.attempt_id),
            _ => None,
        }
    }

    /// Entry code that opened the running attempt.
    #[must_use]
    pub fn entry_code(&self) -> Option<&str> {
        match &self.phase {
            Phase::Playing(play) | Phase::Submitting(play) => Some(&play.entry_code),
            _ => None,
        }
    }

    #[must_use]
    pub fn deadline_policy(&self) -> Option<DeadlinePolicy> {
        match &self.phase {
            Phase::Playing(play) | Phase::Submitting(play) => Some(play.policy),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_time_up(&self) -> bool {
        match &self.phase {
            Phase::Playing(play) | Phase::Submitting(play) => play.time_up,
            _ => false,
        }
    }

    /// Selection for the current question while playing.
    #[must_use]
    pub fn current_selection(&self) -> Option<&str> {
        match &self.phase {
            Phase::Playing(play) | Phase::Submitting(play) => play
                .paper
                .question(play.index)
                .and_then(|q| play.sheet.get(q.id())),
            _ => None,
        }
    }

    #[must_use]
    pub fn results(&self) -> Option<&ExamResults> {
        match &self.phase {
            Phase::Review(review) => Some(&review.results),
            _ => None,
        }
    }

    #[must_use]
    pub fn score(&self) -> Option<ScoreSummary> {
        match &self.phase {
            Phase::Review(review) => Some(review.summary),
            _ => None,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Option<SessionProgress> {
        match &self.phase {
            Phase::Playing(play) | Phase::Submitting(play) => Some(SessionProgress::from_flags(
                play.paper
                    .questions()
                    .iter()
                    .map(|q| play.sheet.is_answered(q.id())),
            )),
            Phase::Review(review) => Some(SessionProgress::from_flags(
                review.results.results.iter().map(QuestionResult::is_answered),
            )),
            Phase::Lobby | Phase::Preview(_) => None,
        }
    }

    /// Presentation-ready view of the question at the current position.
    #[must_use]
    pub fn question_view(&self) -> Option<QuestionView> {
        match &self.phase {
            Phase::Playing(play) | Phase::Submitting(play) => {
                let question = play.paper.question(play.index)?;
                Some(QuestionView::unanswered(question, play.sheet.get(question.id())))
            }
            Phase::Review(review) => review
                .results
                .results
                .get(review.index)
                .map(QuestionView::graded),
            Phase::Preview(preview) => preview
                .results
                .get(preview.index)
                .map(QuestionView::answer_key),
            Phase::Lobby => None,
        }
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("exam_id", &self.exam_id)
            .field("mode", &self.mode())
            .field("index", &self.index())
            .field("question_count", &self.question_count())
            .field("time_up", &self.is_time_up())
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
