use chrono::{DateTime, Duration, Utc};

use crate::model::attempt::{Attempt, AttemptOrigin};
use crate::model::exam::ExamPaper;

/// How the end of an attempt is determined. Chosen once when the attempt
/// enters play and fixed for the rest of its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlinePolicy {
    /// Every participant shares the same absolute end time.
    Shared { ends_at: DateTime<Utc> },
    /// The attempt runs on its own timer from `started_at`.
    PerAttempt {
        started_at: DateTime<Utc>,
        duration: Duration,
    },
}

/// What the controller should do when entering play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTiming {
    /// Time is left; run the countdown from `remaining`.
    Run { remaining: Duration },
    /// The attempt was already underway and its time is gone.
    SubmitNow,
    /// The attempt never started and the exam is already over.
    AlreadyEnded,
}

impl DeadlinePolicy {
    /// Resolve the deadline policy for an attempt entering play at `now`.
    ///
    /// A shared deadline applies only while the exam is active and publishes a
    /// global end time. Otherwise the attempt gets a private timer: a fresh
    /// attempt gets the full duration, a resumed one continues from its
    /// recorded start time.
    #[must_use]
    pub fn resolve(
        paper: &ExamPaper,
        attempt: &Attempt,
        origin: AttemptOrigin,
        now: DateTime<Utc>,
    ) -> Self {
        if paper.status().is_active() {
            if let Some(ends_at) = paper.global_end_time() {
                return Self::Shared { ends_at };
            }
        }

        let duration = Duration::minutes(i64::from(paper.duration_minutes()));
        let started_at = match origin {
            AttemptOrigin::Fresh => now,
            AttemptOrigin::Resumed => attempt.start_time.unwrap_or(now),
        };
        Self::PerAttempt {
            started_at,
            duration,
        }
    }

    #[must_use]
    pub fn ends_at(&self) -> DateTime<Utc> {
        match self {
            Self::Shared { ends_at } => *ends_at,
            Self::PerAttempt {
                started_at,
                duration,
            } => *started_at + *duration,
        }
    }

    /// Signed time left at `now`; negative once the deadline has passed.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.ends_at() - now
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared { .. })
    }

    /// Decide how to enter play for an attempt of the given origin.
    #[must_use]
    pub fn entry(&self, origin: AttemptOrigin, now: DateTime<Utc>) -> EntryTiming {
        let remaining = self.remaining(now);
        if remaining > Duration::zero() {
            return EntryTiming::Run { remaining };
        }
        match origin {
            AttemptOrigin::Resumed => EntryTiming::SubmitNow,
            AttemptOrigin::Fresh => EntryTiming::AlreadyEnded,
        }
    }
}
