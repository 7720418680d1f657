use std::time::Duration;

use tokio::time::Instant;

/// Remaining time published with every snapshot while an attempt is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainingTime {
    /// Whole seconds left, rounded up; `0` once the deadline passed.
    pub seconds: u64,
    /// At or below the configured low-time threshold.
    pub low: bool,
    pub expired: bool,
}

impl RemainingTime {
    pub(crate) fn until(deadline: Instant, now: Instant, low_threshold: Duration) -> Self {
        let left = deadline.saturating_duration_since(now);
        let seconds = ceil_secs(left);
        Self {
            seconds,
            low: left <= low_threshold,
            expired: left.is_zero(),
        }
    }

    /// Display form, `MM:SS` or `H:MM:SS` past one hour.
    #[must_use]
    pub fn display(&self) -> String {
        format_remaining(self.seconds)
    }
}

fn ceil_secs(left: Duration) -> u64 {
    let whole = left.as_secs();
    if left.subsec_nanos() > 0 {
        whole + 1
    } else {
        whole
    }
}

/// Convert a signed chrono remaining span into a monotonic deadline.
pub(crate) fn deadline_from(remaining: chrono::Duration, now: Instant) -> Instant {
    let left = remaining.to_std().unwrap_or(Duration::ZERO);
    now + left
}

#[must_use]
pub fn format_remaining(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}
