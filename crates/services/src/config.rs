use std::env;
use std::time::Duration;

const DEFAULT_TICK_MILLIS: u64 = 1_000;
const DEFAULT_LOW_TIME_SECS: u64 = 60;

/// Tunables for a running exam session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Countdown refresh period.
    pub tick: Duration,
    /// Remaining time at or below which the countdown is flagged as low.
    pub low_time_threshold: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(DEFAULT_TICK_MILLIS),
            low_time_threshold: Duration::from_secs(DEFAULT_LOW_TIME_SECS),
        }
    }
}

impl SessionConfig {
    /// Read `EXAM_TICK_MILLIS` and `EXAM_LOW_TIME_SECS`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let tick = read_u64("EXAM_TICK_MILLIS")
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TICK_MILLIS);
        let low = read_u64("EXAM_LOW_TIME_SECS").unwrap_or(DEFAULT_LOW_TIME_SECS);
        Self {
            tick: Duration::from_millis(tick),
            low_time_threshold: Duration::from_secs(low),
        }
    }
}

fn read_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}
