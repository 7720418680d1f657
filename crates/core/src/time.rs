use chrono::{DateTime, Duration, Utc};

/// Wall-clock source used to resolve exam deadlines.
///
/// Countdown ticking runs on the async runtime's monotonic timer; this clock is
/// only read when an attempt enters play and by stores that stamp start times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }

    /// A fixed clock moved by `delta`. The system clock cannot be shifted and
    /// is returned unchanged.
    #[must_use]
    pub fn shifted(self, delta: Duration) -> Self {
        match self {
            Clock::System => Clock::System,
            Clock::Fixed(at) => Clock::Fixed(at + delta),
        }
    }
}

/// 2023-11-14T22:13:20Z, the reference instant for tests and the demo.
pub const REFERENCE_EPOCH_SECS: i64 = 1_700_000_000;

/// # Panics
///
/// Panics if the reference instant cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(REFERENCE_EPOCH_SECS, 0)
        .expect("reference timestamp should be valid")
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
