//! # Reinitialization policy for failed links.
//!
//! [`ReinitPolicy`] gates how often a Failed link may try to bring its device
//! back. The first attempt after a failure is detected is allowed at once;
//! every later attempt waits until `cooldown` has passed since the previous
//! one, whether that attempt succeeded or not.
//!
//! ```text
//! failure detected  → arm()             → permits(now) == true
//! attempt at T      → record_attempt(T) → permits(t) == (t - T >= cooldown)
//! ```

use embassy_time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReinitPolicy {
    cooldown: Duration,
    last_attempt: Option<Instant>,
}

impl ReinitPolicy {
    pub const fn new(cooldown: Duration) -> Self {
        Self { cooldown, last_attempt: None }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Forget the previous attempt so the next check is permitted immediately.
    pub fn arm(&mut self) {
        self.last_attempt = None;
    }

    pub fn permits(&self, now: Instant) -> bool {
        self.remaining(now) == Duration::from_ticks(0)
    }

    /// Stamp an attempt. Called before the attempt runs so a slow or failing
    /// device still waits a full cooldown.
    pub fn record_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    /// Time left until the next attempt is permitted; zero when it already is.
    pub fn remaining(&self, now: Instant) -> Duration {
        let Some(last) = self.last_attempt else {
            return Duration::from_ticks(0);
        };
        // A clock that appears to run backwards counts as no time elapsed.
        let elapsed = now
            .checked_duration_since(last)
            .unwrap_or(Duration::from_ticks(0));
        self.cooldown
            .checked_sub(elapsed)
            .unwrap_or(Duration::from_ticks(0))
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }
}
