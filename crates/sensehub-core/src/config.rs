use embassy_time::Duration;

/// Loop period in milliseconds.
pub const DEFAULT_TICK_PERIOD_MS: u64 = 10;
/// A Ready link with no sample for this long is declared Failed.
pub const DEFAULT_FAILURE_THRESHOLD_MS: u64 = 50;
/// Minimum spacing between two reinitialization attempts on one link.
pub const DEFAULT_REINIT_COOLDOWN_MS: u64 = 5_000;
/// Upper bound for a single `poll()` bus transaction.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 25;
/// Upper bound for a full `initialize()` sequence, and for a whole
/// reinitialization attempt.
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 500;
/// Upper bound for one reinitialization step within a tick.
pub const DEFAULT_RECOVERY_STEP_TIMEOUT_MS: u64 = 30;
/// Time a device needs after its enable line is asserted before it answers.
pub const DEFAULT_SETTLE_DELAY_MS: u32 = 10;
/// How long startup waits for the host before proceeding with defaults.
pub const DEFAULT_HOST_WAIT_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AcquisitionConfig {
    pub tick_period: Duration,
    pub failure_threshold: Duration,
    pub reinit_cooldown: Duration,
    pub poll_timeout: Duration,
    pub init_timeout: Duration,
    pub recovery_step_timeout: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(DEFAULT_TICK_PERIOD_MS),
            failure_threshold: Duration::from_millis(
                DEFAULT_FAILURE_THRESHOLD_MS,
            ),
            reinit_cooldown: Duration::from_millis(DEFAULT_REINIT_COOLDOWN_MS),
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            init_timeout: Duration::from_millis(DEFAULT_INIT_TIMEOUT_MS),
            recovery_step_timeout: Duration::from_millis(
                DEFAULT_RECOVERY_STEP_TIMEOUT_MS,
            ),
        }
    }
}

impl AcquisitionConfig {
    /// Silence after which a link sampling every `period` is declared Failed.
    ///
    /// Never below `failure_threshold`; a device slower than the loop gets
    /// two of its own periods plus one tick, so a sample that lands just
    /// after a tick is not mistaken for a fault.
    pub fn failure_threshold_for(&self, period: Option<Duration>) -> Duration {
        match period {
            Some(period) => self
                .failure_threshold
                .max(period * 2 + self.tick_period),
            None => self.failure_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AllocatorConfig {
    pub settle_delay_ms: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self { settle_delay_ms: DEFAULT_SETTLE_DELAY_MS }
    }
}

/// Wire encoding used by the output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputFormat {
    /// One comma separated line per sample.
    #[default]
    Text,
    /// Fixed-width checksummed frame per sample.
    Binary,
}
