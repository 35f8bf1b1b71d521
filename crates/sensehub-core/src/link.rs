//! Device links: one physical sensor on the shared bus together with the
//! bookkeeping the acquisition loop needs to detect and recover from faults.

use embassy_time::{with_timeout, Duration, Instant};

use crate::fmt::Dbg;
use crate::policy::ReinitPolicy;
use crate::sample::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Uninitialized,
    Ready,
    Failed,
}

/// A sensor that can be brought up and polled over the bus.
///
/// Implementations translate vendor report identifiers and status codes into
/// a [`Reading`]; nothing vendor specific leaves this trait.
pub trait SensorLink {
    type Error: core::fmt::Debug;

    /// Reset, identify and configure the device. Must be safe to call again
    /// on a device that was already initialized or has been power-cycled.
    async fn initialize(&mut self) -> Result<(), Self::Error>;

    /// `Ok(None)` when the device has nothing new since the last call.
    async fn poll(&mut self) -> Result<Option<Reading>, Self::Error>;

    /// How often the device produces a sample, when slower than the loop.
    fn sample_period(&self) -> Option<Duration> {
        None
    }

    /// Called once before the first [`recover`](Self::recover) step of a
    /// reinitialization attempt.
    fn begin_recovery(&mut self) {}

    /// One short step of a reinitialization attempt, called once per tick
    /// until it returns [`Recovery::Done`] or an error. Waits between steps
    /// are expressed as `Pending` against `now`, never slept through.
    async fn recover(&mut self, now: Instant) -> Result<Recovery, Self::Error> {
        let _ = now;
        self.initialize().await.map(|()| Recovery::Done)
    }
}

impl<T: SensorLink + ?Sized> SensorLink for &mut T {
    type Error = T::Error;

    async fn initialize(&mut self) -> Result<(), Self::Error> {
        T::initialize(self).await
    }

    async fn poll(&mut self) -> Result<Option<Reading>, Self::Error> {
        T::poll(self).await
    }

    fn sample_period(&self) -> Option<Duration> {
        T::sample_period(self)
    }

    fn begin_recovery(&mut self) {
        T::begin_recovery(self)
    }

    async fn recover(&mut self, now: Instant) -> Result<Recovery, Self::Error> {
        T::recover(self, now).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Recovery {
    /// Call again on the next tick.
    Pending,
    Done,
}

/// Outcome of one poll. Bus errors and timeouts are indistinguishable from
/// an empty read here; elapsed time since the last sample tells them apart.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polled {
    Sample(Reading),
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError<E> {
    Timeout,
    Device(E),
}

pub struct DeviceLink<S> {
    index: u8,
    address: u8,
    state: LinkState,
    last_sample: Instant,
    reference: Instant,
    policy: ReinitPolicy,
    /// Start of the reinitialization attempt in progress.
    attempt: Option<Instant>,
    sensor: S,
}

impl<S: SensorLink> DeviceLink<S> {
    pub fn new(index: u8, address: u8, sensor: S, cooldown: Duration) -> Self {
        Self {
            index,
            address,
            state: LinkState::Uninitialized,
            last_sample: Instant::from_ticks(0),
            reference: Instant::from_ticks(0),
            policy: ReinitPolicy::new(cooldown),
            attempt: None,
            sensor,
        }
    }

    /// Run the sensor's bring-up, bounded by `timeout`. On success the link
    /// starts over: Ready, with its reference and last-sample instants at `now`.
    /// On failure the state is left untouched.
    pub async fn initialize(
        &mut self,
        now: Instant,
        timeout: Duration,
    ) -> Result<(), InitError<S::Error>> {
        let outcome = with_timeout(timeout, self.sensor.initialize()).await;
        match outcome {
            Ok(Ok(())) => {
                self.restart(now);
                Ok(())
            }
            Ok(Err(e)) => Err(InitError::Device(e)),
            Err(_) => Err(InitError::Timeout),
        }
    }

    /// Mark the link Ready with its reference and last-sample instants at
    /// `now`.
    pub fn restart(&mut self, now: Instant) {
        self.state = LinkState::Ready;
        self.reference = now;
        self.last_sample = now;
        self.attempt = None;
    }

    /// Open a reinitialization attempt at `now`.
    pub fn begin_recovery(&mut self, now: Instant) {
        self.attempt = Some(now);
        self.sensor.begin_recovery();
    }

    /// Whether a reinitialization attempt is in progress.
    pub fn recovering(&self) -> bool {
        self.attempt.is_some()
    }

    /// Run one step of the open attempt, bounded by `step_timeout`. The
    /// attempt fails once `budget` has passed since it began. Success
    /// restarts the link at `now`; any outcome but `Pending` closes the
    /// attempt.
    pub async fn recover_step(
        &mut self,
        now: Instant,
        step_timeout: Duration,
        budget: Duration,
    ) -> Result<Recovery, InitError<S::Error>> {
        let started = *self.attempt.get_or_insert(now);
        let outcome = with_timeout(step_timeout, self.sensor.recover(now)).await;
        let result = match outcome {
            Ok(Ok(Recovery::Done)) => {
                self.restart(now);
                return Ok(Recovery::Done);
            }
            Ok(Ok(Recovery::Pending)) => {
                let spent = now
                    .checked_duration_since(started)
                    .unwrap_or(Duration::from_ticks(0));
                if spent < budget {
                    return Ok(Recovery::Pending);
                }
                Err(InitError::Timeout)
            }
            Ok(Err(e)) => Err(InitError::Device(e)),
            Err(_) => Err(InitError::Timeout),
        };
        self.attempt = None;
        result
    }

    pub async fn poll(&mut self, timeout: Duration) -> Polled {
        match with_timeout(timeout, self.sensor.poll()).await {
            Ok(Ok(Some(reading))) => Polled::Sample(reading),
            Ok(Ok(None)) => Polled::NoData,
            Ok(Err(e)) => {
                trace!("link {}: poll failed: {:?}", self.index, Dbg(&e));
                Polled::NoData
            }
            Err(_) => {
                trace!("link {}: poll timed out", self.index);
                Polled::NoData
            }
        }
    }

    /// Note a sample taken at `now` and return its timestamp relative to the
    /// link's reference instant.
    pub fn record_sample(&mut self, now: Instant) -> Duration {
        self.last_sample = now;
        now.checked_duration_since(self.reference)
            .unwrap_or(Duration::from_ticks(0))
    }

    /// Time since the last sample; zero if the clock reads earlier than it.
    pub fn silence(&self, now: Instant) -> Duration {
        now.checked_duration_since(self.last_sample)
            .unwrap_or(Duration::from_ticks(0))
    }

    /// Move to Failed and arm the policy so the first recovery attempt is
    /// allowed immediately.
    pub fn mark_failed(&mut self) {
        self.state = LinkState::Failed;
        self.attempt = None;
        self.policy.arm();
    }

    pub fn sample_period(&self) -> Option<Duration> {
        self.sensor.sample_period()
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn reference(&self) -> Instant {
        self.reference
    }

    pub fn last_sample(&self) -> Instant {
        self.last_sample
    }

    pub fn policy(&self) -> &ReinitPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut ReinitPolicy {
        &mut self.policy
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}
