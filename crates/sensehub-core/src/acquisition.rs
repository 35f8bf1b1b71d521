//! The fixed-cadence acquisition loop.
//!
//! Each tick first polls every Ready link once, forwards fresh samples to the
//! sink and declares links Failed after a period of silence. Only then are
//! Failed links handed to their [`ReinitPolicy`](crate::policy::ReinitPolicy),
//! and an attempt advances by one bounded step per tick, so one link's fault
//! never delays the others' samples.

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::config::AcquisitionConfig;
use crate::error::StartupError;
use crate::fmt::Dbg;
use crate::link::{DeviceLink, LinkState, Polled, Recovery, SensorLink};
use crate::sample::Sample;
use crate::sink::SampleSink;
use crate::status::{StatusPhase, StatusSignal};

/// Deadlines on the grid `origin + k * period`, k >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickSchedule {
    origin: Instant,
    period: Duration,
    index: u64,
}

impl TickSchedule {
    pub fn new(origin: Instant, period: Duration) -> Self {
        let period = Duration::from_ticks(period.as_ticks().max(1));
        Self { origin, period, index: 1 }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// When the next tick is due.
    pub fn deadline(&self) -> Instant {
        self.origin + Duration::from_ticks(self.period.as_ticks() * self.index)
    }

    /// Move to the first grid point strictly after `now`. Returns how many
    /// grid points were skipped because the tick ran late.
    pub fn advance(&mut self, now: Instant) -> u64 {
        let elapsed = now
            .checked_duration_since(self.origin)
            .unwrap_or(Duration::from_ticks(0))
            .as_ticks();
        let next = (elapsed / self.period.as_ticks() + 1).max(self.index + 1);
        let skipped = next - self.index - 1;
        self.index = next;
        skipped
    }
}

/// Timing state of a running loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopContext {
    pub started: Instant,
    pub schedule: TickSchedule,
    pub phase: StatusPhase,
    pub ticks: u64,
    pub skipped: u64,
}

impl LoopContext {
    pub fn new(started: Instant, period: Duration) -> Self {
        Self {
            started,
            schedule: TickSchedule::new(started, period),
            phase: StatusPhase::Initializing,
            ticks: 0,
            skipped: 0,
        }
    }

    pub fn uptime(&self, now: Instant) -> Duration {
        now.checked_duration_since(self.started)
            .unwrap_or(Duration::from_ticks(0))
    }
}

pub struct AcquisitionLoop<S, K, T, const N: usize> {
    links: Vec<DeviceLink<S>, N>,
    sink: K,
    status: T,
    config: AcquisitionConfig,
    context: LoopContext,
}

impl<S, K, T, const N: usize> AcquisitionLoop<S, K, T, N>
where
    S: SensorLink,
    K: SampleSink,
    T: StatusSignal,
{
    pub fn new(
        links: Vec<DeviceLink<S>, N>,
        sink: K,
        status: T,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            links,
            sink,
            status,
            config,
            context: LoopContext::new(
                Instant::from_ticks(0),
                config.tick_period,
            ),
        }
    }

    /// Initialize every link that is not yet Ready and begin outputting.
    /// Every link's reference instant is `now` afterwards.
    ///
    /// A link that cannot be brought up here is fatal: the phase goes to
    /// Error and the index of the offending link is returned.
    pub async fn start(&mut self, now: Instant) -> Result<(), StartupError> {
        self.set_phase(StatusPhase::Initializing).await;

        for (index, link) in self.links.iter_mut().enumerate() {
            if link.state() == LinkState::Ready {
                link.restart(now);
                continue;
            }
            if let Err(e) = link.initialize(now, self.config.init_timeout).await
            {
                error!("link {}: startup failed: {:?}", link.index(), Dbg(&e));
                self.context.phase = StatusPhase::Error;
                self.status.show(StatusPhase::Error).await;
                return Err(StartupError { index });
            }
            info!("link {}: ready at {:#x}", link.index(), link.address());
        }

        self.context = LoopContext::new(now, self.config.tick_period);
        self.set_phase(StatusPhase::Outputting).await;
        Ok(())
    }

    /// Run one tick at `now`, then schedule the next one.
    pub async fn tick(&mut self, now: Instant) {
        for link in self.links.iter_mut() {
            if link.state() == LinkState::Ready {
                sample_link(link, now, &self.config, &mut self.sink).await;
            }
        }
        for link in self.links.iter_mut() {
            if link.state() == LinkState::Failed {
                recover_link(link, now, &self.config).await;
            }
        }

        let phase = if self.any_failed() {
            StatusPhase::Error
        } else {
            StatusPhase::Outputting
        };
        self.set_phase(phase).await;

        self.context.ticks += 1;
        let skipped = self.context.schedule.advance(now);
        if skipped > 0 {
            debug!("loop: tick ran late, skipped {}", skipped);
            self.context.skipped += skipped;
        }
    }

    /// When [`tick`](Self::tick) should next be called.
    pub fn next_deadline(&self) -> Instant {
        self.context.schedule.deadline()
    }

    pub fn any_failed(&self) -> bool {
        self.links.iter().any(|l| l.state() == LinkState::Failed)
    }

    pub fn context(&self) -> &LoopContext {
        &self.context
    }

    pub fn phase(&self) -> StatusPhase {
        self.context.phase
    }

    pub fn links(&self) -> &[DeviceLink<S>] {
        &self.links
    }

    pub fn links_mut(&mut self) -> &mut [DeviceLink<S>] {
        &mut self.links
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    pub fn status(&self) -> &T {
        &self.status
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    async fn set_phase(&mut self, phase: StatusPhase) {
        if self.context.phase != phase {
            info!("loop: phase {:?} -> {:?}", self.context.phase, phase);
            self.context.phase = phase;
        }
        self.status.show(phase).await;
    }
}

async fn sample_link<S, K>(
    link: &mut DeviceLink<S>,
    now: Instant,
    config: &AcquisitionConfig,
    sink: &mut K,
) where
    S: SensorLink,
    K: SampleSink,
{
    match link.poll(config.poll_timeout).await {
        Polled::Sample(reading) => {
            let timestamp = link.record_sample(now);
            sink.emit(&Sample { device: link.index(), timestamp, reading });
        }
        Polled::NoData => {
            let silence = link.silence(now);
            let threshold = config.failure_threshold_for(link.sample_period());
            if silence >= threshold {
                warn!(
                    "link {}: no sample for {} ms, marking failed",
                    link.index(),
                    silence.as_millis()
                );
                link.mark_failed();
            }
        }
    }
}

async fn recover_link<S: SensorLink>(
    link: &mut DeviceLink<S>,
    now: Instant,
    config: &AcquisitionConfig,
) {
    if !link.recovering() {
        if !link.policy().permits(now) {
            return;
        }
        link.policy_mut().record_attempt(now);
        info!("link {}: reinitializing", link.index());
        link.begin_recovery(now);
    }

    match link
        .recover_step(now, config.recovery_step_timeout, config.init_timeout)
        .await
    {
        Ok(Recovery::Pending) => {}
        Ok(Recovery::Done) => info!("link {}: recovered", link.index()),
        Err(e) => warn!(
            "link {}: reinit failed: {:?}, retry in {} ms",
            link.index(),
            Dbg(&e),
            link.policy().remaining(now).as_millis()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn schedule_follows_grid() {
        let mut schedule = TickSchedule::new(at(1_000), Duration::from_millis(10));
        assert_eq!(schedule.deadline(), at(1_010));

        // Woken slightly late: the grid does not drift.
        assert_eq!(schedule.advance(at(1_013)), 0);
        assert_eq!(schedule.deadline(), at(1_020));
    }

    #[test]
    fn schedule_skips_missed_ticks() {
        let mut schedule = TickSchedule::new(at(0), Duration::from_millis(10));
        assert_eq!(schedule.advance(at(47)), 3);
        assert_eq!(schedule.deadline(), at(50));
    }

    #[test]
    fn schedule_never_moves_backwards() {
        let mut schedule = TickSchedule::new(at(100), Duration::from_millis(10));
        assert_eq!(schedule.advance(at(50)), 0);
        assert_eq!(schedule.deadline(), at(120));
    }

    #[test]
    fn schedule_exact_deadline_moves_to_next_point() {
        let mut schedule = TickSchedule::new(at(0), Duration::from_millis(10));
        schedule.advance(at(10));
        assert_eq!(schedule.deadline(), at(20));
    }
}
