//! Concrete sensors behind the acquisition loop's [`SensorLink`] seam.
//!
//! Vendor report identifiers and status codes stop here: each sensor turns
//! its driver's output into a [`Reading`].

use core::convert::Infallible;

use bno08x::{Data, ReportId, SensorEvent};
use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_nrf::gpio::Output;
use embassy_time::{with_timeout, Delay, Duration, Instant, Timer};
use heapless::Vec;
use sensehub_bsp::{BusError, Imu, SharedBus, Tof, TOF_COUNT};
use sensehub_core::{
    allocate, bring_up, Addressable, Allocated, AllocationError,
    AllocatorConfig, EnableLine, Polarity, Reading, Recovery, SampleKind,
    SensorLink, Slot,
};
use vl53l1x::RangingConfig;

pub type TofError = vl53l1x::Error<BusError>;
pub type ImuError = bno08x::Error<BusError>;
pub type TofLine = EnableLine<Output<'static>>;
pub type TofAllocationError = AllocationError<TofError, Infallible>;

/// How long XSHUT is held low when a silent ToF is power-cycled.
const TOF_POWER_OFF_MS: u64 = 5;
/// Released ToF firmware must report booted within this window.
const TOF_BOOT_MS: u64 = 100;
/// The VHV calibration ranging must finish within this window.
const TOF_CALIBRATION_MS: u64 = 200;
const IMU_RESET_PULSE_MS: u64 = 10;
const IMU_BOOT_MS: u64 = 50;
/// The first report after configuration must arrive within this window.
const IMU_FIRST_REPORT_MS: u64 = 200;
const IMU_REPORT_POLL_MS: u64 = 2;

#[derive(derive_more::From, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// The IMU took its configuration but never produced a report.
    Timeout,
    Tof(TofError),
    Imu(ImuError),
    /// Reassigning a ToF address failed on the enable line.
    Allocation,
}

/// A VL53L1X as seen by the address allocator. After power-up it answers on
/// the default address, whatever address it was moved to before.
pub struct TofDriver(pub Tof);

impl Addressable for TofDriver {
    type Error = TofError;

    fn default_address(&self) -> u8 {
        vl53l1x::DEFAULT_ADDRESS
    }

    async fn initialize(&mut self) -> Result<(), TofError> {
        self.0.retarget(vl53l1x::DEFAULT_ADDRESS);
        self.0.init().await
    }

    async fn change_address(&mut self, address: u8) -> Result<(), TofError> {
        self.0.set_address(address).await
    }
}

/// Give every ToF sensor on `lines` its own address from `addresses`.
pub async fn allocate_tofs(
    bus: &'static SharedBus,
    lines: [Output<'static>; TOF_COUNT],
    addresses: [u8; TOF_COUNT],
) -> Result<
    Vec<Allocated<TofDriver, Output<'static>>, TOF_COUNT>,
    TofAllocationError,
> {
    let mut slots: Vec<_, TOF_COUNT> = Vec::new();
    for (index, (pin, target)) in lines.into_iter().zip(addresses).enumerate()
    {
        let line = EnableLine::new(pin, Polarity::ActiveHigh)
            .map_err(|error| AllocationError::EnableLine { index, error })?;
        let device = TofDriver(Tof::new(I2cDevice::new(bus), Delay));
        // One slot per line, the capacity always fits.
        let _ = slots.push(Slot { device, line, target });
    }
    allocate(slots, &mut Delay, &AllocatorConfig::default()).await
}

/// Progress of a ToF reinitialization, one bus exchange or wait per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TofStage {
    /// Is it still answering on its own address?
    Probe,
    /// Held in reset until the instant.
    PoweredOff(Instant),
    /// Released at the default address, must boot by the instant.
    Booting(Instant),
    /// Booted at its own address, register image not loaded yet.
    Load,
    /// Calibration ranging running, must finish by the instant.
    Calibrating(Instant),
}

pub struct TofSensor {
    index: usize,
    address: u8,
    driver: TofDriver,
    line: TofLine,
    ranging: RangingConfig,
    stage: TofStage,
}

impl TofSensor {
    pub fn new(
        allocated: Allocated<TofDriver, Output<'static>>,
        ranging: RangingConfig,
    ) -> Self {
        Self {
            index: allocated.index,
            address: allocated.address,
            driver: allocated.device,
            line: allocated.line,
            ranging,
            stage: TofStage::Probe,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Power-cycle the sensor and move it back to its address. The other
    /// ToF sensors already sit on their own addresses, so this one is alone
    /// on the default address while it comes up.
    async fn reallocate(&mut self) -> Result<(), LinkError> {
        self.line.deassert().map_err(|_| LinkError::Allocation)?;
        Timer::after_millis(TOF_POWER_OFF_MS).await;

        bring_up(
            self.index,
            &mut self.driver,
            &mut self.line,
            self.address,
            &mut Delay,
            &AllocatorConfig::default(),
        )
        .await
        .map_err(|e| match e {
            AllocationError::Init { error, .. }
            | AllocationError::AddressChange { error, .. } => {
                LinkError::Tof(error)
            }
            _ => LinkError::Allocation,
        })
    }
}

impl SensorLink for TofSensor {
    type Error = LinkError;

    fn sample_period(&self) -> Option<Duration> {
        let budget = u32::from(self.ranging.timing_budget_ms);
        let period = self.ranging.inter_measurement_ms.max(budget);
        Some(Duration::from_millis(u64::from(period)))
    }

    fn begin_recovery(&mut self) {
        self.stage = TofStage::Probe;
    }

    async fn recover(&mut self, now: Instant) -> Result<Recovery, LinkError> {
        let tof = &mut self.driver.0;
        match self.stage {
            TofStage::Probe => {
                // An earlier attempt may have stopped after a power cycle.
                tof.retarget(self.address);
                if let Ok(vl53l1x::MODEL_ID) = tof.model_id().await {
                    self.stage = TofStage::Load;
                } else {
                    warn!(
                        "tof {}: silent at {:#x}, power cycling",
                        self.index, self.address
                    );
                    self.line.deassert().map_err(|_| LinkError::Allocation)?;
                    self.stage = TofStage::PoweredOff(
                        now + Duration::from_millis(TOF_POWER_OFF_MS),
                    );
                }
            }
            TofStage::PoweredOff(until) if now >= until => {
                self.line.assert().map_err(|_| LinkError::Allocation)?;
                tof.retarget(vl53l1x::DEFAULT_ADDRESS);
                self.stage =
                    TofStage::Booting(now + Duration::from_millis(TOF_BOOT_MS));
            }
            TofStage::Booting(deadline) => {
                if tof.booted().await {
                    // Alone on the default address: the others were moved.
                    self.driver.change_address(self.address).await?;
                    self.stage = TofStage::Load;
                } else if now >= deadline {
                    return Err(LinkError::Tof(vl53l1x::Error::BootTimeout));
                }
            }
            TofStage::Load => {
                tof.load_configuration().await?;
                self.stage = TofStage::Calibrating(
                    now + Duration::from_millis(TOF_CALIBRATION_MS),
                );
            }
            TofStage::Calibrating(deadline) => {
                if tof.data_ready().await? {
                    tof.finish_calibration().await?;
                    tof.configure(&self.ranging).await?;
                    tof.start_ranging().await?;
                    return Ok(Recovery::Done);
                }
                if now >= deadline {
                    return Err(LinkError::Tof(vl53l1x::Error::DataReadyTimeout));
                }
            }
            TofStage::PoweredOff(_) => {}
        }
        Ok(Recovery::Pending)
    }

    async fn initialize(&mut self) -> Result<(), LinkError> {
        match self.driver.0.model_id().await {
            Ok(vl53l1x::MODEL_ID) => self.driver.0.init().await?,
            _ => {
                warn!(
                    "tof {}: silent at {:#x}, power cycling",
                    self.index, self.address
                );
                self.reallocate().await?;
            }
        }
        self.driver.0.configure(&self.ranging).await?;
        self.driver.0.start_ranging().await?;
        Ok(())
    }

    async fn poll(&mut self) -> Result<Option<Reading>, LinkError> {
        let measurement = self.driver.0.try_measurement().await?;
        Ok(measurement.map(|m| Reading::distance(m.distance_mm, m.is_valid())))
    }
}

/// Progress of an IMU reinitialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImuStage {
    Start,
    /// Reset line held low until the instant.
    Reset(Instant),
    /// Released, booting until the instant.
    Booting(Instant),
    /// Report enabled, the first one is due by the instant.
    FirstReport(Instant),
}

pub struct ImuSensor {
    driver: Imu,
    reset: Output<'static>,
    report: ReportId,
    interval_us: u32,
    stage: ImuStage,
}

impl ImuSensor {
    /// `reset` is the hub's active-low reset line, released.
    pub fn new(
        bus: &'static SharedBus,
        reset: Output<'static>,
        report: ReportId,
        interval_us: u32,
    ) -> Self {
        Self {
            driver: Imu::new(I2cDevice::new(bus), Delay),
            reset,
            report,
            interval_us,
            stage: ImuStage::Start,
        }
    }

    pub fn address(&self) -> u8 {
        self.driver.address()
    }

    async fn first_report(&mut self) -> Result<(), LinkError> {
        loop {
            if let Some(event) = self.driver.read_event().await? {
                if event.report == self.report {
                    return Ok(());
                }
            }
            Timer::after_millis(IMU_REPORT_POLL_MS).await;
        }
    }
}

impl SensorLink for ImuSensor {
    type Error = LinkError;

    fn sample_period(&self) -> Option<Duration> {
        Some(Duration::from_micros(u64::from(self.interval_us)))
    }

    fn begin_recovery(&mut self) {
        self.stage = ImuStage::Start;
    }

    async fn recover(&mut self, now: Instant) -> Result<Recovery, LinkError> {
        match self.stage {
            ImuStage::Start => {
                self.reset.set_low();
                self.stage = ImuStage::Reset(
                    now + Duration::from_millis(IMU_RESET_PULSE_MS),
                );
            }
            ImuStage::Reset(until) if now >= until => {
                self.reset.set_high();
                self.driver.forget_sequence();
                self.stage =
                    ImuStage::Booting(now + Duration::from_millis(IMU_BOOT_MS));
            }
            ImuStage::Booting(until) if now >= until => {
                self.driver.identify().await?;
                self.driver.enable_report(self.report, self.interval_us).await?;
                self.stage = ImuStage::FirstReport(
                    now + Duration::from_millis(IMU_FIRST_REPORT_MS),
                );
            }
            ImuStage::FirstReport(deadline) => {
                let event = self.driver.read_event().await?;
                if event.is_some_and(|e| e.report == self.report) {
                    return Ok(Recovery::Done);
                }
                if now >= deadline {
                    return Err(LinkError::Timeout);
                }
            }
            ImuStage::Reset(_) | ImuStage::Booting(_) => {}
        }
        Ok(Recovery::Pending)
    }

    async fn initialize(&mut self) -> Result<(), LinkError> {
        // A wedged hub ignores the soft reset, so pulse the line first.
        self.reset.set_low();
        Timer::after_millis(IMU_RESET_PULSE_MS).await;
        self.reset.set_high();
        Timer::after_millis(IMU_BOOT_MS).await;

        self.driver.init().await?;
        self.driver.enable_report(self.report, self.interval_us).await?;

        with_timeout(
            Duration::from_millis(IMU_FIRST_REPORT_MS),
            self.first_report(),
        )
        .await
        .map_err(|_| LinkError::Timeout)?
    }

    async fn poll(&mut self) -> Result<Option<Reading>, LinkError> {
        Ok(self.driver.read_event().await?.as_ref().and_then(reading))
    }
}

/// Translate a hub report into the loop's vocabulary.
fn reading(event: &SensorEvent) -> Option<Reading> {
    match (event.report, event.data) {
        (_, Data::Quaternion(q)) => Some(Reading::orientation(q)),
        (ReportId::Accelerometer, Data::Vector(v)) => {
            Some(Reading::vector(SampleKind::Acceleration, v))
        }
        (ReportId::LinearAcceleration, Data::Vector(v)) => {
            Some(Reading::vector(SampleKind::LinearAcceleration, v))
        }
        (ReportId::Gyroscope, Data::Vector(v)) => {
            Some(Reading::vector(SampleKind::AngularRate, v))
        }
        _ => None,
    }
}

/// Every sensor the firmware can wire into the loop.
pub enum Sensor {
    Tof(TofSensor),
    Imu(ImuSensor),
}

impl SensorLink for Sensor {
    type Error = LinkError;

    async fn initialize(&mut self) -> Result<(), LinkError> {
        match self {
            Sensor::Tof(tof) => tof.initialize().await,
            Sensor::Imu(imu) => imu.initialize().await,
        }
    }

    async fn poll(&mut self) -> Result<Option<Reading>, LinkError> {
        match self {
            Sensor::Tof(tof) => tof.poll().await,
            Sensor::Imu(imu) => imu.poll().await,
        }
    }

    fn sample_period(&self) -> Option<Duration> {
        match self {
            Sensor::Tof(tof) => tof.sample_period(),
            Sensor::Imu(imu) => imu.sample_period(),
        }
    }

    fn begin_recovery(&mut self) {
        match self {
            Sensor::Tof(tof) => tof.begin_recovery(),
            Sensor::Imu(imu) => imu.begin_recovery(),
        }
    }

    async fn recover(&mut self, now: Instant) -> Result<Recovery, LinkError> {
        match self {
            Sensor::Tof(tof) => tof.recover(now).await,
            Sensor::Imu(imu) => imu.recover(now).await,
        }
    }
}
