//! Async driver for the ST VL53L1X time-of-flight ranging sensor.
//!
//! Every VL53L1X powers up at [`DEFAULT_ADDRESS`]. To run several on one bus,
//! hold all but one in reset through XSHUT, move the awake one with
//! [`Vl53l1x::set_address`], then release the next.
#![cfg_attr(not(test), no_std)]

mod fmt; // must be first

pub mod registers;

use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use registers::*;

pub const DEFAULT_ADDRESS: u8 = 0x29;
pub const MODEL_ID: u16 = 0xEACC;

const BOOT_POLL_MS: u32 = 2;
const BOOT_ATTEMPTS: u16 = 50;
const DATA_READY_ATTEMPTS: u16 = 1000;

#[derive(derive_more::From, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<I2cError> {
    I2c(I2cError),
    #[from(skip)]
    InvalidModelId(u16),
    #[from(skip)]
    InvalidAddress(u8),
    /// Timing budget not available in the current distance mode.
    #[from(skip)]
    UnsupportedTimingBudget(u16),
    BootTimeout,
    DataReadyTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DistanceMode {
    /// Up to ~1.3 m, better ambient immunity.
    Short,
    /// Up to ~4 m in the dark.
    #[default]
    Long,
}

/// Ranging settings applied after init: mode, timing budget in milliseconds
/// and inter-measurement period in milliseconds. The period must be at least
/// as long as the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RangingConfig {
    pub mode: DistanceMode,
    pub timing_budget_ms: u16,
    pub inter_measurement_ms: u32,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            mode: DistanceMode::Long,
            timing_budget_ms: 50,
            inter_measurement_ms: 50,
        }
    }
}

/// One ranging result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    pub distance_mm: u16,
    /// Reduced range status; 0 means the distance is trustworthy.
    pub status: u8,
}

impl Measurement {
    pub fn is_valid(&self) -> bool {
        self.status == 0
    }
}

/// Reduce the raw `RESULT__RANGE_STATUS` register to the documented status
/// code.
pub fn range_status(raw: u8) -> u8 {
    RANGE_STATUS_MAP
        .get(usize::from(raw & 0x1F))
        .copied()
        .unwrap_or(255)
}

/// Timeout macro register values `(A, B)` for a budget, if the mode supports it.
fn timing_budget_registers(
    mode: DistanceMode,
    budget_ms: u16,
) -> Option<(u16, u16)> {
    match (mode, budget_ms) {
        (DistanceMode::Short, 15) => Some((0x001D, 0x0027)),
        (DistanceMode::Short, 20) => Some((0x0051, 0x006E)),
        (DistanceMode::Short, 33) => Some((0x00D6, 0x006E)),
        (DistanceMode::Short, 50) => Some((0x01AE, 0x01E8)),
        (DistanceMode::Short, 100) => Some((0x02E1, 0x0388)),
        (DistanceMode::Short, 200) => Some((0x03E1, 0x0496)),
        (DistanceMode::Short, 500) => Some((0x0591, 0x05C1)),
        (DistanceMode::Long, 20) => Some((0x001E, 0x0022)),
        (DistanceMode::Long, 33) => Some((0x0060, 0x006E)),
        (DistanceMode::Long, 50) => Some((0x00AD, 0x00C6)),
        (DistanceMode::Long, 100) => Some((0x01CC, 0x01EA)),
        (DistanceMode::Long, 200) => Some((0x02D9, 0x02F8)),
        (DistanceMode::Long, 500) => Some((0x048F, 0x04A4)),
        _ => None,
    }
}

pub struct Vl53l1x<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    mode: DistanceMode,
}

impl<I2C, E, D> Vl53l1x<I2C, D>
where
    I2C: I2c<Error = E>,
    D: DelayNs,
{
    /// Driver talking to a device at [`DEFAULT_ADDRESS`].
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    /// Driver talking to a device that was already moved to `address`.
    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self { i2c, delay, address, mode: DistanceMode::Long }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn distance_mode(&self) -> DistanceMode {
        self.mode
    }

    /// Point the driver at a different address without touching the device,
    /// e.g. after the device was power-cycled back to its default.
    pub fn retarget(&mut self, address: u8) {
        self.address = address;
    }

    pub async fn model_id(&mut self) -> Result<u16, Error<E>> {
        self.read_word(IDENTIFICATION_MODEL_ID).await
    }

    /// Single boot check. A device that NACKs is still booting.
    pub async fn booted(&mut self) -> bool {
        matches!(self.read_byte(FIRMWARE_SYSTEM_STATUS).await, Ok(s) if s != 0)
    }

    /// Wait until the firmware reports it has booted.
    pub async fn wait_boot(&mut self) -> Result<(), Error<E>> {
        for _ in 0..BOOT_ATTEMPTS {
            if self.booted().await {
                return Ok(());
            }
            self.delay.delay_ms(BOOT_POLL_MS).await;
        }
        Err(Error::BootTimeout)
    }

    /// Boot check, identity check, default register image and the one-off VHV
    /// calibration. Ranging is stopped afterwards.
    pub async fn init(&mut self) -> Result<(), Error<E>> {
        self.wait_boot().await?;
        self.load_configuration().await?;

        let mut ready = false;
        for _ in 0..DATA_READY_ATTEMPTS {
            if self.data_ready().await? {
                ready = true;
                break;
            }
            self.delay.delay_ms(1).await;
        }
        if !ready {
            return Err(Error::DataReadyTimeout);
        }
        self.finish_calibration().await
    }

    /// Identity check and default register image on a booted device, then
    /// the first ranging that runs the VHV calibration. Wait for
    /// [`data_ready`](Self::data_ready) before
    /// [`finish_calibration`](Self::finish_calibration).
    pub async fn load_configuration(&mut self) -> Result<(), Error<E>> {
        let id = self.model_id().await?;
        if id != MODEL_ID {
            return Err(Error::InvalidModelId(id));
        }

        let mut image = [0u8; 2 + DEFAULT_CONFIGURATION.len()];
        image[..2].copy_from_slice(&DEFAULT_CONFIGURATION_START.to_be_bytes());
        image[2..].copy_from_slice(&DEFAULT_CONFIGURATION);
        self.i2c.write(self.address, &image).await?;
        self.mode = DistanceMode::Long;

        self.start_ranging().await
    }

    /// Stop the calibration ranging and keep its VHV result.
    pub async fn finish_calibration(&mut self) -> Result<(), Error<E>> {
        self.clear_interrupt().await?;
        self.stop_ranging().await?;

        // Two bounds for VHV; start VHV from the previous temperature.
        self.write_byte(VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND, 0x09)
            .await?;
        self.write_byte(VHV_CONFIG_INIT, 0x00).await?;
        debug!("vl53l1x@{:#x}: init done", self.address);
        Ok(())
    }

    /// Move the device to a new 7-bit address. The driver follows it.
    pub async fn set_address(&mut self, address: u8) -> Result<(), Error<E>> {
        if address > 0x7F {
            return Err(Error::InvalidAddress(address));
        }
        self.write_byte(I2C_SLAVE_DEVICE_ADDRESS, address).await?;
        self.address = address;
        Ok(())
    }

    /// Reboot the device firmware. Registers return to their reset values.
    pub async fn soft_reset(&mut self) -> Result<(), Error<E>> {
        self.write_byte(SOFT_RESET, 0x00).await?;
        self.delay.delay_us(100).await;
        self.write_byte(SOFT_RESET, 0x01).await?;
        self.mode = DistanceMode::Long;
        Ok(())
    }

    pub async fn set_distance_mode(
        &mut self,
        mode: DistanceMode,
    ) -> Result<(), Error<E>> {
        let (phasecal, vcsel_a, vcsel_b, phase_high, woi, initial_phase) =
            match mode {
                DistanceMode::Short => (0x14, 0x07, 0x05, 0x38, 0x0705, 0x0606),
                DistanceMode::Long => (0x0A, 0x0F, 0x0D, 0xB8, 0x0F0D, 0x0E0E),
            };
        self.write_byte(PHASECAL_CONFIG_TIMEOUT_MACROP, phasecal)
            .await?;
        self.write_byte(RANGE_CONFIG_VCSEL_PERIOD_A, vcsel_a).await?;
        self.write_byte(RANGE_CONFIG_VCSEL_PERIOD_B, vcsel_b).await?;
        self.write_byte(RANGE_CONFIG_VALID_PHASE_HIGH, phase_high)
            .await?;
        self.write_word(SD_CONFIG_WOI_SD0, woi).await?;
        self.write_word(SD_CONFIG_INITIAL_PHASE_SD0, initial_phase)
            .await?;
        self.mode = mode;
        Ok(())
    }

    /// Supported budgets: 15 (short mode only), 20, 33, 50, 100, 200, 500 ms.
    pub async fn set_timing_budget(
        &mut self,
        budget_ms: u16,
    ) -> Result<(), Error<E>> {
        let (a, b) = timing_budget_registers(self.mode, budget_ms)
            .ok_or(Error::UnsupportedTimingBudget(budget_ms))?;
        self.write_word(RANGE_CONFIG_TIMEOUT_MACROP_A, a).await?;
        self.write_word(RANGE_CONFIG_TIMEOUT_MACROP_B, b).await
    }

    /// Period between two measurements in continuous ranging, scaled by the
    /// device's oscillator calibration.
    pub async fn set_inter_measurement(
        &mut self,
        period_ms: u32,
    ) -> Result<(), Error<E>> {
        let clock_pll = u64::from(
            self.read_word(RESULT_OSC_CALIBRATE_VAL).await? & 0x03FF,
        );
        let period = clock_pll * u64::from(period_ms) * 1075 / 1000;
        let period = u32::try_from(period).unwrap_or(u32::MAX);
        self.write_dword(SYSTEM_INTERMEASUREMENT_PERIOD, period)
            .await
    }

    /// Apply mode, then budget, then period. The budget table depends on the mode.
    pub async fn configure(
        &mut self,
        config: &RangingConfig,
    ) -> Result<(), Error<E>> {
        self.set_distance_mode(config.mode).await?;
        self.set_timing_budget(config.timing_budget_ms).await?;
        self.set_inter_measurement(config.inter_measurement_ms)
            .await
    }

    pub async fn start_ranging(&mut self) -> Result<(), Error<E>> {
        self.write_byte(SYSTEM_MODE_START, 0x40).await
    }

    pub async fn stop_ranging(&mut self) -> Result<(), Error<E>> {
        self.write_byte(SYSTEM_MODE_START, 0x00).await
    }

    pub async fn clear_interrupt(&mut self) -> Result<(), Error<E>> {
        self.write_byte(SYSTEM_INTERRUPT_CLEAR, 0x01).await
    }

    /// Whether a new measurement is waiting, honouring the configured GPIO1
    /// polarity.
    pub async fn data_ready(&mut self) -> Result<bool, Error<E>> {
        let mux = self.read_byte(GPIO_HV_MUX_CTRL).await?;
        let active_high = mux & 0x10 == 0;
        let status = self.read_byte(GPIO_TIO_HV_STATUS).await?;
        Ok((status & 0x01 == 0x01) == active_high)
    }

    /// Read the latest result. Does not clear the interrupt.
    pub async fn measurement(&mut self) -> Result<Measurement, Error<E>> {
        let raw = self.read_byte(RESULT_RANGE_STATUS).await?;
        let distance_mm = self.read_word(RESULT_FINAL_RANGE_MM).await?;
        Ok(Measurement { distance_mm, status: range_status(raw) })
    }

    /// Non-blocking read: `None` when no new measurement is ready, otherwise
    /// the measurement with the interrupt cleared for the next one.
    pub async fn try_measurement(
        &mut self,
    ) -> Result<Option<Measurement>, Error<E>> {
        if !self.data_ready().await? {
            return Ok(None);
        }
        let measurement = self.measurement().await?;
        self.clear_interrupt().await?;
        trace!("vl53l1x@{:#x}: {:?}", self.address, measurement);
        Ok(Some(measurement))
    }

    async fn write_byte(&mut self, reg: u16, value: u8) -> Result<(), Error<E>> {
        let [hi, lo] = reg.to_be_bytes();
        self.i2c.write(self.address, &[hi, lo, value]).await?;
        Ok(())
    }

    async fn write_word(&mut self, reg: u16, value: u16) -> Result<(), Error<E>> {
        let [hi, lo] = reg.to_be_bytes();
        let [v1, v0] = value.to_be_bytes();
        self.i2c.write(self.address, &[hi, lo, v1, v0]).await?;
        Ok(())
    }

    async fn write_dword(
        &mut self,
        reg: u16,
        value: u32,
    ) -> Result<(), Error<E>> {
        let [hi, lo] = reg.to_be_bytes();
        let [v3, v2, v1, v0] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[hi, lo, v3, v2, v1, v0])
            .await?;
        Ok(())
    }

    async fn read_byte(&mut self, reg: u16) -> Result<u8, Error<E>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &reg.to_be_bytes(), &mut buf)
            .await?;
        Ok(buf[0])
    }

    async fn read_word(&mut self, reg: u16) -> Result<u16, Error<E>> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &reg.to_be_bytes(), &mut buf)
            .await?;
        Ok(u16::from_be_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

    const ADDR: u8 = DEFAULT_ADDRESS;

    fn read(reg: u16, data: &[u8]) -> Transaction {
        Transaction::write_read(ADDR, reg.to_be_bytes().to_vec(), data.to_vec())
    }

    fn write(reg: u16, data: &[u8]) -> Transaction {
        let mut bytes = reg.to_be_bytes().to_vec();
        bytes.extend_from_slice(data);
        Transaction::write(ADDR, bytes)
    }

    #[futures_test::test]
    async fn set_address_moves_following_transactions() {
        let expectations = [
            write(I2C_SLAVE_DEVICE_ADDRESS, &[0x30]),
            Transaction::write_read(
                0x30,
                IDENTIFICATION_MODEL_ID.to_be_bytes().to_vec(),
                vec![0xEA, 0xCC],
            ),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut tof = Vl53l1x::new(i2c.clone(), NoopDelay);

        tof.set_address(0x30).await.unwrap();
        assert_eq!(tof.address(), 0x30);
        assert_eq!(tof.model_id().await.unwrap(), MODEL_ID);

        i2c.done();
    }

    #[futures_test::test]
    async fn eight_bit_address_is_rejected() {
        let mut i2c = Mock::new(&[]);
        let mut tof = Vl53l1x::new(i2c.clone(), NoopDelay);

        assert_eq!(tof.set_address(0x90).await, Err(Error::InvalidAddress(0x90)));
        assert_eq!(tof.address(), DEFAULT_ADDRESS);

        i2c.done();
    }

    #[futures_test::test]
    async fn init_runs_full_sequence() {
        let mut image = DEFAULT_CONFIGURATION_START.to_be_bytes().to_vec();
        image.extend_from_slice(&DEFAULT_CONFIGURATION);
        let expectations = [
            read(FIRMWARE_SYSTEM_STATUS, &[0x00]),
            read(FIRMWARE_SYSTEM_STATUS, &[0x03]),
            read(IDENTIFICATION_MODEL_ID, &[0xEA, 0xCC]),
            Transaction::write(ADDR, image),
            write(SYSTEM_MODE_START, &[0x40]),
            // Not ready on the first look, ready on the second.
            read(GPIO_HV_MUX_CTRL, &[0x01]),
            read(GPIO_TIO_HV_STATUS, &[0x02]),
            read(GPIO_HV_MUX_CTRL, &[0x01]),
            read(GPIO_TIO_HV_STATUS, &[0x03]),
            write(SYSTEM_INTERRUPT_CLEAR, &[0x01]),
            write(SYSTEM_MODE_START, &[0x00]),
            write(VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND, &[0x09]),
            write(VHV_CONFIG_INIT, &[0x00]),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut tof = Vl53l1x::new(i2c.clone(), NoopDelay);

        tof.init().await.unwrap();
        assert_eq!(tof.distance_mode(), DistanceMode::Long);

        i2c.done();
    }

    #[futures_test::test]
    async fn calibration_split_across_calls() {
        let mut image = DEFAULT_CONFIGURATION_START.to_be_bytes().to_vec();
        image.extend_from_slice(&DEFAULT_CONFIGURATION);
        let expectations = [
            read(FIRMWARE_SYSTEM_STATUS, &[0x00]),
            read(FIRMWARE_SYSTEM_STATUS, &[0x01]),
            read(IDENTIFICATION_MODEL_ID, &[0xEA, 0xCC]),
            Transaction::write(ADDR, image),
            write(SYSTEM_MODE_START, &[0x40]),
            read(GPIO_HV_MUX_CTRL, &[0x01]),
            read(GPIO_TIO_HV_STATUS, &[0x01]),
            write(SYSTEM_INTERRUPT_CLEAR, &[0x01]),
            write(SYSTEM_MODE_START, &[0x00]),
            write(VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND, &[0x09]),
            write(VHV_CONFIG_INIT, &[0x00]),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut tof = Vl53l1x::new(i2c.clone(), NoopDelay);

        assert!(!tof.booted().await);
        assert!(tof.booted().await);
        tof.load_configuration().await.unwrap();
        assert!(tof.data_ready().await.unwrap());
        tof.finish_calibration().await.unwrap();

        i2c.done();
    }

    #[futures_test::test]
    async fn init_rejects_foreign_device() {
        let expectations = [
            read(FIRMWARE_SYSTEM_STATUS, &[0x01]),
            read(IDENTIFICATION_MODEL_ID, &[0xEE, 0xAA]),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut tof = Vl53l1x::new(i2c.clone(), NoopDelay);

        assert_eq!(tof.init().await, Err(Error::InvalidModelId(0xEEAA)));

        i2c.done();
    }

    #[futures_test::test]
    async fn data_ready_follows_polarity() {
        let expectations = [
            // Active low: GPIO bit cleared means ready.
            read(GPIO_HV_MUX_CTRL, &[0x11]),
            read(GPIO_TIO_HV_STATUS, &[0x00]),
            read(GPIO_HV_MUX_CTRL, &[0x11]),
            read(GPIO_TIO_HV_STATUS, &[0x01]),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut tof = Vl53l1x::new(i2c.clone(), NoopDelay);

        assert!(tof.data_ready().await.unwrap());
        assert!(!tof.data_ready().await.unwrap());

        i2c.done();
    }

    #[futures_test::test]
    async fn try_measurement_reads_and_clears() {
        let expectations = [
            read(GPIO_HV_MUX_CTRL, &[0x01]),
            read(GPIO_TIO_HV_STATUS, &[0x00]),
            read(GPIO_HV_MUX_CTRL, &[0x01]),
            read(GPIO_TIO_HV_STATUS, &[0x01]),
            read(RESULT_RANGE_STATUS, &[0x09]),
            read(RESULT_FINAL_RANGE_MM, &[0x01, 0x9C]),
            write(SYSTEM_INTERRUPT_CLEAR, &[0x01]),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut tof = Vl53l1x::new(i2c.clone(), NoopDelay);

        assert_eq!(tof.try_measurement().await.unwrap(), None);
        let m = tof.try_measurement().await.unwrap().unwrap();
        assert_eq!(m.distance_mm, 412);
        assert!(m.is_valid());

        i2c.done();
    }

    #[test]
    fn range_status_mapping() {
        assert_eq!(range_status(0x09), 0);
        assert_eq!(range_status(0x04), 2);
        assert_eq!(range_status(0xE9), 0);
        assert_eq!(range_status(0x1F), 255);
    }

    #[futures_test::test]
    async fn configure_applies_mode_budget_and_period() {
        let expectations = [
            write(PHASECAL_CONFIG_TIMEOUT_MACROP, &[0x14]),
            write(RANGE_CONFIG_VCSEL_PERIOD_A, &[0x07]),
            write(RANGE_CONFIG_VCSEL_PERIOD_B, &[0x05]),
            write(RANGE_CONFIG_VALID_PHASE_HIGH, &[0x38]),
            write(SD_CONFIG_WOI_SD0, &[0x07, 0x05]),
            write(SD_CONFIG_INITIAL_PHASE_SD0, &[0x06, 0x06]),
            write(RANGE_CONFIG_TIMEOUT_MACROP_A, &[0x00, 0x1D]),
            write(RANGE_CONFIG_TIMEOUT_MACROP_B, &[0x00, 0x27]),
            read(RESULT_OSC_CALIBRATE_VAL, &[0xFC, 0x64]),
            // (0x064 * 100 * 1.075) = 10750
            write(SYSTEM_INTERMEASUREMENT_PERIOD, &10_750u32.to_be_bytes()),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut tof = Vl53l1x::new(i2c.clone(), NoopDelay);

        tof.configure(&RangingConfig {
            mode: DistanceMode::Short,
            timing_budget_ms: 15,
            inter_measurement_ms: 100,
        })
        .await
        .unwrap();
        assert_eq!(tof.distance_mode(), DistanceMode::Short);

        i2c.done();
    }

    #[futures_test::test]
    async fn long_mode_has_no_15ms_budget() {
        let mut i2c = Mock::new(&[]);
        let mut tof = Vl53l1x::new(i2c.clone(), NoopDelay);

        assert_eq!(
            tof.set_timing_budget(15).await,
            Err(Error::UnsupportedTimingBudget(15))
        );

        i2c.done();
    }
}
