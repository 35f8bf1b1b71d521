use crate::board::{
    ImuResources, StatusLedResources, TofResources, Twim0BusResources,
};
use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_embedded_hal::shared_bus::I2cDeviceError;
use embassy_nrf::{
    bind_interrupts,
    gpio::{Level, Output, OutputDrive},
    interrupt::{self, InterruptExt},
    peripherals, pwm, twim,
};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Delay;
use static_cell::ConstStaticCell;
use ws2812_nrf_pwm::Ws2812;

pub type BusMutex = CriticalSectionRawMutex;

/// The sensor bus, shared by every device on it.
pub type SharedBus = Mutex<BusMutex, twim::Twim<'static>>;

/// One device's handle on the shared bus.
pub type BusDevice = I2cDevice<'static, BusMutex, twim::Twim<'static>>;

/// Error seen by a driver on the shared bus.
pub type BusError = I2cDeviceError<twim::Error>;

pub type Tof = vl53l1x::Vl53l1x<BusDevice, Delay>;

pub type Imu = bno08x::Bno08x<BusDevice, Delay>;

pub const STATUS_LED_WORDS: usize = ws2812_nrf_pwm::words_for(1);

pub type StatusLed = Ws2812<'static, peripherals::PWM0, STATUS_LED_WORDS>;

/// Number of time-of-flight sensors fitted.
pub const TOF_COUNT: usize = 2;

bind_interrupts!(struct TwimIrqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

impl Twim0BusResources {
    pub fn into_bus(self) -> SharedBus {
        let mut config = twim::Config::default();
        config.frequency = twim::Frequency::K400;
        interrupt::TWISPI0.set_priority(interrupt::Priority::P3);
        // Large enough for the ToF configuration burst when it sits in flash.
        static RAM_BUFFER: ConstStaticCell<[u8; 128]> =
            ConstStaticCell::new([0; 128]);

        Mutex::new(twim::Twim::new(
            self.twim,
            TwimIrqs,
            self.sda,
            self.scl,
            config,
            RAM_BUFFER.take(),
        ))
    }
}

impl TofResources {
    /// XSHUT outputs in enable order, every sensor held off.
    pub fn into_lines(self) -> [Output<'static>; TOF_COUNT] {
        [
            Output::new(self.xshut0, Level::Low, OutputDrive::Standard),
            Output::new(self.xshut1, Level::Low, OutputDrive::Standard),
        ]
    }
}

impl ImuResources {
    /// Release the hub from reset. The returned pin must be kept alive.
    pub fn release(self) -> Output<'static> {
        Output::new(self.reset, Level::High, OutputDrive::Standard)
    }
}

impl StatusLedResources {
    pub fn configure(self) -> Result<StatusLed, pwm::Error> {
        Ws2812::new(self.pwm, self.pin)
    }
}
