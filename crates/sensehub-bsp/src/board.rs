use embassy_nrf::interrupt::Priority;
use embassy_nrf::peripherals::{self, WDT};
use embassy_nrf::Peri;

#[cfg(feature = "usb")]
use crate::usb;

/// The shared sensor bus.
pub struct Twim0BusResources {
    pub twim: Peri<'static, peripherals::TWISPI0>,
    pub sda: Peri<'static, peripherals::P0_26>,
    pub scl: Peri<'static, peripherals::P0_27>,
}

/// XSHUT lines of the two time-of-flight sensors, in enable order.
pub struct TofResources {
    pub xshut0: Peri<'static, peripherals::P0_17>,
    pub xshut1: Peri<'static, peripherals::P0_24>,
}

pub struct ImuResources {
    /// Active-low reset of the sensor hub.
    pub reset: Peri<'static, peripherals::P0_25>,
}

pub struct StatusLedResources {
    pub pwm: Peri<'static, peripherals::PWM0>,
    pub pin: Peri<'static, peripherals::P1_11>,
}

/// Represents all the peripherals and pins available on the board.
pub struct SenseHub {
    /// Peripherals for the sensor I2C bus.
    pub twim0_bus_resources: Twim0BusResources,
    /// Enable lines for the ToF sensors.
    pub tof_resources: TofResources,
    /// Control lines for the IMU.
    pub imu_resources: ImuResources,
    /// Status pixel.
    pub status_led_resources: StatusLedResources,
    /// Watchdog Timer.
    pub wdt: Peri<'static, WDT>,
    #[cfg(feature = "usb")]
    /// USB device peripheral
    pub usb: usb::UsbDriverBuilder,
}

impl Default for SenseHub {
    fn default() -> Self {
        let mut config = embassy_nrf::config::Config::default();
        config.gpiote_interrupt_priority = Priority::P2;
        config.time_interrupt_priority = Priority::P2;
        Self::new(config)
    }
}

impl SenseHub {
    /// Create a new instance based on HAL configuration
    pub fn new(config: embassy_nrf::config::Config) -> Self {
        let p = embassy_nrf::init(config);

        Self {
            twim0_bus_resources: Twim0BusResources {
                twim: p.TWISPI0,
                sda: p.P0_26,
                scl: p.P0_27,
            },
            tof_resources: TofResources { xshut0: p.P0_17, xshut1: p.P0_24 },
            imu_resources: ImuResources { reset: p.P0_25 },
            status_led_resources: StatusLedResources {
                pwm: p.PWM0,
                pin: p.P1_11,
            },
            wdt: p.WDT,
            #[cfg(feature = "usb")]
            usb: usb::UsbDriverBuilder::new(p.USBD),
        }
    }
}
