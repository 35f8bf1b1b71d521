#![no_std]

// Must go first so every module sees the logging macros.
#[macro_use]
mod fmt;

pub mod sensors;
pub mod sink;
pub mod tasks;

use bno08x::ReportId;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_sync::signal::Signal;
use sensehub_bsp::TOF_COUNT;
use sensehub_core::OutputFormat;
use vl53l1x::{DistanceMode, RangingConfig};

pub const FW_VERSION: &str = env!("FW_VERSION");

/// Addresses the ToF sensors are moved to, in enable order.
pub const TOF_ADDRESSES: [u8; TOF_COUNT] = [0x30, 0x31];

pub const TOF_RANGING: RangingConfig = RangingConfig {
    mode: DistanceMode::Long,
    timing_budget_ms: 50,
    inter_measurement_ms: 50,
};

pub const IMU_REPORT: ReportId = ReportId::LinearAcceleration;
pub const IMU_INTERVAL_US: u32 = 10_000;

pub const OUTPUT_FORMAT: OutputFormat = OutputFormat::Text;

/// Every ToF sensor plus the IMU.
pub const MAX_LINKS: usize = TOF_COUNT + 1;

/// Bytes buffered between the acquisition loop and the USB port; roughly
/// twenty ticks of text output at full rate.
pub const OUTPUT_CAPACITY: usize = 2048;

pub type OutputPipe = Pipe<CriticalSectionRawMutex, OUTPUT_CAPACITY>;

/// Encoded samples waiting for the USB port.
pub static OUTPUT: OutputPipe = Pipe::new();

/// Raised once the host opens the serial port.
pub static HOST_CONNECTED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

pub mod prelude {
    pub use super::{
        error, info, sensors::*, sink::*, tasks::*, unwrap, warn, FW_VERSION,
        HOST_CONNECTED, IMU_INTERVAL_US, IMU_REPORT, MAX_LINKS, OUTPUT,
        OUTPUT_FORMAT, TOF_ADDRESSES, TOF_RANGING,
    };
    pub use embassy_executor::Spawner;
    pub use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    pub use embassy_time::{Duration, Instant, Timer};

    pub use sensehub_bsp::{SenseHub, SharedBus};
    pub use sensehub_core::{
        bounded_wait, AcquisitionConfig, AcquisitionLoop, DeviceLink,
        StatusIndicator, StatusPhase, StatusSignal,
    };
}
