use embassy_nrf::wdt::WatchdogHandle;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Instant, Timer};
use sensehub_bsp::StatusLed;
use sensehub_core::{AcquisitionLoop, StatusIndicator};

use crate::sensors::Sensor;
use crate::sink::PipeSink;
use crate::{OutputPipe, MAX_LINKS, OUTPUT_CAPACITY, OUTPUT_FORMAT};

/// Ticks between periodic statistics in the log.
const STATS_INTERVAL_TICKS: u64 = 1_000;

pub type AppSink =
    PipeSink<'static, CriticalSectionRawMutex, OUTPUT_CAPACITY>;

pub type AppLoop =
    AcquisitionLoop<Sensor, AppSink, StatusIndicator<StatusLed>, MAX_LINKS>;

/// Run the started loop forever on its tick grid.
#[embassy_executor::task]
pub async fn acquisition_task(
    mut acquisition: AppLoop,
    mut watchdog: WatchdogHandle,
) {
    loop {
        Timer::at(acquisition.next_deadline()).await;
        acquisition.tick(Instant::now()).await;
        watchdog.pet();

        let context = acquisition.context();
        if context.ticks % STATS_INTERVAL_TICKS == 0 {
            info!(
                "loop: {} ticks, {} skipped, {} samples out, {} dropped",
                context.ticks,
                context.skipped,
                acquisition.sink().emitted(),
                acquisition.sink().dropped()
            );
        }
    }
}

pub fn app_sink(pipe: &'static OutputPipe) -> AppSink {
    PipeSink::new(pipe, OUTPUT_FORMAT)
}
