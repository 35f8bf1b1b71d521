#![no_std]
#![no_main]

use heapless::Vec;
use static_cell::StaticCell;

#[cfg(feature = "defmt")]
use defmt_rtt as _;
#[cfg(feature = "defmt")]
use panic_probe as _;
#[cfg(not(feature = "defmt"))]
use panic_reset as _;

use sensehub_app::prelude::*;
use sensehub_core::config::DEFAULT_HOST_WAIT_MS;

static SENSOR_BUS: StaticCell<SharedBus> = StaticCell::new();

// Application main entry point. The spawner can be used to start async tasks.
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("sensehub {}", FW_VERSION);
    let board = SenseHub::default();

    let led = unwrap!(board.status_led_resources.configure());
    let mut status = StatusIndicator::new(led);
    status.show(StatusPhase::Initializing).await;

    spawner.must_spawn(usb_task(board.usb));

    // Defaults are compiled in; the host only has to open the port to
    // receive data, so a board without a host carries on after the wait.
    bounded_wait(
        HOST_CONNECTED.wait(),
        Duration::from_millis(DEFAULT_HOST_WAIT_MS),
    )
    .await;

    let config = AcquisitionConfig::default();
    let bus: &'static SharedBus =
        SENSOR_BUS.init(board.twim0_bus_resources.into_bus());
    let mut links: Vec<DeviceLink<Sensor>, MAX_LINKS> = Vec::new();

    #[cfg(feature = "tof")]
    {
        let lines = board.tof_resources.into_lines();
        match allocate_tofs(bus, lines, TOF_ADDRESSES).await {
            Ok(allocated) => {
                for tof in allocated {
                    let index = links.len() as u8;
                    let sensor = TofSensor::new(tof, TOF_RANGING);
                    let link = DeviceLink::new(
                        index,
                        sensor.address(),
                        Sensor::Tof(sensor),
                        config.reinit_cooldown,
                    );
                    let _ = links.push(link);
                }
            }
            Err(e) => {
                error!("alloc: {:?}", e);
                status.show(StatusPhase::Error).await;
                return;
            }
        }
    }

    #[cfg(feature = "imu")]
    {
        let reset = board.imu_resources.release();
        let sensor = ImuSensor::new(bus, reset, IMU_REPORT, IMU_INTERVAL_US);
        let link = DeviceLink::new(
            links.len() as u8,
            sensor.address(),
            Sensor::Imu(sensor),
            config.reinit_cooldown,
        );
        let _ = links.push(link);
    }

    let mut acquisition =
        AcquisitionLoop::new(links, app_sink(&OUTPUT), status, config);
    if let Err(e) = acquisition.start(Instant::now()).await {
        error!("startup: {:?}, halting", e);
        return;
    }

    let watchdog = start_watchdog(board.wdt);
    spawner.must_spawn(acquisition_task(acquisition, watchdog));
}
