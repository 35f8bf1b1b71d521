use embassy_nrf::peripherals::WDT;
use embassy_nrf::wdt::{self, Watchdog, WatchdogHandle};
use embassy_nrf::Peri;

pub mod acquisition;
pub mod usb;

// Re-exports
pub use acquisition::*;
pub use usb::*;

/// Watchdog period in 32.768 kHz ticks. Covers a tick in which every link
/// runs a full reinitialization.
const WATCHDOG_TIMEOUT_TICKS: u32 = 3 * 32_768;

/// Start the watchdog and hand back its single handle. The acquisition task
/// pets it once per tick, so a hung tick resets the chip.
pub fn start_watchdog(wdt: Peri<'static, WDT>) -> WatchdogHandle {
    let mut config = unwrap!(wdt::Config::try_new(&wdt).ok_or(()));
    config.timeout_ticks = WATCHDOG_TIMEOUT_TICKS;
    match Watchdog::try_new(wdt, config) {
        Ok((_wdt, [handle])) => handle,
        Err(_) => {
            // Watchdog already active with a different configuration, waiting for it to time out...
            error!("watchdog: already running, waiting for reset");
            loop {
                cortex_m::asm::wfe();
            }
        }
    }
}
