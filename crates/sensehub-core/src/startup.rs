use core::future::Future;

use embassy_time::{with_timeout, Duration};

/// How the wait for the host ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostWait {
    Connected,
    TimedOut,
}

/// Wait for `connected` to resolve, but never longer than `timeout`.
///
/// Startup proceeds with the compiled-in defaults either way, so a board that
/// runs without a host attached still starts acquiring.
pub async fn bounded_wait<F>(connected: F, timeout: Duration) -> HostWait
where
    F: Future<Output = ()>,
{
    match with_timeout(timeout, connected).await {
        Ok(()) => {
            info!("startup: host connected");
            HostWait::Connected
        }
        Err(_) => {
            info!(
                "startup: no host after {} ms, continuing",
                timeout.as_millis()
            );
            HostWait::TimedOut
        }
    }
}
