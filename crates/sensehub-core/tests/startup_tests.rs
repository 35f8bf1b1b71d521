use core::future::{pending, ready};

use embassy_time::Duration;
use sensehub_core::{bounded_wait, HostWait};

#[futures_test::test]
async fn host_already_connected() {
    let outcome = bounded_wait(ready(()), Duration::from_millis(3_000)).await;
    assert_eq!(outcome, HostWait::Connected);
}

#[futures_test::test]
async fn absent_host_does_not_block_startup() {
    // A deadline that has already passed resolves on the first poll.
    let outcome = bounded_wait(pending::<()>(), Duration::from_ticks(0)).await;
    assert_eq!(outcome, HostWait::TimedOut);
}
