//! USB CDC-ACM port carrying the sample stream to the host.

use embassy_futures::join::join;
use embassy_time::Timer;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config};
use sensehub_bsp::usb::{UsbDriver, UsbDriverBuilder};
use static_cell::{ConstStaticCell, StaticCell};

use crate::{HOST_CONNECTED, OUTPUT};

const MAX_PACKET_SIZE: u16 = 64;
const DTR_POLL_MS: u64 = 10;

static CONFIG_DESCRIPTOR: ConstStaticCell<[u8; 256]> =
    ConstStaticCell::new([0; 256]);
static BOS_DESCRIPTOR: ConstStaticCell<[u8; 256]> =
    ConstStaticCell::new([0; 256]);
static CONTROL_BUF: ConstStaticCell<[u8; 64]> = ConstStaticCell::new([0; 64]);
static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();

// USB configuration
fn usb_config() -> Config<'static> {
    let mut config = Config::new(0x16c0, 0x27DD);
    config.manufacturer = Some("sensehub");
    config.product = Some("sensehub acquisition");
    config.serial_number = Some(crate::FW_VERSION);
    config.max_power = 100;
    config.max_packet_size_0 = 64;

    // Required for windows compatibility.
    config.device_class = 0xEF;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;
    config.composite_with_iads = true;

    config
}

#[embassy_executor::task]
pub async fn usb_task(usbd: UsbDriverBuilder) {
    let mut builder = Builder::new(
        usbd.init(),
        usb_config(),
        CONFIG_DESCRIPTOR.take(),
        BOS_DESCRIPTOR.take(),
        &mut [],
        CONTROL_BUF.take(),
    );
    let class = CdcAcmClass::new(
        &mut builder,
        CDC_STATE.init(State::new()),
        MAX_PACKET_SIZE,
    );
    let mut device = builder.build();

    let _ = join(device.run(), serve(class)).await;
    warn!("Exiting usb_task!!");
}

/// Wait for the host to open the port, then stream until it goes away.
async fn serve(mut class: CdcAcmClass<'static, UsbDriver>) {
    let mut packet = [0u8; MAX_PACKET_SIZE as usize];
    loop {
        class.wait_connection().await;
        while !class.dtr() {
            Timer::after_millis(DTR_POLL_MS).await;
        }
        info!("usb: host opened the port");
        HOST_CONNECTED.signal(());

        if let Err(e) = forward(&mut class, &mut packet).await {
            info!("usb: host gone: {:?}", e);
        }
    }
}

async fn forward(
    class: &mut CdcAcmClass<'static, UsbDriver>,
    packet: &mut [u8],
) -> Result<(), EndpointError> {
    loop {
        let n = OUTPUT.read(packet).await;
        class.write_packet(&packet[..n]).await?;
        // A full packet is only a transfer end if a short one follows.
        if n == packet.len() && OUTPUT.is_empty() {
            class.write_packet(&[]).await?;
        }
        if !class.dtr() {
            return Err(EndpointError::Disabled);
        }
    }
}
