//! Async driver for the BNO08x sensor hub over I2C.
//!
//! The hub boots with every sensor disabled. [`Bno08x::init`] resets it,
//! discards the unsolicited advertisement and checks the product ID;
//! [`Bno08x::enable_report`] then turns on individual reports, which arrive
//! on the report channel and are decoded by [`Bno08x::read_event`].
#![cfg_attr(not(test), no_std)]

mod fmt; // must be first

pub mod report;
pub mod shtp;

use embedded_hal_async::{delay::DelayNs, i2c::I2c};

pub use report::{parse_input_report, Data, ReportId, SensorEvent};
pub use shtp::ProductId;
use shtp::*;

pub const DEFAULT_ADDRESS: u8 = 0x4A;
pub const ALTERNATE_ADDRESS: u8 = 0x4B;

/// Largest packet kept in memory. Longer packets (the boot advertisement)
/// are read out in chunks and dropped.
const RX_LEN: usize = 128;
const TX_LEN: usize = HEADER_LEN + 17;
const RESET_SETTLE_MS: u32 = 50;
const DRAIN_LIMIT: usize = 16;
const PRODUCT_ID_ATTEMPTS: usize = 20;

#[derive(derive_more::From, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<I2cError> {
    I2c(I2cError),
    /// The hub never answered the product ID request.
    NoProductId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Received {
    channel: u8,
    len: usize,
}

pub struct Bno08x<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    sequence: [u8; CHANNEL_COUNT],
    rx: [u8; RX_LEN],
}

impl<I2C, E, D> Bno08x<I2C, D>
where
    I2C: I2c<Error = E>,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            sequence: [0; CHANNEL_COUNT],
            rx: [0; RX_LEN],
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Reset the hub and verify it answers with a product ID.
    pub async fn init(&mut self) -> Result<ProductId, Error<E>> {
        self.soft_reset().await?;
        self.identify().await
    }

    /// Ask a booted hub for its product ID, skipping whatever else it has
    /// queued. Sequence numbers are assumed to start over, as after any reset.
    pub async fn identify(&mut self) -> Result<ProductId, Error<E>> {
        self.send(CHANNEL_CONTROL, &[PRODUCT_ID_REQUEST, 0]).await?;
        for _ in 0..PRODUCT_ID_ATTEMPTS {
            match self.receive().await? {
                Some(packet) if packet.channel == CHANNEL_CONTROL => {
                    if let Some(id) = ProductId::parse(self.payload(packet)) {
                        debug!(
                            "bno08x: sw {}.{} part {} build {}",
                            id.sw_major,
                            id.sw_minor,
                            id.part_number,
                            id.build
                        );
                        return Ok(id);
                    }
                }
                Some(_) => {}
                None => self.delay.delay_ms(1).await,
            }
        }
        Err(Error::NoProductId)
    }

    /// Restart the hub firmware. Sequence numbers restart as well.
    pub async fn soft_reset(&mut self) -> Result<(), Error<E>> {
        self.send(CHANNEL_EXECUTABLE, &[EXECUTABLE_RESET]).await?;
        self.forget_sequence();
        self.delay.delay_ms(RESET_SETTLE_MS).await;
        self.drain().await
    }

    /// Ask for `report` every `interval_us` microseconds. Zero disables it.
    pub async fn enable_report(
        &mut self,
        report: ReportId,
        interval_us: u32,
    ) -> Result<(), Error<E>> {
        self.send(CHANNEL_CONTROL, &set_feature(report.into(), interval_us))
            .await
    }

    /// Read one packet and decode it if it carries a sensor report.
    ///
    /// `Ok(None)` when the hub has nothing queued or the packet was not a
    /// report this driver understands.
    pub async fn read_event(&mut self) -> Result<Option<SensorEvent>, Error<E>> {
        let Some(packet) = self.receive().await? else {
            return Ok(None);
        };
        match packet.channel {
            CHANNEL_REPORTS | CHANNEL_WAKE_REPORTS | CHANNEL_GYRO_ROTATION => {
                Ok(parse_input_report(self.payload(packet)))
            }
            channel => {
                trace!("bno08x: skipped packet on channel {}", channel);
                Ok(None)
            }
        }
    }

    /// Start every channel's sequence number over. Call after the hub was
    /// reset through its reset line.
    pub fn forget_sequence(&mut self) {
        self.sequence = [0; CHANNEL_COUNT];
    }

    /// Discard everything the hub has queued.
    async fn drain(&mut self) -> Result<(), Error<E>> {
        for _ in 0..DRAIN_LIMIT {
            if self.receive().await?.is_none() {
                break;
            }
        }
        Ok(())
    }

    async fn send(&mut self, channel: u8, body: &[u8]) -> Result<(), Error<E>> {
        let len = HEADER_LEN + body.len();
        let slot = &mut self.sequence[usize::from(channel)];
        let header = Header { len, channel, sequence: *slot };
        *slot = slot.wrapping_add(1);

        let mut tx = [0u8; TX_LEN];
        tx[..HEADER_LEN].copy_from_slice(&header.encode());
        tx[HEADER_LEN..len].copy_from_slice(body);
        self.i2c.write(self.address, &tx[..len]).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<Received>, Error<E>> {
        let mut head = [0u8; HEADER_LEN];
        self.i2c.read(self.address, &mut head).await?;
        let header = Header::parse(head);
        if header.len <= HEADER_LEN {
            return Ok(None);
        }

        // The hub resends the header at the start of every read.
        let first = header.len.min(RX_LEN);
        self.i2c.read(self.address, &mut self.rx[..first]).await?;
        let mut remaining = header.len - first;
        if remaining == 0 {
            return Ok(Some(Received { channel: header.channel, len: first }));
        }

        while remaining > 0 {
            let chunk = (remaining + HEADER_LEN).min(RX_LEN);
            self.i2c.read(self.address, &mut self.rx[..chunk]).await?;
            remaining -= chunk - HEADER_LEN;
        }
        trace!("bno08x: dropped {} byte packet", header.len);
        Ok(Some(Received { channel: header.channel, len: HEADER_LEN }))
    }

    fn payload(&self, packet: Received) -> &[u8] {
        &self.rx[HEADER_LEN..packet.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

    const ADDR: u8 = DEFAULT_ADDRESS;

    fn empty() -> Transaction {
        Transaction::read(ADDR, vec![0, 0, 0, 0])
    }

    /// Header read followed by the full packet read.
    fn packet(channel: u8, seq: u8, payload: &[u8]) -> [Transaction; 2] {
        let header = Header { len: HEADER_LEN + payload.len(), channel, sequence: seq }
            .encode();
        let mut full = header.to_vec();
        full.extend_from_slice(payload);
        [
            Transaction::read(ADDR, header.to_vec()),
            Transaction::read(ADDR, full),
        ]
    }

    fn product_id_payload() -> std::vec::Vec<u8> {
        let mut payload = vec![0xF8, 0x01, 3, 2];
        payload.extend_from_slice(&10003608u32.to_le_bytes());
        payload.extend_from_slice(&0x0130u32.to_le_bytes());
        payload.extend_from_slice(&0x0000u16.to_le_bytes());
        payload.extend_from_slice(&[0, 0]);
        payload
    }

    #[futures_test::test]
    async fn init_resets_and_checks_product_id() {
        let mut expectations = vec![
            Transaction::write(ADDR, vec![5, 0, CHANNEL_EXECUTABLE, 0, 1]),
        ];
        expectations.extend(packet(CHANNEL_EXECUTABLE, 0, &[1]));
        expectations.push(empty());
        expectations.push(Transaction::write(
            ADDR,
            vec![6, 0, CHANNEL_CONTROL, 0, 0xF9, 0],
        ));
        expectations.push(empty());
        expectations.extend(packet(CHANNEL_CONTROL, 0, &product_id_payload()));

        let mut i2c = Mock::new(&expectations);
        let mut imu = Bno08x::new(i2c.clone(), NoopDelay);

        let id = imu.init().await.unwrap();
        assert_eq!(id.sw_major, 3);
        assert_eq!(id.sw_minor, 2);
        assert_eq!(id.part_number, 10003608);

        i2c.done();
    }

    #[futures_test::test]
    async fn identify_skips_queued_packets() {
        let mut expectations = vec![Transaction::write(
            ADDR,
            vec![6, 0, CHANNEL_CONTROL, 0, 0xF9, 0],
        )];
        expectations.extend(packet(CHANNEL_EXECUTABLE, 0, &[1]));
        expectations.extend(packet(CHANNEL_CONTROL, 0, &product_id_payload()));

        let mut i2c = Mock::new(&expectations);
        let mut imu = Bno08x::new(i2c.clone(), NoopDelay);

        let id = imu.identify().await.unwrap();
        assert_eq!(id.part_number, 10003608);

        i2c.done();
    }

    #[futures_test::test]
    async fn enable_report_increments_sequence() {
        let body = set_feature(ReportId::LinearAcceleration.into(), 10_000);
        let mut first = vec![21, 0, CHANNEL_CONTROL, 0];
        first.extend_from_slice(&body);
        let mut second = vec![21, 0, CHANNEL_CONTROL, 1];
        second.extend_from_slice(&body);
        let expectations = [
            Transaction::write(ADDR, first),
            Transaction::write(ADDR, second),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut imu = Bno08x::new(i2c.clone(), NoopDelay);

        imu.enable_report(ReportId::LinearAcceleration, 10_000)
            .await
            .unwrap();
        imu.enable_report(ReportId::LinearAcceleration, 10_000)
            .await
            .unwrap();

        i2c.done();
    }

    #[futures_test::test]
    async fn read_event_decodes_reports_only() {
        let report = [
            0xFB, 0, 0, 0, 0, //
            0x04, 0x01, 0x03, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFF,
        ];
        let mut expectations = vec![empty()];
        expectations.extend(packet(CHANNEL_CONTROL, 0, &[0xFC, 0, 0]));
        expectations.extend(packet(CHANNEL_REPORTS, 0, &report));
        let mut i2c = Mock::new(&expectations);
        let mut imu = Bno08x::new(i2c.clone(), NoopDelay);

        assert_eq!(imu.read_event().await.unwrap(), None);
        assert_eq!(imu.read_event().await.unwrap(), None);
        let event = imu.read_event().await.unwrap().unwrap();
        assert_eq!(event.report, ReportId::LinearAcceleration);
        assert_eq!(event.data, Data::Vector([1.0, 0.0, -1.0]));

        i2c.done();
    }

    #[futures_test::test]
    async fn oversized_packet_is_drained() {
        // 200 bytes: 128 in the first read, 72 + 4 header in the second.
        let header = Header { len: 200, channel: CHANNEL_COMMAND, sequence: 0 };
        let mut first = header.encode().to_vec();
        first.resize(RX_LEN, 0xAA);
        let mut second = Header { len: 76, channel: CHANNEL_COMMAND, sequence: 0 }
            .encode()
            .to_vec();
        second.resize(76, 0xAA);
        let expectations = [
            Transaction::read(ADDR, header.encode().to_vec()),
            Transaction::read(ADDR, first),
            Transaction::read(ADDR, second),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut imu = Bno08x::new(i2c.clone(), NoopDelay);

        assert_eq!(imu.read_event().await.unwrap(), None);

        i2c.done();
    }
}
