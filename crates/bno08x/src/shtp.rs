//! Sensor Hub Transport Protocol framing.
//!
//! Every transfer starts with a four byte header: total length (little
//! endian, bit 15 flags a continuation), channel, and a per-channel sequence
//! number that the sender increments.

pub const HEADER_LEN: usize = 4;

pub const CHANNEL_COMMAND: u8 = 0;
pub const CHANNEL_EXECUTABLE: u8 = 1;
pub const CHANNEL_CONTROL: u8 = 2;
pub const CHANNEL_REPORTS: u8 = 3;
pub const CHANNEL_WAKE_REPORTS: u8 = 4;
pub const CHANNEL_GYRO_ROTATION: u8 = 5;
pub const CHANNEL_COUNT: usize = 6;

/// Executable channel: reset the hub.
pub const EXECUTABLE_RESET: u8 = 0x01;

pub const PRODUCT_ID_REQUEST: u8 = 0xF9;
pub const PRODUCT_ID_RESPONSE: u8 = 0xF8;
pub const SET_FEATURE_COMMAND: u8 = 0xFD;
pub const TIMESTAMP_REBASE: u8 = 0xFA;
pub const BASE_TIMESTAMP: u8 = 0xFB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    /// Header plus payload, continuation bit stripped.
    pub len: usize,
    pub channel: u8,
    pub sequence: u8,
}

impl Header {
    pub fn parse(bytes: [u8; HEADER_LEN]) -> Self {
        let raw = u16::from_le_bytes([bytes[0], bytes[1]]) & 0x7FFF;
        Self { len: usize::from(raw), channel: bytes[2], sequence: bytes[3] }
    }

    pub fn encode(self) -> [u8; HEADER_LEN] {
        let [lo, hi] = (self.len as u16).to_le_bytes();
        [lo, hi, self.channel, self.sequence]
    }
}

/// Body of a Set Feature command enabling `report` every `interval_us`.
pub fn set_feature(report: u8, interval_us: u32) -> [u8; 17] {
    let mut body = [0u8; 17];
    body[0] = SET_FEATURE_COMMAND;
    body[1] = report;
    // Feature flags and change sensitivity stay zero.
    body[5..9].copy_from_slice(&interval_us.to_le_bytes());
    // Batch interval and sensor-specific config stay zero.
    body
}

/// Product ID response fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProductId {
    pub reset_cause: u8,
    pub sw_major: u8,
    pub sw_minor: u8,
    pub part_number: u32,
    pub build: u32,
    pub patch: u16,
}

impl ProductId {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 14 || payload[0] != PRODUCT_ID_RESPONSE {
            return None;
        }
        let u32_at = |i: usize| {
            u32::from_le_bytes([
                payload[i],
                payload[i + 1],
                payload[i + 2],
                payload[i + 3],
            ])
        };
        Some(Self {
            reset_cause: payload[1],
            sw_major: payload[2],
            sw_minor: payload[3],
            part_number: u32_at(4),
            build: u32_at(8),
            patch: u16::from_le_bytes([payload[12], payload[13]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_strips_continuation_bit() {
        let header = Header::parse([0x14, 0x81, 3, 7]);
        assert_eq!(header, Header { len: 0x0114, channel: 3, sequence: 7 });
    }

    #[test]
    fn set_feature_places_interval() {
        let body = set_feature(0x04, 10_000);
        assert_eq!(body[..2], [0xFD, 0x04]);
        assert_eq!(body[5..9], 10_000u32.to_le_bytes());
        assert!(body[9..].iter().all(|b| *b == 0));
    }
}
