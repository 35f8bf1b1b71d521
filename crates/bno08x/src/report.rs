//! Input report decoding.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::shtp::{BASE_TIMESTAMP, TIMESTAMP_REBASE};

/// Sensor reports this driver can enable and decode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ReportId {
    /// Calibrated acceleration including gravity, m/s^2.
    Accelerometer = 0x01,
    /// Calibrated angular rate, rad/s.
    Gyroscope = 0x02,
    /// Acceleration with gravity removed, m/s^2.
    LinearAcceleration = 0x04,
    /// Fused orientation, magnetic north referenced.
    RotationVector = 0x05,
    /// Fused orientation without the magnetometer.
    GameRotationVector = 0x08,
    /// Low power orientation from accelerometer and magnetometer.
    GeomagneticRotationVector = 0x09,
}

impl ReportId {
    /// Fixed-point position of the data fields.
    pub const fn q_point(self) -> u32 {
        match self {
            Self::Accelerometer | Self::LinearAcceleration => 8,
            Self::Gyroscope => 9,
            Self::RotationVector
            | Self::GameRotationVector
            | Self::GeomagneticRotationVector => 14,
        }
    }

    /// Report length on the wire, including id, sequence, status and delay.
    pub const fn len(self) -> usize {
        match self {
            Self::Accelerometer
            | Self::Gyroscope
            | Self::LinearAcceleration => 10,
            Self::GameRotationVector => 12,
            Self::RotationVector | Self::GeomagneticRotationVector => 14,
        }
    }

    pub const fn is_rotation(self) -> bool {
        self.q_point() == 14
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Data {
    Vector([f32; 3]),
    /// `[i, j, k, real]`.
    Quaternion([f32; 4]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorEvent {
    pub report: ReportId,
    pub sequence: u8,
    /// 0 (unreliable) to 3 (high).
    pub accuracy: u8,
    pub data: Data,
}

fn fixed(raw: [u8; 2], q: u32) -> f32 {
    f32::from(i16::from_le_bytes(raw)) / (1u32 << q) as f32
}

/// Decode the first sensor report in a payload from the report channel.
///
/// Timestamp records in front of it are skipped. Returns `None` for empty
/// payloads, truncated reports and report ids this driver does not know.
pub fn parse_input_report(payload: &[u8]) -> Option<SensorEvent> {
    let mut rest = payload;
    loop {
        match *rest.first()? {
            BASE_TIMESTAMP | TIMESTAMP_REBASE => rest = rest.get(5..)?,
            id => {
                let report = ReportId::try_from(id).ok()?;
                let bytes = rest.get(..report.len())?;
                return Some(decode(report, bytes));
            }
        }
    }
}

fn decode(report: ReportId, bytes: &[u8]) -> SensorEvent {
    let q = report.q_point();
    let field = |n: usize| fixed([bytes[4 + 2 * n], bytes[5 + 2 * n]], q);
    let data = if report.is_rotation() {
        Data::Quaternion([field(0), field(1), field(2), field(3)])
    } else {
        Data::Vector([field(0), field(1), field(2)])
    };
    SensorEvent {
        report,
        sequence: bytes[1],
        accuracy: bytes[2] & 0x03,
        data,
    }
}
