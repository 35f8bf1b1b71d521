use embassy_time::Duration;

/// What a reading measures. Decoded once at the link boundary, so the loop
/// never sees vendor report identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SampleKind {
    /// Time-of-flight range in millimetres.
    Distance = 0,
    /// Acceleration including gravity, m/s^2.
    Acceleration = 1,
    /// Acceleration with gravity removed, m/s^2.
    LinearAcceleration = 2,
    /// Angular rate, rad/s.
    AngularRate = 3,
    /// Orientation quaternion `[i, j, k, real]`.
    Orientation = 4,
}

impl SampleKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Distance),
            1 => Some(Self::Acceleration),
            2 => Some(Self::LinearAcceleration),
            3 => Some(Self::AngularRate),
            4 => Some(Self::Orientation),
            _ => None,
        }
    }
}

/// Fixed-shape numeric payload.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Payload {
    Scalar(f32),
    Vector([f32; 3]),
    Quaternion([f32; 4]),
}

impl Payload {
    pub fn values(&self) -> &[f32] {
        match self {
            Payload::Scalar(v) => core::slice::from_ref(v),
            Payload::Vector(v) => v,
            Payload::Quaternion(q) => q,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub kind: SampleKind,
    pub payload: Payload,
    pub valid: bool,
}

impl Reading {
    pub fn distance(millimeters: u16, valid: bool) -> Self {
        Self {
            kind: SampleKind::Distance,
            payload: Payload::Scalar(millimeters as f32),
            valid,
        }
    }

    pub fn vector(kind: SampleKind, xyz: [f32; 3]) -> Self {
        Self { kind, payload: Payload::Vector(xyz), valid: true }
    }

    pub fn orientation(ijkr: [f32; 4]) -> Self {
        Self {
            kind: SampleKind::Orientation,
            payload: Payload::Quaternion(ijkr),
            valid: true,
        }
    }
}

/// One acquired sample, timestamped relative to its link's reference instant.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub device: u8,
    pub timestamp: Duration,
    pub reading: Reading,
}

impl Sample {
    pub fn values(&self) -> &[f32] {
        self.reading.payload.values()
    }

    /// Timestamp in whole milliseconds, saturating at `u32::MAX`.
    pub fn timestamp_ms(&self) -> u32 {
        u32::try_from(self.timestamp.as_millis()).unwrap_or(u32::MAX)
    }
}
