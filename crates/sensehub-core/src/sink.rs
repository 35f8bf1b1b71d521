//! Output encodings for [`Sample`]s.
//!
//! Both encodings keep the field order `timestamp, device, payload.., valid`.
//! Text lines print floats with six decimal digits; binary frames carry the
//! raw `f32` bits.

use core::fmt::Write;

use embassy_time::Duration;
use heapless::String;

use crate::sample::{Payload, Reading, Sample, SampleKind};

/// Receives samples one at a time, synchronously, as soon as they are acquired.
pub trait SampleSink {
    fn emit(&mut self, sample: &Sample);
}

impl<T: SampleSink + ?Sized> SampleSink for &mut T {
    fn emit(&mut self, sample: &Sample) {
        T::emit(self, sample)
    }
}

/// Longest possible text line: `u32` timestamp, `u8` device, four floats and
/// the validity flag, with separators and newline.
pub const MAX_LINE_LEN: usize = 128;

pub type Line = String<MAX_LINE_LEN>;

/// Render `sample` as `timestamp_ms,device,v1[,v2,v3[,v4]],valid\n`.
pub fn encode_text(sample: &Sample, line: &mut Line) -> core::fmt::Result {
    line.clear();
    write!(line, "{},{}", sample.timestamp_ms(), sample.device)?;
    for value in sample.values() {
        write!(line, ",{:.6}", value)?;
    }
    writeln!(line, ",{}", u8::from(sample.reading.valid))
}

pub const FRAME_MAGIC: [u8; 4] = *b"HEAD";
pub const FRAME_VALUES: usize = 4;
pub const FRAME_LEN: usize = 4 + 1 + 1 + 1 + 4 + FRAME_VALUES * 4 + 4;
const CHECKSUM_OFFSET: usize = FRAME_LEN - 4;

pub type Frame = [u8; FRAME_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    BadMagic,
    BadChecksum { expected: u32, actual: u32 },
    UnknownKind(u8),
}

fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| acc.wrapping_add(u32::from(*b)))
}

/// Encode `sample` into a fixed-width little-endian frame.
///
/// Layout: magic, device, kind, valid, timestamp_ms (u32), four `f32`
/// values (unused slots zero), byte-sum checksum (u32).
pub fn encode_frame(sample: &Sample) -> Frame {
    let mut frame = [0u8; FRAME_LEN];
    frame[..4].copy_from_slice(&FRAME_MAGIC);
    frame[4] = sample.device;
    frame[5] = sample.reading.kind as u8;
    frame[6] = u8::from(sample.reading.valid);
    frame[7..11].copy_from_slice(&sample.timestamp_ms().to_le_bytes());
    for (slot, value) in frame[11..CHECKSUM_OFFSET]
        .chunks_exact_mut(4)
        .zip(sample.values())
    {
        slot.copy_from_slice(&value.to_le_bytes());
    }
    let sum = checksum(&frame[..CHECKSUM_OFFSET]);
    frame[CHECKSUM_OFFSET..].copy_from_slice(&sum.to_le_bytes());
    frame
}

/// Decode and verify a frame produced by [`encode_frame`].
pub fn decode_frame(frame: &Frame) -> Result<Sample, FrameError> {
    if frame[..4] != FRAME_MAGIC {
        return Err(FrameError::BadMagic);
    }
    let mut sum = [0u8; 4];
    sum.copy_from_slice(&frame[CHECKSUM_OFFSET..]);
    let expected = u32::from_le_bytes(sum);
    let actual = checksum(&frame[..CHECKSUM_OFFSET]);
    if expected != actual {
        return Err(FrameError::BadChecksum { expected, actual });
    }

    let kind =
        SampleKind::from_u8(frame[5]).ok_or(FrameError::UnknownKind(frame[5]))?;
    let mut values = [0f32; FRAME_VALUES];
    for (value, raw) in values.iter_mut().zip(frame[11..CHECKSUM_OFFSET].chunks_exact(4)) {
        *value = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    }
    let payload = match kind {
        SampleKind::Distance => Payload::Scalar(values[0]),
        SampleKind::Orientation => Payload::Quaternion(values),
        _ => Payload::Vector([values[0], values[1], values[2]]),
    };
    let timestamp = u32::from_le_bytes([frame[7], frame[8], frame[9], frame[10]]);

    Ok(Sample {
        device: frame[4],
        timestamp: Duration::from_millis(u64::from(timestamp)),
        reading: Reading { kind, payload, valid: frame[6] != 0 },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accel_sample() -> Sample {
        Sample {
            device: 1,
            timestamp: Duration::from_millis(1234),
            reading: Reading::vector(
                SampleKind::LinearAcceleration,
                [0.5, -1.25, 9.806650],
            ),
        }
    }

    #[test]
    fn text_line_keeps_field_order_and_precision() {
        let mut line = Line::new();
        encode_text(&accel_sample(), &mut line).unwrap();
        assert_eq!(line.as_str(), "1234,1,0.500000,-1.250000,9.806650,1\n");
    }

    #[test]
    fn text_line_for_distance_has_single_value() {
        let sample = Sample {
            device: 0,
            timestamp: Duration::from_millis(7),
            reading: Reading::distance(412, false),
        };
        let mut line = Line::new();
        encode_text(&sample, &mut line).unwrap();
        assert_eq!(line.as_str(), "7,0,412.000000,0\n");
    }

    #[test]
    fn longest_line_fits() {
        let sample = Sample {
            device: u8::MAX,
            timestamp: Duration::from_millis(u64::from(u32::MAX)),
            reading: Reading::orientation([-1.0e6, -1.0e6, -1.0e6, -1.0e6]),
        };
        let mut line = Line::new();
        assert!(encode_text(&sample, &mut line).is_ok());
    }

    #[test]
    fn frame_layout() {
        let frame = encode_frame(&accel_sample());
        assert_eq!(&frame[..4], b"HEAD");
        assert_eq!(frame[4], 1);
        assert_eq!(frame[5], SampleKind::LinearAcceleration as u8);
        assert_eq!(frame[6], 1);
        assert_eq!(&frame[7..11], &1234u32.to_le_bytes());
        assert_eq!(&frame[11..15], &0.5f32.to_le_bytes());
        // Fourth value slot is unused for vectors.
        assert_eq!(&frame[23..27], &[0, 0, 0, 0]);
        let sum = frame[..27].iter().map(|b| u32::from(*b)).sum::<u32>();
        assert_eq!(&frame[27..], &sum.to_le_bytes());
    }

    #[test]
    fn corrupted_frame_is_rejected() {
        let mut frame = encode_frame(&accel_sample());
        frame[12] ^= 0x40;
        assert!(matches!(
            decode_frame(&frame),
            Err(FrameError::BadChecksum { .. })
        ));

        let mut frame = encode_frame(&accel_sample());
        frame[0] = b'X';
        assert_eq!(decode_frame(&frame), Err(FrameError::BadMagic));
    }

    #[test]
    fn decoded_frame_matches_sample() {
        let sample = accel_sample();
        assert_eq!(decode_frame(&encode_frame(&sample)), Ok(sample));
    }
}
