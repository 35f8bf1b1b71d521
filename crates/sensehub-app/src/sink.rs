//! Sample output onto the USB pipe.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::pipe::Pipe;
use sensehub_core::sink::{encode_frame, encode_text, Line};
use sensehub_core::{OutputFormat, Sample, SampleSink};

/// Report every this many dropped samples while the pipe stays full.
const DROP_LOG_INTERVAL: u32 = 1_000;

/// Encodes samples into a byte pipe drained by the USB task.
///
/// A sample is written whole or not at all: when the pipe cannot take the
/// full encoding it is dropped and counted, so the stream never carries a
/// torn line or frame.
pub struct PipeSink<'a, M: RawMutex, const N: usize> {
    pipe: &'a Pipe<M, N>,
    format: OutputFormat,
    emitted: u32,
    dropped: u32,
}

impl<'a, M: RawMutex, const N: usize> PipeSink<'a, M, N> {
    pub fn new(pipe: &'a Pipe<M, N>, format: OutputFormat) -> Self {
        Self { pipe, format, emitted: 0, dropped: 0 }
    }

    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    fn push(&mut self, bytes: &[u8]) {
        // Only this sink writes, so free space can only grow from here on.
        if self.pipe.free_capacity() < bytes.len() {
            self.drop_sample();
            return;
        }
        let mut rest = bytes;
        while !rest.is_empty() {
            match self.pipe.try_write(rest) {
                Ok(n) => rest = &rest[n..],
                Err(_) => break,
            }
        }
        self.emitted = self.emitted.wrapping_add(1);
    }

    fn drop_sample(&mut self) {
        self.dropped = self.dropped.wrapping_add(1);
        if self.dropped % DROP_LOG_INTERVAL == 1 {
            warn!("output: pipe full, {} samples dropped", self.dropped);
        }
    }
}

impl<M: RawMutex, const N: usize> SampleSink for PipeSink<'_, M, N> {
    fn emit(&mut self, sample: &Sample) {
        match self.format {
            OutputFormat::Text => {
                let mut line = Line::new();
                if encode_text(sample, &mut line).is_err() {
                    self.drop_sample();
                    return;
                }
                self.push(line.as_bytes());
            }
            OutputFormat::Binary => self.push(&encode_frame(sample)),
        }
    }
}
