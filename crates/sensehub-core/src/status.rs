use smart_leds::{brightness, SmartLedsWriteAsync, RGB8};

use crate::fmt::Dbg;

/// Default scale applied to the phase colours before they hit the pixel.
pub const DEFAULT_BRIGHTNESS: u8 = 20;

/// Operating phase shown on the status pixel. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusPhase {
    Initializing,
    Error,
    Outputting,
}

impl StatusPhase {
    pub const fn color(self) -> RGB8 {
        match self {
            StatusPhase::Initializing => RGB8::new(255, 80, 0),
            StatusPhase::Error => RGB8::new(255, 0, 0),
            StatusPhase::Outputting => RGB8::new(0, 255, 0),
        }
    }
}

/// Anything that can display the current phase. Setting the phase that is
/// already shown must be a no-op.
pub trait StatusSignal {
    async fn show(&mut self, phase: StatusPhase);
}

impl<T: StatusSignal + ?Sized> StatusSignal for &mut T {
    async fn show(&mut self, phase: StatusPhase) {
        T::show(self, phase).await
    }
}

/// A single addressable pixel reflecting [`StatusPhase`].
pub struct StatusIndicator<W> {
    led: W,
    level: u8,
    phase: Option<StatusPhase>,
}

impl<W> StatusIndicator<W>
where
    W: SmartLedsWriteAsync<Color = RGB8>,
{
    pub fn new(led: W) -> Self {
        Self::with_brightness(led, DEFAULT_BRIGHTNESS)
    }

    pub fn with_brightness(led: W, level: u8) -> Self {
        Self { led, level, phase: None }
    }

    /// Phase currently on the pixel, `None` before the first successful write.
    pub fn phase(&self) -> Option<StatusPhase> {
        self.phase
    }

    pub fn led(&self) -> &W {
        &self.led
    }

    pub fn into_inner(self) -> W {
        self.led
    }
}

impl<W> StatusSignal for StatusIndicator<W>
where
    W: SmartLedsWriteAsync<Color = RGB8>,
    W::Error: core::fmt::Debug,
{
    async fn show(&mut self, phase: StatusPhase) {
        if self.phase == Some(phase) {
            return;
        }
        let pixel = [phase.color()];
        match self.led.write(brightness(pixel.into_iter(), self.level)).await {
            Ok(()) => {
                debug!("status: {:?} -> {:?}", self.phase, phase);
                self.phase = Some(phase);
            }
            Err(e) => warn!("status pixel write failed: {:?}", Dbg(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_colours() {
        assert_eq!(StatusPhase::Initializing.color(), RGB8::new(255, 80, 0));
        assert_eq!(StatusPhase::Error.color(), RGB8::new(255, 0, 0));
        assert_eq!(StatusPhase::Outputting.color(), RGB8::new(0, 255, 0));
    }
}
