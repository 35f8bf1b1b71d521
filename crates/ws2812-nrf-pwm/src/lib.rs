#![no_std]

use core::marker::PhantomData;

use embassy_nrf::{
    gpio::Pin,
    pwm::{
        self, Config, Error, Instance, Prescaler, SequenceConfig,
        SequenceLoad, SequencePwm, SingleSequenceMode, SingleSequencer,
    },
    Peri,
};
use embassy_time::Timer;
use smart_leds_trait::{SmartLedsWriteAsync, RGB8};

/// WS2812 0-bit high time in ns.
const T0H_NS: u32 = 400;
/// WS2812 1-bit high time in ns.
const T1H_NS: u32 = 800;
/// WS2812 bit period in ns.
const BIT_NS: u32 = 1250;
/// Low time that latches the shifted colours.
const RESET_NS: u32 = 50_000;

const BITS_PER_PIXEL: usize = 24;

/// Convert nanoseconds to PWM ticks, rounding.
const fn to_ticks(ns: u32) -> u32 {
    const PWM_CLOCK_MHZ: u32 = pwm::PWM_CLK_HZ / 1_000_000; // 16 MHz

    (ns * PWM_CLOCK_MHZ + 500) / 1_000
}

/// Polarity flag: output starts high and falls at the compare value.
const RES: u16 = 0x8000;

const RESET_TICKS: u32 = to_ticks(RESET_NS);

/// Compare values for a 0-bit and a 1-bit.
const BITS: [u16; 2] =
    [to_ticks(T0H_NS) as u16 | RES, to_ticks(T1H_NS) as u16 | RES];

const PWM_PERIOD: u16 = to_ticks(BIT_NS) as u16;

/// Number of sequence words needed for `pixels` pixels.
pub const fn words_for(pixels: usize) -> usize {
    pixels * BITS_PER_PIXEL + 1
}

/// Fill `words` with the GRB bit pattern of `color`, MSB first.
fn encode(color: RGB8, words: &mut [u16]) {
    let grb = (u32::from(color.g) << 16)
        | (u32::from(color.r) << 8)
        | u32::from(color.b);
    for (i, word) in words.iter_mut().enumerate() {
        let bit = (grb >> (BITS_PER_PIXEL - 1 - i)) & 1;
        *word = BITS[bit as usize];
    }
}

/// A WS2812 chain on one PWM channel. `N` is [`words_for`] the chain length.
pub struct Ws2812<'d, T: Instance, const N: usize> {
    seq_pwm: SequencePwm<'d>,
    seq_words: [u16; N],
    seq_config: SequenceConfig,
    _instance: PhantomData<T>,
}

impl<'d, T: Instance, const N: usize> Ws2812<'d, T, N> {
    pub fn new(
        pwm: Peri<'d, T>,
        pin: Peri<'d, impl Pin>,
    ) -> Result<Self, Error> {
        let mut config = Config::default();
        config.sequence_load = SequenceLoad::Common;
        config.prescaler = Prescaler::Div1;
        config.max_duty = PWM_PERIOD;

        let seq_pwm = SequencePwm::new_1ch(pwm, pin, config)?;

        let mut seq_words = [0; N];
        // Trailing word holds the line low while the reset delay runs.
        if let Some(last) = seq_words.last_mut() {
            *last = RES;
        }

        let mut seq_config = SequenceConfig::default();
        seq_config.end_delay = RESET_TICKS - 1;

        Ok(Ws2812 {
            seq_pwm,
            seq_words,
            seq_config,
            _instance: PhantomData,
        })
    }

    fn frame_ns() -> u64 {
        N as u64 * u64::from(BIT_NS) + u64::from(RESET_NS)
    }
}

impl<'d, T: Instance, const N: usize> SmartLedsWriteAsync
    for Ws2812<'d, T, N>
{
    type Error = Error;
    type Color = RGB8;

    async fn write<C, I>(&mut self, iterator: C) -> Result<(), Self::Error>
    where
        C: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        for (color, words) in iterator
            .into_iter()
            .zip(self.seq_words.chunks_exact_mut(BITS_PER_PIXEL))
        {
            encode(color.into(), words);
        }

        let sequencer = SingleSequencer::new(
            &mut self.seq_pwm,
            &self.seq_words,
            self.seq_config.clone(),
        );
        sequencer.start(SingleSequenceMode::Times(1))?;
        Timer::after_nanos(Self::frame_ns()).await;
        sequencer.stop();

        Ok(())
    }
}
